//! Central error types for the SOAP-encoding codec.
//!
//! Die fünf Codec-Fehlerklassen (Syntax, unbekannter Typ, offene Referenz,
//! Validierung, Konvertierung) plus Plumbing-Fehler der XML-Adapter.

use core::fmt;
use std::borrow::Cow;

/// All errors raised by decode, encode and the XML adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed dimension, offset or position syntax (`[2,3]`, `[x]`, ...).
    ParseSyntax(Cow<'static, str>),
    /// No encoder or decoder resolvable for a wire type or value shape.
    UnknownType(String),
    /// An `href` whose id was never defined in the message.
    DanglingReference(String),
    /// Illegal nil, out-of-bounds sparse position, arity mismatch, ...
    Validation(Cow<'static, str>),
    /// Final materialization of a value into its declared shape failed.
    Conversion(Cow<'static, str>),
    /// Ein QName-Wert (xsi:type, arrayType) verwendet einen ungebundenen Prefix.
    UnresolvablePrefix(String),
    /// XML tokenizing failed (quick-xml adapter).
    XmlParseError(String),
    /// Ein IO-Fehler beim Schreiben des XML-Streams.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseSyntax(msg) => write!(f, "syntax error: {msg}"),
            Self::UnknownType(name) => write!(f, "no codec registered for type '{name}'"),
            Self::DanglingReference(id) => {
                write!(f, "reference '#{id}' was never resolved in this message")
            }
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
            Self::Conversion(msg) => write!(f, "conversion failed: {msg}"),
            Self::UnresolvablePrefix(prefix) => {
                write!(f, "unresolvable namespace prefix '{prefix}'")
            }
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Erstellt einen `ParseSyntax` Fehler mit Nachricht.
    pub fn parse_syntax(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ParseSyntax(msg.into())
    }

    /// Erstellt einen `Validation` Fehler mit Nachricht.
    pub fn validation(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation(msg.into())
    }

    /// Erstellt einen `Conversion` Fehler mit Nachricht.
    pub fn conversion(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Erstellt einen `UnknownType` Fehler aus einem beliebigen Anzeigenamen.
    pub fn unknown_type(name: impl fmt::Display) -> Self {
        Self::UnknownType(name.to_string())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_syntax_display() {
        let e = Error::parse_syntax("bad dimension '[2,x]'");
        let msg = e.to_string();
        assert!(msg.contains("syntax"), "{msg}");
        assert!(msg.contains("[2,x]"), "{msg}");
    }

    #[test]
    fn unknown_type_display() {
        let e = Error::unknown_type("{urn:example}Widget");
        let msg = e.to_string();
        assert!(msg.contains("no codec"), "{msg}");
        assert!(msg.contains("Widget"), "{msg}");
    }

    #[test]
    fn dangling_reference_display() {
        let e = Error::DanglingReference("id7".to_string());
        let msg = e.to_string();
        assert!(msg.contains("#id7"), "{msg}");
        assert!(msg.contains("never resolved"), "{msg}");
    }

    #[test]
    fn validation_display() {
        let e = Error::validation("position [9] out of bounds");
        let msg = e.to_string();
        assert!(msg.contains("validation"), "{msg}");
        assert!(msg.contains("[9]"), "{msg}");
    }

    #[test]
    fn conversion_display() {
        let e = Error::conversion("'abc' is not an xsd:int");
        assert!(e.to_string().contains("conversion"));
    }

    #[test]
    fn unresolvable_prefix_display() {
        let e = Error::UnresolvablePrefix("ns9".to_string());
        let msg = e.to_string();
        assert!(msg.contains("prefix"), "{msg}");
        assert!(msg.contains("ns9"), "{msg}");
    }

    #[test]
    fn error_implements_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(Error::IoError("disk full".into()));
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn error_is_clone_and_eq() {
        let e1 = Error::DanglingReference("a".into());
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }
}
