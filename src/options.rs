//! Options shared by decoder and encoder.

use crate::qname::{QName, SOAP11_ENC_NS, SOAP12_ENC_NS};

/// Encoding style URI of XML-Schema "literal" content: the default scope of
/// every [`crate::registry::TypeRegistry`].
pub const LITERAL_STYLE: &str = "";

/// SOAP version, selecting the encoding namespace and the array dialect.
///
/// SOAP 1.1 arrays carry `soapenc:arrayType="xsd:int[3]"`; SOAP 1.2 arrays
/// carry `enc:itemType="xsd:int"` plus `enc:arraySize="3"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SoapVersion {
    #[default]
    V11,
    V12,
}

impl SoapVersion {
    /// Encoding namespace (= encoding-style URI) of this version.
    pub fn encoding_ns(self) -> &'static str {
        match self {
            SoapVersion::V11 => SOAP11_ENC_NS,
            SoapVersion::V12 => SOAP12_ENC_NS,
        }
    }

    /// Conventional prefix for the encoding namespace.
    pub fn encoding_prefix(self) -> &'static str {
        match self {
            SoapVersion::V11 => "soapenc",
            SoapVersion::V12 => "enc",
        }
    }

    /// `soapenc:Array` / `enc:Array`.
    pub fn array_type_name(self) -> QName {
        QName::new(self.encoding_ns(), "Array")
    }

    /// `soapenc:Struct` / `enc:Struct`.
    pub fn struct_type_name(self) -> QName {
        QName::new(self.encoding_ns(), "Struct")
    }

    /// Version whose encoding namespace is `uri`, if any.
    pub fn from_encoding_ns(uri: &str) -> Option<Self> {
        match uri {
            SOAP11_ENC_NS => Some(SoapVersion::V11),
            SOAP12_ENC_NS => Some(SoapVersion::V12),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_namespaces() {
        assert_eq!(SoapVersion::V11.encoding_ns(), SOAP11_ENC_NS);
        assert_eq!(SoapVersion::V12.array_type_name(), QName::new(SOAP12_ENC_NS, "Array"));
        assert_eq!(SoapVersion::from_encoding_ns(SOAP12_ENC_NS), Some(SoapVersion::V12));
        assert_eq!(SoapVersion::from_encoding_ns("urn:other"), None);
    }
}
