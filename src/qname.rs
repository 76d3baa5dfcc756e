//! Qualified names and the well-known namespaces of the SOAP encoding.
//!
//! A [`QName`] is the universal lookup key of the codec: element names,
//! attribute names, `xsi:type` values and registry keys are all QNames.
//! Two QNames are equal when URI and local-name match; the prefix is carried
//! along for serialization only.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;

/// XML Schema namespace (`xsd:`).
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
/// XML Schema instance namespace (`xsi:type`, `xsi:nil`).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// SOAP 1.1 encoding namespace (also the SOAP 1.1 encoding-style URI).
pub const SOAP11_ENC_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
/// SOAP 1.2 encoding namespace (also the SOAP 1.2 encoding-style URI).
pub const SOAP12_ENC_NS: &str = "http://www.w3.org/2003/05/soap-encoding";
/// The namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of `xmlns` declarations.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// A (namespace URI, local name) pair with an optional serialization prefix.
///
/// `Send + Sync` (Arc-backed), so registry keys can be shared between
/// decode passes running on different threads.
#[derive(Clone)]
pub struct QName {
    /// The namespace URI. Empty string means no namespace.
    pub uri: Arc<str>,
    /// The local name.
    pub local_name: Arc<str>,
    /// Prefix as seen on the wire or requested for output.
    pub prefix: Option<Arc<str>>,
    /// Vorberechneter Hash von (uri, local_name). Vermeidet wiederholtes
    /// String-Hashing bei Registry-Lookups.
    identity: u64,
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QName")
            .field("uri", &self.uri)
            .field("local_name", &self.local_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Berechnet den Identity-Hash für ein QName (uri + local_name).
pub(crate) fn compute_identity(uri: &str, local_name: &str) -> u64 {
    let mut hasher = AHasher::default();
    uri.hash(&mut hasher);
    local_name.hash(&mut hasher);
    hasher.finish()
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.uri == other.uri
            && self.local_name == other.local_name
    }
}

impl Eq for QName {}

/// Ordering konsistent mit PartialEq: nur uri und local_name, prefix ignoriert.
impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri
            .cmp(&other.uri)
            .then_with(|| self.local_name.cmp(&other.local_name))
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Clark-Notation `{uri}local` (bzw. nur `local` ohne Namespace).
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}

impl QName {
    /// Creates a new QName with the given URI and local-name, without prefix.
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        let uri = uri.into();
        let local_name = local_name.into();
        let identity = compute_identity(&uri, &local_name);
        Self { uri, local_name, prefix: None, identity }
    }

    /// Creates a new QName with URI, local-name, and prefix.
    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        let mut qname = Self::new(uri, local_name);
        qname.prefix = Some(prefix.into());
        qname
    }

    /// QName without namespace (unqualified element or attribute).
    pub fn local(local_name: impl Into<Arc<str>>) -> Self {
        Self::new("", local_name)
    }

    /// `xsd:<local>`.
    pub fn xsd(local_name: &str) -> Self {
        Self::new(XSD_NS, local_name)
    }

    /// `xsi:<local>`.
    pub fn xsi(local_name: &str) -> Self {
        Self::new(XSI_NS, local_name)
    }

    /// Parst Clark-Notation `{uri}local`; ohne `{` wird ein unqualifizierter Name erzeugt.
    pub fn from_clark(value: &str) -> Self {
        if let Some(rest) = value.strip_prefix('{')
            && let Some(close) = rest.find('}')
        {
            return Self::new(&rest[..close], &rest[close + 1..]);
        }
        Self::local(value)
    }

    /// Same name, different serialization prefix.
    pub fn prefixed(&self, prefix: impl Into<Arc<str>>) -> Self {
        let mut qname = self.clone();
        qname.prefix = Some(prefix.into());
        qname
    }

    /// True when URI and local name match (prefix ignored).
    pub fn is(&self, uri: &str, local_name: &str) -> bool {
        &*self.uri == uri && &*self.local_name == local_name
    }

    /// The `prefix:local` form as written on the wire.
    pub fn to_prefixed_string(&self) -> String {
        match &self.prefix {
            Some(pfx) if !pfx.is_empty() => format!("{pfx}:{}", self.local_name),
            _ => self.local_name.to_string(),
        }
    }

    /// Vorberechneter Identity-Hash von (uri, local_name).
    pub fn identity_hash(&self) -> u64 {
        self.identity
    }
}

/// Splits a lexical `prefix:local` value. No colon yields an empty prefix.
pub fn split_lexical(value: &str) -> (&str, &str) {
    match value.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_prefix() {
        let a = QName::with_prefix(XSD_NS, "int", "xsd");
        let b = QName::with_prefix(XSD_NS, "int", "xs");
        assert_eq!(a, b);
        assert_eq!(a.identity_hash(), b.identity_hash());
    }

    #[test]
    fn different_uri_not_equal() {
        assert_ne!(QName::new(XSD_NS, "int"), QName::new(SOAP11_ENC_NS, "int"));
    }

    #[test]
    fn hash_set_dedupes_by_identity() {
        let mut set = HashSet::new();
        set.insert(QName::with_prefix("urn:a", "x", "p"));
        set.insert(QName::with_prefix("urn:a", "x", "q"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_is_clark_notation() {
        assert_eq!(QName::xsd("string").to_string(), format!("{{{XSD_NS}}}string"));
        assert_eq!(QName::local("item").to_string(), "item");
    }

    #[test]
    fn clark_round_trip() {
        let q = QName::new("urn:example", "Widget");
        assert_eq!(QName::from_clark(&q.to_string()), q);
        assert_eq!(QName::from_clark("plain"), QName::local("plain"));
    }

    #[test]
    fn prefixed_string() {
        assert_eq!(QName::xsd("int").prefixed("xsd").to_prefixed_string(), "xsd:int");
        assert_eq!(QName::local("a").to_prefixed_string(), "a");
    }

    #[test]
    fn split_lexical_forms() {
        assert_eq!(split_lexical("xsd:int"), ("xsd", "int"));
        assert_eq!(split_lexical("int"), ("", "int"));
    }

    #[test]
    fn qname_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QName>();
    }
}
