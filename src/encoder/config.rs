use crate::options::SoapVersion;

/// Encoder-Konfiguration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoding namespace and array dialect written to the wire.
    pub soap_version: SoapVersion,
    /// `xsi:type` schreiben, wenn der Typ nicht aus dem Kontext folgt.
    pub send_xsi_types: bool,
    /// Compound values below the root become `href` references to
    /// top-level `multiRef` definitions.
    pub send_multi_refs: bool,
    /// Arrays of equal-length arrays are written as one rank-2 array.
    pub enable_2d_arrays: bool,
    /// Nil-Items weglassen, das nächste Item trägt `position`.
    pub sparse_arrays: bool,
    /// Element name of array items.
    pub item_element: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            soap_version: SoapVersion::V11,
            send_xsi_types: true,
            send_multi_refs: false,
            enable_2d_arrays: false,
            sparse_arrays: false,
            item_element: "item".to_string(),
        }
    }
}

impl EncoderConfig {
    /// Default configuration for SOAP 1.2 messages.
    pub fn soap12() -> Self {
        Self { soap_version: SoapVersion::V12, ..Self::default() }
    }

    /// Konfiguration mit Multi-Ref-Ausgabe.
    pub fn with_multi_refs() -> Self {
        Self { send_multi_refs: true, ..Self::default() }
    }
}
