use crate::options::SoapVersion;

/// Behaviour when `xsi:nil` lands in a non-nillable struct accessor.
///
/// Unfilled array slots always decode as nil and are not subject to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NilPolicy {
    /// Abort with a validation error.
    #[default]
    Reject,
    /// Accept the nil and log a warning.
    Tolerate,
}

/// Decoder-Konfiguration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Encoding namespace and array dialect expected on the wire.
    pub soap_version: SoapVersion,
    pub nil_policy: NilPolicy,
    /// Array-Komponenten, deren Konvertierung an einem Nil scheitert,
    /// unkonvertiert übernehmen statt abzubrechen.
    pub tolerate_null_conversion: bool,
    /// Maximale Element-Verschachtelung.
    pub max_depth: usize,
    /// Maximale Slot-Anzahl eines Arrays mit deklarierten Längen.
    pub max_array_len: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            soap_version: SoapVersion::V11,
            nil_policy: NilPolicy::Reject,
            tolerate_null_conversion: true,
            max_depth: 512,
            max_array_len: 1 << 24,
        }
    }
}

impl DecoderConfig {
    /// Default configuration for SOAP 1.2 messages.
    pub fn soap12() -> Self {
        Self { soap_version: SoapVersion::V12, ..Self::default() }
    }
}
