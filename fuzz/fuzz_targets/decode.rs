#![no_main]
use libfuzzer_sys::fuzz_target;
use soapenc::{DecoderConfig, TypeRegistry};

fuzz_target!(|data: &[u8]| {
    // Beliebiger Body-Inhalt: darf scheitern, aber nie paniken.
    if let Ok(xml) = std::str::from_utf8(data) {
        let registry = TypeRegistry::with_defaults();
        let _ = soapenc::decode_xml(xml, None, &registry, &DecoderConfig::default());
        let _ = soapenc::decode_xml(xml, None, &registry, &DecoderConfig::soap12());
    }
});
