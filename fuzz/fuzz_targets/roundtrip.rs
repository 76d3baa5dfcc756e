#![no_main]
use libfuzzer_sys::fuzz_target;
use soapenc::{DecoderConfig, EncoderConfig, QName, TypeRegistry};

fuzz_target!(|data: &[u8]| {
    // Was decodiert, muss sich wieder encodieren und gleich decodieren lassen.
    if let Ok(xml) = std::str::from_utf8(data) {
        let registry = TypeRegistry::with_defaults();
        if let Ok(value) = soapenc::decode_xml(xml, None, &registry, &DecoderConfig::default()) {
            let out = soapenc::encode_to_xml(&QName::local("r"), &value, None, &registry, &EncoderConfig::default())
                .expect("decoded value must encode");
            let again = soapenc::decode_xml(&out, None, &registry, &DecoderConfig::default())
                .expect("encoded value must decode");
            let out2 = soapenc::encode_to_xml(&QName::local("r"), &again, None, &registry, &EncoderConfig::default())
                .expect("re-decoded value must encode");
            assert_eq!(out, out2);
        }
    }
});
