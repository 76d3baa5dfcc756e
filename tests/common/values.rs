// Gemeinsame Wert-Builder und Roundtrip-Helfer fuer die Integrationstests.
//
// Wird per `include!` eingebunden. Benötigte Imports:
//   use soapenc::{ArrayValue, DecoderConfig, EncoderConfig, QName, StructValue, TypeRegistry, Value};

fn int_array(values: &[i32]) -> Value {
    Value::array(ArrayValue::from_items(
        Some(QName::xsd("int")),
        values.iter().map(|v| Value::Int(*v)).collect(),
    ))
}

fn string_array(values: &[Option<&str>]) -> Value {
    Value::array(ArrayValue::from_items(
        Some(QName::xsd("string")),
        values.iter().map(|v| v.map_or(Value::Nil, Value::string)).collect(),
    ))
}

fn record(fields: Vec<(&str, Value)>) -> Value {
    let mut s = StructValue::new(None);
    for (name, value) in fields {
        s = s.with_field(QName::local(name), value);
    }
    Value::structure(s)
}

/// Encode → XML-Text → Decode.
fn via_xml(value: &Value, registry: &TypeRegistry, enc: &EncoderConfig, dec: &DecoderConfig) -> (String, Value) {
    let xml = soapenc::encode_to_xml(&QName::local("result"), value, None, registry, enc)
        .unwrap_or_else(|e| panic!("encode failed for {value:?}: {e}"));
    let decoded = soapenc::decode_xml(&xml, None, registry, dec)
        .unwrap_or_else(|e| panic!("decode failed for {xml}: {e}"));
    (xml, decoded)
}

/// Encode → Events → Decode (ohne XML-Text dazwischen).
fn via_events(value: &Value, registry: &TypeRegistry, enc: &EncoderConfig, dec: &DecoderConfig) -> Value {
    let mut events: Vec<soapenc::Event> = Vec::new();
    soapenc::encode(&QName::local("result"), value, None, registry, enc, &mut events).unwrap();
    soapenc::decode(&events, None, registry, dec).unwrap()
}

/// Prueft beide Roundtrip-Wege gegen den Ausgangswert.
fn assert_roundtrip(value: &Value, registry: &TypeRegistry, enc: &EncoderConfig, dec: &DecoderConfig) {
    let (xml, decoded) = via_xml(value, registry, enc, dec);
    assert_eq!(&decoded, value, "XML roundtrip mismatch\n{xml}");
    assert_eq!(&via_events(value, registry, enc, dec), value, "event roundtrip mismatch");
}
