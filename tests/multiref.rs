//! Multi-Ref-Tests: geteilte Compounds, Vorwärts-/Rückwärtsreferenzen,
//! zurückgestellte Definitionen, SOAP 1.1 und 1.2.

#![allow(dead_code)]

use std::sync::Arc;

use soapenc::{
    ArrayValue, DecodeEngine, DecoderConfig, EncoderConfig, Error, QName, StructLayout,
    StructValue, TypeRegistry, Value, LITERAL_STYLE,
};

include!("common/values.rs");

const NS: &str = concat!(
    r#"xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema""#,
);

fn fields_share_allocation(value: &Value, a: &str, b: &str) -> bool {
    let s = value.as_struct().expect("struct root");
    match (s.field(a), s.field(b)) {
        (Some(Value::Struct(x)), Some(Value::Struct(y))) => Arc::ptr_eq(x, y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

// ============================================================================
// Encode → Decode
// ============================================================================

#[test]
fn shared_struct_keeps_identity() {
    let registry = TypeRegistry::with_defaults();
    let shared = record(vec![("v", Value::Int(1))]);
    let root = record(vec![("a", shared.clone()), ("b", shared), ("c", Value::string("plain"))]);

    for (enc, dec) in [
        (EncoderConfig::with_multi_refs(), DecoderConfig::default()),
        (EncoderConfig { send_multi_refs: true, ..EncoderConfig::soap12() }, DecoderConfig::soap12()),
    ] {
        let (xml, decoded) = via_xml(&root, &registry, &enc, &dec);
        assert_eq!(decoded, root, "{xml}");
        assert!(fields_share_allocation(&decoded, "a", "b"), "{xml}");
        assert_eq!(xml.matches("<multiRef").count(), 1, "{xml}");
    }
}

/// Referenzen innerhalb von Definitionen: Definitionen reihen weitere ein.
#[test]
fn nested_definitions() {
    let registry = TypeRegistry::with_defaults();
    let leaf = int_array(&[7, 8]);
    let middle = record(vec![("leaf", leaf.clone()), ("again", leaf)]);
    let root = record(vec![("m", middle.clone()), ("n", middle)]);

    let (xml, decoded) = via_xml(&root, &registry, &EncoderConfig::with_multi_refs(), &DecoderConfig::default());
    assert_eq!(decoded, root);
    assert_eq!(xml.matches("<multiRef").count(), 2, "{xml}");
    assert!(fields_share_allocation(&decoded, "m", "n"));
    let middle = decoded.as_struct().unwrap().field("m").unwrap();
    assert!(fields_share_allocation(middle, "leaf", "again"));
}

/// Array-Items als Referenzen.
#[test]
fn array_items_as_references() {
    let registry = TypeRegistry::with_defaults();
    let item = record(vec![("k", Value::string("v"))]);
    let root = Value::array(ArrayValue::from_items(
        Some(QName::new(soapenc::qname::SOAP11_ENC_NS, "Struct")),
        vec![item.clone(), item, Value::Nil],
    ));
    let (xml, decoded) = via_xml(&root, &registry, &EncoderConfig::with_multi_refs(), &DecoderConfig::default());
    assert_eq!(decoded, root, "{xml}");
    let items = &decoded.as_array().unwrap().items;
    let (Value::Struct(x), Value::Struct(y)) = (&items[0], &items[1]) else {
        panic!("expected struct items: {items:?}");
    };
    assert!(Arc::ptr_eq(x, y));
}

// ============================================================================
// Handgeschriebene Nachrichten
// ============================================================================

/// Reihenfolge der Definitionen ist beliebig.
#[test]
fn definitions_in_any_order() {
    let xml = format!(
        r##"<multiRef {NS} id="b" soapenc:root="0" xsi:type="xsd:int">2</multiRef>
            <r {NS}><x href="#a"/><y href="#b"/><z href="#a"/></r>
            <multiRef {NS} id="a" soapenc:root="0" xsi:type="xsd:int">1</multiRef>"##
    );
    let value = soapenc::decode_xml(&xml, None, &TypeRegistry::with_defaults(), &DecoderConfig::default()).unwrap();
    assert_eq!(value, record(vec![("x", Value::Int(1)), ("y", Value::Int(2)), ("z", Value::Int(1))]));
}

/// Eine Referenz in einem Array-Slot, der über `position` adressiert ist.
#[test]
fn positioned_reference() {
    let xml = format!(
        r##"<r {NS} soapenc:arrayType="xsd:string[3]"><i soapenc:position="[2]" href="#s"/></r>
            <s {NS} id="s" soapenc:root="0" xsi:type="xsd:string">last</s>"##
    );
    let value = soapenc::decode_xml(&xml, None, &TypeRegistry::with_defaults(), &DecoderConfig::default()).unwrap();
    assert_eq!(value.as_array().unwrap().items, vec![Value::Nil, Value::Nil, Value::string("last")]);
}

/// Ungetypte Definition vor der Referenz: Replay mit dem Typ des Slots,
/// auch über zwei Referenzen mit demselben Hint.
#[test]
fn deferred_untyped_definition() {
    let mut registry = TypeRegistry::with_defaults();
    registry.register_struct(
        LITERAL_STYLE,
        StructLayout::new(QName::new("urn:t", "Pair"))
            .field(QName::local("left"), Some(QName::xsd("int")))
            .field(QName::local("right"), Some(QName::xsd("int"))),
    );
    let xml = format!(
        r##"<multiRef {NS} id="n" soapenc:root="0">42</multiRef>
            <p {NS} xmlns:t="urn:t" xsi:type="t:Pair"><left href="#n"/><right href="#n"/></p>"##
    );
    let value = soapenc::decode_xml(&xml, None, &registry, &DecoderConfig::default()).unwrap();
    let expected = Value::structure(
        StructValue::new(Some(QName::new("urn:t", "Pair")))
            .with_field(QName::local("left"), Value::Int(42))
            .with_field(QName::local("right"), Value::Int(42)),
    );
    assert_eq!(value, expected);
}

/// Zurückgestellte Definition mit Kindern wird als Struct nachgespielt.
#[test]
fn deferred_compound_definition() {
    let xml = format!(
        r##"<multiRef {NS} id="c" soapenc:root="0"><k xsi:type="xsd:int">5</k></multiRef>
            <r {NS}><one href="#c"/></r>"##
    );
    let registry = TypeRegistry::with_defaults();
    let events = soapenc::parse_events(&xml).unwrap();
    let mut engine = DecodeEngine::new(&registry, DecoderConfig::default());
    for event in &events {
        event.dispatch(&mut engine).unwrap();
    }
    assert!(!engine.journal().is_empty());
    let value = engine.finish().unwrap();
    assert_eq!(value, record(vec![("one", record(vec![("k", Value::Int(5))]))]));
}

#[test]
fn unresolved_reference_is_reported() {
    let xml = format!(r##"<r {NS}><a href="#missing"/><b href="#also-missing"/></r>"##);
    let result = soapenc::decode_xml(&xml, None, &TypeRegistry::with_defaults(), &DecoderConfig::default());
    assert!(matches!(result, Err(Error::DanglingReference(id)) if id == "also-missing"));
}

/// Direkte Zyklen werden nie fertig und melden die offene Referenz.
#[test]
fn reference_cycle_is_dangling() {
    let xml = format!(
        r##"<r {NS}><a href="#x"/></r>
            <multiRef {NS} id="x" soapenc:root="0" xsi:type="soapenc:Struct"><self href="#x"/></multiRef>"##
    );
    let result = soapenc::decode_xml(&xml, None, &TypeRegistry::with_defaults(), &DecoderConfig::default());
    assert!(matches!(result, Err(Error::DanglingReference(id)) if id == "x"));
}

#[test]
fn soap12_reference_without_hash() {
    let xml = r##"<r xmlns:enc="http://www.w3.org/2003/05/soap-encoding"
                     xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                     xmlns:xsd="http://www.w3.org/2001/XMLSchema">
                    <a enc:ref="v"/><b enc:ref="#v"/>
                    <c enc:id="v" xsi:type="xsd:int">3</c>
                  </r>"##;
    let value = soapenc::decode_xml(xml, None, &TypeRegistry::with_defaults(), &DecoderConfig::soap12()).unwrap();
    assert_eq!(value, record(vec![("a", Value::Int(3)), ("b", Value::Int(3)), ("c", Value::Int(3))]));
}
