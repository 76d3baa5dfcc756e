//! Integrationstests fuer Tokenizer und Serializer (XML ↔ Events).

use std::sync::Arc;

use soapenc::event::{Attributes, Event};
use soapenc::qname::QName;
use soapenc::xml::parse_events;
use soapenc::xml_serializer::events_to_xml;

// ============================================================================
// Hilfsfunktionen
// ============================================================================

fn se(name: QName, attributes: Attributes) -> Event {
    Event::StartElement { name, attributes }
}

fn ee(name: QName) -> Event {
    Event::EndElement { name }
}

fn ch(text: &str) -> Event {
    Event::Characters(Arc::from(text))
}

fn spm(prefix: &str, uri: &str) -> Event {
    Event::StartPrefixMapping { prefix: prefix.into(), uri: uri.into() }
}

fn epm(prefix: &str) -> Event {
    Event::EndPrefixMapping { prefix: prefix.into() }
}

/// XML → Events → XML.
fn reserialize(xml: &str) -> String {
    let events = parse_events(xml).unwrap_or_else(|e| panic!("parse failed: {e}\n{xml}"));
    events_to_xml(&events).unwrap()
}

// ============================================================================
// Serializer
// ============================================================================

#[test]
fn empty_document() {
    assert_eq!(events_to_xml(&[Event::StartDocument, Event::EndDocument]).unwrap(), "");
}

#[test]
fn nested_elements_and_text() {
    let events = [
        Event::StartDocument,
        se(QName::local("a"), Attributes::new()),
        se(QName::local("b"), Attributes::new()),
        ch("x < y"),
        ee(QName::local("b")),
        se(QName::local("c"), Attributes::new()),
        ee(QName::local("c")),
        ee(QName::local("a")),
        Event::EndDocument,
    ];
    assert_eq!(events_to_xml(&events).unwrap(), "<a><b>x &lt; y</b><c/></a>");
}

#[test]
fn announced_prefixes_and_attributes() {
    let xsi = "http://www.w3.org/2001/XMLSchema-instance";
    let events = [
        spm("xsi", xsi),
        se(
            QName::with_prefix("urn:m", "op", "m"),
            Attributes::new()
                .with(QName::with_prefix(xsi, "type", "xsi"), "xsd:int")
                .with(QName::local("note"), "\"quoted\" & <tagged>"),
        ),
        ch("1"),
        ee(QName::with_prefix("urn:m", "op", "m")),
        epm("xsi"),
    ];
    assert_eq!(
        events_to_xml(&events).unwrap(),
        format!(
            r#"<m:op xmlns:xsi="{xsi}" xmlns:m="urn:m" xsi:type="xsd:int" note="&quot;quoted&quot; &amp; &lt;tagged>">1</m:op>"#
        )
    );
}

/// Unpräfixierte Namespaces: Default-Namespace fuer Elemente, ns1 fuer Attribute.
#[test]
fn synthesized_declarations() {
    let events = [
        se(
            QName::new("urn:e", "root"),
            Attributes::new().with(QName::new("urn:a", "flag"), "1"),
        ),
        se(QName::new("urn:e", "child"), Attributes::new()),
        ee(QName::new("urn:e", "child")),
        ee(QName::new("urn:e", "root")),
    ];
    assert_eq!(
        events_to_xml(&events).unwrap(),
        r#"<root xmlns="urn:e" xmlns:ns1="urn:a" ns1:flag="1"><child/></root>"#
    );
}

#[test]
fn unclosed_element_is_an_error() {
    let events = [se(QName::local("a"), Attributes::new())];
    assert!(events_to_xml(&events).is_err());
}

// ============================================================================
// Tokenizer
// ============================================================================

#[test]
fn prefix_mappings_wrap_the_element() {
    let events = parse_events(r#"<p:a xmlns:p="urn:p"><p:b/></p:a>"#).unwrap();
    assert_eq!(events[0], Event::StartDocument);
    assert_eq!(events[1], spm("p", "urn:p"));
    assert!(matches!(&events[2], Event::StartElement { name, attributes }
        if name.is("urn:p", "a") && attributes.is_empty()));
    assert_eq!(events[events.len() - 2], epm("p"));
    assert_eq!(events[events.len() - 1], Event::EndDocument);
}

#[test]
fn attribute_namespaces_are_resolved() {
    let events = parse_events(
        r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true" plain="v"/>"#,
    )
    .unwrap();
    let Some(Event::StartElement { attributes, .. }) = events.iter().find(|e| matches!(e, Event::StartElement { .. }))
    else {
        panic!("no start element in {events:?}");
    };
    assert_eq!(attributes.len(), 2);
    assert_eq!(attributes.get("http://www.w3.org/2001/XMLSchema-instance", "nil"), Some("true"));
    assert_eq!(attributes.get("", "plain"), Some("v"));
}

#[test]
fn undeclared_prefix_is_an_error() {
    assert!(parse_events("<x:a/>").is_err());
    assert!(parse_events("<a><b></a>").is_err());
}

// ============================================================================
// Roundtrip
// ============================================================================

#[test]
fn round_trip_simple() {
    let xml = r#"<a x="1"><b>text &amp; more</b><c/></a>"#;
    assert_eq!(reserialize(xml), xml);
}

#[test]
fn round_trip_namespaces() {
    let xml = concat!(
        r#"<soapenc:Array xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/" "#,
        r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" soapenc:arrayType="xsd:int[2]">"#,
        r#"<item>1</item><item>2</item></soapenc:Array>"#,
    );
    assert_eq!(reserialize(xml), xml);
}

/// Mehrere Top-Level-Elemente (Root plus Multi-Ref-Definitionen).
#[test]
fn round_trip_multiple_top_level_elements() {
    let xml = r##"<r><a href="#id1"/></r><multiRef id="id1">v</multiRef>"##;
    assert_eq!(reserialize(xml), xml);
}

#[test]
fn round_trip_comments_and_cdata() {
    let out = reserialize("<a><!-- note --><![CDATA[<raw>]]></a>");
    assert_eq!(out, "<a><!-- note -->&lt;raw&gt;</a>");
}
