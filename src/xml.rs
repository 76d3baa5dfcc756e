//! XML text → push-parser events.
//!
//! quick-xml based tokenizer adapter. Namespace declarations become
//! `start_prefix_mapping` callbacks *before* the element's `start_element`
//! and `end_prefix_mapping` callbacks after its `end_element`; the `xmlns`
//! attributes themselves are not forwarded. Adjacent text, CDATA and
//! character references are coalesced into one `characters` callback.

use std::borrow::Cow;
use std::sync::Arc;

use memchr::memchr;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::Error;
use crate::event::{Attributes, Event, EventHandler};
use crate::qname::QName;
use crate::Result;

/// Tokenizes `xml` into an owned event vector.
pub fn parse_events(xml: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    emit_events(xml, &mut events)?;
    Ok(events)
}

/// Streams the events of `xml` into `handler`.
///
/// Mehrere Top-Level-Elemente sind erlaubt (SOAP-Body-Inhalt: Root plus
/// Multi-Ref-Definitionen).
pub fn emit_events(xml: &str, handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
    let mut reader = NsReader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    // CH-Coalescing: gepufferter Text wird vor jedem Nicht-CH-Event geflusht.
    let mut pending_ch: Option<String> = None;
    // Offene Elemente mit den Prefixen, die sie deklariert haben.
    let mut open: Vec<(QName, Vec<Arc<str>>)> = Vec::new();

    handler.start_document()?;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let element = emit_start(&reader, &e, handler)?;
                open.push(element);
            }
            Ok(XmlEvent::Empty(e)) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let (name, prefixes) = emit_start(&reader, &e, handler)?;
                emit_end(&name, &prefixes, handler)?;
            }
            Ok(XmlEvent::End(_)) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let Some((name, prefixes)) = open.pop() else {
                    return Err(Error::XmlParseError("unbalanced end tag".into()));
                };
                emit_end(&name, &prefixes, handler)?;
            }
            Ok(XmlEvent::Text(e)) => {
                let raw = std::str::from_utf8(&e).map_err(|er| Error::XmlParseError(er.to_string()))?;
                let text = normalize_line_endings(raw);
                if open.is_empty() {
                    if !text.trim().is_empty() {
                        return Err(Error::XmlParseError(format!("text outside of element: '{}'", text.trim())));
                    }
                } else if !text.is_empty() {
                    coalesce_ch(&mut pending_ch, &text);
                }
            }
            Ok(XmlEvent::CData(e)) => {
                let raw = std::str::from_utf8(&e).map_err(|er| Error::XmlParseError(er.to_string()))?;
                if !open.is_empty() {
                    coalesce_ch(&mut pending_ch, &normalize_line_endings(raw));
                }
            }
            Ok(XmlEvent::GeneralRef(e)) => {
                let name = std::str::from_utf8(e.as_ref()).map_err(|er| Error::XmlParseError(er.to_string()))?;
                let resolved = if name.starts_with('#') {
                    resolve_char_reference(name).map(|ch| ch.to_string())
                } else {
                    resolve_predefined_entity(name).map(str::to_string)
                };
                let Some(resolved) = resolved else {
                    return Err(Error::XmlParseError(format!("unknown entity reference '&{name};'")));
                };
                if !open.is_empty() {
                    coalesce_ch(&mut pending_ch, &resolved);
                }
            }
            Ok(XmlEvent::Comment(e)) => {
                flush_pending_ch(&mut pending_ch, handler)?;
                let text = std::str::from_utf8(&e).map_err(|er| Error::XmlParseError(er.to_string()))?;
                handler.comment(text)?;
            }
            Ok(XmlEvent::Decl(_) | XmlEvent::PI(_) | XmlEvent::DocType(_)) => {}
            Ok(XmlEvent::Eof) => break,
            Err(e) => {
                return Err(Error::XmlParseError(format!(
                    "parse XML error at {:?}: {e}",
                    reader.buffer_position()
                )));
            }
        }
        buf.clear();
    }

    if let Some((name, _)) = open.last() {
        return Err(Error::XmlParseError(format!("unclosed element '{name}'")));
    }
    flush_pending_ch(&mut pending_ch, handler)?;
    handler.end_document()
}

fn flush_pending_ch(pending_ch: &mut Option<String>, handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
    match pending_ch.take() {
        Some(text) => handler.characters(&text),
        None => Ok(()),
    }
}

fn coalesce_ch(pending_ch: &mut Option<String>, value: &str) {
    match pending_ch {
        Some(text) => text.push_str(value),
        None => *pending_ch = Some(value.to_string()),
    }
}

/// Kündigt die Namespace-Deklarationen an und meldet das Start-Tag.
fn emit_start(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    handler: &mut (impl EventHandler + ?Sized),
) -> Result<(QName, Vec<Arc<str>>)> {
    let mut prefixes = Vec::new();
    let mut attributes = Attributes::new();

    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
        let key = attr.key.as_ref();
        let raw = std::str::from_utf8(&attr.value).map_err(|er| Error::XmlParseError(er.to_string()))?;
        let value = unescape_attr_value(raw);

        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let prefix = std::str::from_utf8(key.get(6..).unwrap_or_default())
                .map_err(|er| Error::XmlParseError(er.to_string()))?;
            handler.start_prefix_mapping(prefix, &value)?;
            prefixes.push(Arc::from(prefix));
            continue;
        }

        let (uri, local, prefix) = resolve_name(reader.resolver().resolve_attribute(attr.key), attr.key)?;
        let name = match prefix {
            Some(p) => QName::with_prefix(uri, local, p),
            None => QName::new(uri, local),
        };
        attributes.push(name, normalize_line_endings(&value));
    }

    let (uri, local, prefix) = resolve_name(reader.resolver().resolve_element(e.name()), e.name())?;
    let name = match prefix {
        Some(p) => QName::with_prefix(uri, local, p),
        None => QName::new(uri, local),
    };
    handler.start_element(&name, &attributes)?;
    Ok((name, prefixes))
}

fn emit_end(name: &QName, prefixes: &[Arc<str>], handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
    handler.end_element(name)?;
    for prefix in prefixes.iter().rev() {
        handler.end_prefix_mapping(prefix)?;
    }
    Ok(())
}

fn resolve_name<'a>(
    (ns, local): (ResolveResult<'_>, quick_xml::name::LocalName<'a>),
    raw: XmlQName<'a>,
) -> Result<(String, String, Option<String>)> {
    let uri = match ns {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.as_ref())
            .map_err(|er| Error::XmlParseError(er.to_string()))?
            .to_string(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(p) => {
            return Err(Error::UnresolvablePrefix(String::from_utf8_lossy(&p).into_owned()));
        }
    };
    let local_name = std::str::from_utf8(local.as_ref())
        .map_err(|er| Error::XmlParseError(er.to_string()))?
        .to_string();
    let prefix = raw
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    Ok((uri, local_name, prefix))
}

/// Löst Zeichen- und vordefinierte Entity-Referenzen in Attributwerten auf.
fn unescape_attr_value(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    let Some(mut amp) = memchr(b'&', bytes) else {
        return Cow::Borrowed(value);
    };

    let mut out = String::with_capacity(value.len());
    let mut pos = 0;
    loop {
        out.push_str(&value[pos..amp]);
        let Some(rel_semi) = memchr(b';', &bytes[amp + 1..]) else {
            out.push_str(&value[amp..]);
            return Cow::Owned(out);
        };
        let semi = amp + 1 + rel_semi;
        let name = &value[amp + 1..semi];
        if name.starts_with('#')
            && let Some(ch) = resolve_char_reference(name)
        {
            out.push(ch);
        } else if let Some(predef) = resolve_predefined_entity(name) {
            out.push_str(predef);
        } else {
            out.push_str(&value[amp..=semi]);
        }
        pos = semi + 1;
        match memchr(b'&', &bytes[pos..]) {
            Some(rel) => amp = pos + rel,
            None => {
                out.push_str(&value[pos..]);
                return Cow::Owned(out);
            }
        }
    }
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            if matches!(chars.peek(), Some('\n')) {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// `#49` (dezimal) oder `#x31` (hexadezimal), ohne `&` und `;`.
fn resolve_char_reference(ref_name: &str) -> Option<char> {
    let digits = ref_name.strip_prefix('#')?;
    let code_point = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::{SOAP11_ENC_NS, XSI_NS};

    #[test]
    fn prefix_mappings_wrap_the_element() {
        let events = parse_events(r#"<a:x xmlns:a="urn:a" xmlns:b="urn:b"/>"#).unwrap();
        assert_eq!(
            events,
            vec![
                Event::StartDocument,
                Event::StartPrefixMapping { prefix: "a".into(), uri: "urn:a".into() },
                Event::StartPrefixMapping { prefix: "b".into(), uri: "urn:b".into() },
                Event::StartElement { name: QName::with_prefix("urn:a", "x", "a"), attributes: Attributes::new() },
                Event::EndElement { name: QName::with_prefix("urn:a", "x", "a") },
                Event::EndPrefixMapping { prefix: "b".into() },
                Event::EndPrefixMapping { prefix: "a".into() },
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn attributes_are_namespace_resolved() {
        let xml = format!(
            r#"<r xmlns:xsi="{XSI_NS}" xmlns:soapenc="{SOAP11_ENC_NS}" xsi:type="x:y" soapenc:root="0" id="a"/>"#
        );
        let events = parse_events(&xml).unwrap();
        let Some(Event::StartElement { attributes, .. }) =
            events.iter().find(|e| matches!(e, Event::StartElement { .. }))
        else {
            panic!("no start element in {events:?}");
        };
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes.get(XSI_NS, "type"), Some("x:y"));
        assert_eq!(attributes.get(SOAP11_ENC_NS, "root"), Some("0"));
        assert_eq!(attributes.get("", "id"), Some("a"));
    }

    #[test]
    fn text_entities_and_cdata_are_coalesced() {
        let events = parse_events("<r>a &amp; b&#x41;<![CDATA[<c>]]>\r\nd</r>").unwrap();
        assert!(events.contains(&Event::Characters("a & bA<c>\nd".into())));
    }

    #[test]
    fn attribute_references_are_resolved() {
        let events = parse_events(r#"<r v="&lt;x&#65;&gt;"/>"#).unwrap();
        let Event::StartElement { attributes, .. } = &events[1] else {
            panic!("expected start element, got {:?}", events[1]);
        };
        assert_eq!(attributes.get("", "v"), Some("<xA>"));
    }

    #[test]
    fn multiple_top_level_elements() {
        let events = parse_events("<a/>\n<b/>").unwrap();
        let starts = events.iter().filter(|e| matches!(e, Event::StartElement { .. })).count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn default_namespace_applies_to_elements_only() {
        let events = parse_events(r#"<r xmlns="urn:d" a="1"><c/></r>"#).unwrap();
        let Event::StartElement { name, attributes } = &events[2] else {
            panic!("expected start element, got {:?}", events[2]);
        };
        assert!(name.is("urn:d", "r"));
        assert_eq!(attributes.get("", "a"), Some("1"));
        assert!(matches!(&events[3], Event::StartElement { name, .. } if name.is("urn:d", "c")));
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(matches!(parse_events("<a><b></a>"), Err(Error::XmlParseError(_))));
        assert!(matches!(parse_events("<a>"), Err(Error::XmlParseError(_))));
        assert!(matches!(parse_events("<a>&bogus;</a>"), Err(Error::XmlParseError(_))));
        assert!(matches!(parse_events("<p:a/>"), Err(Error::UnresolvablePrefix(_) | Error::XmlParseError(_))));
    }
}
