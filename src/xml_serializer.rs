//! Push-parser events → XML text.
//!
//! [`XmlSerializer`] is an [`EventHandler`] writing compact XML into any
//! `impl Write`; it is the usual sink of the encoder. Prefix mappings
//! announced before a start tag become `xmlns` attributes of that tag. Start
//! tags are buffered until the next event so empty elements are written
//! self-closing.
//!
//! Zwei APIs:
//! - `events_to_xml()`: gibt XML als String zurueck (Convenience).
//! - `XmlSerializer::new(writer)`: streamt direkt in `impl Write`.

use std::io::Write;
use std::sync::Arc;

use crate::error::Error;
use crate::event::{Attributes, Event, EventHandler};
use crate::qname::{QName, XML_NS};
use crate::Result;

/// Serialisiert Events als XML-String.
pub fn events_to_xml(events: &[Event]) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = XmlSerializer::new(&mut buf);
    crate::event::drive(events, &mut ser)?;
    ser.finish()?;
    String::from_utf8(buf).map_err(|_| Error::IoError("XML output is not valid UTF-8".into()))
}

fn io_err(e: std::io::Error) -> Error {
    Error::IoError(e.to_string())
}

#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    writer.write_all(s.as_bytes()).map_err(io_err)
}

/// Gepufferter Start-Tag (Name, xmlns-Deklarationen, Attribute).
#[derive(Debug)]
struct PendingStart {
    name: QName,
    decls: Vec<(Arc<str>, Arc<str>)>,
    attributes: Attributes,
}

/// Streaming XML serializer.
pub struct XmlSerializer<W: Write> {
    writer: W,
    /// In-scope Deklarationen pro offenem Element (prefix, uri).
    scopes: Vec<Vec<(Arc<str>, Arc<str>)>>,
    /// Qualifizierte Namen der offenen Elemente.
    open: Vec<String>,
    /// Angekündigte Prefix-Mappings für den nächsten Start-Tag.
    announced: Vec<(Arc<str>, Arc<str>)>,
    pending: Option<PendingStart>,
    synthetic_ns_counter: usize,
}

impl<W: Write> XmlSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            scopes: Vec::new(),
            open: Vec::new(),
            announced: Vec::new(),
            pending: None,
            synthetic_ns_counter: 0,
        }
    }

    /// Flushes buffered output and returns the writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush_pending(false)?;
        if let Some(name) = self.open.last() {
            return Err(Error::validation(format!("element '{name}' is still open")));
        }
        self.writer.flush().map_err(io_err)?;
        Ok(self.writer)
    }

    fn lookup_prefix<'a>(&'a self, decls: &'a [(Arc<str>, Arc<str>)], uri: &str) -> Option<&'a str> {
        decls
            .iter()
            .chain(self.scopes.iter().rev().flatten())
            .find(|(_, u)| &**u == uri)
            .map(|(p, _)| &**p)
    }

    /// Prefix für `name`: eigener Prefix, sonst ein in-scope gebundener,
    /// sonst eine synthetische Deklaration.
    fn qualify(&mut self, name: &QName, decls: &mut Vec<(Arc<str>, Arc<str>)>, is_attribute: bool) -> String {
        if name.uri.is_empty() {
            return name.local_name.to_string();
        }
        // `xml` ist implizit gebunden und darf nicht umgebunden werden.
        if &*name.uri == XML_NS {
            return format!("xml:{}", name.local_name);
        }
        if let Some(prefix) = &name.prefix {
            if !decls.iter().chain(self.scopes.iter().rev().flatten()).any(|(p, u)| p == prefix && u == &name.uri) {
                decls.push((Arc::clone(prefix), Arc::clone(&name.uri)));
            }
            return format!("{prefix}:{}", name.local_name);
        }
        let found = self
            .lookup_prefix(decls, &name.uri)
            .filter(|p| !(is_attribute && p.is_empty()))
            .map(str::to_string);
        let prefix = match found {
            Some(p) => p,
            None if !is_attribute => {
                decls.push((Arc::from(""), Arc::clone(&name.uri)));
                String::new()
            }
            None => {
                self.synthetic_ns_counter += 1;
                let p = format!("ns{}", self.synthetic_ns_counter);
                decls.push((Arc::from(p.as_str()), Arc::clone(&name.uri)));
                p
            }
        };
        if prefix.is_empty() {
            name.local_name.to_string()
        } else {
            format!("{prefix}:{}", name.local_name)
        }
    }

    /// Schreibt den gepufferten Start-Tag und pusht den Scope.
    fn flush_pending(&mut self, self_closing: bool) -> Result<()> {
        let Some(PendingStart { name, mut decls, attributes }) = self.pending.take() else {
            return Ok(());
        };

        let element = self.qualify(&name, &mut decls, false);
        let mut attrs = Vec::with_capacity(attributes.len());
        for attr in attributes.iter() {
            attrs.push((self.qualify(&attr.name, &mut decls, true), Arc::clone(&attr.value)));
        }

        w(&mut self.writer, "<")?;
        w(&mut self.writer, &element)?;
        for (prefix, uri) in &decls {
            if prefix.is_empty() {
                w(&mut self.writer, " xmlns=\"")?;
            } else {
                w(&mut self.writer, " xmlns:")?;
                w(&mut self.writer, prefix)?;
                w(&mut self.writer, "=\"")?;
            }
            write_escaped_attr(&mut self.writer, uri)?;
            w(&mut self.writer, "\"")?;
        }
        for (qualified, value) in &attrs {
            w(&mut self.writer, " ")?;
            w(&mut self.writer, qualified)?;
            w(&mut self.writer, "=\"")?;
            write_escaped_attr(&mut self.writer, value)?;
            w(&mut self.writer, "\"")?;
        }

        if self_closing {
            w(&mut self.writer, "/>")
        } else {
            w(&mut self.writer, ">")?;
            self.scopes.push(decls);
            self.open.push(element);
            Ok(())
        }
    }
}

impl<W: Write> EventHandler for XmlSerializer<W> {
    fn end_document(&mut self) -> Result<()> {
        self.flush_pending(false)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.flush_pending(false)?;
        self.announced.push((prefix.into(), uri.into()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        self.flush_pending(false)?;
        self.pending = Some(PendingStart {
            name: name.clone(),
            decls: std::mem::take(&mut self.announced),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if self.pending.is_some() {
            return self.flush_pending(true);
        }
        let Some(qualified) = self.open.pop() else {
            return Err(Error::validation(format!("end element '{name}' without open element")));
        };
        self.scopes.pop();
        w(&mut self.writer, "</")?;
        w(&mut self.writer, &qualified)?;
        w(&mut self.writer, ">")
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.flush_pending(false)?;
        write_escaped_text(&mut self.writer, text)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.flush_pending(false)?;
        write_comment(&mut self.writer, text)
    }
}

/// Schreibt einen Kommentar, prueft auf XML-Restriktionen.
fn write_comment(writer: &mut impl Write, text: &str) -> Result<()> {
    if text.contains("--") || text.ends_with('-') {
        return Err(Error::XmlParseError(
            "Kommentar-Text enthaelt '--' oder endet mit '-' (XML 1.0 Section 2.5)".into(),
        ));
    }
    w(writer, "<!--")?;
    w(writer, text)?;
    w(writer, "-->")
}

/// XML-Escaping mit memchr3-SIMD: Sucht drei Zeichen gleichzeitig und ersetzt sie.
/// Grosse Bloecke ohne Escape-Zeichen werden in einem Stueck geschrieben.
fn write_escaped_memchr3(
    w: &mut impl Write,
    s: &str,
    needle: [u8; 3],
    replacement: [&[u8]; 3],
) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        match memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
            Some(offset) => {
                let pos = start + offset;
                if start < pos {
                    w.write_all(&bytes[start..pos]).map_err(io_err)?;
                }
                let idx = needle.iter().position(|&n| n == bytes[pos]).unwrap_or(0);
                w.write_all(replacement[idx]).map_err(io_err)?;
                start = pos + 1;
            }
            None => {
                w.write_all(&bytes[start..]).map_err(io_err)?;
                break;
            }
        }
    }
    Ok(())
}

/// XML-Escaping fuer Text-Inhalt: & < > → &amp; &lt; &gt;
fn write_escaped_text(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'>'], [b"&amp;", b"&lt;", b"&gt;"])
}

/// XML-Escaping fuer Attribut-Werte: & < " → &amp; &lt; &quot;
fn write_escaped_attr(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])
}
