//! Push-parser event model.
//!
//! The codec never reads bytes itself: an external tokenizer (or the
//! quick-xml adapter in [`crate::xml`]) drives an [`EventHandler`] with
//! SAX-style callbacks. Prefix mappings arrive *before* the element that
//! declares them and end *after* it closes.

use std::sync::Arc;

use crate::qname::QName;
use crate::Result;

/// One attribute of a start-element event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: Arc<str>,
}

/// Attribute list of a start-element event.
///
/// Zugriff per (Namespace, local-name) oder per Index, wie ein SAX-`Attributes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: QName, value: impl Into<Arc<str>>) {
        self.items.push(Attribute { name, value: value.into() });
    }

    /// Builder-Variante von [`push`](Self::push).
    pub fn with(mut self, name: QName, value: impl Into<Arc<str>>) -> Self {
        self.push(name, value);
        self
    }

    /// Value of the attribute `{uri}local`, if present.
    pub fn get(&self, uri: &str, local_name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.name.is(uri, local_name))
            .map(|a| &*a.value)
    }

    /// Attribute at `index` in document order.
    pub fn get_index(&self, index: usize) -> Option<&Attribute> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter()
    }
}

/// Callbacks of a push parser. Also the output sink of the encoder.
///
/// Lexical callbacks and the journal's current-element marker default to
/// no-ops, so simple consumers only implement the structural ones.
pub trait EventHandler {
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()>;
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()>;
    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()>;
    fn end_element(&mut self, name: &QName) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn comment(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
    fn start_cdata(&mut self) -> Result<()> {
        Ok(())
    }
    fn end_cdata(&mut self) -> Result<()> {
        Ok(())
    }
    /// Synthetic marker from a journal replay: the following events belong to
    /// the element `name`. Not a real parse event.
    fn set_current_element(&mut self, _name: &QName) -> Result<()> {
        Ok(())
    }
}

/// Owned form of a single callback, for event vectors and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: Arc<str>, uri: Arc<str> },
    EndPrefixMapping { prefix: Arc<str> },
    StartElement { name: QName, attributes: Attributes },
    EndElement { name: QName },
    Characters(Arc<str>),
    Comment(Arc<str>),
    StartCdata,
    EndCdata,
}

impl Event {
    /// Ruft den passenden Callback auf `handler` auf.
    pub fn dispatch(&self, handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
        match self {
            Event::StartDocument => handler.start_document(),
            Event::EndDocument => handler.end_document(),
            Event::StartPrefixMapping { prefix, uri } => handler.start_prefix_mapping(prefix, uri),
            Event::EndPrefixMapping { prefix } => handler.end_prefix_mapping(prefix),
            Event::StartElement { name, attributes } => handler.start_element(name, attributes),
            Event::EndElement { name } => handler.end_element(name),
            Event::Characters(text) => handler.characters(text),
            Event::Comment(text) => handler.comment(text),
            Event::StartCdata => handler.start_cdata(),
            Event::EndCdata => handler.end_cdata(),
        }
    }
}

/// Treibt `handler` mit allen Events aus `events`.
pub fn drive<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    handler: &mut (impl EventHandler + ?Sized),
) -> Result<()> {
    for event in events {
        event.dispatch(handler)?;
    }
    Ok(())
}

/// Collecting sink: every callback is appended as an owned [`Event`].
impl EventHandler for Vec<Event> {
    fn start_document(&mut self) -> Result<()> {
        self.push(Event::StartDocument);
        Ok(())
    }
    fn end_document(&mut self) -> Result<()> {
        self.push(Event::EndDocument);
        Ok(())
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.push(Event::StartPrefixMapping { prefix: prefix.into(), uri: uri.into() });
        Ok(())
    }
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.push(Event::EndPrefixMapping { prefix: prefix.into() });
        Ok(())
    }
    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        self.push(Event::StartElement { name: name.clone(), attributes: attributes.clone() });
        Ok(())
    }
    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.push(Event::EndElement { name: name.clone() });
        Ok(())
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        // Aufeinanderfolgende Zeichenblöcke zusammenfassen
        if let Some(Event::Characters(prev)) = self.last_mut() {
            let mut joined = String::with_capacity(prev.len() + text.len());
            joined.push_str(prev);
            joined.push_str(text);
            *prev = joined.into();
        } else {
            self.push(Event::Characters(text.into()));
        }
        Ok(())
    }
    fn comment(&mut self, text: &str) -> Result<()> {
        self.push(Event::Comment(text.into()));
        Ok(())
    }
    fn start_cdata(&mut self) -> Result<()> {
        self.push(Event::StartCdata);
        Ok(())
    }
    fn end_cdata(&mut self) -> Result<()> {
        self.push(Event::EndCdata);
        Ok(())
    }
}

/// Forwards every callback to two handlers (e.g. a sink plus a journal).
pub struct Tee<'a, A: ?Sized, B: ?Sized> {
    pub first: &'a mut A,
    pub second: &'a mut B,
}

impl<'a, A: EventHandler + ?Sized, B: EventHandler + ?Sized> Tee<'a, A, B> {
    pub fn new(first: &'a mut A, second: &'a mut B) -> Self {
        Self { first, second }
    }
}

impl<A: EventHandler + ?Sized, B: EventHandler + ?Sized> EventHandler for Tee<'_, A, B> {
    fn start_document(&mut self) -> Result<()> {
        self.first.start_document()?;
        self.second.start_document()
    }
    fn end_document(&mut self) -> Result<()> {
        self.first.end_document()?;
        self.second.end_document()
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.first.start_prefix_mapping(prefix, uri)?;
        self.second.start_prefix_mapping(prefix, uri)
    }
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.first.end_prefix_mapping(prefix)?;
        self.second.end_prefix_mapping(prefix)
    }
    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        self.first.start_element(name, attributes)?;
        self.second.start_element(name, attributes)
    }
    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.first.end_element(name)?;
        self.second.end_element(name)
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        self.first.characters(text)?;
        self.second.characters(text)
    }
    fn comment(&mut self, text: &str) -> Result<()> {
        self.first.comment(text)?;
        self.second.comment(text)
    }
    fn start_cdata(&mut self) -> Result<()> {
        self.first.start_cdata()?;
        self.second.start_cdata()
    }
    fn end_cdata(&mut self) -> Result<()> {
        self.first.end_cdata()?;
        self.second.end_cdata()
    }
    fn set_current_element(&mut self, name: &QName) -> Result<()> {
        self.first.set_current_element(name)?;
        self.second.set_current_element(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::XSI_NS;

    #[test]
    fn attribute_lookup_by_name_and_index() {
        let attrs = Attributes::new()
            .with(QName::local("id"), "a1")
            .with(QName::new(XSI_NS, "type"), "xsd:int");
        assert_eq!(attrs.get("", "id"), Some("a1"));
        assert_eq!(attrs.get(XSI_NS, "type"), Some("xsd:int"));
        assert_eq!(attrs.get(XSI_NS, "nil"), None);
        assert_eq!(attrs.get_index(1).map(|a| &*a.name.local_name), Some("type"));
        assert!(attrs.get_index(2).is_none());
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn vec_sink_coalesces_characters() {
        let mut sink: Vec<Event> = Vec::new();
        sink.characters("ab").unwrap();
        sink.characters("cd").unwrap();
        assert_eq!(sink, vec![Event::Characters("abcd".into())]);
    }

    #[test]
    fn dispatch_round_trips_through_vec_sink() {
        let events = vec![
            Event::StartPrefixMapping { prefix: "p".into(), uri: "urn:p".into() },
            Event::StartElement { name: QName::with_prefix("urn:p", "a", "p"), attributes: Attributes::new() },
            Event::Characters("x".into()),
            Event::EndElement { name: QName::with_prefix("urn:p", "a", "p") },
            Event::EndPrefixMapping { prefix: "p".into() },
        ];
        let mut sink: Vec<Event> = Vec::new();
        drive(&events, &mut sink).unwrap();
        assert_eq!(sink, events);
    }

    #[test]
    fn tee_feeds_both_handlers() {
        let mut a: Vec<Event> = Vec::new();
        let mut b: Vec<Event> = Vec::new();
        {
            let mut tee = Tee::new(&mut a, &mut b);
            tee.start_element(&QName::local("x"), &Attributes::new()).unwrap();
            tee.end_element(&QName::local("x")).unwrap();
        }
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }
}
