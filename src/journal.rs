//! Replayable event log.
//!
//! Records are flat `(kind, [u32; 4])` pairs; strings, names and attribute
//! lists live in side pools. Replaying a record range re-invokes the
//! [`EventHandler`] callbacks on any consumer, so a recorded subtree can be
//! decoded again later (e.g. once the type hint of a multi-ref definition is
//! known) or rendered as XML.

use std::sync::Arc;

use crate::event::{Attributes, EventHandler};
use crate::qname::QName;
use crate::{Error, FastIndexSet, Result};

/// Closed set of recorded event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    StartDocument,
    EndDocument,
    /// args: prefix, uri
    StartPrefixMapping,
    /// args: prefix
    EndPrefixMapping,
    /// args: uri, local, prefix+1 (0 = none), attribute list
    StartElement,
    /// args: uri, local, prefix+1
    EndElement,
    /// args: text
    Characters,
    /// args: text
    Comment,
    StartCdata,
    EndCdata,
    /// Synthetischer Marker: die folgenden Events gehören zu diesem Element.
    /// args wie EndElement.
    CurrentElement,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    kind: RecordKind,
    args: [u32; 4],
}

/// Append-only event log with optional record limit.
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    records: Vec<Record>,
    strings: FastIndexSet<Arc<str>>,
    attributes: Vec<Attributes>,
    limit: Option<usize>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal refusing to grow beyond `max_records` records.
    pub fn with_limit(max_records: usize) -> Self {
        Self { limit: Some(max_records), ..Self::default() }
    }

    /// Number of records; also the index the next record will get.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.strings.clear();
        self.attributes.clear();
    }

    pub fn kind_at(&self, index: usize) -> Option<RecordKind> {
        self.records.get(index).map(|r| r.kind)
    }

    /// Appends a current-element marker for `name`.
    pub fn mark_current_element(&mut self, name: &QName) -> Result<()> {
        let args = self.name_args(name)?;
        self.push(RecordKind::CurrentElement, args)
    }

    /// Replays every record.
    pub fn replay(&self, handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
        self.replay_range(0, self.records.len(), handler)
    }

    /// Replays records `start..end`. An inverted or out-of-range window is
    /// an error.
    pub fn replay_range(
        &self,
        start: usize,
        end: usize,
        handler: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        if start > end || end > self.records.len() {
            return Err(Error::validation(format!(
                "journal range {start}..{end} invalid for {} records",
                self.records.len()
            )));
        }
        for record in &self.records[start..end] {
            self.dispatch(record, handler)?;
        }
        Ok(())
    }

    fn dispatch(&self, record: &Record, handler: &mut (impl EventHandler + ?Sized)) -> Result<()> {
        let [a, b, c, d] = record.args;
        match record.kind {
            RecordKind::StartDocument => handler.start_document(),
            RecordKind::EndDocument => handler.end_document(),
            RecordKind::StartPrefixMapping => handler.start_prefix_mapping(self.string(a)?, self.string(b)?),
            RecordKind::EndPrefixMapping => handler.end_prefix_mapping(self.string(a)?),
            RecordKind::StartElement => {
                let name = self.name(a, b, c)?;
                let attributes = self
                    .attributes
                    .get(d as usize)
                    .ok_or_else(|| Error::validation("journal attribute index out of range"))?;
                handler.start_element(&name, attributes)
            }
            RecordKind::EndElement => handler.end_element(&self.name(a, b, c)?),
            RecordKind::Characters => handler.characters(self.string(a)?),
            RecordKind::Comment => handler.comment(self.string(a)?),
            RecordKind::StartCdata => handler.start_cdata(),
            RecordKind::EndCdata => handler.end_cdata(),
            RecordKind::CurrentElement => handler.set_current_element(&self.name(a, b, c)?),
        }
    }

    fn push(&mut self, kind: RecordKind, args: [u32; 4]) -> Result<()> {
        if self.limit.is_some_and(|limit| self.records.len() >= limit) {
            return Err(Error::validation(format!(
                "event journal limit of {} records exceeded",
                self.records.len()
            )));
        }
        self.records.push(Record { kind, args });
        Ok(())
    }

    fn intern(&mut self, s: &str) -> Result<u32> {
        let index = match self.strings.get_index_of(s) {
            Some(i) => i,
            None => self.strings.insert_full(Arc::from(s)).0,
        };
        to_arg(index)
    }

    fn string(&self, index: u32) -> Result<&str> {
        self.strings
            .get_index(index as usize)
            .map(|s| &**s)
            .ok_or_else(|| Error::validation("journal string index out of range"))
    }

    fn name_args(&mut self, name: &QName) -> Result<[u32; 4]> {
        let uri = self.intern(&name.uri)?;
        let local = self.intern(&name.local_name)?;
        let prefix = match &name.prefix {
            Some(p) => self.intern(p)? + 1,
            None => 0,
        };
        Ok([uri, local, prefix, 0])
    }

    fn name(&self, uri: u32, local: u32, prefix: u32) -> Result<QName> {
        let uri = self.string(uri)?;
        let local = self.string(local)?;
        Ok(match prefix {
            0 => QName::new(uri, local),
            p => QName::with_prefix(uri, local, self.string(p - 1)?),
        })
    }
}

fn to_arg(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| Error::validation("event journal pool overflow"))
}

impl EventHandler for EventJournal {
    fn start_document(&mut self) -> Result<()> {
        self.push(RecordKind::StartDocument, [0; 4])
    }
    fn end_document(&mut self) -> Result<()> {
        self.push(RecordKind::EndDocument, [0; 4])
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        let args = [self.intern(prefix)?, self.intern(uri)?, 0, 0];
        self.push(RecordKind::StartPrefixMapping, args)
    }
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        let args = [self.intern(prefix)?, 0, 0, 0];
        self.push(RecordKind::EndPrefixMapping, args)
    }
    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        let mut args = self.name_args(name)?;
        args[3] = to_arg(self.attributes.len())?;
        self.push(RecordKind::StartElement, args)?;
        self.attributes.push(attributes.clone());
        Ok(())
    }
    fn end_element(&mut self, name: &QName) -> Result<()> {
        let args = self.name_args(name)?;
        self.push(RecordKind::EndElement, args)
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        let args = [self.intern(text)?, 0, 0, 0];
        self.push(RecordKind::Characters, args)
    }
    fn comment(&mut self, text: &str) -> Result<()> {
        let args = [self.intern(text)?, 0, 0, 0];
        self.push(RecordKind::Comment, args)
    }
    fn start_cdata(&mut self) -> Result<()> {
        self.push(RecordKind::StartCdata, [0; 4])
    }
    fn end_cdata(&mut self) -> Result<()> {
        self.push(RecordKind::EndCdata, [0; 4])
    }
    fn set_current_element(&mut self, name: &QName) -> Result<()> {
        self.mark_current_element(name)
    }
}
