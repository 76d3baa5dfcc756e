//! Streaming SOAP-encoding decoder.
//!
//! [`DecodeEngine`] consumes push-parser callbacks and keeps one
//! [`DecodeFrame`](frame::DecodeFrame) per open element. Per element:
//!
//! 1. `href` → the value comes from the pending table; the element must stay
//!    empty.
//! 2. `xsi:nil` → nil, no content allowed.
//! 3. Wire type: explicit `xsi:type`, array attributes, contextual hint of
//!    the destination slot, an element name in the encoding namespace, else
//!    the registry fallback.
//! 4. The registry entry's factory picks the decoder (scalar, struct,
//!    array, generic).
//!
//! Compound values are owners in the [`resolver`] arena; they complete when
//! closed and every slot is filled, which may happen long after their end
//! tag if a slot waits for a forward reference.
//!
//! Top-level elements: the first one not marked `root="0"` is the result;
//! the others are multi-ref definitions. An untyped definition whose id was
//! not referenced yet is recorded into the [`EventJournal`] and replayed
//! with the referrer's type hint when its first `href` shows up.

pub mod config;
pub(crate) mod frame;
pub(crate) mod resolver;

use std::mem;
use std::rc::Rc;
use std::sync::Arc;

pub use config::{DecoderConfig, NilPolicy};

use crate::array::{convert_components, parse_index, ArrayDescriptor, ArrayTypeDescriptor};
use crate::event::{drive, Attributes, Event, EventHandler};
use crate::journal::EventJournal;
use crate::namespace::NamespacePrefixStack;
use crate::options::SoapVersion;
use crate::qname::{QName, SOAP11_ENC_NS, SOAP12_ENC_NS, XSD_NS, XSI_NS};
use crate::registry::{DecoderFactory, TypeRegistry};
use crate::value::{ArrayValue, StructValue, Value};
use crate::{Error, FastIndexMap, Result};

use frame::{DecodeFrame, ElementDecoder, TypeHint};
use resolver::{Conversion, Delivery, Finished, OwnerKind, ReferenceResolver};

/// Decodes one message from `events`.
///
/// `hint` is the expected wire type of the root value, used when the root
/// element carries no `xsi:type`.
pub fn decode<'e>(
    events: impl IntoIterator<Item = &'e Event>,
    hint: Option<&QName>,
    registry: &TypeRegistry,
    config: &DecoderConfig,
) -> Result<Value> {
    let mut engine = DecodeEngine::new(registry, config.clone());
    if let Some(hint) = hint {
        engine.set_root_hint(hint.clone());
    }
    drive(events, &mut engine)?;
    engine.finish()
}

/// Tokenizes `xml` with the quick-xml adapter and decodes it.
pub fn decode_xml(
    xml: &str,
    hint: Option<&QName>,
    registry: &TypeRegistry,
    config: &DecoderConfig,
) -> Result<Value> {
    let events = crate::xml::parse_events(xml)?;
    decode(&events, hint, registry, config)
}

/// Laufende Aufzeichnung einer zurückgestellten Multi-Ref-Definition.
#[derive(Debug)]
struct Recording {
    id: String,
    start: usize,
    depth: usize,
}

/// Push-driven decode state machine for one message.
///
/// Feed it through [`EventHandler`], then call [`finish`](Self::finish).
pub struct DecodeEngine<'r> {
    registry: &'r TypeRegistry,
    config: DecoderConfig,
    style: &'static str,
    ns: NamespacePrefixStack,
    /// Prefix-Mappings, die vor dem nächsten Start-Tag angekündigt wurden.
    pending_prefixes: Vec<(Arc<str>, Arc<str>)>,
    frames: Vec<DecodeFrame>,
    resolver: ReferenceResolver,
    journal: Rc<EventJournal>,
    /// id → Record-Bereich im Journal.
    deferred: FastIndexMap<String, (usize, usize)>,
    recording: Option<Recording>,
    root_hint: Option<TypeHint>,
    root: Option<Value>,
    root_claimed: bool,
    replay_depth: usize,
    /// Frames, die laufende Replays beiseitegelegt haben.
    outer_depth: usize,
    replay_hint: Option<TypeHint>,
    replay_anchor: Option<QName>,
}

impl<'r> DecodeEngine<'r> {
    pub fn new(registry: &'r TypeRegistry, config: DecoderConfig) -> Self {
        let style = config.soap_version.encoding_ns();
        let resolver = ReferenceResolver::new(config.nil_policy);
        Self {
            registry,
            config,
            style,
            ns: NamespacePrefixStack::new(),
            pending_prefixes: Vec::new(),
            frames: Vec::new(),
            resolver,
            journal: Rc::new(EventJournal::new()),
            deferred: FastIndexMap::default(),
            recording: None,
            root_hint: None,
            root: None,
            root_claimed: false,
            replay_depth: 0,
            outer_depth: 0,
            replay_hint: None,
            replay_anchor: None,
        }
    }

    /// Expected wire type of the root value.
    pub fn set_root_hint(&mut self, wire: QName) {
        self.root_hint = Some(TypeHint::wire(wire));
    }

    /// Journal holding the recorded (deferred) definitions.
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Ends the pass: checks balance, reports dangling references and
    /// returns the root value.
    pub fn finish(self) -> Result<Value> {
        if let Some(frame) = self.frames.last() {
            return Err(Error::validation(format!("document ended inside element '{}'", frame.name)));
        }
        if self.recording.is_some() {
            return Err(Error::validation("document ended inside a multi-ref definition"));
        }
        for id in self.deferred.keys() {
            log::warn!("multi-ref '{id}' was never referenced and has been dropped");
        }
        if let Some(id) = self.resolver.unresolved().first() {
            return Err(Error::DanglingReference((*id).to_string()));
        }
        match self.root {
            Some(value) => Ok(value),
            None if self.root_claimed => Err(Error::validation("root value never completed")),
            None => Err(Error::validation("message has no root element")),
        }
    }

    // ------------------------------------------------------------------------
    // Attribute des Encodings
    // ------------------------------------------------------------------------

    fn enc_attr<'a>(&self, attrs: &'a Attributes, local: &str) -> Option<&'a str> {
        attrs.get(self.style, local)
    }

    fn id_attr(&self, attrs: &Attributes) -> Option<String> {
        let id = match self.config.soap_version {
            SoapVersion::V11 => attrs.get("", "id"),
            SoapVersion::V12 => self.enc_attr(attrs, "id").or_else(|| attrs.get("", "id")),
        };
        id.map(|s| s.trim().to_string())
    }

    fn href_attr(&self, attrs: &Attributes) -> Result<Option<String>> {
        if self.config.soap_version == SoapVersion::V12
            && let Some(r) = self.enc_attr(attrs, "ref")
        {
            let r = r.trim();
            return Ok(Some(r.strip_prefix('#').unwrap_or(r).to_string()));
        }
        match attrs.get("", "href") {
            None => Ok(None),
            Some(href) => match href.trim().strip_prefix('#') {
                Some(id) => Ok(Some(id.to_string())),
                None => Err(Error::validation(format!("external reference '{href}' is not supported"))),
            },
        }
    }

    fn is_nil(attrs: &Attributes) -> bool {
        attrs
            .get(XSI_NS, "nil")
            .is_some_and(|v| matches!(v.trim(), "true" | "1"))
    }

    fn marked_not_root(&self, attrs: &Attributes) -> bool {
        self.enc_attr(attrs, "root")
            .is_some_and(|v| matches!(v.trim(), "0" | "false"))
    }

    fn has_array_attrs(&self, attrs: &Attributes) -> bool {
        match self.config.soap_version {
            SoapVersion::V11 => self.enc_attr(attrs, "arrayType").is_some(),
            SoapVersion::V12 => {
                self.enc_attr(attrs, "itemType").is_some() || self.enc_attr(attrs, "arraySize").is_some()
            }
        }
    }

    fn has_explicit_type(&self, name: &QName, attrs: &Attributes) -> bool {
        attrs.get(XSI_NS, "type").is_some()
            || self.has_array_attrs(attrs)
            || matches!(&*name.uri, SOAP11_ENC_NS | SOAP12_ENC_NS)
    }

    /// xsi:type > Array-Attribute > Kontext-Hint > Elementname im Encoding-NS.
    fn wire_type(&self, name: &QName, attrs: &Attributes, hint: Option<&TypeHint>) -> Result<Option<QName>> {
        if let Some(t) = attrs.get(XSI_NS, "type") {
            return self.ns.resolve(t).map(Some);
        }
        if self.has_array_attrs(attrs) {
            return Ok(Some(self.config.soap_version.array_type_name()));
        }
        if let Some(hint) = hint {
            return Ok(Some(hint.wire.clone()));
        }
        if matches!(&*name.uri, SOAP11_ENC_NS | SOAP12_ENC_NS) {
            return Ok(Some(QName::new(Arc::clone(&name.uri), Arc::clone(&name.local_name))));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------------
    // Element-Start
    // ------------------------------------------------------------------------

    fn start_top_level(&mut self, name: &QName, attrs: &Attributes, prefixes: Vec<(Arc<str>, Arc<str>)>) -> Result<()> {
        let id = self.id_attr(attrs);

        if self.replay_depth > 0 {
            if let Some(anchor) = self.replay_anchor.take()
                && &anchor != name
            {
                return Err(Error::validation(format!(
                    "journal replay out of sync: expected '{anchor}', got '{name}'"
                )));
            }
            let hint = self.replay_hint.take();
            return self.open_element(name, attrs, Delivery::Discard, hint, id);
        }

        if !self.root_claimed && !self.marked_not_root(attrs) {
            self.root_claimed = true;
            let hint = self.root_hint.clone();
            return self.open_element(name, attrs, Delivery::Root, hint, id);
        }

        let hint = id.as_deref().and_then(|id| self.resolver.hint_for(id).cloned());
        if let Some(id) = id.as_deref()
            && hint.is_none()
            && !self.resolver.is_referenced(id)
            && !self.has_explicit_type(name, attrs)
        {
            return self.begin_recording(id, name, attrs, &prefixes);
        }
        self.open_element(name, attrs, Delivery::Discard, hint, id)
    }

    fn begin_recording(
        &mut self,
        id: &str,
        name: &QName,
        attrs: &Attributes,
        prefixes: &[(Arc<str>, Arc<str>)],
    ) -> Result<()> {
        if self.deferred.contains_key(id) || self.resolver.is_defined(id) {
            return Err(Error::validation(format!("duplicate id '{id}'")));
        }
        log::debug!("deferring untyped multi-ref '{id}' until it is referenced");
        let journal = Rc::make_mut(&mut self.journal);
        let start = journal.len();
        journal.mark_current_element(name)?;
        for (prefix, uri) in prefixes {
            journal.start_prefix_mapping(prefix, uri)?;
        }
        journal.start_element(name, attrs)?;
        self.recording = Some(Recording { id: id.to_string(), start, depth: 1 });
        Ok(())
    }

    fn start_child(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        let position_text = self.enc_attr(attrs, "position");
        let id = self.id_attr(attrs);
        let Some(parent) = self.frames.last_mut() else {
            return Err(Error::validation("child element without parent"));
        };
        if parent.nil {
            return Err(Error::validation(format!("nil element '{}' must not have content", parent.name)));
        }

        if let ElementDecoder::Unknown { wire } = &parent.decoder {
            if parent.has_text() {
                return Err(Error::validation(format!("mixed content in '{}'", parent.name)));
            }
            let type_name = wire.clone().filter(|w| !w.is(XSD_NS, "anyType"));
            let owner = self.resolver.open_owner(
                OwnerKind::Struct { type_name, fields: Vec::new() },
                parent.delivery,
                parent.id.take(),
            );
            parent.decoder = ElementDecoder::Struct { owner, layout: None };
        }

        let (target, hint) = match &parent.decoder {
            ElementDecoder::Struct { owner, layout } => {
                let (nillable, hint) = match layout {
                    Some(layout) => match layout.lookup(&name.local_name) {
                        Some((_, field)) => (field.nillable, field.wire_type.clone().map(TypeHint::wire)),
                        None => {
                            return Err(Error::validation(format!(
                                "'{}' is not an accessor of {}",
                                name.local_name, layout.type_name
                            )));
                        }
                    },
                    None => (true, None),
                };
                let plain = QName::new(Arc::clone(&name.uri), Arc::clone(&name.local_name));
                (self.resolver.add_field(*owner, plain, nillable)?, hint)
            }
            ElementDecoder::Array { owner, item_hint } => {
                let position = match position_text {
                    None => None,
                    Some(text) => match parse_index(text)?.as_slice() {
                        [p] => Some(*p),
                        _ => {
                            return Err(Error::validation(format!(
                                "multi-dimensional position '{text}' is not supported"
                            )));
                        }
                    },
                };
                (self.resolver.claim_index(*owner, position)?, item_hint.clone())
            }
            ElementDecoder::Scalar { .. } | ElementDecoder::Unknown { .. } => {
                return Err(Error::validation(format!(
                    "simple-typed element '{}' must not contain child elements",
                    parent.name
                )));
            }
            ElementDecoder::Reference => {
                return Err(Error::validation(format!(
                    "href element '{}' must not have children",
                    parent.name
                )));
            }
        };
        self.open_element(name, attrs, Delivery::Target(target), hint, id)
    }

    fn open_element(
        &mut self,
        name: &QName,
        attrs: &Attributes,
        delivery: Delivery,
        hint: Option<TypeHint>,
        mut id: Option<String>,
    ) -> Result<()> {
        log::trace!("open {name} -> {delivery:?}");
        if let Some(href) = self.href_attr(attrs)? {
            self.frames.push(DecodeFrame::new(name.clone(), ElementDecoder::Reference, delivery, None));
            return self.reference(&href, delivery, hint);
        }
        if Self::is_nil(attrs) {
            let mut frame = DecodeFrame::new(name.clone(), ElementDecoder::Unknown { wire: None }, delivery, id);
            frame.nil = true;
            self.frames.push(frame);
            return Ok(());
        }

        let wire = self.wire_type(name, attrs, hint.as_ref())?;
        let factory = match &wire {
            Some(w) => self.registry.decoder_for(self.style, w)?,
            None => self
                .registry
                .fallback()
                .cloned()
                .ok_or_else(|| Error::unknown_type(format!("untyped element {name}")))?,
        };

        let decoder = match factory {
            DecoderFactory::Scalar(parse) => ElementDecoder::Scalar {
                wire: wire.unwrap_or_else(|| QName::xsd("string")),
                parse,
            },
            DecoderFactory::Struct(layout) => {
                let generic = self.config.soap_version.struct_type_name();
                let type_name = match (&layout, &wire) {
                    (Some(layout), _) => Some(layout.type_name.clone()),
                    (None, Some(w)) if *w != generic => Some(w.clone()),
                    _ => None,
                };
                let owner = self.resolver.open_owner(
                    OwnerKind::Struct { type_name, fields: Vec::new() },
                    delivery,
                    id.take(),
                );
                ElementDecoder::Struct { owner, layout }
            }
            DecoderFactory::Array => {
                let (descriptor, item_hint, conversion) = self.array_setup(attrs, hint.as_ref())?;
                let owner = self.resolver.open_owner(
                    OwnerKind::Array { descriptor, conversion },
                    delivery,
                    id.take(),
                );
                if let Some(offset) = self.enc_attr(attrs, "offset") {
                    match parse_index(offset)?.as_slice() {
                        [o] => self.resolver.set_offset(owner, *o)?,
                        _ => {
                            return Err(Error::validation(format!(
                                "multi-dimensional offset '{offset}' is not supported"
                            )));
                        }
                    }
                }
                ElementDecoder::Array { owner, item_hint }
            }
            DecoderFactory::Any => ElementDecoder::Unknown { wire },
        };
        self.frames.push(DecodeFrame::new(name.clone(), decoder, delivery, id));
        Ok(())
    }

    /// Array-Deskriptor aus den Attributen (oder dem Hint), Item-Hint und
    /// Konvertierungsziel der Komponenten.
    fn array_setup(
        &self,
        attrs: &Attributes,
        hint: Option<&TypeHint>,
    ) -> Result<(ArrayDescriptor, Option<TypeHint>, Option<Conversion>)> {
        let limit = self.config.max_array_len;
        let parsed = match self.config.soap_version {
            SoapVersion::V11 => self
                .enc_attr(attrs, "arrayType")
                .map(|t| ArrayTypeDescriptor::parse_soap11(t, &self.ns))
                .transpose()?,
            SoapVersion::V12 if self.has_array_attrs(attrs) => Some(ArrayTypeDescriptor::parse_soap12(
                self.enc_attr(attrs, "itemType"),
                self.enc_attr(attrs, "arraySize"),
                &self.ns,
            )?),
            SoapVersion::V12 => None,
        };
        let Some(desc) = parsed.or_else(|| hint.and_then(|h| h.array.clone())) else {
            return Ok((ArrayDescriptor::growable(None).with_limit(limit), None, None));
        };

        // Produkt der bekannten Achsen; bei `[,N]` die Zeilenlänge
        let known = desc
            .dimensions
            .iter()
            .flatten()
            .try_fold(1usize, |acc, &l| acc.checked_mul(l))
            .ok_or_else(|| Error::validation("array lengths overflow"))?;
        if known > limit {
            return Err(Error::validation(format!("array length {known} exceeds limit {limit}")));
        }

        let array_type = self.config.soap_version.array_type_name();
        if let Some(component) = desc.component() {
            let item_hint = TypeHint { wire: array_type.clone(), array: Some(component) };
            let descriptor = ArrayDescriptor::new(Some(array_type), desc.dimensions).with_limit(limit);
            return Ok((descriptor, Some(item_hint), None));
        }
        let conversion = self
            .registry
            .lookup_wire(self.style, &desc.item_type)
            .and_then(|entry| match entry.decoder {
                DecoderFactory::Scalar(parse) => Some((entry.shape.clone(), parse)),
                _ => None,
            });
        let item_hint = TypeHint::wire(desc.item_type.clone());
        let descriptor = ArrayDescriptor::new(Some(desc.item_type), desc.dimensions).with_limit(limit);
        Ok((descriptor, Some(item_hint), conversion))
    }

    // ------------------------------------------------------------------------
    // Referenzen
    // ------------------------------------------------------------------------

    fn reference(&mut self, id: &str, delivery: Delivery, hint: Option<TypeHint>) -> Result<()> {
        if let Some(hint) = &hint {
            self.resolver.note_hint(id, hint.clone());
        }
        if self.deferred.contains_key(id) {
            self.replay_deferred(id, hint)?;
        }
        if let Some(value) = self.resolver.reference(id, delivery) {
            self.complete(value, delivery, None)?;
        }
        Ok(())
    }

    /// Decodes a recorded definition now that its contextual type is known.
    fn replay_deferred(&mut self, id: &str, hint: Option<TypeHint>) -> Result<()> {
        if !self.deferred.contains_key(id) {
            return Ok(());
        }
        // Verkettete Replays zählen gegen die Verschachtelungsgrenze
        let outer_depth = self.outer_depth + self.frames.len();
        if outer_depth + self.replay_depth >= self.config.max_depth {
            return Err(Error::validation(format!(
                "multi-ref '{id}' replayed beyond {} nesting levels",
                self.config.max_depth
            )));
        }
        let Some((start, end)) = self.deferred.shift_remove(id) else {
            return Ok(());
        };
        log::debug!("replaying multi-ref '{id}' (journal records {start}..{end})");
        let saved_outer = mem::replace(&mut self.outer_depth, outer_depth);
        let saved_frames = mem::take(&mut self.frames);
        let base = self.ns.base_scope();
        let saved_ns = mem::replace(&mut self.ns, base);
        let saved_prefixes = mem::take(&mut self.pending_prefixes);
        self.replay_depth += 1;
        self.replay_hint = hint;

        let journal = Rc::clone(&self.journal);
        let result = journal.replay_range(start, end, self);

        self.replay_depth -= 1;
        self.outer_depth = saved_outer;
        self.replay_hint = None;
        self.replay_anchor = None;
        self.frames = saved_frames;
        self.ns = saved_ns;
        self.pending_prefixes = saved_prefixes;
        result
    }

    // ------------------------------------------------------------------------
    // Fertigstellung
    // ------------------------------------------------------------------------

    fn close_frame(&mut self, frame: DecodeFrame) -> Result<()> {
        log::trace!("close {}", frame.name);
        if frame.nil {
            if frame.has_text() {
                return Err(Error::validation(format!("nil element '{}' must not have content", frame.name)));
            }
            return self.complete(Value::Nil, frame.delivery, frame.id);
        }
        let has_text = frame.has_text();
        match frame.decoder {
            ElementDecoder::Scalar { wire, parse } => {
                let value = parse(&frame.text, &self.ns).map_err(|err| match err {
                    Error::Conversion(msg) => Error::conversion(format!("{}: {msg} ({wire})", frame.name)),
                    other => other,
                })?;
                self.complete(value, frame.delivery, frame.id)
            }
            ElementDecoder::Struct { owner, .. } | ElementDecoder::Array { owner, .. } => {
                if has_text {
                    return Err(Error::validation(format!("unexpected text in compound '{}'", frame.name)));
                }
                match self.resolver.close(owner)? {
                    Some(done) => self.complete_owner(done),
                    None => Ok(()),
                }
            }
            ElementDecoder::Reference => {
                if has_text {
                    return Err(Error::validation(format!("href element '{}' must be empty", frame.name)));
                }
                Ok(())
            }
            ElementDecoder::Unknown { .. } => self.complete(Value::String(frame.text), frame.delivery, frame.id),
        }
    }

    fn complete_owner(&mut self, done: Finished) -> Result<()> {
        let value = self.materialize(done.kind)?;
        self.complete(value, done.delivery, done.id)
    }

    fn materialize(&self, kind: OwnerKind) -> Result<Value> {
        match kind {
            OwnerKind::Struct { type_name, fields } => {
                let fields = fields
                    .into_iter()
                    .map(|f| (f.name, f.value.unwrap_or(Value::Nil)))
                    .collect();
                Ok(Value::structure(StructValue { type_name, fields }))
            }
            OwnerKind::Array { descriptor, conversion } => {
                let item_type = descriptor.item_type().cloned();
                let (dimensions, items) = descriptor.finish()?;
                let items = match conversion {
                    Some((shape, parse)) => convert_components(
                        items,
                        &shape,
                        parse,
                        &self.ns,
                        self.config.tolerate_null_conversion,
                    )?,
                    None => items,
                };
                Ok(Value::array(ArrayValue { item_type, dimensions, items }))
            }
        }
    }

    /// Delivers a completed value, defines its id and fans it out; owners
    /// completed on the way are delivered in turn.
    fn complete(&mut self, value: Value, delivery: Delivery, id: Option<String>) -> Result<()> {
        let mut work = vec![(value, delivery, id)];
        while let Some((value, delivery, id)) = work.pop() {
            if let Some(id) = id {
                if self.deferred.contains_key(&id) {
                    return Err(Error::validation(format!("duplicate id '{id}'")));
                }
                for waiter in self.resolver.define(&id, value.clone())? {
                    work.push((value.clone(), waiter, None));
                }
            }
            match delivery {
                Delivery::Root => self.root = Some(value),
                Delivery::Discard => {}
                Delivery::Target(target) => {
                    if let Some(done) = self.resolver.fill(target, value)? {
                        let built = self.materialize(done.kind)?;
                        work.push((built, done.delivery, done.id));
                    }
                }
            }
        }
        Ok(())
    }
}

impl EventHandler for DecodeEngine<'_> {
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if self.recording.is_some() {
            return Rc::make_mut(&mut self.journal).start_prefix_mapping(prefix, uri);
        }
        self.pending_prefixes.push((prefix.into(), uri.into()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        if self.recording.is_some() {
            return Rc::make_mut(&mut self.journal).end_prefix_mapping(prefix);
        }
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        if let Some(rec) = &mut self.recording {
            rec.depth += 1;
            return Rc::make_mut(&mut self.journal).start_element(name, attributes);
        }
        if self.outer_depth + self.frames.len() >= self.config.max_depth {
            return Err(Error::validation(format!(
                "element nesting exceeds {} levels",
                self.config.max_depth
            )));
        }
        self.ns.push();
        let prefixes = mem::take(&mut self.pending_prefixes);
        for (prefix, uri) in &prefixes {
            self.ns.add(uri, prefix);
        }
        if self.frames.is_empty() {
            self.start_top_level(name, attributes, prefixes)
        } else {
            self.start_child(name, attributes)
        }
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if let Some(rec) = &mut self.recording {
            rec.depth -= 1;
            let finished = rec.depth == 0;
            let journal = Rc::make_mut(&mut self.journal);
            journal.end_element(name)?;
            if finished {
                let end = journal.len();
                if let Some(rec) = self.recording.take() {
                    self.deferred.insert(rec.id, (rec.start, end));
                }
                self.ns.pop();
            }
            return Ok(());
        }
        let Some(frame) = self.frames.pop() else {
            return Err(Error::validation(format!("unbalanced end element '{name}'")));
        };
        let result = self.close_frame(frame);
        self.ns.pop();
        result
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.recording.is_some() {
            return Rc::make_mut(&mut self.journal).characters(text);
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.text.push_str(text);
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if self.recording.is_some() {
            return Rc::make_mut(&mut self.journal).comment(text);
        }
        Ok(())
    }

    fn set_current_element(&mut self, name: &QName) -> Result<()> {
        if self.replay_depth > 0 {
            self.replay_anchor = Some(name.clone());
        }
        Ok(())
    }
}
