//! SOAP-encoding encoder: value graph → push-parser events.
//!
//! Output goes to any [`EventHandler`], usually an
//! [`XmlSerializer`](crate::xml_serializer::XmlSerializer). Per element:
//!
//! 1. Nil → `xsi:nil="true"`, no content.
//! 2. Compound below the root with multi-refs enabled → `href` to a queued
//!    top-level `multiRef` definition.
//! 3. Registry entry: the declared wire type if its shape matches the value,
//!    else the encode-side lookup with supertype walk.
//! 4. `xsi:type` when the wire type differs from the declared one.
//!
//! Namespace prefixes are allocated per element and announced with
//! `start_prefix_mapping` before the start tag.
//!
//! # Beispiel
//!
//! ```
//! use soapenc::encoder::{encode_to_xml, EncoderConfig};
//! use soapenc::qname::QName;
//! use soapenc::registry::TypeRegistry;
//! use soapenc::value::Value;
//!
//! let registry = TypeRegistry::with_defaults();
//! let xml = encode_to_xml(&QName::local("n"), &Value::Int(7), None, &registry, &EncoderConfig::default()).unwrap();
//! assert!(xml.contains(r#"xsi:type="xsd:int""#));
//! assert!(xml.ends_with(">7</n>"));
//! ```

mod config;

use std::sync::Arc;

pub use config::EncoderConfig;

use crate::array::encode::{item_slots, plan, ArrayPlan};
use crate::event::{Attributes, EventHandler, Tee};
use crate::journal::EventJournal;
use crate::namespace::NamespacePrefixStack;
use crate::options::SoapVersion;
use crate::qname::{QName, XSD_NS, XSI_NS};
use crate::registry::{EncoderFactory, ScalarFormatter, StructLayout, TypeMappingEntry, TypeRegistry};
use crate::value::{ArrayValue, StructValue, Value};
use crate::xml_serializer::XmlSerializer;
use crate::{Error, FastHashMap, Result};

/// Encodes `value` as element `name`, followed by its multi-ref definitions.
///
/// `declared` is the wire type the receiver expects; `xsi:type` is only
/// written when the value's wire type differs from it.
pub fn encode(
    name: &QName,
    value: &Value,
    declared: Option<&QName>,
    registry: &TypeRegistry,
    config: &EncoderConfig,
    sink: &mut (impl EventHandler + ?Sized),
) -> Result<()> {
    let mut encoder = Encoder::new(registry, config);
    sink.start_document()?;
    encoder.write_document(name, value, declared, sink)?;
    sink.end_document()
}

/// Like [`encode`], additionally recording every event into `journal`.
pub fn encode_mirrored(
    name: &QName,
    value: &Value,
    declared: Option<&QName>,
    registry: &TypeRegistry,
    config: &EncoderConfig,
    sink: &mut (impl EventHandler + ?Sized),
    journal: &mut EventJournal,
) -> Result<()> {
    let mut tee = Tee::new(sink, journal);
    encode(name, value, declared, registry, config, &mut tee)
}

/// Encodes into an XML string.
pub fn encode_to_xml(
    name: &QName,
    value: &Value,
    declared: Option<&QName>,
    registry: &TypeRegistry,
    config: &EncoderConfig,
) -> Result<String> {
    let mut serializer = XmlSerializer::new(Vec::new());
    encode(name, value, declared, registry, config, &mut serializer)?;
    let buf = serializer.finish()?;
    String::from_utf8(buf).map_err(|_| Error::IoError("XML output is not valid UTF-8".into()))
}

/// Attributwert, dessen Lexik erst nach der Prefix-Vergabe feststeht.
#[derive(Debug)]
enum AttrValue {
    Text(String),
    /// `prefix:local` plus Suffix (arrayType-Dimensionen).
    QName(QName, String),
}

#[derive(Debug)]
struct PendingAttr {
    name: QName,
    value: AttrValue,
}

/// Element content after the start tag.
enum Content<'v> {
    Empty,
    /// Formatter plus the QName value needing a prefix binding, if any.
    Scalar(ScalarFormatter, Option<QName>),
    Struct(&'v StructValue, Option<Arc<StructLayout>>),
    Items(ArrayPlan<'v>, bool),
}

/// State of one encode pass.
struct Encoder<'r> {
    registry: &'r TypeRegistry,
    config: &'r EncoderConfig,
    style: &'static str,
    ns: NamespacePrefixStack,
    prefix_counter: usize,
    /// Composite identity → multi-ref id.
    ref_ids: FastHashMap<usize, String>,
    /// Queued definitions in id order.
    queue: Vec<(String, Value)>,
}

impl<'r> Encoder<'r> {
    fn new(registry: &'r TypeRegistry, config: &'r EncoderConfig) -> Self {
        Self {
            registry,
            config,
            style: config.soap_version.encoding_ns(),
            ns: NamespacePrefixStack::new(),
            prefix_counter: 0,
            ref_ids: FastHashMap::default(),
            queue: Vec::new(),
        }
    }

    fn enc(&self, local: &str) -> QName {
        QName::new(self.style, local)
    }

    fn write_document(
        &mut self,
        name: &QName,
        value: &Value,
        declared: Option<&QName>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        self.write_element(name, value, declared, Vec::new(), false, sink)?;

        // Definitionen können weitere Referenzen einreihen.
        let mut next = 0;
        while let Some((id, def)) = self.queue.get(next).cloned() {
            next += 1;
            log::debug!("writing multi-ref definition '{id}'");
            let mut extra = vec![PendingAttr { name: self.id_attr_name(), value: AttrValue::Text(id) }];
            if self.config.soap_version == SoapVersion::V11 {
                extra.push(PendingAttr { name: self.enc("root"), value: AttrValue::Text("0".into()) });
            }
            self.write_element(&QName::local("multiRef"), &def, None, extra, false, sink)?;
        }
        Ok(())
    }

    fn id_attr_name(&self) -> QName {
        match self.config.soap_version {
            SoapVersion::V11 => QName::local("id"),
            SoapVersion::V12 => self.enc("id"),
        }
    }

    /// Reference attribute pointing at the definition of `value`.
    fn reference_attr(&mut self, value: &Value, ptr: usize) -> PendingAttr {
        let id = match self.ref_ids.get(&ptr) {
            Some(id) => id.clone(),
            None => {
                let id = format!("id{}", self.ref_ids.len() + 1);
                self.ref_ids.insert(ptr, id.clone());
                self.queue.push((id.clone(), value.clone()));
                id
            }
        };
        match self.config.soap_version {
            SoapVersion::V11 => PendingAttr { name: QName::local("href"), value: AttrValue::Text(format!("#{id}")) },
            SoapVersion::V12 => PendingAttr { name: self.enc("ref"), value: AttrValue::Text(id) },
        }
    }

    /// Registry entry for `value`: declared type first, then by shape.
    fn entry_for(&self, value: &Value, declared: Option<&QName>) -> Result<Arc<TypeMappingEntry>> {
        let Some(shape) = value.shape() else {
            return Err(Error::validation("nil has no wire type"));
        };
        if let Some(declared) = declared
            && let Some(entry) = self.registry.lookup_wire(self.style, declared)
            && entry.shape == shape
        {
            return Ok(entry);
        }
        self.registry.encoder_for(self.style, &shape)
    }

    fn write_element(
        &mut self,
        name: &QName,
        value: &Value,
        declared: Option<&QName>,
        mut attrs: Vec<PendingAttr>,
        allow_ref: bool,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        log::trace!("encode {name}");
        if value.is_nil() {
            attrs.push(PendingAttr { name: QName::xsi("nil"), value: AttrValue::Text("true".into()) });
            return self.emit(name, attrs, value, Content::Empty, sink);
        }
        if allow_ref
            && self.config.send_multi_refs
            && let Some(ptr) = value.composite_ptr()
        {
            let reference = self.reference_attr(value, ptr);
            attrs.push(reference);
            return self.emit(name, attrs, value, Content::Empty, sink);
        }

        let entry = self.entry_for(value, declared)?;
        let wire = match value {
            Value::Struct(s) => s.type_name.clone().unwrap_or_else(|| entry.wire.clone()),
            _ => entry.wire.clone(),
        };
        let is_array = matches!(entry.encoder, EncoderFactory::Array);
        // SOAP 1.2 erkennt Arrays an itemType/arraySize.
        if self.config.send_xsi_types
            && declared != Some(&wire)
            && !(is_array && self.config.soap_version == SoapVersion::V12)
        {
            attrs.push(PendingAttr { name: QName::xsi("type"), value: AttrValue::QName(wire, String::new()) });
        }

        match (&entry.encoder, value) {
            (EncoderFactory::Scalar(format), _) => {
                let content_qname = match value {
                    Value::QName(q) if !q.uri.is_empty() => Some(q.clone()),
                    _ => None,
                };
                self.emit(name, attrs, value, Content::Scalar(*format, content_qname), sink)
            }
            (EncoderFactory::Struct(layout), Value::Struct(s)) => {
                self.emit(name, attrs, value, Content::Struct(s, layout.clone()), sink)
            }
            (EncoderFactory::Array, Value::Array(a)) => self.write_array(name, value, a, attrs, sink),
            _ => Err(Error::validation(format!(
                "registry entry {} cannot encode a {} value",
                entry.wire, entry.shape
            ))),
        }
    }

    fn write_array(
        &mut self,
        name: &QName,
        value: &Value,
        array: &ArrayValue,
        mut attrs: Vec<PendingAttr>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        let layout = plan(array, self.registry, self.config.soap_version, self.config.enable_2d_arrays)?;
        match self.config.soap_version {
            SoapVersion::V11 => {
                let suffix = layout.descriptor.to_soap11("");
                attrs.push(PendingAttr {
                    name: self.enc("arrayType"),
                    value: AttrValue::QName(layout.descriptor.item_type.clone(), suffix),
                });
            }
            SoapVersion::V12 => {
                attrs.push(PendingAttr {
                    name: self.enc("itemType"),
                    value: AttrValue::QName(layout.descriptor.item_type.clone(), String::new()),
                });
                attrs.push(PendingAttr {
                    name: self.enc("arraySize"),
                    value: AttrValue::Text(layout.descriptor.to_array_size()),
                });
            }
        }
        let sparse = self.config.sparse_arrays
            && self.config.soap_version == SoapVersion::V11
            && layout.descriptor.rank() == 1;
        self.emit(name, attrs, value, Content::Items(layout, sparse), sink)
    }

    fn write_struct(
        &mut self,
        value: &StructValue,
        layout: Option<&StructLayout>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        for (field, field_value) in &value.fields {
            let hint = match layout {
                Some(layout) => match layout.lookup(&field.local_name) {
                    Some((_, accessor)) => {
                        if field_value.is_nil() && !accessor.nillable {
                            return Err(Error::validation(format!(
                                "nil for non-nillable accessor '{}' of {}",
                                field.local_name, layout.type_name
                            )));
                        }
                        accessor.wire_type.clone()
                    }
                    None => {
                        return Err(Error::validation(format!(
                            "'{}' is not an accessor of {}",
                            field.local_name, layout.type_name
                        )));
                    }
                },
                None => None,
            };
            self.write_element(field, field_value, hint.as_ref(), Vec::new(), true, sink)?;
        }
        Ok(())
    }

    /// Writes start tag, content and end tag inside a fresh prefix scope.
    fn emit(
        &mut self,
        name: &QName,
        attrs: Vec<PendingAttr>,
        value: &Value,
        content: Content<'_>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        let content_qname = match &content {
            Content::Scalar(_, q) => q.clone(),
            _ => None,
        };
        let declared = self.open(name, &attrs, content_qname.as_ref(), sink)?;
        let result = self.emit_in_scope(name, attrs, value, content, sink);
        self.close(&declared, sink)?;
        result
    }

    fn emit_in_scope(
        &mut self,
        name: &QName,
        attrs: Vec<PendingAttr>,
        value: &Value,
        content: Content<'_>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<()> {
        let qualified = self.finish_start(name, attrs, sink)?;
        match content {
            Content::Empty => {}
            Content::Scalar(format, _) => {
                let text = format(value, &self.ns)?;
                if !text.is_empty() {
                    sink.characters(&text)?;
                }
            }
            Content::Struct(s, layout) => self.write_struct(s, layout.as_deref(), sink)?,
            Content::Items(plan, sparse) => {
                let item_name = QName::local(self.config.item_element.as_str());
                for (index, position) in item_slots(&plan.items, sparse) {
                    let mut item_attrs = Vec::new();
                    if let Some(p) = position {
                        item_attrs.push(PendingAttr {
                            name: self.enc("position"),
                            value: AttrValue::Text(format!("[{p}]")),
                        });
                    }
                    self.write_element(&item_name, plan.items[index], Some(&plan.item_hint), item_attrs, true, sink)?;
                }
            }
        }
        sink.end_element(&qualified)
    }

    // ------------------------------------------------------------------------
    // Prefix-Vergabe
    // ------------------------------------------------------------------------

    /// Opens the element scope and announces every namespace the element
    /// needs. Returns the declared prefixes.
    fn open(
        &mut self,
        name: &QName,
        attrs: &[PendingAttr],
        content_qname: Option<&QName>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<Vec<String>> {
        self.ns.push();
        let mut wanted: Vec<&QName> = vec![name];
        for attr in attrs {
            wanted.push(&attr.name);
            if let AttrValue::QName(q, _) = &attr.value {
                wanted.push(q);
            }
        }
        wanted.extend(content_qname);

        let mut declared = Vec::new();
        for q in wanted {
            if q.uri.is_empty() || self.ns.get_prefix(&q.uri, true).is_some() {
                continue;
            }
            let prefix = self.allocate_prefix(q);
            self.ns.add(&q.uri, &prefix);
            sink.start_prefix_mapping(&prefix, &q.uri)?;
            declared.push(prefix);
        }
        Ok(declared)
    }

    fn allocate_prefix(&mut self, q: &QName) -> String {
        let free = |ns: &NamespacePrefixStack, p: &str| !p.is_empty() && ns.get_namespace_uri(p).is_none();
        if let Some(p) = q.prefix.as_deref()
            && free(&self.ns, p)
            && !p.starts_with("xml")
        {
            return p.to_string();
        }
        let well_known = match &*q.uri {
            XSD_NS => Some("xsd"),
            XSI_NS => Some("xsi"),
            uri if uri == self.style => Some(self.config.soap_version.encoding_prefix()),
            _ => None,
        };
        if let Some(p) = well_known
            && free(&self.ns, p)
        {
            return p.to_string();
        }
        loop {
            self.prefix_counter += 1;
            let p = format!("ns{}", self.prefix_counter);
            if free(&self.ns, &p) {
                return p;
            }
        }
    }

    fn prefixed(&self, q: &QName) -> QName {
        match self.ns.get_prefix(&q.uri, true) {
            Some(p) if !q.uri.is_empty() => q.prefixed(p),
            _ => q.clone(),
        }
    }

    fn lexical(&self, q: &QName) -> Result<String> {
        if q.uri.is_empty() {
            return Ok(q.local_name.to_string());
        }
        match self.ns.get_prefix(&q.uri, true) {
            Some(p) => Ok(format!("{p}:{}", q.local_name)),
            None => Err(Error::UnresolvablePrefix(q.uri.to_string())),
        }
    }

    /// Emits the start tag; returns the prefixed element name for the end tag.
    fn finish_start(
        &self,
        name: &QName,
        attrs: Vec<PendingAttr>,
        sink: &mut (impl EventHandler + ?Sized),
    ) -> Result<QName> {
        let mut attributes = Attributes::new();
        for attr in attrs {
            let value = match attr.value {
                AttrValue::Text(text) => text,
                AttrValue::QName(q, suffix) => self.lexical(&q)? + &suffix,
            };
            attributes.push(self.prefixed(&attr.name), value);
        }
        let qualified = self.prefixed(name);
        sink.start_element(&qualified, &attributes)?;
        Ok(qualified)
    }

    fn close(&mut self, declared: &[String], sink: &mut (impl EventHandler + ?Sized)) -> Result<()> {
        self.ns.pop();
        for prefix in declared.iter().rev() {
            sink.end_prefix_mapping(prefix)?;
        }
        Ok(())
    }
}
