//! Type registry: (encoding style, wire QName) ↔ (value shape).
//!
//! Every [`TypeMappingEntry`] carries an encoder/decoder factory pair. A
//! [`TypeRegistry`] holds one [`TypeMapping`] per encoding style; lookups in
//! an encoded style fall back to the literal scope and then to an optional
//! parent registry.
//!
//! Encode lookups walk [`ValueShape::supertype`] when no exact entry exists.
//! Decode lookups for an unregistered wire type use the generic fallback
//! decoder if the registry has one, otherwise they fail with
//! [`Error::UnknownType`].
//!
//! Registries are built once and then shared (`Arc<TypeRegistry>`); all
//! lookups take `&self`.

pub mod builtin;

use std::sync::Arc;

use crate::namespace::NamespacePrefixStack;
use crate::options::LITERAL_STYLE;
use crate::qname::{QName, XSD_NS};
use crate::value::{Value, ValueShape};
use crate::{Error, FastHashMap, FastIndexMap, Result};

/// Parses the text content of a scalar element.
///
/// Der Namespace-Stack wird für QName-wertigen Inhalt gebraucht.
pub type ScalarParser = fn(&str, &NamespacePrefixStack) -> Result<Value>;

/// Formats a scalar value as element text.
pub type ScalarFormatter = fn(&Value, &NamespacePrefixStack) -> Result<String>;

/// One named accessor of a [`StructLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: QName,
    /// Contextual wire type for the field content (used without `xsi:type`).
    pub wire_type: Option<QName>,
    pub nillable: bool,
}

/// Field layout of a named compound type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub type_name: QName,
    fields: Vec<FieldDef>,
}

impl StructLayout {
    pub fn new(type_name: QName) -> Self {
        Self { type_name, fields: Vec::new() }
    }

    /// Builder: non-nillable field.
    pub fn field(mut self, name: QName, wire_type: Option<QName>) -> Self {
        self.fields.push(FieldDef { name, wire_type, nillable: false });
        self
    }

    /// Builder: nillable field.
    pub fn nillable_field(mut self, name: QName, wire_type: Option<QName>) -> Self {
        self.fields.push(FieldDef { name, wire_type, nillable: true });
        self
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Field by local name. SOAP-encoded accessors are usually unqualified,
    /// so the namespace is not compared.
    pub fn lookup(&self, local_name: &str) -> Option<(usize, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| &*f.name.local_name == local_name)
    }
}

/// Decode-side factory: the closed set of element decoders.
#[derive(Debug, Clone)]
pub enum DecoderFactory {
    Scalar(ScalarParser),
    /// Compound; `None` accepts any accessor names.
    Struct(Option<Arc<StructLayout>>),
    Array,
    /// Generic fallback: struct if children appear, string otherwise.
    Any,
}

/// Encode-side factory.
#[derive(Debug, Clone)]
pub enum EncoderFactory {
    Scalar(ScalarFormatter),
    Struct(Option<Arc<StructLayout>>),
    Array,
}

/// One registered binding of wire type and value shape.
#[derive(Debug, Clone)]
pub struct TypeMappingEntry {
    pub shape: ValueShape,
    pub wire: QName,
    pub encoder: EncoderFactory,
    pub decoder: DecoderFactory,
}

/// Bindings of one encoding style, indexed in both directions.
#[derive(Debug, Clone, Default)]
pub struct TypeMapping {
    encoding_style: Arc<str>,
    by_wire: FastHashMap<QName, Arc<TypeMappingEntry>>,
    by_shape: FastHashMap<ValueShape, Arc<TypeMappingEntry>>,
}

impl TypeMapping {
    pub fn new(encoding_style: &str) -> Self {
        Self { encoding_style: encoding_style.into(), ..Self::default() }
    }

    pub fn encoding_style(&self) -> &str {
        &self.encoding_style
    }

    /// Inserts into both indexes; an existing binding for the same wire type
    /// or shape is overwritten. Returns the entry previously bound to `wire`.
    pub fn register(
        &mut self,
        shape: ValueShape,
        wire: QName,
        encoder: EncoderFactory,
        decoder: DecoderFactory,
    ) -> Option<Arc<TypeMappingEntry>> {
        let entry = Arc::new(TypeMappingEntry { shape: shape.clone(), wire: wire.clone(), encoder, decoder });
        self.by_shape.insert(shape, Arc::clone(&entry));
        self.by_wire.insert(wire, entry)
    }

    /// Decode-only binding: `wire` decodes into `shape`, but encoding a value
    /// of that shape keeps using its primary wire type.
    pub fn register_alias(
        &mut self,
        shape: ValueShape,
        wire: QName,
        encoder: EncoderFactory,
        decoder: DecoderFactory,
    ) -> Option<Arc<TypeMappingEntry>> {
        let entry = Arc::new(TypeMappingEntry { shape, wire: wire.clone(), encoder, decoder });
        self.by_wire.insert(wire, entry)
    }

    pub fn by_wire(&self, wire: &QName) -> Option<&Arc<TypeMappingEntry>> {
        self.by_wire.get(wire)
    }

    pub fn by_shape(&self, shape: &ValueShape) -> Option<&Arc<TypeMappingEntry>> {
        self.by_shape.get(shape)
    }

    pub fn len(&self) -> usize {
        self.by_wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_wire.is_empty()
    }
}

/// Catalog of type mappings per encoding style.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    mappings: FastIndexMap<Arc<str>, TypeMapping>,
    parent: Option<Arc<TypeRegistry>>,
    fallback: Option<DecoderFactory>,
}

impl TypeRegistry {
    /// Empty registry without fallback decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in XSD and SOAP-ENC types and the generic
    /// fallback decoder.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        builtin::register_defaults(&mut registry);
        registry.fallback = Some(DecoderFactory::Any);
        registry
    }

    /// Empty child scope delegating to `parent` on a miss.
    pub fn with_parent(parent: Arc<TypeRegistry>) -> Self {
        Self { parent: Some(parent), ..Self::default() }
    }

    pub fn get_or_create_mapping(&mut self, encoding_style: &str) -> &mut TypeMapping {
        self.mappings
            .entry(Arc::from(encoding_style))
            .or_insert_with(|| TypeMapping::new(encoding_style))
    }

    pub fn mapping(&self, encoding_style: &str) -> Option<&TypeMapping> {
        self.mappings.get(encoding_style)
    }

    /// Registers a binding in the mapping of `encoding_style`.
    pub fn register(
        &mut self,
        encoding_style: &str,
        shape: ValueShape,
        wire: QName,
        encoder: EncoderFactory,
        decoder: DecoderFactory,
    ) -> Option<Arc<TypeMappingEntry>> {
        log::debug!("register {wire} <-> {shape} in style '{encoding_style}'");
        self.get_or_create_mapping(encoding_style)
            .register(shape, wire, encoder, decoder)
    }

    /// Registers a named compound type with its field layout.
    pub fn register_struct(&mut self, encoding_style: &str, layout: StructLayout) {
        let layout = Arc::new(layout);
        let wire = layout.type_name.clone();
        self.register(
            encoding_style,
            ValueShape::Struct(Some(wire.clone())),
            wire,
            EncoderFactory::Struct(Some(Arc::clone(&layout))),
            DecoderFactory::Struct(Some(layout)),
        );
    }

    /// Registers a custom scalar type as a parse/format function pair.
    ///
    /// With `shape` already bound to another wire type the new type becomes
    /// the encode-side default for that shape.
    pub fn register_scalar(
        &mut self,
        encoding_style: &str,
        shape: ValueShape,
        wire: QName,
        parse: ScalarParser,
        format: ScalarFormatter,
    ) {
        self.register(
            encoding_style,
            shape,
            wire,
            EncoderFactory::Scalar(format),
            DecoderFactory::Scalar(parse),
        );
    }

    /// Replaces the decoder used for unregistered wire types.
    pub fn set_fallback(&mut self, fallback: Option<DecoderFactory>) {
        self.fallback = fallback;
    }

    /// Fallback decoder of this scope or the nearest parent having one.
    pub fn fallback(&self) -> Option<&DecoderFactory> {
        match &self.fallback {
            Some(f) => Some(f),
            None => self.parent.as_deref().and_then(TypeRegistry::fallback),
        }
    }

    /// Entry bound to `wire`: style scope, literal scope, then parent.
    pub fn lookup_wire(&self, encoding_style: &str, wire: &QName) -> Option<Arc<TypeMappingEntry>> {
        self.scopes(encoding_style)
            .find_map(|m| m.by_wire(wire))
            .cloned()
            .or_else(|| self.parent.as_deref()?.lookup_wire(encoding_style, wire))
    }

    /// Entry bound exactly to `shape` (no supertype walk).
    pub fn lookup_shape_exact(
        &self,
        encoding_style: &str,
        shape: &ValueShape,
    ) -> Option<Arc<TypeMappingEntry>> {
        self.scopes(encoding_style)
            .find_map(|m| m.by_shape(shape))
            .cloned()
            .or_else(|| self.parent.as_deref()?.lookup_shape_exact(encoding_style, shape))
    }

    /// Encode-side lookup with supertype walk.
    pub fn encoder_for(&self, encoding_style: &str, shape: &ValueShape) -> Result<Arc<TypeMappingEntry>> {
        let mut current = Some(shape.clone());
        while let Some(candidate) = current {
            if let Some(entry) = self.lookup_shape_exact(encoding_style, &candidate) {
                if &candidate != shape {
                    log::trace!("shape {shape} encoded via supertype {candidate}");
                }
                return Ok(entry);
            }
            current = candidate.supertype();
        }
        Err(Error::unknown_type(shape))
    }

    /// Decode-side lookup. `xsd:anyType` always yields the generic decoder.
    pub fn decoder_for(&self, encoding_style: &str, wire: &QName) -> Result<DecoderFactory> {
        if wire.is(XSD_NS, "anyType") {
            return Ok(DecoderFactory::Any);
        }
        if let Some(entry) = self.lookup_wire(encoding_style, wire) {
            return Ok(entry.decoder.clone());
        }
        match self.fallback() {
            Some(fallback) => {
                log::trace!("no decoder for {wire}, using fallback");
                Ok(fallback.clone())
            }
            None => Err(Error::unknown_type(wire)),
        }
    }

    /// Die Mapping-Kette innerhalb dieses Registers: Style-Scope, dann Literal-Scope.
    fn scopes<'a>(&'a self, encoding_style: &str) -> impl Iterator<Item = &'a TypeMapping> {
        let style = self.mappings.get(encoding_style);
        let literal = if encoding_style == LITERAL_STYLE {
            None
        } else {
            self.mappings.get(LITERAL_STYLE)
        };
        style.into_iter().chain(literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::SOAP11_ENC_NS;
    use crate::registry::builtin::{format_string, parse_string};

    #[test]
    fn defaults_cover_xsd_scalars() {
        let reg = TypeRegistry::with_defaults();
        let entry = reg.encoder_for(SOAP11_ENC_NS, &ValueShape::Int).unwrap();
        assert_eq!(entry.wire, QName::xsd("int"));
        assert!(matches!(
            reg.decoder_for(SOAP11_ENC_NS, &QName::xsd("boolean")).unwrap(),
            DecoderFactory::Scalar(_)
        ));
    }

    #[test]
    fn alias_decodes_but_does_not_encode() {
        let reg = TypeRegistry::with_defaults();
        assert!(reg.lookup_wire(SOAP11_ENC_NS, &QName::xsd("hexBinary")).is_some());
        let bytes = reg.encoder_for(SOAP11_ENC_NS, &ValueShape::Bytes).unwrap();
        assert_eq!(bytes.wire, QName::xsd("base64Binary"));
        let enc_string = QName::new(SOAP11_ENC_NS, "string");
        assert!(matches!(
            reg.decoder_for(SOAP11_ENC_NS, &enc_string).unwrap(),
            DecoderFactory::Scalar(_)
        ));
    }

    #[test]
    fn unregistered_wire_type_without_fallback_is_unknown() {
        let mut reg = TypeRegistry::new();
        reg.register_scalar(LITERAL_STYLE, ValueShape::String, QName::xsd("string"), parse_string, format_string);
        let err = reg.decoder_for(SOAP11_ENC_NS, &QName::new("urn:x", "Widget")).unwrap_err();
        assert!(matches!(err, Error::UnknownType(name) if name.contains("Widget")));
    }

    #[test]
    fn unregistered_wire_type_with_fallback_is_generic() {
        let reg = TypeRegistry::with_defaults();
        let f = reg.decoder_for(SOAP11_ENC_NS, &QName::new("urn:x", "Widget")).unwrap();
        assert!(matches!(f, DecoderFactory::Any));
    }

    #[test]
    fn unregistered_shape_is_unknown() {
        let reg = TypeRegistry::new();
        assert!(matches!(reg.encoder_for(SOAP11_ENC_NS, &ValueShape::Int), Err(Error::UnknownType(_))));
    }

    #[test]
    fn supertype_walk_on_encode() {
        let mut reg = TypeRegistry::new();
        reg.register_scalar(
            LITERAL_STYLE,
            ValueShape::Long,
            QName::xsd("long"),
            builtin::parse_long,
            builtin::format_integer,
        );
        let entry = reg.encoder_for(SOAP11_ENC_NS, &ValueShape::Byte).unwrap();
        assert_eq!(entry.wire, QName::xsd("long"));
    }

    #[test]
    fn named_struct_falls_back_to_generic_struct() {
        let reg = TypeRegistry::with_defaults();
        let shape = ValueShape::Struct(Some(QName::new("urn:x", "Person")));
        let entry = reg.encoder_for(SOAP11_ENC_NS, &shape).unwrap();
        assert_eq!(entry.wire, QName::new(SOAP11_ENC_NS, "Struct"));
    }

    #[test]
    fn register_overwrites_both_indexes() {
        let mut reg = TypeRegistry::with_defaults();
        let custom = QName::new("urn:x", "Text");
        reg.register_scalar(SOAP11_ENC_NS, ValueShape::String, custom.clone(), parse_string, format_string);
        assert_eq!(reg.encoder_for(SOAP11_ENC_NS, &ValueShape::String).unwrap().wire, custom);
        // Literal-Scope bleibt unberührt
        assert_eq!(reg.encoder_for(LITERAL_STYLE, &ValueShape::String).unwrap().wire, QName::xsd("string"));
    }

    #[test]
    fn child_registry_delegates_to_parent() {
        let parent = Arc::new(TypeRegistry::with_defaults());
        let mut child = TypeRegistry::with_parent(Arc::clone(&parent));
        child.register_struct(
            SOAP11_ENC_NS,
            StructLayout::new(QName::new("urn:x", "Point"))
                .field(QName::local("x"), Some(QName::xsd("int")))
                .field(QName::local("y"), Some(QName::xsd("int"))),
        );
        assert!(child.lookup_wire(SOAP11_ENC_NS, &QName::xsd("int")).is_some());
        assert!(matches!(child.fallback(), Some(DecoderFactory::Any)));
        assert!(parent.lookup_wire(SOAP11_ENC_NS, &QName::new("urn:x", "Point")).is_none());
        let Ok(DecoderFactory::Struct(Some(layout))) =
            child.decoder_for(SOAP11_ENC_NS, &QName::new("urn:x", "Point"))
        else {
            panic!("expected struct decoder");
        };
        assert_eq!(layout.lookup("y").map(|(i, _)| i), Some(1));
    }

    #[test]
    fn any_type_is_always_generic() {
        let reg = TypeRegistry::new();
        assert!(matches!(reg.decoder_for(SOAP11_ENC_NS, &QName::xsd("anyType")), Ok(DecoderFactory::Any)));
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeRegistry>();

        let reg = Arc::new(TypeRegistry::with_defaults());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|_| reg.encoder_for(SOAP11_ENC_NS, &ValueShape::Double).is_ok())
                        .count()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 100);
        }
    }
}
