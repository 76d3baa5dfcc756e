//! soapenc – streaming SOAP-encoding codec (SOAP 1.1 section 5 / SOAP 1.2 part 2)
//!
//! Decodes push-parser events into a native [`Value`] graph and encodes it
//! back: `xsi:type` resolution through a pluggable [`TypeRegistry`],
//! `href`/`id` multi-references in either document order, sparse, offset,
//! multi-dimensional and nested arrays.
//!
//! # Beispiel
//!
//! ```
//! use soapenc::decoder::{decode_xml, DecoderConfig};
//! use soapenc::encoder::{encode_to_xml, EncoderConfig};
//! use soapenc::{QName, TypeRegistry, Value};
//!
//! let registry = TypeRegistry::with_defaults();
//! let xml = r##"<r xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/"
//!                  xmlns:xsd="http://www.w3.org/2001/XMLSchema"
//!                  soapenc:arrayType="xsd:string[4]">
//!     <item soapenc:position="[0]">abc</item>
//!     <item soapenc:position="[2]">def</item>
//! </r>"##;
//!
//! // Decode
//! let value = decode_xml(xml, None, &registry, &DecoderConfig::default()).unwrap();
//! let items = &value.as_array().unwrap().items;
//! assert_eq!(items[2], Value::string("def"));
//! assert!(items[3].is_nil());
//!
//! // Encode
//! let out = encode_to_xml(&QName::local("r"), &value, None, &registry, &EncoderConfig::default()).unwrap();
//! assert!(out.contains(r#"soapenc:arrayType="xsd:string[4]""#));
//! ```

pub mod array;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod event;
pub mod journal;
pub mod namespace;
pub mod options;
pub mod qname;
pub mod registry;
pub mod value;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap mit ahash (schnell, nicht DoS-resistent; nur für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

/// IndexSet mit ahash; Position = stabiler Index (String-Interning im Journal).
pub(crate) type FastIndexSet<K> = indexmap::IndexSet<K, ahash::RandomState>;

// Public API: Events
pub use event::{Attribute, Attributes, Event, EventHandler};
pub use journal::EventJournal;

// Public API: Options
pub use options::{SoapVersion, LITERAL_STYLE};

// Public API: Encoder/Decoder
pub use decoder::{decode, decode_xml, DecodeEngine, DecoderConfig, NilPolicy};
pub use encoder::{encode, encode_mirrored, encode_to_xml, EncoderConfig};

// Public API: Types
pub use namespace::NamespacePrefixStack;
pub use qname::QName;
pub use registry::{DecoderFactory, EncoderFactory, StructLayout, TypeMapping, TypeRegistry};
pub use value::{ArrayValue, StructValue, Value, ValueShape};

// Public API: XML
pub use xml::{emit_events, parse_events};
pub use xml_serializer::{events_to_xml, XmlSerializer};
