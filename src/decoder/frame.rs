use std::sync::Arc;

use crate::array::ArrayTypeDescriptor;
use crate::qname::QName;
use crate::registry::{ScalarParser, StructLayout};

use super::resolver::{Delivery, OwnerId};

/// Contextual type of an element, supplied by its destination slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeHint {
    pub(crate) wire: QName,
    /// Descriptor für Arrays von Arrays (`xsd:int[][3]`): Dimensionssuffix
    /// der Komponente.
    pub(crate) array: Option<ArrayTypeDescriptor>,
}

impl TypeHint {
    pub(crate) fn wire(wire: QName) -> Self {
        Self { wire, array: None }
    }
}

/// Closed set of per-element decoders.
#[derive(Debug)]
pub(super) enum ElementDecoder {
    Scalar {
        wire: QName,
        parse: ScalarParser,
    },
    Struct {
        owner: OwnerId,
        layout: Option<Arc<StructLayout>>,
    },
    Array {
        owner: OwnerId,
        item_hint: Option<TypeHint>,
    },
    /// `href` element: value comes from the pending table, no content.
    Reference,
    /// Generic fallback: string unless children appear, then struct.
    Unknown {
        wire: Option<QName>,
    },
}

/// Transient state of one open element.
#[derive(Debug)]
pub(super) struct DecodeFrame {
    pub(super) name: QName,
    pub(super) decoder: ElementDecoder,
    pub(super) delivery: Delivery,
    /// Eigene id, solange sie nicht an einen Owner übergeben wurde.
    pub(super) id: Option<String>,
    pub(super) nil: bool,
    pub(super) text: String,
}

impl DecodeFrame {
    pub(super) fn new(name: QName, decoder: ElementDecoder, delivery: Delivery, id: Option<String>) -> Self {
        Self { name, decoder, delivery, id, nil: false, text: String::new() }
    }

    pub(super) fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
