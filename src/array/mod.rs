//! Array codec: descriptors, sparse/multi-dimensional decode buffers and
//! the encode-side array-type inference.

pub mod descriptor;
pub(crate) mod encode;

pub use descriptor::{flat_to_multi, multi_to_flat, parse_index, strides, ArrayDescriptor, ArrayTypeDescriptor};

use crate::namespace::NamespacePrefixStack;
use crate::registry::ScalarParser;
use crate::value::{Value, ValueShape};
use crate::{Error, Result};

/// Converts untyped (string) components to the declared scalar item type.
///
/// Runs once every slot is accounted for. With `tolerate_null` a failure on
/// a buffer that contains nils keeps the unconverted items.
pub(crate) fn convert_components(
    items: Vec<Value>,
    target: &ValueShape,
    parse: ScalarParser,
    ns: &NamespacePrefixStack,
    tolerate_null: bool,
) -> Result<Vec<Value>> {
    let needs_conversion = |v: &Value| matches!(v, Value::String(_)) && *target != ValueShape::String;
    if !items.iter().any(needs_conversion) {
        return Ok(items);
    }
    let mut converted = Vec::with_capacity(items.len());
    for item in &items {
        let Value::String(text) = item else {
            converted.push(item.clone());
            continue;
        };
        match parse(text, ns) {
            Ok(value) => converted.push(value),
            Err(err) if tolerate_null && items.iter().any(Value::is_nil) => {
                log::warn!("array components left unconverted ({target}): {err}");
                return Ok(items);
            }
            Err(err) => {
                return Err(Error::conversion(format!("array component to {target}: {err}")));
            }
        }
    }
    Ok(converted)
}
