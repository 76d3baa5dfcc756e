//! Encode-side array layout: component type, dimension suffix and the items
//! to write.
//!
//! Component type: the array's declared `item_type`, else reflected from the
//! items (one common shape → its registry wire type, a common named struct →
//! its name, otherwise `xsd:anyType`). Arrays of arrays with a common
//! component signature collapse into a nested suffix (`xsd:int[][2]`);
//! otherwise the component type is `soapenc:Array` and each item describes
//! itself.

use crate::options::SoapVersion;
use crate::qname::{QName, XSD_NS};
use crate::registry::TypeRegistry;
use crate::value::{ArrayValue, Value, ValueShape};
use crate::{Error, Result};

use super::ArrayTypeDescriptor;

/// How one array goes onto the wire.
#[derive(Debug)]
pub(crate) struct ArrayPlan<'v> {
    /// Written as `arrayType` (SOAP 1.1) or `itemType` + `arraySize`.
    pub(crate) descriptor: ArrayTypeDescriptor,
    /// Row-major items.
    pub(crate) items: Vec<&'v Value>,
    /// Contextual type of each item element; items of a different type carry
    /// their own `xsi:type`.
    pub(crate) item_hint: QName,
}

fn any_type() -> QName {
    QName::new(XSD_NS, "anyType")
}

/// Lays out `array` for output.
///
/// With `enable_2d` a one-dimensional array of equal-length (nonzero)
/// one-dimensional arrays becomes a rank-2 array of their components.
pub(crate) fn plan<'v>(
    array: &'v ArrayValue,
    registry: &TypeRegistry,
    version: SoapVersion,
    enable_2d: bool,
) -> Result<ArrayPlan<'v>> {
    let dimensions = if array.dimensions.is_empty() {
        vec![array.items.len()]
    } else {
        array.dimensions.clone()
    };
    let total = dimensions
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| Error::validation("array lengths overflow"))?;
    if total != array.items.len() {
        return Err(Error::validation(format!(
            "array lengths {dimensions:?} do not match {} items",
            array.items.len()
        )));
    }
    let style = version.encoding_ns();
    let array_type = version.array_type_name();

    if enable_2d
        && dimensions.len() == 1
        && let Some(rows) = equal_rows(&array.items)
    {
        let cols = rows.first().map_or(0, |r| r.items.len());
        let items: Vec<&Value> = rows.iter().copied().flat_map(|r| r.items.iter()).collect();
        let common = rows.first().and_then(|r| r.item_type.clone());
        let item_type = match common {
            Some(t) if rows.iter().all(|r| r.item_type.as_ref() == Some(&t)) => t,
            _ => reflect(items.iter().copied(), registry, style)?,
        };
        log::trace!("encoding {}x{cols} array as rank 2", rows.len());
        return Ok(ArrayPlan {
            descriptor: ArrayTypeDescriptor::new(item_type.clone(), vec![Some(rows.len()), Some(cols)]),
            items,
            item_hint: item_type,
        });
    }

    let dims = dimensions.iter().copied().map(Some).collect::<Vec<_>>();
    let items: Vec<&Value> = array.items.iter().collect();
    let all_arrays = !items.is_empty() && items.iter().all(|v| matches!(v, Value::Array(_)));
    let untyped = array.item_type.as_ref().is_none_or(|t| *t == array_type);

    if all_arrays && untyped {
        let descriptor = match nested_signature(&items, registry, version)? {
            Some((item_type, inner_ranks)) => ArrayTypeDescriptor { item_type, inner_ranks, dimensions: dims },
            None => ArrayTypeDescriptor::new(array_type.clone(), dims),
        };
        return Ok(ArrayPlan { descriptor, items, item_hint: array_type });
    }

    let item_type = match &array.item_type {
        Some(t) => t.clone(),
        None => reflect(items.iter().copied(), registry, style)?,
    };
    Ok(ArrayPlan {
        descriptor: ArrayTypeDescriptor::new(item_type.clone(), dims),
        items,
        item_hint: item_type,
    })
}

/// Gemeinsame Komponenten-Signatur aller inneren Arrays (nur SOAP 1.1 kann
/// sie als Suffix ausdrücken).
fn nested_signature(
    items: &[&Value],
    registry: &TypeRegistry,
    version: SoapVersion,
) -> Result<Option<(QName, Vec<usize>)>> {
    if version != SoapVersion::V11 {
        return Ok(None);
    }
    let mut common: Option<(QName, Vec<usize>)> = None;
    for item in items {
        let Value::Array(inner) = item else {
            return Ok(None);
        };
        let inner_plan = plan(inner, registry, version, false)?;
        let mut ranks = vec![inner_plan.descriptor.rank()];
        ranks.extend(inner_plan.descriptor.inner_ranks);
        let signature = (inner_plan.descriptor.item_type, ranks);
        match &common {
            None => common = Some(signature),
            Some(c) if *c == signature => {}
            Some(_) => return Ok(None),
        }
    }
    Ok(common)
}

/// Alle Items eindimensionale Arrays gleicher Länge > 0.
fn equal_rows(items: &[Value]) -> Option<Vec<&ArrayValue>> {
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let Value::Array(row) = item else {
            return None;
        };
        if row.rank() > 1 || row.is_empty() {
            return None;
        }
        rows.push(&**row);
    }
    let first = rows.first()?.items.len();
    rows.iter().all(|r| r.items.len() == first).then_some(rows)
}

/// Component type from the items' shapes.
fn reflect<'v>(
    items: impl Iterator<Item = &'v Value>,
    registry: &TypeRegistry,
    style: &str,
) -> Result<QName> {
    let mut shapes = items.filter_map(Value::shape);
    let Some(first) = shapes.next() else {
        return Ok(any_type());
    };
    if !shapes.all(|s| s == first) {
        return Ok(any_type());
    }
    match first {
        ValueShape::Struct(Some(name)) => Ok(name),
        shape => Ok(registry.encoder_for(style, &shape)?.wire.clone()),
    }
}

/// Items to write as `(flat index, explicit position)`.
///
/// Sparse output skips nils; an item not directly following the previously
/// written one carries its position.
pub(crate) fn item_slots(items: &[&Value], sparse: bool) -> Vec<(usize, Option<usize>)> {
    if !sparse {
        return (0..items.len()).map(|i| (i, None)).collect();
    }
    let mut next = 0;
    let mut slots = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if item.is_nil() {
            continue;
        }
        slots.push((i, (i != next).then_some(i)));
        next = i + 1;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::SOAP11_ENC_NS;
    use crate::value::StructValue;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_defaults()
    }

    fn ints(values: &[i32]) -> Value {
        Value::array(ArrayValue::from_items(None, values.iter().map(|v| Value::Int(*v)).collect()))
    }

    #[test]
    fn reflects_common_scalar_type() {
        let arr = ArrayValue::from_items(None, vec![Value::Int(1), Value::Nil, Value::Int(3)]);
        let p = plan(&arr, &registry(), SoapVersion::V11, false).unwrap();
        assert_eq!(p.descriptor.item_type, QName::xsd("int"));
        assert_eq!(p.descriptor.to_soap11("xsd:int"), "xsd:int[3]");
        assert_eq!(p.item_hint, QName::xsd("int"));
    }

    #[test]
    fn heterogeneous_or_empty_items_are_any_type() {
        let mixed = ArrayValue::from_items(None, vec![Value::Int(1), Value::string("x")]);
        assert_eq!(plan(&mixed, &registry(), SoapVersion::V11, false).unwrap().item_hint, any_type());
        let empty = ArrayValue::from_items(None, Vec::new());
        let p = plan(&empty, &registry(), SoapVersion::V11, false).unwrap();
        assert_eq!(p.item_hint, any_type());
        assert_eq!(p.descriptor.to_soap11("xsd:anyType"), "xsd:anyType[0]");
    }

    #[test]
    fn declared_item_type_wins() {
        let arr = ArrayValue::from_items(Some(QName::xsd("long")), vec![Value::Int(1)]);
        assert_eq!(plan(&arr, &registry(), SoapVersion::V11, false).unwrap().item_hint, QName::xsd("long"));
    }

    #[test]
    fn named_structs_use_their_type_name() {
        let t = QName::new("urn:t", "Point");
        let s = Value::structure(StructValue::new(Some(t.clone())));
        let arr = ArrayValue::from_items(None, vec![s.clone(), s]);
        assert_eq!(plan(&arr, &registry(), SoapVersion::V11, false).unwrap().item_hint, t);
    }

    #[test]
    fn nested_arrays_collapse_into_suffix() {
        let arr = ArrayValue::from_items(None, vec![ints(&[1, 2]), ints(&[3])]);
        let p = plan(&arr, &registry(), SoapVersion::V11, false).unwrap();
        assert_eq!(p.descriptor.to_soap11("xsd:int"), "xsd:int[][2]");
        assert_eq!(p.item_hint, QName::new(SOAP11_ENC_NS, "Array"));
    }

    #[test]
    fn differing_nested_arrays_descend_one_level() {
        let strings = Value::array(ArrayValue::from_items(None, vec![Value::string("a")]));
        let arr = ArrayValue::from_items(None, vec![ints(&[1]), strings]);
        let p = plan(&arr, &registry(), SoapVersion::V11, false).unwrap();
        assert_eq!(p.descriptor.item_type, QName::new(SOAP11_ENC_NS, "Array"));
        assert!(p.descriptor.inner_ranks.is_empty());
    }

    #[test]
    fn equal_rows_become_two_dimensional() {
        let arr = ArrayValue::from_items(None, vec![ints(&[1, 2, 3]), ints(&[4, 5, 6])]);
        let p = plan(&arr, &registry(), SoapVersion::V11, true).unwrap();
        assert_eq!(p.descriptor.to_soap11("xsd:int"), "xsd:int[2,3]");
        assert_eq!(p.items.len(), 6);
        assert_eq!(*p.items[4], Value::Int(5));

        let ragged = ArrayValue::from_items(None, vec![ints(&[1, 2]), ints(&[3])]);
        let p = plan(&ragged, &registry(), SoapVersion::V11, true).unwrap();
        assert_eq!(p.descriptor.rank(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let arr = ArrayValue { item_type: None, dimensions: vec![2, 2], items: vec![Value::Int(1)] };
        assert!(matches!(plan(&arr, &registry(), SoapVersion::V11, false), Err(Error::Validation(_))));
    }

    #[test]
    fn sparse_slots_skip_nils() {
        let values = [Value::string("a"), Value::Nil, Value::string("b"), Value::string("c"), Value::Nil];
        let items: Vec<&Value> = values.iter().collect();
        assert_eq!(item_slots(&items, true), vec![(0, None), (2, Some(2)), (3, None)]);
        assert_eq!(item_slots(&items, false).len(), 5);

        let leading = [Value::Nil, Value::Int(1)];
        let items: Vec<&Value> = leading.iter().collect();
        assert_eq!(item_slots(&items, true), vec![(1, Some(1))]);
    }
}
