//! Deferred-value graph.
//!
//! Compound values under construction are *owners* in an arena, addressed
//! by [`OwnerId`]. A child value is delivered to a [`ValueTarget`] (owner +
//! slot); a child that is an `href` registers its target in the pending
//! table under the referenced id and is filled once that id's value
//! completes, regardless of document order. An owner completes when it is
//! closed and has no outstanding slots.

use crate::array::ArrayDescriptor;
use crate::qname::QName;
use crate::registry::ScalarParser;
use crate::value::{Value, ValueShape};
use crate::{Error, FastHashMap, Result};

use super::config::NilPolicy;
use super::frame::TypeHint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OwnerId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Flat row-major array index.
    Index(usize),
    /// Field position in document order.
    Field(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ValueTarget {
    pub(crate) owner: OwnerId,
    pub(crate) slot: Slot,
}

/// Where a completed value goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Target(ValueTarget),
    /// The decode result.
    Root,
    /// Top-level definition: only reachable through its id.
    Discard,
}

#[derive(Debug)]
pub(crate) struct FieldSlot {
    pub(crate) name: QName,
    pub(crate) nillable: bool,
    pub(crate) value: Option<Value>,
}

/// Ziel-Shape und Parser für die Komponenten-Konvertierung eines Arrays.
pub(crate) type Conversion = (ValueShape, ScalarParser);

#[derive(Debug)]
pub(crate) enum OwnerKind {
    Struct {
        type_name: Option<QName>,
        fields: Vec<FieldSlot>,
    },
    Array {
        descriptor: ArrayDescriptor,
        conversion: Option<Conversion>,
    },
}

#[derive(Debug)]
struct Owner {
    /// `None` sobald fertiggestellt.
    kind: Option<OwnerKind>,
    delivery: Delivery,
    id: Option<String>,
    outstanding: usize,
    closed: bool,
}

/// A completed owner, ready to be materialized.
#[derive(Debug)]
pub(crate) struct Finished {
    pub(crate) kind: OwnerKind,
    pub(crate) delivery: Delivery,
    pub(crate) id: Option<String>,
}

#[derive(Debug)]
enum RefEntry {
    Resolved(Value),
    Waiting(Vec<Delivery>),
}

#[derive(Debug)]
pub(crate) struct ReferenceResolver {
    owners: Vec<Owner>,
    table: FastHashMap<String, RefEntry>,
    hints: FastHashMap<String, TypeHint>,
    nil_policy: NilPolicy,
}

impl ReferenceResolver {
    pub(crate) fn new(nil_policy: NilPolicy) -> Self {
        Self {
            owners: Vec::new(),
            table: FastHashMap::default(),
            hints: FastHashMap::default(),
            nil_policy,
        }
    }

    pub(crate) fn open_owner(&mut self, kind: OwnerKind, delivery: Delivery, id: Option<String>) -> OwnerId {
        self.owners.push(Owner { kind: Some(kind), delivery, id, outstanding: 0, closed: false });
        OwnerId(self.owners.len() - 1)
    }

    fn owner_mut(&mut self, owner: OwnerId) -> Result<&mut Owner> {
        self.owners
            .get_mut(owner.0)
            .filter(|o| o.kind.is_some())
            .ok_or_else(|| Error::validation(format!("owner #{} is not active", owner.0)))
    }

    /// Appends an accessor slot to a struct owner.
    pub(crate) fn add_field(&mut self, owner: OwnerId, name: QName, nillable: bool) -> Result<ValueTarget> {
        let o = self.owner_mut(owner)?;
        let Some(OwnerKind::Struct { fields, .. }) = &mut o.kind else {
            return Err(Error::validation("accessor added to a non-struct owner"));
        };
        fields.push(FieldSlot { name, nillable, value: None });
        let slot = Slot::Field(fields.len() - 1);
        o.outstanding += 1;
        Ok(ValueTarget { owner, slot })
    }

    /// Claims the next (or the `position`-addressed) slot of an array owner.
    pub(crate) fn claim_index(&mut self, owner: OwnerId, position: Option<usize>) -> Result<ValueTarget> {
        let o = self.owner_mut(owner)?;
        let Some(OwnerKind::Array { descriptor, .. }) = &mut o.kind else {
            return Err(Error::validation("array item added to a non-array owner"));
        };
        let index = descriptor.claim(position)?;
        o.outstanding += 1;
        Ok(ValueTarget { owner, slot: Slot::Index(index) })
    }

    pub(crate) fn set_offset(&mut self, owner: OwnerId, offset: usize) -> Result<()> {
        match &mut self.owner_mut(owner)?.kind {
            Some(OwnerKind::Array { descriptor, .. }) => descriptor.set_offset(offset),
            _ => Err(Error::validation("offset on a non-array owner")),
        }
    }

    /// Marks the owner's element as closed.
    pub(crate) fn close(&mut self, owner: OwnerId) -> Result<Option<Finished>> {
        let o = self.owner_mut(owner)?;
        o.closed = true;
        Ok(Self::take_if_complete(o))
    }

    /// Delivers `value` into `target`; returns the owner if that completed it.
    pub(crate) fn fill(&mut self, target: ValueTarget, value: Value) -> Result<Option<Finished>> {
        let nil_policy = self.nil_policy;
        let o = self.owner_mut(target.owner)?;
        match (&mut o.kind, target.slot) {
            (Some(OwnerKind::Struct { fields, .. }), Slot::Field(i)) => {
                let field = fields
                    .get_mut(i)
                    .ok_or_else(|| Error::validation(format!("accessor slot {i} does not exist")))?;
                if field.value.is_some() {
                    return Err(Error::validation(format!("accessor '{}' filled twice", field.name)));
                }
                if value.is_nil() && !field.nillable {
                    match nil_policy {
                        NilPolicy::Reject => {
                            return Err(Error::validation(format!(
                                "nil for non-nillable accessor '{}'",
                                field.name
                            )));
                        }
                        NilPolicy::Tolerate => {
                            log::warn!("nil accepted for non-nillable accessor '{}'", field.name);
                        }
                    }
                }
                field.value = Some(value);
            }
            (Some(OwnerKind::Array { descriptor, .. }), Slot::Index(i)) => descriptor.fill(i, value)?,
            _ => return Err(Error::validation("slot does not match its owner")),
        }
        o.outstanding = o.outstanding.saturating_sub(1);
        Ok(Self::take_if_complete(o))
    }

    fn take_if_complete(o: &mut Owner) -> Option<Finished> {
        if !o.closed || o.outstanding > 0 {
            return None;
        }
        let kind = o.kind.take()?;
        Some(Finished { kind, delivery: o.delivery, id: o.id.take() })
    }

    /// Stores the value of `id`; returns every target waiting for it.
    pub(crate) fn define(&mut self, id: &str, value: Value) -> Result<Vec<Delivery>> {
        match self.table.insert(id.to_string(), RefEntry::Resolved(value)) {
            None => Ok(Vec::new()),
            Some(RefEntry::Waiting(waiters)) => {
                log::debug!("multi-ref '{id}' resolved for {} waiting target(s)", waiters.len());
                Ok(waiters)
            }
            Some(RefEntry::Resolved(_)) => Err(Error::validation(format!("duplicate id '{id}'"))),
        }
    }

    /// Resolved value of `id`, or registers `delivery` as waiting for it.
    pub(crate) fn reference(&mut self, id: &str, delivery: Delivery) -> Option<Value> {
        match self.table.get_mut(id) {
            Some(RefEntry::Resolved(value)) => Some(value.clone()),
            Some(RefEntry::Waiting(waiters)) => {
                waiters.push(delivery);
                None
            }
            None => {
                self.table.insert(id.to_string(), RefEntry::Waiting(vec![delivery]));
                None
            }
        }
    }

    pub(crate) fn is_defined(&self, id: &str) -> bool {
        matches!(self.table.get(id), Some(RefEntry::Resolved(_)))
    }

    pub(crate) fn is_referenced(&self, id: &str) -> bool {
        matches!(self.table.get(id), Some(RefEntry::Waiting(_)))
    }

    /// Remembers the referrer's type hint for `id` (first hint wins).
    pub(crate) fn note_hint(&mut self, id: &str, hint: TypeHint) {
        self.hints.entry(id.to_string()).or_insert(hint);
    }

    pub(crate) fn hint_for(&self, id: &str) -> Option<&TypeHint> {
        self.hints.get(id)
    }

    /// Ids still waiting for a definition, sorted.
    pub(crate) fn unresolved(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .table
            .iter()
            .filter(|(_, e)| matches!(e, RefEntry::Waiting(_)))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn struct_owner(r: &mut ReferenceResolver) -> OwnerId {
        r.open_owner(OwnerKind::Struct { type_name: None, fields: Vec::new() }, Delivery::Root, None)
    }

    #[test]
    fn owner_completes_after_close_and_last_fill() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        let o = struct_owner(&mut r);
        let a = r.add_field(o, QName::local("a"), false).unwrap();
        let b = r.add_field(o, QName::local("b"), false).unwrap();
        assert!(r.fill(a, Value::Int(1)).unwrap().is_none());
        assert!(r.close(o).unwrap().is_none());
        let done = r.fill(b, Value::Int(2)).unwrap().expect("complete");
        assert_eq!(done.delivery, Delivery::Root);
        let OwnerKind::Struct { fields, .. } = done.kind else {
            panic!("expected struct owner");
        };
        assert_eq!(fields[1].value, Some(Value::Int(2)));
    }

    #[test]
    fn forward_reference_waits_then_fans_out() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        assert!(r.reference("x", Delivery::Root).is_none());
        assert!(r.reference("x", Delivery::Discard).is_none());
        assert!(r.is_referenced("x"));
        assert_eq!(r.unresolved(), vec!["x"]);
        let waiters = r.define("x", Value::Int(5)).unwrap();
        assert_eq!(waiters, vec![Delivery::Root, Delivery::Discard]);
        assert!(r.unresolved().is_empty());
        assert_eq!(r.reference("x", Delivery::Root), Some(Value::Int(5)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        r.define("x", Value::Int(1)).unwrap();
        assert!(matches!(r.define("x", Value::Int(2)), Err(Error::Validation(_))));
    }

    #[test]
    fn nil_into_non_nillable_slot() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        let o = struct_owner(&mut r);
        let t = r.add_field(o, QName::local("a"), false).unwrap();
        assert!(matches!(r.fill(t, Value::Nil), Err(Error::Validation(_))));

        let mut r = ReferenceResolver::new(NilPolicy::Tolerate);
        let o = struct_owner(&mut r);
        let t = r.add_field(o, QName::local("a"), false).unwrap();
        assert!(r.fill(t, Value::Nil).is_ok());
    }

    #[test]
    fn slot_fires_once() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        let o = struct_owner(&mut r);
        let t = r.add_field(o, QName::local("a"), true).unwrap();
        r.fill(t, Value::Int(1)).unwrap();
        assert!(r.fill(t, Value::Int(2)).is_err());
    }

    #[test]
    fn hints_first_wins() {
        let mut r = ReferenceResolver::new(NilPolicy::Reject);
        r.note_hint("x", TypeHint::wire(QName::xsd("int")));
        r.note_hint("x", TypeHint::wire(QName::xsd("string")));
        assert_eq!(r.hint_for("x").map(|h| h.wire.clone()), Some(QName::xsd("int")));
    }
}
