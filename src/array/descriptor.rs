//! Array-type descriptors and the decode-side array buffer.
//!
//! Wire syntax:
//!
//! | SOAP | Attribute(s)                               | Example            |
//! |------|--------------------------------------------|--------------------|
//! | 1.1  | `soapenc:arrayType`                        | `xsd:int[][2,3]`   |
//! | 1.2  | `enc:itemType` + `enc:arraySize`           | `xsd:int` + `* 3`  |
//! | 1.1  | `soapenc:offset` (array), `position` (item) | `[2]`             |

use std::fmt::Write as _;

use crate::namespace::NamespacePrefixStack;
use crate::qname::{QName, XSD_NS};
use crate::value::Value;
use crate::{Error, Result};

// ============================================================================
// Index-Arithmetik (row-major)
// ============================================================================

/// Row-major strides: `stride[i] = product(lengths[i+1..])`.
pub fn strides(lengths: &[usize]) -> Vec<usize> {
    let mut out = vec![1usize; lengths.len()];
    for i in (0..lengths.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1].saturating_mul(lengths[i + 1]);
    }
    out
}

/// Multi-dimensional index → flat offset.
pub fn multi_to_flat(index: &[usize], lengths: &[usize]) -> Result<usize> {
    if index.len() != lengths.len() {
        return Err(Error::validation(format!(
            "index rank {} does not match array rank {}",
            index.len(),
            lengths.len()
        )));
    }
    let mut flat = 0usize;
    for ((&i, &len), stride) in index.iter().zip(lengths).zip(strides(lengths)) {
        if i >= len {
            return Err(Error::validation(format!("index {i} out of range for axis length {len}")));
        }
        flat = i
            .checked_mul(stride)
            .and_then(|offset| flat.checked_add(offset))
            .ok_or_else(|| Error::validation(format!("index {index:?} overflows for {lengths:?}")))?;
    }
    Ok(flat)
}

/// Flat offset → multi-dimensional index.
pub fn flat_to_multi(flat: usize, lengths: &[usize]) -> Result<Vec<usize>> {
    let total = lengths.iter().try_fold(1usize, |acc, &l| acc.checked_mul(l));
    if total.is_none_or(|t| flat >= t) {
        return Err(Error::validation(format!("flat index {flat} out of range for {lengths:?}")));
    }
    let mut rest = flat;
    Ok(strides(lengths)
        .into_iter()
        .map(|stride| {
            let i = rest / stride;
            rest %= stride;
            i
        })
        .collect())
}

// ============================================================================
// Array-Type-Deskriptor
// ============================================================================

/// Parsed array type: component type, nested-array ranks and the lengths of
/// this array.
///
/// `xsd:int[][2,3]` yields `item_type = xsd:int`, `inner_ranks = [1]`,
/// `dimensions = [Some(2), Some(3)]`: a 2×3 array whose components are
/// one-dimensional int arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayTypeDescriptor {
    pub item_type: QName,
    /// Ranks of the nested array levels, outermost first.
    pub inner_ranks: Vec<usize>,
    /// Per-axis lengths; `None` is an unspecified length.
    pub dimensions: Vec<Option<usize>>,
}

impl ArrayTypeDescriptor {
    pub fn new(item_type: QName, dimensions: Vec<Option<usize>>) -> Self {
        Self { item_type, inner_ranks: Vec::new(), dimensions }
    }

    /// Parses a SOAP 1.1 `arrayType` value (`xsd:string[2]`, `xsd:int[][3]`).
    pub fn parse_soap11(lexical: &str, ns: &NamespacePrefixStack) -> Result<Self> {
        let lexical = lexical.trim();
        let Some(open) = lexical.find('[') else {
            return Err(Error::parse_syntax(format!("arrayType '{lexical}' has no dimension")));
        };
        let item_type = ns.resolve(&lexical[..open])?;
        let mut groups = parse_groups(&lexical[open..])?;
        // parse_groups liefert mindestens eine Gruppe
        let dimensions = groups.pop().unwrap_or_default();
        let mut inner_ranks = Vec::with_capacity(groups.len());
        for group in groups {
            if group.iter().any(Option::is_some) {
                return Err(Error::parse_syntax(format!(
                    "arrayType '{lexical}': nested rank must not carry lengths"
                )));
            }
            inner_ranks.push(group.len());
        }
        Ok(Self { item_type, inner_ranks, dimensions })
    }

    /// Parses SOAP 1.2 `itemType` and `arraySize` (`"2 3"`, `"* 3"`).
    ///
    /// A missing `itemType` means `xsd:anyType`; a missing `arraySize` a
    /// one-dimensional array of unspecified length.
    pub fn parse_soap12(
        item_type: Option<&str>,
        array_size: Option<&str>,
        ns: &NamespacePrefixStack,
    ) -> Result<Self> {
        let item_type = match item_type {
            Some(t) => ns.resolve(t)?,
            None => QName::new(XSD_NS, "anyType"),
        };
        let dimensions = match array_size {
            None => vec![None],
            Some(size) => {
                let mut dims = Vec::new();
                for (i, token) in size.split_ascii_whitespace().enumerate() {
                    if token == "*" {
                        if i != 0 {
                            return Err(Error::parse_syntax(format!(
                                "arraySize '{size}': '*' only allowed as first length"
                            )));
                        }
                        dims.push(None);
                    } else {
                        dims.push(Some(parse_length(token, size)?));
                    }
                }
                if dims.is_empty() {
                    return Err(Error::parse_syntax("empty arraySize"));
                }
                dims
            }
        };
        Ok(Self::new(item_type, dimensions))
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Total slot count when every length is known.
    pub fn known_len(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .try_fold(1usize, |acc, d| d.and_then(|d| acc.checked_mul(d)))
    }

    /// Descriptor of a component when the components are arrays themselves.
    pub fn component(&self) -> Option<ArrayTypeDescriptor> {
        let (&rank, rest) = self.inner_ranks.split_first()?;
        Some(Self {
            item_type: self.item_type.clone(),
            inner_ranks: rest.to_vec(),
            dimensions: vec![None; rank],
        })
    }

    /// SOAP 1.1 `arrayType` text, with `item_type` written as `item_lexical`.
    pub fn to_soap11(&self, item_lexical: &str) -> String {
        let mut out = String::from(item_lexical);
        for &rank in &self.inner_ranks {
            out.push('[');
            for _ in 1..rank {
                out.push(',');
            }
            out.push(']');
        }
        out.push('[');
        for (i, d) in self.dimensions.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if let Some(d) = d {
                let _ = write!(out, "{d}");
            }
        }
        out.push(']');
        out
    }

    /// SOAP 1.2 `arraySize` text.
    pub fn to_array_size(&self) -> String {
        self.dimensions
            .iter()
            .map(|d| d.map_or_else(|| "*".to_string(), |d| d.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn parse_length(token: &str, context: &str) -> Result<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse_syntax(format!("bad array length '{token}' in '{context}'")));
    }
    token
        .parse()
        .map_err(|_| Error::parse_syntax(format!("array length '{token}' too large")))
}

/// Zerlegt `[..][..]` in Gruppen; leere Einträge sind unbekannte Längen.
fn parse_groups(text: &str) -> Result<Vec<Vec<Option<usize>>>> {
    let mut groups = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some(body) = rest.strip_prefix('[') else {
            return Err(Error::parse_syntax(format!("unexpected '{rest}' in dimension")));
        };
        let Some(close) = body.find(']') else {
            return Err(Error::parse_syntax(format!("unterminated dimension '{text}'")));
        };
        let mut group = Vec::new();
        for part in body[..close].split(',') {
            let part = part.trim();
            group.push(if part.is_empty() { None } else { Some(parse_length(part, text)?) });
        }
        groups.push(group);
        rest = &body[close + 1..];
    }
    if groups.is_empty() {
        return Err(Error::parse_syntax(format!("missing dimension in '{text}'")));
    }
    Ok(groups)
}

/// Parses an `offset` or `position` value such as `[2]` or `[1,2]`.
pub fn parse_index(text: &str) -> Result<Vec<usize>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .ok_or_else(|| Error::parse_syntax(format!("malformed index '{text}'")))?;
    body.split(',').map(|part| parse_length(part.trim(), text)).collect()
}

// ============================================================================
// Decode-Puffer
// ============================================================================

#[derive(Debug)]
enum SlotState {
    Empty,
    /// Von einem Kind-Element belegt, Wert steht noch aus (href).
    Pending,
    Filled(Value),
}

/// Fill state of one array being decoded.
///
/// Slots are claimed in document order (or at an explicit `position`) and
/// filled once, possibly later through a reference. Unclaimed slots become
/// [`Value::Nil`] when the array is materialized.
#[derive(Debug)]
pub struct ArrayDescriptor {
    item_type: Option<QName>,
    dimensions: Vec<Option<usize>>,
    capacity: Option<usize>,
    slots: Vec<SlotState>,
    cursor: usize,
    sparse: bool,
    /// Obergrenze für Slot-Indizes, auch ohne deklarierte Länge.
    limit: usize,
}

impl ArrayDescriptor {
    pub fn new(item_type: Option<QName>, dimensions: Vec<Option<usize>>) -> Self {
        let capacity = dimensions
            .iter()
            .try_fold(1usize, |acc, d| d.and_then(|d| acc.checked_mul(d)));
        Self {
            item_type,
            dimensions,
            capacity,
            slots: Vec::new(),
            cursor: 0,
            sparse: false,
            limit: usize::MAX,
        }
    }

    /// Caps the slot count: claiming an index at or beyond `limit` fails.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Append-only buffer for an array without descriptor.
    pub fn growable(item_type: Option<QName>) -> Self {
        Self::new(item_type, vec![None])
    }

    pub fn item_type(&self) -> Option<&QName> {
        self.item_type.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// True once any item used an explicit `position`.
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Moves the write cursor (`soapenc:offset`).
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if let Some(cap) = self.capacity
            && offset > cap
        {
            return Err(Error::validation(format!("array offset [{offset}] beyond length {cap}")));
        }
        if offset > self.limit {
            return Err(Error::validation(format!("array offset [{offset}] exceeds limit {}", self.limit)));
        }
        self.cursor = offset;
        Ok(())
    }

    /// Claims the slot for the next item: at `position` if given, else at
    /// the cursor. Returns the flat index.
    pub fn claim(&mut self, position: Option<usize>) -> Result<usize> {
        let index = match position {
            Some(p) => {
                self.sparse = true;
                p
            }
            None => self.cursor,
        };
        if let Some(cap) = self.capacity
            && index >= cap
        {
            return Err(Error::validation(format!(
                "array position [{index}] out of bounds (length {cap})"
            )));
        }
        if index >= self.limit {
            return Err(Error::validation(format!(
                "array position [{index}] exceeds limit {}",
                self.limit
            )));
        }
        if index >= self.slots.len() {
            let len = index
                .checked_add(1)
                .ok_or_else(|| Error::validation(format!("array position [{index}] overflows")))?;
            self.slots.resize_with(len, || SlotState::Empty);
        }
        if !matches!(self.slots[index], SlotState::Empty) {
            return Err(Error::validation(format!("array slot [{index}] filled twice")));
        }
        self.slots[index] = SlotState::Pending;
        self.cursor = index + 1;
        Ok(index)
    }

    /// Stores the value of a claimed slot.
    pub fn fill(&mut self, index: usize, value: Value) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot @ SlotState::Pending) => {
                *slot = SlotState::Filled(value);
                Ok(())
            }
            Some(SlotState::Filled(_)) => {
                Err(Error::validation(format!("array slot [{index}] filled twice")))
            }
            _ => Err(Error::validation(format!("array slot [{index}] was never claimed"))),
        }
    }

    /// Final lengths and row-major items. An unspecified first length is
    /// `ceil(count / product(rest))`.
    pub fn finish(self) -> Result<(Vec<usize>, Vec<Value>)> {
        let count = self.slots.len();
        let lengths: Vec<usize> = match self.capacity {
            Some(_) => self.dimensions.iter().map(|d| d.unwrap_or(0)).collect(),
            None => match self.dimensions.as_slice() {
                [None, rest @ ..] if rest.iter().all(Option::is_some) => {
                    let rest: Vec<usize> = rest.iter().flatten().copied().collect();
                    let inner = rest
                        .iter()
                        .try_fold(1usize, |acc, &l| acc.checked_mul(l))
                        .ok_or_else(|| Error::validation("array lengths overflow"))?;
                    let outer = if inner == 0 { 0 } else { count.div_ceil(inner) };
                    std::iter::once(outer).chain(rest).collect()
                }
                _ => {
                    return Err(Error::validation(format!(
                        "cannot infer array lengths from {:?}",
                        self.dimensions
                    )));
                }
            },
        };
        let total = lengths
            .iter()
            .try_fold(1usize, |acc, &l| acc.checked_mul(l))
            .ok_or_else(|| Error::validation("array lengths overflow"))?;
        if total > self.limit {
            return Err(Error::validation(format!("array length {total} exceeds limit {}", self.limit)));
        }
        let mut slots = self.slots;
        slots.resize_with(total, || SlotState::Empty);
        let items = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                SlotState::Empty => Ok(Value::Nil),
                SlotState::Filled(v) => Ok(v),
                SlotState::Pending => Err(Error::validation(format!("array slot [{i}] unresolved"))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((lengths, items))
    }
}
