//! Scoped namespace prefix bindings.
//!
//! Bindings live in one flat, grow-on-demand vector; each element scope is a
//! frame marker into it. Lookups scan from the innermost binding outwards and
//! honour shadowing: a prefix rebound closer to the top hides every older
//! binding of the same prefix.

use std::sync::Arc;

use crate::qname::{split_lexical, QName, XML_NS};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    prefix: Arc<str>,
    uri: Arc<str>,
}

/// Push-down stack of prefix ↔ URI bindings tied to element nesting.
#[derive(Debug, Clone)]
pub struct NamespacePrefixStack {
    bindings: Vec<Binding>,
    /// Startindex jedes Frames in `bindings`. Frame 0 ist der Basis-Scope.
    frames: Vec<usize>,
    /// Index der innersten Default-Namespace-Bindung (leerer Prefix).
    current_default: Option<usize>,
}

impl Default for NamespacePrefixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespacePrefixStack {
    /// Stack with the base scope holding the reserved `xml` binding.
    pub fn new() -> Self {
        Self {
            bindings: vec![Binding { prefix: "xml".into(), uri: XML_NS.into() }],
            frames: vec![0],
            current_default: None,
        }
    }

    /// Opens a new (empty) scope.
    pub fn push(&mut self) {
        self.frames.push(self.bindings.len());
    }

    /// Closes the innermost scope. The base scope is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        if let Some(start) = self.frames.pop() {
            self.bindings.truncate(start);
        }
        if self.current_default.is_some_and(|idx| idx >= self.bindings.len()) {
            self.current_default = self.bindings.iter().rposition(|b| b.prefix.is_empty());
        }
    }

    /// Number of open scopes above the base scope.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Binds `prefix` to `uri` in the current scope. A duplicate prefix in
    /// the same scope is overwritten.
    pub fn add(&mut self, uri: &str, prefix: &str) {
        let start = self.frame_start();
        let idx = match self.bindings[start..].iter().position(|b| &*b.prefix == prefix) {
            Some(offset) => {
                let idx = start + offset;
                self.bindings[idx].uri = uri.into();
                idx
            }
            None => {
                self.bindings.push(Binding { prefix: prefix.into(), uri: uri.into() });
                self.bindings.len() - 1
            }
        };
        if prefix.is_empty() {
            self.current_default = Some(idx);
        }
    }

    /// Innermost non-shadowed prefix bound to `uri`.
    ///
    /// With `no_default` the default namespace (empty prefix) is skipped,
    /// e.g. for attribute names and QName-valued attribute content.
    pub fn get_prefix(&self, uri: &str, no_default: bool) -> Option<&str> {
        for (idx, binding) in self.bindings.iter().enumerate().rev() {
            if &*binding.uri != uri {
                continue;
            }
            if no_default && binding.prefix.is_empty() {
                continue;
            }
            if self.is_innermost(idx) {
                return Some(&binding.prefix);
            }
        }
        None
    }

    /// URI currently bound to `prefix`.
    pub fn get_namespace_uri(&self, prefix: &str) -> Option<&str> {
        if prefix.is_empty() {
            return self.current_default.map(|idx| &*self.bindings[idx].uri);
        }
        self.bindings
            .iter()
            .rev()
            .find(|b| &*b.prefix == prefix)
            .map(|b| &*b.uri)
    }

    /// URI of the innermost default namespace, if any.
    pub fn default_uri(&self) -> Option<&str> {
        self.get_namespace_uri("")
    }

    /// Bindings declared in the innermost scope, in declaration order.
    pub fn current_frame(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings[self.frame_start()..]
            .iter()
            .map(|b| (&*b.prefix, &*b.uri))
    }

    /// Resolves a lexical `prefix:local` value (xsi:type, arrayType) to a QName.
    ///
    /// An unprefixed value takes the default namespace, as XML Schema does for
    /// QName-typed content.
    pub fn resolve(&self, lexical: &str) -> Result<QName> {
        let (prefix, local) = split_lexical(lexical.trim());
        if local.is_empty() {
            return Err(Error::parse_syntax(format!("empty QName '{lexical}'")));
        }
        match self.get_namespace_uri(prefix) {
            Some(uri) if prefix.is_empty() => Ok(QName::new(uri, local)),
            Some(uri) => Ok(QName::with_prefix(uri, local, prefix)),
            None if prefix.is_empty() => Ok(QName::local(local)),
            None => Err(Error::UnresolvablePrefix(prefix.to_string())),
        }
    }

    /// Fresh stack carrying only the base scope's bindings.
    ///
    /// Wird für Journal-Replays von Top-Level-Elementen gebraucht: deren
    /// Kontext ist der Basis-Scope, nicht der Scope des Verweisers.
    pub fn base_scope(&self) -> Self {
        let end = self.frames.get(1).copied().unwrap_or(self.bindings.len());
        let bindings = self.bindings[..end].to_vec();
        let current_default = bindings.iter().rposition(|b| b.prefix.is_empty());
        Self { bindings, frames: vec![0], current_default }
    }

    fn frame_start(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    /// Kein späteres Binding mit demselben Prefix verdeckt `idx`.
    fn is_innermost(&self, idx: usize) -> bool {
        let prefix = &self.bindings[idx].prefix;
        !self.bindings[idx + 1..].iter().any(|b| &b.prefix == prefix)
    }
}
