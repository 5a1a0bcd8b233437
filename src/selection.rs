use std::collections::HashMap;

/// Running selection state: which declarations are in the sample and why.
///
/// Invariant: the insertion-ordered id list and the reason map always cover
/// exactly the same declarations; `add` is the only mutator and updates both.
/// Reasons per declaration keep insertion order with duplicates suppressed.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    order: Vec<String>,
    reasons: HashMap<String, Vec<String>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `declaration` with `reason`. Selecting an already-selected
    /// declaration only appends a new distinct reason.
    pub fn add(&mut self, declaration: &str, reason: &str) {
        match self.reasons.get_mut(declaration) {
            Some(list) => {
                if !list.iter().any(|r| r == reason) {
                    list.push(reason.to_string());
                }
            }
            None => {
                self.order.push(declaration.to_string());
                self.reasons
                    .insert(declaration.to_string(), vec![reason.to_string()]);
            }
        }
    }

    pub fn contains(&self, declaration: &str) -> bool {
        self.reasons.contains_key(declaration)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Selected declaration ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn reasons_for(&self, declaration: &str) -> &[String] {
        self.reasons
            .get(declaration)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reasons joined with ", " for report columns.
    pub fn joined_reasons(&self, declaration: &str) -> String {
        self.reasons_for(declaration).join(", ")
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.reasons.clear();
    }
}
