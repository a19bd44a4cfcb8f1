//! Incremental text tracking for streamed items
//!
//! Codex reports the full text of an item on every update. Clients expect
//! only the newly appended part, so each item's last snapshot is kept and
//! compared with the next one.

use std::collections::HashMap;

/// Last seen snapshot per item id
#[derive(Debug, Default)]
pub struct DeltaBuffer {
    snapshots: HashMap<String, String>,
}

impl DeltaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute what `next` adds over the stored snapshot for `key`
    ///
    /// A `None` snapshot yields nothing and leaves the buffer untouched. If
    /// `next` extends the stored value, only the suffix is returned.
    /// Otherwise the backend rewrote the text and the whole of `next` is the
    /// delta. In both cases `next` becomes the stored value.
    pub fn compute(&mut self, key: &str, next: Option<&str>) -> Option<String> {
        let next = next?;
        let previous = self.snapshots.get(key).map(String::as_str).unwrap_or("");

        let delta = match next.strip_prefix(previous) {
            Some(suffix) => suffix.to_string(),
            None => next.to_string(),
        };

        self.snapshots.insert(key.to_string(), next.to_string());
        Some(delta)
    }

    /// Drop the snapshot for a finished item
    pub fn evict(&mut self, key: &str) {
        self.snapshots.remove(key);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
