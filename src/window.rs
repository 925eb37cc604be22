use std::collections::HashSet;
use itertools::Itertools;
use crate::entities::{MediaEntry, MediaId};

/// The contiguous slice `[min_offset, max_offset)` of the collection currently in memory.
///
/// `max_offset` is derived from the entry count, so `max_offset - min_offset == entries.len()`
/// holds by construction. Identifiers are unique.
#[derive(Clone, Debug, Default)]
pub struct LoadedWindow {
    min_offset: usize,
    entries: Vec<MediaEntry>,
    ids: HashSet<MediaId>,
    version: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackwardMerge {
    /// The page lined up with the window start; this many entries were prepended.
    Prepended(usize),
    /// The page did not line up, so it replaced the whole window.
    Replaced,
}

impl LoadedWindow {
    pub fn min_offset(&self) -> usize {
        self.min_offset
    }

    pub fn max_offset(&self) -> usize {
        self.min_offset + self.entries.len()
    }

    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every mutation; used to memoize derived layouts.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn first_id(&self) -> Option<&str> {
        self.entries.first().map(|x| x.id.as_str())
    }

    pub fn clear(&mut self) {
        self.min_offset = 0;
        self.entries.clear();
        self.ids.clear();
        self.version += 1;
    }

    /// Discards everything and installs `page` starting at `offset`.
    pub fn replace(&mut self, offset: usize, page: Vec<MediaEntry>) {
        self.min_offset = offset;
        self.entries.clear();
        self.ids.clear();
        for entry in page {
            if self.ids.insert(entry.id.clone()) {
                self.entries.push(entry);
            }
        }
        self.version += 1;
    }

    /// Appends entries not already present. Returns how many were new.
    pub fn merge_forward(&mut self, page: Vec<MediaEntry>) -> usize {
        let before = self.entries.len();
        for entry in page {
            if self.ids.insert(entry.id.clone()) {
                self.entries.push(entry);
            }
        }
        let added = self.entries.len() - before;
        if added > 0 {
            self.version += 1;
        }
        added
    }

    /// Merges a page fetched at `offset`, which must be below the current window start.
    ///
    /// The page may overlap the head of the window. It is prepended only when exactly the
    /// `min_offset - offset` entries missing in front of the window are new and lead the page;
    /// anything else means the collection shifted upstream and the window is replaced.
    pub fn merge_backward(&mut self, offset: usize, page: Vec<MediaEntry>) -> BackwardMerge {
        let missing = self.min_offset.saturating_sub(offset);
        let new_count = page.iter().take_while(|x| !self.ids.contains(&x.id)).count();
        let lines_up = offset < self.min_offset
            && new_count == missing
            && page[..missing].iter().map(|x| &x.id).all_unique()
            && page[missing..].iter().all(|x| self.ids.contains(&x.id));
        if !lines_up {
            self.replace(offset, page);
            return BackwardMerge::Replaced;
        }

        let mut head = page;
        head.truncate(missing);
        self.ids.extend(head.iter().map(|x| x.id.clone()));
        head.append(&mut self.entries);
        self.entries = head;
        self.min_offset = offset;
        self.version += 1;
        BackwardMerge::Prepended(missing)
    }

    /// Structural check used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        self.ids.len() == self.entries.len()
            && self.entries.iter().all(|x| self.ids.contains(&x.id))
    }
}
