// src/services/page_cache.rs

//! Listing page date-range cache shared by concurrent lookups.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::PageListingEntry;

/// In-memory map from listing page number to the dates it lists.
///
/// Entries are never invalidated during a run; `clear` is called once before
/// a bulk run starts.
#[derive(Debug, Default)]
pub struct PageCache {
    entries: RwLock<HashMap<u32, PageListingEntry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: u32) -> Option<PageListingEntry> {
        self.entries.read().get(&page).cloned()
    }

    /// Store the range for a page. Concurrent misses may race here; both
    /// writers carry the same data.
    pub fn put(&self, page: u32, entry: PageListingEntry) {
        self.entries.write().insert(page, entry);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached page numbers in ascending order.
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.entries.read().keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}
