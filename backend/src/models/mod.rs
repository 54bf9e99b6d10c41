//! Data models shared across the repository backends and services.

use serde::{Deserialize, Serialize};

/// Wrapper for paginated repository results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items for the requested page, newest-created-first.
    pub items: Vec<T>,
    /// Total number of records matching the filter, independent of paging.
    pub total_items: u64,
    /// `ceil(total_items / limit)`.
    pub total_pages: u64,
    /// The 1-based page that was requested.
    pub current_page: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, current_page: u64, limit: u64) -> Self {
        Self {
            items,
            total_items,
            total_pages: total_pages(total_items, limit),
            current_page,
        }
    }
}

/// Number of pages needed to hold `total_items` at `limit` per page.
pub fn total_pages(total_items: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total_items.div_ceil(limit)
}

pub mod task;
pub mod user;
