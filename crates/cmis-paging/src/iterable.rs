//! Offset-based lazy iterables.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::page::{Page, PageFetcher};

/// A lazy, restartable sequence over a paged result set.
///
/// Iterating fetches pages on demand and yields their items as one logical
/// sequence. Every call to [`ItemIterable::iter`] starts again from the
/// iterable's position, re-invoking the fetch function.
pub struct ItemIterable<T, E> {
    fetcher: PageFetcher<T, E>,
    skip_count: u64,
}

impl<T, E> ItemIterable<T, E> {
    pub fn new(fetcher: PageFetcher<T, E>) -> Self {
        Self {
            fetcher,
            skip_count: 0,
        }
    }

    /// A copy of this iterable positioned at `position`. Nothing is fetched.
    pub fn skip_to(&self, position: u64) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            skip_count: position,
        }
    }

    pub fn position(&self) -> u64 {
        self.skip_count
    }

    /// Fetch exactly one page of at most `max_items` items starting at the
    /// current position.
    pub fn get_page(&self, max_items: u64) -> Result<Page<T>, E> {
        let max_items = max_items.max(1);
        let mut page = self.fetcher.fetch_page_sized(self.skip_count, max_items)?;
        if page.items.len() as u64 > max_items {
            page.items.truncate(max_items as usize);
            page.has_more_items = true;
        }
        Ok(page)
    }

    /// Total size of the result set as reported by the repository.
    ///
    /// Fetches the page at the current position to find out.
    pub fn total_num_items(&self) -> Result<Option<u64>, E> {
        Ok(self.fetcher.fetch_page(self.skip_count)?.total_num_items)
    }

    pub fn iter(&self) -> ItemIter<T, E> {
        ItemIter {
            fetcher: self.fetcher.clone(),
            next_skip: self.skip_count,
            buffer: VecDeque::new(),
            total_num_items: None,
            exhausted: false,
        }
    }
}

impl<T, E> Clone for ItemIterable<T, E> {
    fn clone(&self) -> Self {
        self.skip_to(self.skip_count)
    }
}

impl<T, E> fmt::Debug for ItemIterable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemIterable")
            .field("fetcher", &self.fetcher)
            .field("skip_count", &self.skip_count)
            .finish()
    }
}

impl<'a, T, E> IntoIterator for &'a ItemIterable<T, E> {
    type Item = Result<T, E>;
    type IntoIter = ItemIter<T, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over an [`ItemIterable`]. Stops after the first fetch error.
pub struct ItemIter<T, E> {
    fetcher: PageFetcher<T, E>,
    next_skip: u64,
    buffer: VecDeque<T>,
    total_num_items: Option<u64>,
    exhausted: bool,
}

impl<T, E> ItemIter<T, E> {
    /// Total reported by the most recently fetched page.
    pub fn total_num_items(&self) -> Option<u64> {
        self.total_num_items
    }
}

impl<T, E> Iterator for ItemIter<T, E> {
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            match self.fetcher.fetch_page(self.next_skip) {
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                Ok(page) => {
                    debug!(
                        skip = self.next_skip,
                        items = page.items.len(),
                        has_more = page.has_more_items,
                        "fetched page"
                    );
                    self.total_num_items = page.total_num_items.or(self.total_num_items);
                    if page.items.is_empty() {
                        self.exhausted = true;
                        return None;
                    }
                    self.next_skip += page.items.len() as u64;
                    self.exhausted = !page.has_more_items;
                    self.buffer.extend(page.items);
                }
            }
        }
    }
}
