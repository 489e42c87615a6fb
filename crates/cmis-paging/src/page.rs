use std::fmt;
use std::sync::Arc;

/// One page of a server-side result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total size of the result set, if the repository reported it.
    pub total_num_items: Option<u64>,
    pub has_more_items: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_num_items: Option<u64>, has_more_items: bool) -> Self {
        Self {
            items,
            total_num_items,
            has_more_items,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Some(0), false)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_num_items: self.total_num_items,
            has_more_items: self.has_more_items,
        }
    }
}

type FetchFn<T, E> = dyn Fn(u64, u64) -> Result<Page<T>, E> + Send + Sync;

/// A page fetch function together with its default page size.
///
/// The function receives `(skip_count, max_items)` and must return the page
/// starting at `skip_count`.
pub struct PageFetcher<T, E> {
    fetch: Arc<FetchFn<T, E>>,
    max_items_per_page: u64,
}

impl<T, E> PageFetcher<T, E> {
    pub fn new<F>(max_items_per_page: u64, fetch: F) -> Self
    where
        F: Fn(u64, u64) -> Result<Page<T>, E> + Send + Sync + 'static,
    {
        Self {
            fetch: Arc::new(fetch),
            max_items_per_page: max_items_per_page.max(1),
        }
    }

    pub fn max_items_per_page(&self) -> u64 {
        self.max_items_per_page
    }

    /// Fetch the page starting at `skip_count` with the default page size.
    pub fn fetch_page(&self, skip_count: u64) -> Result<Page<T>, E> {
        self.fetch_page_sized(skip_count, self.max_items_per_page)
    }

    pub fn fetch_page_sized(&self, skip_count: u64, max_items: u64) -> Result<Page<T>, E> {
        (self.fetch)(skip_count, max_items.max(1))
    }
}

impl<T, E> Clone for PageFetcher<T, E> {
    fn clone(&self) -> Self {
        Self {
            fetch: Arc::clone(&self.fetch),
            max_items_per_page: self.max_items_per_page,
        }
    }
}

impl<T, E> fmt::Debug for PageFetcher<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFetcher")
            .field("max_items_per_page", &self.max_items_per_page)
            .finish()
    }
}
