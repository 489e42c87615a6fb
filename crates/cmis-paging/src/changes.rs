//! Change-log iteration.
//!
//! The change log continues by token or link rather than by offset. Each
//! page after the first starts with the last event of the previous page,
//! which is dropped here so consumers see every event once. Those pages are
//! requested one item larger, so each still adds a full page of new events.
//! When a page carries both a token and a link, the token wins.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::PagingError;
use crate::page::Page;

/// Where the next change-log request continues from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeCursor {
    /// First request, optionally from a previously saved token.
    Start(Option<String>),
    Token(String),
    Link(String),
}

/// One page of change events plus its continuation handles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangePage<T> {
    pub items: Vec<T>,
    pub total_num_items: Option<u64>,
    pub has_more_items: bool,
    pub latest_token: Option<String>,
    pub next_link: Option<String>,
}

impl<T> ChangePage<T> {
    fn next_cursor(&self) -> Option<ChangeCursor> {
        self.latest_token
            .clone()
            .map(ChangeCursor::Token)
            .or_else(|| self.next_link.clone().map(ChangeCursor::Link))
    }
}

type ChangeFetchFn<T, E> = dyn Fn(&ChangeCursor, u64) -> Result<ChangePage<T>, E> + Send + Sync;

/// A forward-only, restartable sequence over the change log.
pub struct ChangeLogIterable<T, E> {
    fetch: Arc<ChangeFetchFn<T, E>>,
    start_token: Option<String>,
    max_items_per_page: u64,
}

impl<T, E> ChangeLogIterable<T, E> {
    pub fn new<F>(start_token: Option<String>, max_items_per_page: u64, fetch: F) -> Self
    where
        F: Fn(&ChangeCursor, u64) -> Result<ChangePage<T>, E> + Send + Sync + 'static,
    {
        Self {
            fetch: Arc::new(fetch),
            start_token,
            max_items_per_page: max_items_per_page.max(1),
        }
    }

    pub fn start_token(&self) -> Option<&str> {
        self.start_token.as_deref()
    }

    pub fn iter(&self) -> ChangeLogIter<T, E> {
        ChangeLogIter {
            fetch: Arc::clone(&self.fetch),
            max_items_per_page: self.max_items_per_page,
            cursor: Some(ChangeCursor::Start(self.start_token.clone())),
            first_page: true,
            buffer: VecDeque::new(),
            latest_token: self.start_token.clone(),
        }
    }

    /// The change log cannot seek.
    pub fn skip_to(&self, _position: u64) -> Result<Self, E>
    where
        E: From<PagingError>,
    {
        Err(PagingError::NotSupported("skip_to on the change log").into())
    }

    /// The change log cannot be read one page at an offset.
    pub fn get_page(&self, _max_items: u64) -> Result<Page<T>, E>
    where
        E: From<PagingError>,
    {
        Err(PagingError::NotSupported("get_page on the change log").into())
    }
}

impl<T, E> fmt::Debug for ChangeLogIterable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeLogIterable")
            .field("start_token", &self.start_token)
            .field("max_items_per_page", &self.max_items_per_page)
            .finish()
    }
}

impl<'a, T, E> IntoIterator for &'a ChangeLogIterable<T, E> {
    type Item = Result<T, E>;
    type IntoIter = ChangeLogIter<T, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ChangeLogIterable`].
pub struct ChangeLogIter<T, E> {
    fetch: Arc<ChangeFetchFn<T, E>>,
    max_items_per_page: u64,
    cursor: Option<ChangeCursor>,
    first_page: bool,
    buffer: VecDeque<T>,
    latest_token: Option<String>,
}

impl<T, E> ChangeLogIter<T, E> {
    /// The newest token seen so far; persist it to resume later.
    pub fn latest_token(&self) -> Option<&str> {
        self.latest_token.as_deref()
    }
}

impl<T, E> Iterator for ChangeLogIter<T, E> {
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let cursor = self.cursor.take()?;
            let requested = if self.first_page {
                self.max_items_per_page
            } else {
                self.max_items_per_page.saturating_add(1)
            };
            let page = match (self.fetch)(&cursor, requested) {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            let next_cursor = page.next_cursor();
            if let Some(token) = &page.latest_token {
                self.latest_token = Some(token.clone());
            }

            let mut items: VecDeque<T> = page.items.into();
            if !self.first_page {
                items.pop_front();
            }
            self.first_page = false;
            debug!(
                cursor = ?cursor,
                new_items = items.len(),
                has_more = page.has_more_items,
                "fetched change log page"
            );

            // A continuation page that adds nothing would loop forever.
            if page.has_more_items && !items.is_empty() {
                self.cursor = next_cursor;
            }
            self.buffer = items;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Paging(PagingError),
    }

    impl From<PagingError> for TestError {
        fn from(e: PagingError) -> Self {
            TestError::Paging(e)
        }
    }

    /// A log of `len` events that repeats the last item of each page.
    fn repeating_log(
        len: usize,
        with_token: bool,
        with_link: bool,
        cursors: Arc<Mutex<Vec<ChangeCursor>>>,
    ) -> ChangeLogIterable<usize, TestError> {
        sized_log(len, 3, with_token, with_link, cursors, Arc::default())
    }

    /// Like [`repeating_log`], also recording the page size of each request.
    fn sized_log(
        len: usize,
        page_size: u64,
        with_token: bool,
        with_link: bool,
        cursors: Arc<Mutex<Vec<ChangeCursor>>>,
        requested: Arc<Mutex<Vec<u64>>>,
    ) -> ChangeLogIterable<usize, TestError> {
        ChangeLogIterable::new(None, page_size, move |cursor, max| {
            cursors.lock().unwrap().push(cursor.clone());
            requested.lock().unwrap().push(max);
            let start = match cursor {
                ChangeCursor::Start(None) => 0,
                ChangeCursor::Start(Some(t)) | ChangeCursor::Token(t) => t.parse().unwrap(),
                ChangeCursor::Link(l) => l.trim_start_matches("link:").parse().unwrap(),
            };
            let end = (start + max as usize).min(len);
            let items: Vec<usize> = (start..end).collect();
            let last = end.saturating_sub(1);
            Ok(ChangePage {
                items,
                total_num_items: Some(len as u64),
                has_more_items: end < len,
                latest_token: with_token.then(|| last.to_string()),
                next_link: with_link.then(|| format!("link:{last}")),
            })
        })
    }

    #[test]
    fn repeated_items_are_dropped() {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let log = repeating_log(7, true, false, Arc::clone(&cursors));
        let events: Vec<usize> = log.iter().map(Result::unwrap).collect();
        assert_eq!(events, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn single_item_pages_still_reach_the_end() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = sized_log(
            4,
            1,
            true,
            false,
            Arc::new(Mutex::new(Vec::new())),
            Arc::clone(&requested),
        );
        let events: Vec<usize> = log.iter().map(Result::unwrap).collect();
        assert_eq!(events, vec![0, 1, 2, 3]);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 2, 2]);
    }

    #[test]
    fn every_page_adds_a_full_page_of_new_events() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = sized_log(
            10,
            3,
            false,
            true,
            Arc::new(Mutex::new(Vec::new())),
            Arc::clone(&requested),
        );
        let events: Vec<usize> = log.iter().map(Result::unwrap).collect();
        assert_eq!(events, (0..10).collect::<Vec<_>>());
        // 3 + 3 + 3 + 1 new events
        assert_eq!(requested.lock().unwrap().len(), 4);
    }

    #[test]
    fn token_takes_precedence_over_link() {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let log = repeating_log(5, true, true, Arc::clone(&cursors));
        let events: Vec<usize> = log.iter().map(Result::unwrap).collect();
        assert_eq!(events, (0..5).collect::<Vec<_>>());
        let seen = cursors.lock().unwrap();
        assert_eq!(seen[0], ChangeCursor::Start(None));
        assert!(seen[1..].iter().all(|c| matches!(c, ChangeCursor::Token(_))));
    }

    #[test]
    fn link_is_followed_without_token() {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let log = repeating_log(5, false, true, Arc::clone(&cursors));
        let events: Vec<usize> = log.iter().map(Result::unwrap).collect();
        assert_eq!(events, (0..5).collect::<Vec<_>>());
        assert!(matches!(cursors.lock().unwrap()[1], ChangeCursor::Link(_)));
    }

    #[test]
    fn latest_token_tracks_progress() {
        let log = repeating_log(5, true, false, Arc::new(Mutex::new(Vec::new())));
        let mut iter = log.iter();
        assert!(iter.latest_token().is_none());
        while iter.next().is_some() {}
        assert_eq!(iter.latest_token(), Some("4"));
    }

    #[test]
    fn seeking_is_not_supported() {
        let log = repeating_log(5, true, false, Arc::new(Mutex::new(Vec::new())));
        assert!(matches!(
            log.skip_to(2),
            Err(TestError::Paging(PagingError::NotSupported(_)))
        ));
        assert!(matches!(
            log.get_page(2),
            Err(TestError::Paging(PagingError::NotSupported(_)))
        ));
    }
}
