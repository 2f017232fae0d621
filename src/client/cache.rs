use std::time::{Duration, Instant};

/// Records from the last successful discovery lookup of a client.
#[derive(Debug)]
pub struct Cache<T> {
    fetched_at: Instant,
    items: Box<[T]>,
}

impl<T> Cache<T> {
    /// Stores items fetched just now.
    pub fn new(items: impl Into<Box<[T]>>) -> Self {
        Self {
            fetched_at: Instant::now(),
            items: items.into(),
        }
    }

    /// When the lookup that produced these items completed.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// How long ago the items were fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Gets the cached items.
    pub fn items(&self) -> &[T] {
        &self.items
    }
}
