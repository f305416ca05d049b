//! Thread-safe pull iteration.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of one pull from a [`ConcurrentIterator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<T> {
    /// The next value.
    Item(T),
    /// The source ran out normally.
    Exhausted,
    /// The underlying resource was shut down before running out.
    Closed,
}

/// A pull-based iterator that many workers may call at once.
///
/// `Err` from [`next`](ConcurrentIterator::next) is a failure of one item
/// only; the caller keeps pulling. Iteration is over only once `Exhausted`
/// or `Closed` is returned, and every later call returns the same.
#[async_trait]
pub trait ConcurrentIterator<T: Send>: Send + Sync {
    async fn next(&self) -> Result<Next<T>>;
}
