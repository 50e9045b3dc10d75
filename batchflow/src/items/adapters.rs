//! Stock collaborator implementations.

use super::{ItemSource, ItemTransformer, TransactionManager};
use crate::errors::Failure;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::fmt;

/// A source backed by an in-memory iterator.
pub struct IterSource<I> {
    inner: Box<dyn Iterator<Item = Result<I, Failure>> + Send>,
    position: u64,
}

impl<I: Send + 'static> IterSource<I> {
    /// Creates a source from an iterator of results.
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<Item = Result<I, Failure>>,
        T::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(items.into_iter()),
            position: 0,
        }
    }

    /// Creates a source that yields every item successfully.
    #[must_use]
    pub fn from_vec(items: Vec<I>) -> Self {
        Self::new(items.into_iter().map(Ok))
    }

    /// Creates a source from prepared read outcomes.
    #[must_use]
    pub fn from_results(results: Vec<Result<I, Failure>>) -> Self {
        Self::new(results)
    }
}

impl<I> IterSource<I> {
    /// Number of `read` calls that returned an item or an error.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<I> fmt::Debug for IterSource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterSource")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<I: Send> ItemSource<I> for IterSource<I> {
    async fn read(&mut self) -> Result<Option<I>, Failure> {
        match self.inner.next() {
            Some(result) => {
                self.position += 1;
                result.map(Some)
            }
            None => Ok(None),
        }
    }
}

/// A source backed by an asynchronous stream of results.
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S> {
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> fmt::Debug for StreamSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl<I, S> ItemSource<I> for StreamSource<S>
where
    I: Send,
    S: Stream<Item = Result<I, Failure>> + Unpin + Send,
{
    async fn read(&mut self) -> Result<Option<I>, Failure> {
        self.stream.next().await.transpose()
    }
}

/// A transformer backed by a synchronous closure.
pub struct FnTransformer<F> {
    func: F,
}

impl<F> FnTransformer<F> {
    /// Creates a transformer from a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnTransformer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer").finish_non_exhaustive()
    }
}

#[async_trait]
impl<I, O, F> ItemTransformer<I, O> for FnTransformer<F>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> Result<Option<O>, Failure> + Send + Sync,
{
    async fn transform(&self, item: &I) -> Result<Option<O>, Failure> {
        (self.func)(item)
    }
}

/// A transformer that forwards every item unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTransformer;

#[async_trait]
impl<I: Clone + Send + Sync> ItemTransformer<I, I> for PassThroughTransformer {
    async fn transform(&self, item: &I) -> Result<Option<I>, Failure> {
        Ok(Some(item.clone()))
    }
}

/// A transaction manager for sinks that are atomic on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTransactionManager;

#[async_trait]
impl TransactionManager for NoOpTransactionManager {
    async fn begin(&self) -> Result<(), Failure> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), Failure> {
        Ok(())
    }

    async fn rollback(&self) -> Result<(), Failure> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_iter_source_reads_until_exhausted() {
        let mut source = IterSource::from_vec(vec![1, 2]);
        assert_eq!(source.read().await.unwrap(), Some(1));
        assert_eq!(source.read().await.unwrap(), Some(2));
        assert_eq!(source.read().await.unwrap(), None);
        assert_eq!(source.read().await.unwrap(), None);
        assert_eq!(source.position(), 2);
    }

    #[tokio::test]
    async fn test_iter_source_surfaces_errors_and_advances() {
        let mut source = IterSource::from_results(vec![
            Ok("a"),
            Err(Box::new(SourceError::new("bad")) as Failure),
            Ok("c"),
        ]);
        assert_eq!(source.read().await.unwrap(), Some("a"));
        assert!(source.read().await.is_err());
        assert_eq!(source.read().await.unwrap(), Some("c"));
    }

    #[tokio::test]
    async fn test_stream_source() {
        let stream = futures::stream::iter(vec![Ok::<_, Failure>(1), Ok(2)]);
        let mut source = StreamSource::new(stream);
        assert_eq!(source.read().await.unwrap(), Some(1));
        assert_eq!(source.read().await.unwrap(), Some(2));
        assert_eq!(source.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fn_transformer_filters() {
        let transformer = FnTransformer::new(|n: &i32| Ok::<_, Failure>((*n % 2 == 0).then_some(n * 10)));
        assert_eq!(transformer.transform(&2).await.unwrap(), Some(20));
        assert_eq!(transformer.transform(&3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pass_through() {
        let out: Option<String> = PassThroughTransformer
            .transform(&"x".to_string())
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_noop_transactions() {
        let tx = NoOpTransactionManager;
        assert!(tx.begin().await.is_ok());
        assert!(tx.commit().await.is_ok());
        assert!(tx.rollback().await.is_ok());
    }
}
