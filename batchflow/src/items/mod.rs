//! Collaborator contracts for a chunk-oriented step.
//!
//! A step pulls items from an [`ItemSource`], maps each one through an
//! [`ItemTransformer`] and hands the survivors to an [`ItemSink`], inside
//! transactions driven through a [`TransactionManager`]. Every method returns
//! a boxed [`Failure`] so that collaborators can surface their own error
//! types; the step classifies them when deciding to retry or skip.

mod adapters;

pub use adapters::{
    FnTransformer, IterSource, NoOpTransactionManager, PassThroughTransformer, StreamSource,
};

use crate::errors::Failure;
use async_trait::async_trait;
use std::sync::Arc;

/// A forward-only, finite sequence of items.
#[async_trait]
pub trait ItemSource<I: Send>: Send {
    /// Returns the next item, or `Ok(None)` once the source is exhausted.
    ///
    /// After an error the step may call `read` again. Whether that retries
    /// the same record or moves past it is up to the source.
    async fn read(&mut self) -> Result<Option<I>, Failure>;
}

/// Maps an input item to an output item.
///
/// Transformers must be free of side effects: a step may call `transform`
/// more than once for the same item while isolating a failed chunk.
#[async_trait]
pub trait ItemTransformer<I: Sync, O: Send>: Send + Sync {
    /// Transforms one item. `Ok(None)` filters the item out.
    async fn transform(&self, item: &I) -> Result<Option<O>, Failure>;
}

/// Persists an ordered batch of items as one unit.
#[async_trait]
pub trait ItemSink<O: Sync>: Send + Sync {
    /// Writes all items, or fails for the whole batch.
    async fn write(&self, items: &[O]) -> Result<(), Failure>;
}

/// Transaction boundary around sink writes.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<(), Failure>;

    /// Commits the open transaction.
    async fn commit(&self) -> Result<(), Failure>;

    /// Rolls back the open transaction.
    async fn rollback(&self) -> Result<(), Failure>;
}

#[async_trait]
impl<I: Send, T: ItemSource<I> + ?Sized> ItemSource<I> for Box<T> {
    async fn read(&mut self) -> Result<Option<I>, Failure> {
        (**self).read().await
    }
}

#[async_trait]
impl<I: Sync, O: Send, T: ItemTransformer<I, O> + ?Sized> ItemTransformer<I, O> for Arc<T> {
    async fn transform(&self, item: &I) -> Result<Option<O>, Failure> {
        (**self).transform(item).await
    }
}

#[async_trait]
impl<I: Sync, O: Send, T: ItemTransformer<I, O> + ?Sized> ItemTransformer<I, O> for Box<T> {
    async fn transform(&self, item: &I) -> Result<Option<O>, Failure> {
        (**self).transform(item).await
    }
}

#[async_trait]
impl<O: Sync, T: ItemSink<O> + ?Sized> ItemSink<O> for Arc<T> {
    async fn write(&self, items: &[O]) -> Result<(), Failure> {
        (**self).write(items).await
    }
}

#[async_trait]
impl<O: Sync, T: ItemSink<O> + ?Sized> ItemSink<O> for Box<T> {
    async fn write(&self, items: &[O]) -> Result<(), Failure> {
        (**self).write(items).await
    }
}

#[async_trait]
impl<T: TransactionManager + ?Sized> TransactionManager for Arc<T> {
    async fn begin(&self) -> Result<(), Failure> {
        (**self).begin().await
    }

    async fn commit(&self) -> Result<(), Failure> {
        (**self).commit().await
    }

    async fn rollback(&self) -> Result<(), Failure> {
        (**self).rollback().await
    }
}
