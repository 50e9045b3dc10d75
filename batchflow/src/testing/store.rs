//! An in-memory transactional sink with fault injection.

use crate::errors::Failure;
use crate::items::{ItemSink, TransactionManager};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;

type WriteFault<O> = Box<dyn Fn(&[O]) -> Option<Failure> + Send + Sync>;
type CallFault = Box<dyn Fn(usize) -> Option<Failure> + Send + Sync>;

#[derive(Debug)]
struct StoreState<O> {
    staged: Vec<O>,
    committed: Vec<O>,
    in_transaction: bool,
    write_calls: Vec<Vec<O>>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

impl<O> Default for StoreState<O> {
    fn default() -> Self {
        Self {
            staged: Vec::new(),
            committed: Vec::new(),
            in_transaction: false,
            write_calls: Vec::new(),
            begins: 0,
            commits: 0,
            rollbacks: 0,
        }
    }
}

/// A sink and transaction manager backed by two in-memory buffers.
///
/// Writes inside a transaction are staged and only become visible in
/// [`TransactionalStore::committed`] after a commit; a rollback discards
/// them. Writes outside a transaction commit immediately. Every write call is
/// recorded, including failed ones, so tests can count attempts.
///
/// Use it behind an `Arc` to serve as both the sink and the transaction
/// manager of a step.
pub struct TransactionalStore<O> {
    state: Mutex<StoreState<O>>,
    write_fault: Option<WriteFault<O>>,
    begin_fault: Option<CallFault>,
    commit_fault: Option<CallFault>,
}

impl<O> Default for TransactionalStore<O> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            write_fault: None,
            begin_fault: None,
            commit_fault: None,
        }
    }
}

impl<O: Clone> TransactionalStore<O> {
    /// Creates an empty store that never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every write whose batch makes `fault` return an error.
    #[must_use]
    pub fn with_write_fault<F>(mut self, fault: F) -> Self
    where
        F: Fn(&[O]) -> Option<Failure> + Send + Sync + 'static,
    {
        self.write_fault = Some(Box::new(fault));
        self
    }

    /// Fails `begin` calls; `fault` receives the 1-based call number.
    #[must_use]
    pub fn with_begin_fault<F>(mut self, fault: F) -> Self
    where
        F: Fn(usize) -> Option<Failure> + Send + Sync + 'static,
    {
        self.begin_fault = Some(Box::new(fault));
        self
    }

    /// Fails `commit` calls; `fault` receives the 1-based call number.
    #[must_use]
    pub fn with_commit_fault<F>(mut self, fault: F) -> Self
    where
        F: Fn(usize) -> Option<Failure> + Send + Sync + 'static,
    {
        self.commit_fault = Some(Box::new(fault));
        self
    }

    /// Items persisted by committed transactions, in write order.
    #[must_use]
    pub fn committed(&self) -> Vec<O> {
        self.state.lock().committed.clone()
    }

    /// Every batch passed to `write`, including failed ones.
    #[must_use]
    pub fn write_calls(&self) -> Vec<Vec<O>> {
        self.state.lock().write_calls.clone()
    }

    /// Number of `write` calls whose batch contains an item matching `predicate`.
    #[must_use]
    pub fn write_attempts_where<P: Fn(&O) -> bool>(&self, predicate: P) -> usize {
        self.state
            .lock()
            .write_calls
            .iter()
            .filter(|batch| batch.iter().any(&predicate))
            .count()
    }

    /// Number of `begin` calls.
    #[must_use]
    pub fn begins(&self) -> usize {
        self.state.lock().begins
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Number of rollbacks.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }
}

impl<O> fmt::Debug for TransactionalStore<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionalStore")
            .field("committed", &state.committed.len())
            .field("staged", &state.staged.len())
            .field("in_transaction", &state.in_transaction)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<O: Clone + Send + Sync> ItemSink<O> for TransactionalStore<O> {
    async fn write(&self, items: &[O]) -> Result<(), Failure> {
        let mut state = self.state.lock();
        state.write_calls.push(items.to_vec());
        if let Some(err) = self.write_fault.as_ref().and_then(|fault| fault(items)) {
            return Err(err);
        }
        if state.in_transaction {
            state.staged.extend_from_slice(items);
        } else {
            state.committed.extend_from_slice(items);
        }
        Ok(())
    }
}

#[async_trait]
impl<O: Clone + Send + Sync> TransactionManager for TransactionalStore<O> {
    async fn begin(&self) -> Result<(), Failure> {
        let mut state = self.state.lock();
        state.begins += 1;
        if let Some(err) = self.begin_fault.as_ref().and_then(|fault| fault(state.begins)) {
            return Err(err);
        }
        state.staged.clear();
        state.in_transaction = true;
        Ok(())
    }

    async fn commit(&self) -> Result<(), Failure> {
        let mut state = self.state.lock();
        let call = state.commits + 1;
        if let Some(err) = self.commit_fault.as_ref().and_then(|fault| fault(call)) {
            return Err(err);
        }
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        state.in_transaction = false;
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), Failure> {
        let mut state = self.state.lock();
        state.staged.clear();
        state.in_transaction = false;
        state.rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResourceError;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_commit_publishes_staged_items() {
        let store = TransactionalStore::new();
        store.begin().await.unwrap();
        store.write(&[1, 2]).await.unwrap();
        assert!(store.committed().is_empty());

        store.commit().await.unwrap();
        assert_eq!(store.committed(), vec![1, 2]);
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_items() {
        let store = TransactionalStore::new();
        store.begin().await.unwrap();
        store.write(&[1, 2]).await.unwrap();
        store.rollback().await.unwrap();
        store.commit().await.unwrap();

        assert!(store.committed().is_empty());
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_write_without_transaction_is_immediate() {
        let store = TransactionalStore::new();
        store.write(&["a"]).await.unwrap();
        assert_eq!(store.committed(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_faults_are_recorded() {
        let store = TransactionalStore::new()
            .with_write_fault(|items: &[i32]| {
                items
                    .contains(&2)
                    .then(|| Box::new(ResourceError::transient("deadlock")) as Failure)
            })
            .with_begin_fault(|call| {
                (call == 2).then(|| Box::new(ResourceError::connectivity("reset")) as Failure)
            });

        store.begin().await.unwrap();
        assert!(store.write(&[1, 2]).await.is_err());
        assert!(store.begin().await.is_err());
        assert!(store.write(&[3]).await.is_ok());

        assert_eq!(store.write_calls(), vec![vec![1, 2], vec![3]]);
        assert_eq!(store.write_attempts_where(|n| *n == 2), 1);
        assert_eq!(store.begins(), 2);
    }

    #[tokio::test]
    async fn test_commit_fault() {
        let store = TransactionalStore::<i32>::new()
            .with_commit_fault(|_| Some(Box::new(ResourceError::data_access("gone")) as Failure));
        store.begin().await.unwrap();
        assert!(store.commit().await.is_err());
        assert_eq!(store.commits(), 0);
    }
}
