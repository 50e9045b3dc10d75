//! Builder for chunk-oriented steps.

use super::{ChunkStep, StepListener};
use crate::config::BatchConfig;
use crate::errors::BatchError;
use crate::items::{
    ItemSink, ItemSource, ItemTransformer, NoOpTransactionManager, PassThroughTransformer,
    TransactionManager,
};
use crate::policy::{ExceptionClassifier, FaultTolerance, RetryPolicy, SkipPolicy};
use std::sync::Arc;

/// Builder for [`ChunkStep`].
///
/// ```rust,ignore
/// let store = Arc::new(TransactionalStore::new());
/// let step = StepBuilder::new("load")
///     .chunk_size(100)
///     .skip_limit(10)
///     .source(IterSource::from_vec(records))
///     .transformer(FnTransformer::new(validate))
///     .transactional_sink(store.clone())
///     .build()?;
/// ```
pub struct StepBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    config: BatchConfig,
    classifier: Option<ExceptionClassifier>,
    skip_policy: Option<SkipPolicy>,
    retry_policy: Option<RetryPolicy>,
    source: Option<Box<dyn ItemSource<I>>>,
    transformer: Option<Arc<dyn ItemTransformer<I, O>>>,
    sink: Option<Arc<dyn ItemSink<O>>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    listeners: Vec<Arc<dyn StepListener>>,
}

impl<I, O> StepBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Creates a new step builder with the default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BatchConfig::default(),
            classifier: None,
            skip_policy: None,
            retry_policy: None,
            source: None,
            transformer: None,
            sink: None,
            transactions: None,
            listeners: Vec::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Sets the skip limit.
    #[must_use]
    pub fn skip_limit(mut self, skip_limit: u64) -> Self {
        self.config.skip_limit = skip_limit;
        self
    }

    /// Sets the retry limit.
    #[must_use]
    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.config.retry_limit = retry_limit;
        self
    }

    /// Replaces the standard classification rules.
    #[must_use]
    pub fn classifier(mut self, classifier: ExceptionClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Replaces the skip policy derived from the configuration.
    #[must_use]
    pub fn skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.skip_policy = Some(policy);
        self
    }

    /// Replaces the retry policy derived from the configuration.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the item source.
    #[must_use]
    pub fn source(mut self, source: impl ItemSource<I> + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Sets the item transformer.
    #[must_use]
    pub fn transformer(mut self, transformer: impl ItemTransformer<I, O> + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Sets the item sink.
    #[must_use]
    pub fn sink(mut self, sink: impl ItemSink<O> + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the transaction manager. Defaults to [`NoOpTransactionManager`].
    #[must_use]
    pub fn transactions(mut self, transactions: impl TransactionManager + 'static) -> Self {
        self.transactions = Some(Arc::new(transactions));
        self
    }

    /// Uses one object as both the sink and the transaction manager.
    #[must_use]
    pub fn transactional_sink<T>(mut self, store: Arc<T>) -> Self
    where
        T: ItemSink<O> + TransactionManager + 'static,
    {
        self.sink = Some(store.clone());
        self.transactions = Some(store);
        self
    }

    /// Adds a lifecycle listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn StepListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validates the configuration and builds the step.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidConfig`] if the configuration is invalid,
    /// or [`BatchError::MissingComponent`] if the source, transformer or sink
    /// was not set.
    pub fn build(self) -> Result<ChunkStep<I, O>, BatchError> {
        self.config.validate()?;

        let missing = |component| BatchError::MissingComponent {
            step: self.name.clone(),
            component,
        };
        let source = self.source.ok_or_else(|| missing("source"))?;
        let transformer = self.transformer.ok_or_else(|| missing("transformer"))?;
        let sink = self.sink.ok_or_else(|| missing("sink"))?;

        let policies = FaultTolerance::new(
            self.classifier.unwrap_or_default(),
            self.skip_policy
                .unwrap_or_else(|| self.config.skip_policy()),
            self.retry_policy
                .unwrap_or_else(|| self.config.retry_policy()),
        );

        Ok(ChunkStep {
            name: self.name,
            config: self.config,
            policies,
            source,
            transformer,
            sink,
            transactions: self
                .transactions
                .unwrap_or_else(|| Arc::new(NoOpTransactionManager)),
            listeners: self.listeners,
        })
    }
}

impl<I> StepBuilder<I, I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Forwards items to the sink unchanged.
    #[must_use]
    pub fn pass_through(self) -> Self {
        self.transformer(PassThroughTransformer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::IterSource;
    use crate::policy::ErrorKind;
    use crate::step::Step;
    use crate::testing::TransactionalStore;

    #[test]
    fn test_missing_source() {
        let err = StepBuilder::<i32, i32>::new("load")
            .pass_through()
            .sink(TransactionalStore::new())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::MissingComponent { component: "source", .. }
        ));
        assert_eq!(err.to_string(), "Step 'load' is missing its source");
    }

    #[test]
    fn test_missing_transformer_and_sink() {
        let err = StepBuilder::<i32, String>::new("load")
            .source(IterSource::from_vec(vec![1]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::MissingComponent { component: "transformer", .. }
        ));

        let err = StepBuilder::<i32, i32>::new("load")
            .source(IterSource::from_vec(vec![1]))
            .pass_through()
            .build()
            .unwrap_err();
        assert!(matches!(err, BatchError::MissingComponent { component: "sink", .. }));
    }

    #[test]
    fn test_invalid_config() {
        let err = StepBuilder::<i32, i32>::new("load")
            .chunk_size(0)
            .source(IterSource::from_vec(vec![1]))
            .pass_through()
            .sink(TransactionalStore::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_policies_from_config() {
        let step = StepBuilder::<i32, i32>::new("load")
            .skip_limit(7)
            .retry_limit(4)
            .source(IterSource::from_vec(vec![1]))
            .pass_through()
            .transactional_sink(Arc::new(TransactionalStore::new()))
            .build()
            .unwrap();

        assert_eq!(step.name(), "load");
        assert_eq!(step.policies().skip_policy.skip_limit(), 7);
        assert_eq!(
            step.policies().retry_policy.budget_for(ErrorKind::TransientResource),
            4
        );
    }

    #[test]
    fn test_explicit_policies_win() {
        let step = StepBuilder::<i32, i32>::new("load")
            .skip_limit(7)
            .skip_policy(SkipPolicy::new(1))
            .retry_policy(RetryPolicy::new(2).with_budget(ErrorKind::Parse, 2))
            .source(IterSource::from_vec(vec![1]))
            .pass_through()
            .sink(TransactionalStore::new())
            .build()
            .unwrap();

        assert_eq!(step.policies().skip_policy.skip_limit(), 1);
        assert_eq!(step.policies().retry_policy.budget_for(ErrorKind::Parse), 2);
    }
}
