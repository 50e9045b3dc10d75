use batchflow::errors::{Failure, ProcessingError, ResourceError, ResourceErrorKind};
use batchflow::events::NoOpEventSink;
use batchflow::items::{FnTransformer, IterSource};
use batchflow::policy::ExceptionClassifier;
use batchflow::step::{Step, StepBuilder, StepExecution};
use batchflow::testing::TransactionalStore;
use proptest::prelude::*;
use std::sync::Arc;

fn run_with_rejections(
    rejected: &[bool],
    chunk_size: usize,
    skip_limit: u64,
) -> (StepExecution, Arc<TransactionalStore<u64>>) {
    let items: Vec<u64> = (1..=rejected.len() as u64).collect();
    let rejected = rejected.to_vec();
    let store = Arc::new(TransactionalStore::new());
    let mut step = StepBuilder::<u64, u64>::new("load")
        .chunk_size(chunk_size)
        .skip_limit(skip_limit)
        .source(IterSource::from_vec(items))
        .transformer(FnTransformer::new(move |n: &u64| {
            if rejected[(*n - 1) as usize] {
                Err(Box::new(ProcessingError::new(format!("item {n} rejected"))) as Failure)
            } else {
                Ok(Some(*n))
            }
        }))
        .transactional_sink(Arc::clone(&store))
        .build()
        .expect("valid step");

    let execution = tokio_test::block_on(step.execute(&NoOpEventSink));
    (execution, store)
}

fn resource_kind() -> impl Strategy<Value = ResourceErrorKind> {
    prop_oneof![
        Just(ResourceErrorKind::Transient),
        Just(ResourceErrorKind::ResourceFailure),
        Just(ResourceErrorKind::Connectivity),
        Just(ResourceErrorKind::DataAccess),
        Just(ResourceErrorKind::IntegrityViolation),
    ]
}

proptest! {
    #[test]
    fn clean_run_writes_everything_in_order(len in 0_usize..120, chunk_size in 1_usize..16) {
        let (execution, store) = run_with_rejections(&vec![false; len], chunk_size, 0);

        prop_assert!(execution.is_success());
        prop_assert_eq!(execution.stats.write_count, len as u64);
        prop_assert_eq!(store.committed(), (1..=len as u64).collect::<Vec<_>>());
        prop_assert_eq!(execution.stats.commit_count, len.div_ceil(chunk_size) as u64);
        prop_assert_eq!(execution.stats.rollback_count, 0);
    }

    #[test]
    fn skipped_items_leave_gaps_without_reordering(
        rejected in prop::collection::vec(prop::bool::weighted(0.2), 0..80),
        chunk_size in 1_usize..12,
    ) {
        let bad = rejected.iter().filter(|r| **r).count() as u64;
        let (execution, store) = run_with_rejections(&rejected, chunk_size, bad);

        let expected: Vec<u64> = rejected
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i as u64 + 1)
            .collect();
        prop_assert!(execution.is_success());
        prop_assert_eq!(execution.stats.process_skip_count, bad);
        prop_assert_eq!(execution.stats.write_count, expected.len() as u64);
        prop_assert_eq!(store.committed(), expected);
    }

    #[test]
    fn skip_count_never_exceeds_limit(
        rejected in prop::collection::vec(prop::bool::weighted(0.3), 1..80),
        chunk_size in 1_usize..12,
        skip_limit in 0_u64..10,
    ) {
        let bad = rejected.iter().filter(|r| **r).count() as u64;
        let (execution, _) = run_with_rejections(&rejected, chunk_size, skip_limit);

        prop_assert!(execution.stats.skip_count() <= skip_limit);
        prop_assert_eq!(execution.is_success(), bad <= skip_limit);
        if bad > skip_limit {
            prop_assert_eq!(execution.stats.skip_count(), skip_limit);
            prop_assert!(execution.failure.is_some());
        }
    }

    #[test]
    fn transient_write_attempts_bounded_by_retry_limit(
        len in 1_u64..30,
        pick in any::<prop::sample::Index>(),
        chunk_size in 1_usize..8,
        retry_limit in 1_u32..6,
    ) {
        let target = pick.index(len as usize) as u64 + 1;
        let store = Arc::new(TransactionalStore::new().with_write_fault(move |items: &[u64]| {
            items
                .contains(&target)
                .then(|| Box::new(ResourceError::transient("lock wait timeout")) as Failure)
        }));
        let mut step = StepBuilder::<u64, u64>::new("load")
            .chunk_size(chunk_size)
            .skip_limit(1)
            .retry_limit(retry_limit)
            .source(IterSource::from_vec((1..=len).collect()))
            .pass_through()
            .transactional_sink(Arc::clone(&store))
            .build()
            .expect("valid step");

        let execution = tokio_test::block_on(step.execute(&NoOpEventSink));

        let single_item_attempts = store
            .write_calls()
            .iter()
            .filter(|batch| batch.as_slice() == [target])
            .count();
        prop_assert!(execution.is_success());
        prop_assert_eq!(single_item_attempts, retry_limit as usize);
        prop_assert_eq!(execution.stats.retry_count, u64::from(retry_limit - 1));
        prop_assert_eq!(execution.stats.write_skip_count, 1);
        prop_assert!(!store.committed().contains(&target));
        prop_assert_eq!(store.committed().len() as u64, len - 1);
    }

    #[test]
    fn classification_is_deterministic(kind in resource_kind(), message in "[a-z ]{0,40}") {
        let classifier = ExceptionClassifier::default();
        let error = ResourceError::new(kind, message);

        let first = classifier.kind_of(&error);
        prop_assert_eq!(classifier.kind_of(&error), first);
        prop_assert_eq!(classifier.classify(Box::new(error)).kind(), first);
    }
}
