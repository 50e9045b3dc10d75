use super::*;
use crate::core::StepExecutionStats;
use crate::errors::{Failure, ProcessingError};
use crate::events::{CollectingEventSink, EventSink, EventType};
use crate::items::{FnTransformer, IterSource};
use crate::step::{ChunkStep, Step, StepBuilder, StepExecution};
use crate::testing::{RecordingListener, TransactionalStore};
use mockall::Sequence;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn copy_step(name: &str, items: Vec<u32>, recorder: &Arc<RecordingListener>) -> ChunkStep<u32, u32> {
    StepBuilder::<u32, u32>::new(name)
        .chunk_size(2)
        .source(IterSource::from_vec(items))
        .pass_through()
        .sink(TransactionalStore::new())
        .listener(recorder.clone())
        .build()
        .unwrap()
}

fn rejecting_step(name: &str, recorder: &Arc<RecordingListener>) -> ChunkStep<u32, u32> {
    StepBuilder::<u32, u32>::new(name)
        .skip_limit(0)
        .source(IterSource::from_vec(vec![1, 2, 3]))
        .transformer(FnTransformer::new(|n: &u32| {
            if *n == 2 {
                Err(Box::new(ProcessingError::new("price is negative")) as Failure)
            } else {
                Ok(Some(*n))
            }
        }))
        .sink(TransactionalStore::new())
        .listener(recorder.clone())
        .build()
        .unwrap()
}

struct Stalled;

#[async_trait]
impl Step for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn execute(&mut self, _events: &dyn EventSink) -> StepExecution {
        let mut stats = StepExecutionStats::new("stalled");
        stats.start();
        stats.finish(ExecutionStatus::Failed);
        StepExecution {
            stats,
            failure: None,
        }
    }
}

#[test]
fn test_empty_job_is_rejected() {
    let err = JobBuilder::new("etl").build().unwrap_err();
    assert!(matches!(err, BatchError::EmptyJob(ref name) if name == "etl"));
}

#[test]
fn test_duplicate_step_names_are_rejected() {
    let recorder = Arc::new(RecordingListener::new());
    let err = JobBuilder::new("etl")
        .start(copy_step("load", vec![1], &recorder))
        .next(copy_step("load", vec![2], &recorder))
        .build()
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidConfig(_)));
}

#[test]
fn test_start_replaces_earlier_steps() {
    let recorder = Arc::new(RecordingListener::new());
    let job = JobBuilder::new("etl")
        .next(copy_step("stray", vec![1], &recorder))
        .start(copy_step("extract", vec![1], &recorder))
        .next(copy_step("load", vec![1], &recorder))
        .build()
        .unwrap();
    assert_eq!(job.step_names(), vec!["extract", "load"]);
}

#[tokio::test]
async fn test_successful_job_aggregates_steps() {
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(copy_step("extract", vec![1, 2, 3], &recorder))
        .next(copy_step("load", vec![4, 5], &recorder))
        .listener(recorder.clone())
        .build()
        .unwrap();

    let execution = job.run().await;

    assert!(execution.is_success());
    assert_eq!(execution.exit_code(), 0);
    assert_eq!(execution.stats.steps.len(), 2);
    assert_eq!(execution.stats.total_read(), 5);
    assert_eq!(execution.stats.total_written(), 5);
    assert!(execution.stats.duration().is_some());
    assert_eq!(
        recorder.calls(),
        vec![
            "before_job:etl",
            "before_step:extract",
            "after_step:extract:COMPLETED",
            "before_step:load",
            "after_step:load:COMPLETED",
            "after_job:etl:COMPLETED",
        ]
    );
    let stats = execution.into_result().unwrap();
    assert_eq!(stats.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_failed_step_stops_the_job() {
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(copy_step("extract", vec![1, 2], &recorder))
        .next(rejecting_step("transform", &recorder))
        .next(copy_step("load", vec![1, 2], &recorder))
        .listener(recorder.clone())
        .build()
        .unwrap();

    let execution = job.run().await;

    assert_eq!(execution.status(), ExecutionStatus::Failed);
    assert_eq!(execution.exit_code(), 1);
    assert_eq!(execution.stats.steps.len(), 2);
    assert!(execution.stats.step("load").is_none());
    assert_eq!(
        execution.stats.step("transform").map(|s| s.write_count),
        Some(0)
    );
    assert!(!recorder.calls().contains(&"before_step:load".to_string()));
    assert_eq!(
        recorder.calls().last().map(String::as_str),
        Some("after_job:etl:FAILED")
    );

    match execution.into_result().unwrap_err() {
        BatchError::StepFailed { step, source } => {
            assert_eq!(step, "transform");
            assert_eq!(source.ordinal, Some(2));
            assert_eq!(
                source.downcast_ref::<ProcessingError>(),
                Some(&ProcessingError::new("price is negative"))
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_step_without_failure_still_fails_job() {
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(Stalled)
        .next(copy_step("load", vec![1], &recorder))
        .build()
        .unwrap();

    let execution = job.run().await;

    assert_eq!(execution.status(), ExecutionStatus::Failed);
    assert!(execution.failure.is_none());
    assert!(recorder.calls().is_empty());
    assert!(matches!(
        execution.into_result(),
        Err(BatchError::StepIncomplete { ref step, status: ExecutionStatus::Failed }) if step == "stalled"
    ));
}

#[tokio::test]
async fn test_job_events_wrap_step_events() {
    let events = Arc::new(CollectingEventSink::new());
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(copy_step("extract", vec![1], &recorder))
        .event_sink(events.clone())
        .build()
        .unwrap();

    let execution = job.run().await;

    let types = events.types();
    assert_eq!(types.first(), Some(&EventType::JobStarted));
    assert_eq!(types.get(1), Some(&EventType::StepStarted));
    assert_eq!(types.last(), Some(&EventType::JobCompleted));
    let started = events.payloads_of(EventType::JobStarted);
    assert_eq!(
        started[0]["execution_id"],
        execution.stats.execution_id.to_string()
    );
    assert_eq!(events.payloads_of(EventType::JobCompleted)[0]["written"], 1);
}

#[tokio::test]
async fn test_failed_job_emits_failure_event() {
    let events = Arc::new(CollectingEventSink::new());
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(rejecting_step("transform", &recorder))
        .event_sink(events.clone())
        .build()
        .unwrap();

    job.run().await;

    assert_eq!(events.count_of(EventType::StepFailed), 1);
    assert_eq!(events.count_of(EventType::JobFailed), 1);
    assert_eq!(events.count_of(EventType::JobCompleted), 0);
}

#[tokio::test]
async fn test_listener_hooks_in_order() {
    let mut listener = MockJobListener::new();
    let mut seq = Sequence::new();
    listener
        .expect_before_job()
        .withf(|stats| stats.status == ExecutionStatus::Started && stats.steps.is_empty())
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    listener
        .expect_after_job()
        .withf(|stats, status| stats.steps.len() == 1 && *status == ExecutionStatus::Failed)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(rejecting_step("transform", &recorder))
        .next(copy_step("load", vec![1], &recorder))
        .listener(Arc::new(listener))
        .build()
        .unwrap();

    assert_eq!(job.run().await.exit_code(), 1);
}

#[tokio::test]
async fn test_each_run_gets_a_new_execution_id() {
    let recorder = Arc::new(RecordingListener::new());
    let mut job = JobBuilder::new("etl")
        .start(copy_step("extract", vec![], &recorder))
        .build()
        .unwrap();

    let first = job.run().await;
    let second = job.run().await;

    assert_ne!(first.stats.execution_id, second.stats.execution_id);
    assert!(second.is_success());
}
