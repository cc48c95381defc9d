//! End-to-end tests for pipeline runs.

use super::*;
use crate::config::Config;
use crate::core::{Payload, PipelineStatus, ServiceStatus};
use crate::errors::FlowError;
use crate::observers::{LifecycleEvent, MemoryStore, Observer, RecordingObserver};
use crate::service::{FnTask, Service, ServiceContext, Task};
use crate::testing::{payload, CallLog, MockTask};
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

struct Service1;

#[async_trait]
impl Task for Service1 {
    async fn payload(&self, _ctx: &ServiceContext, _inputs: Payload) -> anyhow::Result<Payload> {
        Ok(payload(json!({"a": 23})))
    }
}

struct Service2;

#[async_trait]
impl Task for Service2 {
    async fn payload(&self, _ctx: &ServiceContext, _inputs: Payload) -> anyhow::Result<Payload> {
        Ok(payload(json!({"b": 42})))
    }
}

struct Service3;

#[async_trait]
impl Task for Service3 {
    async fn payload(&self, _ctx: &ServiceContext, _inputs: Payload) -> anyhow::Result<Payload> {
        Ok(payload(json!({"c": 11})))
    }
}

struct Service4 {
    seen: CallLog,
}

#[async_trait]
impl Task for Service4 {
    async fn payload(&self, _ctx: &ServiceContext, inputs: Payload) -> anyhow::Result<Payload> {
        self.seen.lock().push(inputs);
        Ok(Payload::new())
    }
}

fn config(value: serde_json::Value) -> Config {
    payload(value)
}

fn recorder() -> (Arc<RecordingObserver>, Vec<Arc<dyn Observer>>) {
    let recorder = Arc::new(RecordingObserver::new());
    let observers: Vec<Arc<dyn Observer>> = vec![recorder.clone()];
    (recorder, observers)
}

async fn four_services(config: Config, observers: Vec<Arc<dyn Observer>>) -> (Pipeline, CallLog) {
    let seen = CallLog::default();
    let mut pipeline = Pipeline::create("four", config, observers).await.unwrap();
    pipeline
        .register(Service1)
        .await
        .unwrap()
        .register_with(Service2, ServiceOptions::new().depends_on::<Service1>("a"))
        .await
        .unwrap()
        .register_with(Service3, ServiceOptions::new().depends_on::<Service1>("a"))
        .await
        .unwrap()
        .register_with(
            Service4 { seen: seen.clone() },
            ServiceOptions::new()
                .depends_on::<Service1>("a")
                .depends_on::<Service2>("b")
                .depends_on::<Service3>("c"),
        )
        .await
        .unwrap();
    (pipeline, seen)
}

#[tokio::test]
async fn test_four_service_end_to_end() {
    let (pipeline, seen) = four_services(Config::new(), vec![]).await;

    let summary = pipeline.run().await.unwrap();

    assert_eq!(
        seen.lock().clone(),
        vec![payload(json!({"service1.a": 23, "service2.b": 42, "service3.c": 11}))]
    );
    assert!(pipeline.services().all(|service| service.status() == ServiceStatus::Done));
    assert_eq!(pipeline.status(), PipelineStatus::Done);
    assert_eq!(summary.waves, 3);
    assert_eq!(summary.done, vec!["service1__0", "service2__1", "service3__2", "service4__3"]);
    assert!(summary.failed.is_empty());
    assert!(summary.unscheduled.is_empty());
}

#[tokio::test]
async fn test_sequence_numbers_follow_waves() {
    let (pipeline, _seen) = four_services(Config::new(), vec![]).await;
    pipeline.run().await.unwrap();

    let numbers: Vec<Option<usize>> = pipeline.services().map(|service| service.number()).collect();
    assert_eq!(numbers, vec![Some(1), Some(2), Some(3), Some(4)]);
}

#[tokio::test]
async fn test_next_wave_waits_for_the_whole_previous_wave() {
    let mut pipeline = Pipeline::create("barrier", Config::new(), vec![]).await.unwrap();
    pipeline
        .register(MockTask::new("slow_a").sleeping(Duration::from_millis(300)))
        .await
        .unwrap()
        .register(MockTask::new("slow_b").sleeping(Duration::from_millis(300)))
        .await
        .unwrap()
        .register(MockTask::new("fast").returning(payload(json!({"x": 1}))))
        .await
        .unwrap();

    let sleepers: Vec<Arc<Service>> = ["slow_a", "slow_b"]
        .iter()
        .map(|name| Arc::clone(pipeline.service_by_name(name).unwrap()))
        .collect();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::clone(&observed);
    pipeline
        .register_with(
            FnTask::from_sync("dep", move |_inputs| {
                statuses
                    .lock()
                    .extend(sleepers.iter().map(|service| service.status()));
                Ok(Payload::new())
            }),
            ServiceOptions::new().depends_on_named("fast", "x"),
        )
        .await
        .unwrap();

    let started = Instant::now();
    let summary = pipeline.run().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.waves, 2);
    assert_eq!(
        observed.lock().clone(),
        vec![ServiceStatus::Done, ServiceStatus::Done]
    );
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(550), "sleepers ran serially: {elapsed:?}");
}

#[tokio::test]
async fn test_summary_reports_ids_for_repeated_names() {
    let mut pipeline = Pipeline::create("repeated", Config::new(), vec![]).await.unwrap();
    pipeline
        .register(MockTask::new("fetch"))
        .await
        .unwrap()
        .register(MockTask::new("fetch"))
        .await
        .unwrap();

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.done, vec!["fetch__0", "fetch__1"]);
}

#[tokio::test]
async fn test_rejected_service_start_is_not_reported_as_cancelled() {
    let rejecting = Arc::new(RecordingObserver::failing_on(LifecycleEvent::ServiceStart));
    let observers: Vec<Arc<dyn Observer>> = vec![rejecting.clone()];
    let mut pipeline = Pipeline::create("rejected", Config::new(), observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Observer {
            event: LifecycleEvent::ServiceStart,
            ..
        }
    ));
    assert_eq!(
        pipeline.service_by_name("service1").unwrap().status(),
        ServiceStatus::Failed
    );
    assert_eq!(rejecting.count(LifecycleEvent::ServiceFailed), 0);
    assert_eq!(rejecting.count(LifecycleEvent::PipelineFailed), 1);
}

#[tokio::test]
async fn test_lifecycle_event_order_for_single_service() {
    let (recorder, observers) = recorder();
    let mut pipeline = Pipeline::create("single", Config::new(), observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();

    pipeline.run().await.unwrap();

    assert_eq!(
        recorder.sequence(),
        vec![
            LifecycleEvent::PipelineCreate,
            LifecycleEvent::ServiceCreate,
            LifecycleEvent::PipelineStart,
            LifecycleEvent::ServiceStart,
            LifecycleEvent::ServiceDone,
            LifecycleEvent::PipelineDone,
        ]
    );
}

#[tokio::test]
async fn test_projection_of_nested_path() {
    let mut pipeline = Pipeline::create("nested", Config::new(), vec![]).await.unwrap();
    pipeline
        .register(MockTask::new("upstream").returning(payload(json!({"a": {"b": 5}}))))
        .await
        .unwrap();
    let downstream = MockTask::new("downstream");
    let calls = downstream.call_log();
    pipeline
        .register_with(downstream, ServiceOptions::new().depends_on_named("upstream", "a.b"))
        .await
        .unwrap();

    pipeline.run().await.unwrap();

    assert_eq!(calls.lock()[0].get("upstream.a.b"), Some(&json!(5)));
}

#[tokio::test]
async fn test_missing_key_aborts_run() {
    let (recorder, observers) = recorder();
    let mut pipeline = Pipeline::create("lookup", Config::new(), observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();
    pipeline
        .register_with(
            MockTask::new("downstream"),
            ServiceOptions::new().depends_on::<Service1>("missing").allow_failure(true),
        )
        .await
        .unwrap();

    let err = pipeline.run().await.unwrap_err();

    match &err {
        FlowError::KeyLookup(lookup) => {
            assert_eq!(lookup.path, "missing");
            assert_eq!(lookup.upstream, "service1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
    assert_eq!(
        pipeline.service_by_name("downstream").unwrap().status(),
        ServiceStatus::Pending
    );
    assert_eq!(recorder.count(LifecycleEvent::PipelineFailed), 1);
}

#[tokio::test]
async fn test_failure_propagates_with_single_pipeline_failed() {
    let (recorder, observers) = recorder();
    let mut pipeline = Pipeline::create("failing", Config::new(), observers).await.unwrap();
    pipeline.register(MockTask::new("broken").failing("division by zero")).await.unwrap();
    pipeline
        .register_with(MockTask::new("after"), ServiceOptions::new().depends_on_named("broken", "x"))
        .await
        .unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert!(err.is_task_failure());
    assert!(err.to_string().contains("division by zero"));
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
    assert_eq!(recorder.count(LifecycleEvent::PipelineFailed), 1);
    assert_eq!(recorder.count(LifecycleEvent::PipelineDone), 0);

    let failed = recorder.events_of(LifecycleEvent::PipelineFailed);
    assert!(failed[0].error.as_deref().unwrap_or_default().contains("division by zero"));
    assert_eq!(
        pipeline.service_by_name("after").unwrap().status(),
        ServiceStatus::Pending
    );
}

#[tokio::test]
async fn test_allow_failure_absorbs_failure() {
    let mut pipeline = Pipeline::create("absorb", Config::new(), vec![]).await.unwrap();
    pipeline
        .register_with(
            MockTask::new("flaky").failing("division by zero"),
            ServiceOptions::new().allow_failure(true),
        )
        .await
        .unwrap();
    pipeline.register(Service1).await.unwrap();

    let summary = pipeline.run().await.unwrap();

    let flaky = pipeline.service_by_name("flaky").unwrap();
    assert_eq!(flaky.status(), ServiceStatus::Failed);
    assert!(flaky.result().is_err());
    assert_eq!(pipeline.status(), PipelineStatus::Done);
    assert_eq!(summary.failed, vec!["flaky__0"]);
    assert_eq!(summary.done, vec!["service1__1"]);
}

#[tokio::test]
async fn test_dependent_of_absorbed_failure_aborts() {
    let mut pipeline = Pipeline::create("absorb-dep", Config::new(), vec![]).await.unwrap();
    pipeline
        .register_with(
            MockTask::new("flaky").failing("boom"),
            ServiceOptions::new().allow_failure(true),
        )
        .await
        .unwrap();
    pipeline
        .register_with(MockTask::new("consumer"), ServiceOptions::new().depends_on_named("flaky", "x"))
        .await
        .unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidState(_)));
}

#[tokio::test]
async fn test_timeout_from_config() {
    let mut pipeline = Pipeline::create("timeout", config(json!({"slow": {"timeout": 0.1}})), vec![])
        .await
        .unwrap();
    pipeline
        .register(MockTask::new("slow").sleeping(Duration::from_secs(1)))
        .await
        .unwrap();

    let err = tokio::time::timeout(Duration::from_millis(900), pipeline.run())
        .await
        .expect("timeout must interrupt the task")
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(
        pipeline.service_by_name("slow").unwrap().status(),
        ServiceStatus::Failed
    );
}

#[tokio::test]
async fn test_timeout_absorbed_by_global_allow_failure() {
    let cfg = config(json!({
        "__global": {"allow_failure": true},
        "slow": {"timeout": 0.1}
    }));
    let mut pipeline = Pipeline::create("timeout-absorbed", cfg, vec![]).await.unwrap();
    pipeline
        .register(MockTask::new("slow").sleeping(Duration::from_secs(1)))
        .await
        .unwrap();

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.failed, vec!["slow__0"]);
    assert_eq!(pipeline.status(), PipelineStatus::Done);
}

#[tokio::test]
async fn test_failing_sibling_cancels_the_wave() {
    let (recorder, observers) = recorder();
    let mut pipeline = Pipeline::create("siblings", Config::new(), observers).await.unwrap();
    pipeline
        .register(MockTask::new("slow").sleeping(Duration::from_secs(5)))
        .await
        .unwrap();
    pipeline.register(MockTask::new("broken").failing("boom")).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), pipeline.run())
        .await
        .expect("siblings must be cancelled")
        .unwrap_err();

    assert!(err.is_task_failure());
    assert_eq!(
        pipeline.service_by_name("slow").unwrap().status(),
        ServiceStatus::Failed
    );

    let failed = recorder.events_of(LifecycleEvent::ServiceFailed);
    assert_eq!(failed.len(), 2);
    let cancelled: Vec<&str> = failed
        .iter()
        .filter(|event| event.error.as_deref().is_some_and(|e| e.contains("cancelled")))
        .map(|event| event.subject.as_str())
        .collect();
    assert_eq!(cancelled, vec!["slow"]);
    assert_eq!(recorder.count(LifecycleEvent::PipelineFailed), 1);
}

#[tokio::test]
async fn test_observer_error_aborts_run() {
    let failing = Arc::new(RecordingObserver::failing_on(LifecycleEvent::ServiceDone));
    let observers: Vec<Arc<dyn Observer>> = vec![failing.clone()];
    let mut pipeline = Pipeline::create("observer", Config::new(), observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Observer {
            event: LifecycleEvent::ServiceDone,
            ..
        }
    ));
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
    assert_eq!(failing.count(LifecycleEvent::PipelineFailed), 1);
}

#[tokio::test]
async fn test_pipeline_start_rejection_skips_pipeline_failed() {
    let failing = Arc::new(RecordingObserver::failing_on(LifecycleEvent::PipelineStart));
    let observers: Vec<Arc<dyn Observer>> = vec![failing.clone()];
    let mut pipeline = Pipeline::create("start", Config::new(), observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, FlowError::Observer { .. }));
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
    assert_eq!(failing.count(LifecycleEvent::PipelineFailed), 0);
    assert_eq!(failing.count(LifecycleEvent::ServiceStart), 0);
}

#[tokio::test]
async fn test_pipeline_runs_once() {
    let mut pipeline = Pipeline::create("once", Config::new(), vec![]).await.unwrap();
    pipeline.register(Service1).await.unwrap();
    pipeline.run().await.unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidState(_)));

    let err = pipeline.register(Service2).await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidState(_)));
}

#[tokio::test]
async fn test_event_kwargs_reach_observers() {
    let (recorder, observers) = recorder();
    let cfg = config(json!({
        "__pipeline_start_kwargs": {"trace": "abc"},
        "__service_done_kwargs": {"queue": "results"}
    }));
    let mut pipeline = Pipeline::create("kwargs", cfg, observers).await.unwrap();
    pipeline.register(Service1).await.unwrap();

    pipeline.message(payload(json!({"note": "hello"}))).await.unwrap();
    pipeline.run().await.unwrap();

    let start = recorder.events_of(LifecycleEvent::PipelineStart);
    assert_eq!(start[0].kwargs.get("trace"), Some(&json!("abc")));
    let done = recorder.events_of(LifecycleEvent::ServiceDone);
    assert_eq!(done[0].kwargs.get("queue"), Some(&json!("results")));
    let message = recorder.events_of(LifecycleEvent::PipelineMessage);
    assert_eq!(message[0].kwargs.get("note"), Some(&json!("hello")));
}

#[tokio::test]
async fn test_static_kwargs_from_config() {
    let cfg = config(json!({"reader": {"__kwargs": {"limit": 10}}}));
    let mut pipeline = Pipeline::create("static", cfg, vec![]).await.unwrap();
    let reader = MockTask::new("reader");
    let calls = reader.call_log();
    pipeline.register(reader).await.unwrap();

    pipeline.run().await.unwrap();

    assert_eq!(calls.lock()[0], payload(json!({"limit": 10})));
}

#[tokio::test]
async fn test_task_messages_and_progress() {
    let (recorder, observers) = recorder();
    let mut pipeline = Pipeline::create("progress", Config::new(), observers).await.unwrap();
    pipeline
        .register(FnTask::new("reporter", |ctx: ServiceContext, _inputs| async move {
            ctx.set_percent(50);
            ctx.message(payload(json!({"step": "halfway"}))).await?;
            ctx.set_percent(100);
            Ok::<_, anyhow::Error>(Payload::new())
        }))
        .await
        .unwrap();

    pipeline.run().await.unwrap();

    let messages = recorder.events_of(LifecycleEvent::ServiceMessage);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kwargs.get("step"), Some(&json!("halfway")));
    assert_eq!(messages[0].kwargs.get("__service_name"), Some(&json!("reporter")));
    assert_eq!(pipeline.service_by_name("reporter").unwrap().percent(), 100);
}

#[tokio::test]
async fn test_memory_store_records_run() {
    let store = Arc::new(MemoryStore::new());
    let observers: Vec<Arc<dyn Observer>> = vec![store.clone()];
    let (pipeline, _seen) = four_services(Config::new(), observers).await;

    pipeline.run().await.unwrap();

    let record = store.pipeline(pipeline.id()).unwrap();
    assert_eq!(record.name, "four");
    assert_eq!(record.status, PipelineStatus::Done);
    assert!(record.started.is_some() && record.ended.is_some());

    let services = store.services_of(pipeline.id());
    assert_eq!(services.len(), 4);
    assert!(services.iter().all(|record| record.status == ServiceStatus::Done));
    assert_eq!(services[0].result_json.as_deref(), Some(r#"{"a":23}"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_on_explicit_handle() {
    let mut pipeline = Pipeline::create("handle", Config::new(), vec![]).await.unwrap();
    for index in 0..8 {
        pipeline
            .register(FnTask::from_sync(format!("task{index}"), move |_inputs| {
                Ok(payload(json!({"index": index})))
            }))
            .await
            .unwrap();
    }

    let summary = pipeline.run_on(&Handle::current()).await.unwrap();

    assert_eq!(summary.waves, 1);
    assert_eq!(summary.done.len(), 8);
}
