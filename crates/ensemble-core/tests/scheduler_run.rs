//! Wave execution, retry, blocking, and run-lock scenarios.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ensemble_core::{
    CannedInvoker, CollabError, CollaborationScheduler, RunLockTable, SchedulerPolicy,
    WorkerError, WorkerInvoker, WorkerRegistry, WorkerReply, WorkerSpec,
};
use ensemble_state::fakes::MemoryProjectStore;
use ensemble_state::{Project, ProjectStore, Task, TaskId, TaskStatus, WorkerRole};

const OWNER: i64 = 7;

fn fast_policy() -> SchedulerPolicy {
    SchedulerPolicy {
        max_retries: 2,
        base_backoff: Duration::from_millis(1),
        invoke_timeout: Duration::from_secs(5),
        max_concurrent: 4,
        worker_failure_threshold: 3,
    }
}

fn registry() -> Arc<WorkerRegistry> {
    let registry = WorkerRegistry::new(3);
    for (key, role) in [
        ("general", WorkerRole::General),
        ("research", WorkerRole::Research),
        ("code", WorkerRole::Code),
    ] {
        registry
            .register(WorkerSpec::new(key, key.to_uppercase(), role))
            .unwrap();
    }
    Arc::new(registry)
}

fn scheduler_with(
    store: Arc<MemoryProjectStore>,
    registry: Arc<WorkerRegistry>,
    invoker: Arc<dyn WorkerInvoker>,
    locks: Arc<RunLockTable>,
    policy: SchedulerPolicy,
) -> CollaborationScheduler {
    CollaborationScheduler::new(store, registry, invoker, locks, policy)
}

/// Persist a project with the classic three-task graph:
/// A (general), B (research), C (code, depends on A and B).
async fn abc_project(store: &MemoryProjectStore) -> (Project, TaskId, TaskId, TaskId) {
    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    let a = Task::new("analyze", WorkerRole::General, vec![]);
    let b = Task::new("investigate", WorkerRole::Research, vec![]);
    let c = Task::new("implement", WorkerRole::Code, vec![a.task_id, b.task_id]);
    let (ida, idb, idc) = (a.task_id, b.task_id, c.task_id);
    project.add_tasks(vec![a, b, c]);
    store.save_project(&project).await.unwrap();
    (project, ida, idb, idc)
}

#[tokio::test]
async fn abc_graph_runs_in_two_waves_and_records_contributions() {
    let store = Arc::new(MemoryProjectStore::new());
    let invoker = Arc::new(
        CannedInvoker::new()
            .with_reply(WorkerRole::General, "analysis", 0.8)
            .with_reply(WorkerRole::Research, "findings", 0.6)
            .with_reply(WorkerRole::Code, "patch", 0.9),
    );
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let (project, ida, idb, idc) = abc_project(&store).await;
    let result = scheduler.run(OWNER, project.project_id).await.unwrap();

    assert_eq!(result.waves_executed, 2);
    assert_eq!(result.done.len(), 3);
    assert!(result.failed.is_empty());
    assert!(!result.cancelled);

    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    for id in [ida, idb, idc] {
        assert_eq!(saved.task(&id).unwrap().status, TaskStatus::Done);
    }
    assert_eq!(saved.task(&ida).unwrap().confidence, Some(0.8));
    assert_eq!(saved.task(&idc).unwrap().confidence, Some(0.9));

    let entries = store.entries_for(&project.project_id).await.unwrap();
    assert_eq!(entries.len(), 3);
    // Wave barrier: the code contribution is recorded last.
    assert_eq!(entries[2].role, WorkerRole::Code);
}

#[tokio::test]
async fn exhausted_retries_fail_the_task_and_block_dependents() {
    let store = Arc::new(MemoryProjectStore::new());
    // The code worker never succeeds.
    let invoker = Arc::new(CannedInvoker::new().fail_first("code", u32::MAX));
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    let c = Task::new("implement", WorkerRole::Code, vec![]);
    let d = Task::new("document", WorkerRole::General, vec![c.task_id]);
    let (idc, idd) = (c.task_id, d.task_id);
    project.add_tasks(vec![c, d]);
    store.save_project(&project).await.unwrap();

    let result = scheduler.run(OWNER, project.project_id).await.unwrap();
    assert_eq!(result.failed, vec![idc]);
    assert_eq!(result.blocked, vec![idd]);

    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    let failed = saved.task(&idc).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.attempts, 3); // 1 initial + 2 retries
    assert!(failed.confidence.is_none());
    assert_eq!(saved.task(&idd).unwrap().status, TaskStatus::Blocked);
}

#[tokio::test]
async fn independent_failures_block_only_their_descendants() {
    let store = Arc::new(MemoryProjectStore::new());
    let registry = registry();
    registry
        .register(WorkerSpec::new("creative", "Creative", WorkerRole::Creative))
        .unwrap();
    let invoker = Arc::new(
        CannedInvoker::new()
            .fail_first("general", u32::MAX)
            .fail_first("research", u32::MAX),
    );
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry,
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    let a = Task::new("a", WorkerRole::General, vec![]);
    let b = Task::new("b", WorkerRole::Research, vec![]);
    let c = Task::new("c", WorkerRole::Code, vec![]);
    let d = Task::new("d", WorkerRole::Creative, vec![a.task_id]);
    let e = Task::new("e", WorkerRole::Creative, vec![b.task_id]);
    let f = Task::new("f", WorkerRole::Creative, vec![c.task_id]);
    let g = Task::new("g", WorkerRole::Creative, vec![d.task_id]);
    let ids = [
        a.task_id, b.task_id, c.task_id, d.task_id, e.task_id, f.task_id, g.task_id,
    ];
    project.add_tasks(vec![a, b, c, d, e, f, g]);
    store.save_project(&project).await.unwrap();

    let result = scheduler.run(OWNER, project.project_id).await.unwrap();

    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    let status = |i: usize| saved.task(&ids[i]).unwrap().status;

    assert_eq!(status(0), TaskStatus::Failed);
    assert_eq!(status(1), TaskStatus::Failed);
    assert_eq!(status(2), TaskStatus::Done);
    // Descendants of the failures, direct and transitive.
    assert_eq!(status(3), TaskStatus::Blocked);
    assert_eq!(status(4), TaskStatus::Blocked);
    assert_eq!(status(6), TaskStatus::Blocked);
    // The unrelated branch still completes.
    assert_eq!(status(5), TaskStatus::Done);
    assert_eq!(result.done.len(), 2);
}

#[tokio::test]
async fn rerunning_a_finished_project_is_idempotent() {
    let store = Arc::new(MemoryProjectStore::new());
    let invoker = Arc::new(CannedInvoker::new());
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let (project, ..) = abc_project(&store).await;
    scheduler.run(OWNER, project.project_id).await.unwrap();

    let before = store.load_project(OWNER, &project.project_id).await.unwrap();
    let entries_before = store.entries_for(&project.project_id).await.unwrap().len();

    let rerun = scheduler.run(OWNER, project.project_id).await.unwrap();
    assert_eq!(rerun.waves_executed, 0);

    let after = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.tasks, before.tasks);
    assert_eq!(
        store.entries_for(&project.project_id).await.unwrap().len(),
        entries_before
    );
}

#[tokio::test]
async fn concurrent_run_for_same_project_is_rejected() {
    let store = Arc::new(MemoryProjectStore::new());
    let locks = RunLockTable::new();
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        Arc::new(CannedInvoker::new()),
        Arc::clone(&locks),
        fast_policy(),
    );

    let (project, ida, ..) = abc_project(&store).await;

    let _held = locks.acquire(project.project_id).unwrap();
    let result = scheduler.run(OWNER, project.project_id).await;
    assert!(matches!(result, Err(CollabError::ProjectBusy { .. })));

    // Nothing moved.
    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(saved.task(&ida).unwrap().status, TaskStatus::Pending);
    assert!(store.entries_for(&project.project_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_after_transient_failure_succeeds() {
    let store = Arc::new(MemoryProjectStore::new());
    let invoker = Arc::new(CannedInvoker::new().fail_first("general", 1));
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    let a = Task::new("analyze", WorkerRole::General, vec![]);
    let ida = a.task_id;
    project.add_tasks(vec![a]);
    store.save_project(&project).await.unwrap();

    let result = scheduler.run(OWNER, project.project_id).await.unwrap();
    assert_eq!(result.done, vec![ida]);

    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(saved.task(&ida).unwrap().attempts, 2);
}

/// Invoker that never returns within the timeout.
struct StalledInvoker;

#[async_trait]
impl WorkerInvoker for StalledInvoker {
    async fn invoke(
        &self,
        _worker: &WorkerSpec,
        _prompt: &str,
        _context: &str,
    ) -> Result<WorkerReply, WorkerError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("the scheduler timeout fires first")
    }
}

#[tokio::test]
async fn invocation_timeout_is_a_retryable_failure_not_an_abort() {
    let store = Arc::new(MemoryProjectStore::new());
    let policy = SchedulerPolicy {
        max_retries: 1,
        base_backoff: Duration::from_millis(1),
        invoke_timeout: Duration::from_millis(10),
        ..fast_policy()
    };
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        Arc::new(StalledInvoker),
        RunLockTable::new(),
        policy,
    );

    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    let a = Task::new("analyze", WorkerRole::General, vec![]);
    let ida = a.task_id;
    project.add_tasks(vec![a]);
    store.save_project(&project).await.unwrap();

    // The run itself succeeds; only the task fails.
    let result = scheduler.run(OWNER, project.project_id).await.unwrap();
    assert_eq!(result.failed, vec![ida]);

    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(saved.task(&ida).unwrap().attempts, 2);
}

#[tokio::test]
async fn persistently_failing_worker_is_taken_out_of_rotation() {
    let store = Arc::new(MemoryProjectStore::new());
    let registry = Arc::new({
        let r = WorkerRegistry::new(2);
        r.register(WorkerSpec::new("general", "General", WorkerRole::General))
            .unwrap();
        r
    });
    let invoker = Arc::new(CannedInvoker::new().fail_first("general", u32::MAX));
    let scheduler = scheduler_with(
        Arc::clone(&store),
        Arc::clone(&registry),
        invoker,
        RunLockTable::new(),
        fast_policy(),
    );

    let mut project = store.create_project(OWNER, "demo", "").await.unwrap();
    project.add_tasks(vec![Task::new("analyze", WorkerRole::General, vec![])]);
    store.save_project(&project).await.unwrap();

    scheduler.run(OWNER, project.project_id).await.unwrap();
    assert!(registry.list_available(Some(WorkerRole::General)).is_empty());
}

#[tokio::test]
async fn cancellation_before_the_first_wave_dispatches_nothing() {
    let store = Arc::new(MemoryProjectStore::new());
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        Arc::new(CannedInvoker::new()),
        RunLockTable::new(),
        fast_policy(),
    );

    let (project, ida, ..) = abc_project(&store).await;

    let (tx, rx) = tokio::sync::watch::channel(true);
    drop(tx);
    let result = scheduler
        .run_with_cancel(OWNER, project.project_id, Some(rx))
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.waves_executed, 0);
    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(saved.task(&ida).unwrap().status, TaskStatus::Pending);
}

/// Invoker that requests cancellation as a side effect of the first wave.
struct CancelAfterFirstWave {
    tx: tokio::sync::watch::Sender<bool>,
}

#[async_trait]
impl WorkerInvoker for CancelAfterFirstWave {
    async fn invoke(
        &self,
        worker: &WorkerSpec,
        _prompt: &str,
        _context: &str,
    ) -> Result<WorkerReply, WorkerError> {
        let _ = self.tx.send(true);
        Ok(WorkerReply {
            text: format!("{} reply", worker.worker_key),
            confidence: 0.8,
        })
    }
}

#[tokio::test]
async fn cancellation_between_waves_keeps_the_finished_wave() {
    let store = Arc::new(MemoryProjectStore::new());
    let (tx, rx) = tokio::sync::watch::channel(false);
    let scheduler = scheduler_with(
        Arc::clone(&store),
        registry(),
        Arc::new(CancelAfterFirstWave { tx }),
        RunLockTable::new(),
        fast_policy(),
    );

    let (project, ida, idb, idc) = abc_project(&store).await;
    let result = scheduler
        .run_with_cancel(OWNER, project.project_id, Some(rx))
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.waves_executed, 1);

    // Wave one finished and persisted; the dependent wave never started.
    let saved = store.load_project(OWNER, &project.project_id).await.unwrap();
    assert_eq!(saved.task(&ida).unwrap().status, TaskStatus::Done);
    assert_eq!(saved.task(&idb).unwrap().status, TaskStatus::Done);
    assert_eq!(saved.task(&idc).unwrap().status, TaskStatus::Pending);
    assert_eq!(store.entries_for(&project.project_id).await.unwrap().len(), 2);
}
