//! Queue エンジン: 同時実行数制限付きの FIFO scheduler

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::Instrument;

use super::{QueueConfig, QueueCounts};
use crate::domain::{QueueId, TaskId, TaskStatus};
use crate::error::{BuildError, TaskError};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::sync::lock;
use crate::task::{Task, TaskHandle};

/// 同時実行数制限付きの task queue
///
/// - `Running` の task は同時に `concurrency` 件まで。
/// - pending の task は add した順に開始する。
/// - 終わった task（成功でも失敗でも）は slot を空け、外からの poll なしで
///   次の pending が始まる。
/// - 失敗した task が queue を止めることはない。
///
/// clone すると同じ queue を指すハンドルがもう 1 つ得られる。
///
/// `add`（auto-run 時）と `run` は現在の Tokio runtime に spawn するので、
/// runtime の中から呼ぶこと。
pub struct Queue<T: Task> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Task> {
    id: QueueId,
    name: String,
    concurrency: usize,
    auto_run: bool,
    state: Mutex<State<T>>,
    /// pending と running が両方空のときだけ `true`
    idle: watch::Sender<bool>,
}

/// スケジューリングで書き換わる状態。`Shared::state` の lock 下でだけ触る。
struct State<T: Task> {
    pending: VecDeque<TaskHandle<T>>,
    running: HashMap<TaskId, TaskHandle<T>>,
    /// `run` で立ち、次に idle になったら下りる。
    active: bool,
    completed: u64,
    failed: u64,
}

impl<T: Task> State<T> {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }
}

impl<T: Task> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Task> Queue<T> {
    pub fn from_config(config: QueueConfig) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// `config.validate()` 済みであること。
    pub(super) fn from_valid_config(config: QueueConfig) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                id: UlidGenerator::new(SystemClock).generate_queue_id(),
                name: config.name,
                concurrency: config.concurrency,
                auto_run: config.auto_run,
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    active: false,
                    completed: 0,
                    failed: 0,
                }),
                idle,
            }),
        }
    }

    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    pub fn auto_run(&self) -> bool {
        self.shared.auto_run
    }

    /// `task` を pending の末尾に積む。
    ///
    /// auto-run のとき（または `run` の処理中）は空き slot をすぐ埋める。
    /// ブロックも拒否もしない。既にどこかの queue が持つハンドルは無視する。
    pub fn add(&self, task: TaskHandle<T>) {
        if !task.accept() {
            tracing::warn!(queue = %self.shared.name, task_id = %task.id(), "task was already added to a queue; ignoring");
            return;
        }

        {
            let mut state = lock(&self.shared.state);
            tracing::debug!(
                queue = %self.shared.name,
                task_id = %task.id(),
                kind = task.task().kind(),
                pending = state.pending.len() + 1,
                "task added"
            );
            state.pending.push_back(task);
            self.shared.idle.send_if_modified(|idle| std::mem::replace(idle, false));
        }

        Shared::schedule(&self.shared);
    }

    /// queue が再び idle になるまで pending の task を流す。
    ///
    /// 冪等。実行中に呼んでも何も変わらない。
    pub fn run(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.is_idle() {
                return;
            }
            if !state.active {
                tracing::debug!(queue = %self.shared.name, pending = state.pending.len(), "queue started");
            }
            state.active = true;
        }

        Shared::schedule(&self.shared);
    }

    /// pending も running も無くなったら返る。
    ///
    /// 実行は開始しない。手動 queue に pending がある場合、誰かが `run` を
    /// 呼ぶまで返らない（呼ばれなければ永遠に待つ）。
    pub fn drain(&self) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let mut idle = self.shared.idle.subscribe();
            loop {
                let now_idle = *idle.borrow_and_update();
                if now_idle {
                    break;
                }
                // sender は `shared` にあり、`self` が生かしている。
                if idle.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.shared.idle.borrow()
    }

    pub fn counts(&self) -> QueueCounts {
        let state = lock(&self.shared.state);
        QueueCounts {
            queued: state.pending.len(),
            running: state.running.len(),
            completed: state.completed,
            failed: state.failed,
        }
    }
}

impl<T: Task> Shared<T> {
    /// 空き slot を pending の先頭から埋める。
    ///
    /// 件数の更新は lock 下で行い、spawn は lock を外してから行う。
    fn schedule(shared: &Arc<Self>) {
        let ready = {
            let mut state = lock(&shared.state);
            if !(shared.auto_run || state.active) {
                return;
            }

            let mut ready = Vec::new();
            while state.running.len() < shared.concurrency {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                task.transition(TaskStatus::Running);
                state.running.insert(task.id(), task.clone());
                ready.push(task);
            }

            assert!(
                state.running.len() <= shared.concurrency,
                "queue {} has {} running tasks with concurrency {}",
                shared.name,
                state.running.len(),
                shared.concurrency
            );
            ready
        };

        for task in ready {
            Self::spawn(shared, task);
        }
    }

    fn spawn(shared: &Arc<Self>, task: TaskHandle<T>) {
        let shared = Arc::clone(shared);
        let span = tracing::info_span!(
            "task",
            queue = %shared.name,
            task_id = %task.id(),
            kind = task.task().kind(),
        );

        tokio::spawn(
            async move {
                tracing::debug!("task started");

                // execute は別 task で走らせる。panic しても捕まえて slot を空ける。
                let execution = {
                    let task = task.clone();
                    tokio::spawn(async move { task.execute().await }.in_current_span())
                };
                let outcome = match execution.await {
                    Ok(outcome) => outcome,
                    Err(err) if err.is_panic() => Err(TaskError::Panicked(panic_message(err))),
                    Err(_) => Err(TaskError::Cancelled),
                };

                match &outcome {
                    Ok(_) => tracing::info!("task completed"),
                    Err(err) => tracing::warn!(error = %err, "task failed"),
                }

                task.complete(outcome);
                Self::finish(&shared, &task);
            }
            .instrument(span),
        );
    }

    /// `task` の slot を空けて queue を進める。
    fn finish(shared: &Arc<Self>, task: &TaskHandle<T>) {
        {
            let mut state = lock(&shared.state);
            state.running.remove(&task.id());
            match task.status() {
                TaskStatus::Completed => state.completed += 1,
                _ => state.failed += 1,
            }

            if state.is_idle() {
                state.active = false;
                shared.idle.send_if_modified(|idle| !std::mem::replace(idle, true));
                tracing::debug!(
                    completed = state.completed,
                    failed = state.failed,
                    "queue drained"
                );
            }
        }

        Self::schedule(shared);
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<T: Task> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("concurrency", &self.shared.concurrency)
            .field("auto_run", &self.shared.auto_run)
            .field("counts", &self.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueBuilder;
    use crate::task::{FnTask, TaskContext};

    fn queue(concurrency: usize, auto_run: bool) -> Queue<FnTask<u32>> {
        QueueBuilder::new("test")
            .concurrency(concurrency)
            .auto_run(auto_run)
            .build()
            .unwrap()
    }

    fn value(n: u32) -> TaskHandle<FnTask<u32>> {
        TaskHandle::new(FnTask::new("value", move |_ctx: TaskContext| async move { Ok(n) }))
    }

    #[tokio::test]
    async fn empty_queue_drains_immediately() {
        let q = queue(1, true);
        assert!(q.is_idle());
        q.drain().await;
    }

    #[tokio::test]
    async fn add_counts_pending_on_manual_queue() {
        let q = queue(2, false);
        q.add(value(1));
        q.add(value(2));

        let counts = q.counts();
        assert_eq!(counts.queued, 2);
        assert_eq!(counts.running, 0);
        assert!(!q.is_idle());
    }

    #[tokio::test]
    async fn auto_run_queue_completes_tasks() {
        let q = queue(2, true);
        let a = value(1);
        let b = value(2);
        q.add(a.clone());
        q.add(b.clone());
        q.drain().await;

        assert_eq!(a.outcome(), Some(Ok(1)));
        assert_eq!(b.outcome(), Some(Ok(2)));
        assert_eq!(q.counts().completed, 2);
    }

    #[tokio::test]
    async fn run_on_empty_manual_queue_does_not_stay_active() {
        let q = queue(1, false);
        q.run();

        let task = value(1);
        q.add(task.clone());
        tokio::task::yield_now().await;

        assert_eq!(task.status(), TaskStatus::Queued);
        assert_eq!(q.counts().queued, 1);
    }

    #[tokio::test]
    async fn manual_queue_goes_back_to_waiting_after_draining() {
        let q = queue(1, false);
        q.add(value(1));
        q.run();
        q.drain().await;

        let late = value(2);
        q.add(late.clone());
        tokio::task::yield_now().await;
        assert_eq!(late.status(), TaskStatus::Queued);

        q.run();
        q.drain().await;
        assert_eq!(late.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn duplicate_add_is_ignored() {
        let q = queue(1, false);
        let task = value(1);
        q.add(task.clone());
        q.add(task.clone());
        assert_eq!(q.counts().queued, 1);
    }

    #[tokio::test]
    async fn drain_and_wait_can_be_spawned_for_borrowed_outputs() {
        let q: Queue<FnTask<&'static str>> = QueueBuilder::new("test")
            .auto_run(false)
            .build()
            .unwrap();
        let task = TaskHandle::new(FnTask::new("static", |_ctx: TaskContext| async move {
            Ok("done")
        }));
        q.add(task.clone());

        let drained = tokio::spawn({
            let q = q.clone();
            async move { q.drain().await }
        });
        let waited = tokio::spawn({
            let task = task.clone();
            async move { task.wait().await }
        });
        tokio::task::yield_now().await;
        assert!(!drained.is_finished());

        q.run();
        drained.await.unwrap();
        assert_eq!(waited.await.unwrap(), Ok("done"));
    }

    fn explode() -> Result<u32, TaskError> {
        panic!("encoder exploded")
    }

    #[tokio::test]
    async fn panicking_task_fails_and_frees_its_slot() {
        let q = queue(1, true);
        let bad = TaskHandle::new(FnTask::new("panics", |_ctx: TaskContext| async move {
            explode()
        }));
        let next = value(9);

        q.add(bad.clone());
        q.add(next.clone());
        q.drain().await;

        assert_eq!(
            bad.outcome(),
            Some(Err(TaskError::Panicked("encoder exploded".to_string())))
        );
        assert_eq!(next.outcome(), Some(Ok(9)));
        assert_eq!(q.counts().failed, 1);
        assert_eq!(q.counts().completed, 1);
    }
}
