//! TaskHandle - task 1 件の ID・状態・結果

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::signals::Signals;
use super::{Task, TaskContext};
use crate::domain::{Progress, TaskId, TaskStatus};
use crate::error::TaskError;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::sync::lock;

type Outcome<O> = Option<Result<O, TaskError>>;

/// task の共有ハンドル
///
/// clone は `Arc` のコピーだけ。producer は observer 登録と結果の取得用に
/// 1 つ持ち、queue は `add` から終端までもう 1 つ持つ。
pub struct TaskHandle<T: Task> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Task> {
    id: TaskId,
    task: T,
    signals: Signals<T::Output>,
    status: Mutex<TaskStatus>,
    /// queue が引き取ったら立つ
    accepted: AtomicBool,
    outcome: watch::Sender<Outcome<T::Output>>,
}

impl<T: Task> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Task> TaskHandle<T> {
    /// `task` に新しい ULID を振って包む。
    pub fn new(task: T) -> Self {
        Self::with_generator(task, &UlidGenerator::new(SystemClock))
    }

    pub fn with_generator(task: T, ids: &dyn IdGenerator) -> Self {
        Self::with_id(ids.generate_task_id(), task)
    }

    pub fn with_id(id: TaskId, task: T) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                id,
                task,
                signals: Signals::new(id),
                status: Mutex::new(TaskStatus::Queued),
                accepted: AtomicBool::new(false),
                outcome,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn task(&self) -> &T {
        &self.inner.task
    }

    pub fn status(&self) -> TaskStatus {
        *lock(&self.inner.status)
    }

    pub fn signals(&self) -> &Signals<T::Output> {
        &self.inner.signals
    }

    pub fn on_start(&self, observer: impl Fn(TaskId, &str) + Send + Sync + 'static) -> &Self {
        self.inner.signals.on_start(observer);
        self
    }

    pub fn on_progress(
        &self,
        observer: impl Fn(TaskId, &Progress) + Send + Sync + 'static,
    ) -> &Self {
        self.inner.signals.on_progress(observer);
        self
    }

    pub fn on_error(&self, observer: impl Fn(TaskId, &TaskError) + Send + Sync + 'static) -> &Self {
        self.inner.signals.on_error(observer);
        self
    }

    pub fn on_end(&self, observer: impl Fn(TaskId, &T::Output) + Send + Sync + 'static) -> &Self {
        self.inner.signals.on_end(observer);
        self
    }

    /// 終端後の結果
    pub fn outcome(&self) -> Option<Result<T::Output, TaskError>> {
        self.inner.outcome.borrow().clone()
    }

    /// 終端まで待って結果を返す。
    ///
    /// 実行されない task では返らない。
    pub fn wait(
        &self,
    ) -> impl std::future::Future<Output = Result<T::Output, TaskError>> + Send + '_ {
        async move {
            let mut rx = self.inner.outcome.subscribe();
            loop {
                let outcome = rx.borrow_and_update().clone();
                if let Some(outcome) = outcome {
                    return outcome;
                }
                // sender は `inner` にあり、`self` が生かしている。
                if rx.changed().await.is_err() {
                    return Err(TaskError::Cancelled);
                }
            }
        }
    }

    /// queue が引き取る。既に別の queue が引き取っていれば `false`。
    pub(crate) fn accept(&self) -> bool {
        !self.inner.accepted.swap(true, Ordering::AcqRel)
    }

    /// `next` に遷移する。不正な遷移は scheduler のバグ。
    pub(crate) fn transition(&self, next: TaskStatus) {
        let mut status = lock(&self.inner.status);
        assert!(
            status.can_transition_to(next),
            "illegal status transition {:?} -> {next:?} for {}",
            *status,
            self.inner.id
        );
        *status = next;
    }

    /// task の execute を呼ぶ。
    pub(crate) async fn execute(&self) -> Result<T::Output, TaskError> {
        let ctx = TaskContext::new(self.inner.signals.lifecycle());
        self.inner.task.execute(&ctx).await
    }

    /// 終端状態を記録し `end`/`error` を配ってから、waiter に結果を公開する。
    ///
    /// observer が panic してもログに残すだけで、結果は公開する。
    pub(crate) fn complete(&self, outcome: Result<T::Output, TaskError>) {
        let next = if outcome.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.transition(next);

        let delivered = catch_unwind(AssertUnwindSafe(|| self.inner.signals.finish(&outcome)));
        if delivered.is_err() {
            tracing::error!(task_id = %self.inner.id, "observer panicked while delivering terminal signal");
        }

        self.inner.outcome.send_replace(Some(outcome));
    }
}

impl<T: Task> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.task.kind())
            .field("status", &self.status())
            .finish()
    }
}
