//! Task - スケジュールされる仕事 1 件
//!
//! # 2 層構成
//! - **`Task`**: 仕事の中身（encoder 実行、画像合成など）。
//!   実装するのは `execute` だけ。
//! - **`TaskHandle`**: ID・状態・observer・結果。producer が持ち、
//!   実行中は queue が所有する。
//!
//! `start` と `progress` は task が `TaskContext` 経由で出す。
//! `error` と `end` は `execute` の結果から handle が出すので、
//! 実行された task ではどちらか一方だけが必ず発火する。

mod handle;
mod signals;
mod task_fn;

pub use self::handle::TaskHandle;
pub use self::signals::{EndObserver, ErrorObserver, ProgressObserver, Signals, StartObserver};
pub use self::task_fn::{FnTask, TaskFuture};

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Progress, TaskId};
use crate::error::TaskError;
use self::signals::Lifecycle;

/// queue が実行できる仕事
///
/// # Example
/// ```ignore
/// struct Resize { path: PathBuf }
///
/// #[async_trait]
/// impl Task for Resize {
///     type Output = PathBuf;
///
///     async fn execute(&self, ctx: &TaskContext) -> Result<PathBuf, TaskError> {
///         ctx.start(format!("resize {}", self.path.display()));
///         // ...
///         ctx.progress(Progress::percent(100.0));
///         Ok(self.path.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// ログのフィールドに出す短いラベル
    fn kind(&self) -> &'static str {
        "task"
    }

    /// 仕事を実行する。出力を返すか、原因付きで失敗する。
    async fn execute(&self, ctx: &TaskContext) -> Result<Self::Output, TaskError>;
}

/// `Task::execute` に渡される。task の `start` と `progress` を出す。
///
/// clone が軽いので、補助の future（外部プロセスの出力 reader など）に move できる。
#[derive(Clone)]
pub struct TaskContext {
    lifecycle: Arc<Lifecycle>,
}

impl TaskContext {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn id(&self) -> TaskId {
        self.lifecycle.id()
    }

    /// `start` を出す。届くのは最初の 1 回だけ。
    pub fn start(&self, context: impl AsRef<str>) {
        self.lifecycle.emit_start(context.as_ref());
    }

    /// `progress` を出す。observer から見て `percent` は戻らない。
    pub fn progress(&self, progress: Progress) {
        self.lifecycle.emit_progress(progress);
    }

    pub fn percent(&self, percent: f64) {
        self.progress(Progress::percent(percent));
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext").field("id", &self.id()).finish()
    }
}
