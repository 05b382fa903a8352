//! TaskQueue - 排他的な外部リソース用の完全直列 queue

use super::{Queue, QueueConfig, QueueCounts};
use crate::task::{Task, TaskHandle};

/// slot が 1 つで手動開始の `Queue`
///
/// 全 task が 1 つの排他リソースを取り合う所（encoder プロセスは同時に 1 つ）で使う。
/// 振る舞いは `Queue` と同じ。型を分けて、呼び出し側が直列実行を前提にできるようにしている。
pub struct TaskQueue<T: Task> {
    queue: Queue<T>,
}

impl<T: Task> TaskQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let queue = Queue::from_valid_config(QueueConfig {
            name: name.into(),
            concurrency: 1,
            auto_run: false,
        });
        Self { queue }
    }

    pub fn add(&self, task: TaskHandle<T>) {
        self.queue.add(task);
    }

    pub fn run(&self) {
        self.queue.run();
    }

    pub async fn drain(&self) {
        self.queue.drain().await;
    }

    pub fn counts(&self) -> QueueCounts {
        self.queue.counts()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn as_queue(&self) -> &Queue<T> {
        &self.queue
    }
}

impl<T: Task> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T: Task> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TaskQueue").field(&self.queue).finish()
    }
}
