//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: `Clock` の timestamp + 80-bit random

use crate::domain::ids::{QueueId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// プロセス内で一意な ID を生成する
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_queue_id(&self) -> QueueId;
}

/// ULID ベースの ID 生成
///
/// timestamp は `C` から取る。`FixedClock` なら timestamp 部分が固定になる
/// （random 部分があるので一意性は保たれる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_queue_id(&self) -> QueueId {
        QueueId::from(self.next_ulid())
    }
}
