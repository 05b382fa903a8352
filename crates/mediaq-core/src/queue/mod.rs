//! Queue モジュール: 設定、同時実行数制限付きのエンジン、1 slot の `TaskQueue`

mod config;
mod counts;
mod engine;
mod task_queue;

pub use config::{QueueBuilder, QueueConfig};
pub use counts::QueueCounts;
pub use engine::Queue;
pub use task_queue::TaskQueue;
