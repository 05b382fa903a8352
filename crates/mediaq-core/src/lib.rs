//! mediaq-core
//!
//! 重いメディア処理のための同時実行数制限付き task queue
//!
//! # モジュール構成
//! - **domain**: ids, status, progress
//! - **ports**: Clock, IdGenerator, NotificationSink
//! - **task**: Task trait, TaskContext, Signals, TaskHandle, FnTask
//! - **queue**: Queue エンジン（C 本まで同時実行、FIFO）と TaskQueue（C = 1, 手動開始）
//! - **notify**: task の signal を UI 側のチャネルへ中継する
//! - **media**: ffmpeg を使う VideoTool
//! - **routes**: addTask / startTask / drainQueue などの入口
//! - **config**: SchedulerConfig と Scheduler（プロセス内で長生きする queue 群）

pub mod config;
pub mod domain;
pub mod error;
pub mod media;
pub mod notify;
pub mod ports;
pub mod queue;
pub mod routes;
pub mod task;

mod sync;

pub use config::{ImageJob, Scheduler, SchedulerConfig};
pub use domain::{Progress, QueueId, TaskId, TaskStatus};
pub use error::{BuildError, ConfigError, TaskError};
pub use queue::{Queue, QueueBuilder, QueueConfig, QueueCounts, TaskQueue};
pub use task::{FnTask, Task, TaskContext, TaskHandle};
