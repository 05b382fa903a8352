//! Ports - 外部との境界
//!
//! - `Clock` / `IdGenerator`: ID 生成（テストで差し替え可能）
//! - `NotificationSink`: 中継した task signal の送り先

pub mod clock;
pub mod id_generator;
pub mod notification_sink;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notification_sink::NotificationSink;
