//! ドメインモデル（ids, status, progress）

pub mod ids;
pub mod progress;
pub mod status;

pub use ids::{QueueId, TaskId};
pub use progress::Progress;
pub use status::TaskStatus;
