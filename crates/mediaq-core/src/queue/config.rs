//! Queue の設定と builder

use serde::{Deserialize, Serialize};

use super::Queue;
use crate::error::BuildError;
use crate::task::Task;

/// queue 1 つ分の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub name: String,

    /// 同時に走らせる task の上限（C >= 1）
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// `add` のたびに実行するか、`run` を呼ぶまで待つか
    #[serde(default = "default_auto_run")]
    pub auto_run: bool,
}

fn default_concurrency() -> usize {
    1
}

fn default_auto_run() -> bool {
    true
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concurrency: default_concurrency(),
            auto_run: default_auto_run(),
        }
    }

    /// エンジンが守れない設定はここで弾く。
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.concurrency == 0 {
            return Err(BuildError::InvalidConcurrency {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// `Queue` を組み立てる。
///
/// # Example
/// ```ignore
/// let queue: Queue<ImageJob> = QueueBuilder::new("image-tool")
///     .concurrency(2)
///     .auto_run(false)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: QueueConfig::new(name),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn auto_run(mut self, auto_run: bool) -> Self {
        self.config.auto_run = auto_run;
        self
    }

    pub fn build<T: Task>(self) -> Result<Queue<T>, BuildError> {
        Queue::from_config(self.config)
    }
}
