//! scheduler の設定と、そこから作る常駐 queue 群

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, ConfigError};
use crate::media::{VideoTool, VideoToolOptions};
use crate::ports::NotificationSink;
use crate::queue::{Queue, QueueConfig, TaskQueue};
use crate::routes::{TaskRoutes, VideoRoutes, names};
use crate::task::FnTask;

/// 画像系 queue で動く closure の job。結果の JSON はそのまま UI に中継する。
pub type ImageJob = FnTask<serde_json::Value>;

/// リソース種別ごとに 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub text_image: QueueConfig,
    pub main_image_shadow: QueueConfig,
    pub image_tool: QueueConfig,
    pub video_tool: VideoQueueConfig,
}

/// video queue は常に 1 slot・手動実行。設定できるのは名前と encoder の既定 option だけ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQueueConfig {
    pub name: String,
    #[serde(default = "default_video_options")]
    pub defaults: VideoToolOptions,
}

fn default_video_options() -> VideoToolOptions {
    VideoToolOptions::new(".")
}

impl Default for VideoQueueConfig {
    fn default() -> Self {
        Self {
            name: "video-tool".to_string(),
            defaults: default_video_options(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            text_image: QueueConfig {
                name: "text-image".to_string(),
                concurrency: 2,
                auto_run: true,
            },
            main_image_shadow: QueueConfig {
                name: "main-image-shadow".to_string(),
                concurrency: 2,
                auto_run: true,
            },
            image_tool: QueueConfig {
                name: "image-tool".to_string(),
                concurrency: 2,
                auto_run: false,
            },
            video_tool: VideoQueueConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        self.text_image.validate()?;
        self.main_image_shadow.validate()?;
        self.image_tool.validate()
    }
}

/// プロセス全体の queue。起動時に 1 回作り、producer に渡す。
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub text_image: Queue<ImageJob>,
    pub main_image_shadow: Queue<ImageJob>,
    pub image_tool: Queue<ImageJob>,
    pub video_tool: TaskQueue<VideoTool>,
    video_defaults: VideoToolOptions,
}

impl Scheduler {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, BuildError> {
        let scheduler = Self {
            text_image: Queue::from_config(config.text_image.clone())?,
            main_image_shadow: Queue::from_config(config.main_image_shadow.clone())?,
            image_tool: Queue::from_config(config.image_tool.clone())?,
            video_tool: TaskQueue::new(config.video_tool.name.clone()),
            video_defaults: config.video_tool.defaults.clone(),
        };
        tracing::debug!(
            text_image = scheduler.text_image.concurrency(),
            main_image_shadow = scheduler.main_image_shadow.concurrency(),
            image_tool = scheduler.image_tool.concurrency(),
            "scheduler built"
        );
        Ok(scheduler)
    }

    pub fn video_defaults(&self) -> &VideoToolOptions {
        &self.video_defaults
    }

    /// video routes。`defaults` があれば設定の既定値の代わりに使う。
    pub fn video_routes(
        &self,
        sink: Arc<dyn NotificationSink>,
        defaults: Option<VideoToolOptions>,
    ) -> VideoRoutes {
        VideoRoutes::new(
            self.video_tool.clone(),
            defaults.unwrap_or_else(|| self.video_defaults.clone()),
            sink,
        )
    }

    pub fn image_tool_routes(&self, sink: Arc<dyn NotificationSink>) -> TaskRoutes<ImageJob> {
        TaskRoutes::new(self.image_tool.clone(), sink)
    }

    /// `genTextImg`: 結果は `on:genTextImg` に届く。
    pub fn text_image_routes(&self, sink: Arc<dyn NotificationSink>) -> TaskRoutes<ImageJob> {
        TaskRoutes::with_end_channel(self.text_image.clone(), sink, names::ON_GEN_TEXT_IMG)
    }

    /// `genMainImgShadow`: 結果は `on:genMainImgShadow` に届く。
    pub fn main_image_shadow_routes(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> TaskRoutes<ImageJob> {
        TaskRoutes::with_end_channel(
            self.main_image_shadow.clone(),
            sink,
            names::ON_GEN_MAIN_IMG_SHADOW,
        )
    }

    /// 全 queue が idle になるまで待つ。
    pub async fn drain_all(&self) {
        tokio::join!(
            self.text_image.drain(),
            self.main_image_shadow.drain(),
            self.image_tool.drain(),
            self.video_tool.drain(),
        );
    }
}
