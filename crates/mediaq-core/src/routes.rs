//! Producer 側の入口
//!
//! IPC 層から "add task" / "start task" / "drain queue" として呼ばれる。
//! task を作って通知の中継をつなぎ、常駐 queue に渡す。

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::TaskId;
use crate::media::{VideoTool, VideoToolOptions, VideoToolOverrides};
use crate::notify::{Channels, forward};
use crate::ports::NotificationSink;
use crate::queue::{Queue, TaskQueue};
use crate::task::{Task, TaskHandle};

/// UI プロセスと共有する route 名・チャネル名
pub mod names {
    pub const ADD_TASK: &str = "addTask";
    pub const START_TASK: &str = "startTask";
    pub const DRAIN_QUEUE: &str = "drainQueue";
    pub const GEN_TEXT_IMG: &str = "genTextImg";
    pub const GEN_MAIN_IMG_SHADOW: &str = "genMainImgShadow";
    pub const ADD_VIDEO_TASK: &str = "addVideoTask";
    pub const START_VIDEO_TASK: &str = "startVideoTask";
    pub const DRAIN_VIDEO_QUEUE: &str = "drainVideoQueue";

    pub const ON_TASK_START: &str = "on:taskStart";
    pub const ON_PROGRESS: &str = "on:progress";
    pub const ON_FAILED_TASK: &str = "on:faildTask";
    pub const ON_COMPOSITE: &str = "on:composite";
    pub const ON_GEN_TEXT_IMG: &str = "on:genTextImg";
    pub const ON_GEN_MAIN_IMG_SHADOW: &str = "on:genMainImgShadow";
    pub const ON_VIDEO_PROGRESS: &str = "on:video-progress";
    pub const ON_VIDEO_ERROR: &str = "on:video-error";
    pub const ON_VIDEO_COMPLETE: &str = "on:video-complete";
}

/// `addVideoTask` リクエストのファイル 1 件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVideoTaskData {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub options: Option<VideoToolOverrides>,
}

/// `addVideoTask` の返り値。`id` で後続の通知と突き合わせる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub id: TaskId,
    pub path: PathBuf,
    pub name: String,
}

/// 1 slot の encoder queue に対する video routes
pub struct VideoRoutes {
    queue: TaskQueue<VideoTool>,
    defaults: VideoToolOptions,
    sink: Arc<dyn NotificationSink>,
    channels: Channels,
}

impl VideoRoutes {
    pub fn new(
        queue: TaskQueue<VideoTool>,
        defaults: VideoToolOptions,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            queue,
            defaults,
            sink,
            channels: Channels {
                start: Some(names::ON_TASK_START.to_string()),
                progress: Some(names::ON_VIDEO_PROGRESS.to_string()),
                error: Some(names::ON_VIDEO_ERROR.to_string()),
                end: Some(names::ON_VIDEO_COMPLETE.to_string()),
            },
        }
    }

    /// `addVideoTask`: ファイルごとに encoder 実行を積む。開始はしない。
    pub fn add_video_task(&self, files: Vec<StartVideoTaskData>) -> Vec<VideoInfo> {
        files
            .into_iter()
            .map(|file| {
                let options = match &file.options {
                    Some(overrides) => self.defaults.merged(overrides),
                    None => self.defaults.clone(),
                };
                let task = TaskHandle::new(VideoTool::new(&file.path, &file.name, options));
                forward(&task, Arc::clone(&self.sink), &self.channels);

                let info = VideoInfo {
                    id: task.id(),
                    path: file.path,
                    name: file.name,
                };
                self.queue.add(task);
                info
            })
            .collect()
    }

    /// `startVideoTask`.
    pub fn start_video_task(&self) -> bool {
        self.queue.run();
        true
    }

    /// `drainVideoQueue`.
    pub async fn drain_video_queue(&self) {
        self.queue.drain().await;
    }

    pub fn queue(&self) -> &TaskQueue<VideoTool> {
        &self.queue
    }
}

/// `Queue` に対する汎用の `addTask` / `startTask` / `drainQueue`
pub struct TaskRoutes<T: Task> {
    queue: Queue<T>,
    sink: Arc<dyn NotificationSink>,
    channels: Channels,
}

impl<T> TaskRoutes<T>
where
    T: Task,
    T::Output: Serialize,
{
    /// composite 用: end は `on:composite` に流す。
    pub fn new(queue: Queue<T>, sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_end_channel(queue, sink, names::ON_COMPOSITE)
    }

    /// start / progress / error は共通チャネル、end だけ用途ごとに分ける。
    pub fn with_end_channel(
        queue: Queue<T>,
        sink: Arc<dyn NotificationSink>,
        end: impl Into<String>,
    ) -> Self {
        Self::with_channels(
            queue,
            sink,
            Channels {
                start: Some(names::ON_TASK_START.to_string()),
                progress: Some(names::ON_PROGRESS.to_string()),
                error: Some(names::ON_FAILED_TASK.to_string()),
                end: Some(end.into()),
            },
        )
    }

    pub fn with_channels(queue: Queue<T>, sink: Arc<dyn NotificationSink>, channels: Channels) -> Self {
        Self {
            queue,
            sink,
            channels,
        }
    }

    /// `addTask`: task を包んで積み、ID を順番どおりに返す。
    pub fn add_task(&self, tasks: impl IntoIterator<Item = T>) -> Vec<TaskId> {
        tasks
            .into_iter()
            .map(|task| {
                let handle = TaskHandle::new(task);
                forward(&handle, Arc::clone(&self.sink), &self.channels);
                let id = handle.id();
                self.queue.add(handle);
                id
            })
            .collect()
    }

    /// `startTask`.
    pub fn start_task(&self) -> bool {
        self.queue.run();
        true
    }

    /// `drainQueue`.
    pub async fn drain_queue(&self) {
        self.queue.drain().await;
    }

    pub fn queue(&self) -> &Queue<T> {
        &self.queue
    }
}
