//! 通知の中継 - task の signal を UI 側へ送る
//!
//! 中継はそのまま流すだけ。task id と task ごとの順序は保たれる。
//! 終端の通知（`error` / `end`）は、元の signal がその順で出るので、
//! 同じ id の progress 通知より必ず後に届く。

mod sinks;

pub use self::sinks::{ChannelSink, LogSink};

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{Progress, TaskId};
use crate::ports::NotificationSink;
use crate::task::{Task, TaskHandle};

/// 中継された signal 1 件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// UI 側のチャネル名（例: `on:video-progress`）
    pub channel: String,
    pub id: TaskId,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationPayload {
    Start { context: String },
    Progress { progress: Progress },
    Error { message: String },
    End { output: serde_json::Value },
}

/// signal ごとのチャネル名。`None` の signal は中継しない。
#[derive(Debug, Clone, Default)]
pub struct Channels {
    pub start: Option<String>,
    pub progress: Option<String>,
    pub error: Option<String>,
    pub end: Option<String>,
}

impl Channels {
    /// 全 signal を 1 つのチャネルで中継する。
    pub fn all(channel: impl Into<String>) -> Self {
        let channel = channel.into();
        Self {
            start: Some(channel.clone()),
            progress: Some(channel.clone()),
            error: Some(channel.clone()),
            end: Some(channel),
        }
    }
}

/// `task` の signal を `sink` へ中継する observer を登録する。
///
/// queue に add する前に呼ぶこと。発火済みの signal は再送しない。
pub fn forward<T, S>(task: &TaskHandle<T>, sink: Arc<S>, channels: &Channels)
where
    T: Task,
    T::Output: Serialize,
    S: NotificationSink + ?Sized + 'static,
{
    if let Some(channel) = channels.start.clone() {
        let sink = Arc::clone(&sink);
        task.on_start(move |id, context| {
            sink.send(Notification {
                channel: channel.clone(),
                id,
                payload: NotificationPayload::Start {
                    context: context.to_string(),
                },
            });
        });
    }

    if let Some(channel) = channels.progress.clone() {
        let sink = Arc::clone(&sink);
        task.on_progress(move |id, progress| {
            sink.send(Notification {
                channel: channel.clone(),
                id,
                payload: NotificationPayload::Progress {
                    progress: progress.clone(),
                },
            });
        });
    }

    if let Some(channel) = channels.error.clone() {
        let sink = Arc::clone(&sink);
        task.on_error(move |id, err| {
            sink.send(Notification {
                channel: channel.clone(),
                id,
                payload: NotificationPayload::Error {
                    message: err.to_string(),
                },
            });
        });
    }

    if let Some(channel) = channels.end.clone() {
        task.on_end(move |id, output| {
            let output = serde_json::to_value(output).unwrap_or_else(|err| {
                tracing::warn!(task_id = %id, error = %err, "task output is not serializable");
                serde_json::Value::Null
            });
            sink.send(Notification {
                channel: channel.clone(),
                id,
                payload: NotificationPayload::End { output },
            });
        });
    }
}
