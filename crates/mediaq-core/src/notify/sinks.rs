//! `NotificationSink` の実装

use tokio::sync::mpsc;

use super::{Notification, NotificationPayload};
use crate::ports::NotificationSink;

/// 通知を unbounded な Tokio channel に流す。
///
/// unbounded なので `send` は signal を出した task を止めない。
/// 順序は `send` の呼び出し順。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn send(&self, notification: Notification) {
        // receiver が居なければ（UI 終了後）捨てる。
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// 通知を `tracing` のイベントとして書く。
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn send(&self, notification: Notification) {
        let Notification { channel, id, payload } = notification;
        match payload {
            NotificationPayload::Start { context } => {
                tracing::info!(%channel, task_id = %id, %context, "task start")
            }
            NotificationPayload::Progress { progress } => {
                tracing::debug!(%channel, task_id = %id, percent = progress.percent, "task progress")
            }
            NotificationPayload::Error { message } => {
                tracing::warn!(%channel, task_id = %id, error = %message, "task error")
            }
            NotificationPayload::End { output } => {
                tracing::info!(%channel, task_id = %id, %output, "task end")
            }
        }
    }
}
