//! NotificationSink port - 中継した task signal の送り先
//!
//! `start` / `progress` / `error` / `end` を task id 付きで UI 側へ送る。
//! 送り先（IPC チャネル、ログ、テスト用の記録）はこの trait で差し替える。

use crate::notify::Notification;

/// 中継された通知を受け取る
///
/// task の signal 発火から同期的に呼ばれる。実装はブロックしてはいけない。
/// task ごとの順序は `send` の呼び出し順。
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: Notification);
}
