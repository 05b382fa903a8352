//! Task の状態遷移

use serde::{Deserialize, Serialize};

/// Task の状態
///
/// 状態遷移:
/// - Queued -> Running -> Completed
/// - Queued -> Running -> Failed
///
/// 遷移は一方向。`Queued` に戻ることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// queue の pending に積まれている
    Queued,

    /// execute に渡された
    Running,

    /// 出力付きで完了
    Completed,

    /// 原因付きで失敗
    Failed,
}

impl TaskStatus {
    /// 終端状態か（これ以上遷移しない）
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// `self -> next` が許される遷移か
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Queued, TaskStatus::Running, true)]
    #[case(TaskStatus::Running, TaskStatus::Completed, true)]
    #[case(TaskStatus::Running, TaskStatus::Failed, true)]
    #[case(TaskStatus::Running, TaskStatus::Queued, false)]
    #[case(TaskStatus::Queued, TaskStatus::Completed, false)]
    #[case(TaskStatus::Completed, TaskStatus::Failed, false)]
    #[case(TaskStatus::Failed, TaskStatus::Running, false)]
    fn transitions(#[case] from: TaskStatus, #[case] to: TaskStatus, #[case] legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}
