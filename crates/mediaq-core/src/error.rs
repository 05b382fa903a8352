use thiserror::Error;

/// task が `Failed` になった理由
///
/// `error` observer と保存される outcome の両方に clone されるので、
/// 持つのは所有権付きの文字列だけ。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before it finished")]
    Cancelled,
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// queue の構築エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("concurrency must be at least 1 (queue={name})")]
    InvalidConcurrency { name: String },
}

/// scheduler 設定の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Build(#[from] BuildError),
}
