//! `progress` signal が運ぶ進捗

use serde::{Deserialize, Serialize};

/// 進捗 1 回分
///
/// observer が当てにしてよいのは `percent` だけ。他のフィールドは task が
/// 出せる範囲のもの（encoder なら frames, fps, 現在位置）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// 完了率 `0.0..=100.0`
    pub percent: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    /// 出力の現在位置（例: `00:00:04.20`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timemark: Option<String>,
}

impl Progress {
    /// percent だけの進捗。`0.0..=100.0` に丸め、NaN は 0 にする。
    pub fn percent(percent: f64) -> Self {
        Self {
            percent: clamp_percent(percent),
            ..Self::default()
        }
    }
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(Progress::percent(-3.0).percent, 0.0);
        assert_eq!(Progress::percent(250.0).percent, 100.0);
        assert_eq!(Progress::percent(f64::NAN).percent, 0.0);
        assert_eq!(Progress::percent(42.5).percent, 42.5);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_value(Progress::percent(10.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "percent": 10.0 }));
    }
}
