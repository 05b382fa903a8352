//! VideoTool の option（UI が送る JSON の形）

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWatermark {
    pub text: String,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub font_color: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageWatermark {
    pub image_path: PathBuf,
    pub position: Position,
    /// 画像自身に対する幅の倍率。高さは縦横比を保つ。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

/// `{ "type": "text" | "image", "options": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum Watermark {
    Text(TextWatermark),
    Image(ImageWatermark),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoToolOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Watermark>,

    /// 出力先ディレクトリ
    pub output_path: PathBuf,

    /// 既定は `watermarked_<入力ファイル名>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,

    /// encoder の実行ファイル。既定は `PATH` 上の `ffmpeg`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

impl VideoToolOptions {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            watermark: None,
            output_path: output_path.into(),
            output_file_name: None,
            ffmpeg_path: None,
        }
    }

    /// `overrides`（部分的な option）で設定されたフィールドだけ上書きする。
    pub fn merged(&self, overrides: &VideoToolOverrides) -> Self {
        Self {
            watermark: overrides.watermark.clone().or_else(|| self.watermark.clone()),
            output_path: overrides
                .output_path
                .clone()
                .unwrap_or_else(|| self.output_path.clone()),
            output_file_name: overrides
                .output_file_name
                .clone()
                .or_else(|| self.output_file_name.clone()),
            ffmpeg_path: self.ffmpeg_path.clone(),
        }
    }
}

/// リクエストごとの部分的な option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoToolOverrides {
    #[serde(default)]
    pub watermark: Option<Watermark>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub output_file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ui_shaped_json() {
        let options: VideoToolOptions = serde_json::from_value(serde_json::json!({
            "outputPath": "/tmp/out",
            "watermark": {
                "type": "text",
                "options": {
                    "text": "hello",
                    "fontPath": "/fonts/a.ttf",
                    "fontSize": 24,
                    "fontColor": "white",
                    "position": { "x": 10, "y": 20 }
                }
            }
        }))
        .unwrap();

        assert_eq!(options.output_path, PathBuf::from("/tmp/out"));
        match options.watermark {
            Some(Watermark::Text(text)) => {
                assert_eq!(text.text, "hello");
                assert_eq!(text.position, Position { x: 10, y: 20 });
            }
            other => panic!("expected text watermark, got {other:?}"),
        }
    }

    #[test]
    fn overrides_win_over_defaults() {
        let mut defaults = VideoToolOptions::new("/out");
        defaults.output_file_name = Some("default.mp4".to_string());

        let merged = defaults.merged(&VideoToolOverrides {
            output_path: Some(PathBuf::from("/elsewhere")),
            ..VideoToolOverrides::default()
        });

        assert_eq!(merged.output_path, PathBuf::from("/elsewhere"));
        assert_eq!(merged.output_file_name.as_deref(), Some("default.mp4"));
        assert!(merged.watermark.is_none());
    }
}
