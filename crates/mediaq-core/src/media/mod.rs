//! メディア系の task
//!
//! `VideoTool` は外部 encoder の実行 1 回を包む。queue からは普通の `Task` に
//! 見え、encoder の知識はこのモジュールの中に閉じている。

pub mod ffmpeg;
pub mod options;
mod video;

pub use self::options::{
    ImageWatermark, Position, TextWatermark, VideoToolOptions, VideoToolOverrides, Watermark,
};
pub use self::video::VideoTool;
