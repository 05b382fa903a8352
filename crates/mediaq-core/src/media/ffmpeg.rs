//! ffmpeg の呼び出し: 引数の組み立てと進捗の parse
//!
//! 進捗は `-progress pipe:1` から取る。`key=value` の行が
//! `progress=continue` / `progress=end` で区切られたブロックで届く。
//! percent の計算に要る全体の長さは、ffmpeg が入力を読むときに stderr へ出す
//! `Duration:` 行から取る。

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::options::{ImageWatermark, TextWatermark, VideoToolOptions, Watermark};
use crate::domain::Progress;

/// 組み立て済みの ffmpeg コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl FfmpegCommand {
    pub fn build(input: &Path, output: &Path, options: &VideoToolOptions) -> Self {
        let program = options
            .ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
        ];

        match &options.watermark {
            Some(Watermark::Text(text)) => {
                args.push("-vf".to_string());
                args.push(drawtext_filter(text));
            }
            Some(Watermark::Image(image)) => {
                args.push("-i".to_string());
                args.push(image.image_path.display().to_string());
                args.push("-filter_complex".to_string());
                args.push(overlay_filter(image));
            }
            None => {}
        }

        args.extend([
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
            output.display().to_string(),
        ]);

        Self { program, args }
    }

    /// 表示用のコマンドライン（`start` で報告する）
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.contains(char::is_whitespace) {
                    format!("\"{part}\"")
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn drawtext_filter(text: &TextWatermark) -> String {
    format!(
        "drawtext=fontfile={}:text={}:fontsize={}:fontcolor={}:x={}:y={}",
        escape_filter_value(&text.font_path.display().to_string()),
        escape_filter_value(&text.text),
        text.font_size,
        escape_filter_value(&text.font_color),
        text.position.x,
        text.position.y,
    )
}

fn overlay_filter(image: &ImageWatermark) -> String {
    let overlay = format!("{}:{}", image.position.x, image.position.y);
    match image.scale {
        Some(scale) if scale != 1.0 => {
            format!("[1:v]scale=iw*{scale}:-1[wm];[0:v][wm]overlay={overlay}")
        }
        _ => format!("overlay={overlay}"),
    }
}

/// filter の option 値をエスケープする。
///
/// 値は 2 回 parse される: option 値として (`\ : '`)、次に filtergraph
/// として (`\ ' [ ] , ;`)。内側から順にエスケープする。
pub fn escape_filter_value(value: &str) -> String {
    let option_level = escape_chars(value, &['\\', ':', '\'']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, specials: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if specials.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `HH:MM:SS(.fraction)` -> Duration
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

/// ffmpeg の stderr 行から入力の長さを取り出す。
/// 例: `  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s`
pub fn parse_duration_line(line: &str) -> Option<Duration> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?.trim();
    if value == "N/A" {
        return None;
    }
    parse_timestamp(value)
}

/// `-progress` のブロックを `Progress` にまとめる。
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration: Option<Duration>,
    frames: Option<u64>,
    fps: Option<f64>,
    out_time: Option<Duration>,
}

impl ProgressParser {
    pub fn set_duration(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.duration = Some(duration);
        }
    }

    /// stdout の 1 行を渡す。ブロックの終わりで `Progress` を返す。
    pub fn feed(&mut self, line: &str) -> Option<Progress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "frame" => self.frames = value.trim().parse().ok(),
            "fps" => self.fps = value.trim().parse().ok(),
            // out_time_ms も単位はマイクロ秒（ffmpeg の昔からの癖）
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<u64>() {
                    self.out_time = Some(Duration::from_micros(us));
                }
            }
            "progress" => return Some(self.measure(value.trim() == "end")),
            _ => {}
        }
        None
    }

    fn measure(&self, finished: bool) -> Progress {
        let percent = if finished {
            100.0
        } else {
            match (self.out_time, self.duration) {
                (Some(done), Some(total)) => done.as_secs_f64() / total.as_secs_f64() * 100.0,
                _ => 0.0,
            }
        };

        Progress {
            percent: percent.clamp(0.0, 100.0),
            frames: self.frames,
            fps: self.fps,
            timemark: self.out_time.map(format_timestamp),
        }
    }
}

fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    let centis = duration.subsec_millis() / 10;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        centis
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::options::Position;
    use rstest::rstest;

    fn options(watermark: Option<Watermark>) -> VideoToolOptions {
        VideoToolOptions {
            watermark,
            ..VideoToolOptions::new("/out")
        }
    }

    #[test]
    fn plain_transcode_args() {
        let cmd = FfmpegCommand::build(
            Path::new("/in/a.mp4"),
            Path::new("/out/watermarked_a.mp4"),
            &options(None),
        );
        assert_eq!(cmd.program, PathBuf::from("ffmpeg"));
        assert_eq!(
            cmd.args,
            vec![
                "-y", "-i", "/in/a.mp4", "-progress", "pipe:1", "-nostats",
                "/out/watermarked_a.mp4"
            ]
        );
    }

    #[test]
    fn text_watermark_uses_drawtext() {
        let cmd = FfmpegCommand::build(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            &options(Some(Watermark::Text(TextWatermark {
                text: "shot: 1".to_string(),
                font_path: PathBuf::from("/f.ttf"),
                font_size: 24,
                font_color: "white".to_string(),
                position: Position { x: 10, y: 20 },
            }))),
        );
        let vf = cmd.args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(
            cmd.args[vf + 1],
            r"drawtext=fontfile=/f.ttf:text=shot\\: 1:fontsize=24:fontcolor=white:x=10:y=20"
        );
    }

    #[rstest]
    #[case(None, "overlay=5:6")]
    #[case(Some(1.0), "overlay=5:6")]
    #[case(Some(0.5), "[1:v]scale=iw*0.5:-1[wm];[0:v][wm]overlay=5:6")]
    fn image_watermark_overlay(#[case] scale: Option<f64>, #[case] expected: &str) {
        let cmd = FfmpegCommand::build(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            &options(Some(Watermark::Image(ImageWatermark {
                image_path: PathBuf::from("logo.png"),
                position: Position { x: 5, y: 6 },
                scale,
            }))),
        );
        assert_eq!(cmd.args[3..5], ["-i".to_string(), "logo.png".to_string()]);
        assert_eq!(cmd.args[5], "-filter_complex");
        assert_eq!(cmd.args[6], expected);
    }

    #[test]
    fn command_line_quotes_parts_with_spaces() {
        let cmd = FfmpegCommand {
            program: PathBuf::from("ffmpeg"),
            args: vec!["-i".to_string(), "my clip.mp4".to_string()],
        };
        assert_eq!(cmd.command_line(), "ffmpeg -i \"my clip.mp4\"");
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("Hello, world", r"Hello\, world")]
    #[case("[x];y", r"\[x\]\;y")]
    #[case("a:b", r"a\\:b")]
    #[case(r"a:b'c\d", r"a\\:b\\\'c\\\\d")]
    fn escapes_filter_specials(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(escape_filter_value(raw), expected);
    }

    #[rstest]
    #[case("  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s", Some(62_500))]
    #[case("  Duration: N/A, bitrate: N/A", None)]
    #[case("Stream #0:0: Video: h264", None)]
    fn duration_lines(#[case] line: &str, #[case] millis: Option<u64>) {
        assert_eq!(
            parse_duration_line(line),
            millis.map(Duration::from_millis)
        );
    }

    #[test]
    fn progress_blocks_become_measurements() {
        let mut parser = ProgressParser::default();
        parser.set_duration(Duration::from_secs(10));

        let lines = [
            "frame=50",
            "fps=25.0",
            "out_time_us=2500000",
            "out_time=00:00:02.500000",
            "progress=continue",
        ];
        let mut measured = None;
        for line in lines {
            if let Some(p) = parser.feed(line) {
                measured = Some(p);
            }
        }

        let p = measured.unwrap();
        assert_eq!(p.percent, 25.0);
        assert_eq!(p.frames, Some(50));
        assert_eq!(p.fps, Some(25.0));
        assert_eq!(p.timemark.as_deref(), Some("00:00:02.50"));

        assert_eq!(parser.feed("progress=end").unwrap().percent, 100.0);
    }

    #[test]
    fn unknown_duration_reports_zero_until_end() {
        let mut parser = ProgressParser::default();
        parser.feed("out_time_us=1000000");
        assert_eq!(parser.feed("progress=continue").unwrap().percent, 0.0);
    }
}
