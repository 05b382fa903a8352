//! VideoTool - 外部の ffmpeg で動画 1 本に透かしを入れる

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use super::ffmpeg::{FfmpegCommand, ProgressParser, parse_duration_line};
use super::options::VideoToolOptions;
use crate::error::TaskError;
use crate::task::{Task, TaskContext};

/// 失敗メッセージ用に残す stderr の行数
const STDERR_TAIL: usize = 20;

/// encoder の実行 1 回分。出力ファイルのパスを返す。
#[derive(Debug, Clone)]
pub struct VideoTool {
    video_path: PathBuf,
    video_name: String,
    options: VideoToolOptions,
}

impl VideoTool {
    pub fn new(
        video_path: impl Into<PathBuf>,
        video_name: impl Into<String>,
        options: VideoToolOptions,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            video_name: video_name.into(),
            options,
        }
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn video_name(&self) -> &str {
        &self.video_name
    }

    pub fn output_path(&self) -> PathBuf {
        let file_name = self
            .options
            .output_file_name
            .clone()
            .unwrap_or_else(|| format!("watermarked_{}", self.video_name));
        self.options.output_path.join(file_name)
    }

    pub fn command(&self) -> FfmpegCommand {
        FfmpegCommand::build(&self.video_path, &self.output_path(), &self.options)
    }
}

#[async_trait]
impl Task for VideoTool {
    type Output = PathBuf;

    fn kind(&self) -> &'static str {
        "video"
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<PathBuf, TaskError> {
        let command = self.command();
        let output = self.output_path();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| TaskError::Spawn {
                program: command.program.display().to_string(),
                message: err.to_string(),
            })?;

        let command_line = command.command_line();
        tracing::info!(command = %command_line, "spawned ffmpeg");
        ctx.start(&command_line);

        let (duration_tx, duration_rx) = watch::channel(None);
        let (stdout_result, stderr_tail) = tokio::join!(
            read_progress(child.stdout.take(), duration_rx, ctx),
            read_stderr(child.stderr.take(), duration_tx),
        );

        let status = child
            .wait()
            .await
            .map_err(|err| TaskError::failed(format!("waiting for ffmpeg failed: {err}")))?;
        stdout_result.map_err(|err| TaskError::failed(format!("reading ffmpeg output failed: {err}")))?;

        if status.success() {
            tracing::info!(output = %output.display(), "transcoding succeeded");
            Ok(output)
        } else {
            let stderr = Vec::from(stderr_tail).join("\n");
            tracing::error!(%status, %stderr, "cannot process video");
            Err(TaskError::failed(format!("ffmpeg exited with {status}: {stderr}")))
        }
    }
}

async fn read_progress(
    stdout: Option<impl AsyncRead + Unpin>,
    duration: watch::Receiver<Option<Duration>>,
    ctx: &TaskContext,
) -> std::io::Result<()> {
    let Some(stdout) = stdout else {
        return Ok(());
    };

    let mut parser = ProgressParser::default();
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    while let Some(line) = next_line_lossy(&mut reader, &mut buf).await? {
        let total = *duration.borrow();
        if let Some(total) = total {
            parser.set_duration(total);
        }
        if let Some(progress) = parser.feed(&line) {
            ctx.progress(progress);
        }
    }
    Ok(())
}

/// stderr から入力の長さを拾い、エラー報告用に末尾の行を残す。
async fn read_stderr(
    stderr: Option<impl AsyncRead + Unpin>,
    duration: watch::Sender<Option<Duration>>,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let Some(stderr) = stderr else {
        return tail;
    };

    let mut found_duration = false;
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        match next_line_lossy(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                if !found_duration && let Some(total) = parse_duration_line(&line) {
                    found_duration = true;
                    duration.send_replace(Some(total));
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "stopped reading ffmpeg stderr");
                break;
            }
        }
    }
    tail
}

/// 1 行読む。UTF-8 でないバイトは置換文字になり、EOF まで読み続けられる。
async fn next_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf[..]);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::queue::TaskQueue;
    use crate::task::TaskHandle;

    fn tool(ffmpeg: &str) -> VideoTool {
        let mut options = VideoToolOptions::new("/tmp/mediaq-out");
        options.ffmpeg_path = Some(PathBuf::from(ffmpeg));
        VideoTool::new("/tmp/in/clip.mp4", "clip.mp4", options)
    }

    #[test]
    fn default_output_name_is_prefixed() {
        assert_eq!(
            tool("ffmpeg").output_path(),
            PathBuf::from("/tmp/mediaq-out/watermarked_clip.mp4")
        );
    }

    #[test]
    fn explicit_output_name_is_used() {
        let mut options = VideoToolOptions::new("/out");
        options.output_file_name = Some("final.mp4".to_string());
        let tool = VideoTool::new("/in/a.mp4", "a.mp4", options);
        assert_eq!(tool.output_path(), PathBuf::from("/out/final.mp4"));
    }

    #[tokio::test]
    async fn missing_encoder_is_a_spawn_failure() {
        let queue = TaskQueue::new("video");
        let task = TaskHandle::new(tool("/nonexistent/mediaq/ffmpeg"));
        queue.add(task.clone());
        queue.run();
        queue.drain().await;

        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(matches!(task.outcome(), Some(Err(TaskError::Spawn { .. }))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_fails_the_task() {
        let queue = TaskQueue::new("video");
        let task = TaskHandle::new(tool("false"));
        queue.add(task.clone());
        queue.run();
        queue.drain().await;

        match task.outcome() {
            Some(Err(TaskError::Failed(message))) => assert!(message.contains("ffmpeg exited")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_exit_resolves_with_output_path() {
        let queue = TaskQueue::new("video");
        let task = TaskHandle::new(tool("true"));
        let started = std::sync::Arc::new(std::sync::Mutex::new(None));
        {
            let started = std::sync::Arc::clone(&started);
            task.on_start(move |_, cmd| *started.lock().unwrap() = Some(cmd.to_string()));
        }
        queue.add(task.clone());
        queue.run();

        assert_eq!(
            task.wait().await,
            Ok(PathBuf::from("/tmp/mediaq-out/watermarked_clip.mp4"))
        );
        let cmd = started.lock().unwrap().clone().unwrap();
        assert!(cmd.starts_with("true -y -i /tmp/in/clip.mp4"));
    }

    /// ffmpeg の代わりに動く shell script を書き出す。
    #[cfg(unix)]
    fn fake_encoder(body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("mediaq-fake-ffmpeg-{}", ulid::Ulid::new()));
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_encoder_output_does_not_break_the_run() {
        let script = fake_encoder(
            r#"printf '  Duration: 00:00:10.00, start: 0.000000\n' >&2
printf 'title : \377\376 clip\n' >&2
printf 'frame=10\nout_time_us=5000000\nprogress=continue\n'
printf '\377 junk\n'
sleep 1
i=0
while [ "$i" -lt 200 ]; do
  echo "frame=$i fps=25 q=28.0 size=1kB" >&2
  i=$((i + 1))
done
printf 'progress=end\n'
exit 0
"#,
        );

        let queue = TaskQueue::new("video");
        let task = TaskHandle::new(tool(&script.display().to_string()));
        let percents = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let percents = std::sync::Arc::clone(&percents);
            task.on_progress(move |_, p| percents.lock().unwrap().push(p.percent));
        }
        queue.add(task.clone());
        queue.run();
        queue.drain().await;
        let _ = std::fs::remove_file(&script);

        assert_eq!(
            task.outcome(),
            Some(Ok(PathBuf::from("/tmp/mediaq-out/watermarked_clip.mp4")))
        );
        assert_eq!(percents.lock().unwrap().last(), Some(&100.0));
    }
}
