//! mediaq CLI - コマンドラインから scheduler を動かす

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use mediaq_core::media::{ImageWatermark, Position, TextWatermark, Watermark};
use mediaq_core::notify::Notification;
use mediaq_core::ports::NotificationSink;
use mediaq_core::routes::StartVideoTaskData;
use mediaq_core::{FnTask, Scheduler, SchedulerConfig, TaskContext, TaskError};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediaq", about = "Bounded-concurrency media job queues")]
struct Cli {
    /// scheduler の設定ファイル (JSON)。省略時は組み込みの既定値
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// ログのフィルタ（例: `debug`, `mediaq_core=trace`）。RUST_LOG より優先
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 動画に透かしを入れる（1 本ずつ順番に変換）
    Video {
        /// 出力先ディレクトリ
        #[arg(long)]
        output: PathBuf,
        /// 文字の透かし
        #[arg(long, requires = "font", conflicts_with = "image")]
        text: Option<String>,
        /// 文字の透かしに使うフォントファイル
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(long, default_value_t = 24)]
        font_size: u32,
        #[arg(long, default_value = "white")]
        font_color: String,
        /// 画像の透かし
        #[arg(long)]
        image: Option<PathBuf>,
        /// 左上からの透かしの位置
        #[arg(long, default_value_t = 10)]
        x: i64,
        #[arg(long, default_value_t = 10)]
        y: i64,
        /// encoder の実行ファイル
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// image-tool queue にダミーの合成 job を積む
    Demo {
        #[arg(long, default_value_t = 6)]
        tasks: usize,
        /// K 件ごとに 1 件失敗させる（0 なら失敗しない）
        #[arg(long, default_value_t = 3)]
        fail_every: usize,
    },
}

/// 通知を 1 件 1 行の JSON で stdout に出す。
struct JsonLinesSink;

impl NotificationSink for JsonLinesSink {
    fn send(&self, notification: Notification) {
        match serde_json::to_string(&notification) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                if writeln!(out, "{line}").is_err() {
                    tracing::debug!("stdout closed");
                }
            }
            Err(err) => tracing::warn!(error = %err, "cannot encode notification"),
        }
    }
}

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    // (A) 設定から queue 群を一度だけ作る
    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    let scheduler = Scheduler::from_config(&config)?;

    match cli.command {
        Command::Video {
            output,
            text,
            font,
            font_size,
            font_color,
            image,
            x,
            y,
            ffmpeg,
            files,
        } => {
            let position = Position { x, y };
            let watermark = match (text, font, image) {
                (Some(text), Some(font_path), _) => Some(Watermark::Text(TextWatermark {
                    text,
                    font_path,
                    font_size,
                    font_color,
                    position,
                })),
                (_, _, Some(image_path)) => Some(Watermark::Image(ImageWatermark {
                    image_path,
                    position,
                    scale: None,
                })),
                _ => None,
            };
            cmd_video(&scheduler, output, watermark, ffmpeg, files).await
        }
        Command::Demo { tasks, fail_every } => cmd_demo(&scheduler, tasks, fail_every).await,
    }
}

async fn cmd_video(
    scheduler: &Scheduler,
    output: PathBuf,
    watermark: Option<Watermark>,
    ffmpeg: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut defaults = scheduler.video_defaults().clone();
    defaults.output_path = output;
    if watermark.is_some() {
        defaults.watermark = watermark;
    }
    if ffmpeg.is_some() {
        defaults.ffmpeg_path = ffmpeg;
    }

    let routes = scheduler.video_routes(Arc::new(JsonLinesSink), Some(defaults));

    // (B) 投入 → 開始 → 全部終わるまで待つ
    let request = files
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            StartVideoTaskData {
                path,
                name,
                options: None,
            }
        })
        .collect();
    for info in routes.add_video_task(request) {
        tracing::info!(task_id = %info.id, path = %info.path.display(), "queued video");
    }

    routes.start_video_task();
    routes.drain_video_queue().await;

    let counts = routes.queue().counts();
    tracing::info!(completed = counts.completed, failed = counts.failed, "video queue drained");
    if counts.failed > 0 {
        bail!("{} of {} videos failed", counts.failed, counts.completed + counts.failed);
    }
    Ok(())
}

async fn cmd_demo(scheduler: &Scheduler, tasks: usize, fail_every: usize) -> anyhow::Result<()> {
    let routes = scheduler.image_tool_routes(Arc::new(JsonLinesSink));

    let jobs = (1..=tasks).map(|index| {
        let fails = fail_every > 0 && index % fail_every == 0;
        FnTask::new("composite", move |ctx: TaskContext| async move {
            ctx.start(format!("composite #{index}"));
            for step in 1..=4 {
                sleep(Duration::from_millis(100)).await;
                ctx.percent(f64::from(step) * 25.0);
                if fails && step == 2 {
                    return Err(TaskError::failed(format!("composite #{index}: bad input")));
                }
            }
            Ok(serde_json::json!({ "index": index }))
        })
    });
    let ids = routes.add_task(jobs);
    tracing::info!(
        queued = ids.len(),
        concurrency = routes.queue().concurrency(),
        "demo jobs queued"
    );

    routes.start_task();
    routes.drain_queue().await;

    let counts = routes.queue().counts();
    println!("{}", serde_json::to_string(&counts)?);
    Ok(())
}
