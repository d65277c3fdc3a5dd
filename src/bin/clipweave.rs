use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use clipweave::{
    CaptureFormat, CommandNarrationProvider, ComposeRequest, ComposeResult, Composer,
    ComposerOpts, CompositionState, CpuSurface, EncodeSink, FfmpegMediaBackend, FfmpegSink,
    FfmpegSinkOpts, NarrationProvider, NoNarration,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clipweave", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a job and write the captured asset (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Load assets and narration, then print the effective timeline as JSON.
    Plan(JobArgs),
}

#[derive(Parser, Debug)]
struct JobArgs {
    /// Input job JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Composer options JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory clip sources resolve against (defaults to the job file's directory).
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// Override canvas width.
    #[arg(long)]
    width: Option<u32>,

    /// Override canvas height.
    #[arg(long)]
    height: Option<u32>,

    /// Override tick rate (frames per second).
    #[arg(long)]
    fps: Option<u32>,

    /// External TTS program: reads text on stdin, writes WAV to stdout.
    #[arg(long)]
    tts_program: Option<String>,

    /// Argument for the TTS program; `{voice}` is replaced by the voice id. Repeatable.
    #[arg(long = "tts-arg")]
    tts_args: Vec<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    job: JobArgs,

    /// Output path.
    #[arg(long)]
    out: PathBuf,

    /// Caption font file (TTF/OTF).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Capture format to prefer: webm_vp9_opus, mp4_h264_aac or raw_rgba.
    #[arg(long)]
    format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    match cli.cmd {
        Command::Render(args) => cmd_render(args, cancel).await,
        Command::Plan(args) => cmd_plan(args, cancel).await,
    }
}

fn load_opts(args: &JobArgs) -> anyhow::Result<ComposerOpts> {
    let mut opts = match &args.config {
        Some(path) => ComposerOpts::from_path(path)?,
        None => ComposerOpts::default(),
    };
    if let Some(w) = args.width {
        opts.canvas.width = w;
    }
    if let Some(h) = args.height {
        opts.canvas.height = h;
    }
    if let Some(fps) = args.fps {
        opts.fps = clipweave::Fps::new(fps, 1)?;
    }
    opts.validate()?;
    Ok(opts)
}

fn assets_root(args: &JobArgs) -> PathBuf {
    args.assets_root.clone().unwrap_or_else(|| {
        args.in_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    })
}

fn narrator(args: &JobArgs) -> Arc<dyn NarrationProvider> {
    match &args.tts_program {
        Some(program) => Arc::new(
            CommandNarrationProvider::new(program.clone(), args.tts_args.clone())
                .with_timeout(Duration::from_secs(120)),
        ),
        None => Arc::new(NoNarration),
    }
}

fn parse_format(s: &str) -> anyhow::Result<CaptureFormat> {
    serde_json::from_value(serde_json::Value::String(s.to_owned()))
        .with_context(|| format!("unknown capture format '{s}'"))
}

fn composer(
    args: &JobArgs,
    opts: ComposerOpts,
    font: Option<&Path>,
) -> anyhow::Result<Composer> {
    let mut surface = CpuSurface::new(opts.canvas.width, opts.canvas.height)?;
    if let Some(font) = font.or(opts.caption_font.as_deref()) {
        surface = surface
            .with_font_file(font)
            .with_context(|| format!("load caption font '{}'", font.display()))?;
    }

    let sink_opts = FfmpegSinkOpts {
        background: opts.clear_color,
        ..FfmpegSinkOpts::default()
    };
    let sinks = move || -> ComposeResult<Box<dyn EncodeSink>> {
        Ok(Box::new(FfmpegSink::new(sink_opts.clone())))
    };

    Ok(Composer::new(
        opts,
        Arc::new(FfmpegMediaBackend::new(assets_root(args))),
        narrator(args),
        Arc::new(sinks),
        Box::new(surface),
    )?)
}

async fn cmd_render(args: RenderArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let request = ComposeRequest::from_path(&args.job.in_path)?;
    let mut opts = load_opts(&args.job)?;
    if let Some(f) = &args.format {
        let format = parse_format(f)?;
        opts.capture_formats.retain(|x| *x != format);
        opts.capture_formats.insert(0, format);
    }
    let mut composer = composer(&args.job, opts, args.font.as_deref())?;

    let mut states = composer.subscribe();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                CompositionState::Processing { progress } => {
                    tracing::info!(progress, "composing");
                }
                CompositionState::Completed(_) | CompositionState::Failed(_) => break,
                CompositionState::Idle => {}
            }
        }
    });

    let result = composer.compose(&request, cancel).await;
    drop(composer);
    let _ = watcher.await;
    let asset = result?;

    asset
        .write_to(&args.out)
        .with_context(|| format!("write output '{}'", args.out.display()))?;
    eprintln!(
        "wrote {} ({}, {} frames, {:.2}s)",
        args.out.display(),
        asset.mime_type,
        asset.frames,
        asset.duration.as_secs_f64()
    );
    Ok(())
}

async fn cmd_plan(args: JobArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let request = ComposeRequest::from_path(&args.in_path)?;
    let opts = load_opts(&args)?;
    let composer = composer(&args, opts, None)?;
    let timeline = composer.plan(&request, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&timeline)?);
    Ok(())
}
