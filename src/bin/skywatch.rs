//! skywatch - run a live detection session
//!
//! This binary:
//! 1. Loads configuration (SKYWATCH_CONFIG file, SKYWATCH_* env, CLI overrides)
//! 2. Builds the detector, annotator and optional Telegram notifier
//! 3. Steps one session until the source ends, --max-frames is reached or Ctrl-C
//! 4. Optionally writes annotated frames as PNG
//! 5. Prints the session summary

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use skywatch::{
    source_from_identifier, Annotator, BackendRegistry, Notifier, SessionController, SessionEnd,
    SkywatchConfig, TelegramNotifier,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Defaults to $SKYWATCH_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame source: camera:<n>, /dev/videoN, image, frame directory, video file or stub://.
    #[arg(long)]
    source: Option<String>,
    /// Minimum detection confidence in (0, 1].
    #[arg(long)]
    confidence: Option<f32>,
    /// Detector backend name.
    #[arg(long)]
    detector: Option<String>,
    /// ONNX model path for the model backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Recorded detections for the replay backend.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Directory for annotated PNG frames.
    #[arg(long)]
    out: Option<PathBuf>,
    /// List available detector backends and exit.
    #[arg(long)]
    list_backends: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());
    let registry = BackendRegistry::with_builtin();

    if args.list_backends {
        for name in registry.list() {
            let marker = if registry.default_name() == Some(name.as_str()) {
                " (default)"
            } else {
                ""
            };
            println!("{}{}", name, marker);
        }
        return Ok(());
    }

    let mut cfg = match &args.config {
        Some(path) => SkywatchConfig::load_from(path)?,
        None => SkywatchConfig::load()?,
    };
    apply_args(&mut cfg, &args);

    let backend = cfg
        .detector
        .backend
        .clone()
        .or_else(|| registry.default_name().map(str::to_string))
        .ok_or_else(|| anyhow!("no detector backend available"))?;
    let mut detector = registry.detector(&backend, &cfg.detector.settings, cfg.catalog.clone())?;
    {
        let _stage = ui.stage(&format!("Loading detector '{}'", backend));
        if let Err(err) = detector.ensure_loaded() {
            log::warn!("{}; continuing without detections", err);
        }
    }

    let notifier: Option<Box<dyn Notifier>> = cfg.telegram.clone().map(|telegram| {
        Box::new(TelegramNotifier::new(telegram, cfg.catalog.clone())) as Box<dyn Notifier>
    });
    let mut controller = SessionController::new(detector, Annotator::new(cfg.catalog.clone()), notifier);

    let stop = controller.stop_handle();
    ctrlc::set_handler(move || stop.request_stop()).context("install Ctrl-C handler")?;

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out)
            .with_context(|| format!("create output directory {}", out.display()))?;
    }

    let source = source_from_identifier(&cfg.source, cfg.camera)?;
    controller.start(source, cfg.session.clone())?;
    log::info!("skywatch running on {} (Ctrl-C to stop)", cfg.source);

    let mut status = ui.status();
    let mut frames = 0u64;
    let end = loop {
        let event = controller.step()?;
        if event.terminal {
            break event.end;
        }
        status.update(&event, &controller.stats().frame_summary());
        if let (Some(out), Some(frame)) = (&args.out, &event.annotated_frame) {
            write_frame(out, frame)?;
        }
        frames += 1;
        if args.max_frames.is_some_and(|max| frames >= max) {
            controller.stop();
            break None;
        }
    };

    let summary = controller.stats().session_summary();
    status.finish(&format!("{} frames processed", frames));
    if let Some(SessionEnd::ReadFailed(reason)) = &end {
        log::error!("session ended on read failure: {}", reason);
    }
    println!("{}", summary);
    Ok(())
}

fn apply_args(cfg: &mut SkywatchConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if let Some(confidence) = args.confidence {
        cfg.session.confidence_threshold = confidence;
    }
    if let Some(detector) = &args.detector {
        cfg.detector.backend = Some(detector.clone());
    }
    if let Some(model) = &args.model {
        cfg.detector.settings.model_path = Some(model.clone());
    }
    if let Some(replay) = &args.replay {
        cfg.detector.settings.replay_path = Some(replay.clone());
    }
}

fn write_frame(out: &Path, frame: &skywatch::Frame) -> Result<()> {
    let path = out.join(format!("frame_{:06}.png", frame.index));
    frame
        .image()
        .save(&path)
        .with_context(|| format!("write annotated frame {}", path.display()))
}
