use scrollseq::cli::{Args, Command, ManifestArgs, PlayArgs, ScrubArgs, SequenceArgs, SimulateArgs};
use scrollseq::core::{Environment, HeadlessEnvironment, SceneEvent, SequencePlayer};
use scrollseq::entities::{HeroConfig, Manifest, SequenceConfig};
use scrollseq::fetch::HttpFetcher;
use scrollseq::hero::HeroScene;
use scrollseq::pipeline::{ManifestBuilder, ManifestKind};
use scrollseq::render::{HeadlessSurface, SoftwareSurface, Viewport};
use scrollseq::scroll::{LayoutEvent, SmoothScroller, ViewportRect};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path) = &args.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    match args.command {
        Command::Manifest(m) => run_manifest(m),
        Command::Scrub(s) => run_scrub(s),
        Command::Play(p) => run_play(p),
        Command::Simulate(s) => run_simulate(s),
    }
}

fn run_manifest(args: ManifestArgs) -> Result<()> {
    let mut builder = match ManifestKind::from(args.kind) {
        ManifestKind::Hybrid => ManifestBuilder::hybrid(&args.public_dir),
        ManifestKind::Loop => ManifestBuilder::looped(&args.public_dir),
    };
    builder.local_first = args.local_first;
    builder.cdn_url = args.cdn_url.filter(|u| !u.trim().is_empty());
    builder.cdn_prefix = args.prefix;
    builder.cdn_prefix_avif = args.prefix_avif.filter(|p| !p.trim().is_empty());

    let manifest = builder.build().context("Manifest build failed")?;
    let out = args
        .out
        .unwrap_or_else(|| args.public_dir.join(builder.output_name()));
    manifest
        .save(&out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Wrote {} (webp={}, avif={}, totalFrames={})",
        out.display(),
        manifest.sources.webp.len(),
        manifest.sources.avif.len(),
        manifest.total_frames
    );
    Ok(())
}

/// Config file, else the hero preset; a manifest replaces the frame list.
fn load_sequence(args: &SequenceArgs) -> Result<SequenceConfig> {
    let mut config = match &args.config {
        Some(path) => SequenceConfig::load(path)
            .with_context(|| format!("Failed to load sequence config {}", path.display()))?,
        None => SequenceConfig::hero_scroll(args.cdn_base.as_deref()),
    };
    if let Some(path) = &args.manifest {
        let manifest = Manifest::load(path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?;
        config = config.with_manifest(&manifest, args.format.into());
    }
    info!("Sequence: {} frames from {}", config.count, config.dir);
    Ok(config)
}

fn timeout(args: &SequenceArgs) -> Duration {
    Duration::from_secs_f64(args.timeout.max(0.0))
}

fn run_scrub(args: ScrubArgs) -> Result<()> {
    let mut config = load_sequence(&args.sequence)?.scrubbed(args.progress);
    if let Some(loops) = args.loops {
        config.loops = loops;
    }
    let (w, h) = args.sequence.viewport_size();
    let env: Arc<dyn Environment> = Arc::new(HeadlessEnvironment::immediate(args.sequence.connection));
    let fetcher = Arc::new(HttpFetcher::new(Some(args.sequence.root.clone())));

    let mut player = SequencePlayer::new(config, env, fetcher, SoftwareSurface::new(Viewport::new(w, h)))?;
    let Some(target) = player.target() else {
        bail!("No frame requested for progress {}", args.progress);
    };
    if !player.wait_idle(timeout(&args.sequence)) {
        warn!("Timed out waiting for frame loads");
    }
    if player.displayed_index() != Some(target) {
        bail!("Frame {} could not be loaded", target);
    }

    player.surface_mut().draw_if_requested();
    player
        .surface()
        .save_png(&args.out)
        .with_context(|| format!("Failed to save {}", args.out.display()))?;
    println!("progress {} -> frame {} -> {}", args.progress, target, args.out.display());
    player.teardown();
    Ok(())
}

fn run_play(args: PlayArgs) -> Result<()> {
    let mut config = load_sequence(&args.sequence)?;
    config.progress = None;
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    let headless = Arc::new(HeadlessEnvironment::immediate(args.sequence.connection));
    headless.set_visible(!args.hidden);
    let env: Arc<dyn Environment> = headless;
    let fetcher = Arc::new(HttpFetcher::new(Some(args.sequence.root.clone())));

    let mut player = SequencePlayer::new(config, env, fetcher, HeadlessSurface::new())?;
    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let (mut ticks, mut shown, mut missed) = (0usize, 0usize, 0usize);

    while started.elapsed() < run_for {
        if let Some(index) = player.update() {
            ticks += 1;
            debug!("tick -> frame {}", index);
        }
        player.pump();
        for event in player.events().poll() {
            match event {
                SceneEvent::FrameShown { index } => {
                    shown += 1;
                    info!("frame {} shown", index);
                }
                SceneEvent::FrameMissed { .. } => missed += 1,
                _ => {}
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let stats = player.loader().stats();
    println!(
        "{:.1}s: {} ticks, {} frames shown, {} missed, {} loads started ({})",
        started.elapsed().as_secs_f64(),
        ticks,
        shown,
        missed,
        stats.started,
        if args.hidden { "page hidden" } else { "page visible" }
    );
    player.teardown();
    Ok(())
}

#[derive(Serialize)]
struct StatsTransition {
    frame: usize,
    scroll: f64,
    visible: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateReport {
    animation_frames: usize,
    final_scroll: f64,
    final_progress: f32,
    target_frame: Option<usize>,
    displayed_frame: Option<usize>,
    frames_shown: Vec<usize>,
    frames_missed: Vec<usize>,
    stats_transitions: Vec<StatsTransition>,
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let sequence = load_sequence(&args.sequence)?;
    let (w, h) = args.sequence.viewport_size();
    let limit = args.limit.unwrap_or(f64::from(h) * 3.0);
    let env: Arc<dyn Environment> = Arc::new(HeadlessEnvironment::immediate(args.sequence.connection));
    let fetcher = Arc::new(HttpFetcher::new(Some(args.sequence.root.clone())));
    let scroller = SmoothScroller::new(ViewportRect::new(f64::from(w), f64::from(h)), limit);

    let mut scene = HeroScene::new(
        HeroConfig::default().with_env(),
        sequence,
        scroller,
        env,
        fetcher,
        HeadlessSurface::new(),
    )?;
    let mut update = scene.layout(LayoutEvent::Load, Viewport::new(w, h));
    scene.scroll_to(args.to, false);

    let dt = Duration::from_secs_f64(1.0 / args.rate.max(1.0));
    let deadline = Instant::now() + timeout(&args.sequence);
    let mut report = SimulateReport {
        animation_frames: 0,
        final_scroll: 0.0,
        final_progress: 0.0,
        target_frame: None,
        displayed_frame: None,
        frames_shown: Vec::new(),
        frames_missed: Vec::new(),
        stats_transitions: Vec::new(),
    };

    loop {
        for event in scene.events().poll() {
            match event {
                SceneEvent::FrameShown { index } => report.frames_shown.push(index),
                SceneEvent::FrameMissed { index } => report.frames_missed.push(index),
                SceneEvent::StatsVisibility { visible } => report.stats_transitions.push(StatsTransition {
                    frame: report.animation_frames,
                    scroll: update.scroll,
                    visible,
                }),
                SceneEvent::TornDown => {}
            }
        }
        if scene.is_settled() || Instant::now() >= deadline {
            break;
        }
        update = scene.frame(dt);
        report.animation_frames += 1;
        std::thread::sleep(dt);
    }

    if !scene.player_mut().wait_idle(timeout(&args.sequence)) {
        warn!("Timed out waiting for frame loads");
    }
    for event in scene.events().poll() {
        if let SceneEvent::FrameShown { index } = event {
            report.frames_shown.push(index);
        }
    }
    report.final_scroll = update.scroll;
    report.final_progress = update.progress;
    report.target_frame = scene.player().target();
    report.displayed_frame = scene.player().displayed_index();
    scene.teardown();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
