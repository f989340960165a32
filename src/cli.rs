use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::ConnectionQuality;
use crate::entities::ManifestFormat;
use crate::pipeline::{DEFAULT_CDN_PREFIX, DEFAULT_LOCAL_FIRST, ManifestKind};

// Build version with decoder info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg, webp)\n",
    "HTTP:   ureq 2\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Scroll-driven image sequence player
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Write logs to a file instead of stderr
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a frame manifest from encoded frame directories
    Manifest(ManifestArgs),
    /// Scrub to a progress value and render the frame to a PNG
    Scrub(ScrubArgs),
    /// Free-running playback for a fixed time
    Play(PlayArgs),
    /// Smooth-scroll the hero section and report what was shown
    Simulate(SimulateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Hybrid,
    Loop,
}

impl From<KindArg> for ManifestKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Hybrid => ManifestKind::Hybrid,
            KindArg::Loop => ManifestKind::Loop,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Avif,
    Webp,
}

impl From<FormatArg> for ManifestFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Avif => ManifestFormat::Avif,
            FormatArg::Webp => ManifestFormat::Webp,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ManifestArgs {
    /// Site public directory holding AnimationHero/
    #[arg(long = "public", value_name = "DIR", default_value = "public")]
    pub public_dir: PathBuf,

    #[arg(long, value_enum, default_value = "hybrid")]
    pub kind: KindArg,

    /// Output file (default: {public}/sequence.manifest.json or loop.manifest.json)
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Frames served locally before switching to the CDN
    #[arg(long, env = "SEQ_LOCAL_FIRST", default_value_t = DEFAULT_LOCAL_FIRST)]
    pub local_first: usize,

    #[arg(long, env = "CDN_PUBLIC_URL", value_name = "URL")]
    pub cdn_url: Option<String>,

    #[arg(long, env = "CDN_BASE_PATH", default_value = DEFAULT_CDN_PREFIX)]
    pub prefix: String,

    #[arg(long, env = "CDN_BASE_PATH_AVIF")]
    pub prefix_avif: Option<String>,
}

/// Where the frames come from
#[derive(ClapArgs, Debug)]
pub struct SequenceArgs {
    /// Sequence config JSON (default: hero scroll preset)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Take frame list from a manifest
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Manifest list to use
    #[arg(long, value_enum, default_value = "webp")]
    pub format: FormatArg,

    /// Directory site-relative frame paths resolve against
    #[arg(short = 'r', long = "root", value_name = "DIR", default_value = "public")]
    pub root: PathBuf,

    /// CDN base for the hero preset
    #[arg(long, env = "SCROLLSEQ_CDN_BASE", value_name = "URL")]
    pub cdn_base: Option<String>,

    /// Connection type reported to the player (slow-2g, 2g, 3g, 4g)
    #[arg(long, default_value = "4g")]
    pub connection: ConnectionQuality,

    /// Viewport size
    #[arg(long, value_names = ["W", "H"], num_args = 2, default_values_t = [1280u32, 720])]
    pub viewport: Vec<u32>,

    /// Give up waiting for frames after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 30.0)]
    pub timeout: f64,
}

#[derive(ClapArgs, Debug)]
pub struct ScrubArgs {
    #[command(flatten)]
    pub sequence: SequenceArgs,

    /// Scroll progress 0..1
    #[arg(short = 'p', long, default_value_t = 0.0)]
    pub progress: f32,

    #[arg(long)]
    pub loops: Option<u32>,

    /// Rendered frame
    #[arg(short = 'o', long = "out", value_name = "PNG", default_value = "frame.png")]
    pub out: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub sequence: SequenceArgs,

    #[arg(short = 's', long, default_value_t = 2.0)]
    pub seconds: f64,

    #[arg(long)]
    pub fps: Option<f32>,

    /// Report the page as hidden: ticks are skipped
    #[arg(long)]
    pub hidden: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub sequence: SequenceArgs,

    /// Scroll target in pixels
    #[arg(long, default_value_t = 1440.0)]
    pub to: f64,

    /// Page scroll limit (default: 3x the viewport height)
    #[arg(long)]
    pub limit: Option<f64>,

    /// Simulated frame rate of the host loop
    #[arg(long, default_value_t = 60.0)]
    pub rate: f64,
}

impl SequenceArgs {
    pub fn viewport_size(&self) -> (u32, u32) {
        match self.viewport.as_slice() {
            [w, h] => (*w, *h),
            _ => (1280, 720),
        }
    }
}
