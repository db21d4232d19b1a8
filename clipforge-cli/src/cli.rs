use std::path::PathBuf;

use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use clipforge::ComposeMode;
use clipforge::playback::Capability;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides the configuration file)
    #[arg(long, env = "CLIPFORGE_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Request timeout in seconds (overrides the configuration file)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format (overrides the configuration file)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a generation job and follow it to completion
    Generate {
        /// What to generate
        prompt: String,

        /// Things the result should avoid
        #[arg(short, long)]
        negative: Option<String>,

        /// Fully composed prompt; replaces PROMPT on the backend
        #[arg(long)]
        composed: Option<String>,

        /// Do not request a segmented-streaming rendition
        #[arg(long)]
        no_hls: bool,

        /// Print the job id and exit without waiting
        #[arg(short, long)]
        detach: bool,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Follow a job until it finishes
    Watch {
        job_id: String,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show the current status of a job
    Status { job_id: String },

    /// List generated videos
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 12)]
        per_page: u32,

        /// Also resolve a poster thumbnail for every item
        #[arg(long)]
        posters: bool,
    },

    /// Ask the backend to improve a prompt
    Improve { prompt: String },

    /// Combine an improved prompt with a variant
    Compose {
        /// The improved base prompt
        base: String,

        /// The chosen variant
        variant: String,

        #[arg(long, value_enum, default_value_t = ComposeArg::AutoRefine)]
        mode: ComposeArg,
    },

    /// Print the thumbnail track of a job or manifest
    Thumbs {
        #[command(flatten)]
        source: TrackSource,
    },

    /// Show which thumbnail a pointer position maps to
    Scrub {
        #[command(flatten)]
        source: TrackSource,

        /// Pointer x position relative to the left edge of the surface
        #[arg(short, long)]
        x: f64,

        /// Pointer y position relative to the top edge of the surface
        #[arg(short, long, default_value_t = 0.0)]
        y: f64,

        /// Surface width
        #[arg(long, default_value_t = 640.0)]
        width: f64,

        /// Surface height
        #[arg(long, default_value_t = 360.0)]
        height: f64,

        /// Media duration in seconds; defaults to the end of the last cue
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Show which playback source would be chosen for a job
    Sources {
        job_id: String,

        /// Playback capability to assume
        #[arg(long, value_enum, default_value_t = CapabilityArg::Engine)]
        capability: CapabilityArg,
    },
}

#[derive(ClapArgs, Debug, Clone)]
#[command(group(ArgGroup::new("track").required(true).args(["job", "url"])))]
pub struct TrackSource {
    /// Job whose thumbnail track to use
    #[arg(long)]
    pub job: Option<String>,

    /// Thumbnail manifest URL or backend path
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeArg {
    AutoRefine,
    Merge,
}

impl From<ComposeArg> for ComposeMode {
    fn from(mode: ComposeArg) -> Self {
        match mode {
            ComposeArg::AutoRefine => ComposeMode::AutoRefine,
            ComposeArg::Merge => ComposeMode::Merge,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityArg {
    /// A streaming engine is available
    Engine,
    /// Only native manifest playback
    Native,
    /// Progressive files only
    Progressive,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::Engine => Capability::EngineAvailable,
            CapabilityArg::Native => Capability::NativeOnly,
            CapabilityArg::Progressive => Capability::Unsupported,
        }
    }
}
