// GNU AGPL v3 License

use crate::error::RemixError;
use clap::Parser;
use std::path::PathBuf;

pub(crate) const FRAME_DURATION: f64 = 0.1;
pub(crate) const THRESHOLD: f64 = 0.02;
pub(crate) const FRAME_MIN_SIZE: usize = 3;
pub(crate) const REFINE_WINDOW: f64 = 0.3;
pub(crate) const DURATION: f64 = 300.0;
pub(crate) const NO_REPEAT_WINDOW: usize = 3;
pub(crate) const MAX_REDRAWS: usize = 1000;
pub(crate) const ANALYSIS_RATE: u32 = 22050;

/// Remix a video by shuffling the pieces between its silences.
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct Args {
    /// The video input file.
    #[arg(long)]
    pub(crate) input_file: PathBuf,

    /// The video output file.
    #[arg(long)]
    pub(crate) output_file: PathBuf,

    /// Duration, in seconds, of the final video.
    #[arg(long, default_value_t = DURATION)]
    pub(crate) output_duration: f64,

    /// Seconds of audio per scanned frame.
    #[arg(long, default_value_t = FRAME_DURATION)]
    pub(crate) frame_duration: f64,

    /// Peak amplitude below which a frame is silent.
    #[arg(long, default_value_t = THRESHOLD)]
    pub(crate) threshold: f64,

    /// Frames of sound needed between silences to start a new segment.
    #[arg(long, default_value_t = FRAME_MIN_SIZE)]
    pub(crate) frame_min_size: usize,

    /// Cut at the start of each silence instead of its quietest sample.
    #[arg(long)]
    pub(crate) no_refine: bool,

    /// Seconds after a silence start searched for the quietest sample.
    #[arg(long, default_value_t = REFINE_WINDOW)]
    pub(crate) refine_window: f64,

    /// How many recent picks a new pick must differ from.
    #[arg(long, default_value_t = NO_REPEAT_WINDOW)]
    pub(crate) no_repeat_window: usize,

    /// Draws allowed per pick before giving up.
    #[arg(long, default_value_t = MAX_REDRAWS)]
    pub(crate) max_redraws: usize,

    /// Seed for the segment shuffle.
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// Rate, in Hz, the audio is resampled to before analysis.
    #[arg(long, default_value_t = ANALYSIS_RATE)]
    pub(crate) sample_rate: u32,

    /// Log the remix plan without rendering it.
    #[arg(long)]
    pub(crate) dry_run: bool,

    /// Log to stderr instead of drawing the terminal UI.
    #[arg(long)]
    pub(crate) no_tui: bool,

    /// Show debug output.
    #[arg(long, short)]
    pub(crate) verbose: bool,
}

/// How silence is detected and turned into cut points.
#[derive(Debug, Clone)]
pub(crate) struct SilenceConfig {
    pub(crate) frame_duration: f64,
    pub(crate) threshold: f64,
    pub(crate) frame_min_size: usize,
    /// Lookahead in seconds for boundary refinement, `None` to disable.
    pub(crate) refine_window: Option<f64>,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            frame_duration: FRAME_DURATION,
            threshold: THRESHOLD,
            frame_min_size: FRAME_MIN_SIZE,
            refine_window: Some(REFINE_WINDOW),
        }
    }
}

/// How interior segments are drawn.
#[derive(Debug, Clone)]
pub(crate) struct SelectionConfig {
    pub(crate) target_duration: f64,
    pub(crate) no_repeat_window: usize,
    pub(crate) max_redraws: usize,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub(crate) struct RemixConfig {
    pub(crate) input_file: PathBuf,
    pub(crate) output_file: PathBuf,
    pub(crate) silence: SilenceConfig,
    pub(crate) selection: SelectionConfig,
    pub(crate) analysis_rate: u32,
    pub(crate) seed: Option<u64>,
    pub(crate) dry_run: bool,
}

impl TryFrom<&Args> for RemixConfig {
    type Error = RemixError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        positive("output duration", args.output_duration)?;
        positive("frame duration", args.frame_duration)?;
        positive("threshold", args.threshold)?;
        if !args.no_refine {
            positive("refine window", args.refine_window)?;
        }
        if args.sample_rate == 0 {
            return Err(RemixError::invalid_config("sample rate must be non-zero"));
        }
        if args.max_redraws == 0 {
            return Err(RemixError::invalid_config("max redraws must be non-zero"));
        }
        if args.input_file == args.output_file {
            return Err(RemixError::invalid_config(
                "input and output files must differ",
            ));
        }

        Ok(Self {
            input_file: args.input_file.clone(),
            output_file: args.output_file.clone(),
            silence: SilenceConfig {
                frame_duration: args.frame_duration,
                threshold: args.threshold,
                frame_min_size: args.frame_min_size,
                refine_window: (!args.no_refine).then(|| args.refine_window),
            },
            selection: SelectionConfig {
                target_duration: args.output_duration,
                no_repeat_window: args.no_repeat_window,
                max_redraws: args.max_redraws,
            },
            analysis_rate: args.sample_rate,
            seed: args.seed,
            dry_run: args.dry_run,
        })
    }
}

fn positive(name: &str, value: f64) -> Result<(), RemixError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RemixError::invalid_config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}
