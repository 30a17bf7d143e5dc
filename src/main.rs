// AGPL v3 License

// we need unsafe code for ffmpeg logging, but aside from that
// we can go without
#![deny(unsafe_code)]

use anyhow::{anyhow, Result};
use clap::Parser;
use config::{Args, RemixConfig, SilenceConfig};
use plan::AssemblyPlan;
use segment::{AudioSignal, SegmentList};
use std::{process, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::{JoinError, JoinHandle},
    time::interval,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod log;
mod media;
mod melt;
mod plan;
mod segment;
mod select;
mod tempdir;
mod ui;

fn main() {
    let args = Args::parse();

    // initialization routines go here
    if let Err(e) = ffmpeg::init() {
        eprintln!("Unable to initialize ffmpeg: {}", e);
        process::exit(1);
    }
    log::register_ffmpeg_logger(args.verbose);

    // spawn the tokio runtime
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Unable to start the Tokio runtime: {:?}", e);
            eprintln!("Cannot continue, exiting...");
            process::exit(1);
        }
    };

    // run the main function
    if let Err(e) = runtime.block_on(entry(args)) {
        eprintln!("Encountered a fatal error: {:?}", e);

        // if it's a join panic, resume it
        if let Ok(jh) = e.downcast::<JoinError>() {
            if let Ok(pn) = jh.try_into_panic() {
                match pn.downcast::<String>() {
                    Ok(s) => eprintln!("Panic message: {}", s),
                    Err(pn) => {
                        if let Ok(s) = pn.downcast::<&'static str>() {
                            eprintln!("Panic message: {}", s);
                        }
                    }
                }
            }
        }

        process::exit(1);
    }
}

/// Intended to wrap the real main function (`processing`) with
/// a terminal UI, or with plain logging when there is no UI.
async fn entry(args: Args) -> Result<()> {
    let (mut send_data, recv_data) = mpsc::channel(10);
    let (send_ui, mut recv_ui) = broadcast::channel(16);
    let max_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let ui_thread = if args.no_tui {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(max_level.as_str().to_ascii_lowercase()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();

        tokio::spawn(ui::headless(recv_data, send_ui))
    } else {
        let sd_clone = send_data.clone();
        tokio::spawn(async move {
            ui::ui_thread(recv_data, sd_clone, send_ui, max_level)
                .await
                .map_err(|e| {
                    tracing::error!("UI thread failed: {}", e);
                    e
                })
        })
    };

    let res = processing(&args, &mut send_data, &mut recv_ui).await;
    tracing::info!("Reached end of processing execution");
    if let Err(ref err) = res {
        tracing::error!("Processing failed: {:#}", err);
    }

    // send the stop signals
    // even if the main system failed, we should let the UI thread
    // stop gracefully to avoid corrupting the current
    // terminal env
    let _ = send_data.send(ui::UiDirective::Stop).await;

    ui_thread.await??;

    res
}

async fn processing(
    args: &Args,
    send_data: &mut mpsc::Sender<ui::UiDirective>,
    recv_ui: &mut broadcast::Receiver<ui::UiMessage>,
) -> Result<()> {
    let config = RemixConfig::try_from(args)?;
    tracing::info!(
        "Creating video mix from {} and outputting it to {} with duration of {}s",
        config.input_file.display(),
        config.output_file.display(),
        config.selection.target_duration
    );

    // open a temporary directory
    let tempdir = tempdir::TempDir::new().await?;

    let media = fetch_media_info(&config, send_data, recv_ui).await?;
    tracing::info!("{:?}", media);

    let profile = melt::Profile {
        width: media.width,
        height: media.height,
        fps: media.frame_rate,
    };
    let signal = Arc::new(media.signal);

    let segments = find_segments(&signal, &config.silence, send_data, recv_ui).await?;
    for (index, segment) in segments.iter().enumerate() {
        tracing::debug!(
            "Segment {}: samples {}..={} ({:.2}s)",
            index,
            segment.start,
            segment.end,
            segment.duration(segments.sample_rate())
        );
    }
    tracing::info!(
        "{} segments, {} of them interior",
        segments.len(),
        segments.interior().len()
    );

    // shuffle the interior segments between the anchors
    let (mut rng, seed) = select::seeded_rng(config.seed)?;
    tracing::info!("Shuffling segments with seed {}", seed);
    let selection = select::select_segments(&segments, &config.selection, &mut rng)?;

    let plan = plan::assemble(&segments, &selection);
    for clip in plan.clips() {
        tracing::debug!("{}", clip);
    }
    tracing::info!(
        "Remix has {} clips lasting {:.2}s",
        plan.clips().len(),
        plan.duration()
    );

    if config.dry_run {
        tracing::info!("Dry run, not rendering");
    } else {
        render_plan(&config, &plan, profile, &tempdir, send_data, recv_ui).await?;
    }

    // destroy the tempdir
    tempdir.delete().await?;

    Ok(())
}

async fn fetch_media_info(
    config: &RemixConfig,
    send_data: &mut mpsc::Sender<ui::UiDirective>,
    ui_data: &mut broadcast::Receiver<ui::UiMessage>,
) -> Result<media::MediaInfo> {
    // tell the UI thread that we're loading audio
    let _ui_guard = spawn_ellipses_task(send_data, "Decoding audio");

    let input_file = config.input_file.clone();
    let sample_rate = config.analysis_rate;
    let handle = tokio::task::spawn_blocking(move || {
        media::media_info(&input_file, sample_rate).map_err(|e| {
            tracing::error!("Failed to read media: {:#}", e);
            e
        })
    });

    finish_task(handle, ui_data).await?
}

async fn find_segments(
    signal: &Arc<AudioSignal>,
    config: &SilenceConfig,
    send_data: &mut mpsc::Sender<ui::UiDirective>,
    ui_data: &mut broadcast::Receiver<ui::UiMessage>,
) -> Result<SegmentList> {
    let _ui_guard = spawn_ellipses_task(send_data, "Splitting audio at silences");

    let signal = signal.clone();
    let config = config.clone();
    let progress = send_data.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let silent_frames = segment::scan_silence(&signal, &config, &progress)?;
        segment::build_segments(&silent_frames, &signal, &config)
    });

    Ok(finish_task(handle, ui_data).await??)
}

async fn render_plan(
    config: &RemixConfig,
    plan: &AssemblyPlan,
    profile: melt::Profile,
    tempdir: &tempdir::TempDir,
    send_data: &mut mpsc::Sender<ui::UiDirective>,
    ui_data: &mut broadcast::Receiver<ui::UiMessage>,
) -> Result<()> {
    let source = tokio::fs::canonicalize(&config.input_file).await?;
    let partial = tempdir::PartialFile::new(&config.output_file).await?;
    let mlt_path = tempdir.path().join("remix.mlt");

    melt::remix_document(&mlt_path, &source, partial.path(), plan, profile)?
        .write_file(melt::main_tractor())
        .await?;

    let _ui_guard = spawn_ellipses_task(send_data, "Rendering remix");
    let handle = tokio::spawn(async move { melt::render(&mlt_path).await });
    finish_task(handle, ui_data).await??;

    let output = partial.commit().await?;
    tracing::info!("Wrote {}", output.display());

    Ok(())
}

/// Begin a message that has an ellipses after it.
fn spawn_ellipses_task(
    send_data: &mut mpsc::Sender<ui::UiDirective>,
    text: &'static str,
) -> mpsc::Sender<()> {
    // spawn a task with a timer that sends a message to the UI thread
    let (stop_send, mut stop_recv) = mpsc::channel(1);

    // create a recurring timer for messaging
    let mut timer = interval(Duration::from_millis(300));

    // create a function that sends the message
    let mut dots = 2;
    let mut update = move || {
        dots = dots % 3 + 1;
        format!("{}{}", text, ".".repeat(dots))
    };

    let send_data = send_data.clone();

    // spawn a detached task with a timer
    tokio::spawn(async move {
        loop {
            // wait to be dropped or for the timer to fire
            tokio::select! {
                _ = timer.tick() => {
                    // send the message
                    let msg = update();
                    send_data.send(ui::UiDirective::DisplayText(msg)).await.ok();
                }
                _ = stop_recv.recv() => {
                    // we're done here
                    break;
                }
            }
        }
    });

    stop_send
}

/// Either complete a task defined by a `JoinHandle` or halt when the user requests.
async fn finish_task<J>(
    mut jh: JoinHandle<J>,
    ui_data: &mut broadcast::Receiver<ui::UiMessage>,
) -> Result<J> {
    loop {
        tokio::select! {
            data = &mut jh => {
                return Ok(data?);
            }
            msg = ui_data.recv() => {
                if let Ok(ui::UiMessage::Halt) = msg {
                    jh.abort();
                    return Err(anyhow!("User requested stop"));
                }
            }
        }
    }
}
