//! Vouchbooth CLI
//!
//! Terminal booth for recording a testimonial: fetches a collection by
//! its public slug, walks through the recording flow step by step, and
//! submits the clip to the backend.

use clap::Parser;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vouchbooth::capture::system::list_cameras;
use vouchbooth::capture::MediaDevices;
use vouchbooth::recorder::FinishedClip;
use vouchbooth::submit::ApiError;
use vouchbooth::utils::{AppResult, SystemClock};
use vouchbooth::{
    ApiClient, ClientIdentity, CollectionConfig, FlowEvent, FlowState, RecordingFlow,
    SyntheticDevices, SystemDevices,
};

#[derive(Parser, Debug)]
#[command(
    name = "vouchbooth",
    version,
    about = "Record and submit a video testimonial from the terminal"
)]
struct Args {
    /// Public slug of the collection to record for
    slug: Option<String>,

    /// Backend base URL
    #[arg(long, env = "VOUCHBOOTH_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Use the synthetic capture backend (no camera required)
    #[arg(long)]
    synthetic: bool,

    /// Where to save the local review copy (defaults to a temp file)
    #[arg(long)]
    review_file: Option<PathBuf>,

    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vouchbooth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = Args::parse();
    init_tracing();

    tracing::info!("Starting Vouchbooth v{}", env!("CARGO_PKG_VERSION"));

    if args.list_devices {
        let cameras = list_cameras();
        if cameras.is_empty() {
            println!("No cameras found.");
        }
        for camera in cameras {
            println!("{:?}: {}", camera.index, camera.name);
        }
        return Ok(());
    }

    let Some(slug) = args.slug.clone() else {
        eprintln!("error: a collection slug is required (or use --list-devices)");
        std::process::exit(2);
    };

    let api = ApiClient::new(&args.api_url)?;
    let collection = match api.fetch_collection(&slug).await {
        Ok(collection) => collection,
        Err(ApiError::CollectionUnavailable) => {
            println!("This collection was not found or is no longer accepting testimonials.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let devices: Arc<dyn MediaDevices> = if args.synthetic {
        Arc::new(SyntheticDevices::new())
    } else {
        Arc::new(SystemDevices::new())
    };

    let mut flow = RecordingFlow::new(collection.clone(), devices, Arc::new(SystemClock), api)?;

    print_welcome(&collection);
    run(&mut flow, &args).await
}

fn print_welcome(collection: &CollectionConfig) {
    println!("\n=== {} ===", collection.name);
    if let Some(message) = &collection.welcome_message {
        println!("\n{message}");
    }
    if !collection.prompt_questions.is_empty() {
        println!("\nHere are some questions to guide your testimonial:");
        for (i, question) in collection.prompt_questions.iter().enumerate() {
            println!("  {}. {}", i + 1, question);
        }
    }
    println!(
        "\nMax duration: {}\n",
        format_time(collection.max_duration)
    );
}

async fn run(flow: &mut RecordingFlow, args: &Args) -> AppResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match flow.state() {
            FlowState::Info => {
                let name = prompt(&mut lines, "Your name: ").await?;
                let email = prompt(&mut lines, "Email (optional): ").await?;
                let company = prompt(&mut lines, "Company (optional): ").await?;

                let identity = ClientIdentity::new(&name, Some(&email), Some(&company));
                if let Err(e) = flow.submit_details(identity) {
                    println!("  {e}");
                }
            }

            FlowState::Permission { error } => {
                if let Some(message) = error {
                    println!("\n{message}");
                    let answer = prompt(&mut lines, "Press Enter to try again, or q to quit: ")
                        .await?;
                    if answer.trim().eq_ignore_ascii_case("q") {
                        return Ok(());
                    }
                } else {
                    println!("Requesting camera and microphone access...");
                }
                flow.request_access().await?;
            }

            FlowState::Ready => {
                let answer =
                    prompt(&mut lines, "Press Enter to start recording (q to quit): ").await?;
                if answer.trim().eq_ignore_ascii_case("q") {
                    return Ok(());
                }
                record(flow, &mut lines).await?;
            }

            FlowState::Review => {
                if let Some(clip) = flow.finished_clip() {
                    let path = save_review_copy(&clip, args.review_file.as_deref())?;
                    println!("Review your testimonial: {}", path.display());
                }
                let answer = prompt(&mut lines, "[Enter] submit, [r] retake: ").await?;
                if answer.trim().eq_ignore_ascii_case("r") {
                    flow.retake()?;
                } else {
                    submit_with_progress(flow).await?;
                }
            }

            FlowState::Done => {
                println!(
                    "\nThank you! Your testimonial has been submitted successfully. \
                     It will be reviewed shortly."
                );
                return Ok(());
            }

            FlowState::Error { message } => {
                println!("\n{message}");
                let answer =
                    prompt(&mut lines, "Press Enter to try again, or q to quit: ").await?;
                if answer.trim().eq_ignore_ascii_case("q") {
                    return Ok(());
                }
                flow.retake()?;
            }

            // The record/submit helpers own these states until they
            // resolve; just wait for the transition.
            FlowState::Recording | FlowState::Uploading => {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }
    }
}

/// Run one recording attempt, rendering ticks until it stops.
async fn record(flow: &mut RecordingFlow, lines: &mut Lines<BufReader<Stdin>>) -> AppResult<()> {
    let mut events = flow.subscribe();
    flow.start_recording()?;

    if flow.state() != FlowState::Recording {
        // Recorder start failed; the flow already routed back.
        return Ok(());
    }

    println!("Recording... press Enter to stop.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let _ = line?;
                flow.stop_recording().await?;
                break;
            }
            event = events.recv() => match event {
                Ok(FlowEvent::Tick { elapsed_secs, max_secs }) => {
                    print!("\r  {} / {}", format_time(elapsed_secs), format_time(max_secs));
                    let _ = std::io::stdout().flush();
                }
                Ok(FlowEvent::StateChanged(state)) if state != FlowState::Recording => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }
    println!();
    Ok(())
}

/// Submit the reviewed clip, rendering upload progress until the flow
/// lands in done or error.
async fn submit_with_progress(flow: &mut RecordingFlow) -> AppResult<()> {
    let mut events = flow.subscribe();
    let submit = flow.submit();
    tokio::pin!(submit);

    println!("Uploading your testimonial...");
    loop {
        tokio::select! {
            result = &mut submit => {
                result?;
                break;
            }
            event = events.recv() => {
                if let Ok(FlowEvent::UploadProgress(pct)) = event {
                    print!("\r  {pct}%");
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }
    println!();
    Ok(())
}

fn save_review_copy(clip: &FinishedClip, path: Option<&Path>) -> AppResult<PathBuf> {
    match path {
        Some(path) => {
            std::fs::write(path, &clip.data)?;
            Ok(path.to_path_buf())
        }
        None => {
            let file = tempfile::Builder::new()
                .prefix("vouchbooth-review-")
                .suffix(&format!(".{}", clip.format.extension()))
                .tempfile()?;
            std::fs::write(file.path(), &clip.data)?;
            let (_, path) = file.keep().map_err(|e| e.error)?;
            Ok(path)
        }
    }
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> AppResult<String> {
    print!("{label}");
    let _ = std::io::stdout().flush();
    Ok(lines.next_line().await?.unwrap_or_else(|| "q".to_string()))
}

fn format_time(total_secs: u32) -> String {
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
