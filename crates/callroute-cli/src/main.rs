//! `callroute` - drive call audio routing against a simulated platform
//!
//! ```text
//! callroute simulate --max-volume 10 --speaker --focus-event loss-transient --focus-event gain
//! callroute simulate --fail mode --json
//! callroute config --config callroute.toml
//! ```

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

use callroute_core::{
    AudioRoutingApi, AudioSessionController, BridgeError, BridgeResult, CallAudioBridge, CallAudioConfig,
    CallAudioEvent, FocusApi, FocusChange, FocusSnapshot, PlatformCall, PlatformOperation, SessionState,
    SimulatedPlatform, VolumeReport,
};

use crate::logging::{parse_log_level, setup_logging, LoggingConfig};

/// How long to wait for the listener task to apply one focus notification
const FOCUS_EVENT_WAIT: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "callroute", version, about = "Call audio routing simulator")]
struct Cli {
    /// Log level (RUST_LOG directives still apply)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run start, focus events, optional speaker switch and stop
    Simulate(SimulateArgs),
    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SimulateArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum call stream volume reported by the platform
    #[arg(long, default_value_t = 15)]
    max_volume: u32,

    /// Current call stream volume; omitted means the platform has no reading
    #[arg(long)]
    current_volume: Option<u32>,

    /// Platform has no graduated volume
    #[arg(long)]
    fixed_volume: bool,

    /// Platform refuses audio focus
    #[arg(long)]
    deny_focus: bool,

    /// Platform only offers the legacy stream focus API
    #[arg(long)]
    legacy_focus: bool,

    /// Switch to the loudspeaker after start
    #[arg(long)]
    speaker: bool,

    /// Focus notification delivered after start (repeatable)
    #[arg(long = "focus-event", value_enum)]
    focus_events: Vec<FocusEvent>,

    /// Make a platform primitive fail (repeatable)
    #[arg(long, value_enum)]
    fail: Vec<FailPoint>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FocusEvent {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

impl From<FocusEvent> for FocusChange {
    fn from(event: FocusEvent) -> Self {
        match event {
            FocusEvent::Gain => FocusChange::Gain,
            FocusEvent::Loss => FocusChange::Loss,
            FocusEvent::LossTransient => FocusChange::LossTransient,
            FocusEvent::LossTransientCanDuck => FocusChange::LossTransientCanDuck,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailPoint {
    Mode,
    Route,
    Volume,
    Focus,
    Abandon,
}

impl From<FailPoint> for PlatformOperation {
    fn from(point: FailPoint) -> Self {
        match point {
            FailPoint::Mode => PlatformOperation::SetMode,
            FailPoint::Route => PlatformOperation::SetSpeakerphone,
            FailPoint::Volume => PlatformOperation::SetVolume,
            FailPoint::Focus => PlatformOperation::RequestFocus,
            FailPoint::Abandon => PlatformOperation::AbandonFocus,
        }
    }
}

#[derive(Debug, Serialize)]
struct StepOutcome {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<BridgeError>,
}

impl From<BridgeResult<bool>> for StepOutcome {
    fn from(result: BridgeResult<bool>) -> Self {
        match result {
            Ok(ok) => StepOutcome { ok, error: None },
            Err(e) => StepOutcome {
                ok: false,
                error: Some(e),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    focus_api: FocusApi,
    start: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker: Option<StepOutcome>,
    stop: StepOutcome,
    state: SessionState,
    focus: FocusSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<VolumeReport>,
    events: Vec<CallAudioEvent>,
    calls: Vec<PlatformCall>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&cli.log_level)?);
    if cli.log_json {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    info!("Starting callroute v{}", callroute_core::VERSION);

    match cli.command {
        Commands::Simulate(args) => simulate(args).await,
        Commands::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CallAudioConfig> {
    match path {
        Some(path) => CallAudioConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(CallAudioConfig::default()),
    }
}

fn build_platform(args: &SimulateArgs) -> Arc<SimulatedPlatform> {
    let mut platform = SimulatedPlatform::new()
        .with_max_volume(args.max_volume)
        .with_current_volume(args.current_volume);
    if args.fixed_volume {
        platform = platform.with_fixed_volume();
    }
    if args.deny_focus {
        platform = platform.deny_focus();
    }
    if args.legacy_focus {
        platform = platform.with_stream_focus_only();
    }
    for point in &args.fail {
        platform.fail((*point).into());
    }
    Arc::new(platform)
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let platform = build_platform(&args);

    let controller = AudioSessionController::new(platform.clone(), config).context("creating controller")?;
    let bridge = CallAudioBridge::new(Arc::new(controller));
    let mut events = bridge.controller().subscribe();

    let start = StepOutcome::from(bridge.start_audio_routing().await);

    if let Some(arbiter) = bridge.controller().arbiter() {
        let mut focus = arbiter.watch();
        for event in &args.focus_events {
            focus.borrow_and_update();
            if !platform.emit_focus_change((*event).into()) {
                debug!(?event, "no focus holder to notify");
                continue;
            }
            // Ignored notifications leave the state unchanged
            let _ = tokio::time::timeout(FOCUS_EVENT_WAIT, focus.changed()).await;
        }
    }

    let speaker = if args.speaker {
        Some(StepOutcome::from(bridge.set_speaker_on(true).await))
    } else {
        None
    };

    let stop = StepOutcome::from(bridge.stop_audio_routing().await);

    let controller = bridge.controller();
    let mut recorded = Vec::new();
    while let Ok(event) = events.try_recv() {
        recorded.push(event);
    }

    let summary = Summary {
        focus_api: controller.arbiter().map(|a| a.api()).unwrap_or_default(),
        start,
        speaker,
        stop,
        state: controller.state(),
        focus: controller.focus_snapshot(),
        volume: controller.last_volume(),
        events: recorded,
        calls: platform.calls(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("focus api: {:?}", summary.focus_api);
    print_step("start", &summary.start);
    if let Some(speaker) = &summary.speaker {
        print_step("speaker", speaker);
    }
    print_step("stop", &summary.stop);
    println!("final state: {}, focus: {}", summary.state, summary.focus.state);
    if let Some(volume) = &summary.volume {
        println!(
            "volume: max {} current {:?} target {}{}",
            volume.max,
            volume.current,
            volume.target,
            if volume.scaled { "" } else { " (unscaled)" }
        );
    }
    println!("platform calls:");
    for (i, call) in summary.calls.iter().enumerate() {
        println!("  {:>2}. {:?}", i + 1, call);
    }
}

fn print_step(name: &str, outcome: &StepOutcome) {
    match &outcome.error {
        None => println!("{}: ok", name),
        Some(e) => println!("{}: {}", name, e),
    }
}
