use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use reveal_sequence_core::{
    audio::{GestureGate, OfflineFactory},
    driver::{FixedStepFrames, LoopSummary, RealtimeFrames},
    presets::{render_offline, render_viewport},
    AppConfig, AssetStore, AudioEngine, AudioProbe, CompletionReceiver, CompletionSignal, FrameLoop,
    Host, ManualClock, MonotonicClock, MountOptions, PresetKind, SequenceView,
};
use tracing_subscriber::EnvFilter;

fn main() -> reveal_sequence_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Schedule { common, output } => run_schedule(&common, &output),
        Commands::Probe { common, block } => run_probe(&common, block),
        Commands::Presets => {
            list_presets();
            Ok(())
        }
    }
}

fn run_play(args: PlayArgs) -> reveal_sequence_core::Result<()> {
    let mut config = load_config(args.common.config.as_deref())?;
    config.sequence.skip |= args.skip;
    if args.seed.is_some() {
        config.sequence.seed = args.seed;
    }
    if args.common.duration.is_some() {
        config.sequence.duration_seconds = args.common.duration;
    }
    config.validate()?;
    let assets = load_assets(args.common.assets.as_deref())?;
    let preset = args.common.preset;

    tracing::info!(
        %preset,
        skip = config.sequence.skip,
        seed = ?config.sequence.seed,
        realtime = args.realtime,
        "starting sequence"
    );

    let (summary, acknowledged) = play(preset, &config, &assets, args.realtime);

    if config.sequence.skip {
        tracing::info!(%preset, "end state shown, sequence skipped");
    } else {
        tracing::info!(
            %preset,
            frames = summary.frames,
            completed = summary.completed,
            "sequence finished"
        );
    }
    for token in acknowledged {
        tracing::info!(token, "host acknowledged completion");
    }
    Ok(())
}

/// Mounts one preset and runs it to the end. Returns the loop summary and
/// the completion tokens the host acknowledged.
fn play(
    preset: PresetKind,
    config: &AppConfig,
    assets: &AssetStore,
    realtime: bool,
) -> (LoopSummary, Vec<String>) {
    let audio = play_audio(config, realtime);
    let sequence = preset.build(config, audio, assets);

    let host = Host::new();
    let (sender, mut receiver) = CompletionReceiver::pair();
    let completion = CompletionSignal::channel(preset.token(), sender);
    let options = MountOptions {
        skip: config.sequence.skip,
        seed: config.sequence.seed,
        viewport: Some(render_viewport(config)),
    };

    let summary = if realtime {
        let clock = Box::new(MonotonicClock::start());
        let mut view = SequenceView::mount(sequence, options, &host, completion, clock);
        let mut frame_loop = FrameLoop::new(RealtimeFrames::at_fps(config.sequence.fps));
        view.run(&mut frame_loop)
    } else {
        let clock = ManualClock::new();
        let mut view =
            SequenceView::mount(sequence, options, &host, completion, Box::new(clock.clone()));
        let frames = FixedStepFrames::new(clock, config.sequence.frame_interval());
        let mut frame_loop = FrameLoop::new(frames);
        view.run(&mut frame_loop)
    };
    (summary, receiver.poll())
}

/// Audio for `play`. A missing output backend leaves the run silent rather
/// than failing it.
fn play_audio(config: &AppConfig, realtime: bool) -> AudioEngine {
    if realtime {
        return match realtime_audio(config) {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(%err, "audio unavailable, continuing without sound");
                AudioEngine::disabled(config.audio.clone())
            }
        };
    }
    // launching the command counts as the user gesture
    AudioEngine::new(
        config.audio.clone(),
        OfflineFactory::gated(GestureGate::open()),
    )
}

#[cfg(feature = "realtime")]
fn realtime_audio(config: &AppConfig) -> reveal_sequence_core::Result<AudioEngine> {
    Ok(AudioEngine::new(
        config.audio.clone(),
        reveal_sequence_core::audio::DeviceFactory,
    ))
}

#[cfg(not(feature = "realtime"))]
fn realtime_audio(_config: &AppConfig) -> reveal_sequence_core::Result<AudioEngine> {
    Err(reveal_sequence_core::SequenceError::AudioUnavailable(
        "built without the `realtime` feature".into(),
    ))
}

fn run_schedule(common: &CommonArgs, output: &Path) -> reveal_sequence_core::Result<()> {
    let config = common_config(common)?;
    let assets = load_assets(common.assets.as_deref())?;
    tracing::info!(preset = %common.preset, ?output, "exporting audio schedule");

    let run = render_offline(common.preset, &config, &assets)?;
    let json = run.schedule().to_json()?;
    std::fs::write(output, json)?;

    tracing::info!(voices = run.voices.len(), cues = run.cues.len(), "schedule written");
    Ok(())
}

fn run_probe(common: &CommonArgs, block: usize) -> reveal_sequence_core::Result<()> {
    let config = common_config(common)?;
    let assets = load_assets(common.assets.as_deref())?;
    tracing::info!(preset = %common.preset, block, "probing rendered audio");

    let run = render_offline(common.preset, &config, &assets)?;
    if run.samples.is_empty() {
        tracing::warn!(preset = %common.preset, "no audio was rendered");
        return Ok(());
    }

    let mut probe = AudioProbe::new(run.sample_rate);
    for frame in probe.process_all(&run.samples, block)? {
        tracing::info!(
            time = frame.time,
            rms = frame.rms,
            peak = frame.peak,
            centroid = frame.spectral_centroid,
            "block"
        );
    }
    let summary = probe.summary();
    tracing::info!(
        duration = summary.duration_seconds,
        peak = summary.peak,
        loudest_at = ?summary.loudest_at,
        "probe summary"
    );
    Ok(())
}

fn list_presets() {
    for preset in PresetKind::ALL {
        println!(
            "{:<14} {:>4.1}s  {}",
            preset.name(),
            preset.default_duration().as_secs_f32(),
            preset.description()
        );
    }
}

fn common_config(common: &CommonArgs) -> reveal_sequence_core::Result<AppConfig> {
    let mut config = load_config(common.config.as_deref())?;
    if common.duration.is_some() {
        config.sequence.duration_seconds = common.duration;
    }
    config.validate()?;
    Ok(config)
}

fn load_config(path: Option<&Path>) -> reveal_sequence_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::debug!(?path, "loading configuration");
            AppConfig::from_json_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn load_assets(dir: Option<&Path>) -> reveal_sequence_core::Result<AssetStore> {
    let mut store = AssetStore::new();
    if let Some(dir) = dir {
        store.scan_dir(dir)?;
    }
    Ok(store)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Timed audiovisual reveal sequences", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Preset to run (see `reveal presets`).
    preset: PresetKind,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory of static assets (textures, HDRs, fonts).
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Overrides the preset duration, in seconds.
    #[arg(long)]
    duration: Option<f32>,
}

#[derive(Args, Debug)]
struct PlayArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Show the end state without running the sequence.
    #[arg(long)]
    skip: bool,
    /// Seed per-frame randomness for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
    /// Pace frames on the wall clock and play through the output device.
    #[arg(long)]
    realtime: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a preset headless or in real time.
    Play(PlayArgs),
    /// Export the audio voices a preset schedules as JSON.
    Schedule {
        #[command(flatten)]
        common: CommonArgs,
        /// Where to write the schedule.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render a preset's audio offline and log per-block measurements.
    Probe {
        #[command(flatten)]
        common: CommonArgs,
        /// Samples per analysis block.
        #[arg(long, default_value_t = 2048)]
        block: usize,
    },
    /// List available presets.
    Presets,
}
