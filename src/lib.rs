pub mod catalog;
pub mod cli;
pub mod engine;
pub mod error;
pub mod export;
pub mod settings;
pub mod watermark;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use catalog::{scan_recordings, CatalogScan, FfprobeDurationProbe};
use cli::{Cli, Command, ExportArgs, PlanArgs, ResetStateArgs, StreakArgs};
use engine::plan_batch;
use error::{ExportError, ExportResult};
use export::ffmpeg::{resolve_ffmpeg_binary_path, resolve_ffprobe_binary_path};
use export::strategy::ExtractionPreference;
use export::{run_export_batch, DryRunExtractor, ExportSummary, FfmpegExtractor};
use settings::{save_settings_file, ExportSettings};
use watermark::{should_advance_watermark, WatermarkStore};

const DEFAULT_LOG_FILTER: &str = "streakcut=info";
const VERBOSE_LOG_FILTER: &str = "streakcut=debug";

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let initialized = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(env_filter)
        .try_init();

    if let Err(error) = initialized {
        eprintln!("Failed to initialize logging: {error}");
    }
}

fn spawn_cancel_listener() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let listener_flag = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, stopping after the current clip");
                listener_flag.store(false, Ordering::SeqCst);
            }
            Err(error) => tracing::warn!("Failed to listen for Ctrl-C: {error}"),
        }
    });

    running
}

fn scan_input(
    streak: &StreakArgs,
    settings: &ExportSettings,
    store: &WatermarkStore,
) -> ExportResult<CatalogScan> {
    let watermark = if streak.all { None } else { store.load() };
    if let Some(last_processed) = watermark {
        tracing::info!(last_processed_at = %last_processed, "Skipping clips already processed");
    }

    let probe = FfprobeDurationProbe::new(resolve_ffprobe_binary_path()?);
    scan_recordings(
        &streak.input,
        &probe,
        watermark,
        settings.kill_position_seconds,
    )
}

fn export_pass(
    args: &ExportArgs,
    settings: &ExportSettings,
    running: &AtomicBool,
) -> ExportResult<ExportSummary> {
    let store = WatermarkStore::new(args.streak.state_file());
    let scan = scan_input(&args.streak, settings, &store)?;
    let is_running = || running.load(Ordering::SeqCst);

    let plan = plan_batch(&scan.clips, settings, is_running);

    if args.dry_run {
        let (summary, _) = run_export_batch(
            &plan,
            &DryRunExtractor,
            &args.streak.output,
            ExtractionPreference::default(),
            is_running,
        );
        tracing::info!("Dry run finished, processing state left unchanged");
        return Ok(summary);
    }

    let temp_directory = args.temp_directory();
    let extractor = FfmpegExtractor::new(
        resolve_ffmpeg_binary_path()?,
        temp_directory.clone(),
        settings.drop_duplicate_frames,
    );
    let (summary, preference) = run_export_batch(
        &plan,
        &extractor,
        &args.streak.output,
        ExtractionPreference::default(),
        is_running,
    );

    if let Some(strategy) = preference.last_successful() {
        tracing::debug!(strategy = %strategy.label(), "Last successful extraction strategy");
    }

    if let Err(error) = std::fs::remove_dir(&temp_directory) {
        tracing::debug!(
            temp_directory = %temp_directory.display(),
            "Temporary directory left in place: {error}"
        );
    }

    match scan.latest_start {
        Some(latest_start) if should_advance_watermark(summary.exported, summary.cancelled) => {
            store.save(latest_start)?;
        }
        _ => tracing::info!("Processing state left unchanged"),
    }

    Ok(summary)
}

async fn run_export_command(args: ExportArgs) -> ExportResult<()> {
    let settings = args.effective_settings()?;
    if let Some(settings_path) = &args.save_settings {
        save_settings_file(settings_path, &settings)?;
    }

    let running = spawn_cancel_listener();
    let summary =
        tokio::task::spawn_blocking(move || export_pass(&args, &settings, &running)).await??;

    if summary.cancelled {
        return Err(ExportError::Cancelled);
    }

    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "Some kill streaks could not be exported");
    }

    Ok(())
}

fn plan_report(
    args: &PlanArgs,
    settings: &ExportSettings,
    running: &AtomicBool,
) -> ExportResult<String> {
    let store = WatermarkStore::new(args.streak.state_file());
    let scan = scan_input(&args.streak, settings, &store)?;
    let plan = plan_batch(&scan.clips, settings, || running.load(Ordering::SeqCst));
    Ok(serde_json::to_string_pretty(&plan)?)
}

async fn run_plan_command(args: PlanArgs) -> ExportResult<()> {
    let settings = args.streak.effective_settings()?;
    let running = spawn_cancel_listener();

    let report =
        tokio::task::spawn_blocking(move || plan_report(&args, &settings, &running)).await??;
    println!("{report}");
    Ok(())
}

fn reset_state(args: &ResetStateArgs) -> ExportResult<()> {
    let Some(state_path) = args.state_file() else {
        return Err(ExportError::InvalidSettings(
            "reset-state needs --output or --state-file".to_string(),
        ));
    };

    let store = WatermarkStore::new(state_path);
    if !store.reset()? {
        tracing::info!(
            state_path = %store.state_path().display(),
            "No processing state to reset"
        );
    }
    Ok(())
}

async fn dispatch(command: Command) -> ExportResult<()> {
    match command {
        Command::Export(args) => run_export_command(args).await,
        Command::Plan(args) => run_plan_command(args).await,
        Command::ResetState(args) => reset_state(&args),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("Failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}
