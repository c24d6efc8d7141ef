use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::error::ExportResult;
use crate::settings::{
    default_state_file, default_temp_directory, load_settings_file, ExportSettings,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "streakcut", version, about = "Export kill streak highlights from War Thunder DVR clips")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan clips, plan kill streaks and export them with FFmpeg
    Export(ExportArgs),
    /// Print the planned kill streaks and clip coverage as JSON
    Plan(PlanArgs),
    /// Forget the last processed timestamp so every clip is scanned again
    ResetState(ResetStateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StreakArgs {
    /// Folder containing the DVR recordings
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub input: PathBuf,

    /// Folder receiving the exported highlights
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub output: PathBuf,

    /// JSON settings file loaded before flag overrides
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub settings: Option<PathBuf>,

    /// Seconds kept before each kill when detecting streaks
    #[arg(long)]
    pub lead: Option<f64>,

    /// Seconds kept after each kill when detecting streaks
    #[arg(long)]
    pub tail: Option<f64>,

    /// Maximum gap in seconds between kills of one streak
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Minimum kills for a streak to be exported
    #[arg(long)]
    pub min_kills: Option<usize>,

    /// Seconds exported before each kill (recomputes the export windows)
    #[arg(long)]
    pub export_lead: Option<f64>,

    /// Seconds exported after each kill (recomputes the export windows)
    #[arg(long)]
    pub export_tail: Option<f64>,

    /// Where the kill position inside a clip is assumed, in seconds
    #[arg(long)]
    pub kill_position: Option<f64>,

    /// Processing state file; defaults to <output>/processing_state.json
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub state_file: Option<PathBuf>,

    /// Ignore the processing state and scan every clip
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub streak: StreakArgs,

    /// Scratch folder for FFmpeg intermediates; defaults to <output>/temp
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub temp_dir: Option<PathBuf>,

    /// Keep duplicate frames instead of filtering them with mpdecimate
    #[arg(long)]
    pub no_frame_dedup: bool,

    /// Plan and log the export without running FFmpeg or updating state
    #[arg(long)]
    pub dry_run: bool,

    /// Write the effective settings to this JSON file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub save_settings: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub streak: StreakArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ResetStateArgs {
    /// Folder whose default processing state should be removed
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Processing state file to remove
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub state_file: Option<PathBuf>,
}

impl StreakArgs {
    pub fn effective_settings(&self) -> ExportResult<ExportSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_file(path)?,
            None => ExportSettings::default(),
        };

        if let Some(value) = self.lead {
            settings.lead_seconds = value;
        }
        if let Some(value) = self.tail {
            settings.tail_seconds = value;
        }
        if let Some(value) = self.threshold {
            settings.gap_threshold_seconds = value;
        }
        if let Some(value) = self.min_kills {
            settings.min_kills = value;
        }
        if self.export_lead.is_some() {
            settings.export_lead_seconds = self.export_lead;
        }
        if self.export_tail.is_some() {
            settings.export_tail_seconds = self.export_tail;
        }
        if let Some(value) = self.kill_position {
            settings.kill_position_seconds = value;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| default_state_file(&self.output))
    }
}

impl ExportArgs {
    pub fn effective_settings(&self) -> ExportResult<ExportSettings> {
        let mut settings = self.streak.effective_settings()?;
        if self.no_frame_dedup {
            settings.drop_duplicate_frames = false;
        }
        Ok(settings)
    }

    pub fn temp_directory(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| default_temp_directory(&self.streak.output))
    }
}

impl ResetStateArgs {
    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_file
            .clone()
            .or_else(|| self.output.as_deref().map(default_state_file))
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "streakcut",
            "export",
            "--input",
            "clips",
            "--output",
            "out",
            "--min-kills",
            "3",
            "--export-lead",
            "15",
            "--no-frame-dedup",
        ])
        .expect("Expected export arguments to parse");

        let Command::Export(args) = cli.command else {
            panic!("Expected the export command");
        };
        let settings = args
            .effective_settings()
            .expect("Expected effective settings to be valid");

        assert_eq!(settings.min_kills, 3);
        assert_eq!(settings.export_lead_seconds, Some(15.0));
        assert_eq!(settings.export_tail_seconds, None);
        assert_eq!(settings.lead_seconds, 10.0);
        assert!(!settings.drop_duplicate_frames);
        assert_eq!(args.streak.state_file(), PathBuf::from("out").join("processing_state.json"));
        assert_eq!(args.temp_directory(), PathBuf::from("out").join("temp"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from([
            "streakcut", "plan", "-i", "clips", "-o", "out", "--min-kills", "0",
        ])
        .expect("Expected plan arguments to parse");

        let Command::Plan(args) = cli.command else {
            panic!("Expected the plan command");
        };
        assert!(args.streak.effective_settings().is_err());
    }

    #[test]
    fn reset_state_resolves_default_path() {
        let cli = Cli::try_parse_from(["streakcut", "reset-state", "--output", "out"])
            .expect("Expected reset-state arguments to parse");

        let Command::ResetState(args) = cli.command else {
            panic!("Expected the reset-state command");
        };
        assert_eq!(
            args.state_file(),
            Some(PathBuf::from("out").join("processing_state.json"))
        );
    }
}
