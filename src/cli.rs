//! Command-line interface

use crate::config::DisplaySpeed;
use crate::merge::MergeMode;
use crate::packet::DataKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Turn a JSON payload into QR packets
    Send,
    /// Rebuild a payload from scanned QR text and import it
    Receive,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operation mode
    #[arg(short, long, value_enum)]
    pub mode: Mode,

    /// Input file: a JSON payload for send, scanned QR lines for receive.
    /// Reads stdin when omitted.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Kind of data carried by the transfer
    #[arg(short, long, value_enum, default_value_t = DataKind::Scouting)]
    pub kind: DataKind,

    /// Carousel speed
    #[arg(short, long, value_enum)]
    pub speed: Option<DisplaySpeed>,

    /// Loops through the carousel before exiting. Cycles forever when omitted.
    #[arg(short, long)]
    pub cycles: Option<usize>,

    /// Write packets as JSON lines instead of cycling them
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Local store receiving imported data
    #[arg(long, default_value = "fountainscout-store.json")]
    pub store: PathBuf,

    /// How received entries combine with stored ones
    #[arg(long, value_enum, default_value_t = MergeMode::SmartMerge)]
    pub merge: MergeMode,

    /// JSON transfer config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only send the last N matches (10, 15 or 30)
    #[arg(long, value_parser = ["10", "15", "30"], conflicts_with_all = ["from_last_export", "matches"])]
    pub last: Option<String>,

    /// Only send matches after the last exported one
    #[arg(long, default_value = "false", conflicts_with = "matches")]
    pub from_last_export: bool,

    /// Only send an inclusive match range, e.g. "12-30" or "12-"
    #[arg(long)]
    pub matches: Option<String>,

    /// Only send these teams, comma separated
    #[arg(long, value_delimiter = ',')]
    pub teams: Vec<String>,

    /// Enable verbose output
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

impl Cli {
    /// Whether any filter flag was given
    pub fn has_filters(&self) -> bool {
        self.last.is_some() || self.from_last_export || self.matches.is_some() || !self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn cli_parse_send() {
        let cli = Cli::parse_from([
            "fountainscout",
            "--mode", "send",
            "--file", "entries.json",
            "--kind", "pit-scouting",
            "--speed", "normal",
            "--cycles", "3",
            "--teams", "254,frc1678",
        ]);

        assert_eq!(cli.mode, Mode::Send);
        assert_eq!(cli.file, Some(PathBuf::from("entries.json")));
        assert_eq!(cli.kind, DataKind::PitScouting);
        assert_eq!(cli.speed, Some(DisplaySpeed::Normal));
        assert_eq!(cli.cycles, Some(3));
        assert_eq!(cli.teams, vec!["254", "frc1678"]);
        assert_eq!(cli.merge, MergeMode::SmartMerge);
        assert!(cli.has_filters());
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parse_receive() {
        let cli = Cli::parse_from([
            "fountainscout",
            "--mode", "receive",
            "--store", "/tmp/store.json",
            "--merge", "overwrite",
        ]);

        assert_eq!(cli.mode, Mode::Receive);
        assert_eq!(cli.kind, DataKind::Scouting);
        assert_eq!(cli.file, None);
        assert_eq!(cli.merge, MergeMode::Overwrite);
        assert!(!cli.has_filters());
    }

    #[test]
    fn cli_rejects_conflicting_filters() {
        assert!(Cli::try_parse_from([
            "fountainscout",
            "--mode", "send",
            "--last", "10",
            "--matches", "1-5",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["fountainscout", "--mode", "send", "--last", "12"]).is_err());
    }
}
