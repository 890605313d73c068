// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All workflow logic is delegated to Layer 2 (application);
// this layer only builds the RunConfig and prints reports.
//
// Two actions are supported:
//   1. `train` — fit, cross-validate, or grid-search a model
//   2. `test`  — load a checkpoint and score the test set
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Action, RunArgs};

use crate::application::config::RunConfig;

#[derive(Parser, Debug)]
#[command(
    name = "phase-classifier",
    version,
    about = "Train and evaluate seismic phase classifiers (regP, regS, tele, N) on extracted waveform features."
)]
pub struct Cli {
    #[command(flatten)]
    pub args: RunArgs,
}

impl Cli {
    pub fn verbose(&self) -> u8 {
        self.args.verbose
    }

    /// Validate the flags and dispatch to the chosen use case.
    pub fn run(self) -> Result<()> {
        let action = self.args.action;
        let config = RunConfig::try_from(self.args)?;

        match action {
            Action::Train => Self::run_train(config),
            Action::Test  => Self::run_test(config),
        }
    }

    fn run_train(config: RunConfig) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!(
            "Training {:?} model on '{}' with quota {}",
            config.kind,
            config.train_dataset.display(),
            config.phase_lengths
        );

        let report = TrainUseCase::new(config).execute()?;
        println!("{report}");
        Ok(())
    }

    fn run_test(config: RunConfig) -> Result<()> {
        use crate::application::test_use_case::TestUseCase;

        tracing::info!("Testing checkpoint '{}'", config.checkpoint().base().display());

        let report = TestUseCase::new(config).execute()?;
        println!("{report}");
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::ModelKind;
    use crate::domain::error::PhaseError;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("phase-classifier").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let cli = parse(&[]);
        assert_eq!(cli.args.action, Action::Train);
        let cfg = RunConfig::try_from(cli.args).unwrap();
        assert_eq!(cfg, crate::application::config::tests::sample());
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&[
            "-a", "test", "-k", "boosted", "-b", "64", "-e", "5", "-l", "32 16", "-d", "0.2",
            "-p", "URZ 10 10 10 30, LPAZ 5 5 5 15", "-s", "URZ", "LPAZ", "-v", "1",
        ]);
        assert_eq!(cli.args.action, Action::Test);
        assert_eq!(cli.verbose(), 1);

        let cfg = RunConfig::try_from(cli.args).unwrap();
        assert_eq!(cfg.kind, ModelKind::Boosted);
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.layers.widths(), &[32, 16]);
        assert_eq!(cfg.stations, vec!["URZ", "LPAZ"]);
        assert_eq!(cfg.phase_lengths.total(), 60 + 30);
    }

    #[test]
    fn test_malformed_layers_are_cli_errors() {
        let cli = parse(&["-l", "128 abc"]);
        assert!(matches!(RunConfig::try_from(cli.args), Err(PhaseError::CliArgument(_))));

        let cli = parse(&["-p", "URZ 1 2 3"]);
        assert!(matches!(RunConfig::try_from(cli.args), Err(PhaseError::CliArgument(_))));
    }

    #[test]
    fn test_unknown_kind_is_rejected_by_clap() {
        let args = ["phase-classifier", "-k", "svm"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
