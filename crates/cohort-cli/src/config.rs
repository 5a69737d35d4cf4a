//! CLI argument surface. A thin wiring layer: no scheduling logic
//! lives here, only the knobs a human passes on the command line.

use std::path::PathBuf;

use clap::Parser;

/// Run a single action of a service defined in a YAML file, respecting its
/// dependency graph, and exit with the action's terminal status.
#[derive(Debug, Parser)]
#[command(name = "cohort", about = "Dependency-driven action scheduler for cluster operations")]
pub struct Cli {
    /// Path to the YAML service-definition file.
    pub config: PathBuf,

    /// Service name to run.
    pub service: String,

    /// Action name to run within that service.
    pub action: String,

    /// Force every loaded service into simulate (ghost) mode for this run,
    /// regardless of what the file says: actions still transition through
    /// the dependency graph but nothing reaches the node executor.
    #[arg(long)]
    pub simulate: bool,

    /// Backfill this fan-out ceiling onto every loaded action that does not
    /// already set its own `fanout:` in the file.
    #[arg(long)]
    pub fanout: Option<usize>,

    /// Resolve every loaded action's command up front and fail before
    /// dispatching anything, instead of failing lazily at dispatch time.
    #[arg(long)]
    pub verify: bool,

    /// Increase log verbosity (`-v` = debug, `-vv` = trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease log verbosity (`-q` = warn, `-qq` = error).
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// The `tracing` filter directive implied by `-v`/`-q` counts, most
    /// verbose wins on a tie.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose >= 2 {
            "trace"
        } else if self.verbose == 1 {
            "debug"
        } else if self.quiet >= 2 {
            "error"
        } else if self.quiet == 1 {
            "warn"
        } else {
            "info"
        }
    }
}
