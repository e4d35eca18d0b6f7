//! cts-harness CLI
//!
//! Runs the smoke suite against the simulated compute backend. Every token
//! after the program name goes to the harness unchanged, so the usual
//! conformance command line works: `cts-harness random_fill gpu id0`.

use anyhow::Context;
use clap::Parser;
use cts_harness::api::simulated::SimulatedApi;
use cts_harness::config::ProcessEnv;
use cts_harness::harness::FATAL_EXIT_CODE;
use cts_harness::{smoke, Harness, VERSION};
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "cts-harness")]
#[command(version, about = "Conformance test harness (smoke suite, simulated device)", long_about = None)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Verbose output (-v for debug, -vv for trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Test names, wildcards, `all`, element count, device type, id<N>, pid<N>
    #[arg(value_name = "ARGS", allow_hyphen_values = true, trailing_var_arg = true, num_args = 0..)]
    tokens: Vec<String>,
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn real_main() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    debug!("cts-harness {}", VERSION);

    let api = SimulatedApi::default();
    let registry = smoke::registry::<SimulatedApi>().context("building the smoke suite")?;

    let argv: Vec<String> = std::iter::once(smoke::SUITE_NAME.to_string())
        .chain(cli.tokens)
        .collect();

    let outcome = Harness::new(&api)
        .run(&argv, &ProcessEnv, &registry)
        .context("harness run aborted")?;
    Ok(outcome.exit_code)
}

fn main() {
    let code = match real_main() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}
