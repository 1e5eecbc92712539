//! # scale-runner
//!
//! Runs VM scale tests against a KubeVirt cluster.
//!
//! ## Commands
//!
//! - `run`: Execute registered tests and print the suite summary
//! - `list`: Show registered tests
//! - `validate`: Run one retried state check and write its report
//!
//! ## Example
//!
//! ```bash
//! # Sanity run of two tests, one after the other
//! scale-runner run cpu-limits memory-sizing
//!
//! # Full-scale run of everything, concurrently
//! scale-runner run --all --mode full --parallel
//!
//! # Post-workload hook inside a test
//! scale-runner validate running --test-name cpu-limits -n scale-1 -l app=scale
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use scale_probe::CheckKind;
use scale_types::Mode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod orchestrator;
mod registry;
mod unit;

use commands::{exec_unit, list, run, validate};
use orchestrator::Strategy;

/// Runs VM scale tests against a KubeVirt cluster.
#[derive(Parser, Debug)]
#[command(name = "scale-runner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute tests and print the suite summary
    Run {
        /// Tests to run, in order
        tests: Vec<String>,

        /// Run mode (sanity or full)
        #[arg(long, default_value = "sanity")]
        mode: Mode,

        /// Run all selected tests concurrently
        #[arg(long, conflicts_with = "sequential")]
        parallel: bool,

        /// Run selected tests one at a time (default)
        #[arg(long, conflicts_with = "parallel")]
        sequential: bool,

        /// Run every registered test
        #[arg(long, conflicts_with = "tests")]
        all: bool,

        /// List registered tests and exit
        #[arg(long)]
        list: bool,

        /// Config file replacing config/<mode>.toml
        #[arg(long)]
        config: Option<PathBuf>,

        /// Suite directory holding registry.toml
        #[arg(long, default_value = "suite")]
        suite_dir: PathBuf,
    },

    /// List registered tests
    List {
        /// Suite directory holding registry.toml
        #[arg(long, default_value = "suite")]
        suite_dir: PathBuf,
    },

    /// Run one state check with retries and write its JSON report
    Validate {
        /// Check to run (running, cpu, memory, disk, hotplug, nic, resize, shutdown)
        check: CheckKind,

        /// Test the report belongs to
        #[arg(long, env = "TEST_NAME")]
        test_name: String,

        /// Namespace to inspect
        #[arg(long, short, conflicts_with = "all_namespaces")]
        namespace: Option<String>,

        /// Inspect every namespace
        #[arg(long, short = 'A')]
        all_namespaces: bool,

        /// Label selector of the population
        #[arg(long, short = 'l')]
        selector: String,

        /// Where the report is written
        #[arg(long, env = "RESULTS_DIR", default_value = ".")]
        results_dir: PathBuf,

        /// Expected number of VMs/VMIs
        #[arg(long)]
        expected_count: Option<usize>,

        /// Expected vCPUs per VM
        #[arg(long)]
        expected_cores: Option<u32>,

        /// Expected guest memory (e.g. 4Gi)
        #[arg(long)]
        expected_memory: Option<String>,

        /// Expected data disk size (e.g. 20Gi)
        #[arg(long)]
        expected_disk: Option<String>,

        /// Expected interface count per VM
        #[arg(long)]
        expected_nics: Option<usize>,

        /// Expected hotplugged volumes per VMI
        #[arg(long)]
        expected_hotplug: Option<usize>,

        /// Guest block device of the data disk
        #[arg(long)]
        disk_device: Option<String>,

        /// Name fragment of data volumes
        #[arg(long)]
        data_volume: Option<String>,

        /// Process expected to run in the guest
        #[arg(long)]
        process: Option<String>,

        /// Mount point expected in the guest
        #[arg(long)]
        mount: Option<String>,

        /// Single attempt, no retries
        #[arg(long)]
        no_retry: bool,

        /// Config file (defaults plus environment otherwise)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run one test in this process (used by `run`)
    #[command(hide = true)]
    ExecUnit {
        test: String,

        #[arg(long)]
        mode: Mode,

        #[arg(long)]
        results_dir: PathBuf,

        #[arg(long, default_value = "suite")]
        suite_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Run {
            tests,
            mode,
            parallel,
            sequential: _,
            all,
            list,
            config,
            suite_dir,
        } => {
            let strategy = if parallel {
                Strategy::Concurrent
            } else {
                Strategy::Sequential
            };
            run::run(run::RunOptions {
                tests,
                all,
                list,
                mode,
                strategy,
                config,
                suite_dir,
                verbose: cli.verbose,
            })
            .await?
        }
        Commands::List { suite_dir } => {
            list::run(&suite_dir)?;
            0
        }
        Commands::Validate {
            check,
            test_name,
            namespace,
            all_namespaces,
            selector,
            results_dir,
            expected_count,
            expected_cores,
            expected_memory,
            expected_disk,
            expected_nics,
            expected_hotplug,
            disk_device,
            data_volume,
            process,
            mount,
            no_retry,
            config,
        } => {
            validate::run(validate::ValidateOptions {
                check,
                test_name,
                namespace,
                all_namespaces,
                selector,
                results_dir,
                expected_count,
                expected_cores,
                expected_memory,
                expected_disk,
                expected_nics,
                expected_hotplug,
                disk_device,
                data_volume,
                process,
                mount,
                no_retry,
                config,
            })
            .await?
        }
        Commands::ExecUnit {
            test,
            mode,
            results_dir,
            suite_dir,
            config,
        } => exec_unit::run(&test, mode, &results_dir, &suite_dir, config).await?,
    };

    Ok(exit_code(code))
}
