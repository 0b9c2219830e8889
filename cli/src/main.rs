//! cdist CLI: converge hosts onto their manifests.
//!
//! # Usage
//!
//! ```text
//! cdist config web1 web2
//! cdist -d config -i ./init --dry-run web1
//! cdist --config-dir ~/site config --strategy staged --report run.json web1
//! ```
//!
//! Invoked under a type name (`__file`, via the links in `out/bin`), the
//! binary acts as the object emulator instead.

mod deploy;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cdist_core::context::Env;
use cdist_core::data::settings;
use cdist_core::emulator::{self, Emulator};
use cdist_core::Strategy;

use deploy::Deployment;


#[derive(Debug, Parser)]
#[command(name = "cdist", version, about = "Configuration management by convergence")]
struct Cli {
    /// Directory holding settings.yaml, conf/ and cache/
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Debug logging; also exports __debug=yes to scripts
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}


#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy the configuration to one or more hosts
    Config(ConfigArgs),
}


#[derive(Debug, Args)]
struct ConfigArgs {
    /// Initial manifest (default: <conf>/manifest/init)
    #[arg(short = 'i', long, value_name = "FILE")]
    initial_manifest: Option<PathBuf>,

    /// Working directory; each host gets a subdirectory
    #[arg(short = 'b', long, value_name = "DIR")]
    base_path: Option<PathBuf>,

    /// Generate code but do not execute it
    #[arg(long)]
    dry_run: bool,

    /// Ordering policy: fixed_point or staged
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Per-script timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write a JSON run report
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    #[arg(required = true, value_name = "HOST")]
    hosts: Vec<String>,
}


fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.first().is_some_and(|argv0| emulator::is_emulator_name(argv0)) {
        process::exit(run_emulator(&args));
    }

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match cli.command {
        Commands::Config(ref config) => run_config(&cli, config),
    };
    process::exit(code);
}


fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}


fn run_emulator(args: &[String]) -> i32 {
    let env: Env = std::env::vars().collect();
    match Emulator::from_args(args, &env).and_then(|e| e.record()) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("cdist: {}", e);
            1
        }
    }
}


fn run_config(cli: &Cli, args: &ConfigArgs) -> i32 {
    let deployment = match build_deployment(cli, args) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("cdist: {:#}", e);
            return 1;
        }
    };

    let outcome = deployment.deploy_all(&args.hosts);
    for (host, err) in &outcome.failures {
        eprintln!("cdist: {}: {:#}", host, err);
    }

    if let Some(path) = &args.report {
        if let Err(e) = deploy::write_reports(path, &outcome.reports) {
            eprintln!("cdist: {:#}", e);
            return 1;
        }
    }
    if outcome.success() {
        0
    } else {
        1
    }
}


/// Settings from the config directory, overridden by command-line flags.
fn build_deployment(cli: &Cli, args: &ConfigArgs) -> anyhow::Result<Deployment> {
    let config_dir = settings::resolve_config_dir(cli.config_dir.as_deref())?;
    let mut settings = settings::load(&config_dir)?;
    if let Some(strategy) = args.strategy {
        settings.strategy = strategy;
    }
    if let Some(secs) = args.timeout {
        settings.script_timeout_secs = Some(secs);
    }
    Ok(Deployment {
        settings,
        initial_manifest: args.initial_manifest.clone(),
        base_path: args.base_path.clone(),
        debug: cli.debug,
        dry_run: args.dry_run,
    })
}
