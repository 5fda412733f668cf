//! codestruct CLI entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use codestruct::cli::{Cli, Commands};
use codestruct::commands::{run_generate, run_query, run_validate, CommandContext, CommandOutput};
use codestruct::config::StructConfig;

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "CODESTRUCT_LOG";

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            print!("{}", output.text);
            match output.failure {
                Some(e) => {
                    eprintln!("Error: {}", e);
                    e.exit_code()
                }
                None => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> codestruct::Result<CommandOutput> {
    let cli = Cli::parse_args();
    init_logging(&cli);

    let ctx = CommandContext::from_cli(cli.format, cli.verbose, cli.progress);
    match &cli.command {
        Commands::Generate(args) => run_generate(args, &ctx),
        Commands::Validate(args) => run_validate(args, &ctx),
        Commands::Query(args) => run_query(args, &ctx),
    }
}

/// Log to stderr. `CODESTRUCT_LOG` wins, then `-v`, then `[logging] level`.
fn init_logging(cli: &Cli) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
        _ if cli.verbose => EnvFilter::new("codestruct=debug"),
        _ => EnvFilter::new(configured_level(cli)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Level from the config file the command would load; defaults on any problem
fn configured_level(cli: &Cli) -> String {
    let (explicit, root): (Option<&Path>, PathBuf) = match &cli.command {
        Commands::Generate(args) => (args.config.as_deref(), args.root.clone()),
        Commands::Validate(args) => (args.config.as_deref(), PathBuf::from(".")),
        Commands::Query(_) => (None, PathBuf::from(".")),
    };
    StructConfig::load(explicit, &root)
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| StructConfig::default().logging.level)
}
