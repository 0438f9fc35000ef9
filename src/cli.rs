use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use anyhow::Context;

use crate::config::{get_config_path, load_config, save_config};
use crate::gateway::{GatewayMode, run_gateway};

#[derive(Parser, Debug)]
#[command(name = "calorie-bot")]
#[command(about = "calorie-bot - Telegram calorie estimator and food log API")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ~/.calorie-bot/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Telegram bot and the HTTP API together
    Run(ServeArgs),
    /// Run the Telegram bot only
    Bot(ServeArgs),
    /// Run the HTTP API only
    Api(ServeArgs),
    /// Write a config file from the current environment
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Display version information
    Version,
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP API port
    #[arg(long)]
    pub port: Option<u16>,

    /// Gemini model used for estimates
    #[arg(long)]
    pub model: Option<String>,
}

pub fn run(cli: Cli) {
    let Some(command) = cli.command else {
        print_help();
        process::exit(0);
    };

    let (mode, args) = match command {
        Commands::Version => {
            print_version();
            process::exit(0);
        }
        Commands::Init { force } => match init_config(cli.config, force) {
            Ok(path) => {
                println!("Configuration written to {}", path.display());
                process::exit(0);
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        },
        Commands::Run(args) => (GatewayMode::All, args),
        Commands::Bot(args) => (GatewayMode::Bot, args),
        Commands::Api(args) => (GatewayMode::Api, args),
    };

    if let Err(e) = serve(mode, args, cli.config) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn serve(mode: GatewayMode, args: ServeArgs, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(args.port, args.model, config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_gateway(&config, mode))
}

/// Saves the layered configuration (existing file, then environment) so
/// later runs do not need the environment variables.
fn init_config(config_path: Option<PathBuf>, force: bool) -> anyhow::Result<PathBuf> {
    let path = match config_path {
        Some(path) => path,
        None => get_config_path().context("Could not determine the home directory")?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite it",
            path.display()
        );
    }

    let config = load_config(None, None, Some(path.clone()))?;
    save_config(&config, &path)?;
    Ok(path)
}

pub fn extract_command_from_error(error_msg: &str) -> String {
    // Try to extract the command name from error messages like:
    // "error: unrecognized subcommand 'invalid_command'"
    if let Some(start) = error_msg.find('\'') {
        if let Some(end) = error_msg[start + 1..].find('\'') {
            return error_msg[start + 1..start + 1 + end].to_string();
        }
    }
    "unknown".to_string()
}

fn print_version() {
    println!("calorie-bot {}", env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    println!("calorie-bot - Telegram calorie estimator and food log API");
    println!();
    println!("Usage: calorie-bot [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  run      Run the Telegram bot and the HTTP API together");
    println!("  bot      Run the Telegram bot only");
    println!("  api      Run the HTTP API only");
    println!("  init     Write a config file from the current environment");
    println!("  version  Display version information");
    println!("  help     Print this message or the help of the given subcommand(s)");
    println!();
    println!("Options:");
    println!("  -v, --verbose      Enable debug logging");
    println!("      --config PATH  Path to the config file");
    println!("  -V, --version      Print version");
    println!("  -h, --help         Print help");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_version_string_format() {
        let version = env!("CARGO_PKG_VERSION");
        let parts: Vec<&str> = version.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_available() {
        let cmd = Cli::command();
        let subcommands: Vec<_> = cmd
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        for name in ["run", "bot", "api", "init", "version"] {
            assert!(subcommands.contains(&name.to_string()), "missing {}", name);
        }
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "calorie-bot",
            "--verbose",
            "api",
            "--port",
            "9090",
            "--model",
            "gemini-2.0-flash",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Api(args)) => {
                assert_eq!(args.port, Some(9090));
                assert_eq!(args.model.as_deref(), Some("gemini-2.0-flash"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["calorie-bot", "run", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn test_parse_init_force() {
        let cli = Cli::try_parse_from(["calorie-bot", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["calorie-bot", "run", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_extract_command_from_error() {
        let msg = "error: unrecognized subcommand 'foo_bar'";
        assert_eq!(extract_command_from_error(msg), "foo_bar");
        assert_eq!(extract_command_from_error("some error without command"), "unknown");
    }
}
