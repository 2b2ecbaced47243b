//! Inkpress CLI
//!
//! Single binary static site generator for markdown blogs.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for Inkpress.
#[derive(Parser)]
#[command(name = "inkpress", version, about = "A static site generator for markdown blogs")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "site.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the static site for production
    Build {
        /// Output directory, overriding `paths.output_dir`
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Start development server with live reload
    Watch {
        /// Port to listen on, overriding `watch.port`
        #[arg(short, long)]
        port: Option<u16>,
        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
    /// Assemble the site without writing it and report counts
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    inkpress::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { output } => {
            inkpress::cmd::build::run(&cli.config, output.as_deref()).await?;
        }
        Commands::Watch { port, open } => {
            inkpress::cmd::watch::run(&cli.config, port, open).await?;
        }
        Commands::Check => {
            inkpress::cmd::check::run(&cli.config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_build_command_parsing() {
        let args = ["inkpress", "build", "--output", "dist"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, std::path::PathBuf::from("site.toml"));
        assert_eq!(cli.verbose, 0);

        match cli.command {
            Commands::Build { output } => {
                assert_eq!(output, Some(std::path::PathBuf::from("dist")));
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_build_without_output() {
        let cli = Cli::parse_from(["inkpress", "build"]);

        match cli.command {
            Commands::Build { output } => assert!(output.is_none()),
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_watch_command_parsing() {
        let args = ["inkpress", "watch", "--port", "8080", "--open"];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Watch { port, open } => {
                assert_eq!(port, Some(8080));
                assert!(open);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_watch_defaults_to_config_port() {
        let cli = Cli::parse_from(["inkpress", "watch"]);

        match cli.command {
            Commands::Watch { port, open } => {
                assert!(port.is_none());
                assert!(!open);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_check_command_parsing() {
        let cli = Cli::parse_from(["inkpress", "check"]);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let args = ["inkpress", "-vvv", "build"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_custom_config_path() {
        let args = ["inkpress", "--config", "blog/site.toml", "build"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config, std::path::PathBuf::from("blog/site.toml"));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["inkpress", "new", "post"]).is_err());
    }
}
