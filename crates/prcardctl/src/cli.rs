use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::config::Settings;
use crate::logging;

/// prcardctl - GitHub pull request cards for Feishu/Lark group chats
#[derive(Parser, Debug)]
#[command(name = "prcardctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    ///
    /// When omitted, ./prcard.yaml, /etc/prcard/prcard.yaml and
    /// ~/.prcard/prcard.yaml are tried in order.
    #[arg(long, short = 'c', global = true, env = "PRCARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Post the connectivity test card to the configured chat
    TestCard,

    /// Print the directory summary of a pull request's changes
    Diffstat {
        /// Repository (owner/repo)
        repo: String,

        /// Pull request number
        number: u64,
    },

    /// Check the configuration and print it with secrets masked
    Validate,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = Settings::load(self.config.as_deref())?;
        logging::init(&settings.logging)?;

        match self.command {
            Commands::Serve { port, host } => {
                commands::serve::execute(settings, port, host.as_deref()).await
            }
            Commands::TestCard => commands::test_card::execute(&settings).await,
            Commands::Diffstat { repo, number } => {
                commands::diffstat::execute(&settings, &repo, number).await
            }
            Commands::Validate => commands::validate::execute(&settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["prcardctl", "serve", "--port", "9090", "--host", "127.0.0.1"])
            .unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(9090));
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_diffstat() {
        let cli = Cli::try_parse_from(["prcardctl", "-c", "relay.yaml", "diffstat", "a/b", "7"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Diffstat { ref repo, number: 7 } if repo == "a/b"
        ));
    }

    #[test]
    fn test_diffstat_requires_number() {
        assert!(Cli::try_parse_from(["prcardctl", "diffstat", "a/b"]).is_err());
        assert!(Cli::try_parse_from(["prcardctl", "diffstat", "a/b", "seven"]).is_err());
    }
}
