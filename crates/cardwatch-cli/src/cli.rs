use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cardwatch: presence and activity for the card admin dashboard.
#[derive(Parser, Debug)]
#[command(name = "cardwatch", version, about)]
pub struct Args {
    /// Presence websocket URL override.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// REST API base URL override.
    #[arg(long, global = true)]
    pub api: Option<String>,

    /// Auth token for the presence connection.
    #[arg(long, env = "CARDWATCH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Sign in and print a token for CARDWATCH_TOKEN.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Connect and print presence state whenever it changes.
    Watch {
        /// Also announce viewing this resource type (e.g. cardholder).
        #[arg(long, requires = "id")]
        resource: Option<String>,
        /// Resource id to view.
        #[arg(long, requires = "resource")]
        id: Option<String>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_credentials() {
        assert!(Args::try_parse_from(["cardwatch", "login", "--email", "a@b.c"]).is_err());
        let args = Args::try_parse_from([
            "cardwatch", "login", "--email", "a@b.c", "--password", "pw",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Login {
                email: "a@b.c".into(),
                password: "pw".into()
            }
        );
    }

    #[test]
    fn watch_resource_and_id_come_together() {
        assert!(Args::try_parse_from(["cardwatch", "watch", "--resource", "cardholder"]).is_err());
        let args = Args::try_parse_from([
            "cardwatch", "watch", "--resource", "cardholder", "--id", "7",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Watch {
                resource: Some("cardholder".into()),
                id: Some("7".into())
            }
        );
    }

    #[test]
    fn global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "cardwatch",
            "config",
            "--server",
            "ws://localhost:9/presence",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Config);
        assert_eq!(args.server.as_deref(), Some("ws://localhost:9/presence"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
