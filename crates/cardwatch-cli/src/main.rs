mod api;
mod cli;
mod watch;

use std::process::ExitCode;
use std::time::Duration;

use cardwatch_common::CardwatchError;
use cardwatch_config::schema::CardwatchConfig;
use cardwatch_presence::{AuthSession, PresenceConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

fn init_logging(level: &str) {
    let directive = format!(
        "warn,cardwatch={level},cardwatch_presence={level},cardwatch_config={level}"
    );
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .init();
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut CardwatchConfig, args: &Args) {
    if let Some(server) = &args.server {
        config.presence.server_url = server.clone();
    }
    if let Some(api) = &args.api {
        config.api.base_url = api.clone();
    }
}

async fn run(args: Args, config: CardwatchConfig) -> Result<(), CardwatchError> {
    match &args.command {
        Command::Config => {
            println!("{}", cardwatch_config::config_to_json(&config));
        }
        Command::Login { email, password } => {
            let api = api::ApiClient::new(
                &config.api.base_url,
                Duration::from_secs(config.api.request_timeout_secs),
            )?;
            let session = api.login(email, password).await?.into_session();
            let shown = if config.logging.redact_secrets {
                api::redact_token(&session.token)
            } else {
                session.token.clone()
            };
            tracing::info!(user = ?session.user_id(), token = %shown, "Logged in");
            println!("export CARDWATCH_TOKEN={}", session.token);
        }
        Command::Watch { resource, id } => {
            if !config.presence.enabled {
                return Err(CardwatchError::Other("presence is disabled in config".into()));
            }
            let token = args.token.clone().ok_or_else(|| {
                CardwatchError::Other(
                    "no token: run `cardwatch login` or set CARDWATCH_TOKEN".into(),
                )
            })?;
            let target = resource.clone().zip(id.clone());
            watch::run(
                PresenceConfig::from_config(&config),
                AuthSession::from_token(token),
                target,
            )
            .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = cardwatch_config::load_config_from(args.config.as_deref());
    let level = args.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|c| c.logging.level.as_directive())
            .unwrap_or("info")
            .to_string()
    });
    init_logging(&level);

    let mut config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        CardwatchConfig::default()
    });
    apply_overrides(&mut config, &args);
    tracing::debug!(server = %config.presence.server_url, api = %config.api.base_url, "Config ready");

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
