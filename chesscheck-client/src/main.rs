use std::process::ExitCode;

use futures::future::join_all;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chesscheck_client::{ChessClient, Platform};

const USAGE: &str = "usage: chesscheck <lichess|chesscom> <username>...\n       chesscheck --stats";

enum Command {
    Stats,
    Validate {
        platform: Platform,
        usernames: Vec<String>,
    },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let first = args.next().ok_or_else(|| USAGE.to_string())?;
    if first == "--stats" {
        return Ok(Command::Stats);
    }
    let platform: Platform = first.parse()?;
    let usernames: Vec<String> = args.collect();
    if usernames.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(Command::Validate {
        platform,
        usernames,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    chesscheck_core::load_dotenv();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let config = match chesscheck_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing; RUST_LOG wins over the configured level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = match ChessClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let sweeper = client.spawn_cache_sweeper(config.settings.sweep_interval());

    if let Command::Validate {
        platform,
        usernames,
    } = &command
    {
        info!(%platform, count = usernames.len(), "Validating usernames");
        let results = join_all(
            usernames
                .iter()
                .map(|username| client.validate_user(*platform, username)),
        )
        .await;

        for (username, result) in usernames.iter().zip(results) {
            let outcome = result.unwrap_or_else(|e| e.outcome());
            println!(
                "{} {} {} {}",
                platform, username, outcome.exists, outcome.message
            );
        }
    }

    let stats = client.stats().await;
    sweeper.abort();
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize stats: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
