use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::agent::CommandPipeline;
use tally::api::{create_router, AppState};
use tally::config::Config;
use tally::db::Database;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Manage recurring payments with natural-language commands")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Run a single command and print the reply
    Ask {
        /// The command, e.g. "Add Netflix £15.99 monthly"
        text: String,
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long, default_value = "cli")]
        session: String,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    tracing::info!("Initializing database...");
    let db = Database::new(&config.database, config.embeddings.dimensions).await?;
    let pipeline = CommandPipeline::from_config(&config, db.clone())?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Ask {
            text,
            user,
            session,
            json,
        } => {
            let result = pipeline.handle_command(&text, &user, &session).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.message);
            }
            db.sync().await;
        }
        Command::Serve => serve(config, pipeline, db).await?,
    }

    Ok(())
}

async fn serve(config: Config, pipeline: CommandPipeline, db: Database) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_router(AppState::new(config, pipeline));

    tracing::info!("Tally starting on http://{}", addr);
    tracing::info!("  Commands:     POST http://{}/api/v1/commands", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  OpenAPI spec: http://{}/api/v1/openapi.json", addr);

    let cancel_token = CancellationToken::new();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
        .await?;

    tracing::info!("Server stopped, syncing database...");
    db.sync().await;
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel_token.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    cancel_token.cancel();
}
