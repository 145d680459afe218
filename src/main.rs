//! Barbershop - website of a barbershop

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use barbershop::{
    api::{self, AppState},
    config::Config,
    db,
    models::UserRole,
};

/// Expired sessions and stale login counters are swept this often
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "barbershop", about = "Barbershop website server and admin tools", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "BARBERSHOP_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and start the HTTP server (default command)
    Serve(ServeArgs),
    /// Apply pending database migrations and exit
    Migrate,
    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "BARBERSHOP_ADMIN_PASSWORD")]
        password: String,
    },
    /// Change the role of an existing account
    SetRole {
        #[arg(long)]
        email: String,
        /// admin, staff or client
        #[arg(long)]
        role: UserRole,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barbershop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load_with_env(&cli.config)?;
    tracing::info!(path = %cli.config.display(), "Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            serve(config, pool).await
        }
        Command::Migrate => Ok(()),
        Command::CreateAdmin {
            email,
            username,
            password,
        } => {
            let state = AppState::new(config, pool)?;
            let user = state
                .user_service
                .create_admin(&username, &email, &password)
                .await
                .context("Failed to create admin")?;
            tracing::info!(user_id = user.id, username = %user.username, "Administrator created");
            Ok(())
        }
        Command::SetRole { email, role } => {
            let state = AppState::new(config, pool)?;
            let user = state
                .user_service
                .set_role(&email, role)
                .await
                .context("Failed to change role")?;
            tracing::info!(user_id = user.id, role = %user.role, "Role changed");
            Ok(())
        }
    }
}

async fn serve(config: Config, pool: db::DynDatabasePool) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, pool)?;

    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Expired sessions removed"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
