//! # taxi-agent
//!
//! Taxi channel server binary: loads settings, wires the token validator and
//! trip store into the server, and serves until ctrl-c.

#![deny(unsafe_code)]

mod demo;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use taxi_auth::{JwtAuthenticator, KeyMaterial, TokenIssuer, TokenValidator, UserProfile};
use taxi_server::{InMemoryTripRepository, ServerConfig, TaxiServer, TripAccess};
use taxi_settings::{AuthSettings, JwtAlgorithm, TaxiSettings};

/// Real-time taxi trip channel.
#[derive(Parser, Debug)]
#[command(name = "taxi-agent", about = "Real-time taxi trip channel server")]
struct Cli {
    /// Settings file (defaults to `~/.taxi/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the channel (default).
    Serve(ServeArgs),
    /// Print a signed access/refresh token pair as JSON.
    Token(TokenArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seed demo trips into the in-memory store.
    #[arg(long)]
    demo: bool,

    /// Publish simulated trip events every N seconds (implies `--demo`).
    #[arg(long, value_name = "SECS")]
    simulate: Option<u64>,
}

#[derive(Args, Debug)]
struct TokenArgs {
    /// User id carried in the token.
    #[arg(long)]
    id: i64,

    /// Username (email) carried in the token.
    #[arg(long)]
    username: String,

    /// Given name.
    #[arg(long, default_value = "")]
    first_name: String,

    /// Family name.
    #[arg(long, default_value = "")]
    last_name: String,
}

impl ServeArgs {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
    }
}

/// Build key material from the auth settings.
fn key_material(auth: &AuthSettings) -> Result<KeyMaterial> {
    match auth.algorithm {
        JwtAlgorithm::Hs256 => {
            let Some(secret) = auth.jwt_secret.as_deref().filter(|s| !s.is_empty()) else {
                bail!("no JWT secret configured (set TAXI_JWT_SECRET or auth.jwtSecret)");
            };
            Ok(KeyMaterial::hs256(secret.as_bytes()))
        }
        JwtAlgorithm::Rs256 => {
            let public = auth.public_key_path.as_deref().context(
                "RS256 needs a public key (set TAXI_JWT_PUBLIC_KEY_PATH or auth.publicKeyPath)",
            )?;
            KeyMaterial::rs256_from_files(
                Path::new(public),
                auth.private_key_path.as_deref().map(Path::new),
            )
            .context("Failed to load RS256 keys")
        }
    }
}

fn load(path: Option<&Path>) -> Result<TaxiSettings> {
    match path {
        Some(path) => taxi_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => taxi_settings::load_settings().context("Failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if taxi_settings::init_settings(load(cli.settings.as_deref())?).is_err() {
        tracing::warn!("settings were already initialized");
    }
    let settings = taxi_settings::get_settings();
    taxi_core::logging::init_subscriber(
        settings.logging.level.as_filter_str(),
        settings.logging.format,
    );

    match cli.command {
        Some(Command::Token(args)) => print_token(settings, &args),
        Some(Command::Serve(args)) => serve(settings, args).await,
        None => serve(settings, ServeArgs::default()).await,
    }
}

fn print_token(settings: &TaxiSettings, args: &TokenArgs) -> Result<()> {
    let keys = key_material(&settings.auth)?;
    let issuer = TokenIssuer::new(&keys).context("Configured keys cannot sign tokens")?;
    let profile = UserProfile::new(
        args.id,
        args.username.as_str(),
        args.first_name.as_str(),
        args.last_name.as_str(),
    );
    let pair = issuer
        .issue_pair(&profile, chrono::Utc::now().timestamp())
        .context("Failed to issue tokens")?;
    println!("{}", serde_json::to_string_pretty(&pair)?);
    Ok(())
}

async fn serve(settings: &TaxiSettings, args: ServeArgs) -> Result<()> {
    let keys = key_material(&settings.auth)?;
    let validator = TokenValidator::new(&keys)
        .context("Invalid verification key")?
        .with_leeway(settings.auth.leeway_secs);
    let authenticator = Arc::new(JwtAuthenticator::new(validator));

    let mut config = ServerConfig::from_settings(&settings.server);
    args.apply(&mut config);

    let metrics_handle =
        taxi_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let trips = Arc::new(InMemoryTripRepository::new());
    let demo_ids = if args.demo || args.simulate.is_some() {
        demo::seed(&trips)
    } else {
        Vec::new()
    };

    let trip_access: Arc<dyn TripAccess> = trips.clone();
    let server = TaxiServer::new(config, authenticator, trip_access, metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("taxi channel listening on ws://{addr}/taxi/");

    let mut tasks = vec![handle];
    if let Some(secs) = args.simulate {
        tasks.push(tokio::spawn(demo::simulate(
            trips,
            Arc::clone(server.dispatcher()),
            demo_ids,
            Duration::from_secs(secs.max(1)),
            server.shutdown().token(),
        )));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(tasks, None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
