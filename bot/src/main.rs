#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::Context as _;
use poise::{self, serenity_prelude as serenity};
use serenity::GatewayIntents;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::health::{HealthState, serve_health};
use crate::vatsim::DatafeedClient;

mod cache;
mod commands;
mod config;
mod db;
mod embeds;
mod error;
mod health;
mod jobs;
mod matching;
mod notifier;
mod trackers;
mod vatsim;

type Error = anyhow::Error;
type PoiseContext<'a> = poise::Context<'a, AppState, Error>;

static JOBS_STARTED: OnceLock<()> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    cfg: Config,
    db: PgPool,
    vatsim: DatafeedClient,
    health: HealthState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("install tracing subscriber")?;

    let cfg = Config::load().context("load config")?;

    let db = PgPool::connect(&cfg.database_url)
        .await
        .context("connect postgres")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    // Cancellation token shared across tasks; listener cancels on SIGINT/SIGTERM.
    let shutdown = CancellationToken::new();
    tokio::spawn(shared::shutdown_listener(Some(shutdown.clone())));

    let health = HealthState::new();
    let state = AppState {
        db,
        vatsim: DatafeedClient::new_with_client(reqwest::Client::new()),
        cfg: cfg.clone(),
        health: health.clone(),
    };

    let health_addr: SocketAddr = cfg.health_addr.parse().context("parse health addr")?;
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = serve_health(health, health_addr, shutdown).await {
                error!(error = ?err, "health server stopped");
            }
        }
    });

    let job_shutdown = shutdown.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::atcnotify(),
                commands::track_pilot(),
                commands::untrack_pilot(),
                commands::track_controller(),
                commands::untrack_controller(),
                commands::lookup(),
            ],
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            let state = state.clone();
            let job_shutdown = job_shutdown.clone();
            Box::pin(async move {
                state.health.set_cache(ctx.cache.clone()).await;

                // Register commands (guild-scoped if configured, otherwise global).
                if let Some(guild_id) = state.cfg.command_guild_id {
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        guild_id.into(),
                    )
                    .await?;
                } else {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                }
                info!("gateway ready, commands registered");

                // The gateway being ready is the startup barrier for the
                // polling jobs; guard against re-running on reconnect.
                if JOBS_STARTED.set(()).is_ok() {
                    jobs::spawn_all(state.clone(), ctx.clone(), job_shutdown);
                }
                Ok(state)
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS;
    let mut client = serenity::ClientBuilder::new(cfg.discord_token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}
