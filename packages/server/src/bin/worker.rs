//! Worker entry point: consumer, requeuer and cleaner.
//!
//! Runs the three long-lived loops as tokio tasks sharing one control flag.
//! On ctrl-c the flag is cleared; performers abandon their waits and the
//! loops exit on their next check. In-flight tasks are republished by the
//! requeuer once their due instant passes, so shutdown is non-destructive.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::config::Config;
use server_core::queue::{Cleaner, Consumer, ControlFlag, Notifier, Performer, Requeuer, TaskStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Torque worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // The consumer's blocking pops get their own connection so they never
    // stall the requeuer's pushes.
    let pop_notifier = Notifier::connect(&config.redis_url)
        .await
        .context("Failed to connect to redis")?;
    let push_notifier = Notifier::connect(&config.redis_url)
        .await
        .context("Failed to connect to redis")?;

    let store = TaskStore::new(pool, config.due.clone());
    let performer = Arc::new(Performer::new(
        store.clone(),
        reqwest::Client::new(),
        config.performer.clone(),
    ));

    let flag = ControlFlag::new();

    let consumer = Consumer::new(
        pop_notifier,
        performer,
        config.consumer.clone(),
        flag.clone(),
    );
    let requeuer = Requeuer::new(
        store.clone(),
        push_notifier,
        config.requeuer.clone(),
        flag.clone(),
    );
    let cleaner = Cleaner::new(store, config.cleaner.clone(), flag.clone());

    let consumer_handle = tokio::spawn(async move { consumer.run().await });
    let requeuer_handle = tokio::spawn(async move { requeuer.run().await });
    let cleaner_handle = tokio::spawn(async move { cleaner.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    flag.clear();

    let _ = tokio::join!(consumer_handle, requeuer_handle, cleaner_handle);

    Ok(())
}
