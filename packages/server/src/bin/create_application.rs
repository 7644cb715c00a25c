//! Console bootstrap: create an application and print its api key.

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use server_core::config::Config;
use server_core::queue::TaskStore;

#[derive(Parser)]
#[command(name = "create_application")]
#[command(about = "Create an application and print its generated api key")]
struct Cli {
    /// Application name
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = TaskStore::new(pool, config.due);
    let (app, key) = store.create_application(&cli.name).await?;

    println!("Application {} created with id {}.", app.name, app.id);
    println!("NTORQUE_API_KEY={}", key.value);

    Ok(())
}
