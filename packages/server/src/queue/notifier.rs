//! Notification channel on Redis.
//!
//! A durable ordered list keyed by channel name, carrying
//! `"<task_id>:<retry_count>"` instruction strings. Producers append with
//! RPUSH; the consumer blocks on BLPOP so instructions are handed out in
//! push order.

use anyhow::Result;
use redis::aio::ConnectionManager;
use std::time::Duration;

#[derive(Clone)]
pub struct Notifier {
    conn: ConnectionManager,
}

impl Notifier {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to Redis and wrap the connection in an auto-reconnecting
    /// manager.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Append an instruction to the tail of the channel.
    pub async fn push_tail(&self, channel: &str, instruction: &str) -> Result<()> {
        let _: () = redis::cmd("RPUSH")
            .arg(channel)
            .arg(instruction)
            .query_async(&mut self.conn.clone())
            .await?;

        Ok(())
    }

    /// Block up to `timeout` for the head of any of the given channels.
    ///
    /// Returns the channel name and instruction, or None on timeout.
    pub async fn block_pop_head(
        &self,
        channels: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>> {
        let mut cmd = redis::cmd("BLPOP");
        for channel in channels {
            cmd.arg(channel);
        }
        let popped: Option<(String, String)> = cmd
            .arg(timeout.as_secs_f64())
            .query_async(&mut self.conn.clone())
            .await?;

        Ok(popped)
    }

    /// Number of instructions waiting on the channel.
    pub async fn length(&self, channel: &str) -> Result<usize> {
        let len: usize = redis::cmd("LLEN")
            .arg(channel)
            .query_async(&mut self.conn.clone())
            .await?;

        Ok(len)
    }

    /// Pop the head of the channel without blocking.
    pub async fn pop_head(&self, channel: &str) -> Result<Option<String>> {
        let popped: Option<String> = redis::cmd("LPOP")
            .arg(channel)
            .query_async(&mut self.conn.clone())
            .await?;

        Ok(popped)
    }
}
