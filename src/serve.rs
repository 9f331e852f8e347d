//! `hooklog serve`

use anyhow::{Context, Result};
use clap::Args;
use hooklog_api::{ApiServer, ApiServerConfig};
use hooklog_auth::{generate_secret, Credentials};
use hooklog_store::{MemoryStore, RecordStore, RedisStore, RedisStoreConfig, StoreError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// URL scheme selecting the in-process store
const MEMORY_URL_SCHEME: &str = "memory://";

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// HTTP bind address
    #[arg(long, env = "HOOKLOG_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Store URL; `memory://` keeps everything in this process
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Pooled store connections shared by request handlers
    #[arg(long, default_value = "5")]
    pool_size: usize,

    /// Longest single wait on the request log per live feed read
    #[arg(long, default_value = "5")]
    stream_block_secs: u64,

    /// Seconds between store health checks
    #[arg(long, default_value = "25")]
    health_interval_secs: u64,

    /// Id of the admin account, stored in the session token
    #[arg(long, env = "USER_ID", default_value = "0")]
    user_id: String,

    #[arg(long, env = "USER_NAME", default_value = "admin")]
    user_name: String,

    #[arg(long, env = "USER_PASSWORD", hide_env_values = true)]
    user_password: Option<String>,

    /// Session signing key; a random one is generated when unset
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Mark the session cookie `Secure` (serve behind HTTPS)
    #[arg(long)]
    secure_cookie: bool,

    /// Allow cross-origin requests from localhost dev servers
    #[arg(long)]
    cors: bool,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let store = open_store(&args).await?;

    let secret = match args.secret_key.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() => secret.to_string(),
        _ => {
            warn!("SECRET_KEY not set, generated a random key; sessions end on restart");
            generate_secret()
        }
    };

    let password = args.user_password.clone().unwrap_or_default();
    if password.trim().is_empty() {
        warn!("USER_PASSWORD not set, sign-in is disabled");
    }
    let credentials = Credentials::new(args.user_id.clone(), args.user_name.clone(), password);

    let config = ApiServerConfig {
        bind_addr: args.bind,
        enable_cors: args.cors,
        stream_block: Duration::from_secs(args.stream_block_secs.max(1)),
        secure_cookie: args.secure_cookie,
    };
    let server = ApiServer::new(config, store.clone(), credentials, secret.as_bytes());

    let cancel = CancellationToken::new();
    let health = tokio::spawn(monitor_health(
        store,
        Duration::from_secs(args.health_interval_secs.max(1)),
        cancel.clone(),
        log_health_change,
    ));

    info!("Press Ctrl+C to stop");

    // Open live feeds never finish, so the signal ends the server directly
    let result = tokio::select! {
        result = server.start() => result,
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(err) => error!("Error listening for shutdown signal: {}", err),
            }
            Ok(())
        }
    };

    cancel.cancel();
    let _ = health.await;
    result
}

async fn open_store(args: &ServeArgs) -> Result<Arc<dyn RecordStore>> {
    if args.redis_url.starts_with(MEMORY_URL_SCHEME) {
        warn!("Using the in-memory store; nothing is persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let config = RedisStoreConfig {
        url: args.redis_url.clone(),
        pool_size: args.pool_size.max(1),
        ..Default::default()
    };
    let store = RedisStore::connect(config)
        .await
        .context("Failed to connect to Redis")?;
    Ok(Arc::new(store))
}

/// Ping the store periodically and report each change of state to `on_change`.
///
/// The first ping always counts as a change.
async fn monitor_health<F>(
    store: Arc<dyn RecordStore>,
    interval: Duration,
    cancel: CancellationToken,
    mut on_change: F,
) where
    F: FnMut(&str, Result<(), StoreError>) + Send,
{
    let mut ticker = tokio::time::interval(interval);
    let mut was_up: Option<bool> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = store.ping().await;
        let is_up = result.is_ok();
        if was_up == Some(is_up) {
            continue;
        }

        on_change(store.name(), result);
        was_up = Some(is_up);
    }
}

fn log_health_change(name: &str, result: Result<(), StoreError>) {
    match result {
        Ok(()) => info!("Store {} is UP", name),
        Err(e) => error!("Store {} is DOWN: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn spawn_monitor(
        store: &MemoryStore,
        cancel: &CancellationToken,
    ) -> (tokio::task::JoinHandle<()>, Arc<Mutex<Vec<bool>>>) {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let handle = tokio::spawn(monitor_health(
            Arc::new(store.clone()),
            Duration::from_secs(25),
            cancel.clone(),
            move |_, result: Result<(), StoreError>| sink.lock().unwrap().push(result.is_ok()),
        ));
        (handle, changes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_up_down_up() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let (handle, changes) = spawn_monitor(&store, &cancel);

        // Several healthy ticks report UP once
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*changes.lock().unwrap(), vec![true]);

        store.set_offline(true);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*changes.lock().unwrap(), vec![true, false]);

        store.set_offline(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*changes.lock().unwrap(), vec![true, false, true]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_cancel() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let (handle, changes) = spawn_monitor(&store, &cancel);

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        store.set_offline(true);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*changes.lock().unwrap(), vec![true]);
    }
}
