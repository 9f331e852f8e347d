//! hooklog - admin dashboard over captured HTTP requests
//!
//! `serve` runs the dashboard API in front of the request store; the other
//! commands talk to a running server.

mod output;
mod serve;
mod tail;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hooklog_client::DashboardClient;
use hooklog_proto::{HeaderEntry, PageInput};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(
    env!("HOOKLOG_VERSION"),
    " (built ",
    env!("HOOKLOG_BUILD_DATE"),
    ")"
);

/// hooklog - browse, search and prune captured HTTP requests
#[derive(Parser, Debug)]
#[command(name = "hooklog")]
#[command(about = "Admin dashboard over captured HTTP request logs", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", env = "HOOKLOG_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dashboard server
    Serve(serve::ServeArgs),

    /// Print stored requests, then follow new ones as they arrive
    Tail {
        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        args: tail::TailArgs,
    },

    /// List stored requests, newest first
    List {
        #[command(flatten)]
        client: ClientArgs,

        /// Show at most this many requests
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Search stored requests (e.g. `@method:{POST}`, `"/api/v1"`)
    Search {
        #[command(flatten)]
        client: ClientArgs,

        /// Query expression; `*` matches everything
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        offset: Option<usize>,
    },

    /// Delete one stored request by key
    Delete {
        #[command(flatten)]
        client: ClientArgs,

        key: i64,
    },

    /// Delete every key in the store
    Purge {
        #[command(flatten)]
        client: ClientArgs,

        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    /// Manage custom pages
    Pages {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: PagesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PagesCommand {
    /// List custom pages
    List,

    /// Save a page (POST), or rewrite it in one step with --replace (PUT)
    Put {
        /// Path the page is served under, e.g. /probe.js
        endpoint: String,

        /// Response body
        #[arg(long)]
        body: Option<String>,

        /// Response status code (default 200)
        #[arg(long)]
        status_code: Option<i64>,

        /// Response header as `Name: value`; repeatable
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Delete and rewrite the page atomically
        #[arg(long)]
        replace: bool,
    },

    /// Remove a page
    Delete { endpoint: String },
}

/// How client commands reach and sign in to the server
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Dashboard server URL
    #[arg(long, env = "HOOKLOG_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    #[arg(long, env = "HOOKLOG_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "HOOKLOG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Existing session token, used instead of signing in
    #[arg(long, env = "HOOKLOG_SESSION", hide_env_values = true)]
    session: Option<String>,
}

impl ClientArgs {
    pub async fn connect(&self) -> Result<DashboardClient> {
        let client = DashboardClient::new(&self.server).context("Invalid --server URL")?;

        if let Some(session) = &self.session {
            return Ok(client.with_session(session.clone()));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                let mut client = client;
                client
                    .login(username, password)
                    .await
                    .with_context(|| format!("Failed to sign in to {}", self.server))?;
                Ok(client)
            }
            _ => bail!("Set HOOKLOG_SESSION, or HOOKLOG_USERNAME and HOOKLOG_PASSWORD"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Tail { client, args } => tail::run(&client, args).await,
        Commands::List { client, limit } => {
            let client = client.connect().await?;
            let records = client.history().await.context("Failed to fetch history")?;
            output::print_records(records.iter().take(limit));
            output::print_count(records.len().min(limit), records.len());
            Ok(())
        }
        Commands::Search {
            client,
            query,
            limit,
            offset,
        } => {
            let client = client.connect().await?;
            let response = client.search(&query, limit, offset).await?;
            if !response.success {
                bail!(
                    "Search failed: {}",
                    response.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            if response.total == 0 {
                println!("No results");
                return Ok(());
            }
            output::print_records(response.results.iter());
            output::print_count(response.results.len(), response.total as usize);
            Ok(())
        }
        Commands::Delete { client, key } => {
            let client = client.connect().await?;
            let response = client
                .delete(key)
                .await
                .with_context(|| format!("Failed to delete {}", key))?;
            output::print_action(&response);
            Ok(())
        }
        Commands::Purge { client, yes } => {
            if !yes {
                bail!("Purge deletes every key in the store; pass --yes to confirm");
            }
            let client = client.connect().await?;
            let response = client.delete_all().await.context("Failed to purge")?;
            output::print_action(&response);
            Ok(())
        }
        Commands::Pages { client, command } => run_pages(&client, command).await,
    }
}

async fn run_pages(client: &ClientArgs, command: PagesCommand) -> Result<()> {
    let client = client.connect().await?;

    match command {
        PagesCommand::List => {
            let pages = client.pages().await.context("Failed to list pages")?;
            output::print_pages(&pages);
        }
        PagesCommand::Put {
            endpoint,
            body,
            status_code,
            headers,
            replace,
        } => {
            let headers = headers
                .iter()
                .map(|header| parse_header(header))
                .collect::<Result<Vec<_>>>()?;
            let input = PageInput {
                endpoint,
                body,
                status_code,
                headers,
            };
            let response = client.put_page(&input, replace).await?;
            output::print_action(&response);
        }
        PagesCommand::Delete { endpoint } => {
            let response = client.delete_page(&endpoint).await?;
            output::print_action(&response);
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<HeaderEntry> {
    let (key, value) = raw
        .split_once(':')
        .with_context(|| format!("Header {:?} is not `Name: value`", raw))?;
    Ok(HeaderEntry {
        key: key.trim().to_string(),
        value: value.trim().to_string(),
    })
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
