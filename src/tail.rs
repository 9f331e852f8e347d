//! `hooklog tail`

use anyhow::{Context, Result};
use clap::Args;
use hooklog_client::{
    CursorStore, Dashboard, DashboardEvent, FileCursorStore, LiveFeed, LiveUpdate,
};
use hooklog_proto::StreamCursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output;
use crate::ClientArgs;

#[derive(Args, Debug)]
pub struct TailArgs {
    /// Stored requests to print before following (0 skips the history)
    #[arg(long, default_value = "20")]
    history: usize,

    /// Where the live feed position is kept between runs
    #[arg(long, env = "HOOKLOG_CURSOR_FILE")]
    cursor_file: Option<PathBuf>,

    /// Forget the saved position and follow only new requests
    #[arg(long)]
    reset: bool,
}

pub async fn run(client: &ClientArgs, args: TailArgs) -> Result<()> {
    let client = client.connect().await?;
    let mut dashboard = Dashboard::new(client.clone());

    if args.history > 0 {
        dashboard
            .load_history()
            .await
            .context("Failed to fetch history")?;
        let records = dashboard.records();
        // Oldest first so the newest ends up next to the live output
        output::print_records(records.iter().take(args.history).rev());
    }

    let cursors: Arc<dyn CursorStore> = match args.cursor_file {
        Some(path) => Arc::new(FileCursorStore::new(path)),
        None => Arc::new(FileCursorStore::default_location()?),
    };
    if args.reset {
        cursors.save(&StreamCursor::latest())?;
    }

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let feed = LiveFeed::new(client, cursors).spawn(tx, cancel.clone());

    loop {
        tokio::select! {
            _ = signal::ctrl_c(), if !cancel.is_cancelled() => {
                info!("Stopping live feed...");
                cancel.cancel();
            }
            update = rx.recv() => match update {
                None | Some(LiveUpdate::Closed) => break,
                Some(update) => match follow(&mut dashboard, update) {
                    Some(TailLine::Record(line)) => println!("{}", line),
                    Some(TailLine::Notice(line)) => eprintln!("! {}", line),
                    None => {}
                },
            }
        }
    }

    feed.await.context("Live feed task failed")?;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum TailLine {
    Record(String),
    Notice(String),
}

/// Apply one live update and return the line to print, if any.
///
/// Records already on screen (loaded history, or repeated after a resume)
/// print nothing.
fn follow(dashboard: &mut Dashboard, update: LiveUpdate) -> Option<TailLine> {
    match update {
        LiveUpdate::Record(record) => {
            let line = output::format_record(&record);
            dashboard
                .view_mut()
                .push_live(record)
                .then_some(TailLine::Record(line))
        }
        LiveUpdate::Connected => {
            info!("Following new requests");
            None
        }
        other => dashboard
            .handle(DashboardEvent::Live(other))
            .map(|notice| TailLine::Notice(notice.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklog_client::DashboardClient;
    use hooklog_proto::{CapturedRequest, RequestRecord};

    fn record(key: i64) -> RequestRecord {
        let request = CapturedRequest::from_json(&format!(
            r#"{{"method":"GET","path":"/r/{}","timestamp":"2025-01-01T00:00:{:02}Z"}}"#,
            key, key
        ))
        .unwrap();
        RequestRecord::new(key, request)
    }

    #[test]
    fn test_follow_skips_records_already_listed() {
        let client = DashboardClient::new("http://127.0.0.1:3000").unwrap();
        let mut dashboard = Dashboard::new(client);
        dashboard.view_mut().set_history(vec![record(2), record(1)]);

        // A saved cursor older than the history replays keys 1 and 2
        assert_eq!(follow(&mut dashboard, LiveUpdate::Record(record(1))), None);
        assert_eq!(follow(&mut dashboard, LiveUpdate::Record(record(2))), None);

        let line = follow(&mut dashboard, LiveUpdate::Record(record(3)));
        assert!(matches!(line, Some(TailLine::Record(ref l)) if l.contains("/r/3")));
        assert_eq!(follow(&mut dashboard, LiveUpdate::Record(record(3))), None);
    }

    #[test]
    fn test_follow_reports_disconnects() {
        let client = DashboardClient::new("http://127.0.0.1:3000").unwrap();
        let mut dashboard = Dashboard::new(client);

        assert_eq!(follow(&mut dashboard, LiveUpdate::Connected), None);
        let line = follow(
            &mut dashboard,
            LiveUpdate::Disconnected {
                reason: "connection reset".to_string(),
                retry_in: std::time::Duration::from_secs(1),
            },
        );
        assert!(matches!(line, Some(TailLine::Notice(ref l)) if l.contains("connection reset")));
    }
}
