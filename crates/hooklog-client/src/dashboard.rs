//! Dashboard controller
//!
//! Owns the [`DashboardView`] and applies everything to it from one place:
//! user actions, live updates and delete completions all go through
//! `&mut self`. A delete captures its snapshot synchronously, sends the
//! request from a spawned task and reports back as a [`DashboardEvent`].

use hooklog_proto::{ActionResponse, RequestRecord};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{ClientError, DashboardClient};
use crate::live::LiveUpdate;
use crate::view::{DashboardView, DeleteSnapshot, SearchOutcome};

/// Message for the user; never fatal
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NoResults,
    SearchFailed(String),
    DeleteFailed { key: i64, reason: String },
    DeleteAllFailed(String),
    BadFrame(String),
    Disconnected(String),
    SignedOut,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoResults => write!(f, "no results"),
            Notice::SearchFailed(reason) => write!(f, "search failed: {}", reason),
            Notice::DeleteFailed { key, reason } => {
                write!(f, "failed to delete {}: {}", key, reason)
            }
            Notice::DeleteAllFailed(reason) => write!(f, "failed to delete all: {}", reason),
            Notice::BadFrame(reason) => write!(f, "bad live event: {}", reason),
            Notice::Disconnected(reason) => write!(f, "live feed disconnected: {}", reason),
            Notice::SignedOut => write!(f, "session expired, sign in again"),
        }
    }
}

/// Input to [`Dashboard::handle`]
#[derive(Debug)]
pub enum DashboardEvent {
    Live(LiveUpdate),
    DeleteFinished {
        snapshot: DeleteSnapshot,
        result: Result<ActionResponse, ClientError>,
    },
}

pub struct Dashboard {
    client: DashboardClient,
    view: DashboardView,
}

impl Dashboard {
    pub fn new(client: DashboardClient) -> Self {
        Self::with_view(client, DashboardView::new())
    }

    pub fn with_view(client: DashboardClient, view: DashboardView) -> Self {
        Self { client, view }
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut DashboardView {
        &mut self.view
    }

    pub fn client(&self) -> &DashboardClient {
        &self.client
    }

    pub fn records(&self) -> Vec<RequestRecord> {
        self.view.records()
    }

    /// Load the full history; returns the record count
    pub async fn load_history(&mut self) -> Result<usize, ClientError> {
        let records = self.client.history().await?;
        let count = records.len();
        self.view.set_history(records);
        info!("Loaded {} records", count);
        Ok(count)
    }

    /// Search, or clear the results when `query` is blank
    pub async fn search(&mut self, query: &str) -> (SearchOutcome, Option<Notice>) {
        if query.trim().is_empty() {
            self.view.clear_search();
            return (SearchOutcome::Cleared, None);
        }

        let outcome = match self.client.search(query.trim(), None, None).await {
            Ok(response) => self.view.apply_search(response),
            Err(e) => {
                self.view.clear_search();
                SearchOutcome::Failed(e.to_string())
            }
        };

        let notice = match &outcome {
            SearchOutcome::NoResults => Some(Notice::NoResults),
            SearchOutcome::Failed(reason) => {
                warn!("Search {:?} failed: {}", query, reason);
                Some(Notice::SearchFailed(reason.clone()))
            }
            _ => None,
        };
        (outcome, notice)
    }

    /// Remove `key` from the view now and send the delete in the background.
    ///
    /// The outcome arrives on `events` as [`DashboardEvent::DeleteFinished`].
    pub fn delete(&mut self, key: i64, events: mpsc::Sender<DashboardEvent>) {
        let snapshot = self.view.begin_delete(key);
        let client = self.client.clone();

        tokio::spawn(async move {
            let result = client.delete(key).await;
            let _ = events
                .send(DashboardEvent::DeleteFinished { snapshot, result })
                .await;
        });
    }

    /// Delete every record; the view is cleared only if the server agreed
    pub async fn delete_all(&mut self) -> Result<String, Notice> {
        match self.client.delete_all().await {
            Ok(response) if response.success => {
                self.view.clear_all();
                Ok(response.message.unwrap_or_default())
            }
            Ok(response) => Err(Notice::DeleteAllFailed(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            Err(e) => Err(Notice::DeleteAllFailed(e.to_string())),
        }
    }

    /// Apply one event to the view
    pub fn handle(&mut self, event: DashboardEvent) -> Option<Notice> {
        match event {
            DashboardEvent::Live(update) => self.handle_live(update),
            DashboardEvent::DeleteFinished { snapshot, result } => match result {
                Ok(response) if response.success => {
                    info!("Deleted record {}", snapshot.key);
                    self.view.complete_delete(&snapshot);
                    None
                }
                Ok(response) => {
                    let key = snapshot.key;
                    self.view.rollback_delete(snapshot);
                    Some(Notice::DeleteFailed {
                        key,
                        reason: response.error.unwrap_or_else(|| "unknown error".to_string()),
                    })
                }
                Err(e) => {
                    let key = snapshot.key;
                    warn!("Delete of {} failed, restoring: {}", key, e);
                    self.view.rollback_delete(snapshot);
                    Some(Notice::DeleteFailed {
                        key,
                        reason: e.to_string(),
                    })
                }
            },
        }
    }

    fn handle_live(&mut self, update: LiveUpdate) -> Option<Notice> {
        match update {
            LiveUpdate::Record(record) => {
                self.view.push_live(record);
                None
            }
            LiveUpdate::BadFrame(reason) => Some(Notice::BadFrame(reason)),
            LiveUpdate::Disconnected { reason, .. } => Some(Notice::Disconnected(reason)),
            LiveUpdate::Unauthorized => Some(Notice::SignedOut),
            LiveUpdate::Connected | LiveUpdate::Closed => None,
        }
    }
}
