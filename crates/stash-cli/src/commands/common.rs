use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use stash_core::alert::{Alert, UserAction};
use stash_core::auth::SessionFeed;
use stash_core::config::ClientConfig;
use stash_core::store::SupabaseDocumentStore;
use stash_core::watcher::{Route, SessionBound, SessionWatcher, WatcherEvent};
use stash_core::{MediaItem, Task};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::auth::{auth_service_for_profile, CliAuthService};
use crate::config_profiles::resolve_client_config;
use crate::error::CliError;

const LOAD_TIMEOUT_SECS: u64 = 30;
const SHORT_ID_LEN: usize = 13;

/// Process-wide services for one command, built once from the profile.
pub struct Workspace {
    pub profile_name: String,
    pub config: ClientConfig,
    pub auth: CliAuthService,
    pub store: Arc<SupabaseDocumentStore>,
}

impl Workspace {
    pub fn open(global_profile: Option<&str>) -> Result<Self, CliError> {
        let (profile_name, config) =
            resolve_client_config(global_profile).map_err(CliError::Config)?;
        let feed = SessionFeed::new();
        let auth = auth_service_for_profile(&profile_name, &config, feed.clone())?;
        let (url, anon_key) = config.supabase()?;
        let store = Arc::new(SupabaseDocumentStore::new(url, anon_key, feed)?);

        Ok(Self {
            profile_name,
            config,
            auth,
            store,
        })
    }

    pub fn feed(&self) -> &SessionFeed {
        self.auth.feed()
    }

    /// Restores the stored session, mounts a watcher over `target` and
    /// waits for its first load.
    pub async fn mount_screen(
        &self,
        target: Arc<dyn SessionBound>,
    ) -> Result<SessionWatcher, CliError> {
        self.auth
            .restore_session()
            .await
            .map_err(|error| CliError::action(UserAction::Load, error.into()))?;
        let (watcher, mut events) = SessionWatcher::mount(self.feed(), target);
        let count = wait_for_first_load(&mut events).await?;
        tracing::debug!("Screen for profile '{}' loaded {} records", self.profile_name, count);
        Ok(watcher)
    }
}

/// Waits until the watcher reports the first load for a signed-in user.
pub async fn wait_for_first_load(
    events: &mut UnboundedReceiver<WatcherEvent>,
) -> Result<usize, CliError> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(LOAD_TIMEOUT_SECS), events.recv())
            .await
            .map_err(|_| {
                CliError::Alert(Alert::new(
                    "Load Failed",
                    "Timed out waiting for your data to load.",
                ))
            })?;
        match event {
            Some(WatcherEvent::Loaded { count, .. }) => return Ok(count),
            Some(WatcherEvent::LoadFailed { alert, .. }) => return Err(CliError::Alert(alert)),
            Some(WatcherEvent::Navigate(Route::Entry)) => return Err(not_signed_in()),
            Some(WatcherEvent::Cleared) => {}
            None => {
                return Err(CliError::Config(
                    "Session watcher stopped unexpectedly".to_string(),
                ))
            }
        }
    }
}

pub fn not_signed_in() -> CliError {
    CliError::Alert(Alert::new(
        "Not Signed In",
        "No user logged in. Run `stash auth login --email <email> --password <password>`.",
    ))
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolves a full ID or a unique ID prefix against `ids`.
pub fn resolve_id<'a>(
    query: &str,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<String, CliError> {
    let query = normalize_identifier(query)?;
    let ids = ids.into_iter().collect::<Vec<_>>();
    if ids.contains(&query.as_str()) {
        return Ok(query);
    }

    let matching_ids = ids
        .into_iter()
        .filter(|id| id.starts_with(&query))
        .collect::<Vec<_>>();

    match matching_ids.as_slice() {
        [] => Err(CliError::NotFound(query)),
        [id] => Ok((*id).to_string()),
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub task: String,
    pub completed: bool,
    pub created_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct MediaListItem {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub uploaded_at: i64,
    pub relative_time: String,
}

pub fn task_to_list_item(task: &Task) -> TaskListItem {
    TaskListItem {
        id: task.id.clone(),
        task: task.task.clone(),
        completed: task.completed,
        created_at: task.created_at,
        relative_time: format_relative_time(task.created_at, Utc::now().timestamp_millis()),
    }
}

pub fn media_to_list_item(item: &MediaItem) -> MediaListItem {
    MediaListItem {
        id: item.id.clone(),
        filename: item.filename.clone(),
        url: item.url.clone(),
        uploaded_at: item.uploaded_at,
        relative_time: format_relative_time(item.uploaded_at, Utc::now().timestamp_millis()),
    }
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let preview = preview_text(&task.task, 40);
            let relative_time = format_relative_time(task.created_at, now_ms);
            format!(
                "{:<13}  {mark} {preview:<40}  {relative_time}",
                short_id(&task.id)
            )
        })
        .collect()
}

pub fn format_media_lines(items: &[MediaItem]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .map(|item| {
            let filename = preview_text(&item.filename, 30);
            let relative_time = format_relative_time(item.uploaded_at, now_ms);
            format!(
                "{:<13}  {filename:<30}  {relative_time:<10}  {}",
                short_id(&item.id),
                item.url
            )
        })
        .collect()
}

/// First line, whitespace collapsed, cut to `max_chars` with an ellipsis.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
