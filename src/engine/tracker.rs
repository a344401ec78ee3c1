//! Session inference from process snapshots.
//!
//! Each configured application walks a two-state machine, NotRunning and
//! Running, driven by one scan per poll interval. A start transition bumps
//! the launch counter and stamps `last_used`; an end transition folds the
//! elapsed interval into the usage record unless it is shorter than the
//! flicker threshold.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    process_api::{ProcessInfo, ProcessProvider},
    utils::clock::Clock,
};

use super::{
    config::{is_link_target, AppSource},
    store::{Session, UsageDocument, UsageStore},
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Extended sleep after a failed scan. The loop never terminates on errors.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Sessions shorter than this are flicker from process detection, not real
/// usage, and are discarded. The launch counter keeps its increment: the
/// start was observed, the session just didn't survive.
const MIN_SESSION_SECONDS: f64 = 5.;

/// Transient per-application run state. At most one entry per name.
#[derive(Debug, Clone)]
pub struct RunningSession {
    pub start: DateTime<Utc>,
    pub pid: u32,
}

/// State shared between the poll loop, goal evaluation and host queries.
#[derive(Default)]
pub struct TrackerState {
    pub usage: UsageDocument,
    pub running: HashMap<String, RunningSession>,
}

pub type SharedState = Arc<Mutex<TrackerState>>;

/// Finds the first process the configured executable matches. Rules in order:
/// exact file-name match, file name contained in the process name, configured
/// path contained in the process path, extension-stripped names equal. The
/// first process satisfying any rule terminates the search.
fn match_process<'a>(exe_path: &str, processes: &'a [ProcessInfo]) -> Option<&'a ProcessInfo> {
    let file_name = base_file_name(exe_path);
    let stem = strip_extension(file_name);

    processes.iter().find(|process| {
        if !file_name.is_empty()
            && (file_name == process.name || process.name.contains(file_name))
        {
            return true;
        }
        if !process.exe.is_empty() && !exe_path.is_empty() && process.exe.contains(exe_path) {
            return true;
        }
        let process_stem = strip_extension(&process.name);
        !stem.is_empty() && !process_stem.is_empty() && stem == process_stem
    })
}

/// Base file name of a path using either separator; configured paths can be
/// Windows-style regardless of the host platform.
fn base_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn strip_extension(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
}

/// Transition NotRunning -> Running. A no-op when an entry already exists,
/// which keeps the one-entry-per-name invariant.
fn start_session(state: &mut TrackerState, app_name: &str, pid: u32, now: DateTime<Utc>) {
    if state.running.contains_key(app_name) {
        return;
    }
    state
        .running
        .insert(app_name.to_string(), RunningSession { start: now, pid });

    let record = state.usage.entry(app_name.to_string()).or_default();
    record.launch_count += 1;
    record.last_used = Some(now);
    info!("Detected start of {app_name}");
}

/// Transition Running -> NotRunning. Returns whether a session was recorded.
fn end_session(state: &mut TrackerState, app_name: &str, now: DateTime<Utc>) -> bool {
    let Some(running) = state.running.remove(app_name) else {
        return false;
    };

    let duration = (now - running.start).num_milliseconds() as f64 / 1000.;
    if duration < MIN_SESSION_SECONDS {
        debug!("Dropping {duration:.1}s flicker session of {app_name}");
        return false;
    }

    let record = state.usage.entry(app_name.to_string()).or_default();
    record.total_time += duration;
    record.sessions.push(Session {
        start: running.start,
        end: now,
        duration,
    });
    info!("Detected end of {app_name} after {duration:.0}s");
    true
}

pub struct SessionTracker {
    provider: Box<dyn ProcessProvider>,
    apps: Arc<dyn AppSource>,
    state: SharedState,
    store: Arc<UsageStore>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl SessionTracker {
    pub fn new(
        provider: Box<dyn ProcessProvider>,
        apps: Arc<dyn AppSource>,
        state: SharedState,
        store: Arc<UsageStore>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            apps,
            state,
            store,
            clock,
            shutdown,
            poll_interval,
        }
    }

    /// One pass of the snapshot against the configured applications. Returns
    /// whether a completed session needs persisting.
    fn scan_once(&mut self) -> Result<bool> {
        let processes = self.provider.processes()?;
        let applications = self.apps.applications();
        let now = self.clock.time();

        let mut state = self.state.lock().unwrap();
        let mut dirty = false;

        for app in &applications {
            let exe = app.exe.to_lowercase();
            if is_link_target(&exe) {
                continue;
            }

            let matched = match_process(&exe, &processes);
            let running = state.running.contains_key(&app.name);

            match (matched, running) {
                (Some(process), false) => start_session(&mut state, &app.name, process.pid, now),
                (None, true) => dirty |= end_session(&mut state, &app.name, now),
                _ => {}
            }
        }

        Ok(dirty)
    }

    async fn persist(&self) {
        let snapshot = self.state.lock().unwrap().usage.clone();
        if let Err(e) = self.store.save(&snapshot).await {
            warn!("Failed to persist usage data: {e:?}");
        }
    }

    /// Force-closes every still-running session and persists. Called on
    /// shutdown so no session is silently lost.
    async fn finalize(&mut self) -> Result<()> {
        let now = self.clock.time();
        {
            let mut state = self.state.lock().unwrap();
            let open = state.running.keys().cloned().collect::<Vec<_>>();
            for app_name in open {
                end_session(&mut state, &app_name, now);
            }
        }
        let snapshot = self.state.lock().unwrap().usage.clone();
        self.store.save(&snapshot).await
    }

    /// Executes the polling event loop until cancellation.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.poll_interval;

            match self.scan_once() {
                Ok(true) => self.persist().await,
                Ok(false) => {}
                Err(e) => {
                    error!("Scan failed: {e:?}");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            return self.finalize().await;
                        }
                        _ = self.clock.sleep(ERROR_BACKOFF) => ()
                    }
                    poll_point = self.clock.instant();
                    continue;
                }
            }

            tokio::select! {
                // Cancellation drains open sessions before the loop returns,
                // so shutdown is a blocking flush rather than fire-and-forget.
                _ = self.shutdown.cancelled() => {
                    return self.finalize().await;
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }
}
