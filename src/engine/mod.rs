//! Engine assembly: wires the session tracker, usage store and goal manager
//! together and exposes the API the launcher consumes.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    process_api::{ProcessProvider, SysinfoProvider},
    utils::clock::{Clock, DefaultClock},
};

pub mod category;
pub mod config;
pub mod goals;
pub mod store;
pub mod tracker;

use category::CategoryUsage;
use config::{AppSource, ConfigFileSource};
use goals::{GoalAlert, GoalManager, GoalPeriod, GoalProgress, GoalType, PinnedGoal};
use store::{usage_store, AppStatistics, UsageStore};
use tracker::{SessionTracker, SharedState, TrackerState, POLL_INTERVAL};

const GOAL_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingStatus {
    pub active: bool,
    pub running_apps: Vec<String>,
    pub total_apps_tracked: usize,
}

struct TrackerHandle {
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// The usage-tracking and goal-evaluation engine. All shared state lives
/// behind mutexes inside; the handle itself is cheap to share. Nothing here
/// is fatal to the host: the worst failure mode is tracking temporarily
/// stalled.
pub struct Engine {
    state: SharedState,
    store: Arc<UsageStore>,
    goals: GoalManager,
    apps: Arc<dyn AppSource>,
    clock: Arc<dyn Clock>,
    tracker: Mutex<Option<TrackerHandle>>,
}

impl Engine {
    pub async fn new(data_dir: &Path, apps: Arc<dyn AppSource>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(usage_store(data_dir));
        let usage = store.load().await;
        let goals = GoalManager::load(data_dir).await;

        Self {
            state: Arc::new(Mutex::new(TrackerState {
                usage,
                running: HashMap::new(),
            })),
            store,
            goals,
            apps,
            clock,
            tracker: Mutex::new(None),
        }
    }

    /// Spawns the poll loop. A no-op when tracking is already active.
    pub fn start_tracking(&self, provider: Box<dyn ProcessProvider>) {
        let mut guard = self.tracker.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let tracker = SessionTracker::new(
            provider,
            self.apps.clone(),
            self.state.clone(),
            self.store.clone(),
            self.clock.clone(),
            token.clone(),
            POLL_INTERVAL,
        );
        let task = tokio::spawn(tracker.run());
        *guard = Some(TrackerHandle { token, task });
        info!("Tracking started");
    }

    /// Stops the poll loop, draining every open session and persisting before
    /// returning. A no-op when tracking is not active.
    pub async fn stop_tracking(&self) -> Result<()> {
        let handle = self.tracker.lock().unwrap().take();
        let Some(TrackerHandle { token, task }) = handle else {
            return Ok(());
        };

        token.cancel();
        task.await??;
        info!("Tracking stopped");
        Ok(())
    }

    /// Records a launch the host performed itself, without waiting for the
    /// next poll to notice the process.
    pub async fn notify_launch(&self, app_name: &str) -> Result<()> {
        let now = self.clock.time();
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let record = state.usage.entry(app_name.to_string()).or_default();
            record.launch_count += 1;
            record.last_used = Some(now);
            state.usage.clone()
        };
        self.store.save(&snapshot).await
    }

    pub fn statistics(&self, period_days: i64) -> HashMap<String, AppStatistics> {
        let state = self.state.lock().unwrap();
        store::statistics(&state.usage, period_days, self.clock.time())
    }

    pub fn tracking_status(&self) -> TrackingStatus {
        let state = self.state.lock().unwrap();
        TrackingStatus {
            active: self.tracker.lock().unwrap().is_some(),
            running_apps: state.running.keys().cloned().collect(),
            total_apps_tracked: state.usage.len(),
        }
    }

    /// Deletes an application's usage history. Idempotent; reports whether
    /// anything was removed.
    pub async fn remove_app_data(&self, app_name: &str) -> Result<bool> {
        let (removed, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let removed = state.usage.remove(app_name).is_some();
            (removed, state.usage.clone())
        };
        if removed {
            self.store.save(&snapshot).await?;
        }
        Ok(removed)
    }

    pub async fn add_goal(
        &self,
        app_name: &str,
        goal_type: GoalType,
        limit_value: f64,
        period: GoalPeriod,
        pinned: bool,
    ) -> Result<String> {
        self.goals
            .add_goal(app_name, goal_type, limit_value, period, pinned, self.clock.time())
            .await
    }

    pub async fn remove_goal(&self, goal_id: &str) -> Result<bool> {
        self.goals.remove_goal(goal_id).await
    }

    pub async fn remove_goals_for_app(&self, app_name: &str) -> Result<usize> {
        self.goals.remove_goals_for_app(app_name).await
    }

    pub async fn toggle_goal(&self, goal_id: &str) -> Result<Option<bool>> {
        self.goals.toggle_goal(goal_id).await
    }

    pub fn check_goals(&self) -> Vec<GoalAlert> {
        let usage = self.state.lock().unwrap().usage.clone();
        let apps = self.apps.applications();
        self.goals.check_goals(&usage, &apps, self.clock.time())
    }

    pub fn goal_progress(&self, goal_id: &str) -> Option<GoalProgress> {
        let usage = self.state.lock().unwrap().usage.clone();
        let apps = self.apps.applications();
        self.goals
            .goal_progress(goal_id, &usage, &apps, self.clock.time())
    }

    pub fn pinned_goals(&self, hide_completed: bool) -> Vec<PinnedGoal> {
        let usage = self.state.lock().unwrap().usage.clone();
        let apps = self.apps.applications();
        self.goals
            .pinned_goals(hide_completed, &usage, &apps, self.clock.time())
    }

    pub fn category_usage(&self, period_days: i64) -> HashMap<String, CategoryUsage> {
        let stats = self.statistics(period_days);
        category::category_usage(&stats, &self.apps.applications())
    }

    /// Periodic goal evaluation. Alerts surface through the log; the ledger
    /// is pruned when the calendar date rolls over.
    pub async fn run_goal_scheduler(&self, shutdown: CancellationToken) {
        let mut last_day = self.clock.time().date_naive();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = self.clock.sleep(GOAL_CHECK_INTERVAL) => ()
            }

            let today = self.clock.time().date_naive();
            if today != last_day {
                self.goals.reset_daily_notifications(today);
                last_day = today;
            }

            for alert in self.check_goals() {
                warn!("{}", alert.message);
            }
        }
    }
}

/// Entry point for the `serve` command: runs the tracker and the goal
/// scheduler until a shutdown signal arrives, then drains and persists.
pub async fn run_engine(data_dir: PathBuf) -> Result<()> {
    let apps: Arc<dyn AppSource> = Arc::new(ConfigFileSource::new(&data_dir));
    let engine = Engine::new(&data_dir, apps, Arc::new(DefaultClock)).await;

    engine.start_tracking(Box::new(SysinfoProvider::new()));

    let shutdown = CancellationToken::new();
    tokio::join!(
        detect_shutdown(shutdown.clone()),
        engine.run_goal_scheduler(shutdown.clone()),
    );

    engine
        .stop_tracking()
        .await
        .inspect_err(|e| error!("Tracker exited with an error {e:?}"))?;
    Ok(())
}

async fn detect_shutdown(cancellation: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to listen for the shutdown signal, stopping");
    }
    cancellation.cancel();
}
