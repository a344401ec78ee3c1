//! User-defined usage goals and their evaluation into deduplicated alerts.
//!
//! A goal's identity is the `(app, type, period)` triple, flattened into the
//! id `"{app}_{type}_{period}"`; re-adding the same triple overwrites. The
//! notification ledger remembers which alerts already fired today so the
//! 5-minute evaluation timer can't spam; it is pruned on date rollover.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    path::Path,
    sync::Mutex,
};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{day_key, format_seconds};

use super::{
    category::{self, FALLBACK_CATEGORY},
    config::AppEntry,
    store::{statistics, AppStatistics, DocumentFile, UsageDocument},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Cap: alert when usage reaches the limit.
    MaxTime,
    /// Floor: alert when usage reaches the target.
    MinTime,
}

impl Display for GoalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalType::MaxTime => write!(f, "max_time"),
            GoalType::MinTime => write!(f, "min_time"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl GoalPeriod {
    /// Fixed day-count window, not calendar-aware.
    pub fn days(&self) -> i64 {
        match self {
            GoalPeriod::Daily => 1,
            GoalPeriod::Weekly => 7,
            GoalPeriod::Monthly => 30,
        }
    }
}

impl Display for GoalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalPeriod::Daily => write!(f, "daily"),
            GoalPeriod::Weekly => write!(f, "weekly"),
            GoalPeriod::Monthly => write!(f, "monthly"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Tracked application name, or a category display name.
    pub app_name: String,
    pub goal_type: GoalType,
    /// Seconds.
    pub limit_value: f64,
    pub period: GoalPeriod,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

pub type GoalsDocument = HashMap<String, Goal>;

pub fn goal_id(app_name: &str, goal_type: GoalType, period: GoalPeriod) -> String {
    format!("{app_name}_{goal_type}_{period}")
}

pub fn goal_store(data_dir: &Path) -> DocumentFile<GoalsDocument> {
    DocumentFile::new(data_dir.join("goals.json"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LimitExceeded,
    ApproachingLimit,
    GoalAchieved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAlert {
    pub kind: AlertKind,
    pub goal_id: String,
    pub app_name: String,
    pub current_time: f64,
    pub limit_value: f64,
    /// Raw ratio, present for cap goals; may exceed 100.
    pub percentage: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub current: f64,
    pub limit: f64,
    /// Clamped to `[0, 100]` for display.
    pub percentage: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone)]
pub struct PinnedGoal {
    pub goal_id: String,
    pub goal: Goal,
    pub progress: GoalProgress,
}

/// Holds the goal set and the daily notification ledger. Statistics are passed
/// in by the caller, so evaluation stays pure computation over loaded state.
pub struct GoalManager {
    goals: Mutex<GoalsDocument>,
    /// Keys `"{goal_id}_{date}"` and `"{goal_id}_{date}_warning"`.
    ledger: Mutex<HashSet<String>>,
    store: DocumentFile<GoalsDocument>,
}

impl GoalManager {
    pub async fn load(data_dir: &Path) -> Self {
        let store = goal_store(data_dir);
        let goals = store.load().await;
        Self {
            goals: Mutex::new(goals),
            ledger: Mutex::new(HashSet::new()),
            store,
        }
    }

    #[cfg(test)]
    fn in_memory(data_dir: &Path, goals: GoalsDocument) -> Self {
        Self {
            goals: Mutex::new(goals),
            ledger: Mutex::new(HashSet::new()),
            store: goal_store(data_dir),
        }
    }

    fn snapshot(&self) -> GoalsDocument {
        self.goals.lock().unwrap().clone()
    }

    pub fn goals(&self) -> GoalsDocument {
        self.snapshot()
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await
    }

    /// Adds or overwrites the goal for `(app, type, period)` and returns its id.
    pub async fn add_goal(
        &self,
        app_name: &str,
        goal_type: GoalType,
        limit_value: f64,
        period: GoalPeriod,
        pinned: bool,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let id = goal_id(app_name, goal_type, period);
        self.goals.lock().unwrap().insert(
            id.clone(),
            Goal {
                app_name: app_name.to_string(),
                goal_type,
                limit_value,
                period,
                enabled: true,
                pinned,
                created_at: now,
            },
        );
        self.persist().await?;
        Ok(id)
    }

    pub async fn remove_goal(&self, goal_id: &str) -> Result<bool> {
        let removed = self.goals.lock().unwrap().remove(goal_id).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Drops every goal referencing the application. This is the reconciliation
    /// point when an application is deleted or renamed.
    pub async fn remove_goals_for_app(&self, app_name: &str) -> Result<usize> {
        let removed = {
            let mut goals = self.goals.lock().unwrap();
            let before = goals.len();
            goals.retain(|_, goal| goal.app_name != app_name);
            before - goals.len()
        };
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Flips `enabled`, returning the new state, or `None` for an unknown id.
    pub async fn toggle_goal(&self, goal_id: &str) -> Result<Option<bool>> {
        let toggled = {
            let mut goals = self.goals.lock().unwrap();
            goals.get_mut(goal_id).map(|goal| {
                goal.enabled = !goal.enabled;
                goal.enabled
            })
        };
        if toggled.is_some() {
            self.persist().await?;
        }
        Ok(toggled)
    }

    /// Evaluates every enabled goal against the usage document and returns the
    /// alerts that have not fired yet today.
    pub fn check_goals(
        &self,
        document: &UsageDocument,
        apps: &[AppEntry],
        now: DateTime<Utc>,
    ) -> Vec<GoalAlert> {
        let goals = self.snapshot();
        let today = day_key(now.date_naive());
        let mut alerts = Vec::new();

        // The three periods map to three windows at most; compute each once.
        let mut stats_cache = HashMap::<i64, HashMap<String, AppStatistics>>::new();

        for (id, goal) in goals {
            if !goal.enabled || goal.limit_value <= 0. {
                continue;
            }

            let stats = stats_cache
                .entry(goal.period.days())
                .or_insert_with(|| statistics(document, goal.period.days(), now));

            let Some(current) = resolve_current(&goal.app_name, stats, apps) else {
                continue;
            };

            let day_scoped = format!("{id}_{today}");
            let percentage = current / goal.limit_value * 100.;

            match goal.goal_type {
                GoalType::MaxTime => {
                    if current >= goal.limit_value {
                        if self.ledger.lock().unwrap().insert(day_scoped) {
                            alerts.push(GoalAlert {
                                kind: AlertKind::LimitExceeded,
                                goal_id: id.clone(),
                                app_name: goal.app_name.clone(),
                                current_time: current,
                                limit_value: goal.limit_value,
                                percentage: Some(percentage),
                                message: format!(
                                    "Limit exceeded for {}: {} used of {}",
                                    goal.app_name,
                                    format_seconds(current),
                                    format_seconds(goal.limit_value),
                                ),
                            });
                        }
                    } else if percentage >= 80. {
                        let warning_key = format!("{day_scoped}_warning");
                        if self.ledger.lock().unwrap().insert(warning_key) {
                            alerts.push(GoalAlert {
                                kind: AlertKind::ApproachingLimit,
                                goal_id: id.clone(),
                                app_name: goal.app_name.clone(),
                                current_time: current,
                                limit_value: goal.limit_value,
                                percentage: Some(percentage),
                                message: format!(
                                    "{} is at {percentage:.0}% of its {} limit, {} remaining",
                                    goal.app_name,
                                    goal.period,
                                    format_seconds(goal.limit_value - current),
                                ),
                            });
                        }
                    }
                }
                GoalType::MinTime => {
                    if current >= goal.limit_value
                        && self.ledger.lock().unwrap().insert(day_scoped)
                    {
                        alerts.push(GoalAlert {
                            kind: AlertKind::GoalAchieved,
                            goal_id: id.clone(),
                            app_name: goal.app_name.clone(),
                            current_time: current,
                            limit_value: goal.limit_value,
                            percentage: None,
                            message: format!(
                                "Goal achieved for {}: {} of {}",
                                goal.app_name,
                                format_seconds(current),
                                format_seconds(goal.limit_value),
                            ),
                        });
                    }
                }
            }
        }

        alerts
    }

    /// Progress toward one goal, clamped for display. Returns `None` only for
    /// an unknown goal id; a goal whose application has no statistics yet gets
    /// a definite zero-progress result.
    pub fn goal_progress(
        &self,
        goal_id: &str,
        document: &UsageDocument,
        apps: &[AppEntry],
        now: DateTime<Utc>,
    ) -> Option<GoalProgress> {
        let goal = self.goals.lock().unwrap().get(goal_id).cloned()?;

        let stats = statistics(document, goal.period.days(), now);
        let current = resolve_current(&goal.app_name, &stats, apps).unwrap_or(0.);

        let percentage = if goal.limit_value > 0. {
            (current / goal.limit_value * 100.).clamp(0., 100.)
        } else {
            0.
        };

        Some(GoalProgress {
            current,
            limit: goal.limit_value,
            percentage,
            remaining: (goal.limit_value - current).max(0.),
        })
    }

    pub fn pinned_goals(
        &self,
        hide_completed: bool,
        document: &UsageDocument,
        apps: &[AppEntry],
        now: DateTime<Utc>,
    ) -> Vec<PinnedGoal> {
        let goals = self.snapshot();
        let mut pinned = Vec::new();

        for (id, goal) in goals {
            if !goal.pinned || !goal.enabled {
                continue;
            }
            let Some(progress) = self.goal_progress(&id, document, apps, now) else {
                continue;
            };
            if hide_completed && progress.percentage >= 100. {
                continue;
            }
            pinned.push(PinnedGoal {
                goal_id: id,
                goal,
                progress,
            });
        }

        pinned.sort_by(|a, b| a.goal_id.cmp(&b.goal_id));
        pinned
    }

    /// Drops ledger entries not dated today, so alerts can re-fire on a new
    /// calendar day and the ledger never grows unbounded.
    pub fn reset_daily_notifications(&self, today: NaiveDate) {
        let today = day_key(today);
        self.ledger
            .lock()
            .unwrap()
            .retain(|key| key.trim_end_matches("_warning").ends_with(&today));
    }
}

/// Resolves the current usage for a goal target: a tracked application name
/// first, a category display name second. Names matching neither yield `None`.
fn resolve_current(
    name: &str,
    stats: &HashMap<String, AppStatistics>,
    apps: &[AppEntry],
) -> Option<f64> {
    if let Some(app_stats) = stats.get(name) {
        return Some(app_stats.period_time);
    }

    let is_category = name == FALLBACK_CATEGORY
        || category::CATEGORIES.iter().any(|c| c.name == name);
    if is_category {
        return category::category_usage(stats, apps)
            .get(name)
            .map(|usage| usage.total_time);
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::engine::store::{Session, UsageDocument, UsageRecord};

    use super::{goal_id, AlertKind, GoalManager, GoalPeriod, GoalType, GoalsDocument};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 18, 0, 0).unwrap()
    }

    fn document_with_usage(app: &str, period_seconds: f64) -> UsageDocument {
        let start = now() - Duration::hours(3);
        let mut document = UsageDocument::new();
        document.insert(
            app.to_string(),
            UsageRecord {
                total_time: period_seconds,
                launch_count: 1,
                last_used: Some(start),
                sessions: vec![Session {
                    start,
                    end: start + Duration::seconds(period_seconds as i64),
                    duration: period_seconds,
                }],
            },
        );
        document
    }

    fn manager_with_goal(
        dir: &std::path::Path,
        app: &str,
        goal_type: GoalType,
        limit: f64,
    ) -> (GoalManager, String) {
        let id = goal_id(app, goal_type, GoalPeriod::Daily);
        let mut goals = GoalsDocument::new();
        goals.insert(
            id.clone(),
            super::Goal {
                app_name: app.to_string(),
                goal_type,
                limit_value: limit,
                period: GoalPeriod::Daily,
                enabled: true,
                pinned: false,
                created_at: now(),
            },
        );
        (GoalManager::in_memory(dir, goals), id)
    }

    #[test]
    fn under_limit_stays_silent() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager_with_goal(dir.path(), "Chrome", GoalType::MaxTime, 3600.);
        let document = document_with_usage("Chrome", 3000.);

        // 3000 of 3600 is 83%, so only the approaching warning fires.
        let alerts = manager.check_goals(&document, &[], now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ApproachingLimit);

        let document = document_with_usage("Chrome", 2000.);
        let dir2 = tempdir().unwrap();
        let (fresh, _) = manager_with_goal(dir2.path(), "Chrome", GoalType::MaxTime, 3600.);
        assert!(fresh.check_goals(&document, &[], now()).is_empty());
    }

    #[test]
    fn exceeded_limit_fires_once_per_day() {
        let dir = tempdir().unwrap();
        let (manager, id) = manager_with_goal(dir.path(), "Chrome", GoalType::MaxTime, 3600.);
        let document = document_with_usage("Chrome", 3700.);

        let alerts = manager.check_goals(&document, &[], now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::LimitExceeded);
        assert_eq!(alerts[0].goal_id, id);
        let pct = alerts[0].percentage.unwrap();
        assert!((pct - 102.8).abs() < 0.1, "percentage was {pct}");

        // Same day, second evaluation: nothing.
        assert!(manager.check_goals(&document, &[], now()).is_empty());
    }

    #[test]
    fn alerts_refire_after_date_rollover() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager_with_goal(dir.path(), "Chrome", GoalType::MaxTime, 3600.);
        let document = document_with_usage("Chrome", 3700.);

        assert_eq!(manager.check_goals(&document, &[], now()).len(), 1);

        let tomorrow = now() + Duration::days(1);
        manager.reset_daily_notifications(tomorrow.date_naive());
        let alerts = manager.check_goals(&document, &[], tomorrow);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn warning_does_not_suppress_exceeded() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager_with_goal(dir.path(), "Chrome", GoalType::MaxTime, 3600.);

        // 79% -> silent, 81% -> one warning, repeated 81% -> silent.
        assert!(manager
            .check_goals(&document_with_usage("Chrome", 2844.), &[], now())
            .is_empty());
        let warnings = manager.check_goals(&document_with_usage("Chrome", 2916.), &[], now());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, AlertKind::ApproachingLimit);
        assert!(manager
            .check_goals(&document_with_usage("Chrome", 2930.), &[], now())
            .is_empty());

        // Crossing the limit the same day still produces the exceeded alert.
        let exceeded = manager.check_goals(&document_with_usage("Chrome", 3700.), &[], now());
        assert_eq!(exceeded.len(), 1);
        assert_eq!(exceeded[0].kind, AlertKind::LimitExceeded);
    }

    #[test]
    fn min_time_goal_achieved_once() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager_with_goal(dir.path(), "Duolingo", GoalType::MinTime, 900.);

        assert!(manager
            .check_goals(&document_with_usage("Duolingo", 600.), &[], now())
            .is_empty());
        let alerts = manager.check_goals(&document_with_usage("Duolingo", 1000.), &[], now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::GoalAchieved);
        assert_eq!(alerts[0].percentage, None);
        assert!(manager
            .check_goals(&document_with_usage("Duolingo", 1200.), &[], now())
            .is_empty());
    }

    #[test]
    fn progress_is_clamped_and_total_for_unknown_apps() {
        let dir = tempdir().unwrap();
        let (manager, id) = manager_with_goal(dir.path(), "Chrome", GoalType::MaxTime, 3600.);

        let over = manager
            .goal_progress(&id, &document_with_usage("Chrome", 7200.), &[], now())
            .unwrap();
        assert_eq!(over.percentage, 100.);
        assert_eq!(over.remaining, 0.);

        let empty = manager
            .goal_progress(&id, &UsageDocument::new(), &[], now())
            .unwrap();
        assert_eq!(empty.current, 0.);
        assert_eq!(empty.percentage, 0.);
        assert_eq!(empty.remaining, 3600.);

        assert!(manager
            .goal_progress("missing_goal", &UsageDocument::new(), &[], now())
            .is_none());
    }

    #[test]
    fn category_goal_resolves_through_aggregation() {
        let dir = tempdir().unwrap();
        let (manager, id) = manager_with_goal(dir.path(), "Browsers", GoalType::MaxTime, 1800.);

        let document = document_with_usage("Chrome", 2000.);
        let apps = vec![crate::engine::config::AppEntry {
            name: "Chrome".into(),
            exe: "c:\\program files\\google\\chrome\\chrome.exe".into(),
        }];

        let alerts = manager.check_goals(&document, &apps, now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::LimitExceeded);
        assert_eq!(alerts[0].app_name, "Browsers");

        let progress = manager.goal_progress(&id, &document, &apps, now()).unwrap();
        assert_eq!(progress.current, 2000.);
    }

    #[test]
    fn pinned_goals_filter_completed() {
        let dir = tempdir().unwrap();
        let mut goals = GoalsDocument::new();
        for (app, pinned, limit) in [("Chrome", true, 3600.), ("Spotify", true, 1000.), ("Term", false, 100.)] {
            goals.insert(
                goal_id(app, GoalType::MaxTime, GoalPeriod::Daily),
                super::Goal {
                    app_name: app.to_string(),
                    goal_type: GoalType::MaxTime,
                    limit_value: limit,
                    period: GoalPeriod::Daily,
                    enabled: true,
                    pinned,
                    created_at: now(),
                },
            );
        }
        let manager = GoalManager::in_memory(dir.path(), goals);

        let mut document = document_with_usage("Chrome", 1800.);
        document.extend(document_with_usage("Spotify", 1500.));

        let all = manager.pinned_goals(false, &document, &[], now());
        assert_eq!(all.len(), 2);

        // Spotify is at 100%; hiding completed leaves Chrome alone.
        let visible = manager.pinned_goals(true, &document, &[], now());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].goal.app_name, "Chrome");
    }

    #[tokio::test]
    async fn goal_identity_is_the_triple() {
        let dir = tempdir().unwrap();
        let manager = GoalManager::load(dir.path()).await;

        let first = manager
            .add_goal("Chrome", GoalType::MaxTime, 3600., GoalPeriod::Daily, false, now())
            .await
            .unwrap();
        let second = manager
            .add_goal("Chrome", GoalType::MaxTime, 1800., GoalPeriod::Daily, true, now())
            .await
            .unwrap();

        assert_eq!(first, second);
        let goals = manager.goals();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[&first].limit_value, 1800.);
        assert!(goals[&first].pinned);

        // And the overwrite survived persistence.
        let reloaded = GoalManager::load(dir.path()).await;
        assert_eq!(reloaded.goals()[&first].limit_value, 1800.);
    }

    #[tokio::test]
    async fn removal_operations_report_outcomes() {
        let dir = tempdir().unwrap();
        let manager = GoalManager::load(dir.path()).await;

        let id = manager
            .add_goal("Chrome", GoalType::MaxTime, 3600., GoalPeriod::Daily, false, now())
            .await
            .unwrap();
        manager
            .add_goal("Chrome", GoalType::MinTime, 60., GoalPeriod::Weekly, false, now())
            .await
            .unwrap();

        assert_eq!(manager.toggle_goal(&id).await.unwrap(), Some(false));
        assert_eq!(manager.toggle_goal("nope").await.unwrap(), None);

        assert_eq!(manager.remove_goals_for_app("Chrome").await.unwrap(), 2);
        assert_eq!(manager.remove_goals_for_app("Chrome").await.unwrap(), 0);
        assert!(!manager.remove_goal(&id).await.unwrap());
    }
}
