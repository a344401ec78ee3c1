use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};

use crate::{
    engine::{
        category::CategoryUsage,
        goals::{Goal, GoalProgress},
        store::AppStatistics,
    },
    utils::time::format_seconds,
};

fn format_last_used(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|v| v.with_timezone(&Local).format("%x %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Per-application statistics, most used first.
pub fn print_statistics(stats: &HashMap<String, AppStatistics>, days: i64) {
    let mut entries = stats.iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| b.1.period_time.total_cmp(&a.1.period_time));

    println!("Usage over the last {days} day(s):");
    for (name, entry) in entries {
        println!(
            "{}\t{} total\t{} launches\t{} avg\tlast used {}\t{}",
            format_seconds(entry.period_time),
            format_seconds(entry.total_time),
            entry.period_launches,
            format_seconds(entry.avg_session_time),
            format_last_used(entry.last_used),
            name,
        );
    }
}

/// Category totals, largest first, with member applications indented.
pub fn print_categories(usage: &HashMap<String, CategoryUsage>, days: i64) {
    let mut entries = usage.iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| b.1.total_time.total_cmp(&a.1.total_time));

    println!("Category usage over the last {days} day(s):");
    for (category, entry) in entries {
        println!(
            "{}\t{} launches\t{}",
            format_seconds(entry.total_time),
            entry.launches,
            category,
        );
        let mut apps = entry.apps.clone();
        apps.sort_by(|a, b| b.time.total_cmp(&a.time));
        for app in apps {
            println!("\t{}\t{}", format_seconds(app.time), app.name);
        }
    }
}

pub fn print_goal(goal_id: &str, goal: &Goal, progress: Option<&GoalProgress>) {
    let state = if goal.enabled { "enabled" } else { "disabled" };
    let pin = if goal.pinned { "pinned" } else { "" };

    match progress {
        Some(progress) => println!(
            "{goal_id}\t{state}\t{pin}\t{} of {} ({:.0}%)",
            format_seconds(progress.current),
            format_seconds(progress.limit),
            progress.percentage,
        ),
        None => println!(
            "{goal_id}\t{state}\t{pin}\tlimit {}",
            format_seconds(goal.limit_value),
        ),
    }
}
