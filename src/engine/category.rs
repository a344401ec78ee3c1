//! Application categorization from executable paths and display names.
//!
//! The table is an ordered list of immutable descriptors. Order matters:
//! ties in the scoring are resolved by the first maximum encountered, so the
//! table sequence is part of the classifier's contract.

use std::collections::HashMap;

use serde::Serialize;

use super::{config::AppEntry, store::AppStatistics};

pub struct Category {
    pub name: &'static str,
    keywords: &'static [&'static str],
    paths: &'static [&'static str],
    executables: &'static [&'static str],
    extensions: &'static [&'static str],
}

/// Bucket for applications no category claims with a high enough score.
pub const FALLBACK_CATEGORY: &str = "Other";

/// A category only wins with an aggregate score of at least this much, so a
/// lone extension hit never categorizes anything.
const MIN_SCORE: u32 = 3;

pub static CATEGORIES: &[Category] = &[
    Category {
        name: "Games",
        keywords: &[
            "game", "gaming", "steam", "epic", "uplay", "origin", "gog", "minecraft", "fortnite",
            "league", "valorant", "overwatch", "wow", "battle.net",
        ],
        paths: &["steam", "games", "epic games", "riot games", "rockstar games"],
        executables: &["steam.exe", "epicgameslauncher.exe", "riotclientservices.exe"],
        extensions: &[".exe"],
    },
    Category {
        name: "Development",
        keywords: &[
            "visual studio", "vscode", "pycharm", "intellij", "eclipse", "netbeans", "atom",
            "sublime", "notepad++", "git", "github", "docker", "node", "python", "java",
            "compiler",
        ],
        paths: &["microsoft visual studio", "jetbrains", "python", "nodejs", "git"],
        executables: &["code.exe", "devenv.exe", "pycharm64.exe", "idea64.exe"],
        extensions: &[".exe", ".bat", ".ps1"],
    },
    Category {
        name: "Office",
        keywords: &[
            "office", "word", "excel", "powerpoint", "outlook", "onenote", "access", "publisher",
            "libreoffice", "openoffice", "writer", "calc", "impress",
        ],
        paths: &["microsoft office", "libreoffice", "openoffice"],
        executables: &["winword.exe", "excel.exe", "powerpnt.exe", "outlook.exe"],
        extensions: &[".exe"],
    },
    Category {
        name: "Media",
        keywords: &[
            "vlc", "media player", "spotify", "itunes", "adobe", "photoshop", "premiere",
            "audacity", "obs", "gimp", "inkscape", "blender",
        ],
        paths: &["videolan", "spotify", "adobe", "obs-studio"],
        executables: &["vlc.exe", "spotify.exe", "photoshop.exe", "obs64.exe"],
        extensions: &[".exe"],
    },
    Category {
        name: "Browsers",
        keywords: &["chrome", "firefox", "edge", "opera", "brave", "safari", "browser"],
        paths: &[
            "google\\chrome",
            "mozilla firefox",
            "microsoft\\edge",
            "opera",
            "brave",
        ],
        executables: &["chrome.exe", "firefox.exe", "msedge.exe", "opera.exe", "brave.exe"],
        extensions: &[".exe"],
    },
    Category {
        name: "Communication",
        keywords: &[
            "discord", "slack", "teams", "zoom", "skype", "telegram", "whatsapp", "signal",
            "messenger",
        ],
        paths: &["discord", "slack", "microsoft\\teams", "zoom"],
        executables: &["discord.exe", "slack.exe", "teams.exe", "zoom.exe"],
        extensions: &[".exe"],
    },
    Category {
        name: "Utilities",
        keywords: &[
            "7-zip", "winrar", "ccleaner", "malwarebytes", "antivirus", "utility", "tool",
            "cleaner",
        ],
        paths: &["7-zip", "winrar", "ccleaner"],
        executables: &["7zfm.exe", "winrar.exe", "ccleaner64.exe"],
        extensions: &[".exe", ".msi"],
    },
];

/// Base file name of a path that may use either separator. The document can
/// carry Windows paths even when the engine runs elsewhere.
fn base_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn score(category: &Category, exe_path: &str, app_name: &str) -> u32 {
    let mut score = 0;

    for keyword in category.keywords {
        if exe_path.contains(keyword) {
            score += 3;
        }
        if app_name.contains(keyword) {
            score += 2;
        }
    }

    for path_part in category.paths {
        if exe_path.contains(path_part) {
            score += 5;
        }
    }

    let exe_name = base_file_name(exe_path);
    for known_exe in category.executables {
        if *known_exe == exe_name {
            score += 10;
        }
    }

    for ext in category.extensions {
        if exe_path.ends_with(ext) {
            score += 1;
        }
    }

    score
}

/// Scores the application against every category and returns the strictly
/// best one, or `None` when no category reaches the minimum score.
pub fn classify(exe_path: &str, app_name: &str) -> Option<&'static Category> {
    let exe_path = exe_path.to_lowercase();
    let app_name = app_name.to_lowercase();

    let mut best: Option<(&'static Category, u32)> = None;
    for category in CATEGORIES {
        let candidate = score(category, &exe_path, &app_name);
        // Strictly greater keeps the first maximum, which is the tie-break.
        if candidate > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((category, candidate));
        }
    }

    best.filter(|(_, score)| *score >= MIN_SCORE).map(|(c, _)| c)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryAppUsage {
    pub name: String,
    pub time: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CategoryUsage {
    pub total_time: f64,
    pub launches: u64,
    pub apps: Vec<CategoryAppUsage>,
}

/// Buckets per-application statistics into categories. The executable path is
/// resolved through the configured application list; applications that are no
/// longer configured classify on their name alone.
pub fn category_usage(
    stats: &HashMap<String, AppStatistics>,
    apps: &[AppEntry],
) -> HashMap<String, CategoryUsage> {
    let mut result = HashMap::<String, CategoryUsage>::new();

    for (app_name, app_stats) in stats {
        let exe = apps
            .iter()
            .find(|a| &a.name == app_name)
            .map(|a| a.exe.as_str())
            .unwrap_or("");

        let category = classify(exe, app_name)
            .map(|c| c.name)
            .unwrap_or(FALLBACK_CATEGORY);

        let entry = result.entry(category.to_string()).or_default();
        entry.total_time += app_stats.period_time;
        entry.launches += app_stats.period_launches;
        entry.apps.push(CategoryAppUsage {
            name: app_name.clone(),
            time: app_stats.period_time,
        });
    }

    result
}
