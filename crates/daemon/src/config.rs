//! Configuration management for the gridtile daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `%APPDATA%/gridtile/config/config.toml` (Windows standard)
//! 2. `~/.config/gridtile/config.toml` (Unix-style, for WSL compatibility)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use gridtile_core_layout::{LayoutSettings, TilingSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Window classes that are never tiled, whatever the user rules say.
///
/// Compared case-insensitively.
pub const BUILTIN_IGNORED_CLASSES: &[&str] = &[
    "Shell_TrayWnd",
    "Shell_SecondaryTrayWnd",
    "Progman",
    "WorkerW",
    "#32770",
    "Chrome_RenderWidgetHostHWND",
    "Windows.UI.Core.CoreWindow",
    "MultitaskingViewFrame",
    "TaskSwitcherWnd",
];

/// Allowed range for the master column share.
const MASTER_RATIO_RANGE: std::ops::RangeInclusive<f64> = 0.2..=0.8;

/// Main configuration structure for gridtile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slot geometry.
    pub layout: LayoutConfig,
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// Window rules deciding which windows tile, float or are ignored.
    #[serde(default)]
    pub window_rules: Vec<WindowRule>,
}

/// Layout-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Gap between slots in pixels.
    #[serde(default = "default_gap")]
    pub gap: i32,

    /// Padding between the work-area edge and the slots in pixels.
    #[serde(default = "default_outer_padding")]
    pub outer_padding: i32,

    /// Share of the usable width given to the master slot.
    #[serde(default = "default_master_ratio")]
    pub master_ratio: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            gap: default_gap(),
            outer_padding: default_outer_padding(),
            master_ratio: default_master_ratio(),
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Shift slots on removal instead of recomputing the layout.
    #[serde(default = "default_true")]
    pub auto_compact: bool,

    /// Minimized windows release their slot.
    #[serde(default)]
    pub compact_on_minimize: bool,

    /// Pointer travel in pixels before a title-bar press becomes a drag.
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold: i32,

    /// Window registry and pointer polling interval.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            auto_compact: true,
            compact_on_minimize: false,
            drag_threshold: default_drag_threshold(),
            poll_interval_ms: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_gap() -> i32 {
    8
}

fn default_outer_padding() -> i32 {
    8
}

fn default_master_ratio() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_drag_threshold() -> i32 {
    10
}

fn default_poll_interval() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Window Rules
// ============================================================================

/// A rule deciding how a window is managed.
///
/// Window rules are evaluated in order; the first matching rule wins.
///
/// # Example Config
///
/// ```toml
/// [[window_rules]]
/// match_class = "Chrome_WidgetWin_1"
/// match_title = ".*DevTools.*"
/// action = "float"
///
/// [[window_rules]]
/// match_executable = "spotify.exe"
/// action = "float"
///
/// [[window_rules]]
/// match_title = "^Picture-in-picture$"
/// action = "ignore"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRule {
    /// Regex pattern to match window class name.
    #[serde(default)]
    pub match_class: Option<String>,

    /// Regex pattern to match window title.
    #[serde(default)]
    pub match_title: Option<String>,

    /// Executable name to match (e.g., "notepad.exe").
    #[serde(default)]
    pub match_executable: Option<String>,

    /// Action to take when the rule matches.
    #[serde(default)]
    pub action: WindowAction,
}

/// Action to take for a matching window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAction {
    /// Tile the window normally (default behavior).
    #[default]
    Tile,
    /// Manage the window but keep it out of the grid.
    Float,
    /// Ignore the window (don't manage it at all).
    Ignore,
}

impl WindowRule {
    /// Check if this rule matches a window with the given properties.
    ///
    /// All specified match criteria must match for the rule to apply.
    /// If no match criteria are specified, the rule matches nothing.
    pub fn matches(&self, class_name: &str, title: &str, executable: &str) -> bool {
        let has_any_criteria = self.match_class.is_some()
            || self.match_title.is_some()
            || self.match_executable.is_some();

        if !has_any_criteria {
            return false;
        }

        if let Some(ref pattern) = self.match_class {
            if !regex_matches(pattern, class_name, "match_class") {
                return false;
            }
        }

        if let Some(ref pattern) = self.match_title {
            if !regex_matches(pattern, title, "match_title") {
                return false;
            }
        }

        // Executable names compare case-insensitively
        if let Some(ref exe) = self.match_executable {
            if !executable.eq_ignore_ascii_case(exe) {
                return false;
            }
        }

        true
    }

    fn invalid_patterns(&self) -> Vec<&str> {
        [&self.match_class, &self.match_title]
            .into_iter()
            .flatten()
            .filter(|pattern| regex::Regex::new(pattern).is_err())
            .map(String::as_str)
            .collect()
    }
}

fn regex_matches(pattern: &str, haystack: &str, field: &str) -> bool {
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(haystack),
        Err(_) => {
            tracing::warn!("Invalid regex in window rule {}: {}", field, pattern);
            false
        }
    }
}

/// Whether `class_name` is on the built-in ignore list.
pub fn is_builtin_ignored(class_name: &str) -> bool {
    BUILTIN_IGNORED_CLASSES
        .iter()
        .any(|ignored| ignored.eq_ignore_ascii_case(class_name))
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Tries the following locations in order:
    /// 1. `%APPDATA%/gridtile/config/config.toml`
    /// 2. `~/.config/gridtile/config.toml`
    /// 3. `./config.toml`
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values in place.
    ///
    /// Returns one warning per corrected or suspicious setting.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.layout.gap < 0 {
            warnings.push(format!("layout.gap {} is negative, using 0", self.layout.gap));
            self.layout.gap = 0;
        }
        if self.layout.outer_padding < 0 {
            warnings.push(format!(
                "layout.outer_padding {} is negative, using 0",
                self.layout.outer_padding
            ));
            self.layout.outer_padding = 0;
        }
        if !MASTER_RATIO_RANGE.contains(&self.layout.master_ratio) {
            let clamped = if self.layout.master_ratio.is_nan() {
                default_master_ratio()
            } else {
                self.layout
                    .master_ratio
                    .clamp(*MASTER_RATIO_RANGE.start(), *MASTER_RATIO_RANGE.end())
            };
            warnings.push(format!(
                "layout.master_ratio {} is outside {:?}, using {}",
                self.layout.master_ratio, MASTER_RATIO_RANGE, clamped
            ));
            self.layout.master_ratio = clamped;
        }
        if self.behavior.drag_threshold < 1 {
            warnings.push(format!(
                "behavior.drag_threshold {} is too small, using 1",
                self.behavior.drag_threshold
            ));
            self.behavior.drag_threshold = 1;
        }
        if self.behavior.poll_interval_ms == 0 {
            warnings.push(format!(
                "behavior.poll_interval_ms is zero, using {}",
                default_poll_interval()
            ));
            self.behavior.poll_interval_ms = default_poll_interval();
        }

        for (index, rule) in self.window_rules.iter().enumerate() {
            for pattern in rule.invalid_patterns() {
                warnings.push(format!(
                    "window_rules[{}] has an invalid regex: {}",
                    index, pattern
                ));
            }
            if rule.match_class.is_none()
                && rule.match_title.is_none()
                && rule.match_executable.is_none()
            {
                warnings.push(format!(
                    "window_rules[{}] has no match criteria and never applies",
                    index
                ));
            }
        }

        warnings
    }

    /// Decide how a window is managed: built-in ignores first, then the
    /// first matching rule, tiling otherwise.
    pub fn classify(&self, class_name: &str, title: &str, executable: &str) -> WindowAction {
        if is_builtin_ignored(class_name) {
            return WindowAction::Ignore;
        }
        self.window_rules
            .iter()
            .find(|rule| rule.matches(class_name, title, executable))
            .map(|rule| rule.action)
            .unwrap_or_default()
    }

    /// Settings handed to the tiling coordinator.
    pub fn tiling_settings(&self) -> TilingSettings {
        TilingSettings {
            layout: LayoutSettings {
                gap: self.layout.gap,
                outer_padding: self.layout.outer_padding,
                master_ratio: self.layout.master_ratio,
            },
            auto_compact: self.behavior.auto_compact,
            compact_on_minimize: self.behavior.compact_on_minimize,
            drag_threshold: self.behavior.drag_threshold,
        }
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Windows standard: %APPDATA%/gridtile/config/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("", "", "gridtile") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. Unix-style: ~/.config/gridtile/config.toml
    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("gridtile").join("config.toml"));
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
