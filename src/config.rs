#![allow(unused_imports)]
//! Runtime configuration (SPEC_FULL.md §A.3). Generalizes the teacher's
//! `Config` (arrangement/border/binding/command/colour sections, each
//! `Option`-wrapped so an absent section falls back to documented
//! defaults) into the flat record spec.md §6 describes: focus-follows-mouse,
//! borders, gaps, drag thresholds, workspace/window defaults, autostart,
//! keybindings and layout-cycle direction.
use std::fs::File;
use std::io::Read as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::strategies::{GapConfig, LayoutKind};

/// [focus] section: focus-follows-mouse behavior and the scoped warping
/// latch (SPEC_FULL.md §C.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    pub follows_mouse: bool,
    pub warp_pointer_on_focus: bool,
    pub click_to_focus: bool,
}

impl Default for FocusSettings {
    fn default() -> Self {
        FocusSettings {
            follows_mouse: true,
            warp_pointer_on_focus: false,
            click_to_focus: true,
        }
    }
}

/// [borders] section of the configuration file — carries the teacher's
/// border fields plus urgency/fullscreen color variants spec.md §6 adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderSettings {
    pub width: u32,
    pub focused_colour: String,
    pub unfocused_colour: String,
    pub urgent_colour: String,
}

impl Default for BorderSettings {
    fn default() -> Self {
        BorderSettings {
            width: 2,
            focused_colour: "#5294e2".to_string(),
            unfocused_colour: "#3b3b3b".to_string(),
            urgent_colour: "#e25c5c".to_string(),
        }
    }
}

/// [gaps] section — outer (screen edge) and inner (between windows) gaps,
/// plus a smart-gaps toggle (no gaps with a single tiled window).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapSettings {
    pub inner: u32,
    pub outer: u32,
    pub smart_gaps: bool,
}

impl Default for GapSettings {
    fn default() -> Self {
        GapSettings { inner: 0, outer: 0, smart_gaps: false }
    }
}

impl From<&GapSettings> for GapConfig {
    fn from(s: &GapSettings) -> Self {
        GapConfig { outer: s.outer, inner: s.inner }
    }
}

/// [drag] section — pixel/time thresholds before a button-press becomes a
/// drag or resize interaction, matching `WindowManager`'s drag-threshold
/// tracking fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DragSettings {
    pub threshold_px: u32,
    pub edge_resize_margin_px: u32,
}

impl Default for DragSettings {
    fn default() -> Self {
        DragSettings { threshold_px: 4, edge_resize_margin_px: 12 }
    }
}

/// [workspace] section — workspace count, default layout, master ratio,
/// and whether workspaces grow unbounded (infinite-canvas mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    pub count: u32,
    pub names: Vec<String>,
    pub default_layout: String,
    pub master_ratio: f64,
    pub infinite: bool,
    /// Insertion-leaf rule for the BSP tree (spec C2 `add`): when true, a
    /// new window splits the most recently focused leaf; when false, it
    /// always splits the first leaf in depth-first order.
    pub dwindle_insert: bool,
    /// Height in pixels of the tab bar `TabbedStacked` reserves along the
    /// top of the workspace (spec.md §4.3).
    pub tab_bar_height: u32,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        WorkspaceSettings {
            count: 9,
            names: Vec::new(),
            default_layout: "bsp".to_string(),
            master_ratio: 0.6,
            infinite: false,
            dwindle_insert: true,
            tab_bar_height: 24,
        }
    }
}

impl WorkspaceSettings {
    pub fn default_layout_kind(&self) -> LayoutKind {
        LayoutKind::parse(&self.default_layout).unwrap_or(LayoutKind::Bsp)
    }
}

/// [window] section — default placement rules for newly mapped windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub new_windows_become_master: bool,
    pub floating_by_default_classes: Vec<String>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        WindowSettings {
            new_windows_become_master: false,
            floating_by_default_classes: Vec::new(),
        }
    }
}

/// One `[[autostart]]` entry — a command run once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutostartEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// The flat configuration record the running window manager consumes.
/// Every section is present with defaults filled in by `#[serde(default)]`
/// so a config file that only overrides one section still parses, matching
/// the teacher's `Option<T>`-per-section pattern generalized to
/// struct-level defaults instead of `Option` wrapping every group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub focus: FocusSettings,
    pub borders: BorderSettings,
    pub gaps: GapSettings,
    pub drag: DragSettings,
    pub workspace: WorkspaceSettings,
    pub window: WindowSettings,
    #[serde(alias = "binding")]
    pub bindings: Vec<String>,
    #[serde(alias = "autostart")]
    pub autostart: Vec<AutostartEntry>,
    pub extensions_dir: Option<String>,
    pub strict_extension_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            focus: FocusSettings::default(),
            borders: BorderSettings::default(),
            gaps: GapSettings::default(),
            drag: DragSettings::default(),
            workspace: WorkspaceSettings::default(),
            window: WindowSettings::default(),
            bindings: Vec::new(),
            autostart: Vec::new(),
            extensions_dir: None,
            strict_extension_mode: false,
        }
    }
}

impl Config {
    /// Resolves the config file path: `$XDG_CONFIG_HOME/pblank/config.toml`,
    /// falling back to `$HOME/.config/pblank/config.toml`.
    pub fn resolve_path() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("pblank").join("config.toml");
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        PathBuf::from(home).join(".config").join("pblank").join("config.toml")
    }

    /// Loads configuration from disk, falling back to documented defaults
    /// (and logging a warning) when the file is absent or fails to parse —
    /// the "last-good configuration" behavior spec.md §7 calls for, since a
    /// freshly started process has no prior good config to fall back to and
    /// uses the compiled-in defaults instead.
    pub fn load() -> Self {
        let path = Self::resolve_path();
        match Self::load_from(&path) {
            Ok(config) => {
                log::debug!("loaded configuration from {}", path.display());
                config
            }
            Err(ConfigError::Io { .. }) => {
                log::warn!("no configuration file at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => {
                log::warn!("configuration at {} is invalid ({}), using defaults", path.display(), e);
                Config::default()
            }
        }
    }

    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let mut file = File::open(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_nine_workspaces_and_bsp_layout() {
        let config = Config::default();
        assert_eq!(config.workspace.count, 9);
        assert_eq!(config.workspace.default_layout_kind(), LayoutKind::Bsp);
    }

    #[test]
    fn partial_toml_fills_missing_sections_with_defaults() {
        let toml_str = r#"
            [gaps]
            inner = 8
            outer = 16
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gaps.inner, 8);
        assert_eq!(config.gaps.outer, 16);
        assert!(config.focus.follows_mouse);
        assert_eq!(config.borders.width, 2);
    }

    #[test]
    fn layout_name_parsing_is_case_insensitive() {
        let mut ws = WorkspaceSettings::default();
        ws.default_layout = "Golden-Ratio".to_string();
        assert_eq!(ws.default_layout_kind(), LayoutKind::GoldenRatio);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let result = Config::load_from(&PathBuf::from("/nonexistent/pblank/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
