#![allow(dead_code)]
//! EWMH/ICCCM hint management (spec C7), grounded on `EWMHManager.hpp`:
//! the atom table, strut-partial accumulation, and the vendor `PB_*`
//! properties used by status bars (SPEC_FULL.md §B).
use std::collections::HashMap;
use std::ffi::CString;

use x11::xlib::{self, Atom, Display, Window};

/// Every EWMH/ICCCM atom this window manager advertises or consumes, plus
/// the vendor `PB_*` extensions. Interned once at startup.
pub struct Atoms {
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub wm_state: Atom,
    pub wm_take_focus: Atom,

    pub net_supported: Atom,
    pub net_client_list: Atom,
    pub net_client_list_stacking: Atom,
    pub net_number_of_desktops: Atom,
    pub net_current_desktop: Atom,
    pub net_desktop_names: Atom,
    pub net_active_window: Atom,
    pub net_wm_name: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_fullscreen: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_dock: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_wm_window_type_desktop: Atom,
    pub net_wm_window_type_toolbar: Atom,
    pub net_wm_window_type_menu: Atom,
    pub net_wm_window_type_utility: Atom,
    pub net_wm_window_type_splash: Atom,
    pub net_wm_window_type_popup_menu: Atom,
    pub net_wm_window_type_tooltip: Atom,
    pub net_wm_window_type_notification: Atom,
    pub net_wm_desktop: Atom,
    pub net_wm_strut: Atom,
    pub net_wm_strut_partial: Atom,
    pub net_supporting_wm_check: Atom,
    pub net_close_window: Atom,
    pub net_wm_pid: Atom,
    pub utf8_string: Atom,

    pub pb_workspace_count: Atom,
    pub pb_occupied_workspaces: Atom,
    pub pb_workspace_window_counts: Atom,
    pub pb_active_window_title: Atom,
    pub pb_active_window_class: Atom,
    pub pb_layout_mode: Atom,
}

impl Atoms {
    pub fn intern(display: *mut Display) -> Self {
        let get = |name: &str| -> Atom {
            let c = CString::new(name).expect("atom name has no interior NUL");
            unsafe { xlib::XInternAtom(display, c.as_ptr(), xlib::False) }
        };

        Atoms {
            wm_protocols: get("WM_PROTOCOLS"),
            wm_delete_window: get("WM_DELETE_WINDOW"),
            wm_state: get("WM_STATE"),
            wm_take_focus: get("WM_TAKE_FOCUS"),

            net_supported: get("_NET_SUPPORTED"),
            net_client_list: get("_NET_CLIENT_LIST"),
            net_client_list_stacking: get("_NET_CLIENT_LIST_STACKING"),
            net_number_of_desktops: get("_NET_NUMBER_OF_DESKTOPS"),
            net_current_desktop: get("_NET_CURRENT_DESKTOP"),
            net_desktop_names: get("_NET_DESKTOP_NAMES"),
            net_active_window: get("_NET_ACTIVE_WINDOW"),
            net_wm_name: get("_NET_WM_NAME"),
            net_wm_state: get("_NET_WM_STATE"),
            net_wm_state_fullscreen: get("_NET_WM_STATE_FULLSCREEN"),
            net_wm_window_type: get("_NET_WM_WINDOW_TYPE"),
            net_wm_window_type_dock: get("_NET_WM_WINDOW_TYPE_DOCK"),
            net_wm_window_type_dialog: get("_NET_WM_WINDOW_TYPE_DIALOG"),
            net_wm_window_type_desktop: get("_NET_WM_WINDOW_TYPE_DESKTOP"),
            net_wm_window_type_toolbar: get("_NET_WM_WINDOW_TYPE_TOOLBAR"),
            net_wm_window_type_menu: get("_NET_WM_WINDOW_TYPE_MENU"),
            net_wm_window_type_utility: get("_NET_WM_WINDOW_TYPE_UTILITY"),
            net_wm_window_type_splash: get("_NET_WM_WINDOW_TYPE_SPLASH"),
            net_wm_window_type_popup_menu: get("_NET_WM_WINDOW_TYPE_POPUP_MENU"),
            net_wm_window_type_tooltip: get("_NET_WM_WINDOW_TYPE_TOOLTIP"),
            net_wm_window_type_notification: get("_NET_WM_WINDOW_TYPE_NOTIFICATION"),
            net_wm_desktop: get("_NET_WM_DESKTOP"),
            net_wm_strut: get("_NET_WM_STRUT"),
            net_wm_strut_partial: get("_NET_WM_STRUT_PARTIAL"),
            net_supporting_wm_check: get("_NET_SUPPORTING_WM_CHECK"),
            net_close_window: get("_NET_CLOSE_WINDOW"),
            net_wm_pid: get("_NET_WM_PID"),
            utf8_string: get("UTF8_STRING"),

            pb_workspace_count: get("PB_WORKSPACE_COUNT"),
            pb_occupied_workspaces: get("PB_OCCUPIED_WORKSPACES"),
            pb_workspace_window_counts: get("PB_WORKSPACE_WINDOW_COUNTS"),
            pb_active_window_title: get("PB_ACTIVE_WINDOW_TITLE"),
            pb_active_window_class: get("PB_ACTIVE_WINDOW_CLASS"),
            pb_layout_mode: get("PB_LAYOUT_MODE"),
        }
    }

    /// Maps one `_NET_WM_WINDOW_TYPE` atom to the classification spec.md
    /// §4.4 branches client placement on. Unrecognized atoms (and windows
    /// with no type property at all) are `WindowType::Normal`.
    pub fn window_type_of(&self, atom: Atom) -> WindowType {
        if atom == self.net_wm_window_type_dock {
            WindowType::Dock
        } else if atom == self.net_wm_window_type_desktop {
            WindowType::Desktop
        } else if atom == self.net_wm_window_type_dialog {
            WindowType::Dialog
        } else if atom == self.net_wm_window_type_utility {
            WindowType::Utility
        } else if atom == self.net_wm_window_type_toolbar {
            WindowType::Toolbar
        } else if atom == self.net_wm_window_type_splash {
            WindowType::Splash
        } else if atom == self.net_wm_window_type_menu {
            WindowType::Menu
        } else if atom == self.net_wm_window_type_popup_menu {
            WindowType::Popup
        } else if atom == self.net_wm_window_type_tooltip {
            WindowType::Tooltip
        } else if atom == self.net_wm_window_type_notification {
            WindowType::Notification
        } else {
            WindowType::Normal
        }
    }

    /// The complete `_NET_SUPPORTED` list advertised on the root window.
    pub fn supported(&self) -> Vec<Atom> {
        vec![
            self.net_supported,
            self.net_client_list,
            self.net_client_list_stacking,
            self.net_number_of_desktops,
            self.net_current_desktop,
            self.net_desktop_names,
            self.net_active_window,
            self.net_wm_name,
            self.net_wm_state,
            self.net_wm_state_fullscreen,
            self.net_wm_window_type,
            self.net_wm_window_type_dock,
            self.net_wm_window_type_dialog,
            self.net_wm_window_type_desktop,
            self.net_wm_window_type_toolbar,
            self.net_wm_window_type_menu,
            self.net_wm_window_type_utility,
            self.net_wm_window_type_splash,
            self.net_wm_window_type_popup_menu,
            self.net_wm_window_type_tooltip,
            self.net_wm_window_type_notification,
            self.net_wm_desktop,
            self.net_wm_strut,
            self.net_wm_strut_partial,
            self.net_supporting_wm_check,
            self.net_close_window,
            self.net_wm_pid,
        ]
    }
}

/// The 12-field per-edge strut reservation from `_NET_WM_STRUT_PARTIAL`
/// (`EWMHManager::StrutPartial`): each edge carries a width/height plus the
/// start/end range along the perpendicular axis it reserves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrutPartial {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub left_start_y: u32,
    pub left_end_y: u32,
    pub right_start_y: u32,
    pub right_end_y: u32,
    pub top_start_x: u32,
    pub top_end_x: u32,
    pub bottom_start_x: u32,
    pub bottom_end_x: u32,
}

impl StrutPartial {
    pub fn from_property(data: &[i64]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        Some(StrutPartial {
            left: data[0] as u32,
            right: data[1] as u32,
            top: data[2] as u32,
            bottom: data[3] as u32,
            left_start_y: data[4] as u32,
            left_end_y: data[5] as u32,
            right_start_y: data[6] as u32,
            right_end_y: data[7] as u32,
            top_start_x: data[8] as u32,
            top_end_x: data[9] as u32,
            bottom_start_x: data[10] as u32,
            bottom_end_x: data[11] as u32,
        })
    }
}

/// Accumulates struts across every registered dock window, producing the
/// combined screen-edge reservation the layout engine must subtract from
/// its usable area (`EWMHManager::getCombinedStruts`).
#[derive(Debug, Default)]
pub struct HintsManager {
    struts: HashMap<Window, StrutPartial>,
}

impl HintsManager {
    pub fn new() -> Self {
        HintsManager::default()
    }

    pub fn set_strut(&mut self, window: Window, strut: StrutPartial) {
        self.struts.insert(window, strut);
    }

    pub fn clear_strut(&mut self, window: Window) {
        self.struts.remove(&window);
    }

    /// Combined strut: the sum of every registered dock's reservation on
    /// each edge (spec.md §4.7), so two docks on the same edge both carve
    /// out usable area rather than the larger one winning alone.
    pub fn combined_struts(&self) -> StrutPartial {
        let mut combined = StrutPartial::default();
        for s in self.struts.values() {
            combined.left += s.left;
            combined.right += s.right;
            combined.top += s.top;
            combined.bottom += s.bottom;
        }
        combined
    }
}

/// Client classification from `_NET_WM_WINDOW_TYPE` (spec.md §4.4): drives
/// whether a newly mapped window is tiled, floated, or left unmanaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Normal,
    Dock,
    Desktop,
    Dialog,
    Utility,
    Toolbar,
    Splash,
    Menu,
    Popup,
    Tooltip,
    Notification,
}

impl WindowType {
    /// Docks reserve screen space but are never part of the tiled client
    /// list; desktop windows are background/root-level and also unmanaged.
    pub fn is_unmanaged(&self) -> bool {
        matches!(self, WindowType::Dock | WindowType::Desktop)
    }

    /// Everything besides a plain top-level window or a dock/desktop floats
    /// above the tiling layer instead of taking a tree slot.
    pub fn floats_by_default(&self) -> bool {
        matches!(
            self,
            WindowType::Dialog
                | WindowType::Utility
                | WindowType::Toolbar
                | WindowType::Splash
                | WindowType::Menu
                | WindowType::Popup
                | WindowType::Tooltip
                | WindowType::Notification
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Fullscreen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strut_partial_parses_twelve_fields() {
        let data: Vec<i64> = (0..12).collect();
        let strut = StrutPartial::from_property(&data).unwrap();
        assert_eq!(strut.left, 0);
        assert_eq!(strut.bottom_end_x, 11);
    }

    #[test]
    fn strut_partial_rejects_short_property() {
        assert!(StrutPartial::from_property(&[1, 2, 3]).is_none());
    }

    #[test]
    fn combined_struts_sums_every_dock() {
        let mut hints = HintsManager::new();
        hints.set_strut(1, StrutPartial { top: 20, ..Default::default() });
        hints.set_strut(2, StrutPartial { top: 30, bottom: 10, ..Default::default() });
        let combined = hints.combined_struts();
        assert_eq!(combined.top, 50);
        assert_eq!(combined.bottom, 10);
    }

    /// `Atoms` has no live X display in a unit test, so every field starts
    /// at the null atom and the test overrides only the ones it exercises.
    fn blank_atoms() -> Atoms {
        Atoms {
            wm_protocols: 0,
            wm_delete_window: 0,
            wm_state: 0,
            wm_take_focus: 0,
            net_supported: 0,
            net_client_list: 0,
            net_client_list_stacking: 0,
            net_number_of_desktops: 0,
            net_current_desktop: 0,
            net_desktop_names: 0,
            net_active_window: 0,
            net_wm_name: 0,
            net_wm_state: 0,
            net_wm_state_fullscreen: 0,
            net_wm_window_type: 0,
            net_wm_window_type_dock: 0,
            net_wm_window_type_dialog: 0,
            net_wm_window_type_desktop: 0,
            net_wm_window_type_toolbar: 0,
            net_wm_window_type_menu: 0,
            net_wm_window_type_utility: 0,
            net_wm_window_type_splash: 0,
            net_wm_window_type_popup_menu: 0,
            net_wm_window_type_tooltip: 0,
            net_wm_window_type_notification: 0,
            net_wm_desktop: 0,
            net_wm_strut: 0,
            net_wm_strut_partial: 0,
            net_supporting_wm_check: 0,
            net_close_window: 0,
            net_wm_pid: 0,
            utf8_string: 0,
            pb_workspace_count: 0,
            pb_occupied_workspaces: 0,
            pb_workspace_window_counts: 0,
            pb_active_window_title: 0,
            pb_active_window_class: 0,
            pb_layout_mode: 0,
        }
    }

    #[test]
    fn window_type_of_maps_dock_and_dialog_atoms() {
        let mut atoms = blank_atoms();
        atoms.net_wm_window_type_dock = 900;
        atoms.net_wm_window_type_dialog = 901;
        assert_eq!(atoms.window_type_of(900), WindowType::Dock);
        assert_eq!(atoms.window_type_of(901), WindowType::Dialog);
        assert_eq!(atoms.window_type_of(42), WindowType::Normal);
    }

    #[test]
    fn window_type_classification_rules() {
        assert!(WindowType::Dock.is_unmanaged());
        assert!(WindowType::Desktop.is_unmanaged());
        assert!(!WindowType::Dialog.is_unmanaged());
        assert!(WindowType::Dialog.floats_by_default());
        assert!(WindowType::Notification.floats_by_default());
        assert!(!WindowType::Normal.floats_by_default());
    }
}
