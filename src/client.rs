#![allow(dead_code)]
//! Managed window state and the client registry (spec C4).
//!
//! `ManagedWindow` generalizes the teacher's `Client` (name/frame/context/
//! flags) with the fields spec.md §4.1 names: workspace membership, virtual
//! placement for infinite-canvas mode, and a monotonic creation sequence
//! used to break spatial-neighbor ties.
use std::collections::HashMap;

use bitflags::bitflags;
use x11::xlib::Window as XWindow;

use crate::error::LayoutError;
use crate::geometry::{Direction, Rect, VirtualRect};
use crate::layout::strategies::{GapConfig, LayoutKind};
use crate::layout::tree::BSPTree;

bitflags! {
    /// Generalizes the teacher's `WindowFlags` (NONE/TILING/FLOATING/URGENT/
    /// FULLSCREEN/NEVER_FOCUS/FIXED) with the states spec.md §4.1 adds.
    pub struct WindowFlags: u32 {
        const NONE          = 0;
        const TILING        = 1 << 0;
        const FLOATING      = 1 << 1;
        const URGENT        = 1 << 2;
        const FULLSCREEN    = 1 << 3;
        const NEVER_FOCUS   = 1 << 4;
        const FIXED         = 1 << 5;
        const HIDDEN        = 1 << 6;
        const STICKY        = 1 << 7;
    }
}

/// A managed client window. `frame` is the reparenting frame id; `window`
/// is the client's own id. `virtual_pos` only matters to the infinite-canvas
/// strategy; every other strategy derives placement from the BSP tree plus
/// the active `LayoutKind`.
#[derive(Debug, Clone)]
pub struct ManagedWindow {
    pub window: XWindow,
    pub frame: XWindow,
    pub name: String,
    pub class: String,
    pub flags: WindowFlags,
    pub workspace: u32,
    pub floating_geometry: Rect,
    pub virtual_pos: (i64, i64),
    pub created_at: u64,
}

impl ManagedWindow {
    pub fn new(window: XWindow, frame: XWindow, workspace: u32, created_at: u64) -> Self {
        ManagedWindow {
            window,
            frame,
            name: String::new(),
            class: String::new(),
            flags: WindowFlags::TILING,
            workspace,
            floating_geometry: Rect::new(0, 0, 640, 480),
            virtual_pos: (0, 0),
            created_at,
        }
    }

    pub fn is_tiling(&self) -> bool {
        self.flags.contains(WindowFlags::TILING) && !self.flags.contains(WindowFlags::FLOATING)
    }

    pub fn is_floating(&self) -> bool {
        self.flags.contains(WindowFlags::FLOATING)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.flags.contains(WindowFlags::FULLSCREEN)
    }
}

/// Pointer-interaction sub-state-machine shared by drag, edge-resize, and
/// bidirectional-resize (spec C4); fields mirror `WindowManager.hpp`'s
/// private drag/resize tracking members.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerState {
    Idle,
    Dragging {
        window: XWindow,
        start_pointer: (i32, i32),
        start_geometry: Rect,
        /// Whether `window` was tiled when the drag began. A tiled drag
        /// never commits a layout mutation mid-drag (spec C4 §4.4 step 2);
        /// it only tracks `hover_candidate` for a swap-on-release hint.
        tiled: bool,
        hover_candidate: Option<XWindow>,
    },
    Resizing {
        window: XWindow,
        start_pointer: (i32, i32),
        start_geometry: Rect,
        horizontal: bool,
        vertical: bool,
    },
}

/// What a drag resolves into when the pointer button is released (spec C4
/// §4.4 step 3): a tiled drag with a tracked hover candidate becomes a tree
/// swap; a floating drag commits its last-tracked geometry; anything else
/// (no candidate was ever hovered, or the pointer was never dragging) is a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    None,
    Floating { window: XWindow, geometry: Rect },
    TiledSwap { dragged: XWindow, candidate: XWindow },
}

impl Default for PointerState {
    fn default() -> Self {
        PointerState::Idle
    }
}

/// Focus-follows-mouse "warping latch": after a programmatic warp to
/// `target`, Enter events are suppressed from re-triggering focus-follow
/// until the pointer actually Enters `target` itself (SPEC_FULL.md §C.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct WarpLatch {
    pending: Option<XWindow>,
}

impl WarpLatch {
    pub fn arm(&mut self, target: XWindow) {
        self.pending = Some(target);
    }

    /// Called on every EnterNotify. Returns whether focus-follow should run
    /// for `entered`; clears the latch only when `entered` is the armed
    /// window, leaving it armed for Enter events on any other window.
    pub fn consume_enter(&mut self, entered: XWindow) -> bool {
        match self.pending {
            Some(target) if target == entered => {
                self.pending = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }
}

/// Registry of managed windows and the per-workspace BSP trees that lay
/// tiled clients out. One registry instance lives in the event loop owner
/// (C5); nothing outside the core event loop thread mutates it directly.
#[derive(Debug)]
pub struct ClientRegistry {
    windows: HashMap<XWindow, ManagedWindow>,
    trees: HashMap<u32, BSPTree>,
    next_created_at: u64,
    pub pointer_state: PointerState,
    pub warp_latch: WarpLatch,
    insert_mode: crate::layout::InsertMode,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        ClientRegistry {
            windows: HashMap::new(),
            trees: HashMap::new(),
            next_created_at: 0,
            pointer_state: PointerState::Idle,
            warp_latch: WarpLatch::default(),
            insert_mode: crate::layout::InsertMode::DwindleFocused,
        }
    }

    /// Sets the BSP insertion-leaf rule applied to every workspace tree
    /// (existing and future), matching the `[workspace] dwindle_insert`
    /// config flag.
    pub fn set_insert_mode(&mut self, mode: crate::layout::InsertMode) {
        self.insert_mode = mode;
        for tree in self.trees.values_mut() {
            tree.set_insert_mode(mode);
        }
    }

    fn tree_mut(&mut self, workspace: u32) -> &mut BSPTree {
        let mode = self.insert_mode;
        self.trees.entry(workspace).or_insert_with(|| {
            let mut tree = BSPTree::new();
            tree.set_insert_mode(mode);
            tree
        })
    }

    pub fn tree(&self, workspace: u32) -> Option<&BSPTree> {
        self.trees.get(&workspace)
    }

    /// Registers a newly mapped window on `workspace`. Tiling windows are
    /// inserted into that workspace's BSP tree; floating windows are not.
    pub fn map_window(&mut self, window: XWindow, frame: XWindow, workspace: u32, floating: bool) -> &ManagedWindow {
        let created_at = self.next_created_at;
        self.next_created_at += 1;
        let mut managed = ManagedWindow::new(window, frame, workspace, created_at);
        if floating {
            managed.flags = WindowFlags::FLOATING;
        } else {
            self.tree_mut(workspace).insert(window, None);
        }
        self.windows.insert(window, managed);
        self.windows.get(&window).unwrap()
    }

    pub fn get(&self, window: XWindow) -> Option<&ManagedWindow> {
        self.windows.get(&window)
    }

    pub fn get_mut(&mut self, window: XWindow) -> Option<&mut ManagedWindow> {
        self.windows.get_mut(&window)
    }

    pub fn unmap_window(&mut self, window: XWindow) -> Option<ManagedWindow> {
        if let Some(managed) = self.windows.get(&window) {
            let workspace = managed.workspace;
            if managed.is_tiling() {
                let _ = self.tree_mut(workspace).remove(window);
            }
        }
        self.windows.remove(&window)
    }

    pub fn toggle_floating(&mut self, window: XWindow) -> Result<(), LayoutError> {
        let workspace = self.windows.get(&window).ok_or(LayoutError::NoFocusedNode)?.workspace;
        let currently_floating = self.windows[&window].is_floating();
        if currently_floating {
            self.tree_mut(workspace).insert(window, None);
        } else {
            self.tree_mut(workspace).remove(window)?;
        }
        if let Some(managed) = self.windows.get_mut(&window) {
            managed.flags.toggle(WindowFlags::FLOATING);
        }
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self, window: XWindow) -> Result<(), LayoutError> {
        let managed = self.windows.get_mut(&window).ok_or(LayoutError::NoFocusedNode)?;
        managed.flags.toggle(WindowFlags::FULLSCREEN);
        Ok(())
    }

    /// Moves `window` to `target_workspace`. `follow` also switches focus to
    /// that workspace (the caller performs the actual workspace-switch
    /// side effects); this method only updates registry bookkeeping.
    pub fn send_to_workspace(&mut self, window: XWindow, target_workspace: u32) -> Result<(), LayoutError> {
        let managed = self.windows.get(&window).ok_or(LayoutError::NoFocusedNode)?;
        let source_workspace = managed.workspace;
        let was_tiling = managed.is_tiling();
        if was_tiling {
            self.tree_mut(source_workspace).remove(window)?;
            self.tree_mut(target_workspace).insert(window, None);
        }
        if let Some(managed) = self.windows.get_mut(&window) {
            managed.workspace = target_workspace;
        }
        Ok(())
    }

    pub fn windows_on(&self, workspace: u32) -> Vec<XWindow> {
        let mut result: Vec<&ManagedWindow> = self
            .windows
            .values()
            .filter(|w| w.workspace == workspace && !w.is_floating())
            .collect();
        result.sort_by_key(|w| w.created_at);
        result.into_iter().map(|w| w.window).collect()
    }

    pub fn floating_windows_on(&self, workspace: u32) -> Vec<XWindow> {
        self.windows
            .values()
            .filter(|w| w.workspace == workspace && w.is_floating())
            .map(|w| w.window)
            .collect()
    }

    /// Computes placements for every tiled window on `workspace` under
    /// `layout`. Floating/fullscreen windows are placed by the caller from
    /// their stored geometry instead.
    pub fn arrange(
        &self,
        workspace: u32,
        layout: LayoutKind,
        bounds: Rect,
        gaps: GapConfig,
        master_ratio: f64,
        tab_bar_height: u32,
    ) -> Result<Vec<(XWindow, Rect)>, LayoutError> {
        let windows = self.windows_on(workspace);
        let empty_tree = BSPTree::new();
        let tree = self.trees.get(&workspace).unwrap_or(&empty_tree);
        layout.apply(&windows, tree, bounds, gaps, master_ratio, tab_bar_height)
    }

    pub fn begin_drag(&mut self, window: XWindow, pointer: (i32, i32), geometry: Rect) {
        let tiled = self.windows.get(&window).map(|m| m.is_tiling()).unwrap_or(false);
        self.pointer_state = PointerState::Dragging {
            window,
            start_pointer: pointer,
            start_geometry: geometry,
            tiled,
            hover_candidate: None,
        };
    }

    /// Records `candidate` (the tiled window currently under the pointer,
    /// excluding the dragged window itself) as the swap hint for an
    /// in-progress tiled drag. No-op for a floating drag or when idle.
    pub fn set_drag_hover(&mut self, candidate: Option<XWindow>) {
        if let PointerState::Dragging { tiled: true, hover_candidate, .. } = &mut self.pointer_state {
            *hover_candidate = candidate;
        }
    }

    /// Resolves the in-progress drag on button release and returns to
    /// `Idle`. For a tiled drag with a tracked hover candidate, performs the
    /// tree swap immediately so the caller only needs to re-arrange and
    /// restore focus.
    pub fn finish_drag(&mut self) -> DragOutcome {
        let outcome = match self.pointer_state {
            PointerState::Dragging { window, tiled: false, .. } => self
                .windows
                .get(&window)
                .map(|m| DragOutcome::Floating { window, geometry: m.floating_geometry })
                .unwrap_or(DragOutcome::None),
            PointerState::Dragging { window, tiled: true, hover_candidate: Some(candidate), .. } => {
                let workspace = self.windows.get(&window).map(|m| m.workspace);
                if let Some(workspace) = workspace {
                    if self.tree_mut(workspace).swap_windows(window, candidate).is_ok() {
                        DragOutcome::TiledSwap { dragged: window, candidate }
                    } else {
                        DragOutcome::None
                    }
                } else {
                    DragOutcome::None
                }
            }
            _ => DragOutcome::None,
        };
        self.pointer_state = PointerState::Idle;
        outcome
    }

    pub fn begin_resize(&mut self, window: XWindow, pointer: (i32, i32), geometry: Rect, horizontal: bool, vertical: bool) {
        self.pointer_state = PointerState::Resizing {
            window,
            start_pointer: pointer,
            start_geometry: geometry,
            horizontal,
            vertical,
        };
    }

    pub fn end_pointer_interaction(&mut self) {
        self.pointer_state = PointerState::Idle;
    }

    /// Computes the new floating geometry for the in-progress drag/resize
    /// given the pointer's current position. Returns `None` if idle.
    pub fn pointer_motion(&self, current: (i32, i32)) -> Option<(XWindow, Rect)> {
        match self.pointer_state {
            PointerState::Dragging { window, start_pointer, start_geometry, .. } => {
                let dx = current.0 - start_pointer.0;
                let dy = current.1 - start_pointer.1;
                Some((window, Rect::new(start_geometry.x + dx, start_geometry.y + dy, start_geometry.w, start_geometry.h)))
            }
            PointerState::Resizing { window, start_pointer, start_geometry, horizontal, vertical } => {
                let dx = current.0 - start_pointer.0;
                let dy = current.1 - start_pointer.1;
                let w = if horizontal { (start_geometry.w as i32 + dx).max(1) as u32 } else { start_geometry.w };
                let h = if vertical { (start_geometry.h as i32 + dy).max(1) as u32 } else { start_geometry.h };
                Some((window, Rect::new(start_geometry.x, start_geometry.y, w, h)))
            }
            PointerState::Idle => None,
        }
    }

    /// Marks `window` as the focused leaf of `workspace`'s tree, if it has
    /// one (floating windows have no tree node and are a no-op here).
    pub fn set_focused_window(&mut self, workspace: u32, window: XWindow) {
        if let Some(tree) = self.trees.get_mut(&workspace) {
            if let Some(id) = tree.find_window(window) {
                tree.set_focused(id);
            }
        }
    }

    pub fn move_focus(&mut self, workspace: u32, direction: Direction, bounds: Rect) -> Option<XWindow> {
        self.trees.get_mut(&workspace)?.move_focus(direction, bounds)
    }

    pub fn toggle_split(&mut self, workspace: u32) -> Result<(), LayoutError> {
        self.tree_mut(workspace).toggle_split()
    }

    pub fn swap_focused_with_neighbor(&mut self, workspace: u32, direction: Direction, bounds: Rect) -> Option<XWindow> {
        self.trees.get_mut(&workspace)?.swap_focused_with_neighbor(direction, bounds)
    }

    pub fn resize_focused(&mut self, workspace: u32, delta: f64) -> Result<(), LayoutError> {
        self.tree_mut(workspace).resize_focused(delta)
    }

    pub fn virtual_rect_of(&self, window: XWindow) -> Option<VirtualRect> {
        let managed = self.windows.get(&window)?;
        Some(VirtualRect {
            x: managed.virtual_pos.0,
            y: managed.virtual_pos.1,
            w: managed.floating_geometry.w,
            h: managed.floating_geometry.h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_unmap_round_trip_restores_empty_registry() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, false);
        reg.map_window(2, 101, 0, false);
        assert_eq!(reg.windows_on(0).len(), 2);
        reg.unmap_window(1);
        reg.unmap_window(2);
        assert!(reg.windows_on(0).is_empty());
    }

    #[test]
    fn warp_latch_suppresses_only_target_until_consumed() {
        let mut latch = WarpLatch::default();
        latch.arm(42);
        assert!(!latch.consume_enter(7));
        assert!(!latch.consume_enter(7));
        assert!(latch.consume_enter(42));
        assert!(latch.consume_enter(7));
    }

    #[test]
    fn floating_windows_never_enter_tree() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, true);
        assert!(reg.windows_on(0).is_empty());
        assert_eq!(reg.floating_windows_on(0), vec![1]);
    }

    #[test]
    fn arrange_partitions_bounds_for_bsp() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, false);
        reg.map_window(2, 101, 0, false);
        let bounds = Rect::new(0, 0, 1920, 1080);
        let placements = reg.arrange(0, LayoutKind::Bsp, bounds, GapConfig::default(), 0.5, 24).unwrap();
        assert_eq!(placements.len(), 2);
    }

    /// Seed scenario S1: 1920x1080, zero gaps/border, three windows added
    /// A,B,C in dwindle mode. The alternating split axis should leave A as
    /// the left half and B/C stacked in the right half.
    #[test]
    fn s1_bsp_three_window_dwindle_matches_expected_rects() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, false);
        reg.map_window(2, 101, 0, false);
        reg.map_window(3, 102, 0, false);
        let bounds = Rect::new(0, 0, 1920, 1080);
        let placements = reg.arrange(0, LayoutKind::Bsp, bounds, GapConfig::default(), 0.5, 24).unwrap();
        let at = |w| placements.iter().find(|(win, _)| *win == w).unwrap().1;
        assert_eq!(at(1), Rect::new(0, 0, 960, 1080));
        assert_eq!(at(2), Rect::new(960, 0, 960, 540));
        assert_eq!(at(3), Rect::new(960, 540, 960, 540));
    }

    /// Seed scenario S2: same screen, master-stack with master_ratio=0.5,
    /// max_master=1 (this registry's master-stack always reserves one
    /// master slot), 4 windows A,B,C,D.
    #[test]
    fn s2_master_stack_four_windows_matches_expected_rects() {
        let mut reg = ClientRegistry::new();
        for (w, f) in [(1, 100), (2, 101), (3, 102), (4, 103)] {
            reg.map_window(w, f, 0, false);
        }
        let bounds = Rect::new(0, 0, 1920, 1080);
        let placements = reg.arrange(0, LayoutKind::MasterStack, bounds, GapConfig::default(), 0.5, 24).unwrap();
        let at = |w| placements.iter().find(|(win, _)| *win == w).unwrap().1;
        assert_eq!(at(1), Rect::new(0, 0, 960, 1080));
        assert_eq!(at(2), Rect::new(960, 0, 960, 360));
        assert_eq!(at(3), Rect::new(960, 360, 960, 360));
        assert_eq!(at(4), Rect::new(960, 720, 960, 360));
    }

    /// Seed scenario S4: two tiled windows side by side; dragging A over B
    /// and releasing swaps their placements and leaves focus on A.
    #[test]
    fn s4_drag_swap_exchanges_placements_and_keeps_focus_on_dragged() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, false);
        reg.map_window(2, 101, 0, false);
        let bounds = Rect::new(0, 0, 1920, 1080);
        let before = reg.arrange(0, LayoutKind::Bsp, bounds, GapConfig::default(), 0.5, 24).unwrap();
        let a_before = before.iter().find(|(w, _)| *w == 1).unwrap().1;
        let b_before = before.iter().find(|(w, _)| *w == 2).unwrap().1;

        reg.begin_drag(1, (500, 500), a_before);
        reg.set_drag_hover(Some(2));
        let outcome = reg.finish_drag();
        assert_eq!(outcome, DragOutcome::TiledSwap { dragged: 1, candidate: 2 });

        let after = reg.arrange(0, LayoutKind::Bsp, bounds, GapConfig::default(), 0.5, 24).unwrap();
        let a_after = after.iter().find(|(w, _)| *w == 1).unwrap().1;
        let b_after = after.iter().find(|(w, _)| *w == 2).unwrap().1;
        assert_eq!(a_after, b_before);
        assert_eq!(b_after, a_before);

        reg.set_focused_window(0, 1);
        let tree = reg.tree(0).unwrap();
        assert_eq!(tree.window_at(tree.find_focused().unwrap()), Some(1));
    }

    /// Seed scenario S3 (registry half): workspace 0 has A,B; workspace 1
    /// has C. `send_to_workspace` moves registry bookkeeping so each
    /// workspace's tree holds exactly the windows assigned to it; the
    /// X-side unmap/map/focus side effects are `wm.rs`'s responsibility and
    /// need a live display to exercise.
    #[test]
    fn s3_send_to_workspace_reassigns_tree_membership() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, false);
        reg.map_window(2, 101, 0, false);
        reg.map_window(3, 102, 1, false);
        assert_eq!(reg.windows_on(0), vec![1, 2]);
        assert_eq!(reg.windows_on(1), vec![3]);

        reg.send_to_workspace(1, 1).unwrap();
        assert_eq!(reg.windows_on(0), vec![2]);
        assert_eq!(reg.windows_on(1), vec![1, 3]);
        assert_eq!(reg.get(1).unwrap().workspace, 1);
    }

    #[test]
    fn drag_on_floating_window_never_sets_hover_candidate() {
        let mut reg = ClientRegistry::new();
        reg.map_window(1, 100, 0, true);
        reg.begin_drag(1, (0, 0), Rect::new(0, 0, 200, 200));
        reg.set_drag_hover(Some(2));
        let outcome = reg.finish_drag();
        match outcome {
            DragOutcome::Floating { window, .. } => assert_eq!(window, 1),
            other => panic!("expected Floating outcome, got {:?}", other),
        }
    }
}
