#![allow(dead_code)]
//! Layout strategies (spec C3): pluggable algorithms that turn a workspace's
//! window set (plus, for BSP-family strategies, the tree from `tree.rs`)
//! into placements. Dispatch is a tagged enum matched in one place rather
//! than a trait-object vtable, mirroring how the teacher's `Workspace::arrange`
//! is a single function with a match over arrangement settings, just
//! generalized from one hardcoded strategy to nine.
use x11::xlib::Window as XWindow;

use crate::error::LayoutError;
use crate::geometry::{Rect, MIN_CELL_HEIGHT, MIN_CELL_WIDTH};
use crate::layout::tree::BSPTree;

/// Per-workspace gap configuration (`GapConfig.hpp` in the original):
/// an outer gap around the screen edge and an inner gap between windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapConfig {
    pub outer: u32,
    pub inner: u32,
}

impl Default for GapConfig {
    fn default() -> Self {
        GapConfig { outer: 0, inner: 0 }
    }
}

impl GapConfig {
    pub fn apply_outer(&self, bounds: Rect) -> Rect {
        bounds.shrink(self.outer as i32)
    }

    pub fn apply_inner(&self, rect: Rect) -> Rect {
        rect.shrink((self.inner / 2) as i32)
    }
}

/// Where a hidden window in a single-visible-window strategy (Monocle,
/// Tabbed-Stacked) gets parked. Spec.md §4.3: moved off-screen rather than
/// unmapped, so focus/geometry bookkeeping doesn't have to special-case it.
pub const OFFSCREEN_X: i32 = -9000;
pub const OFFSCREEN_Y: i32 = -9000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Bsp,
    Monocle,
    MasterStack,
    CenteredMaster,
    DynamicGrid,
    DwindleSpiral,
    GoldenRatio,
    TabbedStacked,
    InfiniteCanvas,
}

impl Default for LayoutKind {
    fn default() -> Self {
        LayoutKind::Bsp
    }
}

impl LayoutKind {
    pub fn cycle_next(self) -> LayoutKind {
        use LayoutKind::*;
        match self {
            Bsp => Monocle,
            Monocle => MasterStack,
            MasterStack => CenteredMaster,
            CenteredMaster => DynamicGrid,
            DynamicGrid => DwindleSpiral,
            DwindleSpiral => GoldenRatio,
            GoldenRatio => TabbedStacked,
            TabbedStacked => InfiniteCanvas,
            InfiniteCanvas => Bsp,
        }
    }

    pub fn cycle_prev(self) -> LayoutKind {
        use LayoutKind::*;
        match self {
            Bsp => InfiniteCanvas,
            Monocle => Bsp,
            MasterStack => Monocle,
            CenteredMaster => MasterStack,
            DynamicGrid => CenteredMaster,
            DwindleSpiral => DynamicGrid,
            GoldenRatio => DwindleSpiral,
            TabbedStacked => GoldenRatio,
            InfiniteCanvas => TabbedStacked,
        }
    }

    /// Parses a config/verb layout name into its `LayoutKind`, accepting the
    /// same spellings `WorkspaceSettings::default_layout_kind` does.
    pub fn parse(name: &str) -> Option<LayoutKind> {
        Some(match name.to_ascii_lowercase().as_str() {
            "bsp" => LayoutKind::Bsp,
            "monocle" => LayoutKind::Monocle,
            "master-stack" | "masterstack" => LayoutKind::MasterStack,
            "centered-master" | "centeredmaster" => LayoutKind::CenteredMaster,
            "dynamic-grid" | "dynamicgrid" => LayoutKind::DynamicGrid,
            "dwindle" | "dwindle-spiral" => LayoutKind::DwindleSpiral,
            "golden-ratio" | "goldenratio" => LayoutKind::GoldenRatio,
            "tabbed" | "tabbed-stacked" => LayoutKind::TabbedStacked,
            "infinite-canvas" | "infinitecanvas" => LayoutKind::InfiniteCanvas,
            _ => return None,
        })
    }

    /// Canonical name reported back over the control socket (§4.8).
    pub fn name(&self) -> &'static str {
        match self {
            LayoutKind::Bsp => "bsp",
            LayoutKind::Monocle => "monocle",
            LayoutKind::MasterStack => "master-stack",
            LayoutKind::CenteredMaster => "centered-master",
            LayoutKind::DynamicGrid => "dynamic-grid",
            LayoutKind::DwindleSpiral => "dwindle-spiral",
            LayoutKind::GoldenRatio => "golden-ratio",
            LayoutKind::TabbedStacked => "tabbed-stacked",
            LayoutKind::InfiniteCanvas => "infinite-canvas",
        }
    }

    fn check_cell(rect: Rect, min_w: u32, min_h: u32) -> Result<(), LayoutError> {
        if rect.w < min_w || rect.h < min_h {
            return Err(LayoutError::CellTooSmall {
                w: rect.w,
                h: rect.h,
                min_w,
                min_h,
            });
        }
        Ok(())
    }

    /// Computes placements for `windows` (in stable/creation order) within
    /// `bounds`, consulting `tree` only for the `Bsp` strategy (and, for
    /// `Monocle`/`TabbedStacked`, to find which window is focused).
    /// `master_ratio` is used by master-stack/centered-master; `gaps` by
    /// every strategy; `tab_bar_height` only by `TabbedStacked`.
    pub fn apply(
        &self,
        windows: &[XWindow],
        tree: &BSPTree,
        bounds: Rect,
        gaps: GapConfig,
        master_ratio: f64,
        tab_bar_height: u32,
    ) -> Result<Vec<(XWindow, Rect)>, LayoutError> {
        let bounds = gaps.apply_outer(bounds);
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let placements = match self {
            LayoutKind::Bsp => tree.compute_layout(bounds),
            LayoutKind::Monocle => Self::monocle(windows, tree, bounds),
            LayoutKind::TabbedStacked => Self::tabbed_stacked(windows, tree, bounds, tab_bar_height),
            LayoutKind::MasterStack => Self::master_stack(windows, bounds, master_ratio),
            LayoutKind::CenteredMaster => Self::centered_master(windows, bounds, master_ratio),
            LayoutKind::DynamicGrid => Self::dynamic_grid(windows, bounds),
            LayoutKind::DwindleSpiral => Self::dwindle(windows, bounds),
            LayoutKind::GoldenRatio => Self::golden_ratio(windows, bounds),
            LayoutKind::InfiniteCanvas => {
                // Infinite-canvas placement is driven by client.rs's virtual
                // coordinates and the spatial grid, not this function; new
                // windows get a deterministic on-screen default here and
                // client.rs reassigns them a virtual position immediately.
                windows.iter().map(|w| (*w, bounds)).collect()
            }
        };

        let with_gaps: Vec<(XWindow, Rect)> = placements
            .into_iter()
            .map(|(w, r)| (w, gaps.apply_inner(r)))
            .collect();

        for (_, rect) in &with_gaps {
            Self::check_cell(*rect, MIN_CELL_WIDTH as u32, MIN_CELL_HEIGHT as u32)?;
        }

        Ok(with_gaps)
    }

    /// The tree's focused leaf if it names one of `windows`, else the first
    /// window in stable order — used by the single-visible-window strategies
    /// so the picture always shows a window that's actually on `windows`.
    fn focused_or_first(windows: &[XWindow], tree: &BSPTree) -> XWindow {
        tree.find_focused()
            .and_then(|id| tree.window_at(id))
            .filter(|w| windows.contains(w))
            .unwrap_or(windows[0])
    }

    /// Only the focused window is shown, at full bounds; every other window
    /// is parked at the off-screen sentinel (spec.md §4.3).
    fn monocle(windows: &[XWindow], tree: &BSPTree, bounds: Rect) -> Vec<(XWindow, Rect)> {
        let focused = Self::focused_or_first(windows, tree);
        windows
            .iter()
            .map(|w| {
                if *w == focused {
                    (*w, bounds)
                } else {
                    (*w, Rect::new(OFFSCREEN_X, OFFSCREEN_Y, bounds.w, bounds.h))
                }
            })
            .collect()
    }

    /// Reserves a tab bar of `tab_bar_height` along the top of `bounds` and
    /// shows only the focused window below it; the rest are parked
    /// off-screen, same as `monocle` (spec.md §4.3).
    fn tabbed_stacked(windows: &[XWindow], tree: &BSPTree, bounds: Rect, tab_bar_height: u32) -> Vec<(XWindow, Rect)> {
        let focused = Self::focused_or_first(windows, tree);
        let content = Rect::new(
            bounds.x,
            bounds.y + tab_bar_height as i32,
            bounds.w,
            bounds.h.saturating_sub(tab_bar_height),
        );
        windows
            .iter()
            .map(|w| {
                if *w == focused {
                    (*w, content)
                } else {
                    (*w, Rect::new(OFFSCREEN_X, OFFSCREEN_Y, content.w, content.h))
                }
            })
            .collect()
    }

    fn master_stack(windows: &[XWindow], bounds: Rect, ratio: f64) -> Vec<(XWindow, Rect)> {
        let ratio = ratio.clamp(BSPTree::MIN_RATIO, BSPTree::MAX_RATIO);
        if windows.len() == 1 {
            return vec![(windows[0], bounds)];
        }
        let master_w = (bounds.w as f64 * ratio).round() as u32;
        let master = Rect::new(bounds.x, bounds.y, master_w, bounds.h);
        let stack_bounds = Rect::new(bounds.x + master_w as i32, bounds.y, bounds.w - master_w, bounds.h);
        let stack = &windows[1..];
        let mut out = vec![(windows[0], master)];
        out.extend(Self::stack_vertical(stack, stack_bounds));
        out
    }

    fn centered_master(windows: &[XWindow], bounds: Rect, ratio: f64) -> Vec<(XWindow, Rect)> {
        if windows.len() == 1 {
            return vec![(windows[0], bounds)];
        }
        let ratio = ratio.clamp(BSPTree::MIN_RATIO, BSPTree::MAX_RATIO);
        let master_w = (bounds.w as f64 * ratio).round() as u32;
        let side_total = bounds.w - master_w;
        let master_x = bounds.x + side_total as i32 / 2;
        let master = Rect::new(master_x, bounds.y, master_w, bounds.h);

        if windows.len() == 2 {
            let side = Rect::new(bounds.x + master_x + master_w as i32 - bounds.x, bounds.y, side_total, bounds.h);
            return vec![(windows[0], master), (windows[1], side)];
        }

        let rest = &windows[1..];
        let left_count = rest.len() / 2;
        let (left, right) = rest.split_at(left_count);
        let left_w = side_total / 2;
        let right_w = side_total - left_w;
        let left_bounds = Rect::new(bounds.x, bounds.y, left_w, bounds.h);
        let right_bounds = Rect::new(bounds.x + (master_x - bounds.x) + master_w as i32, bounds.y, right_w, bounds.h);

        let mut out = vec![(windows[0], master)];
        out.extend(Self::stack_vertical(left, left_bounds));
        out.extend(Self::stack_vertical(right, right_bounds));
        out
    }

    fn stack_vertical(windows: &[XWindow], bounds: Rect) -> Vec<(XWindow, Rect)> {
        if windows.is_empty() {
            return Vec::new();
        }
        let h = bounds.h / windows.len() as u32;
        windows
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let y = bounds.y + (h * i as u32) as i32;
                let this_h = if i == windows.len() - 1 { bounds.h - h * i as u32 } else { h };
                (*w, Rect::new(bounds.x, y, bounds.w, this_h))
            })
            .collect()
    }

    /// Grid dimensions follow a lookup-table-then-sqrt heuristic matching
    /// `LayoutProvider::calculateGridDimensions`: small counts use hand-tuned
    /// column counts, larger counts fall back to `ceil(sqrt(n))` columns.
    fn grid_dimensions(n: usize) -> (usize, usize) {
        match n {
            0 => (0, 0),
            1 => (1, 1),
            2 => (2, 1),
            3 => (3, 1),
            4 => (2, 2),
            5 | 6 => (3, 2),
            7 | 8 | 9 => (3, 3),
            _ => {
                let cols = (n as f64).sqrt().ceil() as usize;
                let rows = (n + cols - 1) / cols;
                (cols, rows)
            }
        }
    }

    fn dynamic_grid(windows: &[XWindow], bounds: Rect) -> Vec<(XWindow, Rect)> {
        let (cols, rows) = Self::grid_dimensions(windows.len());
        if cols == 0 {
            return Vec::new();
        }
        let cell_w = bounds.w / cols as u32;
        let cell_h = bounds.h / rows as u32;
        windows
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let col = i % cols;
                let row = i / cols;
                let is_last_col = col == cols - 1;
                let is_last_row = row == rows - 1 || i == windows.len() - 1;
                let w_width = if is_last_col { bounds.w - cell_w * col as u32 } else { cell_w };
                let w_height = if is_last_row { bounds.h - cell_h * row as u32 } else { cell_h };
                let rect = Rect::new(
                    bounds.x + (cell_w * col as u32) as i32,
                    bounds.y + (cell_h * row as u32) as i32,
                    w_width,
                    w_height,
                );
                (*w, rect)
            })
            .collect()
    }

    /// Recursively halves the remaining rectangle, alternating split axis,
    /// spiraling the next window into progressively smaller corners.
    fn dwindle(windows: &[XWindow], bounds: Rect) -> Vec<(XWindow, Rect)> {
        Self::spiral(windows, bounds, true, 0.5)
    }

    /// As `dwindle` but the ratio follows the golden ratio (~0.618) instead
    /// of an even half, matching `LayoutEngine`'s golden-ratio strategy.
    fn golden_ratio(windows: &[XWindow], bounds: Rect) -> Vec<(XWindow, Rect)> {
        const PHI_INVERSE: f64 = 0.618_034;
        Self::spiral(windows, bounds, true, PHI_INVERSE)
    }

    fn spiral(windows: &[XWindow], bounds: Rect, vertical_first: bool, ratio: f64) -> Vec<(XWindow, Rect)> {
        let mut out = Vec::with_capacity(windows.len());
        let mut remaining = bounds;
        let mut vertical = vertical_first;
        for (i, w) in windows.iter().enumerate() {
            if i == windows.len() - 1 {
                out.push((*w, remaining));
                break;
            }
            let axis = if vertical { SplitAxisLocal::Vertical } else { SplitAxisLocal::Horizontal };
            let (this_rect, next_rect) = Self::split_local(remaining, axis, ratio);
            out.push((*w, this_rect));
            remaining = next_rect;
            vertical = !vertical;
        }
        out
    }

    fn split_local(rect: Rect, axis: SplitAxisLocal, ratio: f64) -> (Rect, Rect) {
        let ratio = ratio.clamp(BSPTree::MIN_RATIO, BSPTree::MAX_RATIO);
        match axis {
            SplitAxisLocal::Vertical => {
                let w = (rect.w as f64 * ratio).round() as u32;
                (
                    Rect::new(rect.x, rect.y, w, rect.h),
                    Rect::new(rect.x + w as i32, rect.y, rect.w - w, rect.h),
                )
            }
            SplitAxisLocal::Horizontal => {
                let h = (rect.h as f64 * ratio).round() as u32;
                (
                    Rect::new(rect.x, rect.y, rect.w, h),
                    Rect::new(rect.x, rect.y + h as i32, rect.w, rect.h - h),
                )
            }
        }
    }
}

#[derive(Clone, Copy)]
enum SplitAxisLocal {
    Vertical,
    Horizontal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_dimensions_cover_small_counts() {
        assert_eq!(LayoutKind::grid_dimensions(1), (1, 1));
        assert_eq!(LayoutKind::grid_dimensions(4), (2, 2));
        assert_eq!(LayoutKind::grid_dimensions(9), (3, 3));
        assert_eq!(LayoutKind::grid_dimensions(10), (4, 3));
    }

    #[test]
    fn dynamic_grid_partitions_without_gap_covers_bounds() {
        let bounds = Rect::new(0, 0, 1200, 900);
        let windows = vec![1, 2, 3, 4];
        let placements = LayoutKind::dynamic_grid(&windows, bounds);
        assert_eq!(placements.len(), 4);
        let total_area: i64 = placements.iter().map(|(_, r)| r.area()).sum();
        assert_eq!(total_area, bounds.area());
    }

    /// With no focused leaf tracked (a fresh empty tree), Monocle falls back
    /// to the first window in stable order and parks the rest off-screen.
    #[test]
    fn monocle_shows_only_the_focused_window() {
        let tree = BSPTree::new();
        let bounds = Rect::new(0, 0, 1000, 1000);
        let windows = vec![1, 2, 3];
        let placements = LayoutKind::Monocle
            .apply(&windows, &tree, bounds, GapConfig::default(), 0.5, 24)
            .unwrap();
        assert_eq!(placements.len(), 3);
        let at = |w| placements.iter().find(|(win, _)| *win == w).unwrap().1;
        assert_eq!(at(1), bounds);
        assert_eq!(at(2).x, OFFSCREEN_X);
        assert_eq!(at(3).x, OFFSCREEN_X);
    }

    #[test]
    fn tabbed_stacked_reserves_tab_bar_and_shows_one_window() {
        let tree = BSPTree::new();
        let bounds = Rect::new(0, 0, 1000, 1000);
        let windows = vec![1, 2];
        let placements = LayoutKind::TabbedStacked
            .apply(&windows, &tree, bounds, GapConfig::default(), 0.5, 30)
            .unwrap();
        let at = |w| placements.iter().find(|(win, _)| *win == w).unwrap().1;
        assert_eq!(at(1), Rect::new(0, 30, 1000, 970));
        assert_eq!(at(2).x, OFFSCREEN_X);
    }

    #[test]
    fn master_stack_single_window_fills_bounds() {
        let tree = BSPTree::new();
        let bounds = Rect::new(0, 0, 1000, 1000);
        let placements = LayoutKind::MasterStack
            .apply(&[1], &tree, bounds, GapConfig::default(), 0.6, 24)
            .unwrap();
        assert_eq!(placements, vec![(1, bounds)]);
    }

    #[test]
    fn cell_too_small_is_reported() {
        let tree = BSPTree::new();
        let bounds = Rect::new(0, 0, 100, 100);
        let windows = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let result = LayoutKind::DynamicGrid.apply(&windows, &tree, bounds, GapConfig::default(), 0.5, 24);
        assert!(matches!(result, Err(LayoutError::CellTooSmall { .. })));
    }
}
