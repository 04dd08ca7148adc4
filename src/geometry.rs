#![allow(dead_code)]
//! Rectangles, virtual/screen coordinate transforms, and the infinite-canvas
//! spatial hash grid (spec C1).
//!
//! Window handles are kept generic over `x11::xlib::Window` (a `c_ulong`) so
//! the layout tree and strategies in `layout/` can be unit tested without an
//! X display connection, exactly as the teacher's `Quad`/`Attributes` types
//! carry no display dependency either.
use std::collections::{HashMap, HashSet};

use x11::xlib::Window as XWindow;

/// Inclusive lower/upper bound of the X protocol's signed 16-bit coordinate
/// space. Every placement handed to the display must be clamped into this.
pub const X11_MIN: i32 = -32768;
pub const X11_MAX: i32 = 32767;
pub const MAX_WINDOW_DIMENSION: u32 = 32767;

/// Size of a spatial-grid chunk, in virtual pixels.
pub const CHUNK_SIZE: i64 = 2000;

/// Minimum cell a layout strategy is allowed to emit before it must report
/// `CellTooSmall`/`CanvasTooSmall`.
pub const MIN_CELL_WIDTH: i32 = 300;
pub const MIN_CELL_HEIGHT: i32 = 200;

pub const CANVAS_EXPANSION_STEP: i64 = 400;

/// Cardinal direction used for spatial-neighbor focus/swap/resize traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// A screen-space rectangle. Mirrors the teacher's `Quad`, generalized to
/// signed coordinates (a `Quad` was unsigned-only, which cannot represent an
/// off-screen/negative placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn from_size(w: u32, h: u32) -> Self {
        Rect { x: 0, y: 0, w, h }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w as i32 / 2, self.y + self.h as i32 / 2)
    }

    pub fn area(&self) -> i64 {
        self.w as i64 * self.h as i64
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.left() && px < self.right() && py >= self.top() && py < self.bottom()
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }

    pub fn is_left_of(&self, other: &Rect) -> bool {
        self.right() <= other.left()
    }

    pub fn is_right_of(&self, other: &Rect) -> bool {
        self.left() >= other.right()
    }

    pub fn is_above(&self, other: &Rect) -> bool {
        self.bottom() <= other.top()
    }

    pub fn is_below(&self, other: &Rect) -> bool {
        self.top() >= other.bottom()
    }

    /// Splits along `axis`, returning the first or second half at `ratio`.
    pub fn sub_rect(&self, is_first: bool, axis: super::layout::tree::SplitAxis, ratio: f64) -> Rect {
        use super::layout::tree::SplitAxis;
        let ratio = ratio.clamp(0.1, 0.9);
        match axis {
            SplitAxis::Vertical => {
                // stacked horizontally: split the width
                let split_w = (self.w as f64 * ratio).round() as u32;
                if is_first {
                    Rect::new(self.x, self.y, split_w, self.h)
                } else {
                    Rect::new(self.x + split_w as i32, self.y, self.w - split_w, self.h)
                }
            }
            SplitAxis::Horizontal => {
                // stacked vertically: split the height
                let split_h = (self.h as f64 * ratio).round() as u32;
                if is_first {
                    Rect::new(self.x, self.y, self.w, split_h)
                } else {
                    Rect::new(self.x, self.y + split_h as i32, self.w, self.h - split_h)
                }
            }
        }
    }

    /// Shrinks the rectangle in place by a border width on every side.
    pub fn shrink(&self, amount: i32) -> Rect {
        let w = (self.w as i32 - 2 * amount).max(0) as u32;
        let h = (self.h as i32 - 2 * amount).max(0) as u32;
        Rect::new(self.x + amount, self.y + amount, w, h)
    }

    /// Clamps position into the X11 signed-16-bit range and caps dimensions.
    pub fn clamp_to_x11(&self) -> Rect {
        Rect {
            x: self.x.clamp(X11_MIN, X11_MAX),
            y: self.y.clamp(X11_MIN, X11_MAX),
            w: self.w.min(MAX_WINDOW_DIMENSION).max(1),
            h: self.h.min(MAX_WINDOW_DIMENSION).max(1),
        }
    }

    /// Direction-aware Manhattan distance used by spatial-neighbor search:
    /// the orthogonal component is weighted 4x so in-line neighbors are
    /// preferred over merely-closer ones.
    pub fn distance_to(&self, other: &Rect, dir: Direction) -> Option<i64> {
        let ok = match dir {
            Direction::Left => other.is_left_of(self) || other.right() <= self.left(),
            Direction::Right => other.is_right_of(self) || other.left() >= self.right(),
            Direction::Up => other.is_above(self) || other.bottom() <= self.top(),
            Direction::Down => other.is_below(self) || other.top() >= self.bottom(),
        };
        if !ok {
            return None;
        }
        let (sx, sy) = self.center();
        let (ox, oy) = other.center();
        let dx = (ox - sx) as i64;
        let dy = (oy - sy) as i64;
        let dist = match dir {
            Direction::Left | Direction::Right => dx.abs() + 4 * dy.abs(),
            Direction::Up | Direction::Down => dy.abs() + 4 * dx.abs(),
        };
        Some(dist)
    }
}

/// Finds the candidate in `direction` from `source` minimizing the
/// direction-aware distance; ties break by the order candidates appear in
/// (callers pass candidates already ordered by window-creation order).
pub fn spatial_neighbor<'a, T>(
    source: Rect,
    direction: Direction,
    candidates: impl IntoIterator<Item = (&'a T, Rect)>,
) -> Option<&'a T> {
    let mut best: Option<(&'a T, i64)> = None;
    for (item, rect) in candidates {
        if let Some(dist) = source.distance_to(&rect, direction) {
            match &best {
                Some((_, best_dist)) if *best_dist <= dist => {}
                _ => best = Some((item, dist)),
            }
        }
    }
    best.map(|(item, _)| item)
}

/// Floor-divides toward negative infinity, as the spatial grid requires for
/// negative virtual coordinates.
fn floor_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    let r = n % d;
    if (r != 0) && ((r < 0) != (d < 0)) {
        q - 1
    } else {
        q
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
}

impl ChunkCoord {
    pub fn from_virtual(vx: i64, vy: i64) -> Self {
        ChunkCoord {
            x: floor_div(vx, CHUNK_SIZE),
            y: floor_div(vy, CHUNK_SIZE),
        }
    }

    /// The 3x3 block of chunks centered on `self`.
    pub fn visible_block(&self) -> [ChunkCoord; 9] {
        let mut out = [ChunkCoord { x: 0, y: 0 }; 9];
        let mut i = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                out[i] = ChunkCoord {
                    x: self.x + dx,
                    y: self.y + dy,
                };
                i += 1;
            }
        }
        out
    }
}

/// A rectangle in the i64 virtual plane of an infinite-canvas workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRect {
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
}

impl VirtualRect {
    pub fn intersecting_chunks(&self) -> Vec<ChunkCoord> {
        let (x0, y0) = (self.x, self.y);
        let (x1, y1) = (self.x + self.w as i64 - 1, self.y + self.h as i64 - 1);
        let c0 = ChunkCoord::from_virtual(x0, y0);
        let c1 = ChunkCoord::from_virtual(x1, y1);
        let mut out = Vec::new();
        for cy in c0.y..=c1.y {
            for cx in c0.x..=c1.x {
                out.push(ChunkCoord { x: cx, y: cy });
            }
        }
        out
    }

    pub fn overlaps(&self, other: &VirtualRect) -> bool {
        self.x < other.x + other.w as i64
            && self.x + self.w as i64 > other.x
            && self.y < other.y + other.h as i64
            && self.y + self.h as i64 > other.y
    }
}

/// Converts between virtual (i64) and screen (clamped i32) coordinate
/// spaces for the infinite-canvas layout. The camera stays conceptually at
/// screen origin; panning moves the offset instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Camera {
    pub offset_x: i64,
    pub offset_y: i64,
}

impl Camera {
    pub fn new(offset_x: i64, offset_y: i64) -> Self {
        Camera { offset_x, offset_y }
    }

    pub fn pan(&mut self, dx: i64, dy: i64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    pub fn to_screen(&self, vx: i64, vy: i64) -> (i32, i32) {
        let sx = (vx - self.offset_x).clamp(X11_MIN as i64, X11_MAX as i64);
        let sy = (vy - self.offset_y).clamp(X11_MIN as i64, X11_MAX as i64);
        (sx as i32, sy as i32)
    }

    pub fn to_virtual(&self, sx: i32, sy: i32) -> (i64, i64) {
        (self.offset_x + sx as i64, self.offset_y + sy as i64)
    }

    pub fn current_chunk(&self) -> ChunkCoord {
        ChunkCoord::from_virtual(self.offset_x, self.offset_y)
    }

    pub fn center_on(&mut self, vx: i64, vy: i64, screen_w: u32, screen_h: u32) {
        self.offset_x = vx - screen_w as i64 / 2;
        self.offset_y = vy - screen_h as i64 / 2;
    }
}

/// O(1) visibility lookup for the infinite-canvas layout: partitions the
/// virtual plane into `CHUNK_SIZE` cells and registers each window in every
/// chunk its rectangle intersects.
#[derive(Debug, Default)]
pub struct SpatialGrid {
    chunks: HashMap<ChunkCoord, HashSet<XWindow>>,
    windows: HashMap<XWindow, VirtualRect>,
    window_chunks: HashMap<XWindow, HashSet<ChunkCoord>>,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&mut self, window: XWindow, rect: VirtualRect) {
        self.remove_window(window);
        let chunks = rect.intersecting_chunks();
        let mut set = HashSet::with_capacity(chunks.len());
        for c in &chunks {
            self.chunks.entry(*c).or_insert_with(HashSet::new).insert(window);
            set.insert(*c);
        }
        self.windows.insert(window, rect);
        self.window_chunks.insert(window, set);
    }

    pub fn update_window(&mut self, window: XWindow, rect: VirtualRect) {
        self.add_window(window, rect);
    }

    pub fn remove_window(&mut self, window: XWindow) {
        if let Some(chunks) = self.window_chunks.remove(&window) {
            for c in chunks {
                if let Some(set) = self.chunks.get_mut(&c) {
                    set.remove(&window);
                    if set.is_empty() {
                        self.chunks.remove(&c);
                    }
                }
            }
        }
        self.windows.remove(&window);
    }

    pub fn window_rect(&self, window: XWindow) -> Option<&VirtualRect> {
        self.windows.get(&window)
    }

    pub fn windows_in_chunk(&self, chunk: &ChunkCoord) -> HashSet<XWindow> {
        self.chunks.get(chunk).cloned().unwrap_or_default()
    }

    /// Windows intersecting the camera's 3x3 visible block — the set that
    /// must actually be mapped on the display.
    pub fn mappable_windows(&self, camera: &Camera) -> HashSet<XWindow> {
        let mut out = HashSet::new();
        for c in camera.current_chunk().visible_block() {
            if let Some(set) = self.chunks.get(&c) {
                out.extend(set.iter().copied());
            }
        }
        out
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn contains(&self, window: XWindow) -> bool {
        self.windows.contains_key(&window)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.windows.clear();
        self.window_chunks.clear();
    }

    /// Every `(chunk, window)` invariant: `w in grid.chunks[c]` iff
    /// `w`'s rectangle intersects `c`'s bounds. Exposed for the C1/C4
    /// consistency tests in spec §8 item 4.
    #[cfg(test)]
    pub(crate) fn chunks_for(&self, window: XWindow) -> HashSet<ChunkCoord> {
        self.window_chunks.get(&window).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tree::SplitAxis;

    #[test]
    fn sub_rect_vertical_split_halves_width() {
        let r = Rect::new(0, 0, 1920, 1080);
        let first = r.sub_rect(true, SplitAxis::Vertical, 0.5);
        let second = r.sub_rect(false, SplitAxis::Vertical, 0.5);
        assert_eq!(first, Rect::new(0, 0, 960, 1080));
        assert_eq!(second, Rect::new(960, 0, 960, 1080));
    }

    #[test]
    fn sub_rect_horizontal_split_halves_height() {
        let r = Rect::new(960, 0, 960, 1080);
        let first = r.sub_rect(true, SplitAxis::Horizontal, 0.5);
        let second = r.sub_rect(false, SplitAxis::Horizontal, 0.5);
        assert_eq!(first, Rect::new(960, 0, 960, 540));
        assert_eq!(second, Rect::new(960, 540, 960, 540));
    }

    #[test]
    fn floor_div_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(-1, 2000), -1);
        assert_eq!(floor_div(-2000, 2000), -1);
        assert_eq!(floor_div(-2001, 2000), -2);
        assert_eq!(floor_div(1999, 2000), 0);
    }

    #[test]
    fn clamp_to_x11_caps_both_ends() {
        let r = Rect::new(-100000, 100000, 1, 1).clamp_to_x11();
        assert_eq!(r.x, X11_MIN);
        assert_eq!(r.y, X11_MAX);
    }

    /// Seed scenario S6: a window at virtual (10000, 10000) is unmapped from
    /// the origin camera but becomes mappable once the camera pans near it.
    #[test]
    fn s6_infinite_canvas_visibility_follows_camera_pan() {
        let mut grid = SpatialGrid::new();
        grid.add_window(1, VirtualRect { x: 10_000, y: 10_000, w: 500, h: 500 });
        let cam = Camera::new(0, 0);
        assert!(!grid.mappable_windows(&cam).contains(&1));

        let cam2 = Camera::new(9_000, 9_000);
        assert!(grid.mappable_windows(&cam2).contains(&1));
    }

    #[test]
    fn spatial_grid_chunk_consistency_after_update() {
        let mut grid = SpatialGrid::new();
        grid.add_window(1, VirtualRect { x: 0, y: 0, w: 2500, h: 100 });
        for c in grid.chunks_for(1) {
            assert!(grid.windows_in_chunk(&c).contains(&1));
        }
        grid.update_window(1, VirtualRect { x: 5000, y: 5000, w: 10, h: 10 });
        assert!(!grid.windows_in_chunk(&ChunkCoord { x: 0, y: 0 }).contains(&1));
    }
}
