#![allow(dead_code)]
//! Arena-based binary space partitioning tree (spec C2).
//!
//! Nodes live in a flat `Vec<Node>` arena and refer to each other by index
//! (`NodeId`) rather than `Box`/`Rc`, so the tree can be walked and mutated
//! without fighting the borrow checker the way a pointer-based tree would —
//! the same arena-of-indices shape the teacher's `Workspace` uses for its
//! flat `Vec<Client>` plus a `selected` index, generalized to a full tree.
//! A freed node's slot is reused via `free_list` rather than shrinking the
//! vector, so `NodeId`s stay stable across removals.
use x11::xlib::Window as XWindow;

use crate::error::LayoutError;
use crate::geometry::{Direction, Rect};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Children sit side by side; the split line is vertical.
    Vertical,
    /// Children stack top/bottom; the split line is horizontal.
    Horizontal,
}

impl SplitAxis {
    pub fn flipped(self) -> SplitAxis {
        match self {
            SplitAxis::Vertical => SplitAxis::Horizontal,
            SplitAxis::Horizontal => SplitAxis::Vertical,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        window: XWindow,
        parent: Option<NodeId>,
    },
    Internal {
        axis: SplitAxis,
        ratio: f64,
        parent: Option<NodeId>,
        first: NodeId,
        second: NodeId,
    },
    Free,
}

/// Where `insert` splits a new window in. Spec C2 `add`: dwindle mode
/// targets the most recently focused leaf; otherwise the first leaf in
/// depth-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    DwindleFocused,
    FirstLeaf,
}

/// A BSP tree over one workspace's tiled windows. Floating/fullscreen
/// windows never enter the tree; `client.rs` tracks those separately.
#[derive(Debug)]
pub struct BSPTree {
    arena: Vec<Node>,
    free_list: Vec<NodeId>,
    root: Option<NodeId>,
    focused: Option<NodeId>,
    leaf_cache: std::cell::RefCell<Option<Vec<NodeId>>>,
    insert_mode: InsertMode,
}

impl Default for BSPTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BSPTree {
    pub const MIN_RATIO: f64 = 0.1;
    pub const MAX_RATIO: f64 = 0.9;

    pub fn new() -> Self {
        BSPTree {
            arena: Vec::new(),
            free_list: Vec::new(),
            root: None,
            focused: None,
            leaf_cache: std::cell::RefCell::new(None),
            insert_mode: InsertMode::DwindleFocused,
        }
    }

    pub fn set_insert_mode(&mut self, mode: InsertMode) {
        self.insert_mode = mode;
    }

    fn invalidate_cache(&self) {
        *self.leaf_cache.borrow_mut() = None;
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.arena[id] = node;
            id
        } else {
            self.arena.push(node);
            self.arena.len() - 1
        }
    }

    fn clamp_ratio(ratio: f64) -> f64 {
        ratio.clamp(Self::MIN_RATIO, Self::MAX_RATIO)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn count(&self) -> usize {
        self.leaves().len()
    }

    /// Cached, invalidation-gated list of leaf node ids in left/top-to-
    /// right/bottom document order.
    fn leaves(&self) -> Vec<NodeId> {
        if let Some(cached) = self.leaf_cache.borrow().as_ref() {
            return cached.clone();
        }
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.collect_leaves(root, &mut out);
        }
        *self.leaf_cache.borrow_mut() = Some(out.clone());
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match &self.arena[id] {
            Node::Leaf { .. } => out.push(id),
            Node::Internal { first, second, .. } => {
                let (first, second) = (*first, *second);
                self.collect_leaves(first, out);
                self.collect_leaves(second, out);
            }
            Node::Free => unreachable!("dangling reference to freed node"),
        }
    }

    pub fn window_at(&self, id: NodeId) -> Option<XWindow> {
        match self.arena.get(id)? {
            Node::Leaf { window, .. } => Some(*window),
            _ => None,
        }
    }

    pub fn find_first(&self) -> Option<NodeId> {
        self.leaves().first().copied()
    }

    pub fn find_last(&self) -> Option<NodeId> {
        self.leaves().last().copied()
    }

    pub fn find_focused(&self) -> Option<NodeId> {
        self.focused.filter(|id| matches!(self.arena.get(*id), Some(Node::Leaf { .. })))
    }

    pub fn find_window(&self, window: XWindow) -> Option<NodeId> {
        self.leaves().into_iter().find(|id| self.window_at(*id) == Some(window))
    }

    pub fn set_focused(&mut self, id: NodeId) {
        if matches!(self.arena.get(id), Some(Node::Leaf { .. })) {
            self.focused = Some(id);
        }
    }

    /// Inserts `window` as a sibling of the focused leaf, splitting it along
    /// `axis` (or the currently-focused leaf's flipped axis when `axis` is
    /// `None`, matching a dwindle-style alternation). The new leaf becomes
    /// the second child and gains focus.
    pub fn insert(&mut self, window: XWindow, axis: Option<SplitAxis>) -> NodeId {
        let new_leaf = self.alloc(Node::Leaf { window, parent: None });

        let target = match self.insert_mode {
            InsertMode::DwindleFocused => self.focused.or(self.root),
            InsertMode::FirstLeaf => self.find_first().or(self.root),
        };
        let Some(target) = target else {
            self.root = Some(new_leaf);
            self.focused = Some(new_leaf);
            self.invalidate_cache();
            return new_leaf;
        };

        let parent = match &self.arena[target] {
            Node::Leaf { parent, .. } => *parent,
            Node::Internal { parent, .. } => *parent,
            Node::Free => unreachable!(),
        };

        // Alternate with the target's current parent axis so each level of
        // the tree splits the opposite way from its parent (spec C2 `add`);
        // the first split off a lone root leaf has no parent to alternate
        // from and starts vertical (left/right).
        let axis = axis.unwrap_or_else(|| match parent.map(|p| &self.arena[p]) {
            Some(Node::Internal { axis, .. }) => axis.flipped(),
            _ => SplitAxis::Vertical,
        });

        let internal = self.alloc(Node::Internal {
            axis,
            ratio: 0.5,
            parent,
            first: target,
            second: new_leaf,
        });

        self.set_parent(target, Some(internal));
        self.set_parent(new_leaf, Some(internal));

        match parent {
            Some(p) => self.replace_child(p, target, internal),
            None => self.root = Some(internal),
        }

        self.focused = Some(new_leaf);
        self.invalidate_cache();
        new_leaf
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        match &mut self.arena[id] {
            Node::Leaf { parent: p, .. } => *p = parent,
            Node::Internal { parent: p, .. } => *p = parent,
            Node::Free => unreachable!(),
        }
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if let Node::Internal { first, second, .. } = &mut self.arena[parent] {
            if *first == old {
                *first = new;
            } else if *second == old {
                *second = new;
            }
        }
    }

    /// Removes the leaf holding `window`. The removed leaf's sibling takes
    /// its parent's place (the classic BSP-remove collapse), preserving the
    /// invariant that every internal node has exactly two children.
    pub fn remove(&mut self, window: XWindow) -> Result<(), LayoutError> {
        let Some(leaf) = self.find_window(window) else {
            return Err(LayoutError::NoFocusedNode);
        };

        let parent = match &self.arena[leaf] {
            Node::Leaf { parent, .. } => *parent,
            _ => unreachable!(),
        };

        self.arena[leaf] = Node::Free;
        self.free_list.push(leaf);

        match parent {
            None => {
                self.root = None;
                self.focused = None;
            }
            Some(parent_id) => {
                let (sibling, grandparent) = match &self.arena[parent_id] {
                    Node::Internal { first, second, parent, .. } => {
                        let sibling = if *first == leaf { *second } else { *first };
                        (sibling, *parent)
                    }
                    _ => unreachable!(),
                };

                self.arena[parent_id] = Node::Free;
                self.free_list.push(parent_id);
                self.set_parent(sibling, grandparent);

                match grandparent {
                    Some(gp) => self.replace_child(gp, parent_id, sibling),
                    None => self.root = Some(sibling),
                }

                if self.focused == Some(leaf) {
                    self.focused = self.nearest_leaf_from(sibling);
                }
            }
        }

        self.invalidate_cache();
        Ok(())
    }

    fn nearest_leaf_from(&self, id: NodeId) -> Option<NodeId> {
        match &self.arena[id] {
            Node::Leaf { .. } => Some(id),
            Node::Internal { first, .. } => self.nearest_leaf_from(*first),
            Node::Free => None,
        }
    }

    /// Recomputes placements in document order, splitting each internal
    /// node's rectangle by its axis/ratio. Gap application happens in the
    /// layout strategy layer, not here.
    pub fn compute_layout(&self, bounds: Rect) -> Vec<(XWindow, Rect)> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.layout_node(root, bounds, &mut out);
        }
        out
    }

    fn layout_node(&self, id: NodeId, rect: Rect, out: &mut Vec<(XWindow, Rect)>) {
        match &self.arena[id] {
            Node::Leaf { window, .. } => out.push((*window, rect)),
            Node::Internal { axis, ratio, first, second, .. } => {
                let first_rect = rect.sub_rect(true, *axis, *ratio);
                let second_rect = rect.sub_rect(false, *axis, *ratio);
                let (first, second) = (*first, *second);
                self.layout_node(first, first_rect, out);
                self.layout_node(second, second_rect, out);
            }
            Node::Free => unreachable!(),
        }
    }

    /// Moves focus to the spatial neighbor of the currently focused leaf in
    /// `direction`, given the current layout. Returns the newly focused
    /// window, or `None` if there is no neighbor that way.
    pub fn move_focus(&mut self, direction: Direction, bounds: Rect) -> Option<XWindow> {
        let focused_id = self.find_focused()?;
        let focused_window = self.window_at(focused_id)?;
        let layout = self.compute_layout(bounds);
        let focused_rect = layout.iter().find(|(w, _)| *w == focused_window)?.1;

        let candidates = layout.iter().filter(|(w, _)| *w != focused_window).map(|(w, r)| (w, *r));
        let target = crate::geometry::spatial_neighbor(focused_rect, direction, candidates)?;
        let target_id = self.find_window(*target)?;
        self.focused = Some(target_id);
        Some(*target)
    }

    /// Swaps the focused leaf with its spatial neighbor in `direction` and
    /// keeps focus on the same window, wherever it ended up. Returns the
    /// neighbor window that was swapped with, or `None` if there isn't one.
    pub fn swap_focused_with_neighbor(&mut self, direction: Direction, bounds: Rect) -> Option<XWindow> {
        let focused_id = self.find_focused()?;
        let focused_window = self.window_at(focused_id)?;
        let layout = self.compute_layout(bounds);
        let focused_rect = layout.iter().find(|(w, _)| *w == focused_window)?.1;

        let candidates = layout.iter().filter(|(w, _)| *w != focused_window).map(|(w, r)| (w, *r));
        let neighbor = *crate::geometry::spatial_neighbor(focused_rect, direction, candidates)?;
        self.swap_windows(focused_window, neighbor).ok()?;
        self.focused = self.find_window(focused_window);
        Some(neighbor)
    }

    /// Swaps the two leaves' window handles in place (keeps tree shape,
    /// exchanges content) — used for directional window swapping.
    pub fn swap_windows(&mut self, a: XWindow, b: XWindow) -> Result<(), LayoutError> {
        let a_id = self.find_window(a).ok_or(LayoutError::NoFocusedNode)?;
        let b_id = self.find_window(b).ok_or(LayoutError::NoFocusedNode)?;
        if let Node::Leaf { window, .. } = &mut self.arena[a_id] {
            *window = b;
        }
        if let Node::Leaf { window, .. } = &mut self.arena[b_id] {
            *window = a;
        }
        self.invalidate_cache();
        Ok(())
    }

    /// Adjusts the ratio of the focused leaf's parent split by `delta`,
    /// clamped to `[MIN_RATIO, MAX_RATIO]`.
    pub fn resize_focused(&mut self, delta: f64) -> Result<(), LayoutError> {
        let focused = self.find_focused().ok_or(LayoutError::NoFocusedNode)?;
        let parent = match &self.arena[focused] {
            Node::Leaf { parent, .. } => *parent,
            _ => unreachable!(),
        };
        let parent = parent.ok_or(LayoutError::NoFocusedNode)?;
        if let Node::Internal { ratio, first, .. } = &mut self.arena[parent] {
            let sign = if *first == focused { 1.0 } else { -1.0 };
            *ratio = Self::clamp_ratio(*ratio + sign * delta);
        }
        Ok(())
    }

    /// Flips the split axis of the focused leaf's parent.
    pub fn toggle_split(&mut self) -> Result<(), LayoutError> {
        let focused = self.find_focused().ok_or(LayoutError::NoFocusedNode)?;
        let parent = match &self.arena[focused] {
            Node::Leaf { parent, .. } => *parent,
            _ => unreachable!(),
        };
        let parent = parent.ok_or(LayoutError::NoFocusedNode)?;
        if let Node::Internal { axis, .. } = &mut self.arena[parent] {
            *axis = axis.flipped();
        }
        Ok(())
    }

    pub fn windows(&self) -> Vec<XWindow> {
        self.leaves().into_iter().filter_map(|id| self.window_at(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_are_dual() {
        let mut tree = BSPTree::new();
        tree.insert(1, None);
        tree.insert(2, None);
        tree.insert(3, None);
        assert_eq!(tree.count(), 3);

        tree.remove(2).unwrap();
        assert_eq!(tree.count(), 2);
        assert!(tree.find_window(2).is_none());

        tree.remove(1).unwrap();
        tree.remove(3).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn compute_layout_partitions_bounds_without_gaps() {
        let mut tree = BSPTree::new();
        tree.insert(1, None);
        tree.insert(2, None);
        let bounds = Rect::new(0, 0, 1920, 1080);
        let layout = tree.compute_layout(bounds);
        assert_eq!(layout.len(), 2);
        let total_area: i64 = layout.iter().map(|(_, r)| r.area()).sum();
        assert_eq!(total_area, bounds.area());
    }

    #[test]
    fn resize_respects_ratio_clamp() {
        let mut tree = BSPTree::new();
        tree.insert(1, None);
        tree.insert(2, None);
        for _ in 0..20 {
            tree.resize_focused(0.1).unwrap();
        }
        let bounds = Rect::new(0, 0, 1000, 1000);
        let layout = tree.compute_layout(bounds);
        // second leaf (focused) grows only up to the clamp.
        let second = layout.iter().find(|(w, _)| *w == 2).unwrap().1;
        assert!(second.w as f64 / 1000.0 <= BSPTree::MAX_RATIO + 0.01);
    }

    #[test]
    fn swap_focused_with_neighbor_keeps_focus_on_the_same_window() {
        let mut tree = BSPTree::new();
        tree.insert(1, None);
        tree.insert(2, None);
        let bounds = Rect::new(0, 0, 1920, 1080);
        tree.set_focused(tree.find_window(1).unwrap());
        let neighbor = tree.swap_focused_with_neighbor(Direction::Right, bounds).unwrap();
        assert_eq!(neighbor, 2);
        let layout = tree.compute_layout(bounds);
        let at = |w| layout.iter().find(|(win, _)| *win == w).unwrap().1;
        assert_eq!(at(1), Rect::new(960, 0, 960, 1080));
        assert_eq!(at(2), Rect::new(0, 0, 960, 1080));
        assert_eq!(tree.window_at(tree.find_focused().unwrap()), Some(1));
    }

    #[test]
    fn remove_promotes_sibling_and_keeps_focus_valid() {
        let mut tree = BSPTree::new();
        tree.insert(1, None);
        tree.insert(2, None);
        tree.insert(3, None);
        tree.set_focused(tree.find_window(2).unwrap());
        tree.remove(2).unwrap();
        let focused = tree.find_focused().unwrap();
        assert!(tree.window_at(focused).is_some());
    }
}
