//! Layout subsystem: the BSP arena tree (C2) and the pluggable layout
//! strategies that compute placements from it (C3).
pub mod strategies;
pub mod tree;

pub use strategies::{GapConfig, LayoutKind};
pub use tree::{BSPTree, InsertMode, SplitAxis};
