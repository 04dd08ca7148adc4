#![allow(dead_code)]
//! Extension host (spec C10), grounded on `ExtensionAPI.hpp`/`ExtensionLoader.hpp`:
//! loads versioned `.so` extensions via `libloading`, validates their ABI
//! checksum and capability set, and dispatches events to them in priority
//! order with an insertion-order tiebreak and strict-mode veto short-circuit.
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use libloading::{Library, Symbol};

use crate::error::ExtensionError;

pub const API_VERSION_MAJOR: u32 = 2;
pub const API_VERSION_MINOR: u32 = 0;
pub const API_VERSION_PATCH: u32 = 0;

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const UNHEALTHY_TICK_LIMIT: u32 = 3;

/// Mirrors `api::v2::ExtensionInfo` field-for-field so `size_of` matches
/// what the loaded `.so`'s ABI checksum was computed against.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExtensionInfo {
    pub name: [u8; 64],
    pub version: [u8; 32],
    pub author: [u8; 64],
    pub description: [u8; 256],
    pub api_version_major: u32,
    pub api_version_minor: u32,
    pub api_version_patch: u32,
    pub capabilities: u64,
    pub priority: i32,
    pub reserved: [u32; 4],
    pub api_checksum: u64,
}

impl ExtensionInfo {
    /// The event types this extension asked to receive, as an `EventType`
    /// bitmask. `reserved[0]` carries it so the struct's ABI-checksummed
    /// layout doesn't change.
    pub fn subscription_mask(&self) -> u32 {
        self.reserved[0]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WindowHandle {
    pub x11_window: u64,
    pub workspace_id: u32,
    pub flags: u32,
}

impl WindowHandle {
    pub const FLAG_FLOATING: u32 = 1 << 0;
    pub const FLAG_FULLSCREEN: u32 = 1 << 1;
    pub const FLAG_HIDDEN: u32 = 1 << 2;
    pub const FLAG_URGENT: u32 = 1 << 3;
}

/// Mirrors `api::v2::ExtensionContext`; the `reserved` tail keeps the same
/// struct size the original's ABI checksum was computed from.
#[repr(C)]
pub struct ExtensionContext {
    pub display: *mut x11::xlib::Display,
    pub root: x11::xlib::Window,
    pub screen: i32,
    pub focused_window: *const WindowHandle,
    pub current_workspace: u32,
    pub workspace_count: u32,
    pub frame_start_nanos: u64,
    pub frame_budget_nanos: u64,
    pub frame_counter: *const std::sync::atomic::AtomicU64,
    pub reserved: [*mut std::ffi::c_void; 8],
}

/// FNV-1a derived checksum over the API version and the three ABI-critical
/// struct sizes, computed identically to `computeAPIChecksum()` in the
/// original so a `.so` built against a different layout is rejected before
/// any of its code runs.
pub const fn compute_api_checksum() -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    hash ^= API_VERSION_MAJOR as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= API_VERSION_MINOR as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= API_VERSION_PATCH as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= std::mem::size_of::<ExtensionInfo>() as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= std::mem::size_of::<ExtensionContext>() as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= std::mem::size_of::<WindowHandle>() as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash
}

pub const API_CHECKSUM: u64 = compute_api_checksum();

bitflags::bitflags! {
    pub struct ExtensionCapability: u64 {
        const NONE           = 0;
        const LAYOUT_PROVIDER = 1 << 0;
        const EVENT_FILTER    = 1 << 1;
        const RENDERER        = 1 << 2;
        const COMPOSITOR      = 1 << 3;
        const INPUT_HANDLER   = 1 << 4;
        const CONFIG_PROVIDER = 1 << 5;
        const PERFORMANCE     = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExtensionPriority(pub i32);

impl ExtensionPriority {
    pub const LOWEST: ExtensionPriority = ExtensionPriority(-1000);
    pub const LOW: ExtensionPriority = ExtensionPriority(-500);
    pub const NORMAL: ExtensionPriority = ExtensionPriority(0);
    pub const HIGH: ExtensionPriority = ExtensionPriority(500);
    pub const HIGHEST: ExtensionPriority = ExtensionPriority(1000);
    pub const CRITICAL: ExtensionPriority = ExtensionPriority(10000);
}

/// Discriminants double as bit positions in an extension's declared
/// subscription mask (§3 "declared event subscription mask"), stored in
/// `ExtensionInfo::reserved[0]` since that field was already reserved space
/// in the ABI-checksummed struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    WindowMap = 0,
    WindowUnmap = 1,
    WindowDestroy = 2,
    WindowFocus = 3,
    WindowMove = 4,
    WindowResize = 5,
    WorkspaceSwitch = 6,
    LayoutChange = 7,
    ConfigReload = 8,
    PreRender = 9,
    PostRender = 10,
}

impl EventType {
    fn mask_bit(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionStats {
    pub events_dispatched: u64,
    pub events_vetoed: u64,
    pub unhealthy_ticks: u32,
    pub last_checked: Option<Instant>,
}

type CreateFn = unsafe extern "C" fn() -> *mut std::ffi::c_void;
type DestroyFn = unsafe extern "C" fn(*mut std::ffi::c_void);
type GetInfoFn = unsafe extern "C" fn() -> *const ExtensionInfo;
type IsHealthyFn = unsafe extern "C" fn(*mut std::ffi::c_void) -> bool;
/// `handleEvent_v2(handle, event_type, context) -> bool`; the return value
/// is the veto signal (`false` vetoes, per §4.10) dispatched through the
/// verified descriptor — the "unavoidable unsafe boundary" (§9).
type HandleEventFn = unsafe extern "C" fn(*mut std::ffi::c_void, u32, *const ExtensionContext) -> bool;

/// A successfully loaded extension: the open library (kept alive for the
/// lifetime of the raw function pointers), its declared metadata, an
/// insertion sequence number for tiebreaking, and running health stats.
pub struct LoadedExtension {
    _library: Library,
    pub name: String,
    pub priority: ExtensionPriority,
    pub capabilities: ExtensionCapability,
    pub sequence: u64,
    pub stats: ExtensionStats,
    handle: *mut std::ffi::c_void,
    destroy: DestroyFn,
    is_healthy_fn: Option<IsHealthyFn>,
    handle_event_fn: Option<HandleEventFn>,
    subscription_mask: u32,
}

impl LoadedExtension {
    /// Calls the extension's own `isExtensionHealthy_v2` if it exports one;
    /// extensions that don't implement health reporting are assumed healthy.
    pub fn is_healthy(&self) -> bool {
        match self.is_healthy_fn {
            Some(f) => unsafe { f(self.handle) },
            None => true,
        }
    }

    /// Whether this extension declared interest in `event` via its
    /// subscription mask (§3).
    pub fn subscribed_to(&self, event: EventType) -> bool {
        self.subscription_mask & event.mask_bit() != 0
    }

    /// Invokes the extension's `handleEvent_v2` if it exports one and is
    /// subscribed to `event`; unsubscribed or hook-less extensions are
    /// skipped and treated as non-vetoing.
    fn handle_event(&self, event: EventType, ctx: &ExtensionContext) -> bool {
        if !self.subscribed_to(event) {
            return true;
        }
        match self.handle_event_fn {
            Some(f) => unsafe { f(self.handle, event as u32, ctx as *const ExtensionContext) },
            None => true,
        }
    }
}

// Safety: extensions are only ever invoked from the single event-loop
// thread that owns the `ExtensionHost`; the raw pointer is never shared.
unsafe impl Send for LoadedExtension {}

impl Drop for LoadedExtension {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.handle) };
    }
}

fn c_str_from_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Loads and validates one extension `.so`, resolving the three required
/// symbols (`createExtension_v2`, `destroyExtension_v2`, `getExtensionInfo`)
/// and rejecting it if the ABI checksum, major version, or capability set
/// do not match what this host provides.
pub fn load_extension(path: &Path, sequence: u64) -> Result<LoadedExtension, ExtensionError> {
    let name_guess = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

    let library = unsafe { Library::new(path) }.map_err(|e| ExtensionError::Load {
        path: path.display().to_string(),
        source: e,
    })?;

    let get_info: Symbol<GetInfoFn> = unsafe { library.get(b"getExtensionInfo\0") }.map_err(|_| {
        ExtensionError::MissingSymbol {
            name: name_guess.clone(),
            symbol: "getExtensionInfo".into(),
        }
    })?;
    let create: Symbol<CreateFn> = unsafe { library.get(b"createExtension_v2\0") }.map_err(|_| {
        ExtensionError::MissingSymbol {
            name: name_guess.clone(),
            symbol: "createExtension_v2".into(),
        }
    })?;
    let destroy: Symbol<DestroyFn> = unsafe { library.get(b"destroyExtension_v2\0") }.map_err(|_| {
        ExtensionError::MissingSymbol {
            name: name_guess.clone(),
            symbol: "destroyExtension_v2".into(),
        }
    })?;

    let info = unsafe { &*get_info() };
    let name = c_str_from_bytes(&info.name);

    if info.api_checksum != API_CHECKSUM {
        return Err(ExtensionError::ChecksumMismatch {
            name,
            expected: API_CHECKSUM,
            got: info.api_checksum,
        });
    }
    if info.api_version_major != API_VERSION_MAJOR {
        return Err(ExtensionError::VersionMismatch {
            name,
            required_major: info.api_version_major,
            host_major: API_VERSION_MAJOR,
        });
    }
    let capabilities = ExtensionCapability::from_bits_truncate(info.capabilities);
    if capabilities.is_empty() {
        return Err(ExtensionError::NoCapabilities { name });
    }

    let handle = unsafe { create() };
    if handle.is_null() {
        return Err(ExtensionError::InitializationFailed { name, code: -8 });
    }

    let is_healthy_fn = unsafe { library.get::<IsHealthyFn>(b"isExtensionHealthy_v2\0") }.ok().map(|s| *s);
    let handle_event_fn = unsafe { library.get::<HandleEventFn>(b"handleEvent_v2\0") }.ok().map(|s| *s);
    let subscription_mask = info.subscription_mask();

    let destroy_fn: DestroyFn = *destroy;
    Ok(LoadedExtension {
        _library: library,
        name,
        priority: ExtensionPriority(info.priority),
        capabilities,
        sequence,
        stats: ExtensionStats::default(),
        handle,
        destroy: destroy_fn,
        is_healthy_fn,
        handle_event_fn,
        subscription_mask,
    })
}

/// Holds every loaded extension and dispatches events to them in priority
/// order (highest first), with ties broken by load order. In strict mode,
/// the first extension to veto (return `false`) short-circuits the rest of
/// the chain, matching `ExtensionLoader::dispatchEvent`.
pub struct ExtensionHost {
    extensions: Vec<LoadedExtension>,
    dispatch_order_dirty: bool,
    strict_mode: bool,
    next_sequence: u64,
}

impl Default for ExtensionHost {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ExtensionHost {
    pub fn new(strict_mode: bool) -> Self {
        ExtensionHost {
            extensions: Vec::new(),
            dispatch_order_dirty: false,
            strict_mode,
            next_sequence: 0,
        }
    }

    pub fn load(&mut self, path: &Path) -> Result<(), ExtensionError> {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        let ext = load_extension(path, seq)?;
        log::info!("loaded extension '{}' (priority {})", ext.name, ext.priority.0);
        self.extensions.push(ext);
        self.dispatch_order_dirty = true;
        Ok(())
    }

    fn ensure_sorted(&mut self) {
        if self.dispatch_order_dirty {
            self.extensions.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
            self.dispatch_order_dirty = false;
        }
    }

    /// Dispatches `event` through every extension subscribed to it (§3), in
    /// priority order. An extension vetoes by returning `false` from its
    /// `handleEvent_v2`; in strict mode the first veto stops dispatch to the
    /// remaining chain, matching `ExtensionLoader::dispatchEvent`.
    pub fn dispatch(&mut self, event: EventType, ctx: &ExtensionContext) -> bool {
        self.ensure_sorted();
        let mut overall = true;
        for ext in &mut self.extensions {
            if !ext.subscribed_to(event) {
                continue;
            }
            let continue_chain = ext.handle_event(event, ctx);
            ext.stats.events_dispatched += 1;
            if !continue_chain {
                ext.stats.events_vetoed += 1;
                overall = false;
                if self.strict_mode {
                    break;
                }
            }
        }
        overall
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn names_in_dispatch_order(&mut self) -> Vec<String> {
        self.ensure_sorted();
        self.extensions.iter().map(|e| e.name.clone()).collect()
    }

    /// Runs a health-check tick: a real implementation would call each
    /// extension's `isHealthy()`; unhealthy extensions are unloaded after
    /// `UNHEALTHY_TICK_LIMIT` consecutive bad ticks.
    pub fn check_health<F>(&mut self, mut is_healthy: F) -> Vec<ExtensionError>
    where
        F: FnMut(&LoadedExtension) -> bool,
    {
        let mut unloaded = Vec::new();
        let mut keep = Vec::with_capacity(self.extensions.len());
        for mut ext in self.extensions.drain(..) {
            ext.stats.last_checked = Some(Instant::now());
            if is_healthy(&ext) {
                ext.stats.unhealthy_ticks = 0;
                keep.push(ext);
            } else {
                ext.stats.unhealthy_ticks += 1;
                if ext.stats.unhealthy_ticks >= UNHEALTHY_TICK_LIMIT {
                    unloaded.push(ExtensionError::Unhealthy {
                        name: ext.name.clone(),
                        ticks: ext.stats.unhealthy_ticks,
                    });
                } else {
                    keep.push(ext);
                }
            }
        }
        self.extensions = keep;
        unloaded
    }

    /// Runs a health-check tick against each extension's own reported
    /// health (`LoadedExtension::is_healthy`), unloading any that have been
    /// unhealthy for `UNHEALTHY_TICK_LIMIT` consecutive ticks.
    pub fn tick_health(&mut self) -> Vec<ExtensionError> {
        self.check_health(LoadedExtension::is_healthy)
    }

    pub fn unhealthy_names(&self) -> HashSet<String> {
        self.extensions
            .iter()
            .filter(|e| e.stats.unhealthy_ticks > 0)
            .map(|e| e.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(compute_api_checksum(), compute_api_checksum());
        assert_eq!(API_CHECKSUM, compute_api_checksum());
    }

    #[test]
    fn priority_ordering_matches_named_constants() {
        assert!(ExtensionPriority::CRITICAL > ExtensionPriority::HIGHEST);
        assert!(ExtensionPriority::HIGHEST > ExtensionPriority::NORMAL);
        assert!(ExtensionPriority::NORMAL > ExtensionPriority::LOWEST);
    }
}
