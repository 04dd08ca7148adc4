#![allow(dead_code)]
//! Keybinding table (spec C9), grounded on `KeybindManager.hpp`: parses
//! `"MOD1, MOD2, ..., KEY : action"` bindings, grabs each with every
//! NumLock/CapsLock lock-mask variant, and dedups on `(mask, keysym)` —
//! later registrations replace earlier ones rather than stacking grabs.
use std::collections::HashMap;
use std::os::raw::c_uint;

use x11::keysym;
use x11::xlib::{self, Display, Window};

use crate::error::ConfigError;

/// The four lock-mask variants a grab must cover so the binding still fires
/// when NumLock and/or CapsLock are active (`KeybindManager::grabKey`).
pub const LOCK_MASK_VARIANTS: [c_uint; 4] = [0, xlib::LockMask, xlib::Mod2Mask, xlib::LockMask | xlib::Mod2Mask];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub mask: c_uint,
    pub keysym: c_uint,
}

#[derive(Debug, Clone)]
pub struct KeyAction {
    pub verb: String,
    pub args: Vec<String>,
}

fn modifier_from_name(name: &str) -> Result<c_uint, ConfigError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "MOD1" | "ALT" => Ok(xlib::Mod1Mask),
        "MOD4" | "SUPER" | "WIN" => Ok(xlib::Mod4Mask),
        "MOD2" => Ok(xlib::Mod2Mask),
        "MOD3" => Ok(xlib::Mod3Mask),
        "MOD5" => Ok(xlib::Mod5Mask),
        "SHIFT" => Ok(xlib::ShiftMask),
        "CONTROL" | "CTRL" => Ok(xlib::ControlMask),
        other => Err(ConfigError::UnknownModifier(other.to_string())),
    }
}

/// Resolves a textual key name (`"Return"`, `"j"`, `"F1"`) to an X11 keysym
/// by round-tripping through `XStringToKeysym`, which already knows every
/// name in the X keysym database.
fn keysym_from_name(name: &str) -> Result<c_uint, ConfigError> {
    let c_name = std::ffi::CString::new(name.trim()).map_err(|_| ConfigError::UnknownKeyName(name.to_string()))?;
    let sym = unsafe { xlib::XStringToKeysym(c_name.as_ptr()) };
    if sym == xlib::NoSymbol as u64 {
        return Err(ConfigError::UnknownKeyName(name.to_string()));
    }
    Ok(sym as c_uint)
}

/// Parses one config line of the form `"MOD1, Shift, Return : spawn-terminal"`.
pub fn parse_binding(spec: &str) -> Result<(KeyBinding, KeyAction), ConfigError> {
    let (keys_part, action_part) = spec
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidKeybind(spec.to_string()))?;

    let mut tokens: Vec<&str> = keys_part.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
    let key_name = tokens.pop().ok_or_else(|| ConfigError::InvalidKeybind(spec.to_string()))?;

    let mut mask: c_uint = 0;
    for modifier in tokens {
        mask |= modifier_from_name(modifier)?;
    }
    let keysym = keysym_from_name(key_name)?;

    let mut action_tokens = action_part.split_whitespace();
    let verb = action_tokens
        .next()
        .ok_or_else(|| ConfigError::InvalidKeybind(spec.to_string()))?
        .to_string();
    let args = action_tokens.map(str::to_string).collect();

    Ok((KeyBinding { mask, keysym }, KeyAction { verb, args }))
}

/// Holds every parsed binding, deduped by `(mask, keysym)` — registering a
/// binding with the same combination again replaces the previous action
/// rather than producing two live grabs for one key combination.
#[derive(Debug, Default)]
pub struct KeyTable {
    bindings: HashMap<KeyBinding, KeyAction>,
}

impl KeyTable {
    pub fn new() -> Self {
        KeyTable::default()
    }

    pub fn register(&mut self, spec: &str) -> Result<(), ConfigError> {
        let (binding, action) = parse_binding(spec)?;
        self.bindings.insert(binding, action);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn action_for(&self, mask: c_uint, keysym: c_uint) -> Option<&KeyAction> {
        self.bindings.get(&KeyBinding { mask, keysym })
    }

    /// Grabs every registered binding on `window`, covering all four
    /// lock-mask variants so NumLock/CapsLock state never masks a binding.
    pub fn grab_keys(&self, display: *mut Display, window: Window) {
        unsafe {
            xlib::XUngrabKey(display, xlib::AnyKey, xlib::AnyModifier, window);
        }
        for binding in self.bindings.keys() {
            let keycode = unsafe { xlib::XKeysymToKeycode(display, binding.keysym as u64) };
            for lock in LOCK_MASK_VARIANTS {
                unsafe {
                    xlib::XGrabKey(
                        display,
                        keycode as i32,
                        binding.mask | lock,
                        window,
                        xlib::True,
                        xlib::GrabModeAsync,
                        xlib::GrabModeAsync,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binding_rejects_missing_colon() {
        assert!(parse_binding("MOD1, Return").is_err());
    }

    #[test]
    fn parse_binding_rejects_unknown_modifier() {
        let result = parse_binding("FOO, Return : spawn-terminal");
        assert!(matches!(result, Err(ConfigError::UnknownModifier(_))));
    }

    /// Seed scenario S5: registering SUPER+Q -> killactive, then SUPER+Q ->
    /// exit, leaves only `exit` bound to that combination.
    #[test]
    fn s5_later_binding_replaces_earlier_on_same_combination() {
        let mut table = KeyTable::new();
        table.register("SUPER, Q : killactive").unwrap();
        table.register("SUPER, Q : exit").unwrap();
        assert_eq!(table.len(), 1);
        let keysym = keysym_from_name("Q").unwrap();
        assert_eq!(table.action_for(xlib::Mod4Mask, keysym).unwrap().verb, "exit");
    }

    #[test]
    fn key_table_dedups_by_mask_and_keysym() {
        let mut table = KeyTable::new();
        table.bindings.insert(
            KeyBinding { mask: xlib::Mod1Mask, keysym: keysym::XK_Return as c_uint },
            KeyAction { verb: "spawn-terminal".into(), args: vec![] },
        );
        table.bindings.insert(
            KeyBinding { mask: xlib::Mod1Mask, keysym: keysym::XK_Return as c_uint },
            KeyAction { verb: "close-window".into(), args: vec![] },
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.action_for(xlib::Mod1Mask, keysym::XK_Return as c_uint).unwrap().verb, "close-window");
    }
}
