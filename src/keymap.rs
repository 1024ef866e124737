// src/keymap.rs
//
// Externally supplied key -> action table.
//
// The core has no built-in key semantics beyond "panic" and
// "trigger/release with a halftone offset".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An input key, identified by a platform-neutral code.
///
/// Printable keys use their uppercase character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(pub u32);

impl Key {
    pub const ESCAPE: Key = Key(0x1B);

    pub fn code(self) -> u32 {
        self.0
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Key(c.to_ascii_uppercase() as u32)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match char::from_u32(self.0) {
            Some(c) if !c.is_control() => write!(f, "{}", c),
            _ => write!(f, "#{:02X}", self.0),
        }
    }
}

/// What a key press means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Trigger { halftone_offset: i32 },
    Panic,
    Unmapped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    offsets: HashMap<Key, i32>,
    panic_key: Option<Key>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bottom-row layout: B is the reference pitch.
    pub fn standard() -> Self {
        let mut map = Self::new();
        for (c, offset) in [
            ('Z', -7),
            ('X', -5),
            ('C', -3),
            ('V', -2),
            ('B', 0),
            ('N', 2),
            ('M', 3),
            (',', 5),
            ('.', 7),
            ('/', 9),
        ] {
            map.bind(Key::from(c), offset);
        }
        map.set_panic_key(Key::ESCAPE);
        map
    }

    pub fn bind(&mut self, key: Key, halftone_offset: i32) {
        self.offsets.insert(key, halftone_offset);
    }

    pub fn unbind(&mut self, key: Key) {
        self.offsets.remove(&key);
    }

    pub fn set_panic_key(&mut self, key: Key) {
        self.offsets.remove(&key);
        self.panic_key = Some(key);
    }

    pub fn panic_key(&self) -> Option<Key> {
        self.panic_key
    }

    pub fn resolve(&self, key: Key) -> KeyAction {
        if self.panic_key == Some(key) {
            return KeyAction::Panic;
        }
        match self.offsets.get(&key) {
            Some(&halftone_offset) => KeyAction::Trigger { halftone_offset },
            None => KeyAction::Unmapped,
        }
    }
}
