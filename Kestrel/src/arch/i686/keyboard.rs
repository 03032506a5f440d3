// arch/i686/keyboard.rs
//
// Scan code set 1 to bytes. F1-F3 pick the terminal on display.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};
use spin::Mutex;

lazy_static! {
    static ref KEYBOARD: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> =
        Mutex::new(Keyboard::new(layouts::Us104Key, ScancodeSet1, HandleControl::Ignore));
}

pub enum Key {
    Byte(u8),
    Terminal(usize),
}

/// Feed one scan code; `None` until a whole key press has been seen.
pub fn decode(scancode: u8) -> Option<Key> {
    let mut keyboard = KEYBOARD.lock();
    let event = keyboard.add_byte(scancode).ok()??;
    match keyboard.process_keyevent(event)? {
        DecodedKey::Unicode('\r') => Some(Key::Byte(b'\n')),
        DecodedKey::Unicode(ch) if ch.is_ascii() => Some(Key::Byte(ch as u8)),
        DecodedKey::RawKey(KeyCode::F1) => Some(Key::Terminal(0)),
        DecodedKey::RawKey(KeyCode::F2) => Some(Key::Terminal(1)),
        DecodedKey::RawKey(KeyCode::F3) => Some(Key::Terminal(2)),
        _ => None,
    }
}
