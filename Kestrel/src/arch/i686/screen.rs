// arch/i686/screen.rs
//
// VGA text mode. Every terminal draws into its own `TextScreen`; the one on
// display is copied to 0xB8000 after each write.

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use super::io::Port;
use crate::console::{TextScreen, HEIGHT, WIDTH};
use crate::memory::VIDEO_PHYS;
use crate::terminal::MAX_TERMINALS;

const BUFFER: *mut u16 = VIDEO_PHYS as usize as *mut u16;
const CRTC_INDEX: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;

static SCREENS: Mutex<[TextScreen; MAX_TERMINALS]> =
    Mutex::new([TextScreen::new(), TextScreen::new(), TextScreen::new()]);
static SHOWN: AtomicUsize = AtomicUsize::new(0);

pub fn put_bytes(terminal: usize, bytes: &[u8]) {
    let mut screens = SCREENS.lock();
    let Some(screen) = screens.get_mut(terminal) else {
        return;
    };
    screen.write(bytes);
    if terminal == SHOWN.load(Ordering::SeqCst) {
        draw(screen);
    }
}

/// Put `terminal` on the display.
pub fn show(terminal: usize) {
    let screens = SCREENS.lock();
    if let Some(screen) = screens.get(terminal) {
        SHOWN.store(terminal, Ordering::SeqCst);
        draw(screen);
    }
}

fn draw(screen: &TextScreen) {
    for (i, &cell) in screen.cells().iter().enumerate() {
        unsafe { ptr::write_volatile(BUFFER.add(i), cell) };
    }
    let (row, column) = screen.cursor();
    move_cursor((row * WIDTH + column).min(WIDTH * HEIGHT - 1) as u16);
}

fn move_cursor(pos: u16) {
    let [lo, hi] = pos.to_le_bytes();
    let mut index = Port::new(CRTC_INDEX);
    let mut data = Port::new(CRTC_DATA);
    unsafe {
        index.write(0x0F);
        data.write(lo);
        index.write(0x0E);
        data.write(hi);
    }
}
