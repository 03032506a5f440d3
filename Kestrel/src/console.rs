// console.rs
//
// 80x25 text screen kept in memory, one per terminal. The platform copies
// the foreground one to VGA memory.

pub const WIDTH: usize = 80;
pub const HEIGHT: usize = 25;
pub const ATTR: u8 = 0x07; // light grey on black

const BLANK: u16 = (ATTR as u16) << 8 | b' ' as u16;

#[derive(Clone)]
pub struct TextScreen {
    cells: [u16; WIDTH * HEIGHT],
    row: usize,
    column: usize,
}

impl TextScreen {
    pub const fn new() -> Self {
        Self {
            cells: [BLANK; WIDTH * HEIGHT],
            row: 0,
            column: 0,
        }
    }

    pub fn put_byte(&mut self, b: u8) {
        match b {
            b'\n' => self.new_line(),
            b'\r' => self.column = 0,
            0x08 => self.backspace(),
            _ => {
                if self.column >= WIDTH {
                    self.new_line();
                }
                self.cells[self.row * WIDTH + self.column] = (ATTR as u16) << 8 | b as u16;
                self.column += 1;
            }
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.put_byte(b);
        }
    }

    fn backspace(&mut self) {
        if self.column == 0 {
            if self.row == 0 {
                return;
            }
            self.row -= 1;
            self.column = WIDTH;
        }
        self.column -= 1;
        self.cells[self.row * WIDTH + self.column] = BLANK;
    }

    fn new_line(&mut self) {
        self.column = 0;
        if self.row + 1 < HEIGHT {
            self.row += 1;
            return;
        }
        // scroll up
        self.cells.copy_within(WIDTH.., 0);
        self.cells[(HEIGHT - 1) * WIDTH..].fill(BLANK);
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    /// (row, column) of the cursor.
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    pub fn char_at(&self, row: usize, column: usize) -> u8 {
        self.cells[row * WIDTH + column] as u8
    }
}

impl Default for TextScreen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_text(s: &TextScreen, row: usize, len: usize) -> std::vec::Vec<u8> {
        (0..len).map(|c| s.char_at(row, c)).collect()
    }

    #[test]
    fn writes_and_wraps() {
        let mut s = TextScreen::new();
        s.write(b"391OS> ls\n");
        assert_eq!(row_text(&s, 0, 9), b"391OS> ls".to_vec());
        assert_eq!(s.cursor(), (1, 0));

        s.write(&[b'x'; WIDTH + 3]);
        assert_eq!(s.cursor(), (2, 3));
    }

    #[test]
    fn backspace_crosses_rows() {
        let mut s = TextScreen::new();
        s.write(&[b'a'; WIDTH]);
        s.write(b"b\x08\x08");
        assert_eq!(s.cursor(), (0, WIDTH - 1));
        assert_eq!(s.char_at(0, WIDTH - 1), b' ');
        assert_eq!(s.char_at(1, 0), b' ');

        let mut s = TextScreen::new();
        s.put_byte(0x08);
        assert_eq!(s.cursor(), (0, 0));
    }

    #[test]
    fn scrolls_at_the_bottom() {
        let mut s = TextScreen::new();
        for i in 0..HEIGHT {
            s.write(&[b'A' + (i % 26) as u8, b'\n']);
        }
        // first line scrolled off
        assert_eq!(s.char_at(0, 0), b'B');
        assert_eq!(s.cursor(), (HEIGHT - 1, 0));
        assert_eq!(s.char_at(HEIGHT - 1, 0), b' ');
    }
}
