use crate::console::Console;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Keyboard status register. Bit 15 is set while a character is waiting in [`KBDR`].
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// Flat word-addressed memory, with memory-mapped keyboard registers.
pub struct Memory {
    mem: Box<[u16]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            mem: vec![0; MEMORY_MAX].into_boxed_slice(),
        }
    }

    /// Read a word as the running program sees it.
    ///
    /// Reading [`KBSR`] polls `console` first. A waiting character is consumed into [`KBDR`].
    /// Failure to read that character is treated as no key being pressed.
    pub fn read<C>(&mut self, addr: u16, console: &mut C) -> u16
    where
        C: Console + ?Sized,
    {
        if addr == KBSR {
            match poll_key(console) {
                Some(ch) => {
                    self.write(KBSR, 1 << 15);
                    self.write(KBDR, ch as u16);
                }
                None => self.write(KBSR, 0),
            }
        }
        self.peek(addr)
    }

    /// Read a word with no device side effects.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.mem[addr as usize]
    }

    /// Any address is writable, including device registers.
    #[inline]
    pub fn write(&mut self, addr: u16, val: u16) {
        self.mem[addr as usize] = val;
    }

    /// Copy `words` into memory starting at `orig`.
    ///
    /// Panics if the words would extend past the end of memory; callers validate bounds first.
    pub fn copy_from(&mut self, orig: u16, words: &[u16]) {
        let orig = orig as usize;
        self.mem[orig..orig + words.len()].copy_from_slice(words);
    }
}

fn poll_key<C>(console: &mut C) -> Option<u8>
where
    C: Console + ?Sized,
{
    if !console.key_available() {
        return None;
    }
    console.read_char().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;

    #[test]
    fn plain_addresses_read_back() {
        let mut mem = Memory::new();
        let mut console = BufferConsole::default();
        mem.write(0x3000, 0xBEEF);
        mem.write(0xFFFF, 7);
        assert_eq!(mem.read(0x3000, &mut console), 0xBEEF);
        assert_eq!(mem.read(0xFFFF, &mut console), 7);
        assert_eq!(mem.read(0x0000, &mut console), 0);
    }

    #[test]
    fn kbsr_reports_pending_key() {
        let mut mem = Memory::new();
        let mut console = BufferConsole::new("q");
        assert_eq!(mem.read(KBSR, &mut console), 0x8000);
        assert_eq!(mem.read(KBDR, &mut console), b'q' as u16);
        // Key was consumed by the first poll
        assert_eq!(mem.read(KBSR, &mut console), 0);
        assert_eq!(mem.peek(KBDR), b'q' as u16);
    }

    #[test]
    fn kbsr_clears_without_key() {
        let mut mem = Memory::new();
        let mut console = BufferConsole::default();
        mem.write(KBSR, 0xFFFF);
        assert_eq!(mem.read(KBSR, &mut console), 0);
    }

    #[test]
    fn kbdr_read_does_not_poll() {
        let mut mem = Memory::new();
        let mut console = BufferConsole::new("z");
        assert_eq!(mem.read(KBDR, &mut console), 0);
        assert_eq!(console.remaining_input(), 1);
    }

    #[test]
    fn copy_reaches_last_cell() {
        let mut mem = Memory::new();
        mem.copy_from(0xFFFE, &[1, 2]);
        assert_eq!(mem.peek(0xFFFE), 1);
        assert_eq!(mem.peek(0xFFFF), 2);
    }
}
