use std::io;

use super::{RunState, Status};
use crate::console::Console;
use crate::error::Fault;
use crate::isa::TrapVect;
use crate::memory::Memory;

/// Written by `IN` before reading a character.
const IN_PROMPT: u8 = b' ';
/// Written by `HALT` before stopping.
const HALT_NOTICE: &str = "\nHalted\n";

impl<C: Console> RunState<C> {
    /// Run the service routine for `vect`. R7 and the condition code are left untouched.
    pub(super) fn trap(&mut self, vect: u8, addr: u16) -> Result<(), Fault> {
        let trap =
            TrapVect::try_from(vect).map_err(|vect| Fault::UnknownTrap { vect, addr })?;
        self.service(trap)
            .map_err(|source| Fault::Console { trap, addr, source })
    }

    fn service(&mut self, trap: TrapVect) -> io::Result<()> {
        match trap {
            TrapVect::Getc => {
                let ch = self.console.read_char()?;
                self.reg.set(0, ch as u16);
            }
            TrapVect::Out => {
                let ch = (self.reg.get(0) & 0xFF) as u8;
                self.console.write_char(ch)?;
                self.console.flush()?;
            }
            TrapVect::Puts => {
                for cell in string_cells(&self.mem, self.reg.get(0)) {
                    self.console.write_char((cell & 0xFF) as u8)?;
                }
                self.console.flush()?;
            }
            TrapVect::In => {
                self.console.write_char(IN_PROMPT)?;
                self.console.flush()?;
                let ch = self.console.read_char()?;
                self.console.write_char(ch)?;
                self.console.flush()?;
                self.reg.set(0, ch as u16);
            }
            TrapVect::Putsp => {
                for cell in string_cells(&self.mem, self.reg.get(0)) {
                    // Low byte first; a zero high byte pads an odd-length string
                    self.console.write_char((cell & 0xFF) as u8)?;
                    let high = (cell >> 8) as u8;
                    if high != 0 {
                        self.console.write_char(high)?;
                    }
                }
                self.console.flush()?;
            }
            TrapVect::Halt => {
                self.console.write_str(HALT_NOTICE)?;
                self.console.flush()?;
                self.status = Status::Halted;
            }
        }
        Ok(())
    }
}

/// Cells from `start` up to, not including, the first zero cell.
///
/// Stops after one full pass of memory if no zero cell exists.
fn string_cells(mem: &Memory, start: u16) -> impl Iterator<Item = u16> + '_ {
    (0..=u16::MAX)
        .map(move |i| mem.peek(start.wrapping_add(i)))
        .take_while(|&cell| cell != 0)
}
