use std::cmp::Ordering;

/// Condition code, set from the last value written to a general purpose register.
///
/// Discriminants match the `nzp` mask of `BR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

impl RunFlag {
    /// Classify a register value, reading bit 15 as the sign.
    pub fn of(val: u16) -> RunFlag {
        match (val as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }
}

/// R0-R7, program counter and condition code.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    /// 8x 16-bit registers
    reg: [u16; 8],
    /// Program counter
    pc: u16,
    /// `None` until the first flag-setting instruction
    flag: Option<RunFlag>,
}

impl RegisterFile {
    pub fn new(pc: u16) -> Self {
        Self {
            pc,
            ..Default::default()
        }
    }

    #[inline]
    pub fn get(&self, reg: u16) -> u16 {
        self.reg[(reg & 0b111) as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: u16, val: u16) {
        self.reg[(reg & 0b111) as usize] = val;
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn flag(&self) -> Option<RunFlag> {
        self.flag
    }

    /// Recompute the condition code from the current value of `reg`.
    ///
    /// Must be called once by every instruction which writes a general purpose register, and by
    /// no other instruction.
    pub fn update_flags(&mut self, reg: u16) {
        self.flag = Some(RunFlag::of(self.get(reg)));
    }

    /// Whether any bit of a `BR` mask matches the current condition code.
    pub fn matches(&self, nzp: u16) -> bool {
        self.flag.is_some_and(|flag| flag as u16 & nzp != 0)
    }
}
