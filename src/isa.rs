use std::fmt;

/// Widen the low `bits` bits of `val` to 16 bits, treating them as two's complement.
///
/// Bits of `val` above the field are ignored, so a whole instruction word may be passed in.
#[inline]
pub fn sign_extend(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    // Sign bit
    let sign = val & (1u16 << (bits - 1));
    // Bits lower than sign bit
    let magnitude = val & ((1u16 << bits) - 1);
    // Positive input: all bits unset; 0x0000
    // Negative input: sign bit and above will be set, lower bits will be reset
    //      Eg. bits=14 -> 0xE000
    let sign_extension = (!sign).wrapping_add(1); // sign * -1
    magnitude | sign_extension
}

/// The 4-bit operation field of an instruction word (bits 15:12).
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    BR,
    ADD,
    LD,
    ST,
    JSR,
    AND,
    LDR,
    STR,
    RTI,
    NOT,
    LDI,
    STI,
    JMP,
    RES,
    LEA,
    TRAP,
}

impl Opcode {
    const TABLE: [Opcode; 16] = [
        Opcode::BR,   // 0x0
        Opcode::ADD,  // 0x1
        Opcode::LD,   // 0x2
        Opcode::ST,   // 0x3
        Opcode::JSR,  // 0x4
        Opcode::AND,  // 0x5
        Opcode::LDR,  // 0x6
        Opcode::STR,  // 0x7
        Opcode::RTI,  // 0x8
        Opcode::NOT,  // 0x9
        Opcode::LDI,  // 0xA
        Opcode::STI,  // 0xB
        Opcode::JMP,  // 0xC
        Opcode::RES,  // 0xD
        Opcode::LEA,  // 0xE
        Opcode::TRAP, // 0xF
    ];

    pub fn of(instr: u16) -> Opcode {
        Self::TABLE[(instr >> 12) as usize]
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Second operand of `ADD` and `AND`, selected by bit 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(u16),
    /// Already sign-extended from 5 bits.
    Imm(u16),
}

/// Jump target of `JSR` (bit 11 set) and `JSRR` (bit 11 clear).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsrTarget {
    /// PC-relative, already sign-extended from 11 bits.
    Offset(u16),
    Reg(u16),
}

/// A decoded instruction word.
///
/// Register fields are always in `0..8`. Offsets and immediates are stored sign-extended to
/// 16 bits, ready for wrapping address arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Branch by `offset` if any of the `nzp` bits match the condition code
    Br { nzp: u16, offset: u16 },
    Add { dr: u16, sr1: u16, src2: Operand },
    Ld { dr: u16, offset: u16 },
    St { sr: u16, offset: u16 },
    /// Save PC into R7 and jump
    Jsr { target: JsrTarget },
    And { dr: u16, sr1: u16, src2: Operand },
    Ldr { dr: u16, base: u16, offset: u16 },
    Str { sr: u16, base: u16, offset: u16 },
    Rti,
    Not { dr: u16, sr: u16 },
    Ldi { dr: u16, offset: u16 },
    Sti { sr: u16, offset: u16 },
    /// Also covers `RET`, as `JMP R7`
    Jmp { base: u16 },
    Res,
    Lea { dr: u16, offset: u16 },
    Trap { vect: u8 },
}

impl Instruction {
    pub fn decode(instr: u16) -> Instruction {
        // Field positions shared by most formats
        let r_high = (instr >> 9) & 0b111;
        let r_mid = (instr >> 6) & 0b111;
        let offset9 = sign_extend(instr, 9);
        let offset6 = sign_extend(instr, 6);

        let src2 = || {
            if instr & 0b100000 == 0 {
                Operand::Reg(instr & 0b111)
            } else {
                Operand::Imm(sign_extend(instr, 5))
            }
        };

        match Opcode::of(instr) {
            Opcode::BR => Instruction::Br {
                nzp: r_high,
                offset: offset9,
            },
            Opcode::ADD => Instruction::Add {
                dr: r_high,
                sr1: r_mid,
                src2: src2(),
            },
            Opcode::LD => Instruction::Ld {
                dr: r_high,
                offset: offset9,
            },
            Opcode::ST => Instruction::St {
                sr: r_high,
                offset: offset9,
            },
            Opcode::JSR => Instruction::Jsr {
                target: if instr & 0x0800 != 0 {
                    JsrTarget::Offset(sign_extend(instr, 11))
                } else {
                    JsrTarget::Reg(r_mid)
                },
            },
            Opcode::AND => Instruction::And {
                dr: r_high,
                sr1: r_mid,
                src2: src2(),
            },
            Opcode::LDR => Instruction::Ldr {
                dr: r_high,
                base: r_mid,
                offset: offset6,
            },
            Opcode::STR => Instruction::Str {
                sr: r_high,
                base: r_mid,
                offset: offset6,
            },
            Opcode::RTI => Instruction::Rti,
            Opcode::NOT => Instruction::Not {
                dr: r_high,
                sr: r_mid,
            },
            Opcode::LDI => Instruction::Ldi {
                dr: r_high,
                offset: offset9,
            },
            Opcode::STI => Instruction::Sti {
                sr: r_high,
                offset: offset9,
            },
            Opcode::JMP => Instruction::Jmp { base: r_mid },
            Opcode::RES => Instruction::Res,
            Opcode::LEA => Instruction::Lea {
                dr: r_high,
                offset: offset9,
            },
            Opcode::TRAP => Instruction::Trap {
                vect: (instr & 0xFF) as u8,
            },
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Br { .. } => Opcode::BR,
            Instruction::Add { .. } => Opcode::ADD,
            Instruction::Ld { .. } => Opcode::LD,
            Instruction::St { .. } => Opcode::ST,
            Instruction::Jsr { .. } => Opcode::JSR,
            Instruction::And { .. } => Opcode::AND,
            Instruction::Ldr { .. } => Opcode::LDR,
            Instruction::Str { .. } => Opcode::STR,
            Instruction::Rti => Opcode::RTI,
            Instruction::Not { .. } => Opcode::NOT,
            Instruction::Ldi { .. } => Opcode::LDI,
            Instruction::Sti { .. } => Opcode::STI,
            Instruction::Jmp { .. } => Opcode::JMP,
            Instruction::Res => Opcode::RES,
            Instruction::Lea { .. } => Opcode::LEA,
            Instruction::Trap { .. } => Opcode::TRAP,
        }
    }
}

/// Offsets are printed as signed decimal literals, the way they would be written in source.
struct Offs(u16);

impl fmt::Display for Offs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 as i16)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "R{r}"),
            Operand::Imm(imm) => write!(f, "{}", Offs(*imm)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Br { nzp, offset } => {
                write!(f, "BR")?;
                for (bit, name) in [(0b100, 'n'), (0b010, 'z'), (0b001, 'p')] {
                    if nzp & bit != 0 {
                        write!(f, "{name}")?;
                    }
                }
                write!(f, " {}", Offs(offset))
            }
            Instruction::Add { dr, sr1, src2 } => write!(f, "ADD R{dr}, R{sr1}, {src2}"),
            Instruction::And { dr, sr1, src2 } => write!(f, "AND R{dr}, R{sr1}, {src2}"),
            Instruction::Not { dr, sr } => write!(f, "NOT R{dr}, R{sr}"),
            Instruction::Jmp { base: 7 } => write!(f, "RET"),
            Instruction::Jmp { base } => write!(f, "JMP R{base}"),
            Instruction::Jsr {
                target: JsrTarget::Offset(offset),
            } => write!(f, "JSR {}", Offs(offset)),
            Instruction::Jsr {
                target: JsrTarget::Reg(base),
            } => write!(f, "JSRR R{base}"),
            Instruction::Ld { dr, offset } => write!(f, "LD R{dr}, {}", Offs(offset)),
            Instruction::Ldi { dr, offset } => write!(f, "LDI R{dr}, {}", Offs(offset)),
            Instruction::Ldr { dr, base, offset } => {
                write!(f, "LDR R{dr}, R{base}, {}", Offs(offset))
            }
            Instruction::Lea { dr, offset } => write!(f, "LEA R{dr}, {}", Offs(offset)),
            Instruction::St { sr, offset } => write!(f, "ST R{sr}, {}", Offs(offset)),
            Instruction::Sti { sr, offset } => write!(f, "STI R{sr}, {}", Offs(offset)),
            Instruction::Str { sr, base, offset } => {
                write!(f, "STR R{sr}, R{base}, {}", Offs(offset))
            }
            Instruction::Trap { vect } => match TrapVect::try_from(vect) {
                Ok(trap) => write!(f, "{trap}"),
                Err(_) => write!(f, "TRAP x{vect:02X}"),
            },
            Instruction::Rti => write!(f, "RTI"),
            Instruction::Res => write!(f, "RES"),
        }
    }
}

/// Service routines reachable through `TRAP`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapVect {
    /// Read a character into R0, without echo
    Getc = 0x20,
    /// Write the character in R0
    Out = 0x21,
    /// Write the string at R0, one character per word
    Puts = 0x22,
    /// Prompt, then read and echo a character into R0
    In = 0x23,
    /// Write the string at R0, two characters per word
    Putsp = 0x24,
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVect {
    type Error = u8;
    fn try_from(vect: u8) -> Result<Self, Self::Error> {
        let trap = match vect {
            0x20 => TrapVect::Getc,
            0x21 => TrapVect::Out,
            0x22 => TrapVect::Puts,
            0x23 => TrapVect::In,
            0x24 => TrapVect::Putsp,
            0x25 => TrapVect::Halt,
            _ => return Err(vect),
        };
        Ok(trap)
    }
}

impl fmt::Display for TrapVect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrapVect::Getc => "GETC",
            TrapVect::Out => "OUT",
            TrapVect::Puts => "PUTS",
            TrapVect::In => "IN",
            TrapVect::Putsp => "PUTSP",
            TrapVect::Halt => "HALT",
        };
        f.write_str(name)
    }
}
