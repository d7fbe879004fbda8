use std::io::Read;

use log::{debug, trace, warn};

use crate::console::Console;
use crate::error::{Fault, LoadError};
use crate::isa::{Instruction, JsrTarget, Operand};
use crate::loader::Image;
use crate::memory::Memory;
use crate::registers::RegisterFile;

mod trap;

/// Address of the first instruction executed, regardless of image origins.
pub const PC_START: u16 = 0x3000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

/// Represents complete program state during runtime.
pub struct RunState<C: Console> {
    /// System memory - 128KB in size.
    mem: Memory,
    reg: RegisterFile,
    console: C,
    status: Status,
}

impl<C: Console> RunState<C> {
    pub fn new(console: C) -> Self {
        Self {
            mem: Memory::new(),
            reg: RegisterFile::new(PC_START),
            console,
            status: Status::Running,
        }
    }

    /// Load an image stream into memory at the origin given by its first word.
    ///
    /// Memory is left untouched if the stream is invalid.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), LoadError> {
        let image = Image::read_from(reader)?;
        self.load_image(&image);
        Ok(())
    }

    pub fn load_image(&mut self, image: &Image) {
        debug!(
            "loading {} words at 0x{:04x}",
            image.len(),
            image.orig()
        );
        image.load_into(&mut self.mem);
    }

    /// Run until `HALT` or a fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        debug!("running from 0x{:04x}", self.reg.pc());
        while self.step()? == Status::Running {}
        debug!("halted at 0x{:04x}", self.reg.pc());
        Ok(())
    }

    /// Execute one instruction. Does nothing once halted.
    ///
    /// A fault halts the machine before it is returned.
    pub fn step(&mut self) -> Result<Status, Fault> {
        if self.status == Status::Halted {
            return Ok(Status::Halted);
        }

        let addr = self.reg.pc();
        let word = self.mem.read(addr, &mut self.console);
        // PC incremented before instruction is performed
        self.reg.set_pc(addr.wrapping_add(1));

        let instr = Instruction::decode(word);
        trace!("0x{addr:04x}: {word:04x}  {instr}");

        if let Err(fault) = self.execute(instr, word, addr) {
            warn!("{fault}");
            self.status = Status::Halted;
            return Err(fault);
        }
        Ok(self.status)
    }

    fn execute(&mut self, instr: Instruction, word: u16, addr: u16) -> Result<(), Fault> {
        match instr {
            Instruction::Br { nzp, offset } => self.br(nzp, offset),
            Instruction::Add { dr, sr1, src2 } => self.add(dr, sr1, src2),
            Instruction::Ld { dr, offset } => self.ld(dr, offset),
            Instruction::St { sr, offset } => self.st(sr, offset),
            Instruction::Jsr { target } => self.jsr(target),
            Instruction::And { dr, sr1, src2 } => self.and(dr, sr1, src2),
            Instruction::Ldr { dr, base, offset } => self.ldr(dr, base, offset),
            Instruction::Str { sr, base, offset } => self.str(sr, base, offset),
            Instruction::Not { dr, sr } => self.not(dr, sr),
            Instruction::Ldi { dr, offset } => self.ldi(dr, offset),
            Instruction::Sti { sr, offset } => self.sti(sr, offset),
            Instruction::Jmp { base } => self.jmp(base),
            Instruction::Lea { dr, offset } => self.lea(dr, offset),
            Instruction::Trap { vect } => self.trap(vect, addr)?,
            Instruction::Rti | Instruction::Res => {
                return Err(Fault::ReservedOpcode {
                    opcode: instr.opcode(),
                    instr: word,
                    addr,
                })
            }
        }
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.reg
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.reg
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    #[inline]
    fn mem_read(&mut self, addr: u16) -> u16 {
        self.mem.read(addr, &mut self.console)
    }

    #[inline]
    fn pc_relative(&self, offset: u16) -> u16 {
        self.reg.pc().wrapping_add(offset)
    }

    #[inline]
    fn operand(&self, src2: Operand) -> u16 {
        match src2 {
            Operand::Reg(sr2) => self.reg.get(sr2),
            Operand::Imm(imm) => imm,
        }
    }

    /// Write a general purpose register, then set the condition code from it.
    #[inline]
    fn set_reg(&mut self, dr: u16, val: u16) {
        self.reg.set(dr, val);
        self.reg.update_flags(dr);
    }

    fn add(&mut self, dr: u16, sr1: u16, src2: Operand) {
        let res = self.reg.get(sr1).wrapping_add(self.operand(src2));
        self.set_reg(dr, res);
    }

    fn and(&mut self, dr: u16, sr1: u16, src2: Operand) {
        let res = self.reg.get(sr1) & self.operand(src2);
        self.set_reg(dr, res);
    }

    fn not(&mut self, dr: u16, sr: u16) {
        let res = !self.reg.get(sr);
        self.set_reg(dr, res);
    }

    fn br(&mut self, nzp: u16, offset: u16) {
        if self.reg.matches(nzp) {
            let target = self.pc_relative(offset);
            self.reg.set_pc(target);
        }
    }

    fn jmp(&mut self, base: u16) {
        let target = self.reg.get(base);
        self.reg.set_pc(target);
    }

    fn jsr(&mut self, target: JsrTarget) {
        // Read base register before R7 is overwritten, for `JSRR R7`
        let target = match target {
            JsrTarget::Offset(offset) => self.pc_relative(offset),
            JsrTarget::Reg(base) => self.reg.get(base),
        };
        self.reg.set(7, self.reg.pc());
        self.reg.set_pc(target);
    }

    fn ld(&mut self, dr: u16, offset: u16) {
        let val = self.mem_read(self.pc_relative(offset));
        self.set_reg(dr, val);
    }

    fn ldi(&mut self, dr: u16, offset: u16) {
        let ptr = self.mem_read(self.pc_relative(offset));
        let val = self.mem_read(ptr);
        self.set_reg(dr, val);
    }

    fn ldr(&mut self, dr: u16, base: u16, offset: u16) {
        let ptr = self.reg.get(base).wrapping_add(offset);
        let val = self.mem_read(ptr);
        self.set_reg(dr, val);
    }

    fn lea(&mut self, dr: u16, offset: u16) {
        let val = self.pc_relative(offset);
        self.set_reg(dr, val);
    }

    fn st(&mut self, sr: u16, offset: u16) {
        let val = self.reg.get(sr);
        self.mem.write(self.pc_relative(offset), val);
    }

    fn sti(&mut self, sr: u16, offset: u16) {
        let val = self.reg.get(sr);
        let ptr = self.mem_read(self.pc_relative(offset));
        self.mem.write(ptr, val);
    }

    fn str(&mut self, sr: u16, base: u16, offset: u16) {
        let val = self.reg.get(sr);
        let ptr = self.reg.get(base).wrapping_add(offset);
        self.mem.write(ptr, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;
    use crate::memory::{KBDR, KBSR};
    use crate::registers::RunFlag;

    /// Machine with `program` placed at the start address.
    fn run_state(program: &[u16]) -> RunState<BufferConsole> {
        run_state_with_input(program, "")
    }

    fn run_state_with_input(program: &[u16], input: &str) -> RunState<BufferConsole> {
        let mut state = RunState::new(BufferConsole::new(input));
        let image = Image::new(PC_START, program.to_vec()).unwrap();
        state.load_image(&image);
        state
    }

    #[test]
    fn add_immediate() {
        // ADD R1, R2, #-1
        let mut state = run_state(&[0x12BF]);
        state.registers_mut().set(2, 5);
        state.step().unwrap();
        assert_eq!(state.registers().get(1), 4);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
        assert_eq!(state.registers().pc(), 0x3001);
    }

    #[test]
    fn add_register_wraps() {
        // ADD R0, R0, R1
        let mut state = run_state(&[0x1001]);
        state.registers_mut().set(0, 0x7FFF);
        state.registers_mut().set(1, 1);
        state.step().unwrap();
        assert_eq!(state.registers().get(0), 0x8000);
        assert_eq!(state.registers().flag(), Some(RunFlag::N));
    }

    #[test]
    fn and_register() {
        // AND R1, R2, R3
        let mut state = run_state(&[0x5283]);
        state.registers_mut().set(2, 0xFFFF);
        state.registers_mut().set(3, 0x00F0);
        state.step().unwrap();
        assert_eq!(state.registers().get(1), 0x00F0);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
    }

    #[test]
    fn and_immediate_clears() {
        // AND R0, R0, #0
        let mut state = run_state(&[0x5020]);
        state.registers_mut().set(0, 0x1234);
        state.step().unwrap();
        assert_eq!(state.registers().get(0), 0);
        assert_eq!(state.registers().flag(), Some(RunFlag::Z));
    }

    #[test]
    fn not_complements() {
        // NOT R4, R5
        let mut state = run_state(&[0x997F]);
        state.registers_mut().set(5, 0x00FF);
        state.step().unwrap();
        assert_eq!(state.registers().get(4), 0xFF00);
        assert_eq!(state.registers().flag(), Some(RunFlag::N));
    }

    #[test]
    fn branch_taken_on_matching_flag() {
        // ADD R0, R0, #-1 ; BRn #2
        let mut state = run_state(&[0x103F, 0x0802]);
        state.step().unwrap();
        assert_eq!(state.registers().flag(), Some(RunFlag::N));
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x3004);
    }

    #[test]
    fn branch_not_taken_on_other_flag() {
        // ADD R0, R0, #1 ; BRn #2
        let mut state = run_state(&[0x1021, 0x0802]);
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x3002);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
    }

    #[test]
    fn branch_backwards() {
        // ADD R0, R0, #0 ; BRz #-2
        let mut state = run_state(&[0x1020, 0x05FE]);
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x3000);
    }

    #[test]
    fn branch_never_taken_before_first_flag() {
        // BRnzp #5
        let mut state = run_state(&[0x0E05]);
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x3001);
    }

    #[test]
    fn jmp_and_ret() {
        // JMP R3 ; ... ; RET
        let mut state = run_state(&[0xC0C0]);
        state.registers_mut().set(3, 0x4000);
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x4000);

        state.memory_mut().write(0x4000, 0xC1C0);
        state.registers_mut().set(7, 0x3456);
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x3456);
        assert_eq!(state.registers().flag(), None);
    }

    #[test]
    fn jsr_offset_saves_return() {
        // JSR #4
        let mut state = run_state(&[0x4804]);
        state.step().unwrap();
        assert_eq!(state.registers().get(7), 0x3001);
        assert_eq!(state.registers().pc(), 0x3005);
        assert_eq!(state.registers().flag(), None);
    }

    #[test]
    fn jsrr_jumps_to_register() {
        // JSRR R2
        let mut state = run_state(&[0x4080]);
        state.registers_mut().set(2, 0x5000);
        state.step().unwrap();
        assert_eq!(state.registers().get(7), 0x3001);
        assert_eq!(state.registers().pc(), 0x5000);
    }

    #[test]
    fn jsrr_through_r7() {
        // JSRR R7
        let mut state = run_state(&[0x41C0]);
        state.registers_mut().set(7, 0x5000);
        state.step().unwrap();
        assert_eq!(state.registers().pc(), 0x5000);
        assert_eq!(state.registers().get(7), 0x3001);
    }

    #[test]
    fn ld_pc_relative() {
        // LD R2, #1 ; HALT ; .FILL x8001
        let mut state = run_state(&[0x2401, 0xF025, 0x8001]);
        state.step().unwrap();
        assert_eq!(state.registers().get(2), 0x8001);
        assert_eq!(state.registers().flag(), Some(RunFlag::N));
    }

    #[test]
    fn ldi_follows_pointer() {
        // LDI R3, #1 ; HALT ; .FILL x4000
        let mut state = run_state(&[0xA601, 0xF025, 0x4000]);
        state.memory_mut().write(0x4000, 1234);
        state.step().unwrap();
        assert_eq!(state.registers().get(3), 1234);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
    }

    #[test]
    fn ldr_base_offset() {
        // LDR R1, R2, #-2
        let mut state = run_state(&[0x62BE]);
        state.registers_mut().set(2, 0x4002);
        state.memory_mut().write(0x4000, 0);
        state.registers_mut().set(1, 99);
        state.step().unwrap();
        assert_eq!(state.registers().get(1), 0);
        assert_eq!(state.registers().flag(), Some(RunFlag::Z));
    }

    #[test]
    fn lea_sets_flags() {
        // LEA R0, #-1
        let mut state = run_state(&[0xE1FF]);
        state.step().unwrap();
        assert_eq!(state.registers().get(0), 0x3000);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
    }

    #[test]
    fn stores_leave_flags() {
        // ADD R1, R1, #-3 ; ST R1, #4 ; STR R1, R2, #1 ; STI R1, #0 ; .FILL x4100
        let mut state = run_state(&[0x127D, 0x3204, 0x7281, 0xB200, 0x4100]);
        state.registers_mut().set(2, 0x4000);
        for _ in 0..4 {
            state.step().unwrap();
        }
        let mem = state.memory();
        assert_eq!(mem.peek(0x3006), 0xFFFD);
        assert_eq!(mem.peek(0x4001), 0xFFFD);
        assert_eq!(mem.peek(0x4100), 0xFFFD);
        assert_eq!(state.registers().flag(), Some(RunFlag::N));
    }

    #[test]
    fn sti_uses_decoded_source_register() {
        // STI R5, #1 ; HALT ; .FILL x4000
        let mut state = run_state(&[0xBA01, 0xF025, 0x4000]);
        state.registers_mut().set(0, 0x1111);
        state.registers_mut().set(5, 0x5555);
        state.step().unwrap();
        assert_eq!(state.memory().peek(0x4000), 0x5555);
    }

    #[test]
    fn pc_offset_wraps_around_memory() {
        // LEA R0, #-1 at address 0x0000
        let mut state = run_state(&[]);
        state.memory_mut().write(0x0000, 0xE1FF);
        state.registers_mut().set_pc(0x0000);
        state.step().unwrap();
        assert_eq!(state.registers().get(0), 0x0000);
        assert_eq!(state.registers().flag(), Some(RunFlag::Z));
    }

    #[test]
    fn ldi_polls_keyboard() {
        // LDI R0, #2 ; LDI R1, #2 ; HALT ; .FILL KBSR ; .FILL KBDR
        let mut state =
            run_state_with_input(&[0xA002, 0xA202, 0xF025, KBSR, KBDR], "k");
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(state.registers().get(0), 0x8000);
        assert_eq!(state.registers().get(1), b'k' as u16);
        assert_eq!(state.registers().flag(), Some(RunFlag::P));
    }

    #[test]
    fn reserved_opcodes_fault() {
        for word in [0xD000, 0x8000] {
            let mut state = run_state(&[word, 0x1021]);
            let fault = state.run().unwrap_err();
            assert!(matches!(
                fault,
                Fault::ReservedOpcode { addr: 0x3000, .. }
            ));
            assert_eq!(fault.addr(), 0x3000);
            assert_eq!(state.status(), Status::Halted);
            // No further cycles
            assert_eq!(state.registers().pc(), 0x3001);
            assert_eq!(state.step().unwrap(), Status::Halted);
            assert_eq!(state.registers().get(0), 0);
        }
    }

    #[test]
    fn halt_stops_loop() {
        // ADD R0, R0, #1 ; HALT ; ADD R0, R0, #1
        let mut state = run_state(&[0x1021, 0xF025, 0x1021]);
        state.run().unwrap();
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.registers().get(0), 1);
        assert_eq!(state.registers().pc(), 0x3002);

        assert_eq!(state.step().unwrap(), Status::Halted);
        assert_eq!(state.registers().get(0), 1);
        assert_eq!(state.registers().pc(), 0x3002);
    }

    #[test]
    fn load_from_stream() {
        let mut state = RunState::new(BufferConsole::default());
        let bytes: &[u8] = &[0x30, 0x00, 0x10, 0x21, 0xF0, 0x25];
        state.load(bytes).unwrap();
        state.run().unwrap();
        assert_eq!(state.registers().get(0), 1);
    }

    #[test]
    fn failed_load_leaves_memory() {
        let mut state = RunState::new(BufferConsole::default());
        let bytes: &[u8] = &[0x30, 0x00, 0x10, 0x21, 0xF0];
        assert!(matches!(
            state.load(bytes),
            Err(LoadError::Misaligned { len: 5 })
        ));
        assert_eq!(state.memory().peek(0x3000), 0);
    }

    #[test]
    fn later_images_overwrite_earlier() {
        let mut state = RunState::new(BufferConsole::default());
        state.load(&[0x30u8, 0x00, 0x11, 0x11, 0x22, 0x22][..]).unwrap();
        state.load(&[0x30u8, 0x01, 0x33, 0x33][..]).unwrap();
        assert_eq!(state.memory().peek(0x3000), 0x1111);
        assert_eq!(state.memory().peek(0x3001), 0x3333);
    }
}
