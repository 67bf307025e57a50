//! NES System Integration
//!
//! `Emulator` owns the CPU and the bus (which owns the PPU) and is the only
//! place where time moves: every CPU cycle becomes three PPU dots before the
//! next instruction runs, and an NMI raised by the PPU is delivered here.

use thiserror::Error;
use tracing::{debug, trace};

use crate::bus::{Bus, BusError};
use crate::cartridge::{Cartridge, CartridgeError};
use crate::controller::Controller;
use crate::cpu::{Cpu, CpuError, StepResult, RESET_CYCLES};
use crate::ppu::Ppu;
use crate::render::Frame;

/// PPU dots per CPU cycle (NTSC)
pub const PPU_DOTS_PER_CPU_CYCLE: u64 = 3;

/// CPU cycles charged for NMI entry
pub const NMI_CYCLES: u64 = 2;

/// CPU cycles the CPU is halted for during OAM DMA (one more on odd cycles)
pub const OAM_DMA_CYCLES: u64 = 513;

/// Why `run_steps` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The step budget ran out
    StepLimit,
    /// A BRK executed after `steps` instructions (BRK included)
    Break { steps: u64 },
}

/// Emulator error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// NES scheduler
#[derive(Debug, Clone)]
pub struct Emulator {
    cpu: Cpu,
    bus: Bus,
    /// CPU cycles since reset
    total_cycles: u64,
}

impl Emulator {
    /// Create a new emulator with no cartridge
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            total_cycles: 0,
        }
    }

    /// Decode an iNES image, insert it and reset
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), EmulatorError> {
        let cartridge = Cartridge::from_rom(rom_data)?;
        self.load_cartridge(cartridge)
    }

    /// Insert a decoded cartridge and reset
    pub fn load_cartridge(&mut self, cartridge: Cartridge) -> Result<(), EmulatorError> {
        self.bus.load(cartridge)?;
        self.reset()
    }

    /// Reset CPU and PPU. The reset sequence itself takes 7 CPU cycles.
    pub fn reset(&mut self) -> Result<(), EmulatorError> {
        self.bus.ppu_mut().reset();
        self.cpu.reset(&mut self.bus)?;
        self.total_cycles = 0;
        self.tick(RESET_CYCLES as u64)?;
        debug!("reset, PC = {:#06X}", self.cpu.registers().pc);
        Ok(())
    }

    /// Execute one instruction and catch the PPU up with it
    pub fn step(&mut self) -> Result<StepResult, EmulatorError> {
        let result = self.cpu.step(&mut self.bus)?;
        let mut cycles = result.cycles as u64;
        if self.bus.take_dma_request() {
            let odd = (self.total_cycles + cycles) % 2 == 1;
            cycles += OAM_DMA_CYCLES + odd as u64;
        }
        self.tick(cycles)?;
        Ok(result)
    }

    /// Charge `cycles` CPU cycles and deliver any NMI the PPU raises
    fn tick(&mut self, cycles: u64) -> Result<(), EmulatorError> {
        self.total_cycles += cycles;
        let mut nmi = self
            .bus
            .ppu_mut()
            .advance((cycles * PPU_DOTS_PER_CPU_CYCLE) as u32);
        while nmi {
            trace!(cycle = self.total_cycles, "delivering NMI");
            self.cpu.interrupt_nmi(&mut self.bus)?;
            self.total_cycles += NMI_CYCLES;
            nmi = self
                .bus
                .ppu_mut()
                .advance((NMI_CYCLES * PPU_DOTS_PER_CPU_CYCLE) as u32);
        }
        Ok(())
    }

    /// Run until the PPU completes the current frame
    pub fn run_frame(&mut self) -> Result<(), EmulatorError> {
        let start = self.bus.ppu().frame_count();
        while self.bus.ppu().frame_count() == start {
            self.step()?;
        }
        Ok(())
    }

    /// Run for N frames
    pub fn run_frames(&mut self, frames: u64) -> Result<(), EmulatorError> {
        for _ in 0..frames {
            self.run_frame()?;
        }
        Ok(())
    }

    /// Run at most `limit` instructions, stopping early after a BRK
    pub fn run_steps(&mut self, limit: u64) -> Result<RunOutcome, EmulatorError> {
        for executed in 1..=limit {
            if self.step()?.did_break {
                return Ok(RunOutcome::Break { steps: executed });
            }
        }
        Ok(RunOutcome::StepLimit)
    }

    /// Trace line for the instruction about to execute
    pub fn trace_line(&self) -> String {
        crate::trace::trace_line(self)
    }

    /// Get CPU reference
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get mutable CPU reference
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Get PPU reference
    pub fn ppu(&self) -> &Ppu {
        self.bus.ppu()
    }

    /// Controller 0 or 1
    pub fn controller_mut(&mut self, index: usize) -> Option<&mut Controller> {
        self.bus.controller_mut(index)
    }

    /// Last composed frame
    pub fn frame(&self) -> &Frame {
        self.bus.ppu().frame()
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.bus.ppu().frame_count()
    }

    /// CPU cycles since reset
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Mirroring;
    use crate::cpu::Bus as _;
    use crate::ppu::PpuCtrl;

    /// 16KB NROM cartridge with `program` at $8000 and vectors filled in
    fn cartridge(program: &[u8], nmi_handler: &[u8]) -> Cartridge {
        let mut prg = vec![0xEA; 0x4000];
        prg[..program.len()].copy_from_slice(program);
        prg[0x1000..0x1000 + nmi_handler.len()].copy_from_slice(nmi_handler);
        // NMI -> $9000, RESET -> $8000, IRQ -> $9800
        prg[0x3FFA..0x4000].copy_from_slice(&[0x00, 0x90, 0x00, 0x80, 0x00, 0x98]);
        Cartridge::new(prg, vec![0; 0x2000], Mirroring::Horizontal)
    }

    #[test]
    fn test_system_reset() {
        let mut emulator = Emulator::new();
        emulator.load_cartridge(cartridge(&[], &[])).unwrap();
        assert_eq!(emulator.cpu().registers().pc, 0x8000);
        assert_eq!(emulator.total_cycles(), 7);
        assert_eq!(emulator.ppu().cycle(), 21);
    }

    #[test]
    fn test_cycles_convert_three_to_one() {
        let mut emulator = Emulator::new();
        emulator.load_cartridge(cartridge(&[0xEA], &[])).unwrap();
        let result = emulator.step().unwrap();
        assert_eq!(result.cycles, 2);
        assert_eq!(emulator.total_cycles(), 9);
        assert_eq!(emulator.ppu().cycle(), 27);
    }

    #[test]
    fn test_nmi_delivered_once_per_frame() {
        // LDA #$80 ; STA $2000 ; loop: JMP loop
        let program = [0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x05, 0x80];
        // NMI handler: INC $10 ; RTI
        let handler = [0xE6, 0x10, 0x40];
        let mut emulator = Emulator::new();
        emulator.load_cartridge(cartridge(&program, &handler)).unwrap();
        assert_eq!(emulator.ppu().control().bits(), 0);

        emulator.run_frames(3).unwrap();
        assert!(emulator.ppu().control().bits() & PpuCtrl::NMI_ENABLE != 0);
        assert_eq!(emulator.bus_mut().read(0x0010).unwrap(), 3);
    }

    #[test]
    fn test_oam_dma_stall() {
        // LDA #$02 ; STA $4014
        let program = [0xA9, 0x02, 0x8D, 0x14, 0x40];
        let mut emulator = Emulator::new();
        emulator.load_cartridge(cartridge(&program, &[])).unwrap();
        emulator.bus_mut().write(0x0205, 0x77).unwrap();
        emulator.step().unwrap();
        let before = emulator.total_cycles();
        emulator.step().unwrap();
        let charged = emulator.total_cycles() - before;
        assert!(charged == 4 + 513 || charged == 4 + 514);
        assert_eq!(emulator.ppu().oam()[5], 0x77);
    }

    #[test]
    fn test_run_steps_stops_on_brk() {
        let mut emulator = Emulator::new();
        emulator.load_cartridge(cartridge(&[0xEA, 0xEA, 0x00], &[])).unwrap();
        assert_eq!(emulator.run_steps(10).unwrap(), RunOutcome::Break { steps: 3 });
        assert_eq!(emulator.run_steps(2).unwrap(), RunOutcome::StepLimit);
    }
}
