//! Memory bus and mapping
//!
//! The NES memory map as seen by the CPU:
//! $0000-$07FF - 2KB Internal RAM
//! $0800-$1FFF - RAM mirroring (repeats every $0800 bytes)
//! $2000-$3FFF - PPU registers (mirrored every $08 bytes)
//! $4014       - OAM DMA trigger (write-only)
//! $4016       - Controller 1 / strobe for both controllers
//! $4017       - Controller 2 (writes belong to the APU and are ignored)
//! $8000-$FFFF - Cartridge PRG ROM, 16KB images mirrored
//!
//! Everything else is open bus: reads return 0 and writes are dropped.

use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use crate::cartridge::Cartridge;
use crate::controller::Controller;
use crate::cpu::Bus as CpuBus;
use crate::ppu::{Ppu, PpuRegister};

/// RAM size in bytes
pub const RAM_SIZE: usize = 2048; // 2KB

pub const OAM_DMA: u16 = 0x4014;
pub const CONTROLLER_1: u16 = 0x4016;
pub const CONTROLLER_2: u16 = 0x4017;

/// Target of a CPU address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Physical RAM index
    Ram(usize),
    PpuRegister(PpuRegister),
    OamDma,
    Controller1,
    Controller2,
    /// Offset into the $8000-$FFFF window
    Rom(u16),
    OpenBus,
}

impl Region {
    /// Classify an address. Total and free of side effects.
    pub fn classify(address: u16) -> Self {
        match address {
            0x0000..=0x1FFF => Region::Ram((address & 0x07FF) as usize),
            0x2000..=0x3FFF => Region::PpuRegister(PpuRegister::from_address(address)),
            OAM_DMA => Region::OamDma,
            CONTROLLER_1 => Region::Controller1,
            CONTROLLER_2 => Region::Controller2,
            0x8000..=0xFFFF => Region::Rom(address - 0x8000),
            _ => Region::OpenBus,
        }
    }
}

/// Direction of a rejected access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Bus error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("invalid {access} at ${address:04X}")]
    InvalidAccess { address: u16, access: Access },
    #[error("write of ${value:02X} to ROM at ${address:04X}")]
    RomWrite { address: u16, value: u8 },
    #[error("unsupported mapper {0} (only NROM is supported)")]
    UnsupportedMapper(u8),
}

/// Memory bus structure
#[derive(Debug, Clone)]
pub struct Bus {
    /// 2KB internal RAM (with mirroring)
    ram: [u8; RAM_SIZE],
    ppu: Ppu,
    controllers: [Controller; 2],
    cartridge: Option<Cartridge>,
    /// Set by a $4014 write until the scheduler charges the stall
    dma_pending: bool,
}

impl Bus {
    /// Create a new bus with no cartridge
    pub fn new() -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu: Ppu::default(),
            controllers: [Controller::new(), Controller::new()],
            cartridge: None,
            dma_pending: false,
        }
    }

    /// Insert a cartridge, replacing any previous one. The PPU is rebuilt
    /// around the new pattern data and mirroring.
    pub fn load(&mut self, cartridge: Cartridge) -> Result<(), BusError> {
        let mapper = cartridge.mapper_id();
        if mapper != 0 {
            return Err(BusError::UnsupportedMapper(mapper));
        }
        debug!(
            prg_rom = cartridge.prg_rom().len(),
            chr_rom = cartridge.chr_rom().len(),
            mirroring = ?cartridge.mirroring(),
            "cartridge loaded"
        );
        self.ppu = Ppu::new(cartridge.chr_rom().to_vec(), cartridge.mirroring());
        self.cartridge = Some(cartridge);
        self.dma_pending = false;
        Ok(())
    }

    /// Get a reference to the cartridge, if present
    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    /// Controller 0 or 1
    pub fn controller_mut(&mut self, index: usize) -> Option<&mut Controller> {
        self.controllers.get_mut(index)
    }

    /// True once after each OAM DMA
    pub fn take_dma_request(&mut self) -> bool {
        std::mem::take(&mut self.dma_pending)
    }

    /// Whether `address` can be read without side effects. Debug use only.
    pub fn can_debug_read(&self, address: u16) -> bool {
        matches!(
            Region::classify(address),
            Region::Ram(_) | Region::Rom(_) | Region::OpenBus
        )
    }

    /// Side-effect-free read for tooling; `None` for I/O registers
    pub fn peek(&self, address: u16) -> Option<u8> {
        match Region::classify(address) {
            Region::Ram(index) => Some(self.ram[index]),
            Region::Rom(offset) => Some(self.read_rom(offset)),
            Region::OpenBus => Some(0),
            _ => None,
        }
    }

    fn read_rom(&self, offset: u16) -> u8 {
        match &self.cartridge {
            Some(cart) if !cart.prg_rom().is_empty() => {
                let prg = cart.prg_rom();
                prg[offset as usize % prg.len()]
            }
            _ => 0,
        }
    }

    /// Copy a source page into OAM. The copy never touches I/O registers:
    /// bytes from register pages read as open bus.
    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut data = [0u8; 256];
        for (offset, byte) in data.iter_mut().enumerate() {
            *byte = self.peek(base | offset as u16).unwrap_or(0);
        }
        self.ppu.write_oam_dma(&data);
        self.dma_pending = true;
        trace!(page = page, "OAM DMA");
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBus for Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        let value = match Region::classify(address) {
            Region::Ram(index) => self.ram[index],
            Region::PpuRegister(register) => match register {
                PpuRegister::Status => self.ppu.read_status(),
                PpuRegister::OamData => self.ppu.read_oam_data(),
                PpuRegister::Data => self.ppu.read_data(),
                _ => {
                    return Err(BusError::InvalidAccess {
                        address,
                        access: Access::Read,
                    })
                }
            },
            Region::OamDma => {
                return Err(BusError::InvalidAccess {
                    address,
                    access: Access::Read,
                })
            }
            Region::Controller1 => self.controllers[0].read(),
            Region::Controller2 => self.controllers[1].read(),
            Region::Rom(offset) => self.read_rom(offset),
            Region::OpenBus => 0,
        };
        Ok(value)
    }

    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        match Region::classify(address) {
            Region::Ram(index) => self.ram[index] = value,
            Region::PpuRegister(register) => match register {
                PpuRegister::Control => self.ppu.write_control(value),
                PpuRegister::Mask => self.ppu.write_mask(value),
                PpuRegister::OamAddr => self.ppu.write_oam_addr(value),
                PpuRegister::OamData => self.ppu.write_oam_data(value),
                PpuRegister::Scroll => self.ppu.write_scroll(value),
                PpuRegister::Address => self.ppu.write_address(value),
                PpuRegister::Data => self.ppu.write_data(value),
                PpuRegister::Status => {
                    return Err(BusError::InvalidAccess {
                        address,
                        access: Access::Write,
                    })
                }
            },
            Region::OamDma => self.oam_dma(value),
            Region::Controller1 => {
                for controller in self.controllers.iter_mut() {
                    controller.write(value);
                }
            }
            Region::Controller2 | Region::OpenBus => {}
            Region::Rom(_) => return Err(BusError::RomWrite { address, value }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Mirroring;

    #[test]
    fn test_bus_read_write() {
        let mut bus = Bus::new();

        // Write to RAM
        bus.write(0x0000, 0x42).unwrap();
        assert_eq!(bus.read(0x0000).unwrap(), 0x42);

        // Test RAM mirroring
        bus.write(0x0001, 0x43).unwrap();
        assert_eq!(bus.read(0x0801).unwrap(), 0x43);
    }

    #[test]
    fn test_classify_is_total() {
        for address in 0..=u16::MAX {
            let _ = Region::classify(address);
        }
        assert_eq!(Region::classify(0x4015), Region::OpenBus);
        assert_eq!(Region::classify(0x6000), Region::OpenBus);
        assert_eq!(Region::classify(0x3FFF), Region::PpuRegister(PpuRegister::Data));
    }

    #[test]
    fn test_rom_mirroring_16k() {
        let mut prg = vec![0u8; 0x4000];
        prg[0x0010] = 0xAB;
        let mut bus = Bus::new();
        bus.load(Cartridge::new(prg, vec![0; 0x2000], Mirroring::Vertical))
            .unwrap();
        assert_eq!(bus.read(0x8010).unwrap(), 0xAB);
        assert_eq!(bus.read(0xC010).unwrap(), 0xAB);
        assert_eq!(bus.peek(0xC010), Some(0xAB));
    }

    #[test]
    fn test_peek_refuses_registers() {
        let bus = Bus::new();
        assert_eq!(bus.peek(0x2002), None);
        assert_eq!(bus.peek(0x4016), None);
        assert!(bus.can_debug_read(0x1FFF));
        assert!(!bus.can_debug_read(0x4014));
    }

    #[test]
    fn test_open_bus() {
        let mut bus = Bus::new();
        bus.write(0x5000, 0x12).unwrap();
        assert_eq!(bus.read(0x5000).unwrap(), 0);
    }
}
