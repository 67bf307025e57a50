//! NES Core - Pure Rust NES emulator library
//!
//! This crate provides the core emulation logic for a Nintendo Entertainment System (NES):
//! the 2A03 CPU, the 2C02 PPU, and the bus that connects them. It contains no
//! windowing or audio code; front-ends drive it through [`system::Emulator`].

#![forbid(unsafe_code)]

/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// Official opcode table
pub mod opcodes;
/// Memory bus and mapping
pub mod bus;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// Frame buffer and the once-per-vblank render pass
pub mod render;
/// iNES cartridge decoding
pub mod cartridge;
/// Standard controller
pub mod controller;
/// Scheduler tying CPU and PPU together
pub mod system;
/// nestest-style execution trace
pub mod trace;

pub use cartridge::{Cartridge, CartridgeError, Mirroring};
pub use system::{Emulator, EmulatorError, RunOutcome};
