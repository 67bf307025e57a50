//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 CPU without decimal mode: the D flag can be
//! set and cleared but ADC/SBC always operate in binary.

use std::fmt;

use thiserror::Error;

use crate::bus::BusError;
use crate::opcodes::{self, AddressingMode, Mnemonic};

/// Reset vector location
pub const RESET_VECTOR: u16 = 0xFFFC;
/// NMI vector location
pub const NMI_VECTOR: u16 = 0xFFFA;
/// IRQ/BRK vector location
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Base of the hardware stack page
const STACK_BASE: u16 = 0x0100;

/// Cycles consumed by the reset sequence
pub const RESET_CYCLES: u8 = 7;

/// Bus trait for memory and I/O access
pub trait Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> Result<u8, BusError>;
    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError>;
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub a: u8,    // Accumulator
    pub x: u8,    // X index register
    pub y: u8,    // Y index register
    pub sp: u8,   // Stack pointer
    pub pc: u16,  // Program counter
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD, // Stack starts at $01FD
            pc: 0,    // Will be set by reset vector
        }
    }
}

/// CPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b00000001;
    pub const ZERO: u8 = 0b00000010;
    pub const INTERRUPT: u8 = 0b00000100;
    pub const DECIMAL: u8 = 0b00001000;
    pub const BREAK: u8 = 0b00010000;
    /// Bit 5 reads as 1 on hardware
    pub const RESERVED: u8 = 0b00100000;
    pub const OVERFLOW: u8 = 0b01000000;
    pub const NEGATIVE: u8 = 0b10000000;

    /// Power-up value: interrupts disabled, reserved bit set
    pub const POWER_ON: u8 = Self::INTERRUPT | Self::RESERVED;

    pub fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// Raw status byte
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Value restored from the stack: B is dropped, bit 5 forced on
    pub fn from_stack(value: u8) -> Self {
        Self((value & !Self::BREAK) | Self::RESERVED)
    }

    /// Copy pushed by BRK and PHP
    pub fn pushed_by_software(&self) -> u8 {
        self.0 | Self::BREAK | Self::RESERVED
    }

    /// Copy pushed by a hardware interrupt
    pub fn pushed_by_interrupt(&self) -> u8 {
        (self.0 & !Self::BREAK) | Self::RESERVED
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn decimal(&self) -> bool {
        (self.0 & Self::DECIMAL) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_interrupt(&mut self, val: bool) {
        self.set(Self::INTERRUPT, val);
    }

    pub fn set_decimal(&mut self, val: bool) {
        self.set(Self::DECIMAL, val);
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.set(Self::OVERFLOW, val);
    }

    pub fn set_negative(&mut self, val: bool) {
        self.set(Self::NEGATIVE, val);
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self(Self::POWER_ON)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} D:{} B:{} U:{} V:{} N:{}",
            self.carry() as u8,
            self.zero() as u8,
            self.interrupt() as u8,
            self.decimal() as u8,
            (self.0 & Self::BREAK != 0) as u8,
            (self.0 & Self::RESERVED != 0) as u8,
            self.overflow() as u8,
            self.negative() as u8
        )
    }
}

/// Resolved operand of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operand {
    /// Effective address (branch target for relative mode, unused for
    /// implied and accumulator modes)
    pub address: u16,
    /// Indexing or branching moved the address onto another page
    pub page_crossed: bool,
}

/// Resolve an addressing mode to an effective address.
///
/// `operand_pc` points at the first operand byte. `read` supplies the bytes
/// at the program counter and any pointers; only bytes the mode actually
/// needs are requested.
pub fn resolve_operand<E>(
    mode: AddressingMode,
    registers: &CpuRegisters,
    operand_pc: u16,
    mut read: impl FnMut(u16) -> Result<u8, E>,
) -> Result<Operand, E> {
    let operand = match mode {
        AddressingMode::Implied | AddressingMode::Accumulator => Operand::default(),
        AddressingMode::Immediate => Operand {
            address: operand_pc,
            page_crossed: false,
        },
        AddressingMode::ZeroPage => Operand {
            address: read(operand_pc)? as u16,
            page_crossed: false,
        },
        AddressingMode::ZeroPageX => Operand {
            address: read(operand_pc)?.wrapping_add(registers.x) as u16,
            page_crossed: false,
        },
        AddressingMode::ZeroPageY => Operand {
            address: read(operand_pc)?.wrapping_add(registers.y) as u16,
            page_crossed: false,
        },
        AddressingMode::Absolute => Operand {
            address: word(&mut read, operand_pc, operand_pc.wrapping_add(1))?,
            page_crossed: false,
        },
        AddressingMode::AbsoluteX => {
            let base = word(&mut read, operand_pc, operand_pc.wrapping_add(1))?;
            indexed(base, registers.x)
        }
        AddressingMode::AbsoluteY => {
            let base = word(&mut read, operand_pc, operand_pc.wrapping_add(1))?;
            indexed(base, registers.y)
        }
        AddressingMode::Indirect => {
            let pointer = word(&mut read, operand_pc, operand_pc.wrapping_add(1))?;
            // The high byte never carries into the next page.
            let high = (pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF);
            Operand {
                address: word(&mut read, pointer, high)?,
                page_crossed: false,
            }
        }
        AddressingMode::IndirectX => {
            let pointer = read(operand_pc)?.wrapping_add(registers.x);
            Operand {
                address: word(&mut read, pointer as u16, pointer.wrapping_add(1) as u16)?,
                page_crossed: false,
            }
        }
        AddressingMode::IndirectY => {
            let pointer = read(operand_pc)?;
            let base = word(&mut read, pointer as u16, pointer.wrapping_add(1) as u16)?;
            indexed(base, registers.y)
        }
        AddressingMode::Relative => {
            let offset = read(operand_pc)? as i8;
            let next = operand_pc.wrapping_add(1);
            let target = next.wrapping_add(offset as u16);
            Operand {
                address: target,
                page_crossed: (next & 0xFF00) != (target & 0xFF00),
            }
        }
    };
    Ok(operand)
}

fn word<E>(read: &mut impl FnMut(u16) -> Result<u8, E>, lo: u16, hi: u16) -> Result<u16, E> {
    let low = read(lo)? as u16;
    let high = read(hi)? as u16;
    Ok((high << 8) | low)
}

fn indexed(base: u16, index: u8) -> Operand {
    let address = base.wrapping_add(index as u16);
    Operand {
        address,
        page_crossed: (base & 0xFF00) != (address & 0xFF00),
    }
}

/// Outcome of one executed instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    /// The instruction was BRK
    pub did_break: bool,
    /// CPU cycles consumed, penalties included
    pub cycles: u8,
}

/// CPU emulator state
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: CpuRegisters,
    status: StatusFlags,
}

impl Cpu {
    /// Create a new CPU instance
    pub fn new() -> Self {
        Self {
            registers: CpuRegisters::default(),
            status: StatusFlags::default(),
        }
    }

    /// Reset the CPU: clear A/X/Y, restore power-up status and stack
    /// pointer, and jump through the reset vector.
    pub fn reset(&mut self, bus: &mut impl Bus) -> Result<(), CpuError> {
        self.registers = CpuRegisters::default();
        self.status = StatusFlags::default();
        self.registers.pc = read_word(bus, RESET_VECTOR)?;
        Ok(())
    }

    /// Get CPU registers
    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    /// Get CPU status flags
    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    /// Execute one instruction
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<StepResult, CpuError> {
        let pc = self.registers.pc;
        let opcode = bus.read(pc)?;
        let instruction = opcodes::lookup(opcode).ok_or(CpuError::UnsupportedOpcode {
            opcode,
            address: pc,
        })?;

        let operand_pc = pc.wrapping_add(1);
        let operand =
            resolve_operand(instruction.mode, &self.registers, operand_pc, |addr| bus.read(addr))?;
        self.registers.pc = pc.wrapping_add(instruction.bytes as u16);

        let mut cycles = instruction.cycles;
        if instruction.page_penalty && operand.page_crossed {
            cycles += 1;
        }
        cycles += self.execute(bus, instruction.mnemonic, instruction.mode, operand)?;

        Ok(StepResult {
            did_break: instruction.mnemonic == Mnemonic::Brk,
            cycles,
        })
    }

    /// Enter the NMI handler regardless of the interrupt-disable flag
    pub fn interrupt_nmi(&mut self, bus: &mut impl Bus) -> Result<(), CpuError> {
        self.push_word(bus, self.registers.pc)?;
        self.push(bus, self.status.pushed_by_interrupt())?;
        self.status.set_interrupt(true);
        self.registers.pc = read_word(bus, NMI_VECTOR)?;
        Ok(())
    }

    /// Run one decoded instruction. Returns extra cycles from taken branches.
    fn execute(
        &mut self,
        bus: &mut impl Bus,
        mnemonic: Mnemonic,
        mode: AddressingMode,
        operand: Operand,
    ) -> Result<u8, CpuError> {
        let address = operand.address;
        match mnemonic {
            // Loads and stores
            Mnemonic::Lda => {
                self.registers.a = bus.read(address)?;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Ldx => {
                self.registers.x = bus.read(address)?;
                self.update_zero_negative(self.registers.x);
            }
            Mnemonic::Ldy => {
                self.registers.y = bus.read(address)?;
                self.update_zero_negative(self.registers.y);
            }
            Mnemonic::Sta => bus.write(address, self.registers.a)?,
            Mnemonic::Stx => bus.write(address, self.registers.x)?,
            Mnemonic::Sty => bus.write(address, self.registers.y)?,

            // Transfers
            Mnemonic::Tax => {
                self.registers.x = self.registers.a;
                self.update_zero_negative(self.registers.x);
            }
            Mnemonic::Tay => {
                self.registers.y = self.registers.a;
                self.update_zero_negative(self.registers.y);
            }
            Mnemonic::Tsx => {
                self.registers.x = self.registers.sp;
                self.update_zero_negative(self.registers.x);
            }
            Mnemonic::Txa => {
                self.registers.a = self.registers.x;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Txs => self.registers.sp = self.registers.x,
            Mnemonic::Tya => {
                self.registers.a = self.registers.y;
                self.update_zero_negative(self.registers.a);
            }

            // Arithmetic
            Mnemonic::Adc => {
                let value = bus.read(address)?;
                self.add_with_carry(value);
            }
            Mnemonic::Sbc => {
                let value = bus.read(address)?;
                self.add_with_carry(!value);
            }
            Mnemonic::Cmp => {
                let value = bus.read(address)?;
                self.compare(self.registers.a, value);
            }
            Mnemonic::Cpx => {
                let value = bus.read(address)?;
                self.compare(self.registers.x, value);
            }
            Mnemonic::Cpy => {
                let value = bus.read(address)?;
                self.compare(self.registers.y, value);
            }

            // Logic
            Mnemonic::And => {
                self.registers.a &= bus.read(address)?;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Eor => {
                self.registers.a ^= bus.read(address)?;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Ora => {
                self.registers.a |= bus.read(address)?;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Bit => {
                let value = bus.read(address)?;
                self.status.set_zero(self.registers.a & value == 0);
                self.status.set_overflow(value & 0x40 != 0);
                self.status.set_negative(value & 0x80 != 0);
            }

            // Shifts and rotates
            Mnemonic::Asl | Mnemonic::Lsr | Mnemonic::Rol | Mnemonic::Ror => {
                if mode == AddressingMode::Accumulator {
                    self.registers.a = self.shift(mnemonic, self.registers.a);
                } else {
                    let value = bus.read(address)?;
                    let result = self.shift(mnemonic, value);
                    bus.write(address, result)?;
                }
            }

            // Increments and decrements
            Mnemonic::Inc => {
                let result = bus.read(address)?.wrapping_add(1);
                bus.write(address, result)?;
                self.update_zero_negative(result);
            }
            Mnemonic::Dec => {
                let result = bus.read(address)?.wrapping_sub(1);
                bus.write(address, result)?;
                self.update_zero_negative(result);
            }
            Mnemonic::Inx => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.update_zero_negative(self.registers.x);
            }
            Mnemonic::Iny => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.update_zero_negative(self.registers.y);
            }
            Mnemonic::Dex => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.update_zero_negative(self.registers.x);
            }
            Mnemonic::Dey => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.update_zero_negative(self.registers.y);
            }

            // Branches
            Mnemonic::Bcc => return Ok(self.branch(!self.status.carry(), operand)),
            Mnemonic::Bcs => return Ok(self.branch(self.status.carry(), operand)),
            Mnemonic::Beq => return Ok(self.branch(self.status.zero(), operand)),
            Mnemonic::Bne => return Ok(self.branch(!self.status.zero(), operand)),
            Mnemonic::Bmi => return Ok(self.branch(self.status.negative(), operand)),
            Mnemonic::Bpl => return Ok(self.branch(!self.status.negative(), operand)),
            Mnemonic::Bvs => return Ok(self.branch(self.status.overflow(), operand)),
            Mnemonic::Bvc => return Ok(self.branch(!self.status.overflow(), operand)),

            // Jumps and subroutines
            Mnemonic::Jmp => self.registers.pc = address,
            Mnemonic::Jsr => {
                self.push_word(bus, self.registers.pc.wrapping_sub(1))?;
                self.registers.pc = address;
            }
            Mnemonic::Rts => {
                self.registers.pc = self.pull_word(bus)?.wrapping_add(1);
            }
            Mnemonic::Rti => {
                self.status = StatusFlags::from_stack(self.pull(bus)?);
                self.registers.pc = self.pull_word(bus)?;
            }
            Mnemonic::Brk => {
                // The byte after BRK is a padding byte and is skipped on return.
                self.push_word(bus, self.registers.pc.wrapping_add(1))?;
                self.push(bus, self.status.pushed_by_software())?;
                self.status.set_interrupt(true);
                self.registers.pc = read_word(bus, IRQ_VECTOR)?;
            }

            // Stack
            Mnemonic::Pha => self.push(bus, self.registers.a)?,
            Mnemonic::Php => self.push(bus, self.status.pushed_by_software())?,
            Mnemonic::Pla => {
                self.registers.a = self.pull(bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Mnemonic::Plp => self.status = StatusFlags::from_stack(self.pull(bus)?),

            // Flags
            Mnemonic::Clc => self.status.set_carry(false),
            Mnemonic::Sec => self.status.set_carry(true),
            Mnemonic::Cld => self.status.set_decimal(false),
            Mnemonic::Sed => self.status.set_decimal(true),
            Mnemonic::Cli => self.status.set_interrupt(false),
            Mnemonic::Sei => self.status.set_interrupt(true),
            Mnemonic::Clv => self.status.set_overflow(false),

            Mnemonic::Nop => {}
        }
        Ok(0)
    }

    fn update_zero_negative(&mut self, value: u8) {
        self.status.set_zero(value == 0);
        self.status.set_negative(value & 0x80 != 0);
    }

    fn add_with_carry(&mut self, value: u8) {
        let a = self.registers.a;
        let sum = a as u16 + value as u16 + self.status.carry() as u16;
        let result = sum as u8;
        self.status.set_carry(sum > 0xFF);
        self.status.set_overflow((a ^ result) & (value ^ result) & 0x80 != 0);
        self.registers.a = result;
        self.update_zero_negative(result);
    }

    fn compare(&mut self, lhs: u8, rhs: u8) {
        self.status.set_carry(lhs >= rhs);
        self.update_zero_negative(lhs.wrapping_sub(rhs));
    }

    fn shift(&mut self, mnemonic: Mnemonic, value: u8) -> u8 {
        let carry_in = self.status.carry() as u8;
        let (result, carry_out) = match mnemonic {
            Mnemonic::Asl => (value << 1, value & 0x80 != 0),
            Mnemonic::Lsr => (value >> 1, value & 0x01 != 0),
            Mnemonic::Rol => ((value << 1) | carry_in, value & 0x80 != 0),
            _ => ((value >> 1) | (carry_in << 7), value & 0x01 != 0),
        };
        self.status.set_carry(carry_out);
        self.update_zero_negative(result);
        result
    }

    fn branch(&mut self, condition: bool, operand: Operand) -> u8 {
        if !condition {
            return 0;
        }
        self.registers.pc = operand.address;
        if operand.page_crossed {
            2
        } else {
            1
        }
    }

    fn push(&mut self, bus: &mut impl Bus, value: u8) -> Result<(), CpuError> {
        bus.write(STACK_BASE | self.registers.sp as u16, value)?;
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        Ok(())
    }

    fn pull(&mut self, bus: &mut impl Bus) -> Result<u8, CpuError> {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        Ok(bus.read(STACK_BASE | self.registers.sp as u16)?)
    }

    fn push_word(&mut self, bus: &mut impl Bus, value: u16) -> Result<(), CpuError> {
        self.push(bus, (value >> 8) as u8)?;
        self.push(bus, value as u8)
    }

    fn pull_word(&mut self, bus: &mut impl Bus) -> Result<u16, CpuError> {
        let low = self.pull(bus)? as u16;
        let high = self.pull(bus)? as u16;
        Ok((high << 8) | low)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

fn read_word(bus: &mut impl Bus, address: u16) -> Result<u16, BusError> {
    let low = bus.read(address)? as u16;
    let high = bus.read(address.wrapping_add(1))? as u16;
    Ok((high << 8) | low)
}

/// CPU error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("unsupported opcode ${opcode:02X} at ${address:04X}")]
    UnsupportedOpcode { opcode: u8, address: u16 },
    #[error(transparent)]
    Bus(#[from] BusError),
}
