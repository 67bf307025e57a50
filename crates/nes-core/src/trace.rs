//! nestest-compatible execution trace
//!
//! One line per instruction, formatted before it executes:
//!
//! ```text
//! C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7
//! ```
//!
//! Memory is only inspected through `Bus::peek`, so tracing never disturbs
//! PPU or controller state. I/O registers show up as `FF`.

use std::convert::Infallible;

use crate::bus::Bus;
use crate::cpu::resolve_operand;
use crate::opcodes::{self, AddressingMode, Mnemonic};
use crate::system::Emulator;

/// Shown for bytes that cannot be read without side effects
const UNREADABLE: u8 = 0xFF;

fn peek(bus: &Bus, address: u16) -> u8 {
    bus.peek(address).unwrap_or(UNREADABLE)
}

/// Format the instruction at the current PC together with the machine state
pub fn trace_line(emulator: &Emulator) -> String {
    let bus = emulator.bus();
    let cpu = emulator.cpu();
    let registers = cpu.registers();
    let pc = registers.pc;
    let opcode = peek(bus, pc);

    let assembly = match opcodes::lookup(opcode) {
        Some(instruction) => {
            let raw: Vec<String> = (0..instruction.bytes as u16)
                .map(|offset| format!("{:02X}", peek(bus, pc.wrapping_add(offset))))
                .collect();
            let operand = format_operand(
                bus,
                emulator,
                instruction.mnemonic,
                instruction.mode,
                pc.wrapping_add(1),
            );
            format!(
                "{:04X}  {:8} {:>4} {}",
                pc,
                raw.join(" "),
                instruction.mnemonic.as_str(),
                operand
            )
        }
        None => format!("{:04X}  {:02X}        ???", pc, opcode),
    };

    let ppu = emulator.ppu();
    format!(
        "{:47} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:>3},{:>3} CYC:{}",
        assembly.trim_end(),
        registers.a,
        registers.x,
        registers.y,
        cpu.status().bits(),
        registers.sp,
        ppu.scanline(),
        ppu.cycle(),
        emulator.total_cycles()
    )
}

fn format_operand(
    bus: &Bus,
    emulator: &Emulator,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    operand_pc: u16,
) -> String {
    let registers = emulator.cpu().registers();
    let resolved = resolve_operand(mode, registers, operand_pc, |address| {
        Ok::<u8, Infallible>(peek(bus, address))
    });
    let address = match resolved {
        Ok(operand) => operand.address,
        Err(never) => match never {},
    };
    let byte = peek(bus, operand_pc);
    let word = u16::from_le_bytes([byte, peek(bus, operand_pc.wrapping_add(1))]);
    let value = peek(bus, address);

    match mode {
        AddressingMode::Implied => String::new(),
        AddressingMode::Accumulator => "A".to_string(),
        AddressingMode::Immediate => format!("#${:02X}", byte),
        AddressingMode::ZeroPage => format!("${:02X} = {:02X}", address, value),
        AddressingMode::ZeroPageX => {
            format!("${:02X},X @ {:02X} = {:02X}", byte, address, value)
        }
        AddressingMode::ZeroPageY => {
            format!("${:02X},Y @ {:02X} = {:02X}", byte, address, value)
        }
        AddressingMode::IndirectX => format!(
            "(${:02X},X) @ {:02X} = {:04X} = {:02X}",
            byte,
            byte.wrapping_add(registers.x),
            address,
            value
        ),
        AddressingMode::IndirectY => format!(
            "(${:02X}),Y = {:04X} @ {:04X} = {:02X}",
            byte,
            address.wrapping_sub(registers.y as u16),
            address,
            value
        ),
        AddressingMode::Relative => format!("${:04X}", address),
        AddressingMode::Absolute => match mnemonic {
            Mnemonic::Jmp | Mnemonic::Jsr => format!("${:04X}", address),
            _ => format!("${:04X} = {:02X}", address, value),
        },
        AddressingMode::AbsoluteX => {
            format!("${:04X},X @ {:04X} = {:02X}", word, address, value)
        }
        AddressingMode::AbsoluteY => {
            format!("${:04X},Y @ {:04X} = {:02X}", word, address, value)
        }
        AddressingMode::Indirect => format!("(${:04X}) = {:04X}", word, address),
    }
}
