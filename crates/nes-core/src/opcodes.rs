//! Official 6502 opcode table
//!
//! One flat 256-entry table indexed by the raw opcode byte, built at compile
//! time. Bytes that are not official opcodes hold `None`.

/// Instruction mnemonic
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
}

impl Mnemonic {
    /// Upper-case assembler name, as printed in traces
    #[rustfmt::skip]
    pub fn as_str(self) -> &'static str {
        use Mnemonic::*;
        match self {
            Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS",
            Beq => "BEQ", Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL",
            Brk => "BRK", Bvc => "BVC", Bvs => "BVS", Clc => "CLC", Cld => "CLD",
            Cli => "CLI", Clv => "CLV", Cmp => "CMP", Cpx => "CPX", Cpy => "CPY",
            Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR", Inc => "INC",
            Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR", Lda => "LDA",
            Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP", Ora => "ORA",
            Pha => "PHA", Php => "PHP", Pla => "PLA", Plp => "PLP", Rol => "ROL",
            Ror => "ROR", Rti => "RTI", Rts => "RTS", Sbc => "SBC", Sec => "SEC",
            Sed => "SED", Sei => "SEI", Sta => "STA", Stx => "STX", Sty => "STY",
            Tax => "TAX", Tay => "TAY", Tsx => "TSX", Txa => "TXA", Txs => "TXS",
            Tya => "TYA",
        }
    }
}

/// Addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// JMP ($nnnn) only
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Operand bytes following the opcode
    pub const fn operand_width(self) -> u8 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndirectX
            | AddressingMode::IndirectY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }
}

/// CPU instruction info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Total length including the opcode byte
    pub bytes: u8,
    /// Base cycle count
    pub cycles: u8,
    /// Extra cycle if the indexed address crosses a page
    pub page_penalty: bool,
}

const fn op(opcode: u8, mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction {
        opcode,
        mnemonic,
        mode,
        bytes: 1 + mode.operand_width(),
        cycles,
        page_penalty: false,
    }
}

const fn op_p(opcode: u8, mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    let mut instruction = op(opcode, mnemonic, mode, cycles);
    instruction.page_penalty = true;
    instruction
}

use AddressingMode::*;
use Mnemonic::*;

#[rustfmt::skip]
const OFFICIAL: &[Instruction] = &[
    op(0x69, Adc, Immediate, 2), op(0x65, Adc, ZeroPage, 3), op(0x75, Adc, ZeroPageX, 4),
    op(0x6D, Adc, Absolute, 4), op_p(0x7D, Adc, AbsoluteX, 4), op_p(0x79, Adc, AbsoluteY, 4),
    op(0x61, Adc, IndirectX, 6), op_p(0x71, Adc, IndirectY, 5),

    op(0x29, And, Immediate, 2), op(0x25, And, ZeroPage, 3), op(0x35, And, ZeroPageX, 4),
    op(0x2D, And, Absolute, 4), op_p(0x3D, And, AbsoluteX, 4), op_p(0x39, And, AbsoluteY, 4),
    op(0x21, And, IndirectX, 6), op_p(0x31, And, IndirectY, 5),

    op(0x0A, Asl, Accumulator, 2), op(0x06, Asl, ZeroPage, 5), op(0x16, Asl, ZeroPageX, 6),
    op(0x0E, Asl, Absolute, 6), op(0x1E, Asl, AbsoluteX, 7),

    op(0x90, Bcc, Relative, 2), op(0xB0, Bcs, Relative, 2), op(0xF0, Beq, Relative, 2),
    op(0x30, Bmi, Relative, 2), op(0xD0, Bne, Relative, 2), op(0x10, Bpl, Relative, 2),
    op(0x50, Bvc, Relative, 2), op(0x70, Bvs, Relative, 2),

    op(0x24, Bit, ZeroPage, 3), op(0x2C, Bit, Absolute, 4),

    op(0x00, Brk, Implied, 7),

    op(0x18, Clc, Implied, 2), op(0xD8, Cld, Implied, 2), op(0x58, Cli, Implied, 2),
    op(0xB8, Clv, Implied, 2),

    op(0xC9, Cmp, Immediate, 2), op(0xC5, Cmp, ZeroPage, 3), op(0xD5, Cmp, ZeroPageX, 4),
    op(0xCD, Cmp, Absolute, 4), op_p(0xDD, Cmp, AbsoluteX, 4), op_p(0xD9, Cmp, AbsoluteY, 4),
    op(0xC1, Cmp, IndirectX, 6), op_p(0xD1, Cmp, IndirectY, 5),

    op(0xE0, Cpx, Immediate, 2), op(0xE4, Cpx, ZeroPage, 3), op(0xEC, Cpx, Absolute, 4),
    op(0xC0, Cpy, Immediate, 2), op(0xC4, Cpy, ZeroPage, 3), op(0xCC, Cpy, Absolute, 4),

    op(0xC6, Dec, ZeroPage, 5), op(0xD6, Dec, ZeroPageX, 6), op(0xCE, Dec, Absolute, 6),
    op(0xDE, Dec, AbsoluteX, 7),
    op(0xCA, Dex, Implied, 2), op(0x88, Dey, Implied, 2),

    op(0x49, Eor, Immediate, 2), op(0x45, Eor, ZeroPage, 3), op(0x55, Eor, ZeroPageX, 4),
    op(0x4D, Eor, Absolute, 4), op_p(0x5D, Eor, AbsoluteX, 4), op_p(0x59, Eor, AbsoluteY, 4),
    op(0x41, Eor, IndirectX, 6), op_p(0x51, Eor, IndirectY, 5),

    op(0xE6, Inc, ZeroPage, 5), op(0xF6, Inc, ZeroPageX, 6), op(0xEE, Inc, Absolute, 6),
    op(0xFE, Inc, AbsoluteX, 7),
    op(0xE8, Inx, Implied, 2), op(0xC8, Iny, Implied, 2),

    op(0x4C, Jmp, Absolute, 3), op(0x6C, Jmp, Indirect, 5),
    op(0x20, Jsr, Absolute, 6),

    op(0xA9, Lda, Immediate, 2), op(0xA5, Lda, ZeroPage, 3), op(0xB5, Lda, ZeroPageX, 4),
    op(0xAD, Lda, Absolute, 4), op_p(0xBD, Lda, AbsoluteX, 4), op_p(0xB9, Lda, AbsoluteY, 4),
    op(0xA1, Lda, IndirectX, 6), op_p(0xB1, Lda, IndirectY, 5),

    op(0xA2, Ldx, Immediate, 2), op(0xA6, Ldx, ZeroPage, 3), op(0xB6, Ldx, ZeroPageY, 4),
    op(0xAE, Ldx, Absolute, 4), op_p(0xBE, Ldx, AbsoluteY, 4),

    op(0xA0, Ldy, Immediate, 2), op(0xA4, Ldy, ZeroPage, 3), op(0xB4, Ldy, ZeroPageX, 4),
    op(0xAC, Ldy, Absolute, 4), op_p(0xBC, Ldy, AbsoluteX, 4),

    op(0x4A, Lsr, Accumulator, 2), op(0x46, Lsr, ZeroPage, 5), op(0x56, Lsr, ZeroPageX, 6),
    op(0x4E, Lsr, Absolute, 6), op(0x5E, Lsr, AbsoluteX, 7),

    op(0xEA, Nop, Implied, 2),

    op(0x09, Ora, Immediate, 2), op(0x05, Ora, ZeroPage, 3), op(0x15, Ora, ZeroPageX, 4),
    op(0x0D, Ora, Absolute, 4), op_p(0x1D, Ora, AbsoluteX, 4), op_p(0x19, Ora, AbsoluteY, 4),
    op(0x01, Ora, IndirectX, 6), op_p(0x11, Ora, IndirectY, 5),

    op(0x48, Pha, Implied, 3), op(0x08, Php, Implied, 3),
    op(0x68, Pla, Implied, 4), op(0x28, Plp, Implied, 4),

    op(0x2A, Rol, Accumulator, 2), op(0x26, Rol, ZeroPage, 5), op(0x36, Rol, ZeroPageX, 6),
    op(0x2E, Rol, Absolute, 6), op(0x3E, Rol, AbsoluteX, 7),

    op(0x6A, Ror, Accumulator, 2), op(0x66, Ror, ZeroPage, 5), op(0x76, Ror, ZeroPageX, 6),
    op(0x6E, Ror, Absolute, 6), op(0x7E, Ror, AbsoluteX, 7),

    op(0x40, Rti, Implied, 6), op(0x60, Rts, Implied, 6),

    op(0xE9, Sbc, Immediate, 2), op(0xE5, Sbc, ZeroPage, 3), op(0xF5, Sbc, ZeroPageX, 4),
    op(0xED, Sbc, Absolute, 4), op_p(0xFD, Sbc, AbsoluteX, 4), op_p(0xF9, Sbc, AbsoluteY, 4),
    op(0xE1, Sbc, IndirectX, 6), op_p(0xF1, Sbc, IndirectY, 5),

    op(0x38, Sec, Implied, 2), op(0xF8, Sed, Implied, 2), op(0x78, Sei, Implied, 2),

    op(0x85, Sta, ZeroPage, 3), op(0x95, Sta, ZeroPageX, 4), op(0x8D, Sta, Absolute, 4),
    op(0x9D, Sta, AbsoluteX, 5), op(0x99, Sta, AbsoluteY, 5), op(0x81, Sta, IndirectX, 6),
    op(0x91, Sta, IndirectY, 6),

    op(0x86, Stx, ZeroPage, 3), op(0x96, Stx, ZeroPageY, 4), op(0x8E, Stx, Absolute, 4),
    op(0x84, Sty, ZeroPage, 3), op(0x94, Sty, ZeroPageX, 4), op(0x8C, Sty, Absolute, 4),

    op(0xAA, Tax, Implied, 2), op(0xA8, Tay, Implied, 2), op(0xBA, Tsx, Implied, 2),
    op(0x8A, Txa, Implied, 2), op(0x9A, Txs, Implied, 2), op(0x98, Tya, Implied, 2),
];

const fn build_table() -> [Option<Instruction>; 256] {
    let mut table: [Option<Instruction>; 256] = [None; 256];
    let mut i = 0;
    while i < OFFICIAL.len() {
        table[OFFICIAL[i].opcode as usize] = Some(OFFICIAL[i]);
        i += 1;
    }
    table
}

/// Opcode table indexed by the raw opcode byte
pub static OPCODE_TABLE: [Option<Instruction>; 256] = build_table();

/// Look up an opcode byte
pub fn lookup(opcode: u8) -> Option<&'static Instruction> {
    OPCODE_TABLE[opcode as usize].as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_count() {
        assert_eq!(OPCODE_TABLE.iter().flatten().count(), 151);
    }

    #[test]
    fn test_table_is_keyed_by_opcode() {
        for (byte, entry) in OPCODE_TABLE.iter().enumerate() {
            if let Some(instruction) = entry {
                assert_eq!(instruction.opcode as usize, byte);
            }
        }
    }

    #[test]
    fn test_widths() {
        assert_eq!(lookup(0xA9).map(|i| i.bytes), Some(2));
        assert_eq!(lookup(0x4C).map(|i| i.bytes), Some(3));
        assert_eq!(lookup(0xEA).map(|i| i.bytes), Some(1));
        assert_eq!(lookup(0x6C).map(|i| i.mode), Some(AddressingMode::Indirect));
    }

    #[test]
    fn test_unofficial_missing() {
        for byte in [0x02u8, 0x1A, 0x80, 0xA7, 0xEB, 0xFF] {
            assert!(lookup(byte).is_none(), "{byte:02X} should be unsupported");
        }
    }
}
