//! PPU (Picture Processing Unit) implementation
//!
//! The 2C02 is modelled as a register file plus a dot/scanline counter.
//! Key timing:
//! - 341 dots per scanline, 262 scanlines per frame (NTSC)
//! - vblank starts on scanline 241, the pre-render wrap happens at 262
//! - the whole frame is composed once, on vblank entry, when NMI is enabled
//!
//! The PPU never talks to the CPU directly. `advance` reports an NMI and the
//! scheduler delivers it.

use tracing::{trace, warn};

use crate::cartridge::Mirroring;
use crate::render::{self, Frame};

/// Nametable storage. Four-screen boards address all of it, the two-screen
/// mirroring modes only the first 2 KiB.
pub const VRAM_SIZE: usize = 4096;
pub const PALETTE_SIZE: usize = 32; // 32 bytes (8 palettes x 4 colors each)
pub const OAM_SIZE: usize = 256; // Object Attribute Memory
/// Pattern memory provided when the cartridge has no CHR ROM
pub const CHR_RAM_SIZE: usize = 8192;

pub const DOTS_PER_SCANLINE: u32 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
pub const VBLANK_SCANLINE: u16 = 241;
/// Scanlines 0-239 are drawn
pub const VISIBLE_SCANLINES: u16 = 240;
/// Sprites the hardware can fetch for one line
pub const MAX_SPRITES_PER_LINE: usize = 8;

/// PPU registers, selected by the low three address bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuRegister {
    /// $2000 - PPUCTRL (write-only)
    Control,
    /// $2001 - PPUMASK (write-only)
    Mask,
    /// $2002 - PPUSTATUS (read-only)
    Status,
    /// $2003 - OAMADDR (write-only)
    OamAddr,
    /// $2004 - OAMDATA
    OamData,
    /// $2005 - PPUSCROLL (write-only)
    Scroll,
    /// $2006 - PPUADDR (write-only)
    Address,
    /// $2007 - PPUDATA
    Data,
}

impl PpuRegister {
    /// Decode a CPU address in $2000-$3FFF
    pub fn from_address(address: u16) -> Self {
        match address % 8 {
            0 => PpuRegister::Control,
            1 => PpuRegister::Mask,
            2 => PpuRegister::Status,
            3 => PpuRegister::OamAddr,
            4 => PpuRegister::OamData,
            5 => PpuRegister::Scroll,
            6 => PpuRegister::Address,
            _ => PpuRegister::Data,
        }
    }

    pub fn is_readable(self) -> bool {
        matches!(
            self,
            PpuRegister::Status | PpuRegister::OamData | PpuRegister::Data
        )
    }

    pub fn is_writable(self) -> bool {
        self != PpuRegister::Status
    }
}

/// PPU control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpuCtrl(u8);

impl PpuCtrl {
    pub const NMI_ENABLE: u8 = 0b10000000;
    pub const MASTER_SLAVE: u8 = 0b01000000;
    pub const SPRITE_SIZE: u8 = 0b00100000;
    pub const BG_PATTERN_TABLE: u8 = 0b00010000;
    pub const SPR_PATTERN_TABLE: u8 = 0b00001000;
    pub const VRAM_INC: u8 = 0b00000100;
    pub const NAMETABLE: u8 = 0b00000011;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn nmi_enable(&self) -> bool {
        (self.0 & Self::NMI_ENABLE) != 0
    }

    /// Sprite height in pixels (8 or 16)
    pub fn sprite_height(&self) -> usize {
        if (self.0 & Self::SPRITE_SIZE) != 0 {
            16
        } else {
            8
        }
    }

    pub fn background_pattern_addr(&self) -> u16 {
        if (self.0 & Self::BG_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    /// Pattern table for 8x8 sprites; 8x16 sprites pick theirs from the tile index
    pub fn sprite_pattern_addr(&self) -> u16 {
        if (self.0 & Self::SPR_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn vram_increment(&self) -> u16 {
        if (self.0 & Self::VRAM_INC) != 0 {
            32
        } else {
            1
        }
    }

    /// Base nametable (0-3)
    pub fn nametable(&self) -> u8 {
        self.0 & Self::NAMETABLE
    }
}

/// PPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpuStatus(u8);

impl PpuStatus {
    pub const VBLANK: u8 = 0b10000000;
    pub const SPRITE_ZERO_HIT: u8 = 0b01000000;
    pub const SPRITE_OVERFLOW: u8 = 0b00100000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn vblank(&self) -> bool {
        (self.0 & Self::VBLANK) != 0
    }

    pub fn sprite_zero_hit(&self) -> bool {
        (self.0 & Self::SPRITE_ZERO_HIT) != 0
    }

    pub fn sprite_overflow(&self) -> bool {
        (self.0 & Self::SPRITE_OVERFLOW) != 0
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }
}

/// PPU render mask flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpuMask(u8);

impl PpuMask {
    pub const GREYSCALE: u8 = 0b00000001;
    pub const SHOW_BG_LEFT: u8 = 0b00000010; // background in the left 8px
    pub const SHOW_SPR_LEFT: u8 = 0b00000100; // sprites in the left 8px
    pub const SHOW_BG: u8 = 0b00001000;
    pub const SHOW_SPR: u8 = 0b00010000;
    pub const EMPHASIZE_RED: u8 = 0b00100000;
    pub const EMPHASIZE_GREEN: u8 = 0b01000000;
    pub const EMPHASIZE_BLUE: u8 = 0b10000000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn greyscale(&self) -> bool {
        (self.0 & Self::GREYSCALE) != 0
    }

    pub fn show_background(&self) -> bool {
        (self.0 & Self::SHOW_BG) != 0
    }

    pub fn show_sprites(&self) -> bool {
        (self.0 & Self::SHOW_SPR) != 0
    }

    pub fn show_background_left(&self) -> bool {
        (self.0 & Self::SHOW_BG_LEFT) != 0
    }

    pub fn show_sprites_left(&self) -> bool {
        (self.0 & Self::SHOW_SPR_LEFT) != 0
    }
}

/// Map a nametable-relative index ($000-$FFF) to physical VRAM.
pub fn nametable_index(mirroring: Mirroring, index: u16) -> usize {
    let index = index & 0x0FFF;
    let table = index / 0x400;
    let physical = match (mirroring, table) {
        (Mirroring::Vertical, 2) | (Mirroring::Vertical, 3) => index - 0x800,
        (Mirroring::Horizontal, 1) | (Mirroring::Horizontal, 2) => index - 0x400,
        (Mirroring::Horizontal, 3) => index - 0x800,
        _ => index,
    };
    physical as usize
}

/// Map a palette address ($3F00-$3FFF) to the 32-byte palette RAM.
/// $3F10/$3F14/$3F18/$3F1C alias the background entries below them.
pub fn palette_index(address: u16) -> usize {
    let index = (address.wrapping_sub(0x3F00) % 32) as usize;
    match index {
        0x10 | 0x14 | 0x18 | 0x1C => index - 0x10,
        _ => index,
    }
}

/// PPU internal state
#[derive(Debug, Clone)]
pub struct Ppu {
    /// Pattern tables: CHR ROM, or CHR RAM when the cartridge has none
    chr: Vec<u8>,
    chr_is_ram: bool,
    mirroring: Mirroring,
    vram: [u8; VRAM_SIZE],
    palette: [u8; PALETTE_SIZE],
    oam: [u8; OAM_SIZE],
    control: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    oam_addr: u8,
    scroll_x: u8,
    scroll_y: u8,
    /// VRAM address set through PPUADDR
    address: u16,
    /// Write toggle shared by PPUSCROLL and PPUADDR
    write_toggle: bool,
    /// Read buffer (for PPUDATA)
    read_buffer: u8,
    /// Dot position (0-340)
    cycle: u32,
    /// Scanline position (0-261)
    scanline: u16,
    frame_count: u64,
    frame: Frame,
}

impl Ppu {
    /// Create a PPU wired to the given pattern data and mirroring.
    /// An empty `chr` gets 8 KiB of CHR RAM.
    pub fn new(chr: Vec<u8>, mirroring: Mirroring) -> Self {
        let chr_is_ram = chr.is_empty();
        let chr = if chr_is_ram { vec![0; CHR_RAM_SIZE] } else { chr };
        Self {
            chr,
            chr_is_ram,
            mirroring,
            vram: [0; VRAM_SIZE],
            palette: [0; PALETTE_SIZE],
            oam: [0; OAM_SIZE],
            control: PpuCtrl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            oam_addr: 0,
            scroll_x: 0,
            scroll_y: 0,
            address: 0,
            write_toggle: false,
            read_buffer: 0,
            cycle: 0,
            scanline: 0,
            frame_count: 0,
            frame: Frame::new(),
        }
    }

    /// Reset registers and timing; pattern data and mirroring are kept
    pub fn reset(&mut self) {
        self.control = PpuCtrl::default();
        self.mask = PpuMask::default();
        self.status = PpuStatus::default();
        self.oam_addr = 0;
        self.scroll_x = 0;
        self.scroll_y = 0;
        self.address = 0;
        self.write_toggle = false;
        self.read_buffer = 0;
        self.cycle = 0;
        self.scanline = 0;
        self.frame_count = 0;
    }

    /// Advance by `cycles` dots. Returns true when vblank was entered with
    /// NMI enabled during this call; the frame has been rendered by then.
    pub fn advance(&mut self, cycles: u32) -> bool {
        let mut nmi = false;
        self.cycle += cycles;
        while self.cycle >= DOTS_PER_SCANLINE {
            if self.sprite_zero_hit_at(self.cycle) {
                self.status.set(PpuStatus::SPRITE_ZERO_HIT, true);
            }
            if self.sprite_overflow_on_line() {
                self.status.set(PpuStatus::SPRITE_OVERFLOW, true);
            }
            self.cycle -= DOTS_PER_SCANLINE;
            self.scanline += 1;

            if self.scanline == VBLANK_SCANLINE {
                self.status.set(PpuStatus::VBLANK, true);
                self.status.set(PpuStatus::SPRITE_ZERO_HIT, false);
                if self.control.nmi_enable() {
                    self.render_frame();
                    trace!(frame = self.frame_count, "vblank NMI raised");
                    nmi = true;
                }
            }

            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.frame_count += 1;
                self.status.set(PpuStatus::VBLANK, false);
                self.status.set(PpuStatus::SPRITE_ZERO_HIT, false);
                self.status.set(PpuStatus::SPRITE_OVERFLOW, false);
            }
        }
        nmi
    }

    fn sprite_zero_hit_at(&self, cycle: u32) -> bool {
        let y = self.oam[0] as u16;
        let x = self.oam[3] as u32;
        y == self.scanline && x <= cycle && self.mask.show_sprites()
    }

    /// More than eight sprites cover the current visible line while
    /// rendering is enabled
    fn sprite_overflow_on_line(&self) -> bool {
        if self.scanline >= VISIBLE_SCANLINES
            || !(self.mask.show_background() || self.mask.show_sprites())
        {
            return false;
        }
        let height = self.control.sprite_height() as u16;
        let line = self.scanline;
        self.oam
            .chunks_exact(4)
            .filter(|sprite| {
                let y = sprite[0] as u16;
                y <= line && line < y + height
            })
            .count()
            > MAX_SPRITES_PER_LINE
    }

    fn render_frame(&mut self) {
        let mut frame = std::mem::take(&mut self.frame);
        render::render(self, &mut frame);
        self.frame = frame;
    }

    /// $2000 write
    pub fn write_control(&mut self, value: u8) {
        self.control = PpuCtrl::new(value);
    }

    /// $2001 write
    pub fn write_mask(&mut self, value: u8) {
        self.mask = PpuMask::new(value);
    }

    /// $2002 read: clears vblank and the write toggle
    pub fn read_status(&mut self) -> u8 {
        let value = self.status.bits();
        self.status.set(PpuStatus::VBLANK, false);
        self.write_toggle = false;
        value
    }

    /// $2003 write
    pub fn write_oam_addr(&mut self, value: u8) {
        self.oam_addr = value;
    }

    /// $2004 read (does not advance OAMADDR)
    pub fn read_oam_data(&self) -> u8 {
        self.oam[self.oam_addr as usize]
    }

    /// $2004 write
    pub fn write_oam_data(&mut self, value: u8) {
        self.oam[self.oam_addr as usize] = value;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    /// $2005 write: X first, then Y
    pub fn write_scroll(&mut self, value: u8) {
        if !self.write_toggle {
            self.scroll_x = value;
        } else {
            self.scroll_y = value;
        }
        self.write_toggle = !self.write_toggle;
    }

    /// $2006 write: high byte first, then low byte
    pub fn write_address(&mut self, value: u8) {
        if !self.write_toggle {
            self.address = (self.address & 0x00FF) | ((value as u16) << 8);
        } else {
            self.address = (self.address & 0xFF00) | value as u16;
        }
        self.address &= 0x3FFF;
        self.write_toggle = !self.write_toggle;
    }

    /// $2007 read: buffered below the palette, immediate for palette
    pub fn read_data(&mut self) -> u8 {
        let address = self.address;
        self.increment_address();

        match address {
            0x0000..=0x1FFF => {
                let value = self.read_buffer;
                self.read_buffer = self.chr.get(address as usize).copied().unwrap_or(0);
                value
            }
            0x2000..=0x3EFF => {
                let value = self.read_buffer;
                self.read_buffer = self.vram[self.mirror_vram_addr(address)];
                value
            }
            _ => {
                // The buffer picks up the nametable byte underneath the palette.
                self.read_buffer = self.vram[self.mirror_vram_addr(address - 0x1000)];
                self.palette[palette_index(address)]
            }
        }
    }

    /// $2007 write
    pub fn write_data(&mut self, value: u8) {
        let address = self.address;
        self.increment_address();

        match address {
            0x0000..=0x1FFF => {
                if self.chr_is_ram {
                    if let Some(slot) = self.chr.get_mut(address as usize) {
                        *slot = value;
                    }
                } else {
                    warn!("write to CHR ROM at {:#06X} dropped", address);
                }
            }
            0x2000..=0x3EFF => {
                let index = self.mirror_vram_addr(address);
                self.vram[index] = value;
            }
            _ => self.palette[palette_index(address)] = value,
        }
    }

    /// Copy a full page into OAM starting at OAMADDR
    pub fn write_oam_dma(&mut self, page: &[u8; 256]) {
        for &value in page.iter() {
            self.oam[self.oam_addr as usize] = value;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        }
    }

    fn increment_address(&mut self) {
        self.address = self.address.wrapping_add(self.control.vram_increment()) & 0x3FFF;
    }

    fn mirror_vram_addr(&self, address: u16) -> usize {
        let folded = address & 0x2FFF;
        nametable_index(self.mirroring, folded - 0x2000)
    }

    /// Nametable byte by nametable-relative index, after mirroring
    pub fn nametable_byte(&self, index: u16) -> u8 {
        self.vram[nametable_index(self.mirroring, index)]
    }

    /// Palette RAM entry (0-31)
    pub fn palette_entry(&self, index: usize) -> u8 {
        self.palette[index % PALETTE_SIZE]
    }

    pub fn chr(&self) -> &[u8] {
        &self.chr
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    pub fn control(&self) -> PpuCtrl {
        self.control
    }

    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    /// Get PPU status
    pub fn status(&self) -> PpuStatus {
        self.status
    }

    pub fn oam_addr(&self) -> u8 {
        self.oam_addr
    }

    pub fn scroll(&self) -> (u8, u8) {
        (self.scroll_x, self.scroll_y)
    }

    /// Current PPUADDR value
    pub fn vram_address(&self) -> u16 {
        self.address
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Last composed frame
    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new(Vec::new(), Mirroring::Horizontal)
    }
}
