//! Frame composition
//!
//! Runs once per vblank over the PPU's nametables, pattern data and OAM, and
//! writes a 256x240 RGB frame.

use crate::ppu::Ppu;

pub const WIDTH: usize = 256;
pub const HEIGHT: usize = 240;

/// 2C02 system palette as RGB triples
#[rustfmt::skip]
pub static SYSTEM_PALETTE: [(u8, u8, u8); 64] = [
    (0x80, 0x80, 0x80), (0x00, 0x3D, 0xA6), (0x00, 0x12, 0xB0), (0x44, 0x00, 0x96),
    (0xA1, 0x00, 0x5E), (0xC7, 0x00, 0x28), (0xBA, 0x06, 0x00), (0x8C, 0x17, 0x00),
    (0x5C, 0x2F, 0x00), (0x10, 0x45, 0x00), (0x05, 0x4A, 0x00), (0x00, 0x47, 0x2E),
    (0x00, 0x41, 0x66), (0x00, 0x00, 0x00), (0x05, 0x05, 0x05), (0x05, 0x05, 0x05),
    (0xC7, 0xC7, 0xC7), (0x00, 0x77, 0xFF), (0x21, 0x55, 0xFF), (0x82, 0x37, 0xFA),
    (0xEB, 0x2F, 0xB5), (0xFF, 0x29, 0x50), (0xFF, 0x22, 0x00), (0xD6, 0x32, 0x00),
    (0xC4, 0x62, 0x00), (0x35, 0x80, 0x00), (0x05, 0x8F, 0x00), (0x00, 0x8A, 0x55),
    (0x00, 0x99, 0xCC), (0x21, 0x21, 0x21), (0x09, 0x09, 0x09), (0x09, 0x09, 0x09),
    (0xFF, 0xFF, 0xFF), (0x0F, 0xD7, 0xFF), (0x69, 0xA2, 0xFF), (0xD4, 0x80, 0xFF),
    (0xFF, 0x45, 0xF3), (0xFF, 0x61, 0x8B), (0xFF, 0x88, 0x33), (0xFF, 0x9C, 0x12),
    (0xFA, 0xBC, 0x20), (0x9F, 0xE3, 0x0E), (0x2B, 0xF0, 0x35), (0x0C, 0xF0, 0xA4),
    (0x05, 0xFB, 0xFF), (0x5E, 0x5E, 0x5E), (0x0D, 0x0D, 0x0D), (0x0D, 0x0D, 0x0D),
    (0xFF, 0xFF, 0xFF), (0xA6, 0xFC, 0xFF), (0xB3, 0xEC, 0xFF), (0xDA, 0xAB, 0xEB),
    (0xFF, 0xA8, 0xF9), (0xFF, 0xAB, 0xB3), (0xFF, 0xD2, 0xB0), (0xFF, 0xEF, 0xA6),
    (0xFF, 0xF7, 0x9C), (0xD7, 0xE8, 0x95), (0xA6, 0xED, 0xAF), (0xA2, 0xF2, 0xDA),
    (0x99, 0xFF, 0xFC), (0xDD, 0xDD, 0xDD), (0x11, 0x11, 0x11), (0x11, 0x11, 0x11),
];

/// 256x240 RGB frame buffer, three bytes per pixel, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            data: vec![0; WIDTH * HEIGHT * 3],
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, rgb: (u8, u8, u8)) {
        let base = (y * WIDTH + x) * 3;
        if base + 2 < self.data.len() {
            self.data[base] = rgb.0;
            self.data[base + 1] = rgb.1;
            self.data[base + 2] = rgb.2;
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let base = (y * WIDTH + x) * 3;
        (self.data[base], self.data[base + 1], self.data[base + 2])
    }

    pub fn fill(&mut self, rgb: (u8, u8, u8)) {
        for pixel in self.data.chunks_exact_mut(3) {
            pixel.copy_from_slice(&[rgb.0, rgb.1, rgb.2]);
        }
    }

    /// Raw RGB bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose the current PPU state into `frame`
pub fn render(ppu: &Ppu, frame: &mut Frame) {
    frame.fill(color(ppu, ppu.palette_entry(0)));

    // Marks pixels where the background is non-transparent.
    let mut background_opaque = vec![false; WIDTH * HEIGHT];

    if ppu.mask().show_background() {
        render_background(ppu, frame, &mut background_opaque);
    }
    if ppu.mask().show_sprites() {
        render_sprites(ppu, frame, &background_opaque);
    }
}

fn color(ppu: &Ppu, entry: u8) -> (u8, u8, u8) {
    let index = if ppu.mask().greyscale() {
        entry & 0x30
    } else {
        entry & 0x3F
    };
    SYSTEM_PALETTE[index as usize]
}

/// Two-bit pixel of an 8x8 tile row at `tile_addr`
fn tile_pixel(chr: &[u8], tile_addr: u16, row: usize, col: usize) -> u8 {
    let plane = |offset: usize| {
        chr.get(tile_addr as usize + row + offset)
            .copied()
            .unwrap_or(0)
    };
    let bit = 7 - col;
    let low = (plane(0) >> bit) & 1;
    let high = (plane(8) >> bit) & 1;
    (high << 1) | low
}

/// Background pass. The screen is a 256x240 window into a 512x480 world of
/// four logical nametables; the scroll offset selects which neighbours of
/// the base nametable come into view.
fn render_background(ppu: &Ppu, frame: &mut Frame, opaque: &mut [bool]) {
    let control = ppu.control();
    let base = control.nametable() as usize;
    let pattern = control.background_pattern_addr();
    let (scroll_x, scroll_y) = ppu.scroll();
    let show_left = ppu.mask().show_background_left();

    for y in 0..HEIGHT {
        let world_y = (y + scroll_y as usize) % (HEIGHT * 2);
        let tile_row = (world_y % HEIGHT) / 8;
        let fine_y = world_y % 8;

        for x in 0..WIDTH {
            if x < 8 && !show_left {
                continue;
            }
            let world_x = (x + scroll_x as usize) % (WIDTH * 2);
            let tile_col = (world_x % WIDTH) / 8;
            let fine_x = world_x % 8;

            let logical = base ^ (world_x / WIDTH) ^ ((world_y / HEIGHT) << 1);
            let table = (logical * 0x400) as u16;

            let tile = ppu.nametable_byte(table + (tile_row * 32 + tile_col) as u16);
            let attribute_index = 0x3C0 + (tile_row / 4 * 8 + tile_col / 4) as u16;
            let attribute = ppu.nametable_byte(table + attribute_index);
            let shift = ((tile_row % 4) / 2) * 4 + ((tile_col % 4) / 2) * 2;
            let palette = ((attribute >> shift) & 0x03) as usize;

            let value = tile_pixel(ppu.chr(), pattern + tile as u16 * 16, fine_y, fine_x);
            if value == 0 {
                continue;
            }
            opaque[y * WIDTH + x] = true;
            frame.set_pixel(x, y, color(ppu, ppu.palette_entry(palette * 4 + value as usize)));
        }
    }
}

/// Sprite pass, lowest OAM index drawn last so it ends up on top
fn render_sprites(ppu: &Ppu, frame: &mut Frame, opaque: &[bool]) {
    let control = ppu.control();
    let height = control.sprite_height();
    let show_left = ppu.mask().show_sprites_left();
    let oam = ppu.oam();

    for sprite in oam.chunks_exact(4).rev() {
        let (sprite_y, tile, attributes, sprite_x) =
            (sprite[0] as usize, sprite[1], sprite[2], sprite[3] as usize);
        let flip_vertical = attributes & 0x80 != 0;
        let flip_horizontal = attributes & 0x40 != 0;
        let behind_background = attributes & 0x20 != 0;
        let palette = (attributes & 0x03) as usize;

        for row in 0..height {
            let y = sprite_y + row;
            if y >= HEIGHT {
                break;
            }
            let source_row = if flip_vertical { height - 1 - row } else { row };
            let (tile_addr, tile_row) = if height == 8 {
                (control.sprite_pattern_addr() + tile as u16 * 16, source_row)
            } else {
                let bank = (tile & 0x01) as u16 * 0x1000;
                let top = (tile & 0xFE) as u16;
                if source_row < 8 {
                    (bank + top * 16, source_row)
                } else {
                    (bank + (top + 1) * 16, source_row - 8)
                }
            };

            for col in 0..8 {
                let x = sprite_x + col;
                if x >= WIDTH || (x < 8 && !show_left) {
                    continue;
                }
                let source_col = if flip_horizontal { 7 - col } else { col };
                let value = tile_pixel(ppu.chr(), tile_addr, tile_row, source_col);
                if value == 0 || (behind_background && opaque[y * WIDTH + x]) {
                    continue;
                }
                let entry = ppu.palette_entry(0x10 + palette * 4 + value as usize);
                frame.set_pixel(x, y, color(ppu, entry));
            }
        }
    }
}
