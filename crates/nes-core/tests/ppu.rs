//! PPU tests for the NES emulator

use nes_core::ppu::{
    nametable_index, palette_index, Ppu, PpuCtrl, PpuMask, PpuRegister, DOTS_PER_SCANLINE,
    SCANLINES_PER_FRAME, VBLANK_SCANLINE,
};
use nes_core::render::SYSTEM_PALETTE;
use nes_core::Mirroring;

const DOTS_PER_FRAME: u32 = DOTS_PER_SCANLINE * SCANLINES_PER_FRAME as u32;

fn set_address(ppu: &mut Ppu, address: u16) {
    ppu.write_address((address >> 8) as u8);
    ppu.write_address(address as u8);
}

#[test]
fn test_ppu_creation() {
    let ppu = Ppu::default();
    assert_eq!(ppu.cycle(), 0);
    assert_eq!(ppu.scanline(), 0);
    assert_eq!(ppu.frame_count(), 0);
    assert_eq!(ppu.control().bits(), 0);
    assert_eq!(ppu.chr().len(), 8192);
}

#[test]
fn test_scanline_rollover() {
    let mut ppu = Ppu::default();
    ppu.advance(DOTS_PER_SCANLINE - 1);
    assert_eq!(ppu.scanline(), 0);
    assert_eq!(ppu.cycle(), 340);

    ppu.advance(1);
    assert_eq!(ppu.scanline(), 1);
    assert_eq!(ppu.cycle(), 0);
}

#[test]
fn test_frame_rollover() {
    let mut ppu = Ppu::default();
    ppu.advance(DOTS_PER_FRAME);
    assert_eq!(ppu.frame_count(), 1);
    assert_eq!(ppu.scanline(), 0);
    assert_eq!(ppu.cycle(), 0);
    assert!(!ppu.status().vblank());
}

#[test]
fn test_vblank_and_status_read() {
    let mut ppu = Ppu::default();
    ppu.advance(DOTS_PER_SCANLINE * VBLANK_SCANLINE as u32);
    assert_eq!(ppu.scanline(), VBLANK_SCANLINE);

    assert_eq!(ppu.read_status() & 0x80, 0x80);
    assert_eq!(ppu.read_status() & 0x80, 0);
}

#[test]
fn test_nmi_once_per_frame() {
    let mut ppu = Ppu::default();
    ppu.write_control(PpuCtrl::NMI_ENABLE);

    let mut raised = 0;
    let mut elapsed = 0;
    while elapsed < DOTS_PER_FRAME * 3 {
        if ppu.advance(7) {
            raised += 1;
            assert_eq!(ppu.scanline(), VBLANK_SCANLINE);
        }
        elapsed += 7;
    }
    assert_eq!(raised, 3);
}

#[test]
fn test_no_nmi_when_disabled() {
    let mut ppu = Ppu::default();
    let mut raised = false;
    for _ in 0..SCANLINES_PER_FRAME {
        raised |= ppu.advance(DOTS_PER_SCANLINE);
    }
    assert!(!raised);
    assert_eq!(ppu.frame_count(), 1);
}

#[test]
fn test_data_read_is_buffered() {
    let mut ppu = Ppu::default();
    set_address(&mut ppu, 0x2000);
    ppu.write_data(0x11);
    ppu.write_data(0x22);

    set_address(&mut ppu, 0x2000);
    assert_eq!(ppu.read_data(), 0x00);
    assert_eq!(ppu.read_data(), 0x11);
    assert_eq!(ppu.read_data(), 0x22);
}

#[test]
fn test_palette_read_is_immediate() {
    let mut ppu = Ppu::default();
    set_address(&mut ppu, 0x3F00);
    ppu.write_data(0x0F);

    set_address(&mut ppu, 0x3F00);
    assert_eq!(ppu.read_data(), 0x0F);
}

#[test]
fn test_palette_mirrors() {
    let mut ppu = Ppu::default();
    set_address(&mut ppu, 0x3F10);
    ppu.write_data(0x2C);
    assert_eq!(ppu.palette_entry(0), 0x2C);

    set_address(&mut ppu, 0x3F00);
    assert_eq!(ppu.read_data(), 0x2C);

    assert_eq!(palette_index(0x3F14), 0x04);
    assert_eq!(palette_index(0x3F21), 0x01);
    assert_eq!(palette_index(0x3F11), 0x11);
}

#[test]
fn test_increment_by_32() {
    let mut ppu = Ppu::default();
    ppu.write_control(PpuCtrl::VRAM_INC);
    set_address(&mut ppu, 0x2000);
    ppu.write_data(0xAA);
    assert_eq!(ppu.vram_address(), 0x2020);
    ppu.write_data(0xBB);

    assert_eq!(ppu.nametable_byte(0x000), 0xAA);
    assert_eq!(ppu.nametable_byte(0x020), 0xBB);
}

#[test]
fn test_address_is_masked() {
    let mut ppu = Ppu::default();
    set_address(&mut ppu, 0x7F00);
    assert_eq!(ppu.vram_address(), 0x3F00);
}

#[test]
fn test_status_read_resets_toggle() {
    let mut ppu = Ppu::default();
    ppu.write_address(0x21);
    ppu.read_status();
    set_address(&mut ppu, 0x2300);
    assert_eq!(ppu.vram_address(), 0x2300);
}

#[test]
fn test_scroll_shares_toggle_with_address() {
    let mut ppu = Ppu::default();
    ppu.write_scroll(0x10);
    ppu.write_scroll(0x20);
    assert_eq!(ppu.scroll(), (0x10, 0x20));

    // One scroll write leaves the toggle on the second half.
    ppu.write_scroll(0x30);
    ppu.write_address(0x05);
    ppu.write_address(0x24);
    ppu.write_address(0x00);
    assert_eq!(ppu.vram_address(), 0x2400);
}

#[test]
fn test_oam_data() {
    let mut ppu = Ppu::default();
    ppu.write_oam_addr(0x10);
    ppu.write_oam_data(0xAB);
    assert_eq!(ppu.oam_addr(), 0x11);

    ppu.write_oam_addr(0x10);
    assert_eq!(ppu.read_oam_data(), 0xAB);
    assert_eq!(ppu.oam_addr(), 0x10);
}

#[test]
fn test_oam_dma_wraps_from_oam_addr() {
    let mut ppu = Ppu::default();
    let mut page = [0u8; 256];
    for (i, byte) in page.iter_mut().enumerate() {
        *byte = i as u8;
    }
    ppu.write_oam_addr(0x04);
    ppu.write_oam_dma(&page);
    assert_eq!(ppu.oam()[4], 0x00);
    assert_eq!(ppu.oam()[3], 0xFF);
    assert_eq!(ppu.oam_addr(), 0x04);
}

/// OAM page with `count` sprites on lines `y..y + 8`, the rest off screen
fn sprites_at(y: u8, count: usize) -> [u8; 256] {
    let mut page = [0xFFu8; 256];
    for sprite in page.chunks_exact_mut(4).take(count) {
        sprite.copy_from_slice(&[y, 0x00, 0x00, 0x10]);
    }
    page
}

#[test]
fn test_sprite_overflow() {
    let mut ppu = Ppu::default();
    ppu.write_mask(PpuMask::SHOW_SPR);
    ppu.write_oam_dma(&sprites_at(5, 9));

    ppu.advance(DOTS_PER_SCANLINE * 5);
    assert!(!ppu.status().sprite_overflow());
    ppu.advance(DOTS_PER_SCANLINE);
    assert!(ppu.status().sprite_overflow());
    assert_eq!(ppu.read_status() & 0x20, 0x20);

    // Cleared when the frame wraps
    ppu.advance(DOTS_PER_FRAME - DOTS_PER_SCANLINE * 6);
    assert_eq!(ppu.frame_count(), 1);
    assert!(!ppu.status().sprite_overflow());
}

#[test]
fn test_eight_sprites_do_not_overflow() {
    let mut ppu = Ppu::default();
    ppu.write_mask(PpuMask::SHOW_SPR);
    ppu.write_oam_dma(&sprites_at(5, 8));
    ppu.advance(DOTS_PER_SCANLINE * VBLANK_SCANLINE as u32);
    assert!(!ppu.status().sprite_overflow());

    // Nothing is evaluated with rendering off
    let mut ppu = Ppu::default();
    ppu.write_oam_dma(&sprites_at(5, 9));
    ppu.advance(DOTS_PER_SCANLINE * VBLANK_SCANLINE as u32);
    assert!(!ppu.status().sprite_overflow());
}

#[test]
fn test_nametable_mirroring() {
    assert_eq!(nametable_index(Mirroring::Horizontal, 0x400), 0x000);
    assert_eq!(nametable_index(Mirroring::Horizontal, 0x800), 0x400);
    assert_eq!(nametable_index(Mirroring::Horizontal, 0xC00), 0x400);
    assert_eq!(nametable_index(Mirroring::Vertical, 0x400), 0x400);
    assert_eq!(nametable_index(Mirroring::Vertical, 0x800), 0x000);
    assert_eq!(nametable_index(Mirroring::Vertical, 0xC00), 0x400);
    assert_eq!(nametable_index(Mirroring::FourScreen, 0xC00), 0xC00);
}

#[test]
fn test_four_screen_tables_are_distinct() {
    let mut ppu = Ppu::new(Vec::new(), Mirroring::FourScreen);
    for (i, base) in [0x2000u16, 0x2400, 0x2800, 0x2C00].iter().enumerate() {
        set_address(&mut ppu, *base);
        ppu.write_data(i as u8 + 1);
    }
    assert_eq!(ppu.nametable_byte(0x000), 1);
    assert_eq!(ppu.nametable_byte(0x400), 2);
    assert_eq!(ppu.nametable_byte(0x800), 3);
    assert_eq!(ppu.nametable_byte(0xC00), 4);
}

#[test]
fn test_chr_ram_and_rom_writes() {
    let mut ram = Ppu::new(Vec::new(), Mirroring::Horizontal);
    set_address(&mut ram, 0x0010);
    ram.write_data(0x5A);
    assert_eq!(ram.chr()[0x10], 0x5A);

    let mut rom = Ppu::new(vec![0x11; 8192], Mirroring::Horizontal);
    set_address(&mut rom, 0x0010);
    rom.write_data(0x5A);
    assert_eq!(rom.chr()[0x10], 0x11);
}

#[test]
fn test_frame_rendered_on_vblank() {
    let mut ppu = Ppu::default();
    set_address(&mut ppu, 0x3F00);
    ppu.write_data(0x21);
    ppu.write_control(PpuCtrl::NMI_ENABLE);
    ppu.write_mask(PpuMask::SHOW_BG);

    ppu.advance(DOTS_PER_SCANLINE * VBLANK_SCANLINE as u32);
    assert_eq!(ppu.frame().pixel(0, 0), SYSTEM_PALETTE[0x21]);
    assert_eq!(ppu.frame().pixel(255, 239), SYSTEM_PALETTE[0x21]);
}

#[test]
fn test_register_decode() {
    assert_eq!(PpuRegister::from_address(0x2000), PpuRegister::Control);
    assert_eq!(PpuRegister::from_address(0x2007), PpuRegister::Data);
    assert_eq!(PpuRegister::from_address(0x3FFA), PpuRegister::Status);
    assert!(!PpuRegister::Control.is_readable());
    assert!(!PpuRegister::Status.is_writable());
    assert!(PpuRegister::OamData.is_readable() && PpuRegister::OamData.is_writable());
}
