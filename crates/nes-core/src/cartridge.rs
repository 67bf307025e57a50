//! Cartridge image decoding
//!
//! Decodes the iNES container: a 16-byte header, an optional 512-byte trainer,
//! then PRG ROM followed by CHR ROM. Only the original iNES layout is accepted;
//! NES 2.0 headers are rejected instead of being read as iNES.

use thiserror::Error;
use tracing::debug;

/// iNES header size
pub const HEADER_SIZE: usize = 16;

/// Trainer block size, present when flags 6 bit 2 is set
pub const TRAINER_SIZE: usize = 512;

/// PRG ROM page size (16 KiB)
pub const PRG_ROM_PAGE_SIZE: usize = 16 * 1024;

/// CHR ROM page size (8 KiB)
pub const CHR_ROM_PAGE_SIZE: usize = 8 * 1024;

/// Magic number: "NES\x1A"
pub const INES_MAGIC: [u8; 4] = [b'N', b'E', b'S', 0x1A];

/// Nametable mirroring wired on the cartridge board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Vertical,
    Horizontal,
    FourScreen,
}

/// iNES header structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InesHeader {
    /// PRG ROM size in 16KB units
    pub prg_rom_pages: u8,
    /// CHR ROM size in 8KB units
    pub chr_rom_pages: u8,
    /// Flags 6: mirroring, battery, trainer, four-screen, mapper low nibble
    pub flags_6: u8,
    /// Flags 7: format version, mapper high nibble
    pub flags_7: u8,
}

impl InesHeader {
    /// Parse an iNES header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::Truncated {
                section: "header",
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        if bytes[0..4] != INES_MAGIC {
            return Err(CartridgeError::InvalidMagic);
        }

        let version = (bytes[7] >> 2) & 0x03;
        if version != 0 {
            return Err(CartridgeError::UnsupportedFormat { version });
        }

        Ok(Self {
            prg_rom_pages: bytes[4],
            chr_rom_pages: bytes[5],
            flags_6: bytes[6],
            flags_7: bytes[7],
        })
    }

    /// Mapper number: high nibble from flags 7, low nibble from flags 6
    pub fn mapper_id(&self) -> u8 {
        (self.flags_7 & 0xF0) | (self.flags_6 >> 4)
    }

    /// Check if trainer is present
    pub fn has_trainer(&self) -> bool {
        (self.flags_6 & 0x04) != 0
    }

    /// Check if battery-backed RAM is present
    pub fn has_battery(&self) -> bool {
        (self.flags_6 & 0x02) != 0
    }

    /// Four-screen wins over the vertical bit whenever it is set.
    pub fn mirroring(&self) -> Mirroring {
        let four_screen = (self.flags_6 & 0x08) != 0;
        let vertical = (self.flags_6 & 0x01) != 0;
        match (four_screen, vertical) {
            (true, _) => Mirroring::FourScreen,
            (false, true) => Mirroring::Vertical,
            (false, false) => Mirroring::Horizontal,
        }
    }

    /// PRG ROM size in bytes
    pub fn prg_rom_size(&self) -> usize {
        self.prg_rom_pages as usize * PRG_ROM_PAGE_SIZE
    }

    /// CHR ROM size in bytes
    pub fn chr_rom_size(&self) -> usize {
        self.chr_rom_pages as usize * CHR_ROM_PAGE_SIZE
    }
}

/// Decoded cartridge image. Immutable once built.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: InesHeader,
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
}

impl Cartridge {
    /// Decode an iNES image. Nothing is allocated until every section is
    /// known to fit inside `rom_data`.
    pub fn from_rom(rom_data: &[u8]) -> Result<Self, CartridgeError> {
        let header = InesHeader::parse(rom_data)?;

        let mut offset = HEADER_SIZE;
        if header.has_trainer() {
            ensure_available(rom_data, "trainer", offset, TRAINER_SIZE)?;
            offset += TRAINER_SIZE;
        }

        let prg_size = header.prg_rom_size();
        ensure_available(rom_data, "PRG ROM", offset, prg_size)?;
        let prg_range = offset..offset + prg_size;
        offset += prg_size;

        let chr_size = header.chr_rom_size();
        ensure_available(rom_data, "CHR ROM", offset, chr_size)?;
        let chr_range = offset..offset + chr_size;

        debug!(
            prg_rom = prg_size,
            chr_rom = chr_size,
            mapper = header.mapper_id(),
            mirroring = ?header.mirroring(),
            "decoded iNES image"
        );

        Ok(Self {
            header,
            prg_rom: rom_data[prg_range].to_vec(),
            chr_rom: rom_data[chr_range].to_vec(),
        })
    }

    /// Build a mapper-0 cartridge directly from PRG and CHR data
    pub fn new(prg_rom: Vec<u8>, chr_rom: Vec<u8>, mirroring: Mirroring) -> Self {
        let flags_6 = match mirroring {
            Mirroring::Horizontal => 0x00,
            Mirroring::Vertical => 0x01,
            Mirroring::FourScreen => 0x08,
        };
        let header = InesHeader {
            prg_rom_pages: (prg_rom.len() / PRG_ROM_PAGE_SIZE) as u8,
            chr_rom_pages: (chr_rom.len() / CHR_ROM_PAGE_SIZE) as u8,
            flags_6,
            flags_7: 0,
        };
        Self {
            header,
            prg_rom,
            chr_rom,
        }
    }

    /// Get the iNES header
    pub fn header(&self) -> &InesHeader {
        &self.header
    }

    /// Get PRG ROM data
    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    /// Get CHR ROM data (empty when the board carries CHR RAM instead)
    pub fn chr_rom(&self) -> &[u8] {
        &self.chr_rom
    }

    pub fn mirroring(&self) -> Mirroring {
        self.header.mirroring()
    }

    pub fn mapper_id(&self) -> u8 {
        self.header.mapper_id()
    }

    /// True when no CHR ROM was supplied and pattern memory is RAM
    pub fn has_chr_ram(&self) -> bool {
        self.chr_rom.is_empty()
    }
}

fn ensure_available(
    data: &[u8],
    section: &'static str,
    offset: usize,
    len: usize,
) -> Result<(), CartridgeError> {
    let needed = offset + len;
    if needed > data.len() {
        return Err(CartridgeError::Truncated {
            section,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

/// Cartridge error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("invalid iNES header: missing NES\\x1A magic")]
    InvalidMagic,
    #[error("image truncated in {section}: need {needed} bytes, {available} available")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("unsupported header format version {version} (NES 2.0 is not supported)")]
    UnsupportedFormat { version: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(flags_6: u8, flags_7: u8, prg_pages: u8, chr_pages: u8) -> Vec<u8> {
        let mut rom = Vec::new();
        rom.extend_from_slice(&INES_MAGIC);
        rom.push(prg_pages);
        rom.push(chr_pages);
        rom.push(flags_6);
        rom.push(flags_7);
        rom.extend_from_slice(&[0u8; 8]);
        if flags_6 & 0x04 != 0 {
            rom.extend_from_slice(&[0xEEu8; TRAINER_SIZE]);
        }
        rom.extend(std::iter::repeat(0xAA).take(prg_pages as usize * PRG_ROM_PAGE_SIZE));
        rom.extend(std::iter::repeat(0x55).take(chr_pages as usize * CHR_ROM_PAGE_SIZE));
        rom
    }

    #[test]
    fn test_header_parsing() {
        let header = InesHeader::parse(&image(0x01, 0x00, 2, 1)).unwrap();
        assert_eq!(header.prg_rom_pages, 2);
        assert_eq!(header.chr_rom_pages, 1);
        assert_eq!(header.mirroring(), Mirroring::Vertical);
        assert_eq!(header.mapper_id(), 0);
    }

    #[test]
    fn test_mapper_nibbles() {
        let header = InesHeader::parse(&image(0x10, 0x40, 1, 1)).unwrap();
        assert_eq!(header.mapper_id(), 0x41);
    }

    #[test]
    fn test_four_screen_overrides_vertical() {
        for flags_6 in [0x08, 0x09] {
            let cart = Cartridge::from_rom(&image(flags_6, 0, 1, 1)).unwrap();
            assert_eq!(cart.mirroring(), Mirroring::FourScreen);
        }
        let cart = Cartridge::from_rom(&image(0x00, 0, 1, 1)).unwrap();
        assert_eq!(cart.mirroring(), Mirroring::Horizontal);
    }

    #[test]
    fn test_trainer_is_skipped() {
        let cart = Cartridge::from_rom(&image(0x04, 0, 1, 1)).unwrap();
        assert_eq!(cart.prg_rom().len(), PRG_ROM_PAGE_SIZE);
        assert!(cart.prg_rom().iter().all(|&b| b == 0xAA));
        assert!(cart.chr_rom().iter().all(|&b| b == 0x55));
    }

    #[test]
    fn test_bad_magic() {
        let mut rom = image(0, 0, 1, 1);
        rom[3] = 0x00;
        assert_eq!(Cartridge::from_rom(&rom).unwrap_err(), CartridgeError::InvalidMagic);
    }

    #[test]
    fn test_nes2_rejected() {
        let rom = image(0, 0x08, 1, 1);
        assert_eq!(
            Cartridge::from_rom(&rom).unwrap_err(),
            CartridgeError::UnsupportedFormat { version: 2 }
        );
    }

    #[test]
    fn test_truncated_chr() {
        let mut rom = image(0, 0, 1, 1);
        rom.truncate(rom.len() - 1);
        match Cartridge::from_rom(&rom).unwrap_err() {
            CartridgeError::Truncated { section, .. } => assert_eq!(section, "CHR ROM"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_chr_ram_when_no_chr_pages() {
        let cart = Cartridge::from_rom(&image(0, 0, 1, 0)).unwrap();
        assert!(cart.has_chr_ram());
    }
}
