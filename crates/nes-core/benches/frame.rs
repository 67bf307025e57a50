//! Frame throughput of the scheduler on a synthetic NROM image

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nes_core::{Cartridge, Emulator, Mirroring};

/// Busy loop with rendering and NMI enabled:
///
/// ```text
/// $8000  LDA #$80 ; STA $2000   enable NMI
///        LDA #$18 ; STA $2001   show background and sprites
/// loop:  INX ; STX $0200 ; JMP loop
/// $9000  RTI                    NMI handler
/// ```
fn cartridge() -> Cartridge {
    let program = [
        0xA9, 0x80, 0x8D, 0x00, 0x20, 0xA9, 0x18, 0x8D, 0x01, 0x20, 0xE8, 0x8E, 0x00, 0x02, 0x4C,
        0x0A, 0x80,
    ];
    let mut prg = vec![0xEA; 0x4000];
    prg[..program.len()].copy_from_slice(&program);
    prg[0x1000] = 0x40;
    prg[0x3FFA..0x4000].copy_from_slice(&[0x00, 0x90, 0x00, 0x80, 0x00, 0x90]);

    let mut chr = vec![0u8; 0x2000];
    for (i, byte) in chr.iter_mut().enumerate() {
        *byte = (i * 7) as u8;
    }
    Cartridge::new(prg, chr, Mirroring::Vertical)
}

fn bench_frame(c: &mut Criterion) {
    let mut emulator = Emulator::new();
    emulator.load_cartridge(cartridge()).unwrap();

    c.bench_function("run_frame", |b| {
        b.iter(|| {
            emulator.run_frame().unwrap();
            black_box(emulator.frame_count())
        })
    });
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
