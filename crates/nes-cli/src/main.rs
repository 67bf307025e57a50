//! NES CLI - Command line interface for NES emulator

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use nes_core::{Cartridge, Emulator, Mirroring};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// NES Emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "A NES emulator CLI", long_about = None)]
struct Args {
    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a ROM headless for a number of frames
    Run {
        /// Path to the iNES ROM file
        #[arg(short, long)]
        rom: PathBuf,

        /// Number of frames to run
        #[arg(short, long, default_value_t = 60)]
        frames: u64,

        /// Dump CPU state after execution
        #[arg(short = 'c', long)]
        dump_cpu: bool,

        /// Dump PPU state after execution
        #[arg(short = 'p', long)]
        dump_ppu: bool,
    },
    /// Write a nestest-style execution trace
    Trace {
        /// Path to the iNES ROM file
        #[arg(short, long)]
        rom: PathBuf,

        /// Override the reset vector (hex, e.g. C000)
        #[arg(long, value_parser = parse_hex_address)]
        start_pc: Option<u16>,

        /// Maximum number of instructions to trace
        #[arg(short, long, default_value_t = 10_000)]
        steps: u64,

        /// Trace file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after the first BRK
        #[arg(long)]
        stop_on_brk: bool,
    },
    /// Print the iNES header of a ROM
    Info {
        /// Path to the iNES ROM file
        #[arg(short, long)]
        rom: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Run {
            rom,
            frames,
            dump_cpu,
            dump_ppu,
        } => run(&rom, frames, dump_cpu, dump_ppu),
        Command::Trace {
            rom,
            start_pc,
            steps,
            output,
            stop_on_brk,
        } => trace(&rom, start_pc, steps, output.as_deref(), stop_on_brk),
        Command::Info { rom } => show_info(&rom),
    }
}

/// Logs go to stderr so trace output on stdout stays clean. `RUST_LOG` wins
/// over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_hex_address(value: &str) -> Result<u16, String> {
    let digits = value
        .trim_start_matches('$')
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {value:?}: {e}"))
}

fn read_rom(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read ROM file {}", path.display()))
}

fn load_emulator(path: &Path) -> Result<Emulator> {
    let rom_data = read_rom(path)?;
    let mut emulator = Emulator::new();
    emulator
        .load_rom(&rom_data)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!(rom = %path.display(), "ROM loaded");
    Ok(emulator)
}

fn stopped_at(emulator: &Emulator) -> String {
    format!("emulation stopped at PC ${:04X}", emulator.cpu().registers().pc)
}

fn run(path: &Path, frames: u64, dump_cpu: bool, dump_ppu: bool) -> Result<()> {
    let mut emulator = load_emulator(path)?;
    if let Some(cartridge) = emulator.bus().cartridge() {
        print_cartridge(cartridge);
    }

    println!("\nRunning {} frames...", frames);
    emulator
        .run_frames(frames)
        .with_context(|| stopped_at(&emulator))?;
    println!("Completed {} frames.", emulator.frame_count());

    if dump_cpu {
        dump_cpu_state(&emulator);
    }
    if dump_ppu {
        dump_ppu_state(&emulator);
    }
    Ok(())
}

fn trace(
    path: &Path,
    start_pc: Option<u16>,
    steps: u64,
    output: Option<&Path>,
    stop_on_brk: bool,
) -> Result<()> {
    let mut emulator = load_emulator(path)?;
    if let Some(pc) = start_pc {
        debug!("starting at ${:04X}", pc);
        emulator.cpu_mut().registers_mut().pc = pc;
    }

    let mut out: Box<dyn Write> = match output {
        Some(file) => Box::new(BufWriter::new(File::create(file).with_context(|| {
            format!("failed to create trace file {}", file.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for _ in 0..steps {
        writeln!(out, "{}", emulator.trace_line()).context("failed to write trace")?;
        let result = emulator.step().with_context(|| stopped_at(&emulator))?;
        if stop_on_brk && result.did_break {
            debug!("BRK reached, stopping");
            break;
        }
    }
    out.flush().context("failed to write trace")?;
    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let rom_data = read_rom(path)?;
    let cartridge = Cartridge::from_rom(&rom_data)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    print_cartridge(&cartridge);

    let header = cartridge.header();
    println!("  Trainer: {}", header.has_trainer());
    println!("  Battery: {}", header.has_battery());
    println!("  CHR RAM: {}", cartridge.has_chr_ram());
    Ok(())
}

fn print_cartridge(cartridge: &Cartridge) {
    let mirroring = match cartridge.mirroring() {
        Mirroring::Horizontal => "horizontal",
        Mirroring::Vertical => "vertical",
        Mirroring::FourScreen => "four-screen",
    };
    println!("Loaded cartridge:");
    println!("  PRG ROM: {} bytes", cartridge.prg_rom().len());
    println!("  CHR ROM: {} bytes", cartridge.chr_rom().len());
    println!("  Mapper: {}", cartridge.mapper_id());
    println!("  Mirroring: {}", mirroring);
}

fn dump_cpu_state(emulator: &Emulator) {
    let cpu = emulator.cpu();
    let regs = cpu.registers();
    let status = cpu.status();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    ${:02X} ({})", status.bits(), status);
    println!("  Cycles: {}", emulator.total_cycles());
}

fn dump_ppu_state(emulator: &Emulator) {
    let ppu = emulator.ppu();

    println!("\nPPU State:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot: {}", ppu.cycle());
    println!("  Frame: {}", ppu.frame_count());
    println!("  CTRL: ${:02X}", ppu.control().bits());
    println!("  MASK: ${:02X}", ppu.mask().bits());
    println!("  VBLANK: {}", ppu.status().vblank());
    println!("  VRAM address: ${:04X}", ppu.vram_address());
}
