//! MIX Emulator - CLI Entry Point
//!
//! Commands:
//! - `mix-emu run <image>` - Run a program image until it halts
//! - `mix-emu disasm <image>` - Disassemble a program image
//! - `mix-emu dump <image>` - Show memory after loading an image

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use mix::asm::{disassemble, load_image, ProgramImage};
use mix::cpu::{Machine, Register};

#[derive(Parser)]
#[command(name = "mix-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of Knuth's MIX computer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program image (.json or text)
        image: String,
        /// Start address, overriding the image's
        #[arg(short, long)]
        start: Option<u16>,
        /// Maximum number of instructions to run
        #[arg(short, long, default_value = "100000")]
        max_steps: u64,
        /// Print every instruction as it executes
        #[arg(short, long)]
        trace: bool,
    },
    /// Disassemble a program image
    Disasm {
        /// Path to the program image
        image: String,
    },
    /// Load a program image and print a memory range
    Dump {
        /// Path to the program image
        image: String,
        /// First address to print
        #[arg(short, long, default_value = "0")]
        from: usize,
        /// Number of cells to print
        #[arg(short, long, default_value = "100")]
        count: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Run { image, start, max_steps, trace } => {
            run_program(&image, start, max_steps, trace);
        }
        Commands::Disasm { image } => {
            disassemble_file(&image);
        }
        Commands::Dump { image, from, count } => {
            dump_memory(&image, from, count);
        }
    }
}

/// Log filtering follows `RUST_LOG`, defaulting to `info`.
fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"));
    match filter_layer {
        Ok(filter_layer) => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init(),
        Err(e) => eprintln!("warning: logging disabled: {}", e),
    }
}

fn load(path: &str) -> ProgramImage {
    match load_image(path) {
        Ok(image) => {
            tracing::info!(path, cells = image.cells.len(), start = image.start, "loaded image");
            image
        }
        Err(e) => {
            eprintln!("Failed to load {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn load_machine(image: &ProgramImage) -> Machine {
    let mut machine = Machine::new();
    if let Err(e) = machine.load_image(image) {
        eprintln!("Failed to load program: {}", e);
        std::process::exit(1);
    }
    machine
}

fn run_program(path: &str, start: Option<u16>, max_steps: u64, trace: bool) {
    let image = load(path);
    let mut machine = load_machine(&image);
    if let Some(start) = start {
        if let Err(e) = machine.set_pc(start) {
            eprintln!("Bad start address: {}", e);
            std::process::exit(1);
        }
    }

    let mut steps = 0u64;
    while machine.is_running() && steps < max_steps {
        let pc = machine.regs.pc;

        match machine.step() {
            Ok(_) => {
                if trace {
                    if let Some(instr) = machine.last_instruction() {
                        println!(
                            "{:04}: {:<24} A={} X={} J={}",
                            pc,
                            instr.to_string(),
                            machine.regs.a().to_i64(),
                            machine.regs.x().to_i64(),
                            machine.regs.j().to_i64(),
                        );
                    }
                }
                steps += 1;
            }
            Err(e) => {
                eprintln!("Machine error at PC={}: {}", pc, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("Steps:      {}", steps);
    println!("Time:       {}u", machine.clock);
    println!("State:      {:?}", machine.state);
    println!("PC:         {}", machine.regs.pc);
    for reg in Register::OPERAND_ORDER.iter().chain([Register::J].iter()) {
        let value = machine.regs.get(*reg);
        println!("{:<11} {} ({})", format!("{}:", reg), value, value.to_i64());
    }
    println!("Overflow:   {}", machine.regs.overflow);
    println!("Comparison: {:?}", machine.regs.comparison);

    if machine.is_running() {
        println!();
        println!("Reached step limit ({}). Use --max-steps to increase.", max_steps);
    }
}

fn disassemble_file(path: &str) {
    let image = load(path);
    let Some((low, high)) = image.extent() else {
        println!("; empty image");
        return;
    };
    let words = image.words(low, (high - low) as usize + 1);
    print!("{}", disassemble(&words, low as usize));
}

fn dump_memory(path: &str, from: usize, count: usize) {
    let image = load(path);
    let machine = load_machine(&image);
    for (addr, word) in machine.mem.dump(from, count) {
        if !word.is_zero() {
            println!("{:04}: {}  ({})", addr, word, word.to_i64());
        }
    }
}
