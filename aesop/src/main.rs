use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use std::{fs, process, sync::Arc};

use aesop::{
    Address, BOOTSTRAP, BOOTSTRAP_PROGRAM, ContainerWriter, Engine, EngineConfig, GameVariant, ImportSlot, PROGRAM_HEADER_SIZE,
    ProgramRef, ResourceManager,
};
use bytecode::BytecodeDecoder;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the named resources of a resource file
    List { file: String },

    /// Disassemble a program resource
    Dump {
        file: String,
        /// Resource name or numeric id
        program: String,
    },

    /// Create the bootstrap object and run until it returns
    Run {
        file: String,
        #[arg(long, default_value = BOOTSTRAP_PROGRAM)]
        program: String,
        #[arg(long, default_value_t = BOOTSTRAP)]
        index: usize,
        #[arg(long, value_enum, default_value_t = Variant::Eob3)]
        variant: Variant,
        /// Instructions a single message may execute
        #[arg(long)]
        budget: Option<u64>,
        /// Stop SAB from falling through into SAW
        #[arg(long)]
        no_sab_fallthrough: bool,
    },

    /// Build a resource file from `name=path` pairs
    Pack {
        out: String,
        #[arg(required = true)]
        entries: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Variant {
    Eob3,
    Hack,
}

impl From<Variant> for GameVariant {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Eob3 => GameVariant::Eob3,
            Variant::Hack => GameVariant::DungeonHack,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match cli.command {
        Command::List { file } => list(&open(&file)),
        Command::Dump { file, program } => dump(open(&file), &program),
        Command::Run {
            file,
            program,
            index,
            variant,
            budget,
            no_sab_fallthrough,
        } => {
            let mut config = EngineConfig {
                variant: variant.into(),
                instruction_budget: budget,
                ..EngineConfig::default()
            };
            config.quirks.sab_falls_through = !no_sab_fallthrough;
            run(open(&file), config, &program, index);
        }
        Command::Pack { out, entries } => pack(&out, &entries),
    }
}

fn open(file: &str) -> ResourceManager {
    match ResourceManager::open(file) {
        Ok(rm) => rm,
        Err(err) => {
            eprintln!("Error opening '{}': {}", file, err);
            process::exit(1);
        }
    }
}

fn list(rm: &ResourceManager) {
    for (name, id) in rm.names() {
        match rm.resource(id) {
            Ok(res) => println!("{:>6}  {:>8}  {}", id, res.size(), name),
            Err(err) => println!("{:>6}  {:>8}  {} ({})", id, "?", name, err),
        }
    }
}

fn program_id(rm: &ResourceManager, program: &str) -> u32 {
    if let Ok(id) = program.parse::<u32>() {
        return id;
    }
    match rm.resource_id(program) {
        Ok(id) => id,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}

fn dump(rm: ResourceManager, program: &str) {
    let id = program_id(&rm, program);
    let mut engine = Engine::new(Arc::new(rm), EngineConfig::default());
    let thunk = match engine.load_thunk(id) {
        Ok(thunk) => thunk,
        Err(err) => {
            eprintln!("Error loading program {}: {}", program, err);
            process::exit(1);
        }
    };

    let header = thunk.header();
    println!("== program {} ==", id);
    if id > Address::MAX_INDEX {
        println!(
            "warning: id {} exceeds {}, code addresses (LECA, LTxA) in this program will fail",
            id,
            Address::MAX_INDEX
        );
    }
    println!("parent:  {:?}", header.parent);
    println!("statics: {} bytes at {}", header.static_size, thunk.static_base());
    println!("imports:");
    for (slot, import) in thunk.imports().iter().enumerate() {
        match import {
            ImportSlot::Code(func) => {
                let name = engine.intrinsics().get(*func).map_or("?", |d| d.name);
                println!("  [{}] code {}", slot, name);
            }
            ImportSlot::Variable(xref) => {
                println!("  [{}] {:?} {} of {} @{}", slot, xref.width, xref.name, xref.class, xref.offset)
            }
            ImportSlot::Unused => println!("  [{}] -", slot),
        }
    }
    println!("handlers:");
    for (message, offset) in thunk.handlers() {
        println!("  msg {:<6} -> {:04x}", message, offset);
    }

    println!("code:");
    let handler_at = |pc: usize| thunk.handlers().iter().find(|&(_, &o)| o as usize == pc).map(|(m, _)| *m);
    let code = thunk.code();
    let mut decoder = BytecodeDecoder::at(code, PROGRAM_HEADER_SIZE);
    while !decoder.is_at_end() {
        let pc = decoder.offset();
        if let Some(message) = handler_at(pc) {
            let frame = code.get(pc..pc + 2).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
            println!("msg {}: (frame {})", message, frame);
            decoder.seek(pc + 2);
            continue;
        }
        match decoder.decode() {
            Ok(instr) => println!("  {:04x}  {}", pc, instr),
            Err(err) => {
                println!("  {:04x}  ?? {}", pc, err);
                break;
            }
        }
    }
}

fn run(rm: ResourceManager, config: EngineConfig, program: &str, index: usize) {
    let program_ref = match program.parse::<u32>() {
        Ok(id) => ProgramRef::Id(id),
        Err(_) => ProgramRef::Name(program),
    };
    let mut engine = Engine::new(Arc::new(rm), config);
    if let Err(err) = engine.create_program(Some(index), program_ref) {
        eprintln!("Error running {}: {}", program, err);
        process::exit(1);
    }
    println!(
        "{} objects live, {} programs loaded",
        engine.live_objects().count(),
        engine.loaded_thunks()
    );
}

fn pack(out: &str, entries: &[String]) {
    let mut writer = ContainerWriter::new();
    for entry in entries {
        let Some((name, path)) = entry.split_once('=') else {
            eprintln!("Error: expected name=path, got '{}'", entry);
            process::exit(1);
        };
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", path, err);
                process::exit(1);
            }
        };
        let id = writer.push(Some(name), data);
        println!("{:>6}  {}", id, name);
    }
    if let Err(err) = writer.write_to(out) {
        eprintln!("Error writing '{}': {}", out, err);
        process::exit(1);
    }
}
