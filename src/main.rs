use log::{debug, error, info};
use std::env;
use std::fs::File;
use std::io::{self, prelude::*};
use std::path::Path;
use std::process;
use zexec::display_crossterm::CrosstermDisplay;
use zexec::display_logging::LoggingDisplay;
use zexec::display_trait::ZMachineDisplay;
use zexec::{EngineConfig, InputMode, Interpreter, RunState};

struct Options {
    story_path: String,
    config_path: Option<String>,
    seed: Option<u64>,
    limit: Option<u64>,
}

fn usage(program: &str) {
    println!("zexec - run Z-machine story files");
    println!();
    println!(
        "Usage: {} <story_file> [--config FILE] [--seed N] [--limit N]",
        program
    );
    println!();
    println!("  --config FILE  engine settings in TOML");
    println!("  --seed N       predictable random numbers");
    println!("  --limit N      stop after N instructions");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        story_path: String::new(),
        config_path: None,
        seed: None,
        limit: None,
    };
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                options.config_path = Some(iter.next().ok_or("--config needs a file")?.clone())
            }
            "--seed" => {
                let value = iter.next().ok_or("--seed needs a number")?;
                options.seed = Some(value.parse().map_err(|_| format!("Invalid seed: {}", value))?);
            }
            "--limit" => {
                let value = iter.next().ok_or("--limit needs a number")?;
                options.limit =
                    Some(value.parse().map_err(|_| format!("Invalid limit: {}", value))?);
            }
            other if options.story_path.is_empty() => options.story_path = other.to_string(),
            other => return Err(format!("Unexpected argument: {}", other)),
        }
    }
    if options.story_path.is_empty() {
        return Err("No story file given".to_string());
    }
    Ok(options)
}

fn load_story(path: &str) -> Result<Vec<u8>, String> {
    debug!("Loading story file: {}", path);
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => format!("Story file not found: {}", path),
        io::ErrorKind::PermissionDenied => {
            format!("Permission denied accessing story file: {}", path)
        }
        _ => format!("Cannot open story file '{}': {}", path, e),
    })?;
    let mut story = Vec::new();
    file.read_to_end(&mut story)
        .map_err(|e| format!("Cannot read story file '{}': {}", path, e))?;
    Ok(story)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return;
    }
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {}", message);
            usage(&args[0]);
            process::exit(2);
        }
    };

    match run(&options) {
        Ok(()) => debug!("Story ended normally"),
        Err(message) => {
            error!("{}", message);
            eprintln!("\nError: {}", message);
            process::exit(1);
        }
    }
}

fn run(options: &Options) -> Result<(), String> {
    let mut config = match &options.config_path {
        Some(path) => EngineConfig::load(Path::new(path)).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if options.seed.is_some() {
        config.engine.random_seed = options.seed;
    }
    if options.limit.is_some() {
        config.engine.instruction_limit = options.limit;
    }

    let story = load_story(&options.story_path)?;
    let display = CrosstermDisplay::new(config.screen.width as u16, config.screen.height as u16)
        .map_err(|e| e.to_string())?;
    // Trace every display call when debugging
    if log::log_enabled!(log::Level::Debug) {
        let display = LoggingDisplay::new(Box::new(display));
        drive(Interpreter::new(story, config, display).map_err(|e| e.to_string())?)
    } else {
        drive(Interpreter::new(story, config, display).map_err(|e| e.to_string())?)
    }
}

/// Alternate between running the story and feeding it lines from stdin
fn drive<D: ZMachineDisplay>(mut interpreter: Interpreter<D>) -> Result<(), String> {
    info!("Initial PC: {:05x}", interpreter.vm.pc);

    let stdin = io::stdin();
    loop {
        let state = interpreter.run().map_err(|e| e.to_string())?;
        let request = match state {
            RunState::Stopped => return Ok(()),
            RunState::Running => {
                info!("Instruction limit reached");
                return Ok(());
            }
            RunState::WaitingForInput(request) => request,
        };

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| e.to_string())?;
        if read == 0 {
            debug!("End of input");
            return Ok(());
        }
        // The terminal has already echoed the line
        interpreter
            .display_mut()
            .print_input_echo(&line)
            .map_err(|e| e.to_string())?;
        let result = match request.mode {
            InputMode::Line { .. } => interpreter.provide_line(&line),
            InputMode::Char => {
                let ch = line.chars().next().filter(|&c| c != '\r').unwrap_or('\n');
                interpreter.provide_char(ch)
            }
        };
        result.map_err(|e| e.to_string())?;
    }
}
