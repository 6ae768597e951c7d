use clap::{Parser, ValueEnum};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tmram::types::{MAX_EXECUTION_STEPS, MAX_REGISTER_STEPS, MAX_SIMULATION_STEPS};
use tmram::{
    analyze, assemble, RegisterMachine, Simulation, Step, TapeMachine, TuringDefinition,
};
use tracing_subscriber::EnvFilter;

mod library;

use library::{MachineSave, BUILTINS};

#[derive(Parser)]
#[clap(author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// A machine save file (JSON), or a directory of them with --list
    #[clap(short, long, conflicts_with = "builtin")]
    machine: Option<PathBuf>,

    /// The machine to pick from a save file holding several
    #[clap(short, long, requires = "machine")]
    name: Option<String>,

    /// A built-in machine to run
    #[clap(short, long)]
    builtin: Option<String>,

    /// List the built-in machines, or the machines found under --machine
    #[clap(short, long)]
    list: bool,

    /// A register-machine assembly file to run instead of a Turing machine
    #[clap(short, long, conflicts_with_all = ["machine", "builtin"])]
    program: Option<PathBuf>,

    /// Comma-separated integer input for an assembly program
    #[clap(short, long, value_delimiter = ',', allow_hyphen_values = true)]
    input: Vec<i64>,

    /// Replaces the initial tape of the machine, one symbol per character
    #[clap(short, long)]
    tape: Option<String>,

    /// How to execute the Turing machine
    #[clap(long, value_enum, default_value_t = Mode::Simulate)]
    mode: Mode,

    /// Print every transition (or instruction, for assembly programs)
    #[clap(long)]
    trace: bool,

    /// Print the compiled register-machine program before running it
    #[clap(long)]
    listing: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Run the Turing machine on its own
    Turing,
    /// Compile the machine and run it in lockstep with its register program
    Simulate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    if cli.list {
        return list(cli);
    }

    if let Some(path) = &cli.program {
        return run_program(cli, &fs::read_to_string(path)?);
    }

    let save = select_machine(cli)?;
    let mut definition = save.to_definition();
    if let Some(tape) = &cli.tape {
        definition.tape = tape
            .chars()
            .enumerate()
            .map(|(i, c)| (i, c.to_string()))
            .collect();
    }

    analyze(&definition)?;
    println!("Machine: {}", save.name);

    match cli.mode {
        Mode::Turing => run_turing(cli, &definition),
        Mode::Simulate => run_simulation(cli, definition),
    }
}

fn list(cli: &Cli) -> Result<(), Box<dyn Error>> {
    match &cli.machine {
        Some(path) if path.is_dir() => {
            for result in library::load_directory(path) {
                match result {
                    Ok((path, machine)) => println!("{}: {}", path.display(), machine.name),
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
        Some(path) => {
            for machine in library::load_machines(path)? {
                println!("{}", machine.name);
            }
        }
        None => {
            for machine in BUILTINS.iter() {
                let description = machine.description.as_deref().unwrap_or_default();
                println!("{:<20} {}", machine.name, description);
            }
        }
    }

    Ok(())
}

fn select_machine(cli: &Cli) -> Result<MachineSave, Box<dyn Error>> {
    if let Some(path) = &cli.machine {
        let machines = library::load_machines(path)?;
        return Ok(library::select(&machines, cli.name.as_deref())?);
    }

    if let Some(name) = &cli.builtin {
        return Ok(library::builtin(name)?);
    }

    Err("no machine given: use --machine, --builtin or --program".into())
}

fn run_program(cli: &Cli, source: &str) -> Result<(), Box<dyn Error>> {
    let program = assemble(source)?;
    let mut ram = RegisterMachine::new(program, cli.input.iter().copied())?;

    if cli.listing {
        print_listing(&ram);
    }

    if cli.trace {
        for _ in 0..=MAX_REGISTER_STEPS {
            if let Some(instruction) = ram.current_instruction() {
                println!("{:>5}  {}", ram.instruction_pointer(), instruction);
            }
            if ram.step()? == Step::Halt {
                break;
            }
        }
        if !ram.has_ended() {
            return Err(format!("no halt within {MAX_REGISTER_STEPS} steps").into());
        }
    } else {
        ram.run()?;
    }

    println!("Output: {}", join(ram.output()));
    Ok(())
}

fn run_turing(cli: &Cli, definition: &TuringDefinition) -> Result<(), Box<dyn Error>> {
    let mut machine = TapeMachine::new(definition);

    if cli.trace {
        println!("{}", render_tape(&machine));
        while machine.step()? == Step::Continue {
            if let Some(rule) = machine.transition_history().last() {
                println!("{rule}");
            }
            println!("{}", render_tape(&machine));
            if machine.transition_history().len() >= MAX_EXECUTION_STEPS {
                return Err(format!("no final state within {MAX_EXECUTION_STEPS} steps").into());
            }
        }
    } else {
        machine.run()?;
    }

    println!("State: {}", machine.current_state());
    println!("Tape: {}", machine.tape_contents().concat());
    Ok(())
}

fn run_simulation(cli: &Cli, definition: TuringDefinition) -> Result<(), Box<dyn Error>> {
    let mut simulation = Simulation::new(definition)?;

    if cli.listing {
        let legend = simulation
            .legend()
            .iter()
            .map(|(symbol, code)| format!("{symbol}={code}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("Legend: {legend}");
        print_listing(simulation.ram());
    }

    if cli.trace {
        println!("{}", render_tape(simulation.turing()));
        while simulation.step_turing()? {
            if let Some(rule) = simulation.last_transition() {
                println!(
                    "{rule}  [ip {}, {}]",
                    simulation.ram().instruction_pointer(),
                    simulation.last_label().unwrap_or("-")
                );
            }
            println!("{}", render_tape(simulation.turing()));
            if simulation.history().len() >= MAX_SIMULATION_STEPS {
                return Err(format!("no halt within {MAX_SIMULATION_STEPS} micro-steps").into());
            }
        }
    } else {
        simulation.run()?;
    }

    println!("State: {}", simulation.turing().current_state());
    println!("Output: {}", simulation.output_symbols().concat());
    println!("Micro-steps: {}", simulation.history().len());
    Ok(())
}

fn print_listing(ram: &RegisterMachine) {
    for (index, instruction) in ram.program().iter().enumerate() {
        println!("{index:>5}  {instruction}");
    }
}

/// Renders the visited part of the tape with the head position in brackets.
fn render_tape(machine: &TapeMachine) -> String {
    let pointer = machine.tape_pointer();
    let first = machine.tape().keys().next().map_or(pointer, |&p| p.min(pointer));
    let last = machine.tape().keys().next_back().map_or(pointer, |&p| p.max(pointer));

    (first..=last)
        .map(|position| {
            let symbol = machine.read(position);
            if position == pointer {
                format!("[{symbol}]")
            } else {
                format!(" {symbol} ")
            }
        })
        .collect::<String>()
        + &format!("  ({})", machine.current_state())
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
