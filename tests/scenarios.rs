use tmram::types::{LEFT_BOUND_REGISTER, TAPE_BASE};
use tmram::{
    analyze, assemble, compile, Direction, ErrorKind, Instruction, MachineName, Op, Operand,
    RegisterMachine, Simulation, TapeMachine, TransitionRule, TuringDefinition, BLANK_SYMBOL,
};

const B: &str = BLANK_SYMBOL;

/// Decides aⁿbⁿcⁿ by crossing off one `a`, one `b` and one `c` per pass.
fn anbncn(word: &str) -> TuringDefinition {
    use Direction::{Left as L, Right as R, Stay as S};

    let table: [(&str, &str, &str, &str, Direction); 25] = [
        ("0", B, "acc", B, S),
        ("0", "a", "1", "x", R),
        ("0", "b", "rej", "b", S),
        ("0", "c", "rej", "c", S),
        ("0", "x", "0", "x", R),
        ("1", B, "rej", B, S),
        ("1", "a", "1", "a", R),
        ("1", "b", "2", "x", R),
        ("1", "c", "rej", "c", S),
        ("1", "x", "1", "x", R),
        ("2", B, "rej", B, S),
        ("2", "a", "rej", "a", S),
        ("2", "b", "2", "b", R),
        ("2", "c", "3", "x", R),
        ("2", "x", "2", "x", R),
        ("3", B, "4", B, L),
        ("3", "a", "rej", "a", S),
        ("3", "b", "rej", "b", S),
        ("3", "c", "3", "c", R),
        ("3", "x", "3", "x", R),
        ("4", B, "0", B, R),
        ("4", "a", "4", "a", L),
        ("4", "b", "4", "b", L),
        ("4", "c", "4", "c", L),
        ("4", "x", "4", "x", L),
    ];

    TuringDefinition {
        alphabet: [B, "a", "b", "c", "x"].map(String::from).to_vec(),
        tape: word
            .chars()
            .enumerate()
            .map(|(i, c)| (i, c.to_string()))
            .collect(),
        transition_functions: table
            .into_iter()
            .map(|(from, read, to, write, action)| {
                TransitionRule::new(from, read, to, write, action)
            })
            .collect(),
        initial_state: "0".to_string(),
        final_states: vec!["acc".to_string(), "rej".to_string()],
    }
}

#[test]
fn anbncn_is_valid() {
    assert!(analyze(&anbncn("abc")).is_ok());
}

#[test]
fn tape_machine_accepts_and_rejects() {
    let mut accepting = TapeMachine::new(&anbncn("aaabbbccc"));
    accepting.run().unwrap();
    assert_eq!(accepting.current_state(), "acc");
    assert!(accepting.tape_contents().iter().all(|symbol| symbol == "x"));

    let mut rejecting = TapeMachine::new(&anbncn("aabbbccc"));
    rejecting.run().unwrap();
    assert_eq!(rejecting.current_state(), "rej");
}

#[test]
fn compiled_program_matches_tape_machine() {
    for word in ["", "abc", "aaabbbccc", "aabbbccc", "acb"] {
        let definition = anbncn(word);

        let mut turing = TapeMachine::new(&definition);
        turing.run().unwrap();

        let (program, legend) = compile(&definition).unwrap();
        let mut ram = RegisterMachine::new(program.instructions, program.input).unwrap();
        ram.run().unwrap();

        let output: Vec<&str> = ram
            .output()
            .iter()
            .filter_map(|&code| legend.decode(code))
            .collect();
        assert_eq!(output, turing.tape_contents(), "word {word:?}");
    }
}

#[test]
fn macro_steps_replay_the_tape_machine() {
    let definition = anbncn("aabbcc");

    let mut turing = TapeMachine::new(&definition);
    turing.run().unwrap();

    let mut simulation = Simulation::new(definition).unwrap();
    let mut transitions = Vec::new();
    while simulation.step_turing().unwrap() {
        transitions.push(simulation.last_transition().cloned().unwrap());
    }

    assert_eq!(transitions, turing.transition_history());
    assert_eq!(simulation.turing().current_state(), "acc");
    assert_eq!(simulation.last_exit(), Some("acc"));
    assert!(simulation.is_halted());
    assert_eq!(simulation.output_symbols(), vec!["x"; 6]);
}

#[test]
fn lockstep_reaches_rejection() {
    let mut simulation = Simulation::new(anbncn("aabbbccc")).unwrap();
    simulation.run().unwrap();

    assert_eq!(simulation.turing().current_state(), "rej");
    assert_eq!(simulation.last_exit(), Some("rej"));
    assert!(simulation.ram().is_halted());
}

#[test]
fn lockstep_rewinds_to_the_start() {
    let mut simulation = Simulation::new(anbncn("abc")).unwrap();
    let initial = simulation.state();
    simulation.run().unwrap();

    while simulation.backstep_turing() {}

    assert_eq!(simulation.state(), initial);
    assert!(simulation.turing().transition_history().is_empty());
}

#[test]
fn assembled_countdown() {
    let program = assemble(
        "
        ; copies the input minus one down to zero into the output
                R1 := READ()
        loop:   R1 := R1 - 1
                WRITE(R1)
                if (R1 > 0) goto loop
                halt
        ",
    )
    .unwrap();

    let mut ram = RegisterMachine::new(program, [3]).unwrap();
    ram.run().unwrap();
    assert_eq!(ram.output(), &[2, 1, 0]);
    assert!(ram.is_halted());
}

#[test]
fn self_jump_exhausts_the_budget() {
    let program = vec![Instruction::new(Op::Jump { target: 0.into() })];
    let mut ram = RegisterMachine::new(program, []).unwrap();

    let error = ram.run().unwrap_err();
    assert_eq!(error.machine, MachineName::RegisterMachine);
    assert_eq!(error.kind, ErrorKind::StepBudgetExceeded(2000));
}

#[test]
fn compiled_listing_reassembles() {
    let (program, _) = compile(&anbncn("abc")).unwrap();
    let listing: Vec<String> = program.instructions.iter().map(|i| i.to_string()).collect();

    let reassembled = assemble(&listing.join("\n")).unwrap();
    let ops: Vec<&Op> = reassembled.iter().map(|i| &i.op).collect();
    let expected: Vec<&Op> = program.instructions.iter().map(|i| &i.op).collect();
    assert_eq!(ops, expected);

    let mut ram = RegisterMachine::new(reassembled, program.input).unwrap();
    ram.run().unwrap();
    assert_eq!(ram.output().len(), 3);
    assert!(matches!(
        program.instructions[0].op,
        Op::Load {
            to: 0,
            value: Operand::Constant(TAPE_BASE)
        }
    ));
}

/// Writes `x` on an empty tape and moves by `action`.
fn write_on_empty_tape(action: Direction) -> TuringDefinition {
    TuringDefinition {
        alphabet: [B, "x"].map(String::from).to_vec(),
        tape: Default::default(),
        transition_functions: vec![TransitionRule::new("s", B, "end", "x", action)],
        initial_state: "s".to_string(),
        final_states: vec!["end".to_string()],
    }
}

#[test]
fn empty_tape_writes_reach_the_output() {
    for action in [Direction::Stay, Direction::Left, Direction::Right] {
        let definition = write_on_empty_tape(action);
        assert!(analyze(&definition).is_ok());

        let mut turing = TapeMachine::new(&definition);
        turing.run().unwrap();
        assert_eq!(turing.tape_contents(), vec!["x"]);

        let mut simulation = Simulation::new(definition).unwrap();
        simulation.run().unwrap();
        assert_eq!(simulation.output_symbols(), turing.tape_contents(), "{action}");
    }
}

/// Writes `a` and steps left `cells` times, one state per step.
fn walk_left(cells: usize) -> TuringDefinition {
    TuringDefinition {
        alphabet: [B, "a"].map(String::from).to_vec(),
        tape: Default::default(),
        transition_functions: (0..cells)
            .map(|i| {
                TransitionRule::new(format!("w{i}"), B, format!("w{}", i + 1), "a", Direction::Left)
            })
            .collect(),
        initial_state: "w0".to_string(),
        final_states: vec![format!("w{cells}")],
    }
}

#[test]
fn long_leftward_walk_stays_in_sync() {
    let cells = 300;
    let definition = walk_left(cells);
    assert!(analyze(&definition).is_ok());

    let mut turing = TapeMachine::new(&definition);
    turing.run().unwrap();
    assert_eq!(turing.tape_contents().len(), cells);

    let mut simulation = Simulation::new(definition).unwrap();
    simulation.run().unwrap();

    assert!(simulation.turing().is_terminal());
    assert_eq!(simulation.output_symbols(), turing.tape_contents());
    assert_eq!(
        simulation.ram().read_memory(LEFT_BOUND_REGISTER),
        TAPE_BASE - cells as i64
    );
}
