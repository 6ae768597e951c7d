//! This module defines the core data structures shared by both machine models: Turing machine
//! definitions and transition rules, execution results, the common error type, and the
//! constants that fix the layout of compiled register-machine programs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::assembler::Rule;

/// The blank symbol of every Turing machine alphabet.
pub const BLANK_SYMBOL: &str = "□";
/// The maximum number of instructions `RegisterMachine::run` executes before failing.
pub const MAX_REGISTER_STEPS: usize = 2000;
/// The maximum number of transitions `TapeMachine::run` applies before failing.
pub const MAX_EXECUTION_STEPS: usize = 10000;
/// The maximum number of micro-steps `Simulation::run` performs before failing.
pub const MAX_SIMULATION_STEPS: usize = 200_000;

/// Memory address of tape position 0 in a compiled program. Lies further above the
/// registers than any step ceiling allows the head to travel.
pub const TAPE_BASE: Value = 1 << 20;
/// Value terminating the encoded tape in the input queue of a compiled program.
pub const END_OF_INPUT: Value = -1;
/// Register holding the address of the cell under the head.
pub const POINTER_REGISTER: Address = 0;
/// Register holding the symbol code read by a dispatch block.
pub const SYMBOL_REGISTER: Address = 1;
/// Register holding one past the rightmost visited tape address.
pub const RIGHT_BOUND_REGISTER: Address = 2;
/// Register holding the leftmost visited tape address.
pub const LEFT_BOUND_REGISTER: Address = 3;

/// A register-machine word.
pub type Value = i64;
/// A register-machine memory address. Registers are plain memory cells.
pub type Address = i64;
/// A Turing machine state name.
pub type State = String;
/// A Turing machine tape symbol. Valid symbols are exactly one character long.
pub type Symbol = String;

/// A complete single-tape Turing machine as supplied by an editor or importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuringDefinition {
    /// Tape alphabet, including the blank symbol.
    pub alphabet: Vec<Symbol>,
    /// Initial tape contents. Unlisted positions hold the blank symbol.
    #[serde(default)]
    pub tape: BTreeMap<usize, Symbol>,
    /// Transition rules in declaration order.
    pub transition_functions: Vec<TransitionRule>,
    pub initial_state: State,
    pub final_states: Vec<State>,
}

impl TuringDefinition {
    /// Checks whether `state` is one of the final states.
    pub fn is_final(&self, state: &str) -> bool {
        self.final_states.iter().any(|s| s == state)
    }

    /// Returns the rules leaving `state`, in declaration order.
    pub fn rules_from<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a TransitionRule> {
        self.transition_functions
            .iter()
            .filter(move |rule| rule.state_from == state)
    }

    /// Returns the initial tape as a dense vector of symbols from position 0 to the
    /// highest listed position, filling gaps with the blank symbol.
    pub fn tape_cells(&self) -> Vec<Symbol> {
        let len = self.tape.keys().next_back().map_or(0, |&last| last + 1);
        (0..len)
            .map(|pos| {
                self.tape
                    .get(&pos)
                    .cloned()
                    .unwrap_or_else(|| BLANK_SYMBOL.to_string())
            })
            .collect()
    }
}

/// A single transition rule: in `state_from` reading `symbol_from`, write `symbol_to`,
/// move by `action` and continue in `state_to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionRule {
    pub state_from: State,
    pub symbol_from: Symbol,
    pub state_to: State,
    pub symbol_to: Symbol,
    pub action: Direction,
}

impl TransitionRule {
    pub fn new(
        state_from: impl Into<State>,
        symbol_from: impl Into<Symbol>,
        state_to: impl Into<State>,
        symbol_to: impl Into<Symbol>,
        action: Direction,
    ) -> Self {
        Self {
            state_from: state_from.into(),
            symbol_from: symbol_from.into(),
            state_to: state_to.into(),
            symbol_to: symbol_to.into(),
            action,
        }
    }
}

impl fmt::Display for TransitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) -> ({}, {}, {})",
            self.state_from, self.symbol_from, self.state_to, self.symbol_to, self.action
        )
    }
}

/// Represents the possible head movements. Serialized as `-1`, `0` and `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Direction {
    /// Move the head one position to the left.
    Left,
    /// Keep the head in the same position.
    Stay,
    /// Move the head one position to the right.
    Right,
}

impl Direction {
    /// The signed head offset of this direction.
    pub fn offset(self) -> i64 {
        match self {
            Direction::Left => -1,
            Direction::Stay => 0,
            Direction::Right => 1,
        }
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        direction.offset() as i8
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Direction::Left),
            0 => Ok(Direction::Stay),
            1 => Ok(Direction::Right),
            other => Err(format!("invalid head action {other}, expected -1, 0 or 1")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Direction::Left => 'L',
            Direction::Stay => 'S',
            Direction::Right => 'R',
        };
        write!(f, "{c}")
    }
}

/// Represents the outcome of a single machine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The machine performed a step and can continue.
    Continue,
    /// The machine had already stopped, nothing was executed.
    Halt,
}

/// Names the component an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineName {
    RegisterMachine,
    TapeMachine,
    Simulation,
    Assembler,
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MachineName::RegisterMachine => "register machine",
            MachineName::TapeMachine => "Turing machine",
            MachineName::Simulation => "simulation",
            MachineName::Assembler => "assembler",
        })
    }
}

/// The ways a machine operation can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// Two instructions of one program carry the same label.
    #[error("Duplicate label '{label}' at instructions {first} and {second}")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },
    /// A jump names a label the program does not define.
    #[error("Unresolved label '{0}'")]
    UnresolvedLabel(String),
    /// A bounded run did not finish within its step ceiling.
    #[error("Step budget of {0} steps exceeded")]
    StepBudgetExceeded(usize),
    /// No rule is defined for the current state and symbol.
    #[error("No transition defined for state '{state}' and symbol '{symbol}'")]
    NoMatchingTransition { state: State, symbol: Symbol },
    /// A symbol outside the legend was encoded.
    #[error("Unknown symbol '{0}' to encode")]
    UnknownSymbol(Symbol),
    /// The register machine and the Turing machine disagree about having stopped.
    #[error("One machine ended before the other (register machine halted: {halted}, Turing machine terminal: {terminal})")]
    Consistency { halted: bool, terminal: bool },
    /// The compiled program could not be built.
    #[error("Failed to compile Turing machine definition")]
    Compilation,
    /// Register-machine assembly could not be parsed.
    #[error("Program parsing error: {0}")]
    Syntax(Box<pest::error::Error<Rule>>),
}

/// The single error shape of the crate: the originating machine, what went wrong and,
/// optionally, the error that caused it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{machine}: {kind}")]
pub struct MachineError {
    pub machine: MachineName,
    pub kind: ErrorKind,
    #[source]
    pub cause: Option<Box<MachineError>>,
}

impl MachineError {
    pub fn new(machine: MachineName, kind: ErrorKind) -> Self {
        Self {
            machine,
            kind,
            cause: None,
        }
    }

    /// Attaches the underlying error.
    pub fn caused_by(mut self, cause: MachineError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The human readable message, without the machine name.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serialization() {
        let left_json = serde_json::to_string(&Direction::Left).unwrap();
        let right_json = serde_json::to_string(&Direction::Right).unwrap();

        assert_eq!(left_json, "-1");
        assert_eq!(right_json, "1");

        let stay: Direction = serde_json::from_str("0").unwrap();
        assert_eq!(stay, Direction::Stay);
        assert!(serde_json::from_str::<Direction>("2").is_err());
    }

    #[test]
    fn test_definition_deserialization() {
        let json = r#"{
            "alphabet": ["□", "a"],
            "tape": {"0": "a", "2": "a"},
            "transition_functions": [
                {"state_from": "0", "symbol_from": "a", "state_to": "acc", "symbol_to": "a", "action": 1}
            ],
            "initial_state": "0",
            "final_states": ["acc"]
        }"#;

        let definition: TuringDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.transition_functions[0].action, Direction::Right);
        assert_eq!(definition.tape_cells(), vec!["a", "□", "a"]);
        assert!(definition.is_final("acc"));
        assert_eq!(definition.rules_from("0").count(), 1);
    }

    #[test]
    fn test_rule_display() {
        let rule = TransitionRule::new("0", "a", "1", "x", Direction::Right);
        assert_eq!(rule.to_string(), "(0, a) -> (1, x, R)");
    }

    #[test]
    fn test_error_display() {
        let error = MachineError::new(
            MachineName::TapeMachine,
            ErrorKind::NoMatchingTransition {
                state: "q0".to_string(),
                symbol: "a".to_string(),
            },
        );

        let error_msg = format!("{}", error);
        assert!(error_msg.starts_with("Turing machine: "));
        assert!(error_msg.contains("q0"));
        assert_eq!(
            error.message(),
            "No transition defined for state 'q0' and symbol 'a'"
        );
    }

    #[test]
    fn test_error_cause() {
        use std::error::Error as _;

        let cause = MachineError::new(
            MachineName::RegisterMachine,
            ErrorKind::UnresolvedLabel("loop".to_string()),
        );
        let error = MachineError::new(MachineName::Simulation, ErrorKind::Compilation)
            .caused_by(cause.clone());

        let source = error.source().unwrap().to_string();
        assert_eq!(source, cause.to_string());
    }
}
