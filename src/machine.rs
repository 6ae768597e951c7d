//! This module defines the `TapeMachine` struct, which simulates a single-tape Turing machine
//! over a sparse tape. It handles rule lookup, head movement and a snapshot history that
//! allows stepping backwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace, warn};

use crate::types::{
    ErrorKind, MachineError, MachineName, State, Step, Symbol, TransitionRule, TuringDefinition,
    BLANK_SYMBOL, MAX_EXECUTION_STEPS,
};

/// A sparse tape. Positions without an entry hold the blank symbol.
pub type Tape = BTreeMap<i64, Symbol>;

/// A value copy of everything a Turing machine step can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeMachineState {
    pub tape: Tape,
    pub tape_pointer: i64,
    pub current_state: State,
    pub transition_history: Vec<TransitionRule>,
}

/// Represents a single-tape Turing machine.
///
/// This struct encapsulates the live configuration (tape, head position, current state and
/// the rules applied so far) together with the rule table and final states of the
/// definition it was built from.
#[derive(Debug, Clone)]
pub struct TapeMachine {
    rules: Vec<TransitionRule>,
    final_states: HashSet<State>,
    alphabet: Vec<Symbol>,
    tape: Tape,
    tape_pointer: i64,
    current_state: State,
    transition_history: Vec<TransitionRule>,
    history: Vec<TapeMachineState>,
}

impl TapeMachine {
    /// Creates a new `TapeMachine` from a given `TuringDefinition`.
    ///
    /// The head starts at position 0 in the definition's initial state.
    pub fn new(definition: &TuringDefinition) -> Self {
        debug!(
            rules = definition.transition_functions.len(),
            initial_state = %definition.initial_state,
            "tape_machine_created"
        );

        Self {
            rules: definition.transition_functions.clone(),
            final_states: definition.final_states.iter().cloned().collect(),
            alphabet: definition.alphabet.clone(),
            tape: definition
                .tape
                .iter()
                .map(|(&pos, symbol)| (pos as i64, symbol.clone()))
                .collect(),
            tape_pointer: 0,
            current_state: definition.initial_state.clone(),
            transition_history: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Applies the first rule matching the current state and the symbol under the head.
    ///
    /// # Returns
    ///
    /// * `Ok(Step::Continue)` if a rule was applied.
    /// * `Ok(Step::Halt)` if the machine is already in a final state.
    /// * `Err(ErrorKind::NoMatchingTransition)` if no rule matches. The machine is left
    ///   unchanged.
    pub fn step(&mut self) -> Result<Step, MachineError> {
        if self.is_terminal() {
            return Ok(Step::Halt);
        }

        let Some(rule) = self.transition().cloned() else {
            return Err(MachineError::new(
                MachineName::TapeMachine,
                ErrorKind::NoMatchingTransition {
                    state: self.current_state.clone(),
                    symbol: self.symbol().to_string(),
                },
            ));
        };

        self.history.push(self.state());
        trace!(pointer = self.tape_pointer, %rule, "tape_step");

        self.tape.insert(self.tape_pointer, rule.symbol_to.clone());
        self.current_state = rule.state_to.clone();
        self.tape_pointer += rule.action.offset();
        self.transition_history.push(rule);

        Ok(Step::Continue)
    }

    /// Runs the machine until it reaches a final state.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::StepBudgetExceeded)` after `MAX_EXECUTION_STEPS` transitions.
    /// * `Err(ErrorKind::NoMatchingTransition)` if the machine gets stuck.
    pub fn run(&mut self) -> Result<(), MachineError> {
        for _ in 0..MAX_EXECUTION_STEPS {
            if self.step()? == Step::Halt {
                return Ok(());
            }
        }

        if self.is_terminal() {
            return Ok(());
        }

        warn!(budget = MAX_EXECUTION_STEPS, "tape_step_budget_exceeded");
        Err(MachineError::new(
            MachineName::TapeMachine,
            ErrorKind::StepBudgetExceeded(MAX_EXECUTION_STEPS),
        ))
    }

    /// Undoes the most recent transition. Does nothing if there is no history.
    pub fn backstep(&mut self) -> bool {
        match self.history.pop() {
            Some(state) => {
                self.restore(&state);
                true
            }
            None => false,
        }
    }

    /// Resets the machine to its initial configuration and clears the history.
    pub fn reset(&mut self) {
        if let Some(initial) = self.history.first().cloned() {
            self.restore(&initial);
        }
        self.history.clear();
    }

    /// Finds the first rule matching the current state and the symbol under the head.
    pub fn transition(&self) -> Option<&TransitionRule> {
        let symbol = self.symbol();
        self.rules
            .iter()
            .find(|rule| rule.state_from == self.current_state && rule.symbol_from == symbol)
    }

    /// Returns the symbol under the head, or blank if the cell was never written.
    pub fn symbol(&self) -> &str {
        self.read(self.tape_pointer)
    }

    /// Returns the symbol at `position`, or blank if the cell was never written.
    pub fn read(&self, position: i64) -> &str {
        self.tape
            .get(&position)
            .map(String::as_str)
            .unwrap_or(BLANK_SYMBOL)
    }

    /// Returns the tape from the leftmost to the rightmost non-blank cell.
    ///
    /// | □ | a | □ | b | □ |
    ///  -1   0   1   2   3
    ///
    /// yields `["a", "□", "b"]`.
    pub fn tape_contents(&self) -> Vec<Symbol> {
        let mut written = self
            .tape
            .iter()
            .filter(|(_, symbol)| symbol.as_str() != BLANK_SYMBOL)
            .map(|(&pos, _)| pos);

        let Some(first) = written.next() else {
            return Vec::new();
        };
        let last = written.last().unwrap_or(first);

        (first..=last).map(|pos| self.read(pos).to_string()).collect()
    }

    /// Returns a value copy of the live state.
    pub fn state(&self) -> TapeMachineState {
        TapeMachineState {
            tape: self.tape.clone(),
            tape_pointer: self.tape_pointer,
            current_state: self.current_state.clone(),
            transition_history: self.transition_history.clone(),
        }
    }

    fn restore(&mut self, state: &TapeMachineState) {
        self.tape = state.tape.clone();
        self.tape_pointer = state.tape_pointer;
        self.current_state = state.current_state.clone();
        self.transition_history = state.transition_history.clone();
    }

    /// Restores `state` and truncates the history to `depth` entries.
    pub(crate) fn rewind(&mut self, state: &TapeMachineState, depth: usize) {
        self.restore(state);
        self.history.truncate(depth);
    }

    /// Checks if the machine is in one of its final states.
    pub fn is_terminal(&self) -> bool {
        self.final_states.contains(&self.current_state)
    }

    /// Returns the current state of the machine.
    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn tape_pointer(&self) -> i64 {
        self.tape_pointer
    }

    /// The rules applied since the last reset, oldest first.
    pub fn transition_history(&self) -> &[TransitionRule] {
        &self.transition_history
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// The tape alphabet with the blank symbol first.
    pub fn tape_alphabet(&self) -> Vec<&str> {
        std::iter::once(BLANK_SYMBOL)
            .chain(
                self.alphabet
                    .iter()
                    .map(String::as_str)
                    .filter(|&symbol| symbol != BLANK_SYMBOL),
            )
            .collect()
    }

    /// Snapshots taken before each transition since the last reset, oldest first.
    pub fn history(&self) -> &[TapeMachineState] {
        &self.history
    }

    /// The state before the most recent transition, for highlighting what changed.
    pub fn previous_state(&self) -> Option<&TapeMachineState> {
        self.history.last()
    }
}
