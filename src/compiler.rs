//! This module compiles a single-tape Turing machine into an equivalent register-machine
//! program.
//!
//! Memory layout of a compiled program:
//!
//! | address          | contents                                   |
//! |------------------|--------------------------------------------|
//! | `R0`             | address of the cell under the head         |
//! | `R1`             | symbol code read by the last dispatch      |
//! | `R2`             | one past the rightmost visited tape cell   |
//! | `R3`             | leftmost visited tape cell                 |
//! | `TAPE_BASE + i`  | code of the symbol at tape position `i`    |
//!
//! The encoded tape arrives through the input queue, terminated by `END_OF_INPUT`. When the
//! machine reaches a final state the visited part of the tape, trimmed of blanks at both
//! ends, is written to the output queue.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::instruction::{CompareOp, Instruction, JumpTarget, Op, Operand, Tag};
use crate::types::{
    Address, ErrorKind, MachineError, MachineName, Symbol, TransitionRule, TuringDefinition,
    Value, BLANK_SYMBOL, END_OF_INPUT, LEFT_BOUND_REGISTER, POINTER_REGISTER,
    RIGHT_BOUND_REGISTER, SYMBOL_REGISTER, TAPE_BASE,
};

const INPUT_LABEL: &str = "@input";
const SEEK_LABEL: &str = "@seek";
const BEGIN_LABEL: &str = "@begin";
const FINALIZE_LABEL: &str = "@finalize";
const TRIM_LABEL: &str = "@trim";
const EMIT_LABEL: &str = "@emit";
const DONE_LABEL: &str = "@done";
const STUCK_LABEL: &str = "@stuck";

/// Bijection between alphabet symbols and register values. The blank symbol is always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLegend {
    symbols: Vec<Symbol>,
    codes: HashMap<Symbol, Value>,
}

impl SymbolLegend {
    /// Assigns 0 to the blank symbol and 1..N to the other symbols in declaration order.
    pub fn new(alphabet: &[Symbol]) -> Self {
        let mut legend = Self {
            symbols: Vec::new(),
            codes: HashMap::new(),
        };

        legend.insert(BLANK_SYMBOL);
        for symbol in alphabet {
            legend.insert(symbol);
        }

        legend
    }

    fn insert(&mut self, symbol: &str) {
        if !self.codes.contains_key(symbol) {
            self.codes
                .insert(symbol.to_string(), self.symbols.len() as Value);
            self.symbols.push(symbol.to_string());
        }
    }

    /// Returns the code of `symbol`.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::UnknownSymbol)` if the symbol is not part of the alphabet.
    pub fn encode(&self, symbol: &str) -> Result<Value, MachineError> {
        self.codes.get(symbol).copied().ok_or_else(|| {
            MachineError::new(
                MachineName::Simulation,
                ErrorKind::UnknownSymbol(symbol.to_string()),
            )
        })
    }

    /// Returns the symbol with the given code, if there is one.
    pub fn decode(&self, code: Value) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.symbols.get(index))
            .map(String::as_str)
    }

    /// Iterates over `(symbol, code)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(code, symbol)| (symbol.as_str(), code as Value))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// A register-machine program equivalent to a Turing machine, with the input queue that
/// loads its initial tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub instructions: Vec<Instruction>,
    pub input: Vec<Value>,
}

/// Label of the dispatch block of `state`.
pub fn dispatch_label(state: &str) -> String {
    format!("q{}", escape_state(state))
}

/// Label of the action block of the rule leaving `state` on the symbol encoded as `code`.
pub fn rule_label(state: &str, code: Value) -> String {
    format!("q{}[{code}]", escape_state(state))
}

/// Spells a state name with ASCII letters, digits and `_` only. Any other character becomes
/// `~` followed by six hex digits of its code point, so distinct names never share a label.
fn escape_state(state: &str) -> String {
    let mut escaped = String::with_capacity(state.len());
    for c in state.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            escaped.push(c);
        } else {
            escaped.push_str(&format!("~{:06x}", u32::from(c)));
        }
    }
    escaped
}

/// Compiles `definition` into a register-machine program.
///
/// The definition is expected to have passed `analyze`. Rules sharing a source state and
/// symbol are resolved like the tape machine does: the first declared rule wins.
///
/// # Returns
///
/// * `Err(ErrorKind::UnknownSymbol)` if the tape or a rule uses a symbol outside the alphabet.
pub fn compile(
    definition: &TuringDefinition,
) -> Result<(CompiledProgram, SymbolLegend), MachineError> {
    let legend = SymbolLegend::new(&definition.alphabet);

    let mut input = definition
        .tape_cells()
        .iter()
        .map(|symbol| legend.encode(symbol))
        .collect::<Result<Vec<_>, _>>()?;
    input.push(END_OF_INPUT);

    let mut emitter = Emitter::default();
    emitter.preamble(&dispatch_label(&definition.initial_state));

    let rules = effective_rules(definition);
    for state in dispatch_states(definition) {
        let outgoing: Vec<&TransitionRule> = rules
            .iter()
            .copied()
            .filter(|rule| rule.state_from == state)
            .collect();
        emitter.dispatch_block(state, &outgoing, &legend)?;
    }

    for rule in &rules {
        emitter.action_block(rule, definition.is_final(&rule.state_to), &legend)?;
    }

    emitter.finalize();

    debug!(
        instructions = emitter.instructions.len(),
        symbols = legend.len(),
        "turing_definition_compiled"
    );

    Ok((
        CompiledProgram {
            instructions: emitter.instructions,
            input,
        },
        legend,
    ))
}

/// Rules in declaration order, keeping only the first rule per (state, symbol).
fn effective_rules(definition: &TuringDefinition) -> Vec<&TransitionRule> {
    let mut seen = HashSet::new();
    definition
        .transition_functions
        .iter()
        .filter(|rule| seen.insert((rule.state_from.as_str(), rule.symbol_from.as_str())))
        .collect()
}

/// Every non-final state the machine can be in, ordered by name: rule sources plus rule
/// targets without rules of their own, which get an empty dispatch block.
fn dispatch_states(definition: &TuringDefinition) -> BTreeSet<&str> {
    definition
        .transition_functions
        .iter()
        .flat_map(|rule| [rule.state_from.as_str(), rule.state_to.as_str()])
        .chain(std::iter::once(definition.initial_state.as_str()))
        .filter(|state| !definition.is_final(state))
        .collect()
}

fn reg(address: Address) -> Operand {
    Operand::Register(address)
}

fn constant(value: Value) -> Operand {
    Operand::Constant(value)
}

fn jump(target: impl Into<JumpTarget>) -> Instruction {
    Instruction::new(Op::Jump {
        target: target.into(),
    })
}

fn jump_if(target: impl Into<JumpTarget>, lhs: Operand, cmp: CompareOp, rhs: Operand) -> Instruction {
    Instruction::new(Op::ConditionalJump {
        target: target.into(),
        lhs,
        cmp,
        rhs,
    })
}

fn add(to: Address, lhs: Operand, rhs: Operand) -> Instruction {
    Instruction::new(Op::Add { to, lhs, rhs })
}

fn subtract(to: Address, lhs: Operand, rhs: Operand) -> Instruction {
    Instruction::new(Op::Subtract { to, lhs, rhs })
}

fn load(to: Address, value: Operand) -> Instruction {
    Instruction::new(Op::Load { to, value })
}

fn load_indirect(to: Address, address: Address) -> Instruction {
    Instruction::new(Op::LoadIndirect { to, address })
}

fn store_indirect(address: Address, value: Operand) -> Instruction {
    Instruction::new(Op::StoreIndirect { address, value })
}

#[derive(Default)]
struct Emitter {
    instructions: Vec<Instruction>,
}

impl Emitter {
    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Copies the input queue onto the tape, records its extent and jumps to the initial
    /// dispatch block.
    fn preamble(&mut self, initial: &str) {
        const P: Address = POINTER_REGISTER;
        const S: Address = SYMBOL_REGISTER;

        self.push(load(P, constant(TAPE_BASE)));
        self.push(Instruction::new(Op::ReadInput { to: S }).labeled(INPUT_LABEL));
        self.push(jump_if(SEEK_LABEL, reg(S), CompareOp::Eq, constant(END_OF_INPUT)));
        self.push(store_indirect(P, reg(S)));
        self.push(add(P, reg(P), constant(1)));
        self.push(jump(INPUT_LABEL));
        self.push(load(RIGHT_BOUND_REGISTER, reg(P)).labeled(SEEK_LABEL));
        self.push(load(LEFT_BOUND_REGISTER, constant(TAPE_BASE)));
        // The cell under the head is always inside the extent, even on an empty tape.
        self.push(jump_if(
            BEGIN_LABEL,
            reg(RIGHT_BOUND_REGISTER),
            CompareOp::Gt,
            reg(LEFT_BOUND_REGISTER),
        ));
        self.push(add(RIGHT_BOUND_REGISTER, reg(LEFT_BOUND_REGISTER), constant(1)));
        self.push(load(P, constant(TAPE_BASE)).labeled(BEGIN_LABEL));
        self.push(jump(initial));
    }

    /// Reads the symbol under the head and branches to the matching rule of `state`.
    fn dispatch_block(
        &mut self,
        state: &str,
        rules: &[&TransitionRule],
        legend: &SymbolLegend,
    ) -> Result<(), MachineError> {
        self.push(
            load_indirect(SYMBOL_REGISTER, POINTER_REGISTER)
                .labeled(dispatch_label(state))
                .tagged(Tag::DispatchEntry(state.to_string())),
        );

        for rule in rules {
            let code = legend.encode(&rule.symbol_from)?;
            self.push(jump_if(
                rule_label(state, code),
                reg(SYMBOL_REGISTER),
                CompareOp::Eq,
                constant(code),
            ));
        }

        self.push(jump(STUCK_LABEL));
        Ok(())
    }

    /// Writes, moves the head, widens the visited bounds and continues in the next state.
    fn action_block(
        &mut self,
        rule: &TransitionRule,
        to_final: bool,
        legend: &SymbolLegend,
    ) -> Result<(), MachineError> {
        const P: Address = POINTER_REGISTER;

        let label = rule_label(&rule.state_from, legend.encode(&rule.symbol_from)?);
        let next = format!("{label}'");

        self.push(store_indirect(P, constant(legend.encode(&rule.symbol_to)?)).labeled(label));

        let offset = rule.action.offset();
        let exit = if to_final {
            jump(FINALIZE_LABEL).tagged(Tag::StateExit(rule.state_to.clone()))
        } else {
            jump(dispatch_label(&rule.state_to))
        };

        if offset == 0 {
            self.push(exit);
            return Ok(());
        }

        self.push(add(P, reg(P), constant(offset)));
        if offset > 0 {
            self.push(jump_if(
                next.as_str(),
                reg(P),
                CompareOp::Lt,
                reg(RIGHT_BOUND_REGISTER),
            ));
            self.push(add(RIGHT_BOUND_REGISTER, reg(P), constant(1)));
        } else {
            self.push(jump_if(
                next.as_str(),
                reg(P),
                CompareOp::Ge,
                reg(LEFT_BOUND_REGISTER),
            ));
            self.push(load(LEFT_BOUND_REGISTER, reg(P)));
        }
        self.push(Instruction { label: Some(next), ..exit });

        Ok(())
    }

    /// Trims blank cells from both ends of the visited tape, writes the rest to the output
    /// and halts. Also emits the shared halt for dispatches without a matching rule.
    fn finalize(&mut self) {
        const P: Address = POINTER_REGISTER;
        const S: Address = SYMBOL_REGISTER;
        const RIGHT: Address = RIGHT_BOUND_REGISTER;
        const LEFT: Address = LEFT_BOUND_REGISTER;

        self.push(
            jump_if(DONE_LABEL, reg(RIGHT), CompareOp::Le, reg(LEFT)).labeled(FINALIZE_LABEL),
        );
        self.push(subtract(RIGHT, reg(RIGHT), constant(1)));
        self.push(load_indirect(S, RIGHT));
        self.push(jump_if(FINALIZE_LABEL, reg(S), CompareOp::Eq, constant(0)));
        self.push(add(RIGHT, reg(RIGHT), constant(1)));
        self.push(load(P, reg(LEFT)));

        self.push(load_indirect(S, P).labeled(TRIM_LABEL));
        self.push(jump_if(EMIT_LABEL, reg(S), CompareOp::Ne, constant(0)));
        self.push(add(P, reg(P), constant(1)));
        self.push(jump(TRIM_LABEL));

        self.push(jump_if(DONE_LABEL, reg(P), CompareOp::Ge, reg(RIGHT)).labeled(EMIT_LABEL));
        self.push(load_indirect(S, P));
        self.push(Instruction::new(Op::WriteOutput { value: reg(S) }));
        self.push(add(P, reg(P), constant(1)));
        self.push(jump(EMIT_LABEL));

        self.push(Instruction::new(Op::Halt).labeled(DONE_LABEL));
        self.push(Instruction::new(Op::Halt).labeled(STUCK_LABEL));
    }
}
