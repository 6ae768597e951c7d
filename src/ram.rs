//! This module defines the `RegisterMachine` struct, an interpreter for random-access machine
//! programs. It owns sparse integer memory, an input queue and an output list, and keeps a
//! snapshot history so execution can be stepped backwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, trace, warn};

use crate::instruction::{Instruction, JumpTarget, Op, Operand};
use crate::types::{
    Address, ErrorKind, MachineError, MachineName, Step, Value, MAX_REGISTER_STEPS,
};

/// Sparse register-machine memory. Unset cells read as zero.
pub type Memory = BTreeMap<Address, Value>;

/// A value copy of everything a register-machine step can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMachineState {
    pub instruction_pointer: usize,
    pub memory: Memory,
    pub input: VecDeque<Value>,
    pub output: Vec<Value>,
    pub halted: bool,
}

/// Maps labels to instruction indices. Built once per program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    /// Collects every instruction label of `program`.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::DuplicateLabel)` if two instructions share a label.
    pub fn build(program: &[Instruction]) -> Result<Self, MachineError> {
        let mut labels = HashMap::new();

        for (index, instruction) in program.iter().enumerate() {
            let Some(label) = &instruction.label else {
                continue;
            };

            if let Some(&first) = labels.get(label) {
                return Err(MachineError::new(
                    MachineName::RegisterMachine,
                    ErrorKind::DuplicateLabel {
                        label: label.clone(),
                        first,
                        second: index,
                    },
                ));
            }
            labels.insert(label.clone(), index);
        }

        Ok(Self { labels })
    }

    /// Resolves a jump target to an instruction index.
    pub fn resolve(&self, target: &JumpTarget) -> Result<usize, MachineError> {
        match target {
            JumpTarget::Index(index) => Ok(*index),
            JumpTarget::Label(label) => self.get(label).ok_or_else(|| {
                MachineError::new(
                    MachineName::RegisterMachine,
                    ErrorKind::UnresolvedLabel(label.clone()),
                )
            }),
        }
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// How control continues after an instruction.
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

/// A random-access machine running a fixed program.
#[derive(Debug, Clone)]
pub struct RegisterMachine {
    program: Vec<Instruction>,
    labels: LabelTable,
    instruction_pointer: usize,
    memory: Memory,
    input: VecDeque<Value>,
    output: Vec<Value>,
    halted: bool,
    history: Vec<RegisterMachineState>,
}

impl RegisterMachine {
    /// Creates a machine for `program` with the given input queue.
    ///
    /// Labels are resolved here, so a program with a duplicate label is rejected before it
    /// can run.
    pub fn new(
        program: Vec<Instruction>,
        input: impl IntoIterator<Item = Value>,
    ) -> Result<Self, MachineError> {
        let labels = LabelTable::build(&program)?;
        debug!(
            instructions = program.len(),
            labels = labels.len(),
            "register_machine_created"
        );

        Ok(Self {
            program,
            labels,
            instruction_pointer: 0,
            memory: Memory::new(),
            input: input.into_iter().collect(),
            output: Vec::new(),
            halted: false,
            history: Vec::new(),
        })
    }

    /// Executes the instruction under the instruction pointer.
    ///
    /// # Returns
    ///
    /// * `Ok(Step::Continue)` if an instruction was executed.
    /// * `Ok(Step::Halt)` if the machine is halted or the pointer left the program.
    /// * `Err(_)` if a jump names an unknown label. The machine is left unchanged.
    pub fn step(&mut self) -> Result<Step, MachineError> {
        if self.has_ended() {
            return Ok(Step::Halt);
        }

        self.history.push(self.state());
        let op = self.program[self.instruction_pointer].op.clone();
        trace!(ip = self.instruction_pointer, %op, "register_step");

        match self.execute(&op) {
            Ok(Flow::Next) => self.instruction_pointer += 1,
            Ok(Flow::Jump(target)) => self.instruction_pointer = target,
            Ok(Flow::Halt) => self.halted = true,
            Err(e) => {
                self.history.pop();
                return Err(e);
            }
        }

        Ok(Step::Continue)
    }

    fn execute(&mut self, op: &Op) -> Result<Flow, MachineError> {
        match op {
            Op::Load { to, value } => {
                let value = self.value(value);
                self.write_memory(*to, value);
            }
            Op::LoadIndirect { to, address } => {
                let address = self.read_memory(*address);
                let value = self.read_memory(address);
                self.write_memory(*to, value);
            }
            Op::StoreIndirect { address, value } => {
                let address = self.read_memory(*address);
                let value = self.value(value);
                self.write_memory(address, value);
            }
            Op::Add { to, lhs, rhs } => {
                let value = self.value(lhs).wrapping_add(self.value(rhs));
                self.write_memory(*to, value);
            }
            Op::Subtract { to, lhs, rhs } => {
                let value = self.value(lhs).wrapping_sub(self.value(rhs));
                self.write_memory(*to, value);
            }
            Op::ReadInput { to } => {
                let value = self.read_input();
                self.write_memory(*to, value);
            }
            Op::WriteOutput { value } => {
                let value = self.value(value);
                self.write_output(value);
            }
            Op::Jump { target } => return Ok(Flow::Jump(self.labels.resolve(target)?)),
            Op::ConditionalJump {
                target,
                lhs,
                cmp,
                rhs,
            } => {
                if cmp.holds(self.value(lhs), self.value(rhs)) {
                    return Ok(Flow::Jump(self.labels.resolve(target)?));
                }
            }
            Op::Halt => return Ok(Flow::Halt),
        }

        Ok(Flow::Next)
    }

    /// Runs until the machine halts or leaves the program.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::StepBudgetExceeded)` after `MAX_REGISTER_STEPS` steps without
    ///   stopping.
    pub fn run(&mut self) -> Result<(), MachineError> {
        for _ in 0..MAX_REGISTER_STEPS {
            if self.step()? == Step::Halt {
                return Ok(());
            }
        }

        if self.has_ended() {
            return Ok(());
        }

        warn!(budget = MAX_REGISTER_STEPS, "register_step_budget_exceeded");
        Err(MachineError::new(
            MachineName::RegisterMachine,
            ErrorKind::StepBudgetExceeded(MAX_REGISTER_STEPS),
        ))
    }

    /// Undoes the most recent step. Does nothing if there is no history.
    pub fn backstep(&mut self) -> bool {
        match self.history.pop() {
            Some(state) => {
                self.restore(&state);
                true
            }
            None => false,
        }
    }

    /// Returns to the state before the first step and clears the history.
    pub fn reset(&mut self) {
        if let Some(initial) = self.history.first().cloned() {
            self.restore(&initial);
        }
        self.history.clear();
    }

    /// Reads a memory cell, zero if it was never written.
    pub fn read_memory(&self, address: Address) -> Value {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    pub fn write_memory(&mut self, address: Address, value: Value) {
        self.memory.insert(address, value);
    }

    /// Takes the next input value, zero once the input is exhausted.
    pub fn read_input(&mut self) -> Value {
        self.input.pop_front().unwrap_or(0)
    }

    pub fn write_output(&mut self, value: Value) {
        self.output.push(value);
    }

    fn value(&self, operand: &Operand) -> Value {
        match *operand {
            Operand::Constant(value) => value,
            Operand::Register(address) => self.read_memory(address),
        }
    }

    /// Returns a value copy of the live state.
    pub fn state(&self) -> RegisterMachineState {
        RegisterMachineState {
            instruction_pointer: self.instruction_pointer,
            memory: self.memory.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            halted: self.halted,
        }
    }

    fn restore(&mut self, state: &RegisterMachineState) {
        self.instruction_pointer = state.instruction_pointer;
        self.memory = state.memory.clone();
        self.input = state.input.clone();
        self.output = state.output.clone();
        self.halted = state.halted;
    }

    /// Restores `state` and truncates the history to `depth` entries.
    pub(crate) fn rewind(&mut self, state: &RegisterMachineState, depth: usize) {
        self.restore(state);
        self.history.truncate(depth);
    }

    /// Checks if the machine executed `halt` or its pointer left the program.
    pub fn has_ended(&self) -> bool {
        self.halted || self.instruction_pointer >= self.program.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// The instruction the pointer is on, if it is inside the program.
    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.program.get(self.instruction_pointer)
    }

    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn input(&self) -> &VecDeque<Value> {
        &self.input
    }

    pub fn output(&self) -> &[Value] {
        &self.output
    }

    /// Snapshots taken before each step since the last reset, oldest first.
    pub fn history(&self) -> &[RegisterMachineState] {
        &self.history
    }

    /// The state before the most recent step, for highlighting what changed.
    pub fn previous_state(&self) -> Option<&RegisterMachineState> {
        self.history.last()
    }
}
