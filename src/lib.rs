//! This crate provides the core logic for compiling Turing machines into register-machine
//! programs and running both side by side.
//! It includes modules for validating Turing machine definitions, simulating a single-tape
//! Turing machine and a random-access register machine, compiling one into the other,
//! assembling register programs from text, and stepping the two machines in lockstep.

pub mod analyzer;
pub mod assembler;
pub mod compiler;
pub mod instruction;
pub mod machine;
pub mod ram;
pub mod simulation;
pub mod types;

/// Re-exports the `analyze` function and `AnalysisError` enum from the analyzer module.
pub use analyzer::{analyze, AnalysisError};
/// Re-exports the `assemble` function and the grammar's `Rule` enum from the assembler module.
pub use assembler::{assemble, Rule};
/// Re-exports the compiler entry point and the symbol encoding it produces.
pub use compiler::{compile, CompiledProgram, SymbolLegend};
/// Re-exports the register-machine instruction set.
pub use instruction::{CompareOp, Instruction, JumpTarget, Op, Operand, Tag};
/// Re-exports the `TapeMachine` struct from the machine module.
pub use machine::{TapeMachine, TapeMachineState};
/// Re-exports the `RegisterMachine` struct from the ram module.
pub use ram::{LabelTable, RegisterMachine, RegisterMachineState};
/// Re-exports the lockstep `Simulation` from the simulation module.
pub use simulation::{DispatchPhase, Simulation, SimulationState};
/// Re-exports the Turing machine definition types and errors from the types module.
pub use types::{
    Direction, ErrorKind, MachineError, MachineName, Step, TransitionRule, TuringDefinition,
    BLANK_SYMBOL,
};
