//! This module defines the `Simulation` struct, which runs a Turing machine and its compiled
//! register-machine program side by side. The register machine drives execution; every time
//! its program enters a dispatch block, the Turing machine replays the transition the
//! program has just carried out.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::compiler::{compile, SymbolLegend};
use crate::instruction::Instruction;
use crate::machine::{TapeMachine, TapeMachineState};
use crate::ram::{RegisterMachine, RegisterMachineState};
use crate::types::{
    ErrorKind, MachineError, MachineName, TransitionRule, TuringDefinition, BLANK_SYMBOL,
    MAX_SIMULATION_STEPS,
};

/// Whether the register program has reached its first dispatch block yet.
///
/// Entering the initial dispatch block does not complete a transition; every later dispatch
/// entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchPhase {
    AwaitingFirstDispatch,
    Dispatching,
}

/// A value copy of both machines and the dispatch phase, taken before each micro-step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    pub turing: TapeMachineState,
    pub register: RegisterMachineState,
    pub phase: DispatchPhase,
    turing_depth: usize,
    register_depth: usize,
}

/// A Turing machine and the register machine running its compiled program, stepped together.
#[derive(Debug, Clone)]
pub struct Simulation {
    definition: TuringDefinition,
    legend: SymbolLegend,
    ram: RegisterMachine,
    turing: TapeMachine,
    phase: DispatchPhase,
    history: Vec<SimulationState>,
}

impl Simulation {
    /// Compiles `definition` and sets up both machines.
    ///
    /// The definition is expected to have passed `analyze`.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::UnknownSymbol)` if the definition uses symbols outside its alphabet.
    /// * `Err(ErrorKind::Compilation)` if the compiled program is rejected by the register
    ///   machine, with that rejection as the cause.
    pub fn new(definition: TuringDefinition) -> Result<Self, MachineError> {
        let (legend, ram) = Self::build(&definition)?;
        let turing = TapeMachine::new(&definition);

        Ok(Self {
            definition,
            legend,
            ram,
            turing,
            phase: DispatchPhase::AwaitingFirstDispatch,
            history: Vec::new(),
        })
    }

    fn build(
        definition: &TuringDefinition,
    ) -> Result<(SymbolLegend, RegisterMachine), MachineError> {
        let (program, legend) = compile(definition)?;
        let ram = RegisterMachine::new(program.instructions, program.input).map_err(|e| {
            MachineError::new(MachineName::Simulation, ErrorKind::Compilation).caused_by(e)
        })?;

        debug!(
            instructions = ram.program().len(),
            initial_state = %definition.initial_state,
            "simulation_built"
        );
        Ok((legend, ram))
    }

    /// Executes one register-machine instruction (a micro-step).
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the micro-step completed a Turing machine transition.
    /// * `Ok(false)` if it did not, or if the register machine had already halted.
    /// * `Err(_)` if either machine failed or they disagree about having stopped. The
    ///   simulation is rolled back to the state before the micro-step.
    pub fn step(&mut self) -> Result<bool, MachineError> {
        if self.ram.has_ended() {
            return Ok(false);
        }

        let snapshot = self.state();
        self.history.push(snapshot);

        match self.advance() {
            Ok(completed) => Ok(completed),
            Err(e) => {
                if let Some(snapshot) = self.history.pop() {
                    self.restore(&snapshot);
                }
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<bool, MachineError> {
        self.ram.step()?;
        let mut completed = false;

        if self.at_dispatch_entry() {
            match self.phase {
                DispatchPhase::AwaitingFirstDispatch => {
                    self.phase = DispatchPhase::Dispatching;
                }
                DispatchPhase::Dispatching => {
                    self.turing.step()?;
                    completed = true;
                }
            }
        }

        if self.ram.is_halted() {
            self.turing.step()?;
            completed = true;
        }

        if completed {
            self.check_consistency()?;
            trace!(
                state = self.turing.current_state(),
                ip = self.ram.instruction_pointer(),
                "transition_completed"
            );
        }

        Ok(completed)
    }

    fn check_consistency(&self) -> Result<(), MachineError> {
        let halted = self.ram.is_halted();
        let terminal = self.turing.is_terminal();

        if halted != terminal {
            warn!(halted, terminal, "machines_out_of_sync");
            return Err(MachineError::new(
                MachineName::Simulation,
                ErrorKind::Consistency { halted, terminal },
            ));
        }

        Ok(())
    }

    /// Micro-steps until one Turing machine transition completes (a macro-step).
    ///
    /// # Returns
    ///
    /// * `Ok(false)` if the register machine halted without completing a transition.
    pub fn step_turing(&mut self) -> Result<bool, MachineError> {
        while !self.ram.has_ended() {
            if self.step()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Undoes the most recent micro-step. Does nothing if there is no history.
    pub fn backstep(&mut self) -> bool {
        match self.history.pop() {
            Some(snapshot) => {
                self.restore(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Undoes micro-steps until the register machine is back at a dispatch entry that
    /// completes a transition, or the history is exhausted.
    pub fn backstep_turing(&mut self) -> bool {
        let mut moved = false;

        while self.backstep() {
            moved = true;
            if self.at_dispatch_entry() && self.phase == DispatchPhase::Dispatching {
                break;
            }
        }

        moved
    }

    /// Micro-steps until the register machine halts.
    ///
    /// # Returns
    ///
    /// * `Err(ErrorKind::StepBudgetExceeded)` after `MAX_SIMULATION_STEPS` micro-steps.
    pub fn run(&mut self) -> Result<(), MachineError> {
        for _ in 0..MAX_SIMULATION_STEPS {
            if self.ram.has_ended() {
                return Ok(());
            }
            self.step()?;
        }

        if self.ram.has_ended() {
            return Ok(());
        }

        warn!(budget = MAX_SIMULATION_STEPS, "simulation_step_budget_exceeded");
        Err(MachineError::new(
            MachineName::Simulation,
            ErrorKind::StepBudgetExceeded(MAX_SIMULATION_STEPS),
        ))
    }

    /// Reinitializes the simulation: both machines return to their initial configuration,
    /// the history is cleared and the program, legend and input are rebuilt.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        self.turing.reset();
        self.ram.reset();

        let (legend, ram) = Self::build(&self.definition)?;
        self.legend = legend;
        self.ram = ram;
        self.phase = DispatchPhase::AwaitingFirstDispatch;
        self.history.clear();

        debug!("simulation_reset");
        Ok(())
    }

    fn at_dispatch_entry(&self) -> bool {
        self.ram
            .current_instruction()
            .is_some_and(|instruction| instruction.dispatch_state().is_some())
    }

    /// Returns a value copy of both machines and the dispatch phase.
    pub fn state(&self) -> SimulationState {
        SimulationState {
            turing: self.turing.state(),
            register: self.ram.state(),
            phase: self.phase,
            turing_depth: self.turing.history().len(),
            register_depth: self.ram.history().len(),
        }
    }

    fn restore(&mut self, snapshot: &SimulationState) {
        self.turing.rewind(&snapshot.turing, snapshot.turing_depth);
        self.ram.rewind(&snapshot.register, snapshot.register_depth);
        self.phase = snapshot.phase;
    }

    /// Instructions the register machine executed since the last reset, most recent first,
    /// followed by the instruction it is on.
    fn visited(&self) -> impl Iterator<Item = &Instruction> {
        let program = self.ram.program();
        std::iter::once(self.ram.instruction_pointer())
            .chain(
                self.ram
                    .history()
                    .iter()
                    .rev()
                    .map(|state| state.instruction_pointer),
            )
            .filter_map(move |ip| program.get(ip))
    }

    /// The label of the most recently visited labelled instruction.
    pub fn last_label(&self) -> Option<&str> {
        self.visited().find_map(|instruction| instruction.label.as_deref())
    }

    /// The final state named by the most recently visited state exit.
    pub fn last_exit(&self) -> Option<&str> {
        self.visited().find_map(Instruction::exit_state)
    }

    /// The most recently completed Turing machine transition.
    pub fn last_transition(&self) -> Option<&TransitionRule> {
        self.turing.transition_history().last()
    }

    /// The register machine output decoded through the legend.
    pub fn output_symbols(&self) -> Vec<&str> {
        self.ram
            .output()
            .iter()
            .map(|&code| self.legend.decode(code).unwrap_or(BLANK_SYMBOL))
            .collect()
    }

    pub fn ram(&self) -> &RegisterMachine {
        &self.ram
    }

    pub fn turing(&self) -> &TapeMachine {
        &self.turing
    }

    pub fn legend(&self) -> &SymbolLegend {
        &self.legend
    }

    pub fn definition(&self) -> &TuringDefinition {
        &self.definition
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn is_halted(&self) -> bool {
        self.ram.is_halted()
    }

    /// Snapshots taken before each micro-step since the last reset, oldest first.
    pub fn history(&self) -> &[SimulationState] {
        &self.history
    }

    /// The state before the most recent micro-step, for highlighting what changed.
    pub fn previous_state(&self) -> Option<&SimulationState> {
        self.history.last()
    }
}
