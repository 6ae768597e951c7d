//! This module defines the register-machine instruction set: operands, comparison operators,
//! jump targets and the closed set of instruction variants, together with their textual form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Address, State, Value};

/// A value source: either a literal or the contents of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Constant(Value),
    Register(Address),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(value) => write!(f, "{value}"),
            Operand::Register(address) => write!(f, "R{address}"),
        }
    }
}

/// Comparison used by conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn holds(self, lhs: Value, rhs: Value) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Where a jump goes: a literal instruction index or a label resolved through the
/// program's label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpTarget {
    Index(usize),
    Label(String),
}

impl From<usize> for JumpTarget {
    fn from(index: usize) -> Self {
        JumpTarget::Index(index)
    }
}

impl From<&str> for JumpTarget {
    fn from(label: &str) -> Self {
        JumpTarget::Label(label.to_string())
    }
}

impl From<String> for JumpTarget {
    fn from(label: String) -> Self {
        JumpTarget::Label(label)
    }
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Index(index) => write!(f, "{index}"),
            JumpTarget::Label(label) => f.write_str(label),
        }
    }
}

/// The register-machine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// `to := value`
    Load { to: Address, value: Operand },
    /// `to := [address]`, reads the cell whose address is stored in register `address`.
    LoadIndirect { to: Address, address: Address },
    /// `[address] := value`, writes the cell whose address is stored in register `address`.
    StoreIndirect { address: Address, value: Operand },
    /// `to := lhs + rhs`
    Add {
        to: Address,
        lhs: Operand,
        rhs: Operand,
    },
    /// `to := lhs - rhs`
    Subtract {
        to: Address,
        lhs: Operand,
        rhs: Operand,
    },
    /// `to := READ()`, zero once the input is exhausted.
    ReadInput { to: Address },
    /// `WRITE(value)`
    WriteOutput { value: Operand },
    /// `goto target`
    Jump { target: JumpTarget },
    /// `if (lhs cmp rhs) goto target`
    ConditionalJump {
        target: JumpTarget,
        lhs: Operand,
        cmp: CompareOp,
        rhs: Operand,
    },
    Halt,
}

impl Op {
    /// The jump target of this operation, if it has one.
    pub fn target(&self) -> Option<&JumpTarget> {
        match self {
            Op::Jump { target } | Op::ConditionalJump { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Load { to, value } => write!(f, "R{to} := {value}"),
            Op::LoadIndirect { to, address } => write!(f, "R{to} := [R{address}]"),
            Op::StoreIndirect { address, value } => write!(f, "[R{address}] := {value}"),
            Op::Add { to, lhs, rhs } => write!(f, "R{to} := {lhs} + {rhs}"),
            Op::Subtract { to, lhs, rhs } => write!(f, "R{to} := {lhs} - {rhs}"),
            Op::ReadInput { to } => write!(f, "R{to} := READ()"),
            Op::WriteOutput { value } => write!(f, "WRITE({value})"),
            Op::Jump { target } => write!(f, "goto {target}"),
            Op::ConditionalJump {
                target,
                lhs,
                cmp,
                rhs,
            } => write!(f, "if ({lhs} {} {rhs}) goto {target}", cmp.symbol()),
            Op::Halt => f.write_str("halt"),
        }
    }
}

/// Marker the compiler attaches to instructions the lockstep coordinator watches for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// First instruction of the dispatch block of a Turing state.
    DispatchEntry(State),
    /// Jump leaving a rule block towards the given final state.
    StateExit(State),
}

/// An operation plus its optional label and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub label: Option<String>,
    pub tag: Option<Tag>,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            label: None,
            tag: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn tagged(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// The state whose dispatch block starts here, if any.
    pub fn dispatch_state(&self) -> Option<&str> {
        match &self.tag {
            Some(Tag::DispatchEntry(state)) => Some(state),
            _ => None,
        }
    }

    /// The final state this instruction exits to, if any.
    pub fn exit_state(&self) -> Option<&str> {
        match &self.tag {
            Some(Tag::StateExit(state)) => Some(state),
            _ => None,
        }
    }
}

impl From<Op> for Instruction {
    fn from(op: Op) -> Self {
        Instruction::new(op)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}: {}", self.op),
            None => write!(f, "{}", self.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_ops() {
        assert!(CompareOp::Eq.holds(2, 2));
        assert!(CompareOp::Ne.holds(2, 3));
        assert!(CompareOp::Lt.holds(-1, 0));
        assert!(CompareOp::Le.holds(0, 0));
        assert!(CompareOp::Gt.holds(5, 4));
        assert!(CompareOp::Ge.holds(4, 4));
        assert!(!CompareOp::Gt.holds(4, 4));
    }

    #[test]
    fn test_instruction_display() {
        let cases = [
            (
                Op::Load {
                    to: 1,
                    value: Operand::Constant(3),
                },
                "R1 := 3",
            ),
            (Op::LoadIndirect { to: 2, address: 1 }, "R2 := [R1]"),
            (
                Op::StoreIndirect {
                    address: 1,
                    value: Operand::Register(2),
                },
                "[R1] := R2",
            ),
            (
                Op::Subtract {
                    to: 1,
                    lhs: Operand::Register(1),
                    rhs: Operand::Constant(1),
                },
                "R1 := R1 - 1",
            ),
            (Op::ReadInput { to: 2 }, "R2 := READ()"),
            (
                Op::WriteOutput {
                    value: Operand::Register(2),
                },
                "WRITE(R2)",
            ),
            (
                Op::ConditionalJump {
                    target: "loop".into(),
                    lhs: Operand::Register(1),
                    cmp: CompareOp::Ge,
                    rhs: Operand::Constant(0),
                },
                "if (R1 >= 0) goto loop",
            ),
            (Op::Jump { target: 4.into() }, "goto 4"),
            (Op::Halt, "halt"),
        ];

        for (op, expected) in cases {
            assert_eq!(op.to_string(), expected);
        }
    }

    #[test]
    fn test_labeled_instruction_display() {
        let instruction = Instruction::new(Op::Halt)
            .labeled("done")
            .tagged(Tag::StateExit("acc".to_string()));

        assert_eq!(instruction.to_string(), "done: halt");
        assert_eq!(instruction.exit_state(), Some("acc"));
        assert_eq!(instruction.dispatch_state(), None);
    }
}
