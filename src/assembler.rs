//! This module provides a textual assembler for register-machine programs, utilizing the
//! `pest` crate. The accepted syntax is the one `Instruction` displays itself with, so a
//! program listing can be read back in:
//!
//! ```text
//! ; count down from the first input
//!         R1 := READ()
//! loop:   R1 := R1 - 1
//!         WRITE(R1)
//!         if (R1 > 0) goto loop
//!         halt
//! ```

use pest::{
    error::{Error, ErrorVariant},
    iterators::Pair,
    Parser as PestParser, Span,
};
use pest_derive::Parser as PestParser;
use tracing::debug;

use crate::instruction::{CompareOp, Instruction, JumpTarget, Op, Operand};
use crate::types::{Address, ErrorKind, MachineError, MachineName, Value};

/// Derives a `PestParser` for the register-machine assembly grammar defined in `assembly.pest`.
#[derive(PestParser)]
#[grammar = "assembly.pest"]
pub struct AssemblyParser;

/// Parses an assembly listing into a program.
///
/// Labels are kept symbolic; they are resolved when the program is loaded into a
/// `RegisterMachine`.
///
/// # Returns
///
/// * `Err(ErrorKind::Syntax)` if the source does not follow the grammar or a number is out
///   of range.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, MachineError> {
    let mut pairs = AssemblyParser::parse(Rule::program, source)
        .map_err(|e| syntax_error(Box::new(e)))?;

    let Some(root) = pairs.next() else {
        return Ok(Vec::new());
    };

    let program = root
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::line)
        .map(parse_line)
        .collect::<Result<Vec<_>, _>>()?;

    debug!(instructions = program.len(), "program_assembled");
    Ok(program)
}

fn parse_line(pair: Pair<Rule>) -> Result<Instruction, MachineError> {
    let span = pair.as_span();
    let mut label = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::label_def => label = p.into_inner().next().map(|l| l.as_str().to_string()),
            _ => {
                return Ok(Instruction {
                    op: parse_op(p)?,
                    label,
                    tag: None,
                })
            }
        }
    }

    Err(parse_error("missing instruction", span))
}

fn parse_op(pair: Pair<Rule>) -> Result<Op, MachineError> {
    let rule = pair.as_rule();
    let span = pair.as_span();
    let mut inner = pair.into_inner();
    let mut next = || {
        inner
            .next()
            .ok_or_else(|| parse_error("incomplete instruction", span))
    };

    let op = match rule {
        Rule::halt => Op::Halt,
        Rule::write => Op::WriteOutput {
            value: parse_operand(next()?)?,
        },
        Rule::jump => Op::Jump {
            target: parse_target(next()?)?,
        },
        Rule::cond_jump => {
            let lhs = parse_operand(next()?)?;
            let cmp = parse_compare(next()?);
            let rhs = parse_operand(next()?)?;
            let target = parse_target(next()?)?;
            Op::ConditionalJump {
                target,
                lhs,
                cmp,
                rhs,
            }
        }
        Rule::store_indirect => Op::StoreIndirect {
            address: parse_register(next()?)?,
            value: parse_operand(next()?)?,
        },
        Rule::assign => {
            let to = parse_register(next()?)?;
            parse_expression(to, next()?)?
        }
        _ => return Err(parse_error("unknown instruction", span)),
    };

    Ok(op)
}

/// Parses the right-hand side of `R<to> := ...`.
fn parse_expression(to: Address, pair: Pair<Rule>) -> Result<Op, MachineError> {
    let span = pair.as_span();

    match pair.as_rule() {
        Rule::read => Ok(Op::ReadInput { to }),
        Rule::load_indirect => {
            let register = pair
                .into_inner()
                .next()
                .ok_or_else(|| parse_error("missing register", span))?;
            Ok(Op::LoadIndirect {
                to,
                address: parse_register(register)?,
            })
        }
        Rule::arithmetic => {
            let mut inner = pair.into_inner();
            let mut next = || {
                inner
                    .next()
                    .ok_or_else(|| parse_error("incomplete expression", span))
            };
            let lhs = parse_operand(next()?)?;
            let op = next()?;
            let rhs = parse_operand(next()?)?;

            match op.as_str() {
                "+" => Ok(Op::Add { to, lhs, rhs }),
                _ => Ok(Op::Subtract { to, lhs, rhs }),
            }
        }
        _ => Ok(Op::Load {
            to,
            value: parse_operand(pair)?,
        }),
    }
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand, MachineError> {
    match pair.as_rule() {
        Rule::register => Ok(Operand::Register(parse_register(pair)?)),
        _ => Ok(Operand::Constant(parse_number::<Value>(&pair)?)),
    }
}

fn parse_register(pair: Pair<Rule>) -> Result<Address, MachineError> {
    let span = pair.as_span();
    let index = pair
        .into_inner()
        .next()
        .ok_or_else(|| parse_error("missing register index", span))?;

    parse_number(&index)
}

fn parse_target(pair: Pair<Rule>) -> Result<JumpTarget, MachineError> {
    match pair.as_rule() {
        Rule::index => Ok(JumpTarget::Index(parse_number(&pair)?)),
        _ => Ok(JumpTarget::Label(pair.as_str().to_string())),
    }
}

fn parse_compare(pair: Pair<Rule>) -> CompareOp {
    match pair.as_str() {
        "=" => CompareOp::Eq,
        "!=" => CompareOp::Ne,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        ">" => CompareOp::Gt,
        _ => CompareOp::Ge,
    }
}

fn parse_number<T: std::str::FromStr>(pair: &Pair<Rule>) -> Result<T, MachineError> {
    pair.as_str()
        .parse()
        .map_err(|_| parse_error("number out of range", pair.as_span()))
}

/// Creates an `ErrorKind::Syntax` error from a message and a `Span`.
fn parse_error(msg: &str, span: Span) -> MachineError {
    syntax_error(Box::new(Error::new_from_span(
        ErrorVariant::CustomError {
            message: msg.to_string(),
        },
        span,
    )))
}

fn syntax_error(error: Box<Error<Rule>>) -> MachineError {
    MachineError::new(MachineName::Assembler, ErrorKind::Syntax(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RegisterMachine;

    const COUNTDOWN: &str = "
        ; count down from the first input
                R1 := READ()
        loop:   R1 := R1 - 1
                WRITE(R1)
                if (R1 > 0) goto loop   # until zero
                halt
    ";

    #[test]
    fn test_assemble_countdown() {
        let program = assemble(COUNTDOWN).unwrap();

        assert_eq!(program.len(), 5);
        assert_eq!(program[0].op, Op::ReadInput { to: 1 });
        assert_eq!(program[1].label.as_deref(), Some("loop"));
        assert_eq!(
            program[3].op,
            Op::ConditionalJump {
                target: JumpTarget::Label("loop".to_string()),
                lhs: Operand::Register(1),
                cmp: CompareOp::Gt,
                rhs: Operand::Constant(0),
            }
        );

        let mut ram = RegisterMachine::new(program, [3]).unwrap();
        ram.run().unwrap();
        assert_eq!(ram.output(), &[2, 1, 0]);
    }

    #[test]
    fn test_assemble_all_forms() {
        let source = "R1 := 3\nR2 := [R1]\n[R1] := -4\nR1 := R1 + R2\nR1 := 5 - R2\ngoto 0\n";
        let program = assemble(source).unwrap();

        let ops: Vec<Op> = program.into_iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![
                Op::Load {
                    to: 1,
                    value: Operand::Constant(3)
                },
                Op::LoadIndirect { to: 2, address: 1 },
                Op::StoreIndirect {
                    address: 1,
                    value: Operand::Constant(-4)
                },
                Op::Add {
                    to: 1,
                    lhs: Operand::Register(1),
                    rhs: Operand::Register(2)
                },
                Op::Subtract {
                    to: 1,
                    lhs: Operand::Constant(5),
                    rhs: Operand::Register(2)
                },
                Op::Jump {
                    target: JumpTarget::Index(0)
                },
            ]
        );
    }

    #[test]
    fn test_label_on_its_own_line() {
        let program = assemble("start:\n  halt").unwrap();
        assert_eq!(program, vec![Instruction::new(Op::Halt).labeled("start")]);
    }

    #[test]
    fn test_empty_source() {
        assert!(assemble("").unwrap().is_empty());
        assert!(assemble("; nothing here\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_listing_reassembles() {
        let program = assemble(COUNTDOWN).unwrap();
        let listing: Vec<String> = program.iter().map(|i| i.to_string()).collect();

        assert_eq!(assemble(&listing.join("\n")).unwrap(), program);
    }

    #[test]
    fn test_syntax_error() {
        let error = assemble("R1 := READ(\nhalt").unwrap_err();

        assert_eq!(error.machine, MachineName::Assembler);
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn test_register_index_out_of_range() {
        let error = assemble("R99999999999999999999 := 1").unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }
}
