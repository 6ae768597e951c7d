//! This module provides the validator for Turing machine definitions. It detects structural
//! problems before any machine is constructed, so interpreters and the compiler only ever see
//! well-formed definitions.

use crate::types::{TuringDefinition, BLANK_SYMBOL};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Represents the problems the validator can find in a Turing machine definition.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum AnalysisError {
    #[error("The alphabet must not be empty.")]
    EmptyAlphabet,
    #[error("The alphabet does not contain the blank symbol (□).")]
    MissingBlank,
    #[error("The alphabet contains duplicate symbols: {}.", .0.join(", "))]
    DuplicateSymbols(Vec<String>),
    #[error("The alphabet contains invalid symbols: {}.", .0.join(", "))]
    InvalidSymbols(Vec<String>),
    #[error("The tape contains symbols outside the alphabet: {}.", .0.join(", "))]
    InvalidTapeSymbols(Vec<String>),
    #[error("There are no transition functions.")]
    NoTransitions,
    #[error("Some transition functions have an empty state name.")]
    EmptyStateName,
    #[error("Transition function of state {state} contains symbols outside the alphabet: {}.", .symbols.join(", "))]
    InvalidTransitionSymbols { state: String, symbols: Vec<String> },
    #[error("State {state} repeats transition functions for symbols: {}.", .symbols.join(", "))]
    NonDeterministic { state: String, symbols: Vec<String> },
    #[error("The initial state is not set.")]
    MissingInitialState,
    #[error("The initial state {0} has no transition functions.")]
    InvalidStartState(String),
    #[error("The initial state {0} must not be a final state.")]
    InitialStateIsFinal(String),
    #[error("The final states are not set.")]
    MissingFinalStates,
    #[error("Some states have no transition functions: {}.", .0.join(", "))]
    UndefinedStates(Vec<String>),
}

type Check = fn(&TuringDefinition) -> Result<(), AnalysisError>;

/// Validates a Turing machine definition.
///
/// The checks run in a fixed order and the first violation is returned.
///
/// # Returns
///
/// * `Ok(())` if the definition can be simulated and compiled.
/// * `Err(AnalysisError)` describing the first problem found.
pub fn analyze(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    const CHECKS: [Check; 11] = [
        check_alphabet,
        check_duplicate_symbols,
        check_symbol_length,
        check_tape_symbols,
        check_has_rules,
        check_rule_symbols,
        check_determinism,
        check_initial_state,
        check_initial_not_final,
        check_final_states,
        check_defined_states,
    ];

    CHECKS.iter().try_for_each(|check| check(definition))
}

fn check_alphabet(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    if definition.alphabet.is_empty() {
        return Err(AnalysisError::EmptyAlphabet);
    }
    if !definition.alphabet.iter().any(|s| s == BLANK_SYMBOL) {
        return Err(AnalysisError::MissingBlank);
    }

    Ok(())
}

fn check_duplicate_symbols(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    let duplicates = duplicates(definition.alphabet.iter().map(String::as_str));

    if !duplicates.is_empty() {
        return Err(AnalysisError::DuplicateSymbols(duplicates));
    }

    Ok(())
}

fn check_symbol_length(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    let invalid: Vec<String> = definition
        .alphabet
        .iter()
        .filter(|symbol| symbol.chars().count() != 1)
        .cloned()
        .collect();

    if !invalid.is_empty() {
        return Err(AnalysisError::InvalidSymbols(invalid));
    }

    Ok(())
}

fn check_tape_symbols(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    let invalid = outside_alphabet(definition, definition.tape.values().map(String::as_str));

    if !invalid.is_empty() {
        return Err(AnalysisError::InvalidTapeSymbols(invalid));
    }

    Ok(())
}

fn check_has_rules(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    if definition.transition_functions.is_empty() {
        return Err(AnalysisError::NoTransitions);
    }

    Ok(())
}

fn check_rule_symbols(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    for rule in &definition.transition_functions {
        if rule.state_from.is_empty() || rule.state_to.is_empty() {
            return Err(AnalysisError::EmptyStateName);
        }

        let invalid = outside_alphabet(
            definition,
            [rule.symbol_from.as_str(), rule.symbol_to.as_str()].into_iter(),
        );
        if !invalid.is_empty() {
            return Err(AnalysisError::InvalidTransitionSymbols {
                state: rule.state_from.clone(),
                symbols: invalid,
            });
        }
    }

    Ok(())
}

fn check_determinism(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    let mut by_state: Vec<(&str, Vec<&str>)> = Vec::new();

    for rule in &definition.transition_functions {
        match by_state.iter_mut().find(|(state, _)| *state == rule.state_from) {
            Some((_, symbols)) => symbols.push(rule.symbol_from.as_str()),
            None => by_state.push((rule.state_from.as_str(), vec![rule.symbol_from.as_str()])),
        }
    }

    for (state, symbols) in by_state {
        let repeated = duplicates(symbols.into_iter());
        if !repeated.is_empty() {
            return Err(AnalysisError::NonDeterministic {
                state: state.to_string(),
                symbols: repeated,
            });
        }
    }

    Ok(())
}

fn check_initial_state(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    if definition.initial_state.is_empty() {
        return Err(AnalysisError::MissingInitialState);
    }
    if definition.rules_from(&definition.initial_state).next().is_none() {
        return Err(AnalysisError::InvalidStartState(
            definition.initial_state.clone(),
        ));
    }

    Ok(())
}

fn check_initial_not_final(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    if definition.is_final(&definition.initial_state) {
        return Err(AnalysisError::InitialStateIsFinal(
            definition.initial_state.clone(),
        ));
    }

    Ok(())
}

fn check_final_states(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    if definition.final_states.is_empty() {
        return Err(AnalysisError::MissingFinalStates);
    }

    Ok(())
}

/// Every state the machine can be started in or dispatch from needs at least one rule.
/// States only ever entered (final and sink states) are exempt.
fn check_defined_states(definition: &TuringDefinition) -> Result<(), AnalysisError> {
    let mut rule_counts: HashMap<&str, usize> = HashMap::new();
    for rule in &definition.transition_functions {
        *rule_counts.entry(rule.state_from.as_str()).or_default() += 1;
    }

    let referenced = std::iter::once(definition.initial_state.as_str()).chain(
        definition
            .transition_functions
            .iter()
            .map(|rule| rule.state_from.as_str()),
    );

    let mut seen = HashSet::new();
    let undefined: Vec<String> = referenced
        .filter(|state| seen.insert(*state))
        .filter(|state| !definition.is_final(state))
        .filter(|state| rule_counts.get(state).copied().unwrap_or(0) == 0)
        .map(str::to_string)
        .collect();

    if !undefined.is_empty() {
        return Err(AnalysisError::UndefinedStates(undefined));
    }

    Ok(())
}

/// Returns each value occurring more than once, in order of its second occurrence.
fn duplicates<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    values
        .filter(|value| !seen.insert(*value) && reported.insert(*value))
        .map(str::to_string)
        .collect()
}

fn outside_alphabet<'a>(
    definition: &TuringDefinition,
    symbols: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let alphabet: HashSet<&str> = definition.alphabet.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    symbols
        .filter(|symbol| !alphabet.contains(symbol) && seen.insert(*symbol))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TransitionRule};

    fn create_test_definition() -> TuringDefinition {
        TuringDefinition {
            alphabet: vec![BLANK_SYMBOL.to_string(), "a".to_string()],
            tape: [(0, "a".to_string())].into_iter().collect(),
            transition_functions: vec![
                TransitionRule::new("0", "a", "0", "a", Direction::Right),
                TransitionRule::new("0", BLANK_SYMBOL, "acc", BLANK_SYMBOL, Direction::Stay),
            ],
            initial_state: "0".to_string(),
            final_states: vec!["acc".to_string()],
        }
    }

    #[test]
    fn test_valid_definition() {
        assert_eq!(analyze(&create_test_definition()), Ok(()));
    }

    #[test]
    fn test_empty_alphabet() {
        let mut definition = create_test_definition();
        definition.alphabet.clear();
        assert_eq!(analyze(&definition), Err(AnalysisError::EmptyAlphabet));
    }

    #[test]
    fn test_missing_blank() {
        let mut definition = create_test_definition();
        definition.alphabet.remove(0);
        assert_eq!(analyze(&definition), Err(AnalysisError::MissingBlank));
    }

    #[test]
    fn test_duplicate_symbols() {
        let mut definition = create_test_definition();
        definition.alphabet.push("a".to_string());
        definition.alphabet.push("a".to_string());
        assert_eq!(
            analyze(&definition),
            Err(AnalysisError::DuplicateSymbols(vec!["a".to_string()]))
        );
    }

    #[test]
    fn test_multi_character_symbol() {
        let mut definition = create_test_definition();
        definition.alphabet.push("ab".to_string());
        definition.alphabet.push(String::new());

        let error = analyze(&definition).unwrap_err();
        assert_eq!(
            error,
            AnalysisError::InvalidSymbols(vec!["ab".to_string(), String::new()])
        );
    }

    #[test]
    fn test_tape_symbols_outside_alphabet() {
        let mut definition = create_test_definition();
        definition.tape.insert(1, "z".to_string());

        let error = analyze(&definition).unwrap_err();
        assert_eq!(error.to_string(), "The tape contains symbols outside the alphabet: z.");
    }

    #[test]
    fn test_no_transitions() {
        let mut definition = create_test_definition();
        definition.transition_functions.clear();
        assert_eq!(analyze(&definition), Err(AnalysisError::NoTransitions));
    }

    #[test]
    fn test_rule_symbols_outside_alphabet() {
        let mut definition = create_test_definition();
        definition.transition_functions[0].symbol_to = "x".to_string();
        assert_eq!(
            analyze(&definition),
            Err(AnalysisError::InvalidTransitionSymbols {
                state: "0".to_string(),
                symbols: vec!["x".to_string()],
            })
        );
    }

    #[test]
    fn test_empty_state_name() {
        let mut definition = create_test_definition();
        definition.transition_functions[1].state_to.clear();
        assert_eq!(analyze(&definition), Err(AnalysisError::EmptyStateName));
    }

    #[test]
    fn test_non_deterministic_rules() {
        let mut definition = create_test_definition();
        definition
            .transition_functions
            .push(TransitionRule::new("0", "a", "acc", "a", Direction::Stay));

        let error = analyze(&definition).unwrap_err();
        assert_eq!(
            error,
            AnalysisError::NonDeterministic {
                state: "0".to_string(),
                symbols: vec!["a".to_string()],
            }
        );
        assert_eq!(error.to_string(), "State 0 repeats transition functions for symbols: a.");
    }

    #[test]
    fn test_initial_state_checks() {
        let mut definition = create_test_definition();
        definition.initial_state.clear();
        assert_eq!(analyze(&definition), Err(AnalysisError::MissingInitialState));

        definition.initial_state = "1".to_string();
        assert_eq!(
            analyze(&definition),
            Err(AnalysisError::InvalidStartState("1".to_string()))
        );

        definition.initial_state = "0".to_string();
        definition.final_states.push("0".to_string());
        assert_eq!(
            analyze(&definition),
            Err(AnalysisError::InitialStateIsFinal("0".to_string()))
        );
    }

    #[test]
    fn test_missing_final_states() {
        let mut definition = create_test_definition();
        definition.final_states.clear();
        assert_eq!(analyze(&definition), Err(AnalysisError::MissingFinalStates));
    }

    #[test]
    fn test_sink_states_are_allowed() {
        let mut definition = create_test_definition();
        definition
            .transition_functions
            .push(TransitionRule::new("0", "b", "sink", "b", Direction::Stay));
        definition.alphabet.push("b".to_string());

        assert_eq!(analyze(&definition), Ok(()));
    }

    #[test]
    fn test_checks_run_in_order() {
        let mut definition = create_test_definition();
        definition.alphabet.remove(0);
        definition.transition_functions.clear();
        definition.final_states.clear();

        assert_eq!(analyze(&definition), Err(AnalysisError::MissingBlank));
    }
}
