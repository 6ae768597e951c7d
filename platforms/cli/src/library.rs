//! This module provides the machine library: the JSON save format used by the web editor,
//! its conversion to and from `TuringDefinition`, loading saves from files and directories,
//! and the machines bundled with the binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tmram::{Direction, TransitionRule, TuringDefinition};

// Machines embedded in the binary
const BUILTIN_TEXTS: [&str; 3] = [
    include_str!("../machines/anbncn.json"),
    include_str!("../machines/binary-increment.json"),
    include_str!("../machines/unary-addition.json"),
];

lazy_static::lazy_static! {
    pub static ref BUILTINS: Vec<MachineSave> = BUILTIN_TEXTS
        .iter()
        .filter_map(|text| parse_machines(text).ok())
        .flatten()
        .collect();
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Machine '{0}' not found")]
    NotFound(String),
}

/// A state name as saved by the editor, which stores numeric names as JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateName {
    Number(i64),
    Name(String),
}

impl From<&str> for StateName {
    fn from(name: &str) -> Self {
        name.parse()
            .map(StateName::Number)
            .unwrap_or_else(|_| StateName::Name(name.to_string()))
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateName::Number(n) => write!(f, "{n}"),
            StateName::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRule {
    pub state_from: StateName,
    pub symbol_from: String,
    pub state_to: StateName,
    pub symbol_to: String,
    pub action: Direction,
}

/// A saved Turing machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSave {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial tape from position 0, one symbol per cell.
    #[serde(default)]
    pub tape_array: Vec<String>,
    pub alphabet: Vec<String>,
    pub transition_functions: Vec<SavedRule>,
    pub initial_state: StateName,
    pub final_states: Vec<StateName>,
}

impl MachineSave {
    pub fn to_definition(&self) -> TuringDefinition {
        TuringDefinition {
            alphabet: self.alphabet.clone(),
            tape: self.tape_array.iter().cloned().enumerate().collect(),
            transition_functions: self
                .transition_functions
                .iter()
                .map(|rule| {
                    TransitionRule::new(
                        rule.state_from.to_string(),
                        rule.symbol_from.as_str(),
                        rule.state_to.to_string(),
                        rule.symbol_to.as_str(),
                        rule.action,
                    )
                })
                .collect(),
            initial_state: self.initial_state.to_string(),
            final_states: self.final_states.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn from_definition(name: &str, definition: &TuringDefinition) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            tape_array: definition.tape_cells(),
            alphabet: definition.alphabet.clone(),
            transition_functions: definition
                .transition_functions
                .iter()
                .map(|rule| SavedRule {
                    state_from: rule.state_from.as_str().into(),
                    symbol_from: rule.symbol_from.clone(),
                    state_to: rule.state_to.as_str().into(),
                    symbol_to: rule.symbol_to.clone(),
                    action: rule.action,
                })
                .collect(),
            initial_state: definition.initial_state.as_str().into(),
            final_states: definition
                .final_states
                .iter()
                .map(|state| state.as_str().into())
                .collect(),
        }
    }
}

/// A save file holds either a single machine or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SaveFile {
    One(MachineSave),
    Many(Vec<MachineSave>),
}

/// Parses the contents of a save file.
pub fn parse_machines(content: &str) -> Result<Vec<MachineSave>, serde_json::Error> {
    Ok(match serde_json::from_str(content)? {
        SaveFile::One(machine) => vec![machine],
        SaveFile::Many(machines) => machines,
    })
}

/// Loads every machine stored in the save file at `path`.
pub fn load_machines(path: &Path) -> Result<Vec<MachineSave>, LibraryError> {
    let content = fs::read_to_string(path).map_err(|source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_machines(&content).map_err(|source| LibraryError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the machines of every `.json` file in `directory`.
///
/// Directories and other files are skipped. A file that fails to load yields one error
/// entry; the remaining files are still loaded.
pub fn load_directory(directory: &Path) -> Vec<Result<(PathBuf, MachineSave), LibraryError>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(source) => {
            return vec![Err(LibraryError::Io {
                path: directory.to_path_buf(),
                source,
            })]
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .flat_map(|path| match load_machines(&path) {
            Ok(machines) => machines
                .into_iter()
                .map(|machine| Ok((path.clone(), machine)))
                .collect(),
            Err(e) => vec![Err(e)],
        })
        .collect()
}

/// Picks a machine by name, or the first one when no name is given.
pub fn select(machines: &[MachineSave], name: Option<&str>) -> Result<MachineSave, LibraryError> {
    match name {
        Some(name) => machines
            .iter()
            .find(|machine| machine.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(name.to_string())),
        None => machines
            .first()
            .cloned()
            .ok_or_else(|| LibraryError::NotFound("<first>".to_string())),
    }
}

/// Looks up a built-in machine by name.
pub fn builtin(name: &str) -> Result<MachineSave, LibraryError> {
    select(&BUILTINS, Some(name))
}
