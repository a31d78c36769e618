//! Ready-made instruction sets.
//!
//! - [`mini`]: `u32` arithmetic, comparison and jumps on a single stack
//! - [`mixed`]: a `u32` stack next to an `f64` stack
//!
//! Sets that talk to the outside world do it through a [`Console`], so tests
//! can script input and capture output.

use crate::virtual_machine::errors::{ConfigError, VMError};
use crate::virtual_machine::isa::InstructionTable;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub mod mini;
pub mod mixed;

/// Line-oriented input and output used by `read`/`write` style instructions.
pub trait Console: Send + Sync {
    /// Reads one line without its terminator.
    fn read_line(&self) -> Result<String, VMError>;

    fn write_line(&self, line: &str) -> Result<(), VMError>;
}

/// Process stdin and stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&self) -> Result<String, VMError> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(VMError::callback("end of input"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn write_line(&self, line: &str) -> Result<(), VMError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// In-memory console fed from a fixed list of lines.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: Mutex<VecDeque<String>>,
    output: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: Mutex::new(input.into_iter().map(Into::into).collect()),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Lines written so far.
    pub fn output(&self) -> Vec<String> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for ScriptedConsole {
    fn read_line(&self) -> Result<String, VMError> {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| VMError::callback("no scripted input left"))
    }

    fn write_line(&self, line: &str) -> Result<(), VMError> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

/// The sets selectable by name, e.g. from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Mini,
    Mixed,
}

impl InstructionSet {
    pub const ALL: [InstructionSet; 2] = [InstructionSet::Mini, InstructionSet::Mixed];

    pub fn name(self) -> &'static str {
        match self {
            InstructionSet::Mini => "mini",
            InstructionSet::Mixed => "mixed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|set| set.name() == name)
    }

    /// Builds the opcode table, wiring I/O instructions to `console`.
    pub fn table(self, console: Arc<dyn Console>) -> Result<InstructionTable, ConfigError> {
        match self {
            InstructionSet::Mini => mini::table(console),
            InstructionSet::Mixed => mixed::table(console),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_console_replays_input() {
        let console = ScriptedConsole::new(["1", "two"]);
        assert_eq!(console.read_line().unwrap(), "1");
        assert_eq!(console.read_line().unwrap(), "two");
        assert!(matches!(console.read_line(), Err(VMError::Callback { .. })));
    }

    #[test]
    fn scripted_console_records_output() {
        let console = ScriptedConsole::default();
        console.write_line("5").unwrap();
        console.write_line("7").unwrap();
        assert_eq!(console.output(), vec!["5", "7"]);
    }

    #[test]
    fn sets_by_name() {
        assert_eq!(InstructionSet::from_name("mini"), Some(InstructionSet::Mini));
        assert_eq!(InstructionSet::from_name("mixed"), Some(InstructionSet::Mixed));
        assert_eq!(InstructionSet::from_name("maxi"), None);
    }

    #[test]
    fn every_set_builds() {
        for set in InstructionSet::ALL {
            let console: Arc<dyn Console> = Arc::new(ScriptedConsole::default());
            let table = set.table(console).unwrap();
            assert!(!table.is_empty(), "{} is empty", set.name());
        }
    }
}
