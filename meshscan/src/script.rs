//! Startup and shutdown command files.
//!
//! One command per line. Everything after `;` is a comment and blank lines
//! are ignored.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::Result;
use crate::protocol::Command;

/// Ordered list of raw command lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    lines: Vec<String>,
}

impl CommandScript {
    /// Parse script text.
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                line.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
            })
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    /// Read and parse a script file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let script = Self::parse(&fs::read_to_string(path)?);
        debug!("Loaded {} command(s) from {}", script.len(), path.display());
        Ok(script)
    }

    /// Command lines without comments.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines as commands.
    pub fn commands(&self) -> Vec<Command> {
        self.lines
            .iter()
            .cloned()
            .map(Command::Raw)
            .collect()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the script has no commands.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_strips_comments_and_blanks() {
        let script = CommandScript::parse(
            "; preheat\nM140 S60 ; bed\n\n   \nG28\r\n  M190 S60  \n;;\n",
        );
        assert_eq!(script.lines(), &["M140 S60", "G28", "M190 S60"]);
        assert_eq!(script.len(), 3);
    }

    #[test]
    fn test_empty_script() {
        let script = CommandScript::parse("; nothing here\n\n");
        assert!(script.is_empty());
        assert!(script.commands().is_empty());
    }

    #[test]
    fn test_commands_are_raw() {
        let script = CommandScript::parse("M104 S0\nM84");
        assert_eq!(
            script.commands(),
            vec![Command::Raw("M104 S0".into()), Command::Raw("M84".into())]
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "G28 ; home all").unwrap();
        writeln!(file, "M140 S55").unwrap();
        file.flush().unwrap();

        let script = CommandScript::from_file(file.path()).unwrap();
        assert_eq!(script.lines(), &["G28", "M140 S55"]);
    }

    #[test]
    fn test_from_missing_file() {
        let err = CommandScript::from_file("/nonexistent/meshscan/start.gcode").unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
