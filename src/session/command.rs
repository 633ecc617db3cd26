//! Calibration commands and the line based sources that produce them.
//!
//! Syntax, one command per line (case-insensitive):
//!
//! | Line                                  | Command            |
//! |---------------------------------------|--------------------|
//! | `+ 120 40`, `p 120,40`, `pos (120, 40)` | add positive point |
//! | `- 120 40`, `n 120,40`, `neg [120 40]`  | add negative point |
//! | `space`, `preview`, `s`               | preview            |
//! | `r`, `reset`                          | reset              |
//! | `enter`, `confirm`, `c`               | confirm            |
//! | `q`, `quit`, `exit`                   | quit               |
//!
//! Blank lines and lines starting with `#` are ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, StdinLock, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::prompt::{Label, PixelPoint};

static POINT_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(\+|-|p|pos|positive|n|neg|negative)\s*[(\[]?\s*(\d+)\s*(?:,\s*|\s+)(\d+)\s*[)\]]?$",
    )
    .expect("point command regex is valid")
});

/// Command parsing and input errors.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Invalid coordinate in: {0}")]
    InvalidCoordinate(String),
    #[error("Failed to read command: {0}")]
    Io(#[from] io::Error),
}

/// One event of the calibration command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    AddPoint { point: PixelPoint, label: Label },
    Preview,
    Reset,
    Confirm,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let trimmed = line.trim();

        if let Some(caps) = POINT_COMMAND.captures(trimmed) {
            let label = match caps[1].to_lowercase().as_str() {
                "+" | "p" | "pos" | "positive" => Label::Positive,
                _ => Label::Negative,
            };
            let x = caps[2]
                .parse()
                .map_err(|_| CommandError::InvalidCoordinate(trimmed.to_string()))?;
            let y = caps[3]
                .parse()
                .map_err(|_| CommandError::InvalidCoordinate(trimmed.to_string()))?;
            return Ok(SessionCommand::AddPoint {
                point: PixelPoint::new(x, y),
                label,
            });
        }

        match trimmed.to_lowercase().as_str() {
            "space" | "preview" | "s" => Ok(SessionCommand::Preview),
            "r" | "reset" => Ok(SessionCommand::Reset),
            "enter" | "confirm" | "c" => Ok(SessionCommand::Confirm),
            "q" | "quit" | "exit" => Ok(SessionCommand::Quit),
            _ => Err(CommandError::Unknown(trimmed.to_string())),
        }
    }
}

/// Blocking source of calibration commands.
pub trait CommandSource {
    /// Next command, or `None` once the input is exhausted.
    fn next_command(&mut self) -> Option<Result<SessionCommand, CommandError>>;
}

/// Reads one command per line from any buffered reader.
pub struct LineCommandSource<R> {
    reader: R,
    prompt: Option<String>,
}

impl<R: BufRead> LineCommandSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            prompt: None,
        }
    }

    /// Print `prompt` before every read (interactive use).
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

impl LineCommandSource<StdinLock<'static>> {
    /// Interactive source on standard input.
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock()).with_prompt("🖱️  Command: ")
    }
}

impl LineCommandSource<BufReader<File>> {
    /// Scripted source reading commands from a file.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> CommandSource for LineCommandSource<R> {
    fn next_command(&mut self) -> Option<Result<SessionCommand, CommandError>> {
        loop {
            if let Some(ref prompt) = self.prompt {
                print!("{}", prompt);
                let _ = io::stdout().flush();
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(trimmed.parse());
        }
    }
}

/// Command source over a fixed list, mostly for tests and demos.
impl CommandSource for std::vec::IntoIter<SessionCommand> {
    fn next_command(&mut self) -> Option<Result<SessionCommand, CommandError>> {
        self.next().map(Ok)
    }
}

/// Help text listing the available commands.
pub const CONTROLS_HELP: &str = "\
  + X Y   add positive point (include this area)
  - X Y   add negative point (exclude this area)
  space   preview the mask
  r       reset all points
  enter   confirm and continue
  q       quit";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(line: &str) -> SessionCommand {
        line.parse().unwrap()
    }

    #[test]
    fn test_parse_positive_forms() {
        let expected = SessionCommand::AddPoint {
            point: PixelPoint::new(120, 40),
            label: Label::Positive,
        };
        assert_eq!(parse("+ 120 40"), expected);
        assert_eq!(parse("p 120,40"), expected);
        assert_eq!(parse("POS (120, 40)"), expected);
        assert_eq!(parse("  positive [120 40]  "), expected);
    }

    #[test]
    fn test_parse_negative_forms() {
        let expected = SessionCommand::AddPoint {
            point: PixelPoint::new(7, 9),
            label: Label::Negative,
        };
        assert_eq!(parse("- 7 9"), expected);
        assert_eq!(parse("n 7,9"), expected);
        assert_eq!(parse("neg(7,9)"), expected);
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse("space"), SessionCommand::Preview);
        assert_eq!(parse("Preview"), SessionCommand::Preview);
        assert_eq!(parse("r"), SessionCommand::Reset);
        assert_eq!(parse("enter"), SessionCommand::Confirm);
        assert_eq!(parse("c"), SessionCommand::Confirm);
        assert_eq!(parse("QUIT"), SessionCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "jump".parse::<SessionCommand>(),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(
            "+ 12".parse::<SessionCommand>(),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(
            "+ 99999999999 1".parse::<SessionCommand>(),
            Err(CommandError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_line_source_skips_blank_and_comments() {
        let script = "# calibration\n\n+ 1 2\nspace\nbogus\nenter\n";
        let mut source = LineCommandSource::new(Cursor::new(script));

        assert!(matches!(
            source.next_command(),
            Some(Ok(SessionCommand::AddPoint { .. }))
        ));
        assert!(matches!(
            source.next_command(),
            Some(Ok(SessionCommand::Preview))
        ));
        assert!(matches!(
            source.next_command(),
            Some(Err(CommandError::Unknown(_)))
        ));
        assert!(matches!(
            source.next_command(),
            Some(Ok(SessionCommand::Confirm))
        ));
        assert!(source.next_command().is_none());
    }
}
