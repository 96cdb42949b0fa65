//! Operator prompt on the terminal.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

use rivet_hal::OperatorPrompt;
use rivet_types::{Acknowledgment, RivetError};

/// Blocks on a line of input until the operator answers.
///
/// `ok`, `y`, `yes` or an empty line confirm; `n`, `no`, `dismiss` or
/// `cancel` dismiss. Anything else asks again.
pub struct ConsolePrompt {
    /// `None` reads the process stdin, shared with the REPL.
    input: Mutex<Option<Box<dyn BufRead + Send>>>,
}

impl ConsolePrompt {
    pub fn stdin() -> Self {
        Self {
            input: Mutex::new(None),
        }
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(reader))),
        }
    }

    fn read_line(&self, line: &mut String) -> io::Result<usize> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        match input.as_mut() {
            Some(reader) => reader.read_line(line),
            None => io::stdin().lock().read_line(line),
        }
    }
}

fn parse_answer(line: &str) -> Option<Acknowledgment> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "ok" | "y" | "yes" => Some(Acknowledgment::Confirmed),
        "n" | "no" | "dismiss" | "cancel" => Some(Acknowledgment::Dismissed),
        _ => None,
    }
}

impl OperatorPrompt for ConsolePrompt {
    fn prompt_modal(&self, message: &str) -> Result<Acknowledgment, RivetError> {
        loop {
            println!();
            println!("  {} {}", "▶".bold().yellow(), message.bold());
            print!("  {} ", "[ok/dismiss]:".dimmed());
            io::stdout().flush().ok();

            let mut line = String::new();
            match self.read_line(&mut line) {
                Ok(0) => return Err(RivetError::Operator("console closed".to_string())),
                Ok(_) => {}
                Err(e) => return Err(RivetError::Operator(format!("console read failed: {e}"))),
            }
            match parse_answer(&line) {
                Some(ack) => return Ok(ack),
                None => println!("  {} '{}'", "Please answer ok or dismiss, not".red(), line.trim()),
            }
        }
    }
}
