//! Terminal output

use crossterm::style::Stylize;

/// Status line printer. Progress goes to stdout, problems to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    quiet: bool,
}

impl Output {
    /// Drop info and success lines; warnings and errors still print.
    pub fn quiet(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{} {msg}", "•".dark_grey());
        }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{} {msg}", "✓".green());
        }
    }

    pub fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "!".yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", "✗".red(), msg.red());
    }
}
