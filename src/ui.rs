use colored::Colorize;

/// Unified output handle passed into every workflow. Verbosity is an
/// explicit construction-time flag rather than process-global state.
pub struct UX {
    verbose: bool,
}

impl UX {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn info(&self, msg: &str) {
        println!("{} {msg}", "·".bold().white());
    }

    /// Printed only when the handle was built with `--verbose`.
    pub fn verbose(&self, msg: &str) {
        if self.verbose {
            println!("{} {msg}", "·".dimmed());
        }
    }

    pub fn success(&self, msg: &str) {
        println!("{} {msg}", "✔".bold().green());
    }

    /// Warnings report and continue; they never change the exit status.
    pub fn warn(&self, msg: &str) {
        eprintln!("{} {msg}", "!".bold().yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{} {msg}", "✘".bold().red());
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
