//! User-facing progress and usage lines.
//!
//! These are part of the agent's observable contract and are printed whatever
//! the log filter says, so they do not go through `log`.

/// Where the bootstrap prints its progress lines.
pub trait Console: Send + Sync {
    fn out(&self, line: &str);
    fn err(&self, line: &str);
}

/// The process's stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn out(&self, line: &str) {
        println!("{}", line);
    }

    fn err(&self, line: &str) {
        eprintln!("{}", line);
    }
}
