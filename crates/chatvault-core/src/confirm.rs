//! Confirmation capability for destructive operations.
//!
//! Injected as a trait object so automated runs and tests can supply
//! deterministic answers without interactive input.

use std::io::{BufRead, Write};

/// Answers yes/no prompts before destructive operations.
pub trait Confirm: Send + Sync {
    /// Returns true if the operation may proceed.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads the answer from stdin. Anything but `y`/`yes` declines.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Always answers yes. Used for `--force` and dry runs.
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;

    impl Confirm for DenyAll {
        fn confirm(&self, _prompt: &str) -> bool {
            false
        }
    }

    #[test]
    fn always_confirm_accepts() {
        assert!(AlwaysConfirm.confirm("destroy everything?"));
    }

    #[test]
    fn trait_objects_dispatch() {
        let yes: Box<dyn Confirm> = Box::new(AlwaysConfirm);
        let no: Box<dyn Confirm> = Box::new(DenyAll);
        assert!(yes.confirm("?"));
        assert!(!no.confirm("?"));
    }
}
