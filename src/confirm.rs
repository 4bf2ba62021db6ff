//! Injected yes/no decisions.
//!
//! Clearing a collection and bundling several outputs into one archive both
//! ask the user first. The library never prompts by itself; it calls a
//! [`Confirm`] supplied by the host, so every operation stays deterministic
//! under test.

/// Answers a yes/no question.
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Always answers yes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysYes;

impl Confirm for AlwaysYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

/// Always answers no.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysNo;

impl Confirm for AlwaysNo {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_decisions() {
        let only_zip = |q: &str| q.contains("ZIP");
        assert!(only_zip.confirm("Download 3 files as ZIP file?"));
        assert!(!only_zip.confirm("Clear all images?"));
        assert!(AlwaysYes.confirm("anything"));
        assert!(!AlwaysNo.confirm("anything"));
    }
}
