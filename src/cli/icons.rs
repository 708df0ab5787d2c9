//! Status glyphs for terminal output.

use console::{style, StyledObject};

/// Green checkmark for completed steps.
pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Cyan arrow for steps in progress.
pub fn info() -> StyledObject<&'static str> {
    style("→").cyan()
}

pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

pub fn error() -> StyledObject<&'static str> {
    style("✗").red()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyphs() {
        assert!(success().to_string().contains('✓'));
        assert!(info().to_string().contains('→'));
        assert!(warn().to_string().contains('!'));
        assert!(error().to_string().contains('✗'));
    }
}
