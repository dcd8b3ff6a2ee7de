//! Failure taxonomy for the wrapped deobfuscators.
//!
//! None of the wrapped tools report errors in a structured way; all we get is free text on
//! stdout or stderr. Each tool therefore owns a list of [`FailurePattern`]s that recognise its
//! own phrasing of a few well-known conditions and map them onto a [`FailureKind`].
//!
//! Classification only matters when a pipeline run produced nothing at all. In that case
//! [`classify_failures`] looks at every recorded failure and picks one overall kind, which the
//! job entry point turns into an opt-out or a malformed-input flag.
//!
//! # Precedence
//!
//! Failures are scanned in execution order and each classified failure replaces the previous
//! result, so the *last* tool that recognised its own error decides. A later tool's specific
//! diagnosis overrides an earlier one's. This differs from first-match-wins whenever two tools
//! fail for different reasons on the same file, and callers depend on it.

use std::sync::OnceLock;

use regex::Regex;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{pipeline::FailedTool, tools::ToolAdapter};

/// Semantic reason a tool failed, independent of which tool produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    /// The tool considers the input not to be a valid .NET assembly.
    NotADotnetFile,
    /// The assembly is shorter than its headers declare.
    TruncatedContent,
}

/// A regular expression owned by a tool, mapped to the failure kind it indicates.
///
/// Patterns are declared as `static` data next to the tool that emits the text and compiled
/// on first use.
pub struct FailurePattern {
    pattern: &'static str,
    kind: FailureKind,
    compiled: OnceLock<Option<Regex>>,
}

impl FailurePattern {
    /// Declares a pattern. Compilation is deferred until the first match attempt.
    #[must_use]
    pub const fn new(pattern: &'static str, kind: FailureKind) -> Self {
        Self {
            pattern,
            kind,
            compiled: OnceLock::new(),
        }
    }

    /// The regular expression source.
    #[must_use]
    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    /// The kind reported when this pattern matches.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns `true` if the pattern matches anywhere in `message`.
    ///
    /// A pattern that does not compile never matches.
    #[must_use]
    pub fn is_match(&self, message: &str) -> bool {
        self.regex().is_some_and(|regex| regex.is_match(message))
    }

    fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| match Regex::new(self.pattern) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    log::error!("invalid failure pattern {:?}: {}", self.pattern, error);
                    None
                }
            })
            .as_ref()
    }
}

impl std::fmt::Debug for FailurePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailurePattern")
            .field("pattern", &self.pattern)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Classifies one tool's error message using that tool's own patterns.
///
/// The first pattern in declaration order that matches decides. Returns `None` if no pattern
/// matches.
#[must_use]
pub fn classify(tool: &dyn ToolAdapter, message: &str) -> Option<FailureKind> {
    tool.failure_patterns()
        .iter()
        .find(|pattern| pattern.is_match(message))
        .map(FailurePattern::kind)
}

/// Picks the overall classification for a run in which every tool failed.
///
/// `failures` must be in execution order. The last failure that any of its tool's patterns
/// recognise determines the result; `None` if nothing was recognised.
#[must_use]
pub fn classify_failures(failures: &[FailedTool<'_>]) -> Option<FailureKind> {
    let mut current = None;
    for failed in failures {
        if let Some(kind) = classify(failed.tool(), failed.message()) {
            current = Some(kind);
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::tools::{ConfuserExStringDecryptor, De4dotCex, Unscrambler, AVAILABLE_TOOLS};

    #[test]
    fn all_tool_patterns_compile() {
        for tool in AVAILABLE_TOOLS {
            for pattern in tool.failure_patterns() {
                assert!(
                    Regex::new(pattern.pattern()).is_ok(),
                    "{} has an invalid pattern {:?}",
                    tool.key(),
                    pattern.pattern()
                );
            }
        }
    }

    #[test]
    fn unscrambler_patterns() {
        assert_eq!(
            classify(
                &Unscrambler,
                "Unhandled exception. BadImageFormatException: PE image does not contain a .NET metadata directory."
            ),
            Some(FailureKind::NotADotnetFile)
        );
        assert_eq!(
            classify(
                &Unscrambler,
                "ArgumentOutOfRangeException: Specified argument was out of the range of valid values. (Parameter 'fileOffset')"
            ),
            Some(FailureKind::TruncatedContent)
        );
        assert_eq!(classify(&Unscrambler, "Segmentation fault"), None);
    }

    #[test]
    fn confuserex_patterns() {
        assert_eq!(
            classify(
                &ConfuserExStringDecryptor,
                "dnlib.IO.DataReaderException: There's not enough bytes left to read"
            ),
            Some(FailureKind::TruncatedContent)
        );
        assert_eq!(
            classify(
                &ConfuserExStringDecryptor,
                "BadImageFormatException: Format of the executable (.exe) or library (.dll) is invalid."
            ),
            Some(FailureKind::NotADotnetFile)
        );
    }

    #[test]
    fn patterns_are_tool_owned() {
        // de4dot-cex does not know the ConfuserEx truncation message.
        assert_eq!(
            classify(&De4dotCex, "There's not enough bytes left to read"),
            None
        );
        // Unscrambler does not know the mono BadImageFormat phrasing.
        assert_eq!(
            classify(
                &Unscrambler,
                "Format of the executable (.exe) or library (.dll) is invalid."
            ),
            None
        );
    }

    #[test]
    fn literal_dots_are_escaped() {
        assert_eq!(
            classify(
                &De4dotCex,
                "Format of the executable (Xexe) or library (.dll) is invalid."
            ),
            None
        );
    }

    #[test]
    fn first_declared_pattern_wins_within_a_tool() {
        let message = "Format of the executable (.exe) or library (.dll) is invalid. There's not enough bytes left to read";
        assert_eq!(
            classify(&ConfuserExStringDecryptor, message),
            Some(FailureKind::NotADotnetFile)
        );
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let pattern = FailurePattern::new("(unclosed", FailureKind::NotADotnetFile);
        assert!(!pattern.is_match("(unclosed"));
    }

    #[test]
    fn kind_labels() {
        let labels: Vec<String> = FailureKind::iter().map(|kind| kind.to_string()).collect();
        assert_eq!(labels, vec!["not-a-dotnet-file", "truncated-content"]);
    }
}
