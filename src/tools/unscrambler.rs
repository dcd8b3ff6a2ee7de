use std::path::{Path, PathBuf};

use crate::{
    classify::{FailureKind, FailurePattern},
    process::Invocation,
    tools::{insert_before_extension, ToolAdapter, Toolchain},
};

static PATTERNS: [FailurePattern; 2] = [
    FailurePattern::new(
        r"PE image does not contain a \.NET metadata directory",
        FailureKind::NotADotnetFile,
    ),
    FailurePattern::new(
        r"Specified argument was out of the range of valid values\. \(Parameter 'fileOffset'\)",
        FailureKind::TruncatedContent,
    ),
];

/// [Unscrambler](https://github.com/dr4k0nia/Unscrambler), run on the .NET runtime.
///
/// Takes the input as its only argument and waits for a key press before exiting, so a
/// newline is written to its stdin. Writes `<stem>_unscrambled<.ext>` next to the input.
///
/// In practice it rarely changes a file; it is kept first in the default order because it is
/// cheap and its error messages are the most precise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unscrambler;

impl Unscrambler {
    /// Configuration key.
    pub const KEY: &'static str = "unscrambler";

    const EXECUTABLE: &'static str = "dotnet/Unscrambler/Unscrambler.dll";
    const OUTPUT_SUFFIX: &'static str = "_unscrambled";
}

impl ToolAdapter for Unscrambler {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn display_name(&self) -> &'static str {
        "unscrambler"
    }

    fn failure_patterns(&self) -> &[FailurePattern] {
        &PATTERNS
    }

    fn executable(&self, toolchain: &Toolchain) -> Option<PathBuf> {
        Some(toolchain.tool_path(Self::EXECUTABLE))
    }

    fn invocation(&self, toolchain: &Toolchain, input: &Path) -> Invocation {
        Invocation::new(
            toolchain.dotnet(),
            insert_before_extension(input, Self::OUTPUT_SUFFIX),
        )
        .arg(toolchain.tool_path(Self::EXECUTABLE))
        .arg(input)
        .stdin("\n")
    }

    fn homepage(&self) -> &'static str {
        "https://github.com/dr4k0nia/Unscrambler"
    }
}
