use std::path::{Path, PathBuf};

use crate::{
    classify::{FailureKind, FailurePattern},
    process::Invocation,
    tools::{append_to_file_name, insert_before_extension, ToolAdapter, Toolchain},
};

static PATTERNS: [FailurePattern; 2] = [
    FailurePattern::new(
        r"Format of the executable \(\.exe\) or library \(\.dll\) is invalid\.",
        FailureKind::NotADotnetFile,
    ),
    FailurePattern::new(
        r"There's not enough bytes left to read",
        FailureKind::TruncatedContent,
    ),
];

/// [ConfuserEx-Static-String-Decryptor](https://github.com/Loksie/ConfuserEx-Static-String-Decryptor),
/// run on Mono.
///
/// The decryptor takes no arguments; it prompts for the path of the assembly on stdin. The
/// cleaned assembly is written next to the input with `Cleaned` inserted before the
/// extension. Inputs without an extension get the tool's default `.exe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfuserExStringDecryptor;

impl ConfuserExStringDecryptor {
    /// Configuration key.
    pub const KEY: &'static str = "ConfuserExSSD";

    const EXECUTABLE: &'static str =
        "mono/ConfuserEx_Static_String_decryptor/ConfuserEx String Decryptor.exe";
    const OUTPUT_SUFFIX: &'static str = "Cleaned";
    const DEFAULT_EXTENSION: &'static str = ".exe";

    fn expected_output(input: &Path) -> PathBuf {
        if input.extension().is_some() {
            insert_before_extension(input, Self::OUTPUT_SUFFIX)
        } else {
            append_to_file_name(
                input,
                &format!("{}{}", Self::OUTPUT_SUFFIX, Self::DEFAULT_EXTENSION),
            )
        }
    }
}

impl ToolAdapter for ConfuserExStringDecryptor {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn display_name(&self) -> &'static str {
        "ConfuserEx-Static-String-Decryptor"
    }

    fn failure_patterns(&self) -> &[FailurePattern] {
        &PATTERNS
    }

    fn executable(&self, toolchain: &Toolchain) -> Option<PathBuf> {
        Some(toolchain.tool_path(Self::EXECUTABLE))
    }

    fn invocation(&self, toolchain: &Toolchain, input: &Path) -> Invocation {
        Invocation::new(toolchain.mono(), Self::expected_output(input))
            .arg(toolchain.tool_path(Self::EXECUTABLE))
            .stdin(input.to_string_lossy())
    }

    fn homepage(&self) -> &'static str {
        "https://github.com/Loksie/ConfuserEx-Static-String-Decryptor"
    }
}
