use std::path::{Path, PathBuf};

use crate::{
    classify::{FailureKind, FailurePattern},
    process::Invocation,
    tools::{append_to_file_name, ToolAdapter, Toolchain},
};

static PATTERNS: [FailurePattern; 1] = [FailurePattern::new(
    r"Format of the executable \(\.exe\) or library \(\.dll\) is invalid\.",
    FailureKind::NotADotnetFile,
)];

/// [de4dot-cex](https://github.com/ViRb3/de4dot-cex), run on Mono.
///
/// Input and output are passed as `-f` / `-o` flags. The output name is the full input
/// file name with `deob-cex` appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct De4dotCex;

impl De4dotCex {
    /// Configuration key.
    pub const KEY: &'static str = "de4dotcex";

    const EXECUTABLE: &'static str = "mono/de4dot-cex/de4dot-x64.exe";
    const OUTPUT_SUFFIX: &'static str = "deob-cex";
}

impl ToolAdapter for De4dotCex {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn display_name(&self) -> &'static str {
        "de4dot-cex"
    }

    fn failure_patterns(&self) -> &[FailurePattern] {
        &PATTERNS
    }

    fn executable(&self, toolchain: &Toolchain) -> Option<PathBuf> {
        Some(toolchain.tool_path(Self::EXECUTABLE))
    }

    fn invocation(&self, toolchain: &Toolchain, input: &Path) -> Invocation {
        let output = append_to_file_name(input, Self::OUTPUT_SUFFIX);
        Invocation::new(toolchain.mono(), &output)
            .arg(toolchain.tool_path(Self::EXECUTABLE))
            .arg("-f")
            .arg(input)
            .arg("-o")
            .arg(&output)
    }

    fn homepage(&self) -> &'static str {
        "https://github.com/ViRb3/de4dot-cex"
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    #[test]
    fn invocation_shape() {
        let toolchain = Toolchain::new("/opt/bin").with_mono("/usr/bin/mono");
        let invocation = De4dotCex.invocation(&toolchain, Path::new("/scratch/sample.exe"));

        assert_eq!(invocation.program(), "/usr/bin/mono");
        assert_eq!(
            invocation.arguments(),
            &[
                OsString::from("/opt/bin/mono/de4dot-cex/de4dot-x64.exe"),
                OsString::from("-f"),
                OsString::from("/scratch/sample.exe"),
                OsString::from("-o"),
                OsString::from("/scratch/sample.exedeob-cex"),
            ]
        );
        assert_eq!(invocation.stdin_text(), None);
        assert_eq!(
            invocation.expected_output(),
            Path::new("/scratch/sample.exedeob-cex")
        );
    }

    #[test]
    fn chained_input() {
        // Output of an earlier tool becomes the input here.
        let invocation = De4dotCex.invocation(
            &Toolchain::default(),
            Path::new("/scratch/sampleCleaned.exe"),
        );
        assert_eq!(
            invocation.expected_output(),
            Path::new("/scratch/sampleCleaned.exedeob-cex")
        );
    }
}
