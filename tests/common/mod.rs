//! Shared helpers for the integration tests.
//!
//! [`ShellTool`] stands in for a real deobfuscator: it runs a `sh` script that receives the
//! input path as `$1` and the expected output path as `$2`.

#![allow(dead_code)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use dotnet_deob::{classify::FailurePattern, Invocation, ToolAdapter, Toolchain};

pub struct ShellTool {
    key: &'static str,
    name: &'static str,
    suffix: &'static str,
    script: String,
    patterns: &'static [FailurePattern],
}

impl ShellTool {
    /// Appends `+<key>` to the input and writes it to the expected output.
    pub fn appending(key: &'static str, name: &'static str, suffix: &'static str) -> Self {
        Self::script(
            key,
            name,
            suffix,
            &format!(r#"cat "$1" > "$2"; printf '+{key}' >> "$2""#),
        )
    }

    /// Prints `message` on stderr and exits 1.
    pub fn failing(key: &'static str, name: &'static str, message: &str) -> Self {
        Self::script(key, name, ".never", &format!("echo '{message}' >&2; exit 1"))
    }

    /// Runs an arbitrary script.
    pub fn script(key: &'static str, name: &'static str, suffix: &'static str, script: &str) -> Self {
        Self {
            key,
            name,
            suffix,
            script: script.to_string(),
            patterns: &[],
        }
    }

    pub fn with_patterns(mut self, patterns: &'static [FailurePattern]) -> Self {
        self.patterns = patterns;
        self
    }

    /// Output path this tool produces for `input`.
    pub fn output_for(&self, input: &Path) -> PathBuf {
        let mut name = OsString::from(input.as_os_str());
        name.push(self.suffix);
        PathBuf::from(name)
    }
}

impl ToolAdapter for ShellTool {
    fn key(&self) -> &'static str {
        self.key
    }

    fn display_name(&self) -> &'static str {
        self.name
    }

    fn failure_patterns(&self) -> &[FailurePattern] {
        self.patterns
    }

    fn invocation(&self, _toolchain: &Toolchain, input: &Path) -> Invocation {
        let output = self.output_for(input);
        Invocation::new("sh", &output)
            .arg("-c")
            .arg(&self.script)
            .arg("sh")
            .arg(input)
            .arg(&output)
    }
}

/// Scratch directory holding `sample.exe` with `data`.
pub fn scratch(data: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.exe");
    std::fs::write(&path, data).unwrap();
    (dir, path)
}
