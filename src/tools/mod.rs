//! Adapters for the wrapped third-party deobfuscators.
//!
//! Each wrapped tool is one implementation of [`ToolAdapter`]. An adapter knows where its
//! executable lives below the tool directory, how to turn an input path into a command line
//! (and possibly a line of stdin), where the tool writes its result, and how to recognise its
//! own error messages. Adding a tool means adding one adapter and listing it in
//! [`AVAILABLE_TOOLS`]; the pipeline itself never changes.
//!
//! # Built-in Tools
//!
//! | Key             | Tool                                 | Expected output            |
//! |-----------------|--------------------------------------|----------------------------|
//! | `unscrambler`   | [`Unscrambler`]                      | `<stem>_unscrambled<.ext>` |
//! | `ConfuserExSSD` | [`ConfuserExStringDecryptor`]        | `<stem>Cleaned<.ext>`      |
//! | `de4dotcex`     | [`De4dotCex`]                        | `<input>deob-cex`          |
//!
//! The expected output names mirror what each executable actually writes. Getting one wrong
//! makes every run of that tool end in a missing-output failure.
//!
//! # Tool Directory Layout
//!
//! ```text
//! bin/
//! ├── dotnet/Unscrambler/Unscrambler.dll
//! └── mono/
//!     ├── ConfuserEx_Static_String_decryptor/ConfuserEx String Decryptor.exe
//!     └── de4dot-cex/de4dot-x64.exe
//! ```

mod confuserex;
mod de4dot;
mod unscrambler;

pub use confuserex::ConfuserExStringDecryptor;
pub use de4dot::De4dotCex;
pub use unscrambler::Unscrambler;

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    classify::FailurePattern,
    process::{Invocation, ToolFailure, DEFAULT_TIMEOUT},
};

/// Every tool this crate knows about, in registration order.
///
/// The table is immutable; which tools run, and in which order, is decided per job by the
/// configured list of keys (see [`select`]).
pub static AVAILABLE_TOOLS: &[&dyn ToolAdapter] =
    &[&Unscrambler, &ConfuserExStringDecryptor, &De4dotCex];

/// Keys of the tools run when no explicit selection is configured.
pub const DEFAULT_TOOL_KEYS: [&str; 3] = [
    Unscrambler::KEY,
    ConfuserExStringDecryptor::KEY,
    De4dotCex::KEY,
];

/// A wrapped deobfuscation tool.
///
/// Implementations are stateless. Everything that varies between installations (tool
/// directory, runtime launchers, timeout) comes from the [`Toolchain`] passed to each call.
pub trait ToolAdapter: Send + Sync {
    /// Stable short identifier, unique across all adapters, used to select tools.
    fn key(&self) -> &'static str;

    /// Human-readable name, recorded in the list of tools that succeeded.
    fn display_name(&self) -> &'static str;

    /// Patterns recognising this tool's own error phrasing, in precedence order.
    fn failure_patterns(&self) -> &[FailurePattern];

    /// Location of the wrapped executable, if the adapter runs one from the tool directory.
    fn executable(&self, _toolchain: &Toolchain) -> Option<PathBuf> {
        None
    }

    /// Computes the command line, stdin text and expected output path for `input`.
    ///
    /// Must be a pure function of its arguments.
    fn invocation(&self, toolchain: &Toolchain, input: &Path) -> Invocation;

    /// Runs the tool once on `input`.
    ///
    /// # Errors
    ///
    /// Returns the [`ToolFailure`] of the underlying process invocation unchanged.
    fn deobfuscate(&self, toolchain: &Toolchain, input: &Path) -> Result<PathBuf, ToolFailure> {
        self.invocation(toolchain, input).run(toolchain.timeout())
    }

    /// Link to the upstream project, for listings.
    fn homepage(&self) -> &'static str {
        ""
    }
}

impl std::fmt::Debug for dyn ToolAdapter + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAdapter")
            .field("key", &self.key())
            .field("display_name", &self.display_name())
            .finish()
    }
}

/// Installation-specific settings shared by all adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    bin_dir: PathBuf,
    mono: PathBuf,
    dotnet: PathBuf,
    timeout: Duration,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new("bin")
    }
}

impl Toolchain {
    /// Creates a toolchain rooted at `bin_dir` using `mono` and `dotnet` from `PATH` and the
    /// default 60 second timeout.
    #[must_use]
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            mono: PathBuf::from("mono"),
            dotnet: PathBuf::from("dotnet"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the tool directory.
    #[must_use]
    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = bin_dir.into();
        self
    }

    /// Sets the Mono launcher.
    #[must_use]
    pub fn with_mono(mut self, mono: impl Into<PathBuf>) -> Self {
        self.mono = mono.into();
        self
    }

    /// Sets the .NET launcher.
    #[must_use]
    pub fn with_dotnet(mut self, dotnet: impl Into<PathBuf>) -> Self {
        self.dotnet = dotnet.into();
        self
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The tool directory.
    #[must_use]
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// The Mono launcher.
    #[must_use]
    pub fn mono(&self) -> &Path {
        &self.mono
    }

    /// The .NET launcher.
    #[must_use]
    pub fn dotnet(&self) -> &Path {
        &self.dotnet
    }

    /// The per-invocation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves a path relative to the tool directory.
    #[must_use]
    pub fn tool_path(&self, relative: &str) -> PathBuf {
        self.bin_dir.join(relative)
    }
}

/// Looks up a built-in tool by key.
#[must_use]
pub fn find(key: &str) -> Option<&'static dyn ToolAdapter> {
    AVAILABLE_TOOLS.iter().copied().find(|tool| tool.key() == key)
}

/// Resolves configured keys against the built-in tools.
///
/// See [`select_from`].
#[must_use]
pub fn select<S: AsRef<str>>(keys: &[S]) -> Vec<&'static dyn ToolAdapter> {
    select_from(AVAILABLE_TOOLS, keys)
}

/// Resolves configured keys against `registry`.
///
/// The result follows the order of `keys`, not the registry. Keys without a matching tool
/// are skipped, and a key listed twice only selects its tool once, since every tool runs at
/// most once per pipeline run.
#[must_use]
pub fn select_from<'a, S: AsRef<str>>(
    registry: &[&'a dyn ToolAdapter],
    keys: &[S],
) -> Vec<&'a dyn ToolAdapter> {
    let mut selected: Vec<&'a dyn ToolAdapter> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.as_ref();
        match registry.iter().find(|tool| tool.key() == key) {
            Some(tool) if selected.iter().any(|chosen| chosen.key() == key) => {
                log::debug!("deobfuscator '{}' is listed more than once", tool.key());
            }
            Some(tool) => selected.push(*tool),
            None => log::debug!("skipping unknown deobfuscator '{}'", key),
        }
    }
    selected
}

/// `dir/name.ext` + `suffix` -> `dir/name<suffix>.ext`; without extension `dir/name<suffix>`.
pub(crate) fn insert_before_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    if let Some(extension) = path.extension() {
        name.push(".");
        name.push(extension);
    }
    path.with_file_name(name)
}

/// `dir/name.ext` + `suffix` -> `dir/name.ext<suffix>`.
pub(crate) fn append_to_file_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
