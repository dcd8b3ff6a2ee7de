use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Failures of the wrapped deobfuscation tools are *not* represented here. A tool that
/// crashes, times out or produces nothing is an ordinary outcome of a pipeline run and is
/// reported through [`crate::process::ToolFailure`] instead. This enum only covers conditions
/// that prevent a job from running at all.
///
/// # Error Categories
///
/// ## Container Errors
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::GoblinErr`] - PE parsing errors from goblin crate
///
/// ## I/O and Other Errors
/// - [`Error::FileError`] - Filesystem I/O errors (scratch directory, copies, artifacts)
/// - [`Error::Error`] - Miscellaneous failures
///
/// # Examples
///
/// ```rust,no_run
/// use dotnet_deob::{job, Error, JobConfig};
/// use std::path::Path;
///
/// match job::execute(Path::new("sample.exe"), &JobConfig::default()) {
///     Ok(outcome) => println!("{}", outcome.label()),
///     Err(Error::GoblinErr(err)) => eprintln!("Error while parsing PE: {}", err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading the input, materializing the
    /// scratch copy, or reading back the produced artifact.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    ///
    /// This is the one precheck failure that is surfaced to the caller as an unrecoverable
    /// error rather than being fed into the pipeline.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
