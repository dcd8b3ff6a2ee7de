//! Job entry point: one input file in, one [`JobOutcome`] out.
//!
//! A job filters the input by size, confirms it is a .NET assembly, copies it into a private
//! scratch directory and runs the configured [`Pipeline`] over that copy. The pipeline outcome
//! is then mapped onto the result a host reports back:
//!
//! | Pipeline outcome                       | Job outcome                              |
//! |----------------------------------------|------------------------------------------|
//! | `Deobfuscated`                         | [`JobOutcome::Completed`] with the child |
//! | `AllFailed(Some(NotADotnetFile))`      | [`JobOutcome::OptOut`]                   |
//! | `AllFailed(Some(TruncatedContent))`    | [`JobOutcome::Malformed`]                |
//! | `AllFailed(None)`                      | [`JobOutcome::CompletedEmpty`]           |
//!
//! The scratch directory is removed on every exit path, including errors. The input file
//! itself is never modified.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::{
    classify::FailureKind,
    file::File,
    pipeline::{Pipeline, PipelineOutcome},
    tools::{Toolchain, DEFAULT_TOOL_KEYS},
    Error, Result,
};

/// Largest input processed by default (10 MiB). Larger files are opted out.
pub const DEFAULT_MAX_CONTENT_SIZE: u64 = 10 * 1024 * 1024;

/// Failure name reported when no tool succeeded and nothing explained why.
pub const NO_DEOBFUSCATION_PROCESSED: &str = "no-deobfuscation-processed";

/// Per-job configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Keys of the tools to run, in execution order
    pub tools: Vec<String>,
    /// Tool directory, launchers and timeout
    pub toolchain: Toolchain,
    /// Inputs larger than this are opted out; `None` disables the filter
    pub max_content_size: Option<u64>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tools: DEFAULT_TOOL_KEYS.iter().map(ToString::to_string).collect(),
            toolchain: Toolchain::default(),
            max_content_size: Some(DEFAULT_MAX_CONTENT_SIZE),
        }
    }
}

/// The deobfuscated file produced by a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildArtifact {
    /// Contents of the final artifact
    pub data: Vec<u8>,
    /// Display names of the tools that succeeded, in execution order
    pub deobfuscated_by: Vec<String>,
    /// Hex MD5 of `data`
    pub md5: String,
    /// Hex SHA-1 of `data`
    pub sha1: String,
    /// Hex SHA-256 of `data`
    pub sha256: String,
}

impl ChildArtifact {
    fn new(data: Vec<u8>, deobfuscated_by: Vec<String>) -> Self {
        Self {
            md5: hex::encode(Md5::digest(&data)),
            sha1: hex::encode(Sha1::digest(&data)),
            sha256: hex::encode(Sha256::digest(&data)),
            data,
            deobfuscated_by,
        }
    }

    /// Relationship of the child to its parent input.
    ///
    /// ```text
    /// { "action": "deobfuscated", "deobfuscated_by": "unscrambler,de4dot-cex" }
    /// ```
    #[must_use]
    pub fn relationship(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("action", "deobfuscated".to_string()),
            ("deobfuscated_by", self.deobfuscated_by.join(",")),
        ])
    }
}

/// Result of a job, as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The input is not something this job handles.
    OptOut {
        /// Reason for opting out
        message: String,
    },
    /// The input is a damaged .NET assembly.
    Malformed {
        /// What is wrong with the input
        message: String,
    },
    /// At least one tool succeeded.
    Completed(ChildArtifact),
    /// Tools ran, none succeeded, and no failure was recognised.
    CompletedEmpty {
        /// Stable identifier of the failure
        failure_name: &'static str,
        /// Summary message
        message: String,
        /// Failure message of every tool, in execution order
        failures: Vec<String>,
    },
}

impl JobOutcome {
    /// Short kebab-case name of the outcome variant.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::OptOut { .. } => "opt-out",
            JobOutcome::Malformed { .. } => "malformed",
            JobOutcome::Completed(_) => "completed",
            JobOutcome::CompletedEmpty { .. } => "completed-empty",
        }
    }

    /// The produced child, if any.
    #[must_use]
    pub fn child(&self) -> Option<&ChildArtifact> {
        match self {
            JobOutcome::Completed(child) => Some(child),
            _ => None,
        }
    }

    /// Human readable message; for [`JobOutcome::Completed`] a summary of the tools.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            JobOutcome::OptOut { message }
            | JobOutcome::Malformed { message }
            | JobOutcome::CompletedEmpty { message, .. } => message.clone(),
            JobOutcome::Completed(child) => {
                format!("Deobfuscated by {}", child.deobfuscated_by.join(","))
            }
        }
    }
}

/// Runs the configured tools over `path`.
///
/// # Errors
///
/// Returns an error if the input cannot be read, is not a parseable PE container, or the
/// scratch copy or final artifact cannot be accessed. Tool failures are never errors; they
/// end up in the returned [`JobOutcome`].
pub fn execute(path: &Path, config: &JobConfig) -> Result<JobOutcome> {
    let pipeline = Pipeline::from_keys(config.toolchain.clone(), &config.tools);
    execute_with(path, config.max_content_size, &pipeline)
}

/// Runs an explicit `pipeline` over `path`.
///
/// # Errors
///
/// See [`execute`].
pub fn execute_with(
    path: &Path,
    max_content_size: Option<u64>,
    pipeline: &Pipeline<'_>,
) -> Result<JobOutcome> {
    if let Some(limit) = max_content_size {
        let size = fs::metadata(path)?.len();
        if size > limit {
            return Ok(JobOutcome::OptOut {
                message: format!("File exceeds the maximum content size of {limit} bytes"),
            });
        }
    }

    if !File::from_file(path)?.is_dotnet() {
        return Ok(JobOutcome::OptOut {
            message: "Not a .NET assembly".to_string(),
        });
    }

    let scratch_dir = tempfile::Builder::new()
        .prefix("dotnet-deob-")
        .tempdir()?;
    let scratch = scratch_copy(path, scratch_dir.path())?;
    log::debug!("scratch copy at {}", scratch.display());

    // The artifact lives in the scratch directory; read it before the guard goes away.
    let outcome = match pipeline.run(&scratch) {
        PipelineOutcome::Deobfuscated { artifact, tools } => {
            JobOutcome::Completed(ChildArtifact::new(fs::read(&artifact)?, tools))
        }
        PipelineOutcome::AllFailed {
            classification: Some(FailureKind::NotADotnetFile),
            ..
        } => JobOutcome::OptOut {
            message: "Deobfuscators detect file as not a valid dotnet file.".to_string(),
        },
        PipelineOutcome::AllFailed {
            classification: Some(FailureKind::TruncatedContent),
            ..
        } => JobOutcome::Malformed {
            message: "Dotnetfile is shorter than the header specifies.".to_string(),
        },
        PipelineOutcome::AllFailed {
            classification: None,
            failures,
        } => JobOutcome::CompletedEmpty {
            failure_name: NO_DEOBFUSCATION_PROCESSED,
            message: "Could not run any of the deobfuscators.".to_string(),
            failures: failures
                .iter()
                .map(|failed| failed.message().to_string())
                .collect(),
        },
    };

    Ok(outcome)
}

/// Copies `input` into `dir`, keeping its file name.
fn scratch_copy(input: &Path, dir: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| Error::Error(format!("{} has no file name", input.display())))?;
    let scratch = dir.join(name);
    fs::copy(input, &scratch)?;
    Ok(scratch)
}
