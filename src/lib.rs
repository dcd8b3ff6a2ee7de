// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotnet-deob
//!
//! Runs an ordered chain of third-party .NET deobfuscators over an assembly, one external
//! process at a time, and turns whatever they produce (or fail to produce) into a single
//! structured result.
//!
//! The wrapped tools are opaque executables. This crate does not deobfuscate anything itself;
//! it owns the parts around them:
//!
//! - **Process invocation** - timeouts, exit codes, and detection of tools that "succeed"
//!   without writing anything
//! - **Chaining** - the output of each successful tool is the input of the next, a failing
//!   tool is skipped over
//! - **Failure classification** - tool error messages are matched against per-tool patterns
//!   to tell "not a .NET file" and "truncated file" apart from everything else
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotnet_deob::{job, JobConfig, JobOutcome, Toolchain};
//! use std::path::Path;
//!
//! let config = JobConfig {
//!     toolchain: Toolchain::new("/opt/dotnet-deob/bin"),
//!     ..JobConfig::default()
//! };
//!
//! match job::execute(Path::new("sample.exe"), &config)? {
//!     JobOutcome::Completed(child) => {
//!         std::fs::write("sample_deobfuscated.exe", &child.data)?;
//!         println!("deobfuscated by {}", child.deobfuscated_by.join(","));
//!     }
//!     other => println!("{}: {}", other.label(), other.message()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use dotnet_deob::prelude::*;
//! use std::path::Path;
//!
//! let pipeline = Pipeline::from_keys(Toolchain::default(), &DEFAULT_TOOL_KEYS);
//! let outcome = pipeline.run(Path::new("/tmp/scratch/sample.exe"));
//! println!("success: {}", outcome.is_deobfuscated());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! job ──► file (PE precheck)
//!  │
//!  └────► pipeline ──► tools (adapters) ──► process (runner)
//!             │
//!             └──────► classify (failure taxonomy)
//! ```
//!
//! Everything is sequential. At most one external process is alive at any time, and the only
//! helper threads are the ones feeding and draining that process's pipes. They are never
//! waited on past the invocation's timeout.
//!
//! ## Error Handling
//!
//! Only conditions that stop a job from running at all are [`Error`]s. A tool that crashes,
//! times out or writes nothing is a [`ToolFailure`] value recorded by the pipeline:
//!
//! ```rust,no_run
//! use dotnet_deob::{job, Error, JobConfig};
//!
//! match job::execute(std::path::Path::new("sample.exe"), &JobConfig::default()) {
//!     Ok(outcome) => println!("{}", outcome.label()),
//!     Err(Error::GoblinErr(e)) => println!("Not a PE container: {}", e),
//!     Err(Error::Malformed { message, .. }) => println!("Malformed file: {}", message),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! Runner and pipeline tests drive `sh` scripts in place of the real tools, so the suite
//! needs a Unix shell but neither Mono nor .NET.
//!
//! ```bash
//! cargo test
//! cargo bench --bench classify
//! cargo +nightly fuzz run file --release
//! ```
#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dotnet_deob::prelude::*;
///
/// let outcome = job::execute("sample.exe".as_ref(), &JobConfig::default())?;
/// println!("{}", outcome.label());
/// # Ok::<(), dotnet_deob::Error>(())
/// ```
pub mod prelude;

/// Failure taxonomy: mapping tool error messages onto [`FailureKind`]s.
pub mod classify;

/// PE container precheck built on goblin.
///
/// See [`File`] for the entry points.
pub mod file;

/// Job entry point: size filter, precheck, scratch copy, pipeline, outcome mapping.
///
/// # Examples
///
/// ```rust,no_run
/// use dotnet_deob::{job, JobConfig};
///
/// let config = JobConfig {
///     tools: vec!["de4dotcex".to_string(), "unscrambler".to_string()],
///     ..JobConfig::default()
/// };
/// let outcome = job::execute(std::path::Path::new("sample.exe"), &config)?;
/// println!("{}", outcome.message());
/// # Ok::<(), dotnet_deob::Error>(())
/// ```
pub mod job;

pub mod pipeline;

/// Running one external tool with a timeout.
///
/// # Examples
///
/// ```rust,no_run
/// use dotnet_deob::{process::DEFAULT_TIMEOUT, Invocation};
///
/// let result = Invocation::new("mono", "/tmp/x/sample.exedeob-cex")
///     .arg("bin/mono/de4dot-cex/de4dot-x64.exe")
///     .args(["-f", "/tmp/x/sample.exe", "-o", "/tmp/x/sample.exedeob-cex"])
///     .run(DEFAULT_TIMEOUT);
///
/// match result {
///     Ok(artifact) => println!("wrote {}", artifact.display()),
///     Err(failure) => println!("{}: {}", failure.label(), failure),
/// }
/// ```
pub mod process;

pub mod tools;

/// `dotnet-deob` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotnet-deob` Error type
///
/// The error type for everything that prevents a job from running. Tool failures are reported
/// through [`ToolFailure`] instead.
pub use error::Error;

pub use classify::FailureKind;
pub use file::File;
pub use job::{ChildArtifact, JobConfig, JobOutcome};
pub use pipeline::{FailedTool, Pipeline, PipelineOutcome};
pub use process::{Invocation, ToolFailure};
pub use tools::{ToolAdapter, Toolchain};
