//! # dotnet-deob Prelude
//!
//! The types needed to configure and run jobs and pipelines, for glob imports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotnet-deob operations
pub use crate::Error;

/// The result type used throughout dotnet-deob
pub use crate::Result;

// ================================================================================================
// Jobs
// ================================================================================================

pub use crate::job::{self, ChildArtifact, JobConfig, JobOutcome, DEFAULT_MAX_CONTENT_SIZE};

/// PE precheck
pub use crate::File;

// ================================================================================================
// Pipeline and Tools
// ================================================================================================

pub use crate::pipeline::{FailedTool, Pipeline, PipelineOutcome};

pub use crate::tools::{ToolAdapter, Toolchain, AVAILABLE_TOOLS, DEFAULT_TOOL_KEYS};

/// Failure taxonomy
pub use crate::classify::{FailureKind, FailurePattern};

/// Process runner
pub use crate::process::{Invocation, ToolFailure, DEFAULT_TIMEOUT};
