//! Sequential multi-tool deobfuscation pipeline.
//!
//! A [`Pipeline`] holds an ordered selection of tools and runs each of them exactly once over a
//! scratch file. The output of every successful tool becomes the input of the next one; a
//! failing tool leaves the current candidate untouched, so the next tool sees the most recent
//! successful artifact (or the scratch file itself if nothing has succeeded yet).
//!
//! ```text
//! scratch ──► tool 1 ──ok──► out1 ──► tool 2 ──fail──┐
//!                                                    │ (candidate stays out1)
//!                                     tool 3 ◄───────┘ ──ok──► out3 = final artifact
//! ```
//!
//! The run never aborts early and never retries. When at least one tool succeeded the outcome
//! is [`PipelineOutcome::Deobfuscated`]; otherwise the recorded failures are classified with
//! [`crate::classify::classify_failures`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotnet_deob::{Pipeline, PipelineOutcome, Toolchain};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::from_keys(Toolchain::new("/opt/deob/bin"), &["ConfuserExSSD", "de4dotcex"]);
//! match pipeline.run(Path::new("/tmp/scratch/sample.exe")) {
//!     PipelineOutcome::Deobfuscated { artifact, tools } => {
//!         println!("{} via {}", artifact.display(), tools.join(","));
//!     }
//!     PipelineOutcome::AllFailed { classification, .. } => {
//!         println!("nothing succeeded ({:?})", classification);
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::{
    classify::{classify_failures, FailureKind},
    process::ToolFailure,
    tools::{self, ToolAdapter, Toolchain},
};

/// A tool that failed during a run, with the message used for classification.
#[derive(Debug)]
pub struct FailedTool<'a> {
    tool: &'a dyn ToolAdapter,
    failure: ToolFailure,
    message: String,
}

impl<'a> FailedTool<'a> {
    /// Records `failure` as produced by `tool`.
    #[must_use]
    pub fn new(tool: &'a dyn ToolAdapter, failure: ToolFailure) -> Self {
        let message = format!(
            "Deobfuscator {} failed with error: {}",
            tool.display_name(),
            failure
        );
        Self {
            tool,
            failure,
            message,
        }
    }

    /// The tool that failed.
    #[must_use]
    pub fn tool(&self) -> &'a dyn ToolAdapter {
        self.tool
    }

    /// The structured failure.
    #[must_use]
    pub fn failure(&self) -> &ToolFailure {
        &self.failure
    }

    /// The full error message, including the tool's captured output.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result of running a pipeline over one file.
#[derive(Debug)]
pub enum PipelineOutcome<'a> {
    /// At least one tool succeeded.
    Deobfuscated {
        /// Output of the last tool that succeeded
        artifact: PathBuf,
        /// Display names of the tools that succeeded, in execution order
        tools: Vec<String>,
    },
    /// Every tool that ran failed, or no tool was selected.
    AllFailed {
        /// Overall classification, `None` when no failure was recognised
        classification: Option<FailureKind>,
        /// Every failure, in execution order
        failures: Vec<FailedTool<'a>>,
    },
}

impl PipelineOutcome<'_> {
    /// Returns `true` for [`PipelineOutcome::Deobfuscated`].
    #[must_use]
    pub fn is_deobfuscated(&self) -> bool {
        matches!(self, PipelineOutcome::Deobfuscated { .. })
    }
}

/// An ordered selection of tools sharing one [`Toolchain`].
pub struct Pipeline<'a> {
    toolchain: Toolchain,
    tools: Vec<&'a dyn ToolAdapter>,
}

impl Pipeline<'static> {
    /// Builds a pipeline from configured keys against the built-in tools.
    ///
    /// Unknown keys are skipped; see [`tools::select`].
    #[must_use]
    pub fn from_keys<S: AsRef<str>>(toolchain: Toolchain, keys: &[S]) -> Self {
        Self::new(toolchain, tools::select(keys))
    }
}

impl<'a> Pipeline<'a> {
    /// Builds a pipeline running `tools` in the given order.
    #[must_use]
    pub fn new(toolchain: Toolchain, tools: Vec<&'a dyn ToolAdapter>) -> Self {
        Self { toolchain, tools }
    }

    /// The tools in execution order.
    #[must_use]
    pub fn tools(&self) -> &[&'a dyn ToolAdapter] {
        &self.tools
    }

    /// The shared toolchain settings.
    #[must_use]
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Runs every selected tool once, in order, starting from `scratch`.
    ///
    /// Blocks until the last tool has finished or timed out.
    pub fn run(&self, scratch: &Path) -> PipelineOutcome<'a> {
        let mut run = PipelineRun::new(scratch);

        for &tool in &self.tools {
            match tool.deobfuscate(&self.toolchain, &run.candidate) {
                Ok(artifact) => {
                    log::info!("{} produced {}", tool.display_name(), artifact.display());
                    run.succeeded(tool, artifact);
                }
                Err(failure) => {
                    let failed = FailedTool::new(tool, failure);
                    log::warn!("{}", failed.message());
                    run.failed.push(failed);
                }
            }
        }

        run.finish()
    }
}

/// Mutable state of one run. The candidate always points at the latest successful artifact,
/// or at the scratch file while nothing has succeeded.
struct PipelineRun<'a> {
    candidate: PathBuf,
    succeeded: Vec<String>,
    failed: Vec<FailedTool<'a>>,
}

impl<'a> PipelineRun<'a> {
    fn new(scratch: &Path) -> Self {
        Self {
            candidate: scratch.to_path_buf(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn succeeded(&mut self, tool: &dyn ToolAdapter, artifact: PathBuf) {
        self.candidate = artifact;
        self.succeeded.push(tool.display_name().to_string());
    }

    fn finish(self) -> PipelineOutcome<'a> {
        if self.succeeded.is_empty() {
            PipelineOutcome::AllFailed {
                classification: classify_failures(&self.failed),
                failures: self.failed,
            }
        } else {
            PipelineOutcome::Deobfuscated {
                artifact: self.candidate,
                tools: self.succeeded,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex};

    use super::*;
    use crate::{
        classify::FailurePattern,
        process::Invocation,
        tools::{select_from, Unscrambler},
    };

    static NOT_DOTNET: [FailurePattern; 1] =
        [FailurePattern::new("not dotnet", FailureKind::NotADotnetFile)];
    static TRUNCATED: [FailurePattern; 1] =
        [FailurePattern::new("truncated", FailureKind::TruncatedContent)];

    /// Tool with a canned result that records the inputs it was given.
    struct Canned {
        key: &'static str,
        result: Result<&'static str, &'static str>,
        patterns: &'static [FailurePattern],
        inputs: Mutex<Vec<PathBuf>>,
    }

    impl Canned {
        fn ok(key: &'static str, suffix: &'static str) -> Self {
            Self {
                key,
                result: Ok(suffix),
                patterns: &[],
                inputs: Mutex::new(Vec::new()),
            }
        }

        fn fail(key: &'static str, message: &'static str) -> Self {
            Self {
                key,
                result: Err(message),
                patterns: &[],
                inputs: Mutex::new(Vec::new()),
            }
        }

        fn with_patterns(mut self, patterns: &'static [FailurePattern]) -> Self {
            self.patterns = patterns;
            self
        }

        fn inputs(&self) -> Vec<PathBuf> {
            self.inputs.lock().unwrap().clone()
        }
    }

    impl ToolAdapter for Canned {
        fn key(&self) -> &'static str {
            self.key
        }

        fn display_name(&self) -> &'static str {
            self.key
        }

        fn failure_patterns(&self) -> &[FailurePattern] {
            self.patterns
        }

        fn invocation(&self, _toolchain: &Toolchain, input: &Path) -> Invocation {
            Invocation::new("true", input)
        }

        fn deobfuscate(
            &self,
            _toolchain: &Toolchain,
            input: &Path,
        ) -> Result<PathBuf, ToolFailure> {
            self.inputs.lock().unwrap().push(input.to_path_buf());
            match self.result {
                Ok(suffix) => Ok(tools::append_to_file_name(input, suffix)),
                Err(message) => Err(ToolFailure::Launch(io::Error::other(message))),
            }
        }
    }

    fn run<'a>(tools: &[&'a dyn ToolAdapter]) -> PipelineOutcome<'a> {
        Pipeline::new(Toolchain::default(), tools.to_vec()).run(Path::new("/scratch/in.exe"))
    }

    #[test]
    fn threads_output_of_successful_tools() {
        let a = Canned::ok("A", ".a");
        let b = Canned::fail("B", "boom");
        let c = Canned::ok("C", ".c");

        let outcome = run(&[&a, &b, &c]);

        assert_eq!(a.inputs(), vec![PathBuf::from("/scratch/in.exe")]);
        assert_eq!(b.inputs(), vec![PathBuf::from("/scratch/in.exe.a")]);
        assert_eq!(c.inputs(), vec![PathBuf::from("/scratch/in.exe.a")]);
        match outcome {
            PipelineOutcome::Deobfuscated { artifact, tools } => {
                assert_eq!(artifact, PathBuf::from("/scratch/in.exe.a.c"));
                assert_eq!(tools, vec!["A", "C"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn only_last_tool_succeeds() {
        let a = Canned::fail("A", "a failed");
        let b = Canned::fail("B", "b failed");
        let c = Canned::ok("C", ".c");

        let outcome = run(&[&a, &b, &c]);

        assert_eq!(c.inputs(), vec![PathBuf::from("/scratch/in.exe")]);
        match outcome {
            PipelineOutcome::Deobfuscated { artifact, tools } => {
                assert_eq!(artifact, PathBuf::from("/scratch/in.exe.c"));
                assert_eq!(tools, vec!["C"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn first_fails_then_two_succeed() {
        let a = Canned::fail("A", "a failed");
        let b = Canned::ok("B", ".b");
        let c = Canned::ok("C", ".c");

        match run(&[&a, &b, &c]) {
            PipelineOutcome::Deobfuscated { artifact, tools } => {
                assert_eq!(artifact, PathBuf::from("/scratch/in.exe.b.c"));
                assert_eq!(tools, vec!["B", "C"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn empty_selection_is_unclassified_failure() {
        match run(&[]) {
            PipelineOutcome::AllFailed {
                classification,
                failures,
            } => {
                assert_eq!(classification, None);
                assert!(failures.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn every_tool_runs_even_after_failures() {
        let a = Canned::fail("A", "a");
        let b = Canned::fail("B", "b");
        let c = Canned::fail("C", "c");

        match run(&[&a, &b, &c]) {
            PipelineOutcome::AllFailed { failures, .. } => {
                let keys: Vec<&str> = failures.iter().map(|f| f.tool().key()).collect();
                assert_eq!(keys, vec!["A", "B", "C"]);
                assert_eq!(
                    failures[1].message(),
                    "Deobfuscator B failed with error: OS error occurred while deobfuscating: b."
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(a.inputs().len(), 1);
        assert_eq!(b.inputs().len(), 1);
        assert_eq!(c.inputs().len(), 1);
    }

    #[test]
    fn only_middle_failure_classified() {
        let a = Canned::fail("A", "something odd");
        let b = Canned::fail("B", "file is not dotnet").with_patterns(&NOT_DOTNET);
        let c = Canned::fail("C", "also odd").with_patterns(&TRUNCATED);

        match run(&[&a, &b, &c]) {
            PipelineOutcome::AllFailed { classification, .. } => {
                assert_eq!(classification, Some(FailureKind::NotADotnetFile));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn nothing_classified() {
        let a = Canned::fail("A", "x").with_patterns(&NOT_DOTNET);
        let b = Canned::fail("B", "y").with_patterns(&TRUNCATED);
        let c = Canned::fail("C", "z");

        match run(&[&a, &b, &c]) {
            PipelineOutcome::AllFailed {
                classification,
                failures,
            } => {
                assert_eq!(classification, None);
                assert_eq!(failures.len(), 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn last_classified_failure_wins() {
        let a = Canned::fail("A", "input is not dotnet").with_patterns(&NOT_DOTNET);
        let b = Canned::fail("B", "input was truncated").with_patterns(&TRUNCATED);

        match run(&[&a, &b]) {
            PipelineOutcome::AllFailed { classification, .. } => {
                assert_eq!(classification, Some(FailureKind::TruncatedContent));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        match run(&[&b, &a]) {
            PipelineOutcome::AllFailed { classification, .. } => {
                assert_eq!(classification, Some(FailureKind::NotADotnetFile));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn patterns_only_apply_to_their_own_tool() {
        // B's text would match A's pattern, but B has no patterns of its own.
        let a = Canned::fail("A", "unrelated").with_patterns(&NOT_DOTNET);
        let b = Canned::fail("B", "not dotnet");

        match run(&[&a, &b]) {
            PipelineOutcome::AllFailed { classification, .. } => {
                assert_eq!(classification, None);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_do_not_change_the_outcome() {
        let a = Canned::fail("A", "a");
        let b = Canned::ok("B", ".b");
        let registry: [&dyn ToolAdapter; 2] = [&a, &b];

        let plain = Pipeline::new(Toolchain::default(), select_from(&registry, &["A", "B"]));
        let noisy = Pipeline::new(
            Toolchain::default(),
            select_from(&registry, &["nope", "A", "missing", "B", "zzz"]),
        );

        let scratch = Path::new("/scratch/in.exe");
        match (plain.run(scratch), noisy.run(scratch)) {
            (
                PipelineOutcome::Deobfuscated {
                    artifact: left,
                    tools: left_tools,
                },
                PipelineOutcome::Deobfuscated {
                    artifact: right,
                    tools: right_tools,
                },
            ) => {
                assert_eq!(left, right);
                assert_eq!(left_tools, right_tools);
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }

    #[test]
    fn from_keys_uses_builtin_registry() {
        let pipeline = Pipeline::from_keys(Toolchain::default(), &["unscrambler", "bogus"]);
        assert_eq!(pipeline.tools().len(), 1);
        assert_eq!(pipeline.tools()[0].key(), Unscrambler::KEY);
    }
}
