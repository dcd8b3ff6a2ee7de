use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use anyhow::Context;
use dotnet_deob::{job, JobConfig, JobOutcome};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, process_directory, resolve_output_path},
    output::write_report,
};

const EXIT_FAILURE: u8 = 1;
/// Exit code for inputs flagged as malformed.
const EXIT_MALFORMED: u8 = 2;

#[derive(Debug, Serialize)]
struct RunReport {
    file: String,
    outcome: &'static str,
    message: String,
    output: Option<String>,
    deobfuscated_by: Vec<String>,
    relationship: Option<BTreeMap<&'static str, String>>,
    md5: Option<String>,
    sha1: Option<String>,
    sha256: Option<String>,
    failure_name: Option<&'static str>,
    failures: Vec<String>,
    time_ms: u128,
}

pub struct RunOptions<'a> {
    pub config: JobConfig,
    pub output: Option<&'a Path>,
    pub suffix: &'a str,
    pub recursive: bool,
    pub report: Option<&'a Path>,
    pub global: &'a GlobalOptions,
}

pub fn run(path: &Path, opts: &RunOptions) -> anyhow::Result<ExitCode> {
    if opts.recursive {
        run_recursive(path, opts)
    } else {
        run_single(path, opts)
    }
}

fn run_single(path: &Path, opts: &RunOptions) -> anyhow::Result<ExitCode> {
    let output_path = resolve_output_path(path, opts.output, opts.suffix);
    let report = process_file(path, output_path, &opts.config)?;

    if let Some(report_file) = opts.report {
        write_report(&report, report_file)?;
    }

    if opts.global.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(&report);
    }

    Ok(ExitCode::from(exit_status(std::slice::from_ref(&report), 0)))
}

fn run_recursive(dir: &Path, opts: &RunOptions) -> anyhow::Result<ExitCode> {
    if let Some(out_dir) = opts.output {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output directory: {}", out_dir.display()))?;
    }

    let (reports, fail_count) = process_directory(dir, |file| {
        let output_path = resolve_output_path(file, opts.output, opts.suffix);
        let report = process_file(file, output_path, &opts.config)?;

        if !opts.global.json {
            eprintln!("{}: {} ({})", report.file, report.outcome, report.message);
        }
        Ok(report)
    })?;

    if let Some(report_file) = opts.report {
        write_report(&reports, report_file)?;
    }

    if opts.global.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let completed = reports.iter().filter(|r| r.output.is_some()).count();
        eprintln!();
        eprintln!(
            "Processed {} files: {} deobfuscated, {} without result, {} failed",
            reports.len() + fail_count,
            completed,
            reports.len() - completed,
            fail_count
        );
    }

    Ok(ExitCode::from(exit_status(&reports, fail_count)))
}

/// Run the job on `path`; on success write the child to `output_path`.
fn process_file(
    path: &Path,
    output_path: PathBuf,
    config: &JobConfig,
) -> anyhow::Result<RunReport> {
    let start = Instant::now();
    let outcome = job::execute(path, config)
        .with_context(|| format!("failed to process: {}", path.display()))?;

    let output = match &outcome {
        JobOutcome::Completed(child) => {
            std::fs::write(&output_path, &child.data)
                .with_context(|| format!("failed to write output: {}", output_path.display()))?;
            Some(output_path)
        }
        _ => None,
    };

    Ok(build_report(path, output.as_deref(), &outcome, start.elapsed().as_millis()))
}

fn build_report(
    input: &Path,
    output: Option<&Path>,
    outcome: &JobOutcome,
    time_ms: u128,
) -> RunReport {
    let child = outcome.child();
    let (failure_name, failures) = match outcome {
        JobOutcome::CompletedEmpty {
            failure_name,
            failures,
            ..
        } => (Some(*failure_name), failures.clone()),
        _ => (None, Vec::new()),
    };

    RunReport {
        file: file_display_name(input),
        outcome: outcome.label(),
        message: outcome.message(),
        output: output.map(|p| p.display().to_string()),
        deobfuscated_by: child.map(|c| c.deobfuscated_by.clone()).unwrap_or_default(),
        relationship: child.map(|c| c.relationship()),
        md5: child.map(|c| c.md5.clone()),
        sha1: child.map(|c| c.sha1.clone()),
        sha256: child.map(|c| c.sha256.clone()),
        failure_name,
        failures,
        time_ms,
    }
}

fn display_report(report: &RunReport) {
    #[allow(clippy::cast_precision_loss)]
    let time_secs = report.time_ms as f64 / 1000.0;

    match &report.output {
        Some(output) => {
            eprintln!("Deobfuscation complete: {} -> {output}", report.file);
            eprintln!("  Tools:       {}", report.deobfuscated_by.join(", "));
            if let Some(sha256) = &report.sha256 {
                eprintln!("  SHA-256:     {sha256}");
            }
        }
        None => {
            eprintln!("{}: {}", report.file, report.outcome);
            eprintln!("  Message:     {}", report.message);
            for failure in &report.failures {
                eprintln!("    - {failure}");
            }
        }
    }
    eprintln!("  Time:        {time_secs:.1}s");
}

/// 1 if any file errored, otherwise 2 if any input was flagged malformed, otherwise 0.
fn exit_status(reports: &[RunReport], failed: usize) -> u8 {
    if failed > 0 {
        EXIT_FAILURE
    } else if reports.iter().any(|r| r.outcome == "malformed") {
        EXIT_MALFORMED
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use dotnet_deob::ChildArtifact;

    use super::*;

    fn child() -> JobOutcome {
        JobOutcome::Completed(ChildArtifact {
            data: b"MZ".to_vec(),
            deobfuscated_by: vec!["unscrambler".to_string(), "de4dot-cex".to_string()],
            md5: "m".to_string(),
            sha1: "s1".to_string(),
            sha256: "s256".to_string(),
        })
    }

    #[test]
    fn completed_report() {
        let report = build_report(
            Path::new("/in/sample.exe"),
            Some(Path::new("/in/sample_deobfuscated.exe")),
            &child(),
            12,
        );

        assert_eq!(report.file, "sample.exe");
        assert_eq!(report.outcome, "completed");
        assert_eq!(report.relationship.unwrap()["deobfuscated_by"], "unscrambler,de4dot-cex");
        assert_eq!(report.sha256.as_deref(), Some("s256"));
        assert!(report.failure_name.is_none());
    }

    #[test]
    fn empty_report_carries_failures() {
        let outcome = JobOutcome::CompletedEmpty {
            failure_name: "no-deobfuscation-processed",
            message: "Could not run any of the deobfuscators.".to_string(),
            failures: vec!["Deobfuscator x failed with error: boom".to_string()],
        };
        let report = build_report(Path::new("a.dll"), None, &outcome, 0);

        assert_eq!(report.failure_name, Some("no-deobfuscation-processed"));
        assert_eq!(report.failures.len(), 1);
        assert!(report.relationship.is_none());
    }

    #[test]
    fn exit_codes() {
        let ok = build_report(Path::new("a.dll"), None, &child(), 0);
        let malformed = build_report(
            Path::new("b.dll"),
            None,
            &JobOutcome::Malformed {
                message: "short".to_string(),
            },
            0,
        );

        assert_eq!(exit_status(std::slice::from_ref(&ok), 0), 0);
        assert_eq!(exit_status(&[ok, malformed], 0), 2);
        assert_eq!(exit_status(&[], 1), 1);
    }
}
