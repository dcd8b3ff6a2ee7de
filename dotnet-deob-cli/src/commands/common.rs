use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use dotnet_deob::{JobConfig, Toolchain};

use crate::app::ToolchainArgs;

/// `bin/` next to the running executable, or `./bin` if that cannot be determined.
pub fn default_bin_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("bin")))
        .unwrap_or_else(|| PathBuf::from("bin"))
}

pub fn toolchain(args: &ToolchainArgs) -> Toolchain {
    let bin_dir = args.bin_dir.clone().unwrap_or_else(default_bin_dir);
    Toolchain::new(bin_dir)
        .with_mono(&args.mono)
        .with_dotnet(&args.dotnet)
        .with_timeout(Duration::from_secs(args.timeout))
}

pub fn job_config(args: &ToolchainArgs, tools: &[String], max_size: Option<u64>) -> JobConfig {
    JobConfig {
        tools: tools.to_vec(),
        toolchain: toolchain(args),
        max_content_size: max_size,
    }
}

/// Run `process` on every assembly below `dir`.
///
/// Files that fail are reported on stderr and counted; the others' results are collected.
pub fn process_directory<T>(
    dir: &Path,
    mut process: impl FnMut(&Path) -> anyhow::Result<T>,
) -> anyhow::Result<(Vec<T>, usize)> {
    let files = collect_assemblies(dir)?;
    if files.is_empty() {
        anyhow::bail!("no .exe or .dll files found in {}", dir.display());
    }

    let mut results = Vec::with_capacity(files.len());
    let mut failed = 0;
    for file in &files {
        match process(file) {
            Ok(result) => results.push(result),
            Err(e) => {
                eprintln!("{}: {e:#}", file_display_name(file));
                failed += 1;
            }
        }
    }
    Ok((results, failed))
}

/// Collect all `.exe` and `.dll` files recursively from a directory.
pub fn collect_assemblies(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_assemblies_recursive(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_assemblies_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_assemblies_recursive(&path, files)?;
        } else if is_assembly_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Returns true if the path has an `.exe` or `.dll` extension.
pub fn is_assembly_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("exe" | "dll")
    )
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

/// `<stem><suffix>.<ext>` for `input`.
pub fn suffixed_filename(input: &Path, suffix: &str) -> String {
    let stem = input
        .file_stem()
        .map_or("output", |s| s.to_str().unwrap_or("output"));
    let ext = input.extension().map_or("", |e| e.to_str().unwrap_or(""));

    if ext.is_empty() {
        format!("{stem}{suffix}")
    } else {
        format!("{stem}{suffix}.{ext}")
    }
}

/// Where to write the child of `input`.
///
/// An explicit `output` wins; if it is a directory the suffixed name goes inside it. Without
/// `output`, the child lands next to the input.
pub fn resolve_output_path(input: &Path, output: Option<&Path>, suffix: &str) -> PathBuf {
    let name = suffixed_filename(input, suffix);
    match output {
        Some(out) if out.is_dir() => out.join(name),
        Some(out) => out.to_path_buf(),
        None => input.parent().unwrap_or(Path::new(".")).join(name),
    }
}
