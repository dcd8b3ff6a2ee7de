use dotnet_deob::tools::AVAILABLE_TOOLS;
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ToolchainArgs},
    commands::common::toolchain,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct ToolInfo {
    key: &'static str,
    name: &'static str,
    patterns: usize,
    executable: Option<String>,
    installed: bool,
    homepage: &'static str,
}

#[derive(Debug, Serialize)]
struct ToolList {
    bin_dir: String,
    tools: Vec<ToolInfo>,
}

pub fn run(args: &ToolchainArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let toolchain = toolchain(args);

    let tools = AVAILABLE_TOOLS
        .iter()
        .map(|tool| {
            let executable = tool.executable(&toolchain);
            ToolInfo {
                key: tool.key(),
                name: tool.display_name(),
                patterns: tool.failure_patterns().len(),
                installed: executable.as_ref().is_some_and(|path| path.is_file()),
                executable: executable.map(|path| path.display().to_string()),
                homepage: tool.homepage(),
            }
        })
        .collect();

    let list = ToolList {
        bin_dir: toolchain.bin_dir().display().to_string(),
        tools,
    };

    print_output(&list, opts, |list| {
        println!("Tool directory: {}", list.bin_dir);
        println!();

        let mut table = TabWriter::new(&[
            ("KEY", Align::Left),
            ("NAME", Align::Left),
            ("PATTERNS", Align::Right),
            ("INSTALLED", Align::Left),
        ]);
        for tool in &list.tools {
            table.row(vec![
                tool.key.to_string(),
                tool.name.to_string(),
                tool.patterns.to_string(),
                if tool.installed { "yes" } else { "no" }.to_string(),
            ]);
        }
        table.print();
    })
}
