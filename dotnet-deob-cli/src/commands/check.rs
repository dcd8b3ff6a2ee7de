use std::path::Path;

use anyhow::Context;
use dotnet_deob::File;
use serde::Serialize;

use crate::{app::GlobalOptions, commands::common::file_display_name, output::print_output};

#[derive(Debug, Serialize)]
struct CheckInfo {
    file: String,
    size: usize,
    format: &'static str,
    dotnet: bool,
    clr_rva: Option<u32>,
    clr_size: Option<u32>,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let file = File::from_file(path)
        .with_context(|| format!("failed to parse PE container: {}", path.display()))?;

    let info = CheckInfo {
        file: file_display_name(path),
        size: file.len(),
        format: if file.is_pe64() { "PE32+" } else { "PE32" },
        dotnet: file.is_dotnet(),
        clr_rva: file.clr().map(|(rva, _)| rva),
        clr_size: file.clr().map(|(_, size)| size),
    };

    print_output(&info, opts, |info| {
        println!("File:        {}", info.file);
        println!("Size:        {} bytes", info.size);
        println!("Format:      {}", info.format);
        match (info.clr_rva, info.clr_size) {
            (Some(rva), Some(size)) => {
                println!(".NET:        yes (CLR header at RVA 0x{rva:08X}, {size} bytes)");
            }
            _ => println!(".NET:        no"),
        }
    })
}
