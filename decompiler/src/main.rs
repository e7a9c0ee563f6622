use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use heiretsu_core::{Encoding, OpcodeCatalog, RenderMode, ScriptFile};

#[derive(Parser, Debug)]
#[command(version, about = "Render a script file as pseudocode")]
struct Args {
    #[arg(short, long, required = true)]
    input: PathBuf,

    #[arg(short, long, required = true)]
    catalog: PathBuf,

    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Print every parameter as hex instead of applying command rules.
    #[arg(long)]
    raw: bool,

    #[arg(short, long, default_value = "sjis")]
    lang: Encoding,
}

fn decompile(input: &Path, catalog: &Path, encoding: Encoding, mode: RenderMode) -> Result<String> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let catalog = std::fs::read(catalog).with_context(|| format!("reading {}", catalog.display()))?;
    let catalog = OpcodeCatalog::parse(&catalog)?;

    let script = ScriptFile::parse(bytes, &catalog, encoding)?
        .with_context(|| format!("{} is not a script file", input.display()))?;
    log::info!("decompiling {}", script.describe());

    Ok(script.decompile(mode)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mode = if args.raw { RenderMode::Raw } else { RenderMode::Semantic };
    let text = decompile(&args.input, &args.catalog, args.lang, mode)?;

    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, text)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heiretsu_core::test_util::{
        catalog_bytes, op, test_commands, InstructionSpec, ScriptBuilder,
    };

    #[test]
    fn test_decompile_file() -> Result<()> {
        let dir = std::env::temp_dir().join("heiretsu-decompiler-test");
        std::fs::create_dir_all(&dir)?;

        let script = ScriptBuilder::new("S01A", "BUNGEI", "AM")
            .symbols(&["MAIN"])
            .block(0, vec![InstructionSpec::new(2, op::NOP)])
            .build();
        std::fs::write(dir.join("in.bin"), script)?;
        std::fs::write(dir.join("cat.bin"), catalog_bytes(&test_commands()))?;

        let text = decompile(
            &dir.join("in.bin"),
            &dir.join("cat.bin"),
            Encoding::ShiftJis,
            RenderMode::Semantic,
        )?;
        assert_eq!(text, "== MAIN ==\nNOP()\n");
        Ok(())
    }

    #[test]
    fn test_not_a_script() -> Result<()> {
        let dir = std::env::temp_dir().join("heiretsu-decompiler-probe");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("in.bin"), [0xFF; 8])?;
        std::fs::write(dir.join("cat.bin"), catalog_bytes(&test_commands()))?;

        let result = decompile(
            &dir.join("in.bin"),
            &dir.join("cat.bin"),
            Encoding::ShiftJis,
            RenderMode::Raw,
        );
        assert!(result.is_err());
        Ok(())
    }
}
