use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use heiretsu_core::format::script::dialogue::DialogueLine;
use heiretsu_core::{Encoding, OpcodeCatalog, RenderMode, ScriptFile};

const SCRIPT_FILE: &str = "script.bin";
const CATALOG_FILE: &str = "catalog.bin";
const LISTING_FILE: &str = "script.yaml";
const DIALOGUE_FILE: &str = "dialogue.yaml";

#[derive(Debug, Serialize, Deserialize)]
pub struct Block {
    address: u32,
    name: String,
    start_offset: u32,
    invocations: Vec<Invocation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Invocation {
    address: u32,
    line: i16,
    mnemonic: String,
    text: String,
}

/// One editable line. `key` starts with the 4-digit dialogue index.
#[derive(Debug, Serialize, Deserialize)]
pub struct DialogueEntry {
    key: String,
    speaker: String,
    text: String,
}

impl DialogueEntry {
    fn from_line(index: usize, line: &DialogueLine) -> Self {
        Self {
            key: format!("{:04}_{}", index, line.speaker.code()),
            speaker: format!("{:?}", line.speaker),
            text: line.text.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScriptProject {
    name: String,
    encoding: Encoding,
    script_file: PathBuf,
    catalog_file: PathBuf,
    listing_file: PathBuf,
    dialogue_file: PathBuf,
}

pub struct Disassembler {
    script: ScriptFile,
    catalog_bytes: Vec<u8>,
}

impl Disassembler {
    pub fn new(
        input: impl AsRef<Path>,
        catalog: impl AsRef<Path>,
        encoding: Encoding,
    ) -> Result<Self> {
        let input = input.as_ref();
        let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let catalog_bytes = std::fs::read(catalog.as_ref())
            .with_context(|| format!("reading {}", catalog.as_ref().display()))?;
        let commands = OpcodeCatalog::parse(&catalog_bytes)?;

        let script = ScriptFile::parse(bytes, &commands, encoding)?
            .with_context(|| format!("{} is not a script file", input.display()))?;
        log::info!("loaded {}", script.describe());

        Ok(Self { script, catalog_bytes })
    }

    pub fn listing(&self) -> Result<Vec<Block>> {
        let renderer = self.script.renderer(RenderMode::Semantic);
        let mut blocks = Vec::with_capacity(self.script.blocks().len());
        for block in self.script.blocks() {
            let mut invocations = Vec::new();
            for inv in self.script.block_invocations(block) {
                invocations.push(Invocation {
                    address: inv.address as u32,
                    line: inv.line_number,
                    mnemonic: inv.name().to_string(),
                    text: renderer.render_invocation(inv)?,
                });
            }
            blocks.push(Block {
                address: block.address as u32,
                name: block.name.clone(),
                start_offset: block.start_offset,
                invocations,
            });
        }
        Ok(blocks)
    }

    pub fn dialogue(&self) -> Vec<DialogueEntry> {
        self.script
            .dialogue()
            .iter()
            .enumerate()
            .map(|(i, line)| DialogueEntry::from_line(i, line))
            .collect()
    }

    pub fn write_project(&self, path: impl AsRef<Path>) -> Result<()> {
        let output = path.as_ref();
        if !output.exists() {
            std::fs::create_dir_all(output)?;
        }

        std::fs::write(output.join(SCRIPT_FILE), self.script.raw())?;
        std::fs::write(output.join(CATALOG_FILE), &self.catalog_bytes)?;

        let mut writer = std::fs::File::create(output.join(LISTING_FILE))?;
        serde_yaml::to_writer(&mut writer, &self.listing()?)?;

        let dialogue = self.dialogue();
        let mut writer = std::fs::File::create(output.join(DIALOGUE_FILE))?;
        serde_yaml::to_writer(&mut writer, &dialogue)?;

        let project = ScriptProject {
            name: self.script.internal_name().to_string(),
            encoding: self.script.encoding(),
            script_file: PathBuf::from(SCRIPT_FILE),
            catalog_file: PathBuf::from(CATALOG_FILE),
            listing_file: PathBuf::from(LISTING_FILE),
            dialogue_file: PathBuf::from(DIALOGUE_FILE),
        };

        let mut writer = std::fs::File::create(output.join("project.toml"))?;
        let serialized_string = toml::to_string_pretty(&project)?;
        writer.write_all(serialized_string.as_bytes())?;

        log::info!(
            "wrote {} blocks and {} dialogue lines to {}",
            self.script.blocks().len(),
            dialogue.len(),
            output.display()
        );
        Ok(())
    }
}

#[derive(ClapParser, Debug)]
#[command(version, about = "Export a script file as an editable project")]
struct Args {
    #[arg(short, long, required = true)]
    input: PathBuf,

    #[arg(short, long, required = true)]
    catalog: PathBuf,

    #[arg(short, long, required = true)]
    output: PathBuf,

    #[arg(short, long, default_value = "sjis")]
    lang: Encoding,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let disassembler = Disassembler::new(args.input, args.catalog, args.lang)?;
    disassembler.write_project(args.output)?;

    Ok(())
}
