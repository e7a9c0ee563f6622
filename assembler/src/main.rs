use anyhow::{Context, Result};
use clap::Parser;
use heiretsu_core::format::script::dialogue::import_dialogue;
use heiretsu_core::{Encoding, OpcodeCatalog, PatchConfig, ScriptFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
pub struct ScriptProject {
    name: String,
    encoding: Encoding,
    script_file: PathBuf,
    catalog_file: PathBuf,
    listing_file: PathBuf,
    dialogue_file: PathBuf,
}

impl ScriptProject {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let config_file = PathBuf::from(path.as_ref());
        let config_str = std::fs::read_to_string(config_file)?;
        let config: ScriptProject = toml::from_str(&config_str)?;
        Ok(config)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DialogueEntry {
    key: String,
    #[serde(default)]
    speaker: String,
    text: String,
}

pub fn load_dialogue(path: impl AsRef<Path>) -> Result<Vec<DialogueEntry>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let entries: Vec<DialogueEntry> = serde_yaml::from_str(&content)?;
    Ok(entries)
}

/// Rebuild a script from a project directory, writing every dialogue entry
/// back into the script bytes.
pub fn compile(
    project_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &PatchConfig,
) -> Result<()> {
    let project_dir = project_dir.as_ref();
    let project = ScriptProject::new(project_dir.join("project.toml"))?;

    let bytes = std::fs::read(project_dir.join(&project.script_file))?;
    let catalog = OpcodeCatalog::parse(&std::fs::read(project_dir.join(&project.catalog_file))?)?;
    let mut script = ScriptFile::parse(bytes, &catalog, project.encoding)?
        .with_context(|| format!("{} is not a script file", project.script_file.display()))?;

    let entries = load_dialogue(project_dir.join(&project.dialogue_file))?;
    let outcomes = import_dialogue(
        &mut script,
        entries.iter().map(|e| (e.key.as_str(), e.text.as_str())),
        config,
    )?;

    for truncation in outcomes.iter().filter_map(|o| o.truncation.as_ref()) {
        log::warn!("{}", truncation);
    }
    let delta: isize = outcomes.iter().map(|o| o.length_delta).sum();
    log::info!(
        "{}: applied {} lines, size changed by {} bytes",
        project.name,
        outcomes.len(),
        delta
    );

    let output = output.as_ref();
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, script.into_bytes())?;

    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "Write edited dialogue back into a script file")]
struct Args {
    #[clap(short, long)]
    project_dir: PathBuf,

    #[clap(short, long)]
    output: PathBuf,

    /// Maximum encoded length of one dialogue line.
    #[clap(long, default_value_t = heiretsu_core::format::script::SCRIPT_DIALOGUE_BYTE_CAP)]
    cap: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let config = PatchConfig {
        dialogue_byte_cap: args.cap,
    };
    if let Err(e) = compile(args.project_dir, args.output, &config) {
        log::error!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heiretsu_core::format::script::decode::tags;
    use heiretsu_core::test_util::{
        catalog_bytes, op, parse, test_commands, word, InstructionSpec, ScriptBuilder,
    };

    fn write_project(dir: &Path, dialogue: &str) -> Result<()> {
        let script = ScriptBuilder::new("S01A", "BUNGEI", "AM")
            .symbols(&["MAIN", "Hello.", "V01_KYN0001", "Bye.\nSee you.", "V01_HRH0002"])
            .block(0, vec![InstructionSpec::new(2, op::MW).param(tags::BOOL, word(1))])
            .build();
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join("script.bin"), script)?;
        std::fs::write(dir.join("catalog.bin"), catalog_bytes(&test_commands()))?;
        std::fs::write(dir.join("dialogue.yaml"), dialogue)?;

        let project = ScriptProject {
            name: "S01A".into(),
            encoding: Encoding::ShiftJis,
            script_file: "script.bin".into(),
            catalog_file: "catalog.bin".into(),
            listing_file: "script.yaml".into(),
            dialogue_file: "dialogue.yaml".into(),
        };
        std::fs::write(dir.join("project.toml"), toml::to_string_pretty(&project)?)?;
        Ok(())
    }

    #[test]
    fn test_compile() -> Result<()> {
        let dir = std::env::temp_dir().join("heiretsu-assembler-test");
        let _ = std::fs::remove_dir_all(&dir);
        write_project(
            &dir,
            "- key: 0001_HRH\n  text: See you tomorrow.\n- key: 0000_KYN\n  text: Hi.\n",
        )?;

        let output = dir.join("out/S01A.bin");
        compile(&dir, &output, &PatchConfig::default())?;

        let script = parse(std::fs::read(output)?);
        let texts: Vec<&str> = script.dialogue().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi.", "See you tomorrow."]);
        Ok(())
    }

    #[test]
    fn test_unedited_project_round_trips() -> Result<()> {
        let dir = std::env::temp_dir().join("heiretsu-assembler-round-trip");
        let _ = std::fs::remove_dir_all(&dir);
        write_project(&dir, "[]\n")?;

        let original = std::fs::read(dir.join("script.bin"))?;
        let entries: Vec<DialogueEntry> = parse(original.clone())
            .dialogue()
            .iter()
            .enumerate()
            .map(|(i, line)| DialogueEntry {
                key: format!("{:04}_{}", i, line.speaker.code()),
                speaker: format!("{:?}", line.speaker),
                text: line.text.clone(),
            })
            .collect();
        assert_eq!(entries.len(), 2);
        std::fs::write(dir.join("dialogue.yaml"), serde_yaml::to_string(&entries)?)?;

        let output = dir.join("out.bin");
        compile(&dir, &output, &PatchConfig::default())?;
        assert_eq!(std::fs::read(output)?, original);
        Ok(())
    }

    #[test]
    fn test_bad_key() -> Result<()> {
        let dir = std::env::temp_dir().join("heiretsu-assembler-bad-key");
        let _ = std::fs::remove_dir_all(&dir);
        write_project(&dir, "- key: hello\n  text: nope\n")?;

        assert!(compile(&dir, dir.join("out.bin"), &PatchConfig::default()).is_err());
        Ok(())
    }
}
