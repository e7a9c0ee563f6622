//! Spoken lines inside a script's symbol table.
//!
//! Script files keep dialogue as ordinary symbols. A line is recognised by
//! the voice-file id stored right after it.

use std::str::FromStr;

use heiretsu_nls::unescape_newlines;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use super::header::SymbolTable;
use super::patch::{EditOutcome, PatchConfig};
use super::ScriptFile;
use crate::error::{Result, ScriptError};

lazy_static::lazy_static! {
    static ref VOICE_ID: Regex =
        Regex::new(r"^(?P<prefix>[A-Za-z0-9]+)_(?P<character>[A-Z][A-Z0-9]{2})(?P<number>\d{2,4})$").unwrap();
    static ref SHORT_CODE: Regex = Regex::new(r"^(\w\d{1,2})+$").unwrap();
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    #[strum(serialize = "ANN")]
    Announcement,
    #[strum(serialize = "CAP")]
    Captain,
    #[strum(serialize = "CRF")]
    CrewF,
    #[strum(serialize = "CRM")]
    CrewM,
    #[strum(serialize = "GF1")]
    GuestF1,
    #[strum(serialize = "GF2")]
    GuestF2,
    #[strum(serialize = "GF3")]
    GuestF3,
    #[strum(serialize = "GM1")]
    GuestM1,
    #[strum(serialize = "GM2")]
    GuestM2,
    #[strum(serialize = "GM3")]
    GuestM3,
    #[strum(serialize = "HRH")]
    Haruhi,
    #[strum(serialize = "KZM")]
    Koizumi,
    #[strum(serialize = "KUN")]
    Kunikida,
    #[strum(serialize = "KYN")]
    Kyon,
    #[strum(serialize = "KY2")]
    Kyon2,
    #[strum(serialize = "MKT")]
    Mikoto,
    #[strum(serialize = "MKR")]
    Mikuru,
    #[strum(serialize = "MNL")]
    Monologue,
    #[strum(serialize = "NGT")]
    Nagato,
    #[strum(serialize = "NG2")]
    Nagato2,
    #[strum(serialize = "SIS")]
    KyonSis,
    #[strum(serialize = "TAI")]
    Taiichiro,
    #[strum(serialize = "TAN")]
    Taniguchi,
    #[strum(serialize = "TRY")]
    Tsuruya,
    #[strum(disabled)]
    Unknown,
}

impl Speaker {
    /// Map the 3-letter character code of a voice id.
    pub fn from_code(code: &str) -> Self {
        Speaker::from_str(code).unwrap_or(Speaker::Unknown)
    }

    pub fn code(self) -> &'static str {
        match self {
            Speaker::Unknown => "UNK",
            known => known.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueLine {
    /// With real newlines.
    pub text: String,
    pub speaker: Speaker,
    /// Offset of the line's length prefix in the buffer.
    pub offset: usize,
    pub symbol_index: usize,
    /// The voice-file id that marked this symbol as dialogue.
    pub metadata: String,
}

pub fn is_voice_id(text: &str) -> bool {
    VOICE_ID.is_match(text)
}

/// Find every spoken line in `symbols`, ordered by offset.
pub fn extract_dialogue(symbols: &SymbolTable) -> Vec<DialogueLine> {
    let table = symbols.as_slice();
    let mut taken = vec![false; table.len()];
    let mut lines = Vec::new();

    for (i, voice) in table.iter().enumerate() {
        let Some(caps) = VOICE_ID.captures(&voice.text) else {
            continue;
        };

        // closest preceding symbol that is not itself a voice id
        let Some(mut target) = (0..i).rev().find(|&j| !VOICE_ID.is_match(&table[j].text)) else {
            continue;
        };
        if SHORT_CODE.is_match(&table[target].text) && target > 0 {
            let before = &table[target - 1].text;
            // a short code right after another voice id belongs to that line
            if VOICE_ID.is_match(before) {
                continue;
            }
            if !SHORT_CODE.is_match(before) {
                target -= 1;
            }
        }

        if taken[target] {
            continue;
        }
        taken[target] = true;

        let sym = &table[target];
        lines.push(DialogueLine {
            text: unescape_newlines(&sym.text),
            speaker: Speaker::from_code(&caps["character"]),
            offset: sym.offset,
            symbol_index: target,
            metadata: voice.text.clone(),
        });
    }

    lines.sort_by_key(|l| l.offset);
    log::debug!("found {} dialogue lines in {} symbols", lines.len(), table.len());
    lines
}

/// The dialogue index encoded in the first four characters of an import key,
/// e.g. `0012_KYN` is line 12.
pub fn parse_import_key(key: &str) -> Result<usize> {
    let invalid = || ScriptError::InvalidImportKey { key: key.to_string() };
    let digits = key.get(..4).ok_or_else(invalid)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

/// Apply `(key, text)` pairs from a translation resource, in any order.
pub fn import_dialogue<K, V, I>(
    script: &mut ScriptFile,
    entries: I,
    config: &PatchConfig,
) -> Result<Vec<EditOutcome>>
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut outcomes = Vec::new();
    for (key, text) in entries {
        let index = parse_import_key(key.as_ref())?;
        outcomes.push(script.edit_dialogue(index, text.as_ref(), config)?);
    }
    Ok(outcomes)
}
