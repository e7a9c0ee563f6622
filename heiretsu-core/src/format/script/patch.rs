//! Same-slot dialogue replacement.
//!
//! An edit never moves instruction boundaries. It resizes one string in the
//! symbol table and rewrites every header field that points past it: the
//! symbol and block table ends, and the start offset of each block.

use std::ops::Range;

use heiretsu_nls::{escape_newlines, unescape_newlines, TextDecoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::header::BLOCK_HEADER_SIZE;
use super::reader::{read_i32, read_length_prefixed_bytes, write_u32};
use super::ScriptFile;
use crate::error::{Result, ScriptError};

/// Encoded bytes a script dialogue line may hold, excluding the length prefix
/// and the terminator.
pub const SCRIPT_DIALOGUE_BYTE_CAP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub dialogue_byte_cap: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            dialogue_byte_cap: SCRIPT_DIALOGUE_BYTE_CAP,
        }
    }
}

/// The new text did not fit and was cut on a character boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dialogue line {index} encodes to {full_len} bytes, truncated to the {cap} byte cap")]
pub struct LengthBudgetExceeded {
    pub index: usize,
    pub cap: usize,
    pub full_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchChange {
    /// Replace `range` with `content`. May change the buffer length.
    Splice { range: Range<usize>, content: Vec<u8> },
    /// Overwrite a big-endian u32 in place.
    WriteU32 { offset: usize, value: u32 },
}

/// Everything one dialogue edit does to the buffer, computed up front.
///
/// Changes run in order; each offset is relative to the buffer as left by the
/// changes before it, so every write after the splice is in post-splice
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    pub dialogue_index: usize,
    /// Offset of the edited string's length prefix.
    pub offset: usize,
    /// Stored bytes of the old text, terminator excluded.
    pub old_len: usize,
    /// Stored bytes of the new text, terminator excluded.
    pub new_text: Vec<u8>,
    pub length_delta: isize,
    pub changes: Vec<PatchChange>,
    pub truncation: Option<LengthBudgetExceeded>,
}

impl PatchPlan {
    /// Position `pos` of the unedited buffer after the splice.
    pub fn moved(&self, pos: usize) -> usize {
        if pos > self.offset {
            (pos as isize + self.length_delta) as usize
        } else {
            pos
        }
    }

    /// Check every change against the buffer, then apply them all.
    ///
    /// A plan that does not fit leaves `buf` untouched.
    pub fn apply(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut len = buf.len();
        for change in &self.changes {
            match change {
                PatchChange::Splice { range, content } => {
                    if range.start > range.end || range.end > len {
                        return Err(ScriptError::PatchOutOfRange { offset: range.end, len });
                    }
                    len = len - range.len() + content.len();
                }
                PatchChange::WriteU32 { offset, .. } => {
                    if offset.checked_add(4).map_or(true, |end| end > len) {
                        return Err(ScriptError::PatchOutOfRange { offset: *offset, len });
                    }
                }
            }
        }

        for change in &self.changes {
            match change {
                PatchChange::Splice { range, content } => {
                    buf.splice(range.clone(), content.iter().copied());
                }
                PatchChange::WriteU32 { offset, value } => write_u32(buf, *offset, *value)?,
            }
        }
        Ok(())
    }
}

/// What an applied edit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub index: usize,
    pub length_delta: isize,
    pub truncation: Option<LengthBudgetExceeded>,
}

impl EditOutcome {
    #[inline]
    pub fn truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

impl ScriptFile {
    /// Work out how replacing dialogue line `index` with `text` changes the
    /// buffer, without touching it.
    pub fn plan_dialogue_edit(
        &self,
        index: usize,
        text: &str,
        config: &PatchConfig,
    ) -> Result<PatchPlan> {
        let line = self.dialogue.get(index).ok_or(ScriptError::DialogueOutOfRange {
            index,
            len: self.dialogue.len(),
        })?;
        let offset = line.offset;

        if read_i32(&self.bytes, offset)? < 1 {
            return Err(ScriptError::MalformedHeader(format!(
                "dialogue line {} at 0x{:X} has no terminator",
                index, offset
            )));
        }
        let old_len = read_length_prefixed_bytes(&self.bytes, offset)?.0.len();

        let capped = self
            .decoder()
            .encode_capped(&escape_newlines(text), config.dialogue_byte_cap);
        let truncation = capped.truncated().then(|| LengthBudgetExceeded {
            index,
            cap: config.dialogue_byte_cap,
            full_len: capped.full_len,
        });
        if let Some(t) = &truncation {
            log::warn!("{}: {}", self.header.internal_name, t);
        }

        let new_text = capped.bytes;
        let length_delta = new_text.len() as isize - old_len as isize;

        let mut content = Vec::with_capacity(4 + new_text.len());
        content.extend_from_slice(&((new_text.len() + 1) as u32).to_be_bytes());
        content.extend_from_slice(&new_text);

        let mut plan = PatchPlan {
            dialogue_index: index,
            offset,
            old_len,
            new_text,
            length_delta,
            changes: vec![PatchChange::Splice {
                range: offset..offset + 4 + old_len,
                content,
            }],
            truncation,
        };

        let header = &self.header;
        let symbol_table_end = plan.moved(header.symbol_table_end as usize);
        let block_table_end = symbol_table_end + BLOCK_HEADER_SIZE * header.block_count as usize;
        let mut writes = vec![
            PatchChange::WriteU32 {
                offset: plan.moved(header.symbol_table_end_offset),
                value: symbol_table_end as u32,
            },
            PatchChange::WriteU32 {
                offset: plan.moved(header.block_table_end_offset),
                value: block_table_end as u32,
            },
        ];
        for block in &self.blocks {
            writes.push(PatchChange::WriteU32 {
                offset: plan.moved(block.address) + 4,
                value: plan.moved(block.start_offset as usize) as u32,
            });
        }
        plan.changes.extend(writes);

        Ok(plan)
    }

    /// Replace dialogue line `index` and repair every offset behind it.
    ///
    /// Text over the cap is truncated rather than rejected; the returned
    /// outcome says so. Writing back the current text leaves the buffer as is.
    pub fn edit_dialogue(
        &mut self,
        index: usize,
        text: &str,
        config: &PatchConfig,
    ) -> Result<EditOutcome> {
        let line = self.dialogue.get(index).ok_or(ScriptError::DialogueOutOfRange {
            index,
            len: self.dialogue.len(),
        })?;
        if line.text == text {
            return Ok(EditOutcome {
                index,
                length_delta: 0,
                truncation: None,
            });
        }

        let plan = self.plan_dialogue_edit(index, text, config)?;
        plan.apply(&mut self.bytes)?;
        self.rebase(&plan);

        log::debug!(
            "{}: dialogue line {} now {} bytes ({:+})",
            self.header.internal_name,
            index,
            plan.new_text.len(),
            plan.length_delta
        );

        Ok(EditOutcome {
            index,
            length_delta: plan.length_delta,
            truncation: plan.truncation,
        })
    }

    /// Bring the structured view in line with an applied plan.
    fn rebase(&mut self, plan: &PatchPlan) {
        let stored = self.decoder().decode(&plan.new_text).into_owned();

        let header = &mut self.header;
        header.symbol_table_end = plan.moved(header.symbol_table_end as usize) as u32;
        header.block_table_end =
            header.symbol_table_end + (BLOCK_HEADER_SIZE * header.block_count as usize) as u32;

        for symbol in self.symbols.as_mut_slice() {
            if symbol.offset == plan.offset {
                symbol.text = stored.clone();
            }
            symbol.offset = plan.moved(symbol.offset);
        }

        for block in &mut self.blocks {
            block.address = plan.moved(block.address);
            block.start_offset = plan.moved(block.start_offset as usize) as u32;
        }

        for invocation in &mut self.invocations {
            invocation.address = plan.moved(invocation.address);
            for param in &mut invocation.parameters {
                param.offset = plan.moved(param.offset);
            }
        }

        for line in &mut self.dialogue {
            if line.offset == plan.offset {
                line.text = unescape_newlines(&stored);
            }
            line.offset = plan.moved(line.offset);
        }
    }
}
