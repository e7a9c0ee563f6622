//! Script files: a header, a symbol table, a block table and the bytecode of
//! each block, all big-endian.
//!
//! [`ScriptFile`] keeps the raw bytes as the source of truth; everything else
//! is a parsed view onto ranges of them, kept in sync by dialogue edits.

pub mod catalog;
pub mod decode;
pub mod dialogue;
pub mod header;
pub mod list;
pub mod operand;
pub mod patch;
pub mod reader;
pub mod render;

use heiretsu_nls::{Decoder, Encoding};

use self::catalog::OpcodeCatalog;
use self::decode::{decode_blocks, CommandBlock, CommandInvocation};
use self::dialogue::{extract_dialogue, DialogueLine};
use self::header::{parse_header, ScriptHeader, SymbolTable};
use self::render::{RenderMode, Renderer};
use crate::error::Result;

pub use self::catalog::Command;
pub use self::patch::{
    EditOutcome, LengthBudgetExceeded, PatchConfig, PatchPlan, SCRIPT_DIALOGUE_BYTE_CAP,
};

#[derive(Debug, Clone)]
pub struct ScriptFile {
    bytes: Vec<u8>,
    encoding: Encoding,
    header: ScriptHeader,
    symbols: SymbolTable,
    blocks: Vec<CommandBlock>,
    /// Every invocation in the file, in file order. Blocks index into it.
    invocations: Vec<CommandInvocation>,
    dialogue: Vec<DialogueLine>,
}

impl ScriptFile {
    /// Parse a script buffer.
    ///
    /// `Ok(None)` means the bytes are not a script file; malformed scripts
    /// are errors.
    pub fn parse(
        bytes: Vec<u8>,
        catalog: &OpcodeCatalog,
        encoding: Encoding,
    ) -> Result<Option<Self>> {
        let decoder = Decoder::new(encoding);
        let Some((header, symbols)) = parse_header(&bytes, &decoder)? else {
            return Ok(None);
        };

        let (blocks, invocations) = decode_blocks(&bytes, &header, &symbols, catalog)?;
        let dialogue = extract_dialogue(&symbols);

        log::debug!(
            "{}: {} blocks, {} invocations, {} dialogue lines",
            header.internal_name,
            blocks.len(),
            invocations.len(),
            dialogue.len()
        );

        Ok(Some(Self {
            bytes,
            encoding,
            header,
            symbols,
            blocks,
            invocations,
            dialogue,
        }))
    }

    #[inline]
    pub fn decoder(&self) -> Decoder {
        Decoder::new(self.encoding)
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn header(&self) -> &ScriptHeader {
        &self.header
    }

    pub fn internal_name(&self) -> &str {
        &self.header.internal_name
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn blocks(&self) -> &[CommandBlock] {
        &self.blocks
    }

    pub fn invocations(&self) -> &[CommandInvocation] {
        &self.invocations
    }

    pub fn block_invocations(&self, block: &CommandBlock) -> &[CommandInvocation] {
        &self.invocations[block.invocations.clone()]
    }

    pub fn invocation_at(&self, address: usize) -> Option<&CommandInvocation> {
        self.invocations.iter().find(|i| i.address == address)
    }

    pub fn dialogue(&self) -> &[DialogueLine] {
        &self.dialogue
    }

    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `S01A (BUNGEI, AM)`
    pub fn describe(&self) -> String {
        format!("{} ({}, {})", self.header.internal_name, self.header.room, self.header.time)
    }

    pub fn renderer(&self, mode: RenderMode) -> Renderer<'_> {
        Renderer::new(&self.symbols, &self.invocations, mode)
    }

    /// The whole file as pseudocode, one block after another.
    pub fn decompile(&self, mode: RenderMode) -> Result<String> {
        self.renderer(mode).render_blocks(&self.blocks)
    }
}
