use std::ops::Range;

use serde::Serialize;

use super::catalog::{Command, OpcodeCatalog};
use super::header::{ScriptHeader, SymbolTable, BLOCK_HEADER_SIZE};
use super::reader::{ensure, read_i16, read_i32, read_u16};
use crate::error::{Result, ScriptError};

/// Parameter type tags the renderer knows how to read.
pub mod tags {
    pub const JUMP_TARGET: i16 = 0x00;
    pub const CONDITION: i16 = 0x02;
    pub const TIME: i16 = 0x03;
    pub const INT: i16 = 0x05;
    pub const INT_08: i16 = 0x08;
    pub const BOOL: i16 = 0x0A;
    pub const INT_0D: i16 = 0x0D;
    pub const INT_10: i16 = 0x10;
    pub const VECTOR: i16 = 0x14;
    pub const SYMBOL_INDEX: i16 = 0x15;
    pub const INT_LIST: i16 = 0x16;
    pub const INT_19: i16 = 0x19;
}

/// Line number, unknown flag, opcode, parameter count and 4 reserved bytes.
pub const INSTRUCTION_HEADER_SIZE: usize = 12;

/// The last bytes of a block region that never hold an instruction.
pub const BLOCK_TRAILER_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub tag: i16,
    /// Offset of the payload (not the tag) in the buffer.
    pub offset: usize,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandInvocation {
    pub address: usize,
    /// Address when the file was parsed. Jump payloads keep pointing here
    /// across dialogue edits.
    pub parsed_address: usize,
    pub line_number: i16,
    pub unknown: i16,
    pub opcode: i16,
    pub command: Command,
    pub parameters: Vec<Parameter>,
}

impl CommandInvocation {
    /// The `nth` parameter carrying `tag`.
    pub fn param(&self, tag: i16, nth: usize) -> Option<&Parameter> {
        self.params_with(tag).nth(nth)
    }

    pub fn params_with(&self, tag: i16) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.tag == tag)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.command.name
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandBlock {
    /// Address of the 8-byte block table entry.
    pub address: usize,
    pub name_index: u16,
    pub name: String,
    /// As recorded in the block table. Not used for decoding.
    pub invocation_count: u16,
    /// Address of the first instruction.
    pub start_offset: u32,
    /// This block's slice of the file's invocation arena.
    pub invocations: Range<usize>,
}

/// Payload length for `tag`, whose payload starts at `offset`.
pub fn parameter_length(tag: i16, buf: &[u8], offset: usize) -> Result<usize> {
    let length: i64 = match tag {
        1 | 21 | 28 => 2,
        0 | 10 => 4,
        5 | 6 | 8 | 9 | 11 | 12 | 13 | 14 | 16 | 18 | 19 | 23 | 24 | 25 | 26 | 27 | 41 | 42 => 8,
        3 => 12,
        4 | 7 | 15 => 16,
        20 => 24,
        2 => read_i16(buf, offset)? as i64,
        17 | 22 => 8 * read_i32(buf, offset)? as i64 + 4,
        29 => read_i32(buf, offset)? as i64,
        _ => return Err(ScriptError::UnknownParameterTag { tag, offset }),
    };

    usize::try_from(length).map_err(|_| ScriptError::InvalidParameterLength { tag, offset, length })
}

/// Decode one instruction at `pos`. Returns the invocation and the position after it.
fn decode_instruction(
    buf: &[u8],
    pos: usize,
    catalog: &OpcodeCatalog,
) -> Result<(CommandInvocation, usize)> {
    let address = pos;
    let line_number = read_i16(buf, pos)?;
    let unknown = read_i16(buf, pos + 2)?;
    let opcode = read_i16(buf, pos + 4)?;
    let param_count = read_i16(buf, pos + 6)?;
    ensure(buf, pos, INSTRUCTION_HEADER_SIZE)?;

    let command = catalog.resolve(opcode, address)?;

    let mut pos = pos + INSTRUCTION_HEADER_SIZE;
    let mut parameters = Vec::with_capacity(param_count.max(0) as usize);
    for _ in 0..param_count {
        let tag = read_i16(buf, pos)?;
        pos += 2;

        let len = parameter_length(tag, buf, pos)?;
        ensure(buf, pos, len)?;
        parameters.push(Parameter {
            tag,
            offset: pos,
            payload: buf[pos..pos + len].to_vec(),
        });
        pos += len;
    }

    Ok((
        CommandInvocation {
            address,
            parsed_address: address,
            line_number,
            unknown,
            opcode,
            command,
            parameters,
        },
        pos,
    ))
}

/// Walk the block table and decode every block's instruction stream.
///
/// All invocations of the file land in one arena, in file order; each block
/// records the range of the arena it owns.
pub fn decode_blocks(
    buf: &[u8],
    header: &ScriptHeader,
    symbols: &SymbolTable,
    catalog: &OpcodeCatalog,
) -> Result<(Vec<CommandBlock>, Vec<CommandInvocation>)> {
    let table = header.block_table();
    let mut blocks = Vec::with_capacity(header.block_count as usize);
    let mut invocations = Vec::new();

    for entry in table.clone().step_by(BLOCK_HEADER_SIZE) {
        let name_index = read_u16(buf, entry)?;
        let invocation_count = read_u16(buf, entry + 2)?;
        let start_offset = read_i32(buf, entry + 4)? as u32;
        let name = symbols.get(name_index as i64)?.to_string();

        let end = if entry + BLOCK_HEADER_SIZE >= table.end {
            buf.len()
        } else {
            read_i32(buf, entry + BLOCK_HEADER_SIZE + 4)? as u32 as usize
        };

        let first = invocations.len();
        let mut pos = start_offset as usize;
        while pos + BLOCK_TRAILER_SIZE < end {
            let (invocation, next) = decode_instruction(buf, pos, catalog)?;
            if next > end {
                return Err(ScriptError::BlockOverrun { block: name, pos: next, end });
            }
            invocations.push(invocation);
            pos = next;
        }

        let decoded = invocations.len() - first;
        if decoded != invocation_count as usize {
            log::debug!(
                "block {:?} records {} invocations, decoded {}",
                name,
                invocation_count,
                decoded
            );
        }

        blocks.push(CommandBlock {
            address: entry,
            name_index,
            name,
            invocation_count,
            start_offset,
            invocations: first..invocations.len(),
        });
    }

    Ok((blocks, invocations))
}
