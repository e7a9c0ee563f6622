use std::mem::size_of;

use heiretsu_nls::{Decoder, TextDecoder};
use serde::Serialize;

use super::reader::{read_i32, read_length_prefixed_bytes, read_length_prefixed_string, read_u16};
use crate::error::{Result, ScriptError};

/// Internal names longer than this mean the buffer is not a script file.
pub const MAX_INTERNAL_NAME_CHARS: usize = 20;

/// Size of one block table entry.
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Identity fields and the table offsets the patcher has to keep in sync.
///
/// Layout (big-endian):
/// - length-prefixed internal name
/// - length-prefixed room
/// - length-prefixed time
/// - u16 symbol count
/// - u16 block count
/// - u32 symbol table end
/// - u32 block table end
/// - [symbol count] length-prefixed symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptHeader {
    pub internal_name: String,
    pub room: String,
    pub time: String,

    pub symbol_count: u16,
    pub block_count: u16,

    /// Where the symbol table end field lives in the buffer.
    pub symbol_table_end_offset: usize,
    pub symbol_table_end: u32,

    /// Where the block table end field lives in the buffer.
    pub block_table_end_offset: usize,
    pub block_table_end: u32,
}

impl ScriptHeader {
    #[inline]
    pub fn block_table(&self) -> std::ops::Range<usize> {
        self.symbol_table_end as usize..self.block_table_end as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    /// Offset of the symbol's length prefix.
    pub offset: usize,
    pub text: String,
}

/// The ordered string table. Symbols are referenced by index, so order matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Symbol] {
        &mut self.symbols
    }

    /// Look up a symbol by a (possibly negative or oversized) index from the buffer.
    pub fn get(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .map(|s| s.text.as_str())
            .ok_or(ScriptError::SymbolOutOfRange {
                index,
                len: self.symbols.len(),
            })
    }
}

/// Parse the header and symbol table.
///
/// Returns `Ok(None)` when the buffer does not look like a script at all, so
/// batch scanners can try the same bytes against other formats.
pub fn parse_header(buf: &[u8], decoder: &Decoder) -> Result<Option<(ScriptHeader, SymbolTable)>> {
    let Some((internal_name, mut off)) = probe_internal_name(buf, decoder)? else {
        return Ok(None);
    };

    let (room, next) = read_length_prefixed_string(buf, off, decoder)?;
    off = next;
    let (time, next) = read_length_prefixed_string(buf, off, decoder)?;
    off = next;

    let symbol_count = read_u16(buf, off)?;
    off += size_of::<u16>();

    let block_count = read_u16(buf, off)?;
    off += size_of::<u16>();

    let symbol_table_end_offset = off;
    let symbol_table_end = read_i32(buf, off)? as u32;
    off += size_of::<u32>();

    let block_table_end_offset = off;
    let block_table_end = read_i32(buf, off)? as u32;
    off += size_of::<u32>();

    let mut symbols = Vec::with_capacity(symbol_count as usize);
    for _ in 0..symbol_count {
        let (text, next) = read_length_prefixed_string(buf, off, decoder)?;
        symbols.push(Symbol { offset: off, text });
        off = next;
    }

    if off != symbol_table_end as usize {
        log::warn!(
            "{}: symbol table ends at 0x{:X} but the header says 0x{:X}",
            internal_name,
            off,
            symbol_table_end
        );
    }

    let expected_block_end = symbol_table_end as usize + BLOCK_HEADER_SIZE * block_count as usize;
    if block_table_end as usize != expected_block_end {
        log::warn!(
            "{}: block table end 0x{:X} does not match {} blocks after 0x{:X}",
            internal_name,
            block_table_end,
            block_count,
            symbol_table_end
        );
    }

    log::debug!(
        "parsed script header {:?}: {} symbols, {} blocks",
        internal_name,
        symbol_count,
        block_count
    );

    Ok(Some((
        ScriptHeader {
            internal_name,
            room,
            time,
            symbol_count,
            block_count,
            symbol_table_end_offset,
            symbol_table_end,
            block_table_end_offset,
            block_table_end,
        },
        SymbolTable::new(symbols),
    )))
}

/// Read the internal name, or `None` if this cannot be a script.
///
/// A name whose declared length fits but runs past the buffer is malformed.
fn probe_internal_name(buf: &[u8], decoder: &Decoder) -> Result<Option<(String, usize)>> {
    let declared = read_i32(buf, 0)?;
    let max_len = MAX_INTERNAL_NAME_CHARS * decoder.encoding().max_char_len() + 1;
    if declared < 1 || declared as usize > max_len {
        return Ok(None);
    }

    let (raw, next) = read_length_prefixed_bytes(buf, 0)?;
    let name = decoder.decode(raw);
    if name.chars().count() > MAX_INTERNAL_NAME_CHARS {
        return Ok(None);
    }
    Ok(Some((name.into_owned(), next)))
}
