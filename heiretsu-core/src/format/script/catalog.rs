//! The opcode catalog: opcode index to mnemonic and declared parameter types.
//!
//! The catalog is loaded once per game build and shared read-only by every
//! script parsed against it.

use std::io::Cursor;

use binrw::BinRead;
use itertools::Itertools;
use serde::Serialize;

use crate::error::{Result, ScriptError};

#[derive(BinRead)]
#[br(big)]
#[allow(dead_code)] // counts are only read by the derive
struct CatalogFile {
    count: u32,
    #[br(count = count)]
    records: Vec<CommandRecord>,
}

#[derive(BinRead)]
#[br(big)]
#[allow(dead_code)] // counts are only read by the derive
struct CommandRecord {
    index: i16,
    param_count: u16,
    name_len: i32,
    #[br(count = name_len.max(0) as usize)]
    name: Vec<u8>,
    #[br(count = param_count)]
    param_types: Vec<u16>,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub index: i16,
    pub name: String,
    /// Declared parameter type codes, in order.
    pub param_types: Vec<u16>,
}

impl Command {
    pub const DELETED_NAME: &'static str = "DELETED";

    pub fn new(index: i16, name: impl Into<String>, param_types: Vec<u16>) -> Self {
        Self {
            index,
            name: name.into(),
            param_types,
        }
    }

    /// Stand-in for invocations whose opcode index is negative.
    pub fn deleted() -> Self {
        Self::new(-1, Self::DELETED_NAME, Vec::new())
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.index < 0
    }

    #[inline]
    pub fn param_count(&self) -> usize {
        self.param_types.len()
    }

    /// e.g. `0A JUMP(0000, 0002)`
    pub fn signature(&self) -> String {
        format!(
            "{:02X} {}({})",
            self.index,
            self.name,
            self.param_types.iter().map(|t| format!("{:04X}", t)).join(", ")
        )
    }
}

impl From<CommandRecord> for Command {
    fn from(record: CommandRecord) -> Self {
        let end = record.name.iter().position(|&b| b == 0).unwrap_or(record.name.len());
        Command {
            index: record.index,
            name: String::from_utf8_lossy(&record.name[..end]).into_owned(),
            param_types: record.param_types,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpcodeCatalog {
    commands: Vec<Command>,
}

impl OpcodeCatalog {
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Parse the binary command table shipped with the game.
    ///
    /// Layout (big-endian):
    /// - u32 command count
    /// - repeated:
    ///     - i16 index
    ///     - u16 parameter count
    ///     - i32 name length (including the NUL)
    ///     - [name length] ASCII name
    ///     - [parameter count] u16 parameter type codes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let file = CatalogFile::read(&mut cur)?;
        let commands: Vec<Command> = file.records.into_iter().map(Command::from).collect();
        log::debug!("loaded {} commands into the opcode catalog", commands.len());
        Ok(Self { commands })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, opcode: usize) -> Option<&Command> {
        self.commands.get(opcode)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Resolve the opcode of the invocation at `address`.
    ///
    /// Negative opcodes are always [`Command::deleted`]. An opcode past the
    /// end of the catalog means a corrupt buffer or an incomplete catalog.
    pub fn resolve(&self, opcode: i16, address: usize) -> Result<Command> {
        if opcode < 0 {
            return Ok(Command::deleted());
        }

        self.commands
            .get(opcode as usize)
            .cloned()
            .ok_or(ScriptError::UnknownOpcode {
                index: opcode,
                address,
                catalog_len: self.commands.len(),
            })
    }
}
