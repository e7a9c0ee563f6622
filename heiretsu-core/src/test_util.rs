//! Builders for well-formed synthetic script files.
//!
//! The builders panic on inconsistent input (a jump to an instruction that
//! does not exist, more than `u16::MAX` symbols); they are for tests only.

use heiretsu_nls::{Decoder, Encoding};

use crate::format::script::catalog::{Command, OpcodeCatalog};
use crate::format::script::decode::{tags, BLOCK_TRAILER_SIZE, INSTRUCTION_HEADER_SIZE};
use crate::format::script::header::BLOCK_HEADER_SIZE;
use crate::format::script::reader::length_prefixed;
use crate::format::script::ScriptFile;

/// Opcodes of [`test_catalog`].
pub mod op {
    pub const NOP: i16 = 0;
    pub const JUMP: i16 = 1;
    pub const WAIT: i16 = 2;
    pub const SET: i16 = 3;
    pub const LOG: i16 = 4;
    pub const MW: i16 = 5;
    pub const SCENE_SET: i16 = 6;
    pub const EV_MODE: i16 = 7;
    pub const TOPIC_GET: i16 = 8;
    pub const FI: i16 = 9;
    pub const EV_START: i16 = 10;
    pub const APPEAR: i16 = 11;
    pub const TURN: i16 = 12;
    pub const MSG: i16 = 13;
}

const TEST_COMMANDS: &[(&str, &[u16])] = &[
    ("NOP", &[]),
    ("JUMP", &[0x00, 0x02]),
    ("WAIT", &[0x03]),
    ("SET", &[0x05, 0x05]),
    ("LOG", &[0x0A]),
    ("MW", &[0x0A]),
    ("SCENE_SET", &[0x05, 0x05]),
    ("EV_MODE", &[0x0A, 0x19]),
    ("TOPIC_GET", &[0x15, 0x0A, 0x19, 0x05]),
    ("FI", &[0x03, 0x19]),
    ("EV_START", &[0x05, 0x16, 0x05]),
    ("APPEAR", &[0x0A]),
    ("TURN", &[0x08, 0x0D, 0x14, 0x10, 0x05]),
    ("MSG", &[0x15, 0x05]),
];

pub fn test_commands() -> Vec<Command> {
    TEST_COMMANDS
        .iter()
        .enumerate()
        .map(|(i, (name, types))| Command::new(i as i16, *name, types.to_vec()))
        .collect()
}

/// A catalog covering every command with a semantic rule, plus `MSG`.
pub fn test_catalog() -> OpcodeCatalog {
    OpcodeCatalog::from_commands(test_commands())
}

/// Serialize commands into the binary catalog layout.
pub fn catalog_bytes(commands: &[Command]) -> Vec<u8> {
    let mut out = (commands.len() as u32).to_be_bytes().to_vec();
    for c in commands {
        out.extend_from_slice(&c.index.to_be_bytes());
        out.extend_from_slice(&(c.param_types.len() as u16).to_be_bytes());
        out.extend_from_slice(&((c.name.len() + 1) as i32).to_be_bytes());
        out.extend_from_slice(c.name.as_bytes());
        out.push(0);
        for t in &c.param_types {
            out.extend_from_slice(&t.to_be_bytes());
        }
    }
    out
}

/// Parse with [`test_catalog`] as Shift-JIS, panicking on anything but a script.
pub fn parse(bytes: Vec<u8>) -> ScriptFile {
    match ScriptFile::parse(bytes, &test_catalog(), Encoding::ShiftJis) {
        Ok(Some(script)) => script,
        Ok(None) => panic!("not a script file"),
        Err(e) => panic!("failed to parse script: {}", e),
    }
}

pub fn word(value: i32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn words(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// A (control, value) operand.
pub fn pair(control: i32, value: i32) -> Vec<u8> {
    words(&[control, value])
}

/// One term of a condition parameter.
#[derive(Debug, Clone, Copy)]
pub struct Term {
    pub comparator: u8,
    pub combinator: u8,
    pub left: (i32, i32),
    pub right: (i32, i32),
}

impl Term {
    pub fn new(comparator: u8, combinator: u8, left: (i32, i32), right: (i32, i32)) -> Self {
        Self {
            comparator,
            combinator,
            left,
            right,
        }
    }
}

/// A tag-2 condition payload, its own length included.
pub fn condition(terms: &[Term]) -> Vec<u8> {
    let len = 4 + terms.len() * 18;
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&(len as i16).to_be_bytes());
    out.extend_from_slice(&(terms.len() as i16).to_be_bytes());
    for t in terms {
        out.push(t.comparator);
        out.push(t.combinator);
        out.extend(pair(t.left.0, t.left.1));
        out.extend(pair(t.right.0, t.right.1));
    }
    out
}

#[derive(Debug, Clone)]
enum ParamSpec {
    Raw(i16, Vec<u8>),
    /// A jump target, filled in with the address of another instruction.
    JumpTo { block: usize, instruction: usize },
}

impl ParamSpec {
    fn payload_len(&self) -> usize {
        match self {
            ParamSpec::Raw(_, payload) => payload.len(),
            ParamSpec::JumpTo { .. } => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstructionSpec {
    line: i16,
    unknown: i16,
    opcode: i16,
    params: Vec<ParamSpec>,
}

impl InstructionSpec {
    pub fn new(line: i16, opcode: i16) -> Self {
        Self {
            line,
            unknown: -1,
            opcode,
            params: Vec::new(),
        }
    }

    pub fn unknown(mut self, unknown: i16) -> Self {
        self.unknown = unknown;
        self
    }

    pub fn param(mut self, tag: i16, payload: Vec<u8>) -> Self {
        self.params.push(ParamSpec::Raw(tag, payload));
        self
    }

    /// A jump-target parameter pointing at instruction `instruction` of block `block`.
    pub fn jump_to(mut self, block: usize, instruction: usize) -> Self {
        self.params.push(ParamSpec::JumpTo { block, instruction });
        self
    }

    fn size(&self) -> usize {
        INSTRUCTION_HEADER_SIZE + self.params.iter().map(|p| 2 + p.payload_len()).sum::<usize>()
    }
}

#[derive(Debug, Clone)]
struct BlockSpec {
    name_index: u16,
    instructions: Vec<InstructionSpec>,
}

/// Assembles a script buffer: header, symbols, block table, then each
/// block's instructions followed by an 8-byte zero trailer.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    name: String,
    room: String,
    time: String,
    symbols: Vec<String>,
    blocks: Vec<BlockSpec>,
    encoding: Encoding,
}

impl ScriptBuilder {
    pub fn new(name: &str, room: &str, time: &str) -> Self {
        Self {
            name: name.to_string(),
            room: room.to_string(),
            time: time.to_string(),
            symbols: Vec::new(),
            blocks: Vec::new(),
            encoding: Encoding::ShiftJis,
        }
    }

    pub fn symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols.extend(symbols.iter().map(|s| s.to_string()));
        self
    }

    pub fn block(mut self, name_index: u16, instructions: Vec<InstructionSpec>) -> Self {
        self.blocks.push(BlockSpec {
            name_index,
            instructions,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let decoder = Decoder::new(self.encoding);
        let string = |s: &str| length_prefixed(&decoder.encode_owned(s));

        let mut out = Vec::new();
        out.extend(string(&self.name));
        out.extend(string(&self.room));
        out.extend(string(&self.time));

        let symbols: Vec<u8> = self.symbols.iter().flat_map(|s| string(s)).collect();
        let symbol_table_end = out.len() + 12 + symbols.len();
        let block_table_end = symbol_table_end + BLOCK_HEADER_SIZE * self.blocks.len();

        // lay out every instruction before emitting, so jumps can point forward
        let mut starts = Vec::with_capacity(self.blocks.len());
        let mut addresses = Vec::with_capacity(self.blocks.len());
        let mut cursor = block_table_end;
        for block in &self.blocks {
            starts.push(cursor);
            let mut block_addresses = Vec::with_capacity(block.instructions.len());
            for instruction in &block.instructions {
                block_addresses.push(cursor);
                cursor += instruction.size();
            }
            addresses.push(block_addresses);
            cursor += BLOCK_TRAILER_SIZE;
        }

        out.extend_from_slice(&(self.symbols.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.blocks.len() as u16).to_be_bytes());
        out.extend_from_slice(&(symbol_table_end as u32).to_be_bytes());
        out.extend_from_slice(&(block_table_end as u32).to_be_bytes());
        out.extend(symbols);

        for (block, start) in self.blocks.iter().zip(&starts) {
            out.extend_from_slice(&block.name_index.to_be_bytes());
            out.extend_from_slice(&(block.instructions.len() as u16).to_be_bytes());
            out.extend_from_slice(&(*start as u32).to_be_bytes());
        }

        for block in &self.blocks {
            for instruction in &block.instructions {
                out.extend_from_slice(&instruction.line.to_be_bytes());
                out.extend_from_slice(&instruction.unknown.to_be_bytes());
                out.extend_from_slice(&instruction.opcode.to_be_bytes());
                out.extend_from_slice(&(instruction.params.len() as i16).to_be_bytes());
                out.extend_from_slice(&[0; 4]);

                for param in &instruction.params {
                    match param {
                        ParamSpec::Raw(tag, payload) => {
                            out.extend_from_slice(&tag.to_be_bytes());
                            out.extend_from_slice(payload);
                        }
                        ParamSpec::JumpTo { block, instruction } => {
                            out.extend_from_slice(&tags::JUMP_TARGET.to_be_bytes());
                            out.extend(word(addresses[*block][*instruction] as i32));
                        }
                    }
                }
            }
            out.extend_from_slice(&[0; BLOCK_TRAILER_SIZE]);
        }

        out
    }
}
