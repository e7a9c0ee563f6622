use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unexpected end of buffer: need {needed} bytes at 0x{offset:X}, buffer is 0x{len:X} bytes")]
    UnexpectedEof { offset: usize, needed: usize, len: usize },

    #[error("malformed script header: {0}")]
    MalformedHeader(String),

    #[error("opcode {index} at 0x{address:X} is not in the catalog ({catalog_len} commands)")]
    UnknownOpcode { index: i16, address: usize, catalog_len: usize },

    #[error("unknown parameter type tag 0x{tag:04X} at 0x{offset:X}")]
    UnknownParameterTag { tag: i16, offset: usize },

    #[error("parameter tag 0x{tag:04X} at 0x{offset:X} declares an invalid length {length}")]
    InvalidParameterLength { tag: i16, offset: usize, length: i64 },

    #[error("block {block:?} decodes past its end: 0x{pos:X} > 0x{end:X}")]
    BlockOverrun { block: String, pos: usize, end: usize },

    #[error("illegal system flag index {index} (memory cells start at 0x124F)")]
    IllegalMemoryCell { index: i32 },

    #[error("symbol index {index} out of range ({len} symbols)")]
    SymbolOutOfRange { index: i64, len: usize },

    #[error("dialogue line {index} out of range ({len} lines)")]
    DialogueOutOfRange { index: usize, len: usize },

    #[error("import key {key:?} does not start with a 4-digit dialogue index")]
    InvalidImportKey { key: String },

    #[error("patch touches 0x{offset:X}, outside of the 0x{len:X} byte buffer")]
    PatchOutOfRange { offset: usize, len: usize },

    #[error("cannot render invocation at 0x{address:X}: {source}")]
    Render {
        address: usize,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("invalid opcode catalog: {0}")]
    InvalidCatalog(#[from] binrw::Error),
}

pub type Result<T> = std::result::Result<T, ScriptError>;
