//! Operand decoding shared by the semantic rules.
//!
//! Most operands are a pair of words: a control code saying what kind of
//! reference the value is, and the value itself.

use std::fmt;

use itertools::Itertools;
use strum::Display;

use super::header::SymbolTable;
use super::reader::{ensure, read_i16, read_word};
use crate::error::{Result, ScriptError};

pub const CONTROL_LITERAL: i32 = 0x300;
pub const CONTROL_MEMORY: i32 = 0x302;
pub const CONTROL_MODULE_MEMORY: i32 = 0x303;
pub const CONTROL_VARIABLE: i32 = 0x304;

/// Memory cells below this index are system flags and never addressable from scripts.
pub const MEMORY_CELL_BASE: i32 = 0x124F;

/// Time operands whose first word is this count frames; anything else is time.
pub const TIME_FRAMES: i32 = 0x201;

const CONDITION_HEADER_SIZE: usize = 4;
const CONDITION_TERM_SIZE: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(i32),
    Memory(i32),
    ModuleMemory(i32),
    Variable(String),
    Unrecognized { control: i32, value: i32 },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(n) => write!(f, "lit {}", n),
            Operand::Memory(n) => write!(f, "memd {}", n),
            Operand::ModuleMemory(n) => write!(f, "mmem {}", n),
            Operand::Variable(name) => write!(f, "var {}", name),
            Operand::Unrecognized { .. } => write!(f, "-1"),
        }
    }
}

/// Resolve a (control, value) pair.
pub fn resolve(control: i32, value: i32, symbols: &SymbolTable) -> Result<Operand> {
    match control {
        CONTROL_LITERAL => Ok(Operand::Literal(value)),
        CONTROL_MEMORY => {
            if value < MEMORY_CELL_BASE {
                return Err(ScriptError::IllegalMemoryCell { index: value });
            }
            Ok(Operand::Memory(value))
        }
        CONTROL_MODULE_MEMORY => Ok(Operand::ModuleMemory(value)),
        CONTROL_VARIABLE => Ok(Operand::Variable(symbols.get(value as i64)?.to_string())),
        _ => {
            log::warn!("unrecognized operand control code 0x{:X} (value {})", control, value);
            Ok(Operand::Unrecognized { control, value })
        }
    }
}

/// Resolve the pair stored in words `word` and `word + 1` of `payload`.
pub fn resolve_at(payload: &[u8], word: usize, symbols: &SymbolTable) -> Result<Operand> {
    resolve(read_word(payload, word)?, read_word(payload, word + 1)?, symbols)
}

/// `frames lit 30` or `time memd 4700`.
pub fn time(payload: &[u8], symbols: &SymbolTable) -> Result<String> {
    let unit = if read_word(payload, 0)? == TIME_FRAMES {
        "frames"
    } else {
        "time"
    };
    Ok(format!("{} {}", unit, resolve_at(payload, 1, symbols)?))
}

pub fn vector(payload: &[u8], symbols: &SymbolTable) -> Result<String> {
    Ok(format!(
        "Vector3({}, {}, {})",
        resolve_at(payload, 0, symbols)?,
        resolve_at(payload, 2, symbols)?,
        resolve_at(payload, 4, symbols)?
    ))
}

/// Length-prefixed list of pairs: word 0 is the count, pair `i` follows it.
pub fn list(payload: &[u8], symbols: &SymbolTable) -> Result<String> {
    let count = read_word(payload, 0)?.max(0) as usize;
    let values = (0..count)
        .map(|i| resolve_at(payload, 1 + i * 2, symbols))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", values.iter().join(", ")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Comparator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    /// Only the left operand is tested.
    Bare,
    /// Renders as nothing.
    Unrecognized,
}

impl From<u8> for Comparator {
    fn from(code: u8) -> Self {
        match code {
            0x83 => Comparator::Eq,
            0x84 => Comparator::Ne,
            0x85 => Comparator::Gt,
            0x86 => Comparator::Lt,
            0x87 => Comparator::Ge,
            0x88 => Comparator::Le,
            0x89 => Comparator::Bare,
            _ => Comparator::Unrecognized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    /// Terms are concatenated.
    Concat,
}

impl From<u8> for Combinator {
    fn from(code: u8) -> Self {
        match code {
            0x80 => Combinator::And,
            0x81 => Combinator::Or,
            _ => Combinator::Concat,
        }
    }
}

impl Combinator {
    pub fn separator(self) -> &'static str {
        match self {
            Combinator::And => " && ",
            Combinator::Or => " || ",
            Combinator::Concat => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTerm {
    pub comparator: Comparator,
    /// Joins this term to the next one.
    pub combinator: Combinator,
    pub left: Operand,
    pub right: Operand,
}

impl fmt::Display for ConditionTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comparator {
            Comparator::Bare => write!(f, "{}", self.left),
            Comparator::Unrecognized => Ok(()),
            cmp => write!(f, "{} {} {}", self.left, cmp, self.right),
        }
    }
}

/// Decode a condition parameter.
///
/// Layout: i16 payload length, i16 term count, then 18-byte terms of
/// comparator u8, combinator u8, left pair, right pair.
pub fn conditions(payload: &[u8], symbols: &SymbolTable) -> Result<Vec<ConditionTerm>> {
    let count = read_i16(payload, 2)?.max(0) as usize;
    let mut terms = Vec::with_capacity(count);

    for i in 0..count {
        let at = CONDITION_HEADER_SIZE + i * CONDITION_TERM_SIZE;
        ensure(payload, at, CONDITION_TERM_SIZE)?;
        let term = &payload[at..at + CONDITION_TERM_SIZE];
        terms.push(ConditionTerm {
            comparator: Comparator::from(term[0]),
            combinator: Combinator::from(term[1]),
            left: resolve_at(&term[2..], 0, symbols)?,
            right: resolve_at(&term[2..], 2, symbols)?,
        });
    }

    Ok(terms)
}

/// Left to right, no grouping: `a == b && c || d`.
pub fn render_conditions(terms: &[ConditionTerm]) -> String {
    let mut out = String::new();
    let mut join = Combinator::Concat;
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            out.push_str(join.separator());
        }
        out.push_str(&term.to_string());
        join = term.combinator;
    }
    out
}
