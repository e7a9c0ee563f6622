//! Pseudocode rendering.
//!
//! Every invocation has a raw form, `NAME<unknown>(TTTT XX XX .., ...)`. A
//! closed set of well-understood commands additionally has a semantic form
//! that resolves operands, jump targets and conditions.

use std::fmt::Write;
use std::str::FromStr;

use itertools::Itertools;
use strum::EnumString;

use super::decode::{tags, CommandBlock, CommandInvocation, Parameter};
use super::header::SymbolTable;
use super::operand::{
    self, CONTROL_MEMORY, CONTROL_MODULE_MEMORY, CONTROL_VARIABLE, MEMORY_CELL_BASE,
};
use super::reader::{read_i16, read_word};
use crate::error::{Result, ScriptError};

/// Memory cells a `SET` may name as its destination.
pub const SET_MEMORY_RANGE: std::ops::RangeInclusive<i32> = 0x1303..=0x1403;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    Raw,
    #[default]
    Semantic,
}

/// Commands with a semantic rendering rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum KnownCommand {
    #[strum(serialize = "EV_MODE")]
    EvMode,
    #[strum(serialize = "SCENE_SET")]
    SceneSet,
    #[strum(serialize = "WAIT")]
    Wait,
    #[strum(serialize = "JUMP")]
    Jump,
    #[strum(serialize = "SET")]
    Set,
    /// Single boolean argument.
    #[strum(
        serialize = "LOG",
        serialize = "MW",
        serialize = "UI_DATEPLACE",
        serialize = "SET_EAR",
        serialize = "MENU_LOCK",
        serialize = "SMENU_LOCK",
        serialize = "POINT_INVALID",
        serialize = "SET_DV",
        serialize = "UI_PLACE"
    )]
    Flag,
    #[strum(serialize = "TOPIC_GET")]
    TopicGet,
    #[strum(serialize = "FI")]
    Fi,
    #[strum(serialize = "EV_START")]
    EvStart,
    #[strum(serialize = "APPEAR")]
    Appear,
    #[strum(serialize = "TURN")]
    Turn,
}

/// How one invocation is rendered in semantic mode.
#[derive(Debug, Clone, Copy)]
pub enum CommandForm<'a> {
    Known(KnownCommand, &'a CommandInvocation),
    Unrecognized(&'a CommandInvocation),
}

impl<'a> CommandForm<'a> {
    pub fn of(invocation: &'a CommandInvocation) -> Self {
        match KnownCommand::from_str(invocation.name()) {
            Ok(known) => CommandForm::Known(known, invocation),
            Err(_) => CommandForm::Unrecognized(invocation),
        }
    }
}

/// A semantic rule either renders, finds a required parameter missing, or
/// hits a malformed operand.
enum RuleError {
    Missing { tag: i16, nth: usize },
    Script(ScriptError),
}

impl From<ScriptError> for RuleError {
    fn from(e: ScriptError) -> Self {
        RuleError::Script(e)
    }
}

type RuleResult<T> = std::result::Result<T, RuleError>;

fn required(invocation: &CommandInvocation, tag: i16, nth: usize) -> RuleResult<&Parameter> {
    invocation.param(tag, nth).ok_or(RuleError::Missing { tag, nth })
}

fn boolean(payload: &[u8]) -> Result<&'static str> {
    Ok(if read_word(payload, 0)? != 0 { "TRUE" } else { "FALSE" })
}

/// Renders invocations against one file's symbols and invocation arena.
pub struct Renderer<'a> {
    symbols: &'a SymbolTable,
    invocations: &'a [CommandInvocation],
    mode: RenderMode,
}

impl<'a> Renderer<'a> {
    pub fn new(
        symbols: &'a SymbolTable,
        invocations: &'a [CommandInvocation],
        mode: RenderMode,
    ) -> Self {
        Self {
            symbols,
            invocations,
            mode,
        }
    }

    /// `NAME` followed by `<unknown>` when the flag is set.
    fn head(invocation: &CommandInvocation) -> String {
        if invocation.unknown >= 0 {
            format!("{}<{}>", invocation.name(), invocation.unknown)
        } else {
            invocation.name().to_string()
        }
    }

    pub fn render_raw(&self, invocation: &CommandInvocation) -> String {
        let params = invocation
            .parameters
            .iter()
            .map(|p| {
                let payload = p.payload.iter().map(|b| format!("{:02X}", b)).join(" ");
                format!("{:04X} {}", p.tag, payload)
            })
            .join(", ");
        format!("{}({})", Self::head(invocation), params)
    }

    pub fn render_invocation(&self, invocation: &CommandInvocation) -> Result<String> {
        if self.mode == RenderMode::Raw {
            return Ok(self.render_raw(invocation));
        }

        let (known, invocation) = match CommandForm::of(invocation) {
            CommandForm::Known(known, invocation) => (known, invocation),
            CommandForm::Unrecognized(invocation) => return Ok(self.render_raw(invocation)),
        };

        match self.render_arguments(known, invocation) {
            Ok(args) => Ok(format!("{}({})", Self::head(invocation), args)),
            Err(RuleError::Missing { tag, nth }) => {
                log::warn!(
                    "{} at 0x{:X} has no parameter #{} with tag 0x{:02X}, rendering raw",
                    invocation.name(),
                    invocation.address,
                    nth,
                    tag
                );
                Ok(self.render_raw(invocation))
            }
            Err(RuleError::Script(e)) => Err(ScriptError::Render {
                address: invocation.address,
                source: Box::new(e),
            }),
        }
    }

    fn render_arguments(&self, known: KnownCommand, inv: &CommandInvocation) -> RuleResult<String> {
        let symbols = self.symbols;
        let pair = |p: &Parameter| operand::resolve_at(&p.payload, 0, symbols);

        let mut out = String::new();
        match known {
            KnownCommand::EvMode => {
                out += boolean(&required(inv, tags::BOOL, 0)?.payload)?;
                for p in inv.params_with(tags::INT_19) {
                    let _ = write!(out, ", 19{}", pair(p)?);
                }
            }
            KnownCommand::SceneSet => {
                let first = pair(required(inv, tags::INT, 0)?)?;
                let second = pair(required(inv, tags::INT, 1)?)?;
                let _ = write!(out, "{}, {}", first, second);
            }
            KnownCommand::Wait => {
                if let Some(p) = inv.param(tags::TIME, 0) {
                    out += &operand::time(&p.payload, symbols)?;
                }
            }
            KnownCommand::Jump => {
                let target = read_word(&required(inv, tags::JUMP_TARGET, 0)?.payload, 0)?;
                out += &self.jump_target(inv, target);
                if let Some(p) = inv.param(tags::CONDITION, 0) {
                    let terms = operand::conditions(&p.payload, symbols)?;
                    let _ = write!(out, ", if {}", operand::render_conditions(&terms));
                }
            }
            KnownCommand::Set => {
                let dest = &required(inv, tags::INT, 0)?.payload;
                let value = pair(required(inv, tags::INT, 1)?)?;
                let control = read_word(dest, 0)?;
                let index = read_word(dest, 1)?;
                match control {
                    CONTROL_MEMORY if index < MEMORY_CELL_BASE => {
                        return Err(ScriptError::IllegalMemoryCell { index }.into());
                    }
                    CONTROL_MEMORY if SET_MEMORY_RANGE.contains(&index) => {
                        let _ = write!(out, "memd {}, {}", index, value);
                    }
                    CONTROL_MODULE_MEMORY => {
                        let _ = write!(out, "mmem {}, {}", index, value);
                    }
                    CONTROL_VARIABLE => {
                        let _ = write!(out, "var {}, {}", symbols.get(index as i64)?, value);
                    }
                    _ => out += "Unknown",
                }
            }
            KnownCommand::Flag => {
                out += boolean(&required(inv, tags::BOOL, 0)?.payload)?;
            }
            KnownCommand::TopicGet => {
                let index = read_i16(&required(inv, tags::SYMBOL_INDEX, 0)?.payload, 0)?;
                out += symbols.get(index as i64)?;
                if let Some(p) = inv.param(tags::BOOL, 0) {
                    let _ = write!(out, ", {}", boolean(&p.payload)?);
                }
                if let Some(p) = inv.param(tags::INT_19, 0) {
                    let _ = write!(out, ", 19{}", pair(p)?);
                }
                if let Some(p) = inv.param(tags::INT, 0) {
                    let _ = write!(out, ", 19{}", pair(p)?);
                }
            }
            KnownCommand::Fi => {
                out += &operand::time(&required(inv, tags::TIME, 0)?.payload, symbols)?;
                for p in inv.params_with(tags::INT_19) {
                    let _ = write!(out, ", 19{}", pair(p)?);
                }
            }
            KnownCommand::EvStart => {
                let _ = write!(out, "{}", pair(required(inv, tags::INT, 0)?)?);
                if let Some(p) = inv.param(tags::INT_LIST, 0) {
                    let _ = write!(out, ", {}", operand::list(&p.payload, symbols)?);
                }
                for p in inv.params_with(tags::INT).skip(1) {
                    let _ = write!(out, ", {}", pair(p)?);
                }
            }
            KnownCommand::Appear => {
                if let Some(p) = inv.param(tags::BOOL, 0) {
                    out += boolean(&p.payload)?;
                }
            }
            KnownCommand::Turn => {
                let mut parts = Vec::new();
                if let Some(p) = inv.param(tags::INT_08, 0) {
                    parts.push(format!("08{}", pair(p)?));
                }
                if let Some(p) = inv.param(tags::INT_0D, 0) {
                    parts.push(format!("0D{}", pair(p)?));
                }
                if let Some(p) = inv.param(tags::VECTOR, 0) {
                    parts.push(operand::vector(&p.payload, symbols)?);
                }
                if let Some(p) = inv.param(tags::INT_10, 0) {
                    parts.push(format!("10{}", pair(p)?));
                }
                if let Some(p) = inv.param(tags::INT, 0) {
                    parts.push(pair(p)?.to_string());
                }
                out += &parts.join(", ");
            }
        }

        Ok(out)
    }

    /// The line number of the invocation at `target`.
    /// Jump payloads hold parse-time addresses, so resolve against those.
    fn jump_target(&self, from: &CommandInvocation, target: i32) -> String {
        match self.invocations.iter().find(|i| i.parsed_address as i64 == target as i64) {
            Some(dest) => dest.line_number.to_string(),
            None => {
                log::warn!(
                    "jump at 0x{:X} targets 0x{:08X}, which is not an invocation",
                    from.address,
                    target
                );
                format!("@0x{:08X}", target)
            }
        }
    }

    /// Render blocks in order, padding with blank lines so each invocation
    /// lands on its recorded source line.
    pub fn render_blocks(&self, blocks: &[CommandBlock]) -> Result<String> {
        let mut out = String::new();
        let mut current_line: i32 = 1;

        for block in blocks {
            let _ = writeln!(out, "== {} ==", block.name);
            current_line += 1;

            if block.invocations.is_empty() {
                out.push('\n');
                current_line += 1;
            }

            for invocation in &self.invocations[block.invocations.clone()] {
                while current_line < invocation.line_number as i32 {
                    out.push('\n');
                    current_line += 1;
                }
                out += &self.render_invocation(invocation)?;
                out.push('\n');
                current_line += 1;
            }
        }

        Ok(out)
    }
}
