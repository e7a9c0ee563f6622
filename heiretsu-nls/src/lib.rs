use anyhow::{anyhow, Result};
use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// How a line break is stored inside script strings.
pub const NEWLINE_ESCAPE: &str = "\\n";

pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;

    /// Decode C-style string: stop at the first NUL (0x00).
    fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    ShiftJis,
    /// Treat GBK as GB18030 (superset). Fan translations of legacy assets use it.
    Gbk,
    Utf8,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Gbk => GB18030,
            Encoding::Utf8 => UTF_8,
        }
    }

    /// Most bytes one character can take.
    #[inline]
    pub fn max_char_len(self) -> usize {
        match self {
            Encoding::ShiftJis => 2,
            Encoding::Gbk | Encoding::Utf8 => 4,
        }
    }
}

impl FromStr for Encoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sjis" | "shift_jis" | "shift-jis" => Ok(Encoding::ShiftJis),
            "gbk" => Ok(Encoding::Gbk),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            _ => Err(anyhow!("unknown NLS: {}", s)),
        }
    }
}

/// Result of [`Decoder::encode_capped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedBytes {
    pub bytes: Vec<u8>,
    /// Encoded length of the full input, before any truncation.
    pub full_len: usize,
}

impl CappedBytes {
    #[inline]
    pub fn truncated(&self) -> bool {
        self.bytes.len() < self.full_len
    }
}

/// A simple decoder bound to one encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    enc: Encoding,
}

impl Decoder {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.enc
    }

    /// Encode a Rust string to bytes using the selected encoding.
    /// This is "best effort": unrepresentable chars will be replaced.
    pub fn encode<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        let enc = self.enc.as_encoding_rs();
        let (cow, _, had_errors) = enc.encode(s);
        if had_errors {
            log::warn!("unrepresentable characters while encoding {:?} as {:?}", s, self.enc);
        }
        cow
    }

    /// Same as encode(), but always returns an owned Vec<u8>.
    pub fn encode_owned(&self, s: &str) -> Vec<u8> {
        self.encode(s).into_owned()
    }

    /// Encode `s`, keeping at most `cap` bytes.
    ///
    /// Truncation happens on a character boundary, so a double-byte character
    /// is never split.
    pub fn encode_capped(&self, s: &str, cap: usize) -> CappedBytes {
        let full = self.encode_owned(s);
        if full.len() <= cap {
            let full_len = full.len();
            return CappedBytes { bytes: full, full_len };
        }

        let mut bytes = Vec::with_capacity(cap);
        let mut buf = [0u8; 4];
        for c in s.chars() {
            let encoded = self.encode(c.encode_utf8(&mut buf));
            if bytes.len() + encoded.len() > cap {
                break;
            }
            bytes.extend_from_slice(&encoded);
        }

        CappedBytes { bytes, full_len: full.len() }
    }
}

impl TextDecoder for Decoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.enc {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
            },
            Encoding::ShiftJis | Encoding::Gbk => {
                let enc = self.enc.as_encoding_rs();
                let (cow, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    log::warn!("{:?} decode error", self.enc);
                }
                cow
            }
        }
    }
}

/// Editor newlines to the escape sequence stored in script strings.
pub fn escape_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', NEWLINE_ESCAPE)
}

/// Stored escape sequences back to editor newlines.
pub fn unescape_newlines(text: &str) -> String {
    text.replace(NEWLINE_ESCAPE, "\n")
}
