//! Terminal bytes printed around a restart.
//!
//! The "inter" marker is written right before a new run starts; the "suffix"
//! marker after a run exits.

use std::fmt;
use std::str::FromStr;

/// Reset the terminal and wipe scrollback.
pub const HARD_CLEAR: &[u8] = b"\x1bc\x1b[3J";
/// Move the cursor home and clear the visible screen only.
pub const SOFT_CLEAR: &[u8] = b"\x1b[H\x1b[2J";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearMode {
    #[default]
    None,
    Hard,
    Soft,
}

impl ClearMode {
    /// Bytes to write before a restart.
    pub fn inter(&self) -> &'static [u8] {
        match self {
            ClearMode::None => b"",
            ClearMode::Hard => HARD_CLEAR,
            ClearMode::Soft => SOFT_CLEAR,
        }
    }
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearMode::None => f.write_str("none"),
            ClearMode::Hard => f.write_str("hard"),
            ClearMode::Soft => f.write_str("soft"),
        }
    }
}

impl FromStr for ClearMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            other => Err(format!("unknown clear mode '{other}'; expected: none, hard, soft")),
        }
    }
}

/// Bytes to write after a run exits: the separator on its own line.
pub fn suffix(separator: Option<&str>) -> Vec<u8> {
    match separator {
        Some(sep) if !sep.is_empty() => {
            let mut out = Vec::with_capacity(sep.len() + 1);
            out.extend_from_slice(sep.as_bytes());
            if !sep.ends_with('\n') {
                out.push(b'\n');
            }
            out
        }
        _ => Vec::new(),
    }
}
