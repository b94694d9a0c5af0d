// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Join codes and room keys.
//!
//! A join code is six characters drawn from an alphabet without visually
//! confusable glyphs (no `I`, `O`, `0`, `1`). Two devices that type the same
//! code, in any letter case, derive the same room key without a handshake.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Characters a join code may contain.
pub const CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a join code.
pub const CODE_LEN: usize = 6;

const ROOM_PREFIX: &str = "barlink-";

/// Join code errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("join code must have 6 characters, got {0}")]
    InvalidLength(usize),
}

/// A validated, uppercase join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    /// Draw a fresh random code.
    pub fn generate() -> Self {
        let alphabet = CODE_ALPHABET.as_bytes();
        let code = (0..CODE_LEN)
            .map(|_| char::from(alphabet[fastrand::usize(..alphabet.len())]))
            .collect();
        Self(code)
    }

    /// Parse user input (a bare code or a pasted invite URL).
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let code = normalize(input);
        if code.len() != CODE_LEN {
            return Err(CodeError::InvalidLength(code.len()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Room key shared by every device holding this code.
    pub fn room_key(&self) -> RoomKey {
        RoomKey(format!("{}{}", ROOM_PREFIX, self.0.to_lowercase()))
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

/// Mesh room identifier derived from a join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the join code from a room key, if it has the expected shape.
    pub fn join_code(&self) -> Option<JoinCode> {
        self.0
            .strip_prefix(ROOM_PREFIX)
            .and_then(|code| JoinCode::parse(code).ok())
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize free-form input into code characters.
///
/// Pulls the `join` query parameter out of a pasted invite URL, drops
/// anything that is not ASCII alphanumeric, truncates to [`CODE_LEN`] and
/// uppercases. Generated codes only use [`CODE_ALPHABET`], but typed codes
/// are not rejected for containing a confusable glyph. The result may be
/// shorter than a full code.
pub fn normalize(input: &str) -> String {
    let raw = join_param(input).unwrap_or(input);
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(CODE_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn join_param(input: &str) -> Option<&str> {
    let (_, query) = input.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "join")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
