//! Position telemetry streamed by the Carryout while its motors run.
//!
//! The firmware prints free text with control characters mixed in. The
//! azimuth sits three tokens before an `el` marker and the elevation two
//! tokens after it, both as integers scaled by 100, e.g.
//! `hdg 18000 az junk el = 4500`.

use crate::position::{InvalidPosition, PositionReading};
use std::num::ParseIntError;
use std::str::Utf8Error;

const MARKER: &str = "el";
const AZIMUTH_OFFSET: usize = 3;
const ELEVATION_OFFSET: usize = 2;
/// Digits kept from the elevation token; anything after is line noise.
const ELEVATION_DIGITS: usize = 4;
const SCALE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseFailure {
    #[error("telemetry is not valid UTF-8: {0}")]
    Decode(#[from] Utf8Error),

    #[error("no `el` marker with three tokens before it")]
    MarkerNotFound,

    #[error("telemetry ends before token {0}")]
    MissingToken(usize),

    #[error("token {token:?} is not an integer: {source}")]
    InvalidNumber {
        token: String,
        source: ParseIntError,
    },

    #[error(transparent)]
    InvalidPosition(#[from] InvalidPosition),
}

/// Extracts the dish position from one raw serial read.
pub fn parse(raw: &[u8]) -> Result<PositionReading, ParseFailure> {
    let text = std::str::from_utf8(raw)?;
    let tokens: Vec<String> = text.split_whitespace().map(clean).collect();

    let marker = tokens
        .iter()
        .position(|token| token == MARKER)
        .filter(|&index| index >= AZIMUTH_OFFSET)
        .ok_or(ParseFailure::MarkerNotFound)?;

    let azimuth = scaled(token_at(&tokens, marker - AZIMUTH_OFFSET)?)?;

    let elevation = token_at(&tokens, marker + ELEVATION_OFFSET)?;
    // Tokens are ASCII after cleaning, so byte slicing is safe.
    let elevation = scaled(&elevation[..elevation.len().min(ELEVATION_DIGITS)])?;

    Ok(PositionReading::new(azimuth, elevation)?)
}

/// Lowercases a token and drops everything outside `[a-z0-9]`. Tokens made
/// only of noise become empty but keep their slot.
fn clean(token: &str) -> String {
    token
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn token_at(tokens: &[String], index: usize) -> Result<&str, ParseFailure> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or(ParseFailure::MissingToken(index))
}

fn scaled(token: &str) -> Result<f64, ParseFailure> {
    let value: i64 = token.parse().map_err(|source| ParseFailure::InvalidNumber {
        token: token.to_string(),
        source,
    })?;

    Ok(value as f64 / SCALE)
}
