//! Program images.
//!
//! A program image is what an assembler hands to the machine: a start
//! address and a list of (address, word) cells. Two encodings are read:
//!
//! - JSON, `{"start": 3000, "cells": [[3000, 1234], ...]}` where each word
//!   is its raw bit pattern
//! - a line-oriented text form:
//!
//! ```text
//! ; comment
//! START 3000
//! 3000 + 31 16 00 05 08
//! 3001 -12345
//! ```
//!
//! In the text form `;` starts a comment, `START` sets the start address
//! and every other line is an address followed by a word, either as sign
//! and five bytes or as a signed decimal.

use std::fmt::Write as _;
use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::binary::Word;
use crate::cpu::memory::MEMORY_SIZE;

/// An assembled program.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Address of the first instruction.
    pub start: u16,
    /// Words to place, by address.
    pub cells: Vec<(u16, Word)>,
}

impl ProgramImage {
    pub fn new(start: u16) -> Self {
        Self {
            start,
            cells: Vec::new(),
        }
    }

    /// Add a cell.
    pub fn push(&mut self, addr: u16, word: Word) {
        self.cells.push((addr, word));
    }

    /// Lowest and highest addresses used, if any.
    pub fn extent(&self) -> Option<(u16, u16)> {
        let low = self.cells.iter().map(|&(a, _)| a).min()?;
        let high = self.cells.iter().map(|&(a, _)| a).max()?;
        Some((low, high))
    }

    /// Words for a contiguous run of addresses, zero where nothing is placed.
    pub fn words(&self, from: u16, count: usize) -> Vec<Word> {
        let mut out = vec![Word::ZERO; count];
        for &(addr, word) in &self.cells {
            if let Some(slot) = (addr as usize).checked_sub(from as usize).and_then(|i| out.get_mut(i)) {
                *slot = word;
            }
        }
        out
    }

    /// Parse the text form.
    pub fn parse_text(text: &str) -> Result<Self, ImageError> {
        let mut image = Self::new(0);

        for (line_num, line) in text.lines().enumerate() {
            let line_num = line_num + 1;
            let content = line.split(';').next().unwrap_or("").trim();

            // Skip empty lines and comments
            if content.is_empty() {
                continue;
            }

            let (head, rest) = content
                .split_once(char::is_whitespace)
                .map(|(h, r)| (h, r.trim()))
                .unwrap_or((content, ""));

            if head.eq_ignore_ascii_case("START") {
                image.start = parse_address(rest, line_num)?;
                continue;
            }

            let addr = parse_address(head, line_num)?;
            let word = Word::parse(rest).map_err(|e| ImageError::Parse {
                line: line_num,
                message: e.to_string(),
            })?;
            image.push(addr, word);
        }

        Ok(image)
    }

    /// Render the text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; MIX program image, {} cells", self.cells.len());
        let _ = writeln!(out, "START {}", self.start);
        for &(addr, word) in &self.cells {
            let _ = writeln!(out, "{:04} {}", addr, word);
        }
        out
    }

    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let image: Self = serde_json::from_str(text)?;
        for &(addr, _) in &image.cells {
            check_address(addr as i64, 0)?;
        }
        check_address(image.start as i64, 0)?;
        Ok(image)
    }

    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_address(addr: i64, line: usize) -> Result<u16, ImageError> {
    if !(0..MEMORY_SIZE as i64).contains(&addr) {
        return Err(ImageError::AddressOutOfRange { line, addr });
    }
    Ok(addr as u16)
}

fn parse_address(text: &str, line: usize) -> Result<u16, ImageError> {
    let addr: i64 = text.parse().map_err(|_| ImageError::Parse {
        line,
        message: format!("expected an address, found {:?}", text),
    })?;
    check_address(addr, line)
}

/// Load an image from disk; `.json` files are read as JSON, anything else
/// as text.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ImageError::Io(e.to_string()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        ProgramImage::from_json(&text)
    } else {
        ProgramImage::parse_text(&text)
    }
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("address {addr} out of range on line {line}")]
    AddressOutOfRange { line: usize, addr: i64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
