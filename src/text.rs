use std::collections::HashMap;

use log::trace;

use crate::error::{EngineError, Result};

/// Byte that ends every string in the image unless the settings say otherwise.
pub const DEFAULT_TERMINATOR: u8 = 0xFF;

/// Line break code inside dialogue text
pub const NEWLINE: u8 = 0xFD;

const DIGIT_BASE: u8 = 0x38;
const LETTER_BASE: u8 = 0x8A;

lazy_static! {
    /// Punctuation and symbols that live outside the digit and letter runs of the nametable
    static ref SYMBOLS: HashMap<u8, char> = {
        let mut m = HashMap::new();
        m.insert(0x00, ' ');
        m.insert(0x01, '+');
        m.insert(0x02, '-');
        m.insert(0x03, ':');
        m.insert(0x04, '\'');
        m.insert(0x05, '"');
        m.insert(0x09, '*');
        m.insert(0x42, ',');
        m.insert(0x43, '.');
        m.insert(0x7C, '!');
        m.insert(0x7D, '?');
        m.insert(0x88, '©');
        m.insert(0x89, '…');
        m.insert(NEWLINE, '\n');
        m
    };
    static ref SYMBOL_CODES: HashMap<char, u8> = SYMBOLS.iter().map(|(b, c)| (*c, *b)).collect();
}

/// Decode game text (without its terminator) into a printable string.
///
/// Bytes with no printable counterpart come out as `\xNN` escapes so that
/// [`encode`] can restore them exactly.
pub fn decode(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            DIGIT_BASE..=0x41 => result.push((b'0' + (b - DIGIT_BASE)) as char),
            LETTER_BASE..=0xA3 => result.push((b'A' + (b - LETTER_BASE)) as char),
            _ => match SYMBOLS.get(&b) {
                Some(c) => result.push(*c),
                None => result.push_str(&format!("\\x{:02X}", b)),
            },
        }
    }
    result
}

/// Encode a string into game text. The terminator is not appended here.
pub fn encode(text: &str) -> Result<Vec<u8>> {
    let upper = text.to_uppercase();
    let chars: Vec<char> = upper.chars().collect();
    let mut out = Vec::with_capacity(chars.len());

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '0'..='9' => out.push(DIGIT_BASE + (c as u8 - b'0')),
            'A'..='Z' => out.push(LETTER_BASE + (c as u8 - b'A')),
            '\r' => {
                // \r\n is one line break
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
                out.push(NEWLINE);
            }
            '\\' => {
                // \xNN escape
                if chars.get(i) == Some(&'X') && i + 2 < chars.len() {
                    let hex: String = chars.iter().skip(i + 1).take(2).collect();
                    let value = u8::from_str_radix(&hex, 16).map_err(|_| {
                        EngineError::Range(format!("bad escape sequence \\x{} in \"{}\"", hex, text))
                    })?;
                    out.push(value);
                    i += 3;
                } else {
                    return Err(EngineError::Range(format!(
                        "dangling backslash in \"{}\"",
                        text
                    )));
                }
            }
            _ => match SYMBOL_CODES.get(&c) {
                Some(code) => out.push(*code),
                None => {
                    return Err(EngineError::Range(format!(
                        "character '{}' has no game text code",
                        c
                    )))
                }
            },
        }
    }

    trace!("encoded {:?} into {} bytes", text, out.len());
    Ok(out)
}

/// Bytes from `start` up to (not including) the first `terminator`.
/// `None` when the terminator never shows up before the end of `memory`.
pub fn scan(memory: &[u8], start: usize, terminator: u8) -> Option<&[u8]> {
    let tail = memory.get(start..)?;
    let end = tail.iter().position(|&b| b == terminator)?;
    Some(&tail[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_digits() {
        // "CURE 1"
        let bytes = [0x8C, 0x9E, 0x9B, 0x8E, 0x00, 0x39];
        assert_eq!(decode(&bytes), "CURE 1");
        assert_eq!(encode("cure 1").unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_unknown_bytes_escape_and_restore() {
        let bytes = [0x8A, 0x10, 0xFE];
        let text = decode(&bytes);
        assert_eq!(text, "A\\x10\\xFE");
        assert_eq!(encode(&text).unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_newline_and_punctuation() {
        let bytes = [0x7D, NEWLINE, 0x43, 0x42];
        assert_eq!(decode(&bytes), "?\n.,");
        assert_eq!(encode("?\n.,").unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_crlf_is_one_line_break() {
        assert_eq!(encode("A\r\nB").unwrap(), vec![0x8A, NEWLINE, 0x8B]);
        assert_eq!(encode("A\rB").unwrap(), vec![0x8A, NEWLINE, 0x8B]);
    }

    #[test]
    fn test_unencodable_character() {
        assert!(matches!(encode("a_b"), Err(EngineError::Range(_))));
        assert!(matches!(encode("trailing\\"), Err(EngineError::Range(_))));
    }

    #[test]
    fn test_scan() {
        let memory = [0x8A, 0x8B, 0xFF, 0x8C];
        assert_eq!(scan(&memory, 0, 0xFF), Some(&memory[..2]));
        assert_eq!(scan(&memory, 3, 0xFF), None);
        assert_eq!(scan(&memory, 9, 0xFF), None);
    }
}
