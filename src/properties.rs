//! Reader for the gateway's `.properties` settings files
//!
//! Follows the `java.util.Properties` text format: `#` and `!` comment
//! lines, `key=value`, `key: value` or `key value` entries, backslash
//! escapes including `\uXXXX`, and lines continued with a trailing
//! backslash. Values are taken literally; nothing is expanded.

use crate::error::{Error, Result};
use std::io::Read;

/// Read all entries from `reader`, in file order.
///
/// UTF-8 input is used as is; anything else is decoded as ISO-8859-1,
/// which is what the gateway writes.
pub(crate) fn read<R: Read>(mut reader: R) -> Result<Vec<(String, String)>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let text = String::from_utf8(raw)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| char::from(b)).collect());
    parse(&text)
}

pub(crate) fn parse(text: &str) -> Result<Vec<(String, String)>> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines = normalized.split('\n');
    let mut entries = Vec::new();

    while let Some(line) = lines.next() {
        let line = line.trim_start_matches(is_blank);
        if line.is_empty() || line.starts_with(['#', '!']) {
            continue;
        }

        let mut logical = line.to_string();
        while continues(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start_matches(is_blank)),
                None => break,
            }
        }
        entries.push(split_entry(&logical)?);
    }
    Ok(entries)
}

const fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

/// An odd number of trailing backslashes joins the next line.
fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> Result<(String, String)> {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_blank(c) {
            key_end = i;
            break;
        }
    }

    let (key, rest) = line.split_at(key_end);
    let rest = rest.trim_start_matches(is_blank);
    let value = rest
        .strip_prefix(['=', ':'])
        .unwrap_or(rest)
        .trim_start_matches(is_blank);
    Ok((unescape(key)?, unescape(value)?))
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let unit = hex_unit(&mut chars)?;
                if (0xD800..0xDC00).contains(&unit) {
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => hex_unit(&mut chars)?,
                        _ => return Err(malformed("unpaired surrogate")),
                    };
                    let decoded = char::decode_utf16([unit, low])
                        .next()
                        .and_then(std::result::Result::ok)
                        .ok_or_else(|| malformed("invalid surrogate pair"))?;
                    out.push(decoded);
                } else {
                    let decoded = char::from_u32(u32::from(unit))
                        .ok_or_else(|| malformed("unpaired surrogate"))?;
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn hex_unit(chars: &mut std::str::Chars<'_>) -> Result<u16> {
    let digits: String = chars.by_ref().take(4).collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(&format!("bad \\u escape '{digits}'")));
    }
    u16::from_str_radix(&digits, 16).map_err(|e| malformed(&e.to_string()))
}

fn malformed(reason: &str) -> Error {
    Error::Config(format!("Invalid settings line: {reason}"))
}
