//! Reader for `.properties` files.
//!
//! Files are decoded as ISO-8859-1 so every byte maps to exactly one char
//! and back; `\uXXXX` escapes carry anything outside that range.

use crate::error::{Result, SecuredPropertiesError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub(crate) const WHITESPACE: [char; 3] = [' ', '\t', '\x0C'];

/// Parsed `key -> value` pairs; a repeated key keeps its last value.
pub type Properties = HashMap<String, String>;

pub fn load_properties(path: &Path) -> Result<Properties> {
    let content = read_latin1(path)?;
    parse(&content).map_err(|reason| SecuredPropertiesError::PropertyFileUnreadable {
        path: path.display().to_string(),
        reason,
    })
}

pub(crate) fn read_latin1(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| SecuredPropertiesError::PropertyFileUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Encodes `text` as ISO-8859-1, failing on the first char above U+00FF.
pub(crate) fn encode_latin1(text: &str) -> std::result::Result<Vec<u8>, char> {
    text.chars().map(|c| u8::try_from(c).map_err(|_| c)).collect()
}

fn parse(content: &str) -> std::result::Result<Properties, String> {
    let mut properties = Properties::new();
    for line in logical_lines(content) {
        let (key, value) = split_key_value(&line);
        properties.insert(unescape(key)?, unescape(value)?);
    }
    Ok(properties)
}

/// Joins backslash-continued lines and drops comments and blank lines.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for natural in content.split('\n') {
        let natural = natural.strip_suffix('\r').unwrap_or(natural);
        let trimmed = natural.trim_start_matches(WHITESPACE);

        let mut line = match pending.take() {
            Some(mut continued) => {
                continued.push_str(trimmed);
                continued
            }
            None if trimmed.is_empty() || trimmed.starts_with(['#', '!']) => continue,
            None => trimmed.to_string(),
        };

        if ends_with_continuation(&line) {
            line.pop();
            pending = Some(line);
        } else {
            lines.push(line);
        }
    }
    lines.extend(pending);
    lines
}

pub(crate) fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0C' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut value = line[key_end..].trim_start_matches(WHITESPACE);
    if let Some(rest) = value.strip_prefix(['=', ':']) {
        value = rest.trim_start_matches(WHITESPACE);
    }
    (key, value)
}

fn unescape(raw: &str) -> std::result::Result<String, String> {
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
            Some('f') => out.push('\x0C'),
            Some('u') => {
                let unit = read_utf16_unit(&mut chars)?;
                if (0xD800..0xDC00).contains(&unit) {
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => read_utf16_unit(&mut chars)?,
                        _ => return Err("Unpaired surrogate in \\uxxxx encoding".into()),
                    };
                    let decoded = char::decode_utf16([unit, low])
                        .collect::<std::result::Result<String, _>>()
                        .map_err(|e| e.to_string())?;
                    out.push_str(&decoded);
                } else {
                    let decoded = char::from_u32(u32::from(unit))
                        .ok_or_else(|| "Unpaired surrogate in \\uxxxx encoding".to_string())?;
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn read_utf16_unit(chars: &mut std::str::Chars<'_>) -> std::result::Result<u16, String> {
    let hex: String = chars.by_ref().take(4).collect();
    if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("Malformed \\uxxxx encoding.".into());
    }
    u16::from_str_radix(&hex, 16).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators() {
        let props = parse("a=1\nb = 2\nc:3\nd 4\ne\t=\t5\nf\n").unwrap();
        assert_eq!(props["a"], "1");
        assert_eq!(props["b"], "2");
        assert_eq!(props["c"], "3");
        assert_eq!(props["d"], "4");
        assert_eq!(props["e"], "5");
        assert_eq!(props["f"], "");
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let props = parse("# comment=1\n! other=2\n\n   \n  key = value  \n").unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props["key"], "value  ");
    }

    #[test]
    fn test_value_keeps_equals_signs() {
        let props = parse("token={buMkr+yZH9RclafjETtlSQ==}\nurl=a=b:c").unwrap();
        assert_eq!(props["token"], "{buMkr+yZH9RclafjETtlSQ==}");
        assert_eq!(props["url"], "a=b:c");
    }

    #[test]
    fn test_continuation_lines() {
        let props = parse("list = one, \\\n       two, \\\n  # three\nnext=1").unwrap();
        assert_eq!(props["list"], "one, two, # three");
        assert_eq!(props["next"], "1");
    }

    #[test]
    fn test_escaped_backslash_is_not_continuation() {
        let props = parse("path=c:\\\\temp\\\\\nnext=1").unwrap();
        assert_eq!(props["path"], "c:\\temp\\");
        assert_eq!(props["next"], "1");
    }

    #[test]
    fn test_escapes() {
        let props = parse("my\\ key\\=x = tab\\there\\u00e9\\uD83D\\uDE00\\q").unwrap();
        assert_eq!(props["my key=x"], "tab\there\u{e9}\u{1F600}q");
    }

    #[test]
    fn test_malformed_unicode_escape() {
        let err = parse("key=\\u00zz").unwrap_err();
        assert!(err.contains("Malformed \\uxxxx encoding"));
    }

    #[test]
    fn test_crlf_and_last_value_wins() {
        let props = parse("key=first\r\nkey=second\r\n").unwrap();
        assert_eq!(props["key"], "second");
    }

    #[test]
    fn test_latin1_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.properties");
        fs::write(&path, [b'k', b'=', 0xE9, 0xFF]).unwrap();

        let props = load_properties(&path).unwrap();
        assert_eq!(props["k"], "\u{e9}\u{ff}");

        let text = read_latin1(&path).unwrap();
        assert_eq!(encode_latin1(&text).unwrap(), vec![b'k', b'=', 0xE9, 0xFF]);
        assert_eq!(encode_latin1("\u{20ac}"), Err('\u{20ac}'));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Doesnt-Exist.properties");
        let err = load_properties(&path).unwrap_err();
        assert!(matches!(err, SecuredPropertiesError::PropertyFileUnreadable { .. }));
        assert!(err.to_string().contains("Doesnt-Exist.properties"));
    }
}
