//! In-place value replacement for `.properties` files.
//!
//! Only lines of the form `key<ws>=<ws>value` whose key is exactly the
//! target key are touched, and only when the value does not continue onto
//! the next line. Everything else, including line endings, is
//! written back byte for byte.

use crate::error::{Result, SecuredPropertiesError};
use crate::properties::{WHITESPACE, encode_latin1, ends_with_continuation, read_latin1};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::debug;

struct Replacement<'a> {
    key: &'a str,
    value: &'a str,
    pattern: Regex,
}

impl<'a> Replacement<'a> {
    fn new(key: &'a str, value: &'a str) -> std::result::Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"^{}((?-u:\s)*=(?-u:\s)*).*$", regex::escape(key)))?;
        Ok(Self { key, value, pattern })
    }

    fn apply(&self, line: &str) -> Option<String> {
        let separator = self.pattern.captures(line)?.get(1)?.as_str();
        Some(format!("{}{}{}", self.key, separator, self.value))
    }
}

/// Replaces the value on `line` if it assigns `key`, keeping the original
/// separator whitespace. Returns `None` when the line does not match.
pub fn replace_value(line: &str, key: &str, new_value: &str) -> Option<String> {
    Replacement::new(key, new_value).ok()?.apply(line)
}

/// Rewrites every assignment of the given keys in `path` and returns how
/// many lines changed.
///
/// The file is read completely, transformed in memory and written back in
/// one go; it is not rewritten at all when no line matched. Each line is
/// replaced by at most one pair, the first that matches.
pub fn replace_values<K, V>(path: &Path, replacements: &[(K, V)]) -> Result<usize>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let unwritable = |reason: String| SecuredPropertiesError::PropertyFileUnwritable {
        path: path.display().to_string(),
        reason,
    };

    let replacements = replacements
        .iter()
        .map(|(key, value)| Replacement::new(key.as_ref(), value.as_ref()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| unwritable(e.to_string()))?;

    let content = read_latin1(path)?;
    let mut output = String::with_capacity(content.len());
    let mut replaced = 0;
    let mut continuing = false;

    for segment in content.split_inclusive('\n') {
        let (line, ending) = split_line_ending(segment);
        let continues = continues_on_next_line(line, continuing);
        let new_line = if continuing || continues {
            None
        } else {
            replacements.iter().find_map(|r| r.apply(line))
        };
        continuing = continues;

        match new_line {
            Some(new_line) => {
                output.push_str(&new_line);
                replaced += 1;
            }
            None => output.push_str(line),
        }
        output.push_str(ending);
    }

    if replaced > 0 {
        let bytes = encode_latin1(&output)
            .map_err(|c| unwritable(format!("'{}' cannot be encoded as ISO-8859-1", c)))?;
        fs::write(path, bytes).map_err(|e| unwritable(e.to_string()))?;
    }
    debug!(path = %path.display(), replaced, "Replaced property values");
    Ok(replaced)
}

// Comment lines never continue, even when they end with a backslash.
fn continues_on_next_line(line: &str, continuing: bool) -> bool {
    if !continuing && line.trim_start_matches(WHITESPACE).starts_with(['#', '!']) {
        return false;
    }
    ends_with_continuation(line)
}

fn split_line_ending(segment: &str) -> (&str, &str) {
    if let Some(line) = segment.strip_suffix("\r\n") {
        (line, &segment[line.len()..])
    } else if let Some(line) = segment.strip_suffix('\n') {
        (line, &segment[line.len()..])
    } else {
        (segment, "")
    }
}
