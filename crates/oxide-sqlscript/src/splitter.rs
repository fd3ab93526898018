//! Statement splitter.

use crate::scan::{block_comment, delimiter_directive, line_comment, quoted_literal, skip_spaces};

/// The delimiter a script starts with.
pub const DEFAULT_DELIMITER: &str = ";";

/// Splits `input` into statements.
///
/// Statements are yielded trimmed, without their delimiter and with comments
/// removed. Empty statements (doubled delimiters, comment-only fragments) are
/// never yielded.
#[must_use]
pub const fn split(input: &str) -> Statements<'_> {
    Statements::new(input)
}

/// Lazy iterator over the statements of a script.
///
/// The iterator is restartable only by creating a new one; the active
/// delimiter lives in the iterator and starts as [`DEFAULT_DELIMITER`] for
/// every script.
#[derive(Debug, Clone)]
pub struct Statements<'a> {
    input: &'a str,
    pos: usize,
    delimiter: &'a str,
}

impl<'a> Statements<'a> {
    /// Creates an iterator positioned at the start of `input`.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// The delimiter currently in effect.
    #[must_use]
    pub const fn delimiter(&self) -> &'a str {
        self.delimiter
    }
}

fn finish(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

impl Iterator for Statements<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let bytes = self.input.as_bytes();
        // Text of the open statement that precedes `start`.
        let mut statement: Option<String> = None;
        let mut start = self.pos;

        while self.pos < bytes.len() {
            let rest = &bytes[self.pos..];

            if statement.is_none() {
                let n = skip_spaces(rest);
                if n > 0 {
                    self.pos += n;
                    continue;
                }
            }

            if rest.starts_with(self.delimiter.as_bytes()) {
                let end = self.pos;
                self.pos += self.delimiter.len();
                if let Some(mut text) = statement.take() {
                    text.push_str(&self.input[start..end]);
                    if let Some(text) = finish(&text) {
                        return Some(text);
                    }
                }
                continue;
            }

            if statement.is_none() {
                if let Some((token, n)) = delimiter_directive(rest) {
                    self.delimiter = &self.input[self.pos + token.start..self.pos + token.end];
                    self.pos += n;
                    continue;
                }
            }

            let comment = match line_comment(rest) {
                0 => block_comment(rest),
                n => n,
            };
            if comment > 0 {
                if let Some(text) = statement.as_mut() {
                    text.push_str(&self.input[start..self.pos]);
                    if !text.ends_with(|c: char| c.is_ascii_whitespace()) {
                        text.push(' ');
                    }
                }
                self.pos += comment;
                start = self.pos;
                continue;
            }

            if statement.is_none() {
                statement = Some(String::new());
                start = self.pos;
            }
            self.pos += quoted_literal(rest).max(1);
        }

        statement.and_then(|mut text| {
            text.push_str(&self.input[start..]);
            finish(&text)
        })
    }
}
