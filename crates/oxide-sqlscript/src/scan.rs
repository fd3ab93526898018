//! Recognizers for the lexical pieces of a SQL script.
//!
//! Each recognizer looks at the start of its input and returns the number of
//! bytes it covers, or 0 when the input does not start with that piece.

use core::ops::Range;

const DELIMITER_COMMAND: &[u8] = b"DELIMITER";

const fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t')
}

/// Length of the leading run of whitespace.
pub fn skip_spaces(input: &[u8]) -> usize {
    input
        .iter()
        .position(|&c| !matches!(c, b' ' | b'\t' | b'\r' | b'\n'))
        .unwrap_or(input.len())
}

/// Length of a `-- ...` comment, including its terminating newline.
pub fn line_comment(input: &[u8]) -> usize {
    if !input.starts_with(b"--") {
        return 0;
    }
    input[2..]
        .iter()
        .position(|&c| c == b'\n')
        .map_or(input.len(), |i| i + 3)
}

/// Length of a `/* ... */` comment. Comments do not nest; an unterminated
/// comment runs to the end of the input.
pub fn block_comment(input: &[u8]) -> usize {
    if !input.starts_with(b"/*") {
        return 0;
    }
    input[2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(input.len(), |i| i + 4)
}

/// Length of a quoted literal opened by `'`, `"` or `` ` ``.
///
/// A backslash escapes the next byte. An unterminated literal runs to the end
/// of the input.
pub fn quoted_literal(input: &[u8]) -> usize {
    let Some(&quote) = input.first() else {
        return 0;
    };
    if !matches!(quote, b'\'' | b'"' | b'`') {
        return 0;
    }
    let mut i = 1;
    while i < input.len() {
        match input[i] {
            c if c == quote => return i + 1,
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    input.len()
}

/// Length of the `DELIMITER ` / `\d` prefix plus the blanks after it.
fn directive_prefix(input: &[u8]) -> usize {
    let command = DELIMITER_COMMAND.len();
    let mut p = if input.starts_with(b"\\d") {
        2
    } else if input.len() > command + 1
        && input[..command].eq_ignore_ascii_case(DELIMITER_COMMAND)
        && is_blank(input[command])
    {
        command + 1
    } else {
        return 0;
    };
    while p < input.len() && is_blank(input[p]) {
        p += 1;
    }
    p
}

/// Recognizes a delimiter-change directive.
///
/// Returns the byte range of the new delimiter and the number of bytes the
/// directive covers. The directive only looks at the rest of its line. A
/// quoted token loses both quotes; an unterminated quote takes the rest of
/// the line after the opening quote. Directives yielding an empty delimiter
/// are not directives.
pub fn delimiter_directive(input: &[u8]) -> Option<(Range<usize>, usize)> {
    let p = directive_prefix(input);
    if p == 0 {
        return None;
    }

    let rest = &input[p..];
    let line = &rest[..rest.iter().position(|&c| c == b'\n').unwrap_or(rest.len())];

    let (token, len) = match quoted_literal(line) {
        0 => {
            let end = line
                .iter()
                .position(|&c| matches!(c, b' ' | b'\t' | b'\r'))
                .unwrap_or(line.len());
            (0..end, end)
        }
        n if n >= 2 && line[n - 1] == line[0] => (1..n - 1, n),
        n => (1..n, n),
    };
    if token.is_empty() {
        return None;
    }

    Some((p + token.start..p + token.end, p + len))
}
