//! Lexical scanner shared by the analyzer and the chunker.
//!
//! The scanner never parses. It classifies each byte as code or non-code (comment, string
//! literal) with a small state machine and answers bracket-depth questions on top of that.
//! Confidence limits: regex literals, nested template-literal substitutions and heredocs are
//! treated as plain code or plain string, so braces inside them can skew depth. Unbalanced
//! input degrades to "the statement runs to end of file", never to an error.

use crate::language::Language;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(u8),
    TripleStr(u8),
}

/// Byte-level code/non-code map of one file
pub(crate) struct CodeMap<'a> {
    text: &'a str,
    code: Vec<bool>,
    line_starts: Vec<usize>,
    language: Language,
}

impl<'a> CodeMap<'a> {
    pub(crate) fn new(text: &'a str, language: Language) -> Self {
        let bytes = text.as_bytes();
        let mut code = vec![false; bytes.len()];
        let mut line_starts = vec![0];
        let mut state = State::Code;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\n' {
                line_starts.push(i + 1);
            }
            match state {
                State::Code => {
                    let next = bytes.get(i + 1).copied();
                    if b == b'/' && next == Some(b'/') {
                        state = State::LineComment;
                    } else if b == b'/' && next == Some(b'*') {
                        state = State::BlockComment;
                        i += 2;
                        continue;
                    } else if b == b'#' && language.hash_comments() {
                        state = State::LineComment;
                    } else if (b == b'"' || b == b'\'') && language.is_indent_scoped() {
                        if bytes.get(i + 1) == Some(&b) && bytes.get(i + 2) == Some(&b) {
                            state = State::TripleStr(b);
                            i += 3;
                            continue;
                        }
                        state = State::Str(b);
                    } else if b == b'\'' && !language.single_quote_strings() {
                        // Rust: char literal or lifetime
                        let skip = char_literal_len(&text[i..]);
                        if skip > 0 {
                            i += skip;
                            continue;
                        }
                        code[i] = true;
                    } else if b == b'"' || b == b'\'' || b == b'`' {
                        state = State::Str(b);
                    } else {
                        code[i] = true;
                    }
                }
                State::LineComment => {
                    if b == b'\n' {
                        code[i] = true;
                        state = State::Code;
                    }
                }
                State::BlockComment => {
                    if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        state = State::Code;
                        i += 2;
                        continue;
                    }
                }
                State::Str(quote) => {
                    if b == b'\\' {
                        if bytes.get(i + 1) == Some(&b'\n') {
                            line_starts.push(i + 2);
                        }
                        i += 2;
                        continue;
                    }
                    if b == quote {
                        state = State::Code;
                    } else if b == b'\n' && quote != b'`' {
                        // Unterminated single-line string: recover at end of line.
                        code[i] = true;
                        state = State::Code;
                    }
                }
                State::TripleStr(quote) => {
                    if b == b'\\' {
                        if bytes.get(i + 1) == Some(&b'\n') {
                            line_starts.push(i + 2);
                        }
                        i += 2;
                        continue;
                    }
                    if b == quote
                        && bytes.get(i + 1) == Some(&quote)
                        && bytes.get(i + 2) == Some(&quote)
                    {
                        state = State::Code;
                        i += 3;
                        continue;
                    }
                }
            }
            i += 1;
        }

        Self {
            text,
            code,
            line_starts,
            language,
        }
    }

    pub(crate) fn text(&self) -> &'a str {
        self.text
    }

    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    pub(crate) fn is_code(&self, offset: usize) -> bool {
        self.code.get(offset).copied().unwrap_or(false)
    }

    pub(crate) fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub(crate) fn line_start(&self, line: usize) -> usize {
        self.line_starts[line]
    }

    /// Offset just past the line's newline (or end of text)
    pub(crate) fn line_end(&self, line: usize) -> usize {
        self.line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len())
    }

    /// Zero-based line index containing `offset`
    pub(crate) fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }

    /// Line text without its trailing newline
    pub(crate) fn line_text(&self, line: usize) -> &'a str {
        let start = self.line_start(line);
        let end = self.line_end(line);
        self.text[start..end].trim_end_matches(['\n', '\r'])
    }

    /// Bracket depth (all of `({[`) in effect at the start of every line
    pub(crate) fn depth_at_line_starts(&self) -> Vec<usize> {
        let bytes = self.text.as_bytes();
        let mut depths = Vec::with_capacity(self.line_starts.len());
        let mut depth = 0usize;
        let mut line = 0;
        depths.push(0);
        for (i, b) in bytes.iter().enumerate() {
            if self.code[i] {
                match b {
                    b'(' | b'[' | b'{' => depth += 1,
                    b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            if *b == b'\n' {
                line += 1;
                if line < self.line_starts.len() {
                    depths.push(depth);
                }
            }
        }
        depths
    }

    /// End offset of the declaration statement starting at `start`.
    ///
    /// The statement ends at a top-level `;` (plus the rest of its line when that is only
    /// whitespace or comment), or at a top-level newline that is not continued by the last
    /// token of the line or the first token of the next code line. With `require_block`,
    /// newlines only terminate once a `{` block has been opened.
    pub(crate) fn statement_end(&self, start: usize, require_block: bool) -> usize {
        let bytes = self.text.as_bytes();
        let mut depth = 0usize;
        let mut block_seen = false;
        let mut i = start;
        while i < bytes.len() {
            if !self.code[i] {
                i += 1;
                continue;
            }
            match bytes[i] {
                b'{' => {
                    depth += 1;
                    block_seen = true;
                }
                b'(' | b'[' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b';' if depth == 0 => return self.rest_of_line_if_trivial(i + 1),
                b'\n'
                    if depth == 0
                        && (block_seen || !require_block)
                        && !self.line_continues(i) =>
                {
                    return i + 1
                }
                _ => {}
            }
            i += 1;
        }
        bytes.len()
    }

    /// End offset of an indentation-scoped block whose header is on `header_line`
    pub(crate) fn indented_block_end(&self, header_line: usize) -> usize {
        let mut last = header_line;
        for line in header_line + 1..self.line_count() {
            let text = self.line_text(line);
            let trimmed = text.trim_start();
            if trimmed.is_empty() {
                continue;
            }
            let first = self.line_start(line) + (text.len() - trimmed.len());
            let indented = text.len() != trimmed.len();
            let inside_string = !self.is_code(first) && !trimmed.starts_with('#');
            let closer = trimmed.starts_with([')', ']', '}']);
            if indented || inside_string || closer {
                last = line;
                continue;
            }
            break;
        }
        self.line_end(last)
    }

    /// Deepest `{` nesting inside `[start, end)`, or indentation levels for indent-scoped code
    pub(crate) fn max_nesting(&self, start: usize, end: usize) -> usize {
        if self.language.is_indent_scoped() {
            let first = self.line_of(start);
            let last = self.line_of(end.saturating_sub(1).max(start));
            return (first..=last)
                .map(|line| self.line_text(line))
                .filter(|text| !text.trim().is_empty())
                .map(|text| text.len() - text.trim_start().len())
                .max()
                .unwrap_or(0)
                / 4;
        }
        let bytes = self.text.as_bytes();
        let mut depth = 0usize;
        let mut max = 0usize;
        for i in start..end.min(bytes.len()) {
            if !self.code[i] {
                continue;
            }
            match bytes[i] {
                b'{' => {
                    depth += 1;
                    max = max.max(depth);
                }
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        max
    }

    /// Code bytes of `[start, end)` with comments and string bodies blanked out
    pub(crate) fn code_text(&self, start: usize, end: usize) -> String {
        let bytes: Vec<u8> = self.text.as_bytes()[start..end]
            .iter()
            .enumerate()
            .map(|(i, b)| {
                if self.code[start + i] || *b == b'\n' {
                    *b
                } else {
                    b' '
                }
            })
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn rest_of_line_if_trivial(&self, from: usize) -> usize {
        let bytes = self.text.as_bytes();
        let mut i = from;
        while i < bytes.len() {
            if bytes[i] == b'\n' {
                return i + 1;
            }
            if self.code[i] && !bytes[i].is_ascii_whitespace() {
                return from;
            }
            i += 1;
        }
        bytes.len()
    }

    fn line_continues(&self, newline: usize) -> bool {
        const TRAILING: &[u8] = b"=,(:[{.?+-*/&|<>!";
        const LEADING: &[u8] = b".?:{&|=+";

        let bytes = self.text.as_bytes();
        let line_start = self.line_start(self.line_of(newline));
        let last = (line_start..newline)
            .rev()
            .find(|&i| self.code[i] && !bytes[i].is_ascii_whitespace());
        match last {
            Some(i) if TRAILING.contains(&bytes[i]) => return true,
            Some(_) => {}
            // Blank or comment-only line: keep going until real code decides.
            None => return true,
        }

        let next = (newline + 1..bytes.len())
            .find(|&i| self.code[i] && !bytes[i].is_ascii_whitespace());
        next.is_some_and(|i| LEADING.contains(&bytes[i]))
    }
}

/// Byte length of a Rust char literal at the start of `rest`, 0 for a lifetime
fn char_literal_len(rest: &str) -> usize {
    let mut chars = rest.char_indices().skip(1);
    match chars.next() {
        Some((_, '\\')) => rest
            .get(3..)
            .and_then(|tail| tail.find('\''))
            .filter(|pos| *pos <= 10)
            .map_or(0, |pos| pos + 4),
        Some((_, c)) => {
            let after = 1 + c.len_utf8();
            if rest.as_bytes().get(after) == Some(&b'\'') {
                after + 1
            } else {
                0
            }
        }
        None => 0,
    }
}
