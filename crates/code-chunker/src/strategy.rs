use crate::config::ChunkerConfig;

/// One piece of a region: `[start, end)`, where `[start, body_start)` is overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Piece {
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
}

/// Split quality, best last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    HardCut,
    LineBreak,
    Statement,
    BlankLine,
}

/// Splits `[start, end)` of `text` into pieces of at most `max_chunk_size` characters.
///
/// The first piece has no overlap and may use the whole budget. Later pieces start with up
/// to `overlap` characters copied from the end of the previous piece, so their new text is
/// limited to `max_chunk_size - overlap`.
pub(crate) fn split_region(
    text: &str,
    start: usize,
    end: usize,
    config: &ChunkerConfig,
) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut body_start = start;
    let mut prev_body_start = start;

    while body_start < end {
        let (piece_start, budget) = if pieces.is_empty() {
            (start, config.max_chunk_size)
        } else {
            let overlap_start = retreat_chars(text, body_start, config.overlap, prev_body_start);
            let carried = text[overlap_start..body_start].chars().count();
            (overlap_start, config.max_chunk_size - carried)
        };

        let window_end = advance_chars(text, body_start, budget, end);
        let cut = if window_end >= end {
            end
        } else {
            let floor = advance_chars(text, body_start, (budget / 4).max(1), window_end);
            best_boundary(text, floor, window_end)
        };

        pieces.push(Piece {
            start: piece_start,
            body_start,
            end: cut,
        });
        prev_body_start = body_start;
        body_start = cut;
    }

    pieces
}

/// Latest offset in `(floor, limit]` at the best available boundary kind
fn best_boundary(text: &str, floor: usize, limit: usize) -> usize {
    let mut best = (Boundary::HardCut, limit);

    for (rel, _) in text[floor..limit].match_indices('\n') {
        let newline = floor + rel;
        let cut = newline + 1;
        if cut > limit {
            break;
        }
        let line_start = text[..newline].rfind('\n').map_or(0, |pos| pos + 1);
        let kind = classify_line(&text[line_start..newline]);
        if kind >= best.0 {
            best = (kind, cut);
        }
    }

    best.1
}

/// Boundary quality of a cut placed right after this line
fn classify_line(line: &str) -> Boundary {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Boundary::BlankLine;
    }
    if trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*') {
        return Boundary::LineBreak;
    }
    match trimmed.as_bytes()[trimmed.len() - 1] {
        b';' | b'{' | b'}' | b',' | b':' | b')' => Boundary::Statement,
        _ => Boundary::LineBreak,
    }
}

/// Byte offset `n` characters after `from`, capped at `limit`
pub(crate) fn advance_chars(text: &str, from: usize, n: usize, limit: usize) -> usize {
    text[from..limit]
        .char_indices()
        .nth(n)
        .map_or(limit, |(i, _)| from + i)
}

/// Byte offset `n` characters before `from`, not earlier than `floor`
pub(crate) fn retreat_chars(text: &str, from: usize, n: usize, floor: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[floor..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(floor, |(i, _)| floor + i)
}
