//! YAML subset parser producing a [`NodeTree`].
//!
//! Supports block mappings and sequences (including `- key: value` items and
//! sequences at the indentation of their parent key), plain and quoted
//! scalars, inline `{...}` / `[...]` collections, and literal/folded block
//! scalars. Duplicate mapping keys are kept in the tree; rejecting them is
//! the decoder's job, since only the decoder can say which type they were
//! meant for.

use std::str::CharIndices;

use crate::error::ParseError;
use crate::node::{NodeId, NodeTree, Tag};

const MAX_DOCUMENT_LINES: usize = 100_000;
const MAX_CONTAINER_DEPTH: usize = 64;
const MAX_COLLECTION_ITEMS: usize = 50_000;
const MAX_INLINE_VALUE_LEN: usize = 64 * 1024;

/// Parses a document into a node tree.
///
/// An empty document yields a single `!!null` root.
pub fn parse(input: &str) -> Result<NodeTree, ParseError> {
    let lines: Vec<Line<'_>> = input
        .lines()
        .enumerate()
        .map(|(i, raw)| Line {
            number: i + 1,
            raw,
            masked: 0,
        })
        .collect();

    if lines.len() > MAX_DOCUMENT_LINES {
        return Err(ParseError::new(
            MAX_DOCUMENT_LINES + 1,
            format!("document exceeds max supported line count ({MAX_DOCUMENT_LINES})"),
        ));
    }

    let mut parser = Parser {
        lines,
        idx: 0,
        tree: NodeTree::new(),
    };
    parser.document()?;
    Ok(parser.tree)
}

#[derive(Clone, Copy)]
struct Line<'a> {
    number: usize,
    raw: &'a str,
    /// Leading `- ` markers already consumed by an enclosing sequence;
    /// counted as indentation.
    masked: usize,
}

impl<'a> Line<'a> {
    fn indent(&self) -> usize {
        self.masked + leading_spaces(&self.raw[self.masked..])
    }

    fn text(&self) -> &'a str {
        &self.raw[self.indent()..]
    }

    fn is_ignorable(&self) -> bool {
        self.masked == 0 && is_ignorable(self.raw)
    }
}

#[derive(Clone, Copy)]
enum ChompingMode {
    Clip,
    Strip,
    Keep,
}

#[derive(Clone, Copy)]
struct BlockScalarHeader {
    folded: bool,
    chomping: ChompingMode,
    explicit_indent: Option<usize>,
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    idx: usize,
    tree: NodeTree,
}

impl<'a> Parser<'a> {
    fn document(&mut self) -> Result<(), ParseError> {
        if self.peek().is_some_and(|line| line.raw.trim() == "---") {
            self.idx += 1;
        }

        let Some(first) = self.peek() else {
            self.tree.push(None, Tag::Null, "", 1, 1);
            return Ok(());
        };

        self.block(None, first.indent(), 0)?;

        if let Some(line) = self.peek() {
            if line.raw.trim() != "..." {
                return Err(ParseError::new(
                    line.number,
                    "did not find expected <document end>",
                ));
            }
        }
        Ok(())
    }

    /// Next non-ignorable line, skipping blanks and comments.
    fn peek(&mut self) -> Option<Line<'a>> {
        while self.idx < self.lines.len() && self.lines[self.idx].is_ignorable() {
            self.idx += 1;
        }
        self.lines.get(self.idx).copied()
    }

    fn block(
        &mut self,
        parent: Option<NodeId>,
        indent: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        let Some(line) = self.peek() else {
            let number = self.lines.last().map_or(1, |l| l.number);
            return Ok(self.tree.push(parent, Tag::Null, "", number, indent + 1));
        };

        if depth > MAX_CONTAINER_DEPTH {
            return Err(ParseError::new(
                line.number,
                format!("maximum nesting depth exceeded ({MAX_CONTAINER_DEPTH})"),
            ));
        }

        let current_indent = line.indent();
        if current_indent != indent {
            return Err(ParseError::new(
                line.number,
                format!("unexpected indentation: expected {indent}, found {current_indent}"),
            ));
        }

        let text = line.text();
        if is_sequence_entry(text) {
            self.sequence(parent, indent, depth)
        } else if find_mapping_colon(text).is_some() {
            self.mapping(parent, indent, depth)
        } else {
            self.idx += 1;
            self.inline(parent, text, line.number, indent + 1, depth + 1)
        }
    }

    fn mapping(
        &mut self,
        parent: Option<NodeId>,
        indent: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        let first_line = self.lines[self.idx].number;
        let map = self.tree.push(parent, Tag::Map, "", first_line, indent + 1);
        let mut entries = 0usize;

        while let Some(line) = self.peek() {
            let current_indent = line.indent();
            if current_indent < indent {
                break;
            }
            if current_indent > indent {
                return Err(ParseError::new(
                    line.number,
                    format!("unexpected indentation in mapping: expected {indent}"),
                ));
            }

            let text = line.text();
            if is_sequence_entry(text) {
                return Err(ParseError::new(line.number, "mixed sequence/mapping"));
            }

            let colon = find_mapping_colon(text)
                .ok_or_else(|| ParseError::new(line.number, "could not find expected ':'"))?;
            let (key, key_tag) = parse_key(&text[..colon], line.number)?;
            self.tree.push(Some(map), key_tag, key, line.number, indent + 1);

            let value_raw = text[colon + 1..].trim_start();
            let column = line.raw.len() - value_raw.len() + 1;
            self.idx += 1;
            self.value(map, value_raw, line, indent, column, depth, true)?;

            entries += 1;
            if entries > MAX_COLLECTION_ITEMS {
                return Err(ParseError::new(
                    line.number,
                    format!("mapping exceeds max item count ({MAX_COLLECTION_ITEMS})"),
                ));
            }
        }

        Ok(map)
    }

    fn sequence(
        &mut self,
        parent: Option<NodeId>,
        indent: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        let first_line = self.lines[self.idx].number;
        let seq = self.tree.push(parent, Tag::Seq, "", first_line, indent + 1);
        let mut items = 0usize;

        while let Some(line) = self.peek() {
            let current_indent = line.indent();
            if current_indent < indent {
                break;
            }
            if current_indent > indent {
                return Err(ParseError::new(
                    line.number,
                    format!("unexpected indentation in sequence: expected {indent}"),
                ));
            }

            let text = line.text();
            if !is_sequence_entry(text) {
                break;
            }

            let rest = text[1..].trim_start();
            let offset = line.raw.len() - rest.len();
            let nested_block = !strip_inline_comment(rest).is_empty()
                && (is_sequence_entry(rest) || find_mapping_colon(rest).is_some());

            if nested_block {
                // Re-read the same line as a block starting after the dash.
                self.lines[self.idx].masked = offset;
                self.block(Some(seq), offset, depth + 1)?;
            } else {
                self.idx += 1;
                self.value(seq, rest, line, indent, offset + 1, depth, false)?;
            }

            items += 1;
            if items > MAX_COLLECTION_ITEMS {
                return Err(ParseError::new(
                    line.number,
                    format!("sequence exceeds max item count ({MAX_COLLECTION_ITEMS})"),
                ));
            }
        }

        Ok(seq)
    }

    /// Value following `key:` or `- `. `compact_sequence` allows a sequence
    /// at the parent's own indentation, as in `key:\n- a`.
    #[allow(clippy::too_many_arguments)]
    fn value(
        &mut self,
        parent: NodeId,
        raw: &'a str,
        line: Line<'a>,
        indent: usize,
        column: usize,
        depth: usize,
        compact_sequence: bool,
    ) -> Result<NodeId, ParseError> {
        if strip_inline_comment(raw).is_empty() {
            return match self.peek() {
                Some(next) if next.indent() > indent => {
                    self.block(Some(parent), next.indent(), depth + 1)
                }
                Some(next)
                    if compact_sequence
                        && next.indent() == indent
                        && is_sequence_entry(next.text()) =>
                {
                    self.sequence(Some(parent), indent, depth + 1)
                }
                _ => Ok(self.tree.push(Some(parent), Tag::Null, "", line.number, column)),
            };
        }

        if let Some(header) = parse_block_scalar_header(raw, line.number)? {
            let text = self.block_scalar(indent, header);
            return Ok(self.tree.push(Some(parent), Tag::Str, text, line.number, column));
        }

        self.inline(Some(parent), raw, line.number, column, depth + 1)
    }

    fn inline(
        &mut self,
        parent: Option<NodeId>,
        raw: &str,
        line: usize,
        column: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        if depth > MAX_CONTAINER_DEPTH {
            return Err(ParseError::new(
                line,
                format!("maximum nesting depth exceeded ({MAX_CONTAINER_DEPTH})"),
            ));
        }
        if raw.len() > MAX_INLINE_VALUE_LEN {
            return Err(ParseError::new(
                line,
                format!("inline value exceeds max length ({MAX_INLINE_VALUE_LEN})"),
            ));
        }

        let s = raw.trim();
        if s.starts_with('"') || s.starts_with('\'') {
            let (value, rest) = parse_quoted(s, line)?;
            if !strip_inline_comment(rest.trim()).is_empty() {
                return Err(ParseError::new(
                    line,
                    format!("unexpected content after quoted scalar '{}'", rest.trim()),
                ));
            }
            return Ok(self.tree.push(parent, Tag::Str, value, line, column));
        }

        let s = strip_inline_comment(s);
        if s.starts_with('{') {
            return self.flow_mapping(parent, s, line, column, depth);
        }
        if s.starts_with('[') {
            return self.flow_sequence(parent, s, line, column, depth);
        }

        Ok(self.tree.push(parent, resolve_plain(s), s, line, column))
    }

    fn flow_mapping(
        &mut self,
        parent: Option<NodeId>,
        raw: &str,
        line: usize,
        column: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        let Some(inner) = raw.strip_prefix('{').and_then(|v| v.strip_suffix('}')) else {
            return Err(ParseError::new(
                line,
                format!("invalid inline object syntax '{raw}': missing braces"),
            ));
        };

        let map = self.tree.push(parent, Tag::Map, "", line, column);
        let mut entries = 0usize;
        for (offset, part) in split_top_level(inner, ',') {
            let p = part.trim();
            if p.is_empty() {
                continue;
            }
            let part_column = column + 1 + offset + (part.len() - part.trim_start().len());
            let colon = find_unquoted_colon(p).ok_or_else(|| {
                ParseError::new(line, format!("invalid inline object entry '{p}': expected ':'"))
            })?;

            let (key, key_tag) = parse_key(&p[..colon], line)?;
            self.tree.push(Some(map), key_tag, key, line, part_column);

            let value_raw = &p[colon + 1..];
            let value_column =
                part_column + colon + 1 + (value_raw.len() - value_raw.trim_start().len());
            self.inline(Some(map), value_raw, line, value_column, depth + 1)?;

            entries += 1;
            if entries > MAX_COLLECTION_ITEMS {
                return Err(ParseError::new(
                    line,
                    format!("inline object exceeds max item count ({MAX_COLLECTION_ITEMS})"),
                ));
            }
        }

        Ok(map)
    }

    fn flow_sequence(
        &mut self,
        parent: Option<NodeId>,
        raw: &str,
        line: usize,
        column: usize,
        depth: usize,
    ) -> Result<NodeId, ParseError> {
        let Some(inner) = raw.strip_prefix('[').and_then(|v| v.strip_suffix(']')) else {
            return Err(ParseError::new(
                line,
                format!("invalid inline array syntax '{raw}': missing brackets"),
            ));
        };

        let seq = self.tree.push(parent, Tag::Seq, "", line, column);
        let mut items = 0usize;
        for (offset, part) in split_top_level(inner, ',') {
            let p = part.trim();
            if p.is_empty() {
                continue;
            }
            let item_column = column + 1 + offset + (part.len() - part.trim_start().len());
            self.inline(Some(seq), p, line, item_column, depth + 1)?;

            items += 1;
            if items > MAX_COLLECTION_ITEMS {
                return Err(ParseError::new(
                    line,
                    format!("inline array exceeds max item count ({MAX_COLLECTION_ITEMS})"),
                ));
            }
        }

        Ok(seq)
    }

    fn block_scalar(&mut self, parent_indent: usize, header: BlockScalarHeader) -> String {
        let mut content = Vec::<String>::new();
        let mut content_indent = header.explicit_indent.map(|v| parent_indent + v);

        while self.idx < self.lines.len() {
            let line = self.lines[self.idx];
            let indent = line.indent();
            let text = &line.raw[indent..];

            if text.trim().is_empty() {
                content.push(String::new());
                self.idx += 1;
                continue;
            }

            let effective_indent = match content_indent {
                Some(v) => v,
                None => {
                    if indent <= parent_indent {
                        break;
                    }
                    content_indent = Some(indent);
                    indent
                }
            };

            if indent < effective_indent {
                break;
            }

            content.push(line.raw[effective_indent..].to_string());
            self.idx += 1;
        }

        // Blank lines swallowed at the end belong to whatever follows.
        let mut trailing_blank = 0usize;
        for line in content.iter().rev() {
            if line.is_empty() {
                trailing_blank += 1;
            } else {
                break;
            }
        }
        let body = &content[..content.len() - trailing_blank];

        let mut rendered = if header.folded {
            fold_block_lines(body)
        } else {
            body.join("\n")
        };

        match header.chomping {
            ChompingMode::Strip => {}
            ChompingMode::Clip if body.is_empty() => {}
            ChompingMode::Clip => rendered.push('\n'),
            ChompingMode::Keep => {
                for _ in 0..=trailing_blank {
                    rendered.push('\n');
                }
            }
        }

        rendered
    }
}

fn is_sequence_entry(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn resolve_plain(text: &str) -> Tag {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => Tag::Null,
        "true" | "True" | "TRUE" | "false" | "False" | "FALSE" => Tag::Bool,
        _ if text.parse::<i64>().is_ok() || text.parse::<u64>().is_ok() => Tag::Int,
        _ if looks_numeric(text) && text.parse::<f64>().is_ok_and(f64::is_finite) => Tag::Float,
        _ => Tag::Str,
    }
}

// Rust accepts `inf` and `NaN` as floats; YAML plain scalars do not.
fn looks_numeric(text: &str) -> bool {
    text.trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && text.chars().any(|c| c.is_ascii_digit())
}

fn parse_key(raw: &str, line: usize) -> Result<(String, Tag), ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new(line, "empty mapping key"));
    }

    if trimmed.starts_with('"') || trimmed.starts_with('\'') {
        let (key, rest) = parse_quoted(trimmed, line)?;
        if !rest.trim().is_empty() {
            return Err(ParseError::new(
                line,
                format!("unexpected content after quoted key '{}'", rest.trim()),
            ));
        }
        return Ok((key, Tag::Str));
    }

    Ok((trimmed.to_string(), resolve_plain(trimmed)))
}

/// Decodes a quoted scalar at the start of `raw`, returning the value and
/// whatever follows the closing quote.
fn parse_quoted(raw: &str, line: usize) -> Result<(String, &str), ParseError> {
    let mut chars = raw.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('"' | '\''))) => q,
        _ => {
            return Err(ParseError::new(
                line,
                format!("invalid quoted string '{raw}': missing quote"),
            ))
        }
    };

    let mut out = String::new();
    let mut escaped = false;
    while let Some((i, ch)) = chars.next() {
        if escaped {
            out.push(unescape(ch, &mut chars, line)?);
            escaped = false;
            continue;
        }

        if quote == '"' && ch == '\\' {
            escaped = true;
            continue;
        }

        if ch == quote {
            // `''` inside single quotes is a literal quote.
            if quote == '\'' && raw[i + 1..].starts_with('\'') {
                chars.next();
                out.push('\'');
                continue;
            }
            return Ok((out, &raw[i + 1..]));
        }

        out.push(ch);
    }

    Err(ParseError::new(
        line,
        format!("unterminated quoted string '{raw}': missing closing quote"),
    ))
}

/// Resolves a double-quoted escape; `ch` is the character after the backslash.
fn unescape(ch: char, chars: &mut CharIndices<'_>, line: usize) -> Result<char, ParseError> {
    let width = match ch {
        '0' => return Ok('\0'),
        'a' => return Ok('\x07'),
        'b' => return Ok('\x08'),
        't' | '\t' => return Ok('\t'),
        'n' => return Ok('\n'),
        'v' => return Ok('\x0b'),
        'f' => return Ok('\x0c'),
        'r' => return Ok('\r'),
        'e' => return Ok('\x1b'),
        ' ' | '"' | '/' | '\\' => return Ok(ch),
        'N' => return Ok('\u{85}'),
        '_' => return Ok('\u{a0}'),
        'L' => return Ok('\u{2028}'),
        'P' => return Ok('\u{2029}'),
        'x' => 2,
        'u' => 4,
        'U' => 8,
        other => {
            return Err(ParseError::new(
                line,
                format!("found unknown escape character '{other}' while parsing a quoted scalar"),
            ))
        }
    };

    let digits: String = chars.by_ref().take(width).map(|(_, c)| c).collect();
    let code = if digits.len() == width && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    } else {
        None
    };
    code.ok_or_else(|| {
        ParseError::new(
            line,
            format!("invalid escape code '\\{ch}{digits}' while parsing a quoted scalar"),
        )
    })
}

fn closing_quote(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    let mut escaped = false;
    while let Some((i, ch)) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        if quote == '"' && ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == quote {
            if quote == '\'' && text[i + 1..].starts_with('\'') {
                chars.next();
                continue;
            }
            return Some(i);
        }
    }
    None
}

/// Position of the `:` that separates a block mapping key from its value:
/// the first colon followed by whitespace or end of line, outside a quoted
/// key and before any comment.
fn find_mapping_colon(text: &str) -> Option<usize> {
    let start = match text.chars().next()? {
        '"' | '\'' => closing_quote(text)? + 1,
        '{' | '[' | '#' => return None,
        _ => 0,
    };

    let mut prev = ' ';
    for (i, ch) in text[start..].char_indices() {
        let at = start + i;
        match ch {
            ':' => {
                let next = text[at + 1..].chars().next();
                if next.map_or(true, char::is_whitespace) {
                    return Some(at);
                }
            }
            '#' if prev.is_whitespace() => return None,
            _ => {}
        }
        prev = ch;
    }
    None
}

fn find_unquoted_colon(input: &str) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    let mut depth_brace = 0i32;
    let mut depth_bracket = 0i32;
    let mut escape = false;

    for (i, ch) in input.char_indices() {
        if in_double && escape {
            escape = false;
            continue;
        }

        if in_double && ch == '\\' {
            escape = true;
            continue;
        }

        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '{' if !in_single && !in_double => depth_brace += 1,
            '}' if !in_single && !in_double => depth_brace -= 1,
            '[' if !in_single && !in_double => depth_bracket += 1,
            ']' if !in_single && !in_double => depth_bracket -= 1,
            ':' if !in_single && !in_double && depth_brace == 0 && depth_bracket == 0 => {
                return Some(i)
            }
            _ => {}
        }
    }

    None
}

/// Splits on `delimiter` outside quotes and nested brackets, returning each
/// part with its byte offset in `input`.
fn split_top_level(input: &str, delimiter: char) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;

    for (i, ch) in input.char_indices() {
        if in_double && escape {
            escape = false;
            continue;
        }

        match ch {
            '\\' if in_double => escape = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '{' | '[' if !in_single && !in_double => depth += 1,
            '}' | ']' if !in_single && !in_double => depth -= 1,
            c if c == delimiter && !in_single && !in_double && depth == 0 => {
                out.push((start, &input[start..i]));
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    out.push((start, &input[start..]));
    out
}

fn parse_block_scalar_header(
    raw: &str,
    line: usize,
) -> Result<Option<BlockScalarHeader>, ParseError> {
    let s = strip_inline_comment(raw).trim();
    let mut chars = s.chars();
    let Some(style @ ('|' | '>')) = chars.next() else {
        return Ok(None);
    };

    let mut chomping = ChompingMode::Clip;
    let mut explicit_indent: Option<usize> = None;

    for ch in chars {
        match ch {
            '+' => chomping = ChompingMode::Keep,
            '-' => chomping = ChompingMode::Strip,
            '1'..='9' => explicit_indent = Some((ch as u8 - b'0') as usize),
            c if c.is_whitespace() => break,
            _ => {
                return Err(ParseError::new(
                    line,
                    format!("invalid block scalar header '{raw}'"),
                ));
            }
        }
    }

    Ok(Some(BlockScalarHeader {
        folded: style == '>',
        chomping,
        explicit_indent,
    }))
}

fn fold_block_lines(lines: &[String]) -> String {
    let Some(first) = lines.first() else {
        return String::new();
    };

    let mut out = first.clone();
    for pair in lines.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.is_empty() {
            out.push('\n');
        } else if prev.is_empty() {
            out.push_str(cur);
        } else {
            out.push(' ');
            out.push_str(cur);
        }
    }
    out
}

fn strip_inline_comment(input: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;

    for (i, ch) in input.char_indices() {
        if in_double && escape {
            escape = false;
            continue;
        }

        if in_double && ch == '\\' {
            escape = true;
            continue;
        }

        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => {
                if i == 0 {
                    return "";
                }
                let prev = input[..i].chars().last().unwrap_or(' ');
                if prev.is_whitespace() {
                    return input[..i].trim_end();
                }
            }
            _ => {}
        }
    }

    input.trim_end()
}

fn leading_spaces(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
