// src/core/minify/tokens.rs
//! Flat token stream over a parsed document, used by the text-level passes.

use std::collections::HashSet;
use std::ops::Range;
use tree_sitter::Node;

use crate::core::parser::{self, SyntaxDocument};

/// Literals kept as a single atom; their inner text is never touched
const ATOMIC_LITERALS: &[&str] = &[
    "string_literal",
    "verbatim_string_literal",
    "raw_string_literal",
    "interpolated_string_expression",
    "character_literal",
];

/// Character pairs that lex differently when written without a space
const FUSING_PAIRS: &[&str] = &[
    "++", "--", "&&", "||", "==", "!=", "<=", ">=", "<<", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "=>", "->", "??", "::", "//", "/*", "*/", "?.", "?[", "..",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers, keywords and numbers
    Word,
    Punct,
    Literal,
    Comment,
    /// A whole preprocessor line
    Directive,
    /// Source text the tree has no leaf for
    Opaque,
    /// A whole preserve region
    Preserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range<usize>,
}

impl Token {
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.range.clone()]
    }

    /// Must sit on a line of its own
    pub fn owns_line(&self) -> bool {
        matches!(self.kind, TokenKind::Directive | TokenKind::Preserved)
    }

    fn is_wordy(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Literal)
    }
}

/// Tokens of a document in source order
///
/// Preserve spans and preprocessor lines become single tokens; everything
/// else comes from the leaves of the syntax tree.
pub fn tokenize(document: &SyntaxDocument, preserve: &[Range<usize>]) -> Vec<Token> {
    let text = document.text();

    let mut leaves = Vec::new();
    // starts of leaves already folded into a preceding `?`
    let mut absorbed = HashSet::new();
    parser::walk(document.root(), &mut |node| {
        let range = node.byte_range();
        let kind = node.kind();
        if parser::is_comment(kind) {
            leaves.push(Token { kind: TokenKind::Comment, range });
            return false;
        }
        if ATOMIC_LITERALS.contains(&kind) {
            leaves.push(Token { kind: TokenKind::Literal, range });
            return false;
        }
        if node.child_count() == 0 {
            if absorbed.contains(&range.start) {
                return false;
            }
            let mut range = range;
            if let Some(end) = conditional_access_end(node) {
                absorbed.insert(range.end);
                range.end = end;
            }
            if !text[range.clone()].trim().is_empty() {
                let kind = classify(&text[range.clone()]);
                leaves.push(Token { kind, range });
            }
            return false;
        }
        true
    });
    leaves.sort_by_key(|t| t.range.start);

    let preserved: Vec<Range<usize>> = preserve
        .iter()
        .map(|span| skip_indent(text, span.clone()))
        .filter(|span| !span.is_empty())
        .collect();
    let directives: Vec<Range<usize>> = directive_lines(text, &leaves)
        .into_iter()
        .filter(|line| !preserved.iter().any(|p| overlaps(p, line)))
        .collect();

    let mut tokens: Vec<Token> = leaves
        .into_iter()
        .filter(|t| !preserved.iter().chain(directives.iter()).any(|r| overlaps(r, &t.range)))
        .collect();
    tokens.extend(preserved.into_iter().map(|range| Token { kind: TokenKind::Preserved, range }));
    tokens.extend(directives.into_iter().map(|range| Token { kind: TokenKind::Directive, range }));
    tokens.sort_by_key(|t| t.range.start);

    with_opaque_gaps(text, tokens)
}

/// Whether two adjacent tokens need a space to keep their meaning
pub fn needs_space(source: &str, left: &Token, right: &Token) -> bool {
    if left.kind == TokenKind::Opaque || right.kind == TokenKind::Opaque {
        return true;
    }
    if left.is_wordy() && right.is_wordy() {
        return true;
    }
    let (Some(last), Some(first)) = (left.text(source).chars().last(), right.text(source).chars().next()) else {
        return false;
    };
    // closing generic argument lists
    if last == '>' && first == '>' {
        return false;
    }
    let pair: String = [last, first].iter().collect();
    FUSING_PAIRS.contains(&pair.as_str())
}

/// End of the `.` or `[` directly after the `?` of a conditional access,
/// so `?.` and `?[` become one token
fn conditional_access_end(node: Node<'_>) -> Option<usize> {
    if node.kind() != "?" || node.parent()?.kind() != "conditional_access_expression" {
        return None;
    }
    let mut next = node.next_sibling()?;
    while let Some(first) = next.child(0) {
        next = first;
    }
    (next.start_byte() == node.end_byte()).then(|| next.end_byte())
}

fn classify(text: &str) -> TokenKind {
    match text.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' || c == '@' => TokenKind::Word,
        _ => TokenKind::Punct,
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn skip_indent(text: &str, range: Range<usize>) -> Range<usize> {
    let indent = text[range.clone()].len() - text[range.clone()].trim_start().len();
    range.start + indent..range.end
}

/// Lines starting with `#` outside literals and comments
fn directive_lines(text: &str, leaves: &[Token]) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        let trimmed = body.trim_start();
        if trimmed.starts_with('#') {
            let start = offset + (body.len() - trimmed.len());
            let quoted = leaves.iter().any(|t| {
                matches!(t.kind, TokenKind::Literal | TokenKind::Comment)
                    && t.range.start < start
                    && start < t.range.end
            });
            if !quoted {
                found.push(start..offset + body.trim_end().len());
            }
        }
        offset += line.len();
    }
    found
}

fn with_opaque_gaps(text: &str, tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut cursor = 0;
    for token in tokens {
        if token.range.start < cursor {
            continue;
        }
        push_opaque(text, cursor..token.range.start, &mut out);
        cursor = token.range.end;
        out.push(token);
    }
    push_opaque(text, cursor..text.len(), &mut out);
    out
}

fn push_opaque(text: &str, gap: Range<usize>, out: &mut Vec<Token>) {
    let slice = &text[gap.clone()];
    if slice.trim().is_empty() {
        return;
    }
    let start = gap.start + (slice.len() - slice.trim_start().len());
    let end = gap.start + slice.trim_end().len();
    out.push(Token { kind: TokenKind::Opaque, range: start..end });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::CSharpParser;

    fn tokens_of(text: &str) -> (String, Vec<Token>) {
        let mut parser = CSharpParser::new().unwrap();
        let doc = parser.parse(text).unwrap();
        let tokens = tokenize(&doc, &[]);
        (text.to_string(), tokens)
    }

    #[test]
    fn test_literals_and_comments_are_atoms() {
        let (text, tokens) = tokens_of("class A { string s = \"a  b // c\"; /* note */ }");
        let texts: Vec<_> = tokens.iter().map(|t| t.text(&text)).collect();
        assert!(texts.contains(&"\"a  b // c\""));
        assert!(texts.contains(&"/* note */"));
        let literal = tokens.iter().find(|t| t.kind == TokenKind::Literal).unwrap();
        assert_eq!(literal.text(&text), "\"a  b // c\"");
    }

    #[test]
    fn test_conditional_access_is_one_token() {
        let (text, tokens) = tokens_of("class A { int? M(string s) { return s?.Length + s?[0]; } }");
        let texts: Vec<_> = tokens.iter().map(|t| t.text(&text)).collect();
        assert!(texts.contains(&"?."));
        assert!(texts.contains(&"?["));
        // nullable type marker stays on its own
        assert!(texts.contains(&"?"));
    }

    #[test]
    fn test_directive_lines_are_single_tokens() {
        let (text, tokens) = tokens_of("class A\n{\n#if DEBUG\n    int x;\n#endif\n}\n");
        let directives: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Directive)
            .map(|t| t.text(&text))
            .collect();
        assert_eq!(directives, vec!["#if DEBUG", "#endif"]);
        assert!(tokens.iter().any(|t| t.text(&text) == "x"));
    }

    #[test]
    fn test_preserved_span_is_one_token() {
        let text = "class A\n{\n    #region mdk preserve\n    int   keep;\n    #endregion\n    int y;\n}\n";
        let mut parser = CSharpParser::new().unwrap();
        let doc = parser.parse(text).unwrap();
        let start = text.find("    #region").unwrap();
        let end = text.find("#endregion").unwrap() + "#endregion".len();
        let tokens = tokenize(&doc, &[start..end]);

        let preserved: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Preserved).collect();
        assert_eq!(preserved.len(), 1);
        assert!(preserved[0].text(text).starts_with("#region mdk preserve"));
        assert!(!tokens.iter().any(|t| t.text(text) == "keep"));
        assert!(tokens.iter().any(|t| t.text(text) == "y"));
    }

    #[test]
    fn test_needs_space() {
        let source = "int x + + > > = a";
        let token = |s: &str, kind| {
            let start = source.find(s).unwrap();
            Token { kind, range: start..start + s.len() }
        };
        let int = token("int", TokenKind::Word);
        let x = token("x", TokenKind::Word);
        let plus = token("+", TokenKind::Punct);
        let gt = token(">", TokenKind::Punct);
        let eq = token("=", TokenKind::Punct);

        assert!(needs_space(source, &int, &x));
        assert!(!needs_space(source, &x, &plus));
        assert!(needs_space(source, &plus, &plus));
        assert!(!needs_space(source, &gt, &gt));
        assert!(needs_space(source, &gt, &eq));
    }
}
