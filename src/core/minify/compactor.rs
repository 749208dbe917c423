// src/core/minify/compactor.rs
use tracing::debug;

use super::tokens::{self, Token, TokenKind};
use crate::core::composition::Composition;
use crate::core::parser::{self, CSharpParser, Edit, SyntaxDocument};
use crate::core::pipeline::Pass;
use crate::error::Result;

/// Removes comments and every whitespace character the lexer does not need
pub struct Compactor;

impl Compactor {
    pub fn compact(document: &SyntaxDocument, preserve: &[std::ops::Range<usize>]) -> String {
        let text = document.text();
        let tokens: Vec<Token> = tokens::tokenize(document, preserve)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .collect();

        let mut out = String::with_capacity(text.len() / 2);
        let mut previous: Option<&Token> = None;
        for token in &tokens {
            if let Some(prev) = previous {
                if prev.owns_line() || token.owns_line() {
                    out.push('\n');
                } else if tokens::needs_space(text, prev, token) {
                    out.push(' ');
                }
            }
            out.push_str(token.text(text));
            previous = Some(token);
        }
        out.push('\n');
        out
    }
}

impl Pass for Compactor {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let preserve = composition.annotations().preserve_spans();
        let text = Self::compact(composition.document(), &preserve);
        debug!("Compacted {} preserve spans verbatim", preserve.len());
        composition.derive(text, parser)
    }
}

/// Removes comments and keeps the rest of the layout
pub struct CommentStripper;

impl CommentStripper {
    pub fn strip(document: &SyntaxDocument, preserve: &[std::ops::Range<usize>]) -> String {
        let text = document.text();
        let tokens = tokens::tokenize(document, preserve);

        let mut edits = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if token.kind != TokenKind::Comment {
                continue;
            }

            let line = parser::whole_line_range(text, token.range.clone());
            if line != token.range {
                edits.push(Edit::delete(line));
                continue;
            }

            let before = text[..token.range.start].trim_end_matches([' ', '\t']);
            let range = if before.is_empty() || before.ends_with('\n') {
                let after = &text[token.range.end..];
                let trailing = after.len() - after.trim_start_matches([' ', '\t']).len();
                token.range.start..token.range.end + trailing
            } else {
                before.len()..token.range.end
            };

            let prev = tokens[..i].iter().rev().find(|t| t.kind != TokenKind::Comment);
            let next = tokens[i + 1..].iter().find(|t| t.kind != TokenKind::Comment);
            let fuses = match (prev, next) {
                (Some(p), Some(n)) => {
                    let gap = format!("{}{}", &text[p.range.end..range.start], &text[range.end..n.range.start]);
                    !gap.chars().any(char::is_whitespace) && tokens::needs_space(text, p, n)
                }
                _ => false,
            };
            edits.push(Edit::replace(range, if fuses { " " } else { "" }));
        }
        parser::apply_edits(text, edits)
    }
}

impl Pass for CommentStripper {
    fn name(&self) -> &'static str {
        "comment stripping"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let preserve = composition.annotations().preserve_spans();
        let text = Self::strip(composition.document(), &preserve);
        composition.derive(text, parser)
    }
}
