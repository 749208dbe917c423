// src/core/minify/wrapper.rs
use std::ops::Range;

use super::tokens::{self, TokenKind};
use crate::core::composition::Composition;
use crate::core::parser::{CSharpParser, SyntaxDocument};
use crate::core::pipeline::Pass;
use crate::error::Result;

/// Re-breaks compacted text so lines stay within a width
pub struct LineWrapper {
    width: usize,
}

impl LineWrapper {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn wrap(&self, document: &SyntaxDocument, preserve: &[Range<usize>]) -> String {
        let text = document.text();
        let tokens = tokens::tokenize(document, preserve);

        let mut out = String::with_capacity(text.len() + text.len() / self.width.max(1));
        let mut column = 0usize;
        for (i, token) in tokens.iter().enumerate() {
            let token_text = token.text(text);
            let first_line = token_text.split('\n').next().map_or(0, |l| l.chars().count());

            if i > 0 {
                let prev = &tokens[i - 1];
                let gap = &text[prev.range.end..token.range.start];
                let separator = if gap.is_empty() { "" } else { " " };

                if gap.contains('\n') {
                    out.push('\n');
                    column = 0;
                } else if token.kind == TokenKind::Preserved {
                    out.push('\n');
                    column = 0;
                } else if column > 0
                    && column + separator.len() + first_line > self.width
                    && can_break(prev.text(text), token_text, separator)
                {
                    out.push('\n');
                    column = 0;
                } else {
                    out.push_str(separator);
                    column += separator.len();
                }
            }

            out.push_str(token_text);
            column = match token_text.rfind('\n') {
                Some(pos) => token_text[pos + 1..].chars().count(),
                None => column + first_line,
            };
        }
        out.push('\n');
        out
    }
}

/// `>>` and `>=` may be two grammar tokens that must stay adjacent
fn can_break(prev: &str, next: &str, separator: &str) -> bool {
    !separator.is_empty() || !(prev.ends_with('>') && (next.starts_with('>') || next.starts_with('=')))
}

impl Pass for LineWrapper {
    fn name(&self) -> &'static str {
        "line wrapping"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let preserve = composition.annotations().preserve_spans();
        let text = self.wrap(composition.document(), &preserve);
        composition.derive(text, parser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::minify::compactor::Compactor;
    use std::sync::Arc;

    fn compacted(text: &str, parser: &mut CSharpParser) -> Composition {
        let input = Composition::new(text.to_string(), Arc::new(Config::default()), parser).unwrap();
        Compactor.run(&input, parser).unwrap()
    }

    #[test]
    fn test_lines_stay_within_width() {
        let mut parser = CSharpParser::new().unwrap();
        let input = compacted(
            "class Program\n{\n    int alpha = 1; int beta = 2; int gamma = 3; int delta = 4;\n    void Main() { alpha = beta + gamma * delta - alpha / beta; }\n}\n",
            &mut parser,
        );
        let out = LineWrapper::new(24).run(&input, &mut parser).unwrap();

        for line in out.text().lines() {
            assert!(line.chars().count() <= 24, "line too long: {:?}", line);
        }
        // wrapping only moves breaks around
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(squash(out.text()), squash(input.text()));
    }

    #[test]
    fn test_overlong_token_gets_own_line() {
        let mut parser = CSharpParser::new().unwrap();
        let input = compacted(
            "class Program { string s = \"a string literal that is far longer than the width\"; }\n",
            &mut parser,
        );
        let out = LineWrapper::new(20).run(&input, &mut parser).unwrap();
        let long_line = out
            .text()
            .lines()
            .find(|l| l.contains("far longer"))
            .unwrap();
        assert!(long_line.starts_with('"'));
    }

    #[test]
    fn test_preserve_span_breaks_once_and_stays_whole() {
        let mut parser = CSharpParser::new().unwrap();
        let input = compacted(
            "class Program\n{\n    int first;\n    #region mdk preserve\n    int   aVeryLongPreservedFieldName = 12345678;\n    #endregion\n    int last;\n}\n",
            &mut parser,
        );
        let out = LineWrapper::new(20).run(&input, &mut parser).unwrap();
        let text = out.text();
        assert!(text.contains("\n#region mdk preserve\n    int   aVeryLongPreservedFieldName = 12345678;\n    #endregion\n"));
        assert!(!text.contains("\n\n"));
    }

    #[test]
    fn test_never_splits_closing_generics() {
        assert!(!can_break("int>", ">", ""));
        assert!(!can_break(">", "=", ""));
        assert!(can_break(">", ">", " "));
        assert!(can_break("x", "y", ""));
    }
}
