// src/core/composition.rs
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use tree_sitter::Node;

use crate::config::Config;
use crate::error::{ScriptfoldError, Result};
use super::annotations::Annotations;
use super::parser::{self, CSharpParser, SyntaxDocument};

/// The single merged document threaded through the pipeline
///
/// Every stage builds a new `Composition` from text; the previous one is
/// never touched. Construction re-parses, re-derives annotations and checks
/// the entry-type invariants.
#[derive(Debug, Clone)]
pub struct Composition {
    document: SyntaxDocument,
    annotations: Annotations,
    config: Arc<Config>,
    /// Lifecycle hooks declared on the entry type when it was composed
    hooks: BTreeSet<String>,
    entry_range: Range<usize>,
    entry_body: Range<usize>,
}

impl Composition {
    /// Build the first composition of a pipeline run
    pub fn new(text: String, config: Arc<Config>, parser: &mut CSharpParser) -> Result<Self> {
        Self::build(text, config, None, parser)
    }

    /// Build the next stage's composition, keeping the hook contract
    pub fn derive(&self, text: String, parser: &mut CSharpParser) -> Result<Self> {
        Self::build(text, self.config.clone(), Some(&self.hooks), parser)
    }

    fn build(
        text: String,
        config: Arc<Config>,
        required_hooks: Option<&BTreeSet<String>>,
        parser: &mut CSharpParser,
    ) -> Result<Self> {
        let document = parser.parse(text)?;
        if let Some((row, col)) = document.first_error() {
            return Err(ScriptfoldError::Parser(format!(
                "composed document does not parse (line {}, column {})",
                row, col
            )));
        }
        let annotations = Annotations::extract(document.text())?;

        let entry_name = config.project.entry_type.as_str();
        let entries = top_level_types(&document)
            .into_iter()
            .filter(|n| {
                n.kind() == "class_declaration"
                    && parser::name_node(*n).map(|id| document.node_text(id)) == Some(entry_name)
            })
            .collect::<Vec<_>>();

        let entry = match entries.as_slice() {
            [single] => *single,
            [] => {
                return Err(ScriptfoldError::InvariantViolation(format!(
                    "no entry type `{}` found",
                    entry_name
                )))
            }
            many => {
                return Err(ScriptfoldError::InvariantViolation(format!(
                    "{} declarations of entry type `{}`",
                    many.len(),
                    entry_name
                )))
            }
        };

        let entry_range = entry.byte_range();
        let entry_body = parser::body_node(entry)
            .map(|b| b.byte_range())
            .ok_or_else(|| ScriptfoldError::InvariantViolation(format!("entry type `{}` has no body", entry_name)))?;

        let present = declared_hooks(&document, entry, &config);
        if let Some(required) = required_hooks {
            if let Some(missing) = required.iter().find(|h| !present.contains(*h)) {
                return Err(ScriptfoldError::InvariantViolation(format!(
                    "lifecycle hook `{}` missing from entry type",
                    missing
                )));
            }
        }

        Ok(Self {
            document,
            annotations,
            config,
            hooks: present,
            entry_range,
            entry_body,
        })
    }

    pub fn text(&self) -> &str {
        self.document.text()
    }

    pub fn document(&self) -> &SyntaxDocument {
        &self.document
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hooks(&self) -> &BTreeSet<String> {
        &self.hooks
    }

    /// Byte range of the whole entry-type declaration
    pub fn entry_range(&self) -> Range<usize> {
        self.entry_range.clone()
    }

    /// Byte range of the entry type's `{ ... }` body
    pub fn entry_body(&self) -> Range<usize> {
        self.entry_body.clone()
    }

    pub fn entry_type(&self) -> Node<'_> {
        top_level_types(&self.document)
            .into_iter()
            .find(|n| n.byte_range() == self.entry_range)
            .unwrap_or_else(|| self.document.root())
    }

    /// Import directives in document order
    pub fn imports(&self) -> Vec<&str> {
        parser::named_children(self.document.root())
            .into_iter()
            .filter(|n| n.kind() == "using_directive")
            .map(|n| self.document.node_text(n))
            .collect()
    }

    /// Top-level declarations other than the entry type
    pub fn extensions(&self) -> Vec<Node<'_>> {
        top_level_types(&self.document)
            .into_iter()
            .filter(|n| n.byte_range() != self.entry_range)
            .collect()
    }
}

/// Type declarations at file or namespace level
pub fn top_level_types(document: &SyntaxDocument) -> Vec<Node<'_>> {
    let mut found = Vec::new();
    collect_top_level(document.root(), &mut found);
    found
}

fn collect_top_level<'t>(node: Node<'t>, found: &mut Vec<Node<'t>>) {
    for child in parser::named_children(node) {
        if parser::is_type_declaration(child.kind()) {
            found.push(child);
        } else if parser::is_namespace(child.kind()) || child.kind() == "declaration_list" {
            collect_top_level(child, found);
        }
    }
}

/// Configured hook names declared directly on the entry type
fn declared_hooks(document: &SyntaxDocument, entry: Node<'_>, config: &Config) -> BTreeSet<String> {
    let mut present = BTreeSet::new();
    let hooks = &config.project.hooks;

    if let Some(name) = parser::name_node(entry) {
        let name = document.node_text(name);
        if hooks.iter().any(|h| h == name) {
            present.insert(name.to_string());
        }
    }

    if let Some(body) = parser::body_node(entry) {
        for member in parser::named_children(body) {
            if !matches!(member.kind(), "method_declaration" | "constructor_declaration") {
                continue;
            }
            if let Some(name) = parser::name_node(member) {
                let name = document.node_text(name);
                if hooks.iter().any(|h| h == name) {
                    present.insert(name.to_string());
                }
            }
        }
    }

    present
}
