use std::ops::Range;
use tree_sitter::{Node, Parser, Tree};

use crate::error::{ScriptfoldError, Result};

/// C# parser using Tree-sitter
pub struct CSharpParser {
    parser: Parser,
}

impl CSharpParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let csharp_language = tree_sitter_c_sharp::language();
        parser.set_language(&csharp_language)
            .map_err(|e| ScriptfoldError::Parser(format!("Failed to set C# language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Parse a complete document
    pub fn parse(&mut self, text: impl Into<String>) -> Result<SyntaxDocument> {
        let text = text.into();
        let tree = self.parser.parse(&text, None)
            .ok_or_else(|| ScriptfoldError::Parser("Failed to parse C# code".to_string()))?;
        Ok(SyntaxDocument { text, tree })
    }
}

/// Source text together with its syntax tree
#[derive(Clone)]
pub struct SyntaxDocument {
    text: String,
    tree: Tree,
}

impl SyntaxDocument {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.byte_range()]
    }

    /// Row and column (1-based) of the first syntax error, if any
    pub fn first_error(&self) -> Option<(usize, usize)> {
        let mut found = None;
        walk(self.root(), &mut |node| {
            if found.is_some() {
                return false;
            }
            if node.is_error() || node.is_missing() {
                let pos = node.start_position();
                found = Some((pos.row + 1, pos.column + 1));
                return false;
            }
            node.has_error()
        });
        found
    }
}

impl std::fmt::Debug for SyntaxDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxDocument")
            .field("len", &self.text.len())
            .finish()
    }
}

/// Pre-order traversal; the visitor returns whether to descend into a node
pub fn walk<'t>(node: Node<'t>, visit: &mut impl FnMut(Node<'t>) -> bool) {
    if !visit(node) {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, visit);
    }
}

/// Direct children of a node
pub fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// The declared name of a declaration node
pub fn name_node(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("name")
        .filter(|n| n.kind() == "identifier")
        .or_else(|| named_children(node).into_iter().find(|n| n.kind() == "identifier"))
}

/// Body (`declaration_list` or enum member list) of a type declaration
pub fn body_node(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("body").or_else(|| {
        named_children(node)
            .into_iter()
            .find(|n| matches!(n.kind(), "declaration_list" | "enum_member_declaration_list"))
    })
}

/// Names a member declaration introduces; fields may declare several
pub fn declared_names<'t>(document: &'t SyntaxDocument, member: Node<'t>) -> Vec<&'t str> {
    match member.kind() {
        "field_declaration" | "event_field_declaration" => {
            let mut names = Vec::new();
            walk(member, &mut |n| {
                if n.kind() == "variable_declarator" {
                    if let Some(name) = name_node(n) {
                        names.push(document.node_text(name));
                    }
                    return false;
                }
                true
            });
            names
        }
        _ => name_node(member).map(|n| vec![document.node_text(n)]).unwrap_or_default(),
    }
}

pub const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "enum_declaration",
    "delegate_declaration",
    "record_declaration",
    "record_struct_declaration",
];

pub fn is_type_declaration(kind: &str) -> bool {
    TYPE_DECLARATIONS.contains(&kind)
}

pub fn is_namespace(kind: &str) -> bool {
    matches!(kind, "namespace_declaration" | "file_scoped_namespace_declaration")
}

pub fn is_comment(kind: &str) -> bool {
    kind == "comment"
}

const MODIFIER_KEYWORDS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "readonly", "const", "abstract",
    "virtual", "override", "sealed", "partial", "async", "extern", "new", "unsafe", "volatile",
    "required", "file", "fixed",
];

/// Modifier nodes of a declaration, in source order
///
/// The grammar wraps each keyword in a `modifier` node; bare keyword tokens
/// are accepted as well.
pub fn modifiers(node: Node<'_>) -> Vec<Node<'_>> {
    children(node)
        .into_iter()
        .take_while(|c| c.kind() == "modifier" || c.kind() == "attribute_list" || c.is_extra()
            || (!c.is_named() && MODIFIER_KEYWORDS.contains(&c.kind())))
        .filter(|c| c.kind() == "modifier" || (!c.is_named() && MODIFIER_KEYWORDS.contains(&c.kind())))
        .collect()
}

pub fn has_modifier(doc: &SyntaxDocument, node: Node<'_>, keyword: &str) -> bool {
    modifiers(node).into_iter().any(|m| doc.node_text(m) == keyword)
}

/// Nearest ancestor (or self) matching a predicate
pub fn ancestor<'t>(node: Node<'t>, pred: impl Fn(Node<'t>) -> bool) -> Option<Node<'t>> {
    let mut current = Some(node);
    while let Some(n) = current {
        if pred(n) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

pub fn contains(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Extend a removal range over the indentation before it and the line break
/// after it when the range occupies whole lines
pub fn whole_line_range(text: &str, range: Range<usize>) -> Range<usize> {
    let line_start = text[..range.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let only_indent_before = text[line_start..range.start].chars().all(|c| c == ' ' || c == '\t');

    let rest = &text[range.end..];
    let line_end = rest.find('\n').map(|i| range.end + i + 1).unwrap_or(text.len());
    let only_space_after = text[range.end..line_end].trim().is_empty();

    if only_indent_before && only_space_after {
        line_start..line_end
    } else {
        range
    }
}

/// A single text replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn delete(range: Range<usize>) -> Self {
        Self { range, replacement: String::new() }
    }

    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self { range, replacement: replacement.into() }
    }
}

/// Apply non-overlapping edits, producing new text
///
/// Overlapping edits keep the first one in source order.
pub fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.range.start, e.range.end));
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}
