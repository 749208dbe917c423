// src/core/minify/modifiers.rs
use std::collections::BTreeSet;
use tracing::debug;
use tree_sitter::Node;

use crate::core::composition::{self, Composition};
use crate::core::parser::{self, CSharpParser, Edit, SyntaxDocument};
use crate::core::pipeline::Pass;
use crate::core::symbols::SemanticModel;
use crate::error::Result;

const ACCESSIBILITY: &[&str] = &["public", "private", "protected", "internal"];

/// Modifiers that force a member to stay accessible
const ACCESS_REQUIRED: &[&str] = &["override", "virtual", "abstract", "extern"];

/// Drops accessibility and `readonly` modifiers that mean nothing once the
/// whole script is one compilation unit
pub struct ModifierReducer;

impl Pass for ModifierReducer {
    fn name(&self) -> &'static str {
        "modifier reduction"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let document = composition.document();
        let model = SemanticModel::analyze(composition);
        let declarations = scoped_declarations(composition);

        let interface_members = interface_member_names(document);
        let entry_has_interfaces = parser::named_children(composition.entry_type())
            .into_iter()
            .find(|c| c.kind() == "base_list")
            .map_or(false, |b| parser::named_children(b).len() > 1);

        let protected: BTreeSet<&str> = model
            .definitions()
            .iter()
            .filter(|d| d.is_protected)
            .map(|d| d.name.as_str())
            .collect();

        let must_keep = |decl: Node<'_>, names: &[&str]| -> bool {
            let in_entry = parser::contains(&composition.entry_body(), &decl.byte_range());
            composition.annotations().is_preserved(&decl.byte_range())
                || names.iter().any(|n| protected.contains(n))
                || parser::modifiers(decl)
                    .iter()
                    .any(|m| ACCESS_REQUIRED.contains(&document.node_text(*m)))
                || matches!(decl.kind(), "operator_declaration" | "conversion_operator_declaration" | "indexer_declaration")
                || (in_entry && names.iter().any(|n| interface_members.contains(*n)))
                || (in_entry && entry_has_interfaces && parser::has_modifier(document, decl, "public"))
        };

        // Declarations used from outside the entry type keep their modifiers,
        // and so does every type their signatures mention
        let mut kept: BTreeSet<String> = declarations
            .iter()
            .flat_map(|(_, names)| names.iter())
            .filter(|n| model.is_referenced_outside_entry(n))
            .map(|n| n.to_string())
            .collect();
        loop {
            let mut changed = false;
            for (decl, names) in &declarations {
                if names.iter().any(|n| kept.contains(*n)) || must_keep(*decl, names) {
                    for id in signature_identifiers(document, *decl) {
                        changed |= kept.insert(id.to_string());
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut edits = Vec::new();
        for (decl, names) in &declarations {
            if names.iter().any(|n| kept.contains(*n)) || must_keep(*decl, names) {
                continue;
            }
            for modifier in parser::modifiers(*decl) {
                let keyword = document.node_text(modifier);
                let removable = ACCESSIBILITY.contains(&keyword)
                    || (keyword == "readonly" && decl.kind() == "field_declaration");
                if removable {
                    edits.push(Edit::delete(modifier.start_byte()..skip_whitespace(document.text(), modifier.end_byte())));
                }
            }
        }

        debug!("Removing {} modifiers ({} declarations kept)", edits.len(), kept.len());
        let text = parser::apply_edits(document.text(), edits);
        composition.derive(text, parser)
    }
}

/// Declarations at file, namespace or entry-type scope, with their names
fn scoped_declarations(composition: &Composition) -> Vec<(Node<'_>, Vec<&str>)> {
    let document = composition.document();
    let entry_range = composition.entry_range();
    let mut found = Vec::new();

    for ty in composition::top_level_types(document) {
        if ty.byte_range() != entry_range {
            let names = parser::name_node(ty).map(|n| vec![document.node_text(n)]).unwrap_or_default();
            found.push((ty, names));
        }
    }

    if let Some(body) = parser::body_node(composition.entry_type()) {
        for member in parser::named_children(body) {
            if member.is_extra() {
                continue;
            }
            let names = parser::declared_names(document, member);
            found.push((member, names));
        }
    }
    found
}

fn interface_member_names(document: &SyntaxDocument) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();
    parser::walk(document.root(), &mut |n| {
        if n.kind() == "interface_declaration" {
            if let Some(body) = parser::body_node(n) {
                for member in parser::named_children(body) {
                    names.extend(parser::declared_names(document, member));
                }
            }
            return false;
        }
        true
    });
    names
}

/// Identifiers of a declaration outside its bodies and initializers
fn signature_identifiers<'t>(document: &'t SyntaxDocument, decl: Node<'t>) -> Vec<&'t str> {
    let mut found = Vec::new();
    parser::walk(decl, &mut |n| match n.kind() {
        "block" | "arrow_expression_clause" | "declaration_list" | "enum_member_declaration_list"
        | "equals_value_clause" => false,
        "identifier" => {
            found.push(document.node_text(n));
            false
        }
        _ => true,
    });
    found
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}
