// src/core/classifier.rs
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;
use tree_sitter::Node;

use crate::error::{ScriptfoldError, Result};
use super::parser::{self, CSharpParser, SyntaxDocument};

/// One input file of a project
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Display name (file name), used for ordering
    pub name: String,

    /// Path relative to the project root
    pub path: PathBuf,

    /// Source text with `\n` line endings
    pub text: String,

    /// Explicit sort weight from the unit's `// #weight` marker
    pub weight: Option<i32>,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, text: &str) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let text = normalize_newlines(text);
        let weight = UnitHeader::read(&text).weight;
        Self { name, path, text, weight }
    }
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Members the unit contributes to the entry type
#[derive(Debug, Clone)]
pub struct ProgramPart {
    pub unit: String,
    pub weight: Option<i32>,
    /// Attribute lists on this part's declaration, as written
    pub attributes: Vec<String>,
    pub modifiers: Vec<String>,
    /// Base class and interface entries in declaration order
    pub bases: Vec<String>,
    /// Member chunks, each with the trivia that preceded it
    pub members: Vec<String>,
    /// Comments between the last member and the closing brace
    pub trailing: String,
}

/// A whole top-level declaration that is not the entry type
#[derive(Debug, Clone)]
pub struct ExtensionPart {
    pub unit: String,
    pub weight: Option<i32>,
    pub name: String,
    pub text: String,
}

/// Classified fragment of a source unit
#[derive(Debug, Clone)]
pub enum ScriptPart {
    Program(ProgramPart),
    Extension(ExtensionPart),
}

impl ScriptPart {
    pub fn unit(&self) -> &str {
        match self {
            ScriptPart::Program(p) => &p.unit,
            ScriptPart::Extension(e) => &e.unit,
        }
    }

    pub fn weight(&self) -> Option<i32> {
        match self {
            ScriptPart::Program(p) => p.weight,
            ScriptPart::Extension(e) => e.weight,
        }
    }
}

/// Result of classifying one unit
#[derive(Debug, Clone, Default)]
pub struct ClassifiedUnit {
    pub unit: String,
    pub weight: Option<i32>,
    pub parts: Vec<ScriptPart>,
    pub imports: Vec<String>,
    /// Set when the unit opted out through the debug marker
    pub excluded: bool,
}

/// Markers read from the leading comment block of a unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitHeader {
    pub debug_only: bool,
    pub weight: Option<i32>,
}

fn debug_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^//\s*#debug\b").expect("Invalid debug marker regex"))
}

fn weight_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^//\s*#weight\s+(-?\d+)\b").expect("Invalid weight marker regex"))
}

impl UnitHeader {
    /// Scan blank lines and `//` comments at the top of a unit
    pub fn read(text: &str) -> Self {
        let mut header = Self::default();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with("//") {
                break;
            }
            if debug_marker_regex().is_match(trimmed) {
                header.debug_only = true;
            } else if let Some(caps) = weight_marker_regex().captures(trimmed) {
                header.weight = caps.get(1).and_then(|m| m.as_str().parse().ok());
            }
        }
        header
    }
}

/// Splits source units into entry-type members, extension declarations
/// and imports
pub struct SourceClassifier<'a> {
    parser: &'a mut CSharpParser,
    entry_type: &'a str,
}

impl<'a> SourceClassifier<'a> {
    pub fn new(parser: &'a mut CSharpParser, entry_type: &'a str) -> Self {
        Self { parser, entry_type }
    }

    pub fn classify(&mut self, unit: &SourceUnit) -> Result<ClassifiedUnit> {
        let header = UnitHeader::read(&unit.text);
        let mut classified = ClassifiedUnit {
            unit: unit.name.clone(),
            weight: unit.weight,
            ..Default::default()
        };

        if header.debug_only {
            debug!("Excluding debug-only unit {}", unit.name);
            classified.excluded = true;
            return Ok(classified);
        }

        let document = self.parser.parse(unit.text.as_str())?;
        if let Some((row, col)) = document.first_error() {
            return Err(ScriptfoldError::Classification {
                file: unit.path.display().to_string(),
                message: format!("syntax error at line {}, column {}", row, col),
            });
        }

        self.collect(&document, document.root(), &mut classified);
        Ok(classified)
    }

    fn collect(&self, document: &SyntaxDocument, node: Node<'_>, out: &mut ClassifiedUnit) {
        for child in parser::named_children(node) {
            let kind = child.kind();
            if kind == "using_directive" {
                out.imports.push(document.node_text(child).trim().to_string());
            } else if parser::is_namespace(kind) || kind == "declaration_list" {
                self.collect(document, child, out);
            } else if parser::is_type_declaration(kind) {
                let name = parser::name_node(child)
                    .map(|n| document.node_text(n).to_string())
                    .unwrap_or_default();

                if kind == "class_declaration" && name == self.entry_type {
                    out.parts.push(ScriptPart::Program(program_part(document, child, out)));
                } else {
                    out.parts.push(ScriptPart::Extension(ExtensionPart {
                        unit: out.unit.clone(),
                        weight: out.weight,
                        name,
                        text: extension_text(document, child),
                    }));
                }
            }
        }
    }
}

fn program_part(document: &SyntaxDocument, class: Node<'_>, unit: &ClassifiedUnit) -> ProgramPart {
    let text = document.text();
    let body = parser::body_node(class);
    let texts_of = |kind: &str| -> Vec<String> {
        parser::named_children(class)
            .into_iter()
            .filter(|c| c.kind() == kind)
            .map(|c| document.node_text(c).trim().to_string())
            .collect()
    };
    let attributes = texts_of("attribute_list");
    let modifiers = texts_of("modifier");
    let bases = parser::named_children(class)
        .into_iter()
        .filter(|c| c.kind() == "base_list")
        .flat_map(parser::named_children)
        .filter(|b| !b.is_extra())
        .map(|b| document.node_text(b).trim().to_string())
        .collect();

    let mut members = Vec::new();
    let mut trailing = String::new();

    if let Some(body) = body {
        let children = parser::children(body);
        let open_end = children
            .iter()
            .find(|c| c.kind() == "{")
            .map(|c| c.end_byte())
            .unwrap_or(body.start_byte());
        let close_start = children
            .iter()
            .rev()
            .find(|c| c.kind() == "}")
            .map(|c| c.start_byte())
            .unwrap_or(body.end_byte());

        let mut cursor = open_end;
        for member in children.iter().filter(|c| c.is_named() && !c.is_extra()) {
            members.push(text[cursor..member.end_byte()].to_string());
            cursor = member.end_byte();
        }
        if cursor < close_start {
            let rest = text[cursor..close_start].trim_end();
            if !rest.trim().is_empty() {
                trailing = rest.to_string();
            }
        }
    }

    ProgramPart {
        unit: unit.unit.clone(),
        weight: unit.weight,
        attributes,
        modifiers,
        bases,
        members,
        trailing,
    }
}

/// Declaration text plus the comments directly above it
fn extension_text(document: &SyntaxDocument, node: Node<'_>) -> String {
    let mut start = node.start_byte();
    let mut prev = node.prev_sibling();
    while let Some(p) = prev {
        let gap = &document.text()[p.end_byte()..start];
        let is_marker = debug_marker_regex().is_match(document.node_text(p))
            || weight_marker_regex().is_match(document.node_text(p));
        if !parser::is_comment(p.kind()) || is_marker || gap.matches('\n').count() > 1 {
            break;
        }
        start = p.start_byte();
        prev = p.prev_sibling();
    }
    document.text()[start..node.end_byte()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: &str, text: &str) -> ClassifiedUnit {
        let mut parser = CSharpParser::new().unwrap();
        let mut classifier = SourceClassifier::new(&mut parser, "Program");
        classifier.classify(&SourceUnit::new(name, text)).unwrap()
    }

    #[test]
    fn test_splits_program_members_and_extensions() {
        let unit = classify(
            "Program.cs",
            r#"using System;
using Sandbox.ModAPI.Ingame;

namespace IngameScript
{
    partial class Program : MyGridProgram
    {
        int ticks;

        // advance once per run
        void Tick() { ticks++; }
    }

    /// Shared helper
    class Helper { }
}
"#,
        );

        assert_eq!(unit.imports, vec!["using System;", "using Sandbox.ModAPI.Ingame;"]);
        assert_eq!(unit.parts.len(), 2);

        match &unit.parts[0] {
            ScriptPart::Program(part) => {
                assert_eq!(part.modifiers, vec!["partial"]);
                assert_eq!(part.bases, vec!["MyGridProgram"]);
                assert!(part.attributes.is_empty());
                assert_eq!(part.members.len(), 2);
                assert!(part.members[1].contains("// advance once per run"));
                assert!(part.members[1].trim_end().ends_with("void Tick() { ticks++; }"));
            }
            other => panic!("expected program part, got {:?}", other),
        }

        match &unit.parts[1] {
            ScriptPart::Extension(ext) => {
                assert_eq!(ext.name, "Helper");
                assert!(ext.text.starts_with("/// Shared helper"));
            }
            other => panic!("expected extension part, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_marker_excludes_unit() {
        let unit = classify("Debug.cs", "\n// a diagnostics helper\n// #debug\nclass Probe { }\n");
        assert!(unit.excluded);
        assert!(unit.parts.is_empty());
        assert!(unit.imports.is_empty());
    }

    #[test]
    fn test_marker_after_code_is_ignored() {
        let header = UnitHeader::read("class A { }\n// #debug\n");
        assert!(!header.debug_only);
    }

    #[test]
    fn test_weight_marker_sets_part_weight() {
        let mut parser = CSharpParser::new().unwrap();
        let mut classifier = SourceClassifier::new(&mut parser, "Program");
        let unit = SourceUnit::new("Late.cs", "// #weight -3\nclass Late { }\n");
        assert_eq!(unit.weight, Some(-3));
        let classified = classifier.classify(&unit).unwrap();
        assert_eq!(classified.weight, Some(-3));
        assert_eq!(classified.parts[0].weight(), Some(-3));
    }

    #[test]
    fn test_unparsable_unit_is_classification_error() {
        let mut parser = CSharpParser::new().unwrap();
        let mut classifier = SourceClassifier::new(&mut parser, "Program");
        let err = classifier
            .classify(&SourceUnit::new("Broken.cs", "class Broken { void M( }"))
            .unwrap_err();
        match err {
            ScriptfoldError::Classification { file, .. } => assert_eq!(file, "Broken.cs"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_newlines_are_normalized() {
        let unit = SourceUnit::new("A.cs", "class A {\r\n}\r\n");
        assert_eq!(unit.text, "class A {\n}\n");
    }
}
