// src/core/composer.rs
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ScriptfoldError, Result};
use super::classifier::{ClassifiedUnit, ProgramPart, ScriptPart, SourceClassifier, SourceUnit};
use super::composition::Composition;
use super::parser::CSharpParser;
use super::sorter::PartSorter;

/// Merges classified source units into one composition
pub struct ProgramComposer {
    config: Arc<Config>,
}

impl ProgramComposer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn compose(&self, units: &[SourceUnit], parser: &mut CSharpParser) -> Result<Composition> {
        let project = &self.config.project;

        let mut classified = Vec::with_capacity(units.len());
        {
            let mut classifier = SourceClassifier::new(parser, &project.entry_type);
            for unit in units {
                let result = classifier.classify(unit)?;
                if !result.excluded {
                    classified.push(result);
                }
            }
        }

        let sorter = PartSorter::new(&project.entry_file);
        sorter.sort_by_key(&mut classified, |u: &ClassifiedUnit| (u.weight, u.unit.as_str()));

        let imports = merge_imports(&classified);
        let mut parts: Vec<ScriptPart> = classified.into_iter().flat_map(|u| u.parts).collect();
        sorter.sort_parts(&mut parts);

        let (program_parts, extensions): (Vec<_>, Vec<_>) = parts
            .into_iter()
            .partition(|p| matches!(p, ScriptPart::Program(_)));
        let program_parts: Vec<ProgramPart> = program_parts
            .into_iter()
            .filter_map(|p| match p {
                ScriptPart::Program(part) => Some(part),
                ScriptPart::Extension(_) => None,
            })
            .collect();

        if program_parts.is_empty() {
            return Err(ScriptfoldError::InvariantViolation(format!(
                "no source unit declares entry type `{}`",
                project.entry_type
            )));
        }

        debug!(
            "Composing {} entry-type parts and {} extension parts",
            program_parts.len(),
            extensions.len()
        );
        for extension in &extensions {
            if let ScriptPart::Extension(ext) = extension {
                debug!("Extension {} from {}", ext.name, ext.unit);
            }
        }

        let text = self.render(&imports, &program_parts, &extensions);
        let composition = Composition::new(text, self.config.clone(), parser)?;

        let missing = project
            .required_hooks
            .iter()
            .find(|hook| !composition.hooks().contains(hook.as_str()));
        if let Some(hook) = missing {
            return Err(ScriptfoldError::InvariantViolation(format!(
                "entry type `{}` does not declare required hook `{}`",
                project.entry_type, hook
            )));
        }

        info!(
            "🧩 Composed {} imports, {} hooks, {} extension types",
            composition.imports().len(),
            composition.hooks().len(),
            composition.extensions().len()
        );
        Ok(composition)
    }

    fn render(&self, imports: &[String], program_parts: &[ProgramPart], extensions: &[ScriptPart]) -> String {
        let mut out = String::new();

        for import in imports {
            out.push_str(import);
            out.push('\n');
        }
        if !imports.is_empty() {
            out.push('\n');
        }

        let namespace = self.config.project.namespace.as_deref().filter(|n| !n.trim().is_empty());
        if let Some(ns) = namespace {
            out.push_str(&format!("namespace {}\n{{\n", ns.trim()));
        }

        out.push_str(&merged_header(&self.config.project.entry_type, program_parts));
        out.push_str("\n{");
        for part in program_parts {
            for member in &part.members {
                out.push_str(member);
            }
            if !part.trailing.is_empty() {
                out.push_str(&part.trailing);
            }
        }
        out.push_str("\n}\n");

        for extension in extensions {
            if let ScriptPart::Extension(ext) = extension {
                out.push('\n');
                out.push_str(&ext.text);
                out.push('\n');
            }
        }

        if namespace.is_some() {
            out.push_str("}\n");
        }
        out
    }
}

/// One declaration header carrying the attributes, modifiers and bases of
/// every part, deduplicated in part order
fn merged_header(entry_type: &str, parts: &[ProgramPart]) -> String {
    let attributes = union(parts.iter().flat_map(|p| p.attributes.iter()));
    let modifiers = union(parts.iter().flat_map(|p| p.modifiers.iter()));
    let mut bases = union(parts.iter().flat_map(|p| p.bases.iter()));

    // a base class has to precede the interfaces
    let base_class = parts
        .iter()
        .filter_map(|p| p.bases.first())
        .find(|b| !looks_like_interface(b))
        .map(|b| collapse_whitespace(b));
    if let Some(position) = base_class.and_then(|c| bases.iter().position(|b| collapse_whitespace(b) == c)) {
        let class = bases.remove(position);
        bases.insert(0, class);
    }

    let mut header = String::new();
    for attribute in &attributes {
        header.push_str(attribute);
        header.push('\n');
    }
    for modifier in &modifiers {
        header.push_str(modifier);
        header.push(' ');
    }
    header.push_str("class ");
    header.push_str(entry_type);
    if !bases.is_empty() {
        header.push_str(" : ");
        header.push_str(&bases.join(", "));
    }
    header
}

fn union<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .filter(|item| seen.insert(collapse_whitespace(item)))
        .cloned()
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `IName` naming convention, ignoring namespace and type arguments
fn looks_like_interface(base: &str) -> bool {
    let unqualified = base.split('<').next().unwrap_or(base);
    let simple = unqualified.rsplit('.').next().unwrap_or(unqualified).trim();
    let mut chars = simple.chars();
    chars.next() == Some('I') && chars.next().map_or(false, |c| c.is_ascii_uppercase())
}

/// Union of all imports, deduplicated case-insensitively, first occurrence wins
fn merge_imports(units: &[ClassifiedUnit]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for import in units.iter().flat_map(|u| u.imports.iter()) {
        let key = collapse_whitespace(import).to_lowercase();
        if seen.insert(key) {
            merged.push(import.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(units: &[SourceUnit], config: Config) -> Composition {
        let mut parser = CSharpParser::new().unwrap();
        ProgramComposer::new(Arc::new(config)).compose(units, &mut parser).unwrap()
    }

    #[test]
    fn test_merges_program_and_helper() {
        let units = vec![
            SourceUnit::new("Helper.cs", "using System.Text;\nusing System;\n\nclass Helper { public int Value; }\n"),
            SourceUnit::new("Program.cs", "using System;\n\npartial class Program : MyGridProgram\n{\n    void Main() { }\n    void Tick() { }\n}\n"),
        ];
        let composition = compose(&units, Config::default());
        let text = composition.text();

        assert_eq!(composition.imports(), vec!["using System;", "using System.Text;"]);
        let program = text.find("partial class Program : MyGridProgram").unwrap();
        let tick = text.find("void Tick()").unwrap();
        let helper = text.find("class Helper").unwrap();
        assert!(program < tick && tick < helper);
        assert_eq!(text.matches("class Program").count(), 1);
    }

    #[test]
    fn test_members_follow_part_order() {
        let units = vec![
            SourceUnit::new("b.cs", "partial class Program { void FromB() { } }"),
            SourceUnit::new("Program.cs", "partial class Program : MyGridProgram { void Main() { } }"),
            SourceUnit::new("A.cs", "partial class Program { void FromA() { } }"),
        ];
        let composition = compose(&units, Config::default());
        let text = composition.text();

        let main = text.find("void Main()").unwrap();
        let a = text.find("void FromA()").unwrap();
        let b = text.find("void FromB()").unwrap();
        assert!(main < a && a < b);
        assert!(text.contains("partial class Program : MyGridProgram"));
        assert!(composition.hooks().contains("Main"));
    }

    #[test]
    fn test_imports_deduplicate_case_insensitively() {
        let units = vec![
            SourceUnit::new("Program.cs", "using System.Linq;\nclass Program { void Main() { } }"),
            SourceUnit::new("Other.cs", "using system.linq;\nusing VRageMath;\nclass Other { }"),
        ];
        let composition = compose(&units, Config::default());
        assert_eq!(composition.imports(), vec!["using System.Linq;", "using VRageMath;"]);
    }

    #[test]
    fn test_wraps_in_configured_namespace() {
        let mut config = Config::default();
        config.project.namespace = Some("IngameScript".to_string());
        let units = vec![SourceUnit::new("Program.cs", "using System;\nclass Program { void Main() { } }\nclass Helper { }")];
        let composition = compose(&units, config);
        let text = composition.text();

        assert!(text.starts_with("using System;\n\nnamespace IngameScript\n{\n"));
        assert_eq!(composition.extensions().len(), 1);
    }

    #[test]
    fn test_composition_is_deterministic() {
        let units = vec![
            SourceUnit::new("Zed.cs", "class Zed { }"),
            SourceUnit::new("Program.cs", "class Program { void Main() { } }"),
            SourceUnit::new("alpha.cs", "class Alpha { }"),
        ];
        let first = compose(&units, Config::default()).text().to_string();
        let mut reversed = units.clone();
        reversed.reverse();
        let second = compose(&reversed, Config::default()).text().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_entry_type_fails() {
        let mut parser = CSharpParser::new().unwrap();
        let err = ProgramComposer::new(Arc::new(Config::default()))
            .compose(&[SourceUnit::new("Helper.cs", "class Helper { }")], &mut parser)
            .unwrap_err();
        assert!(matches!(err, ScriptfoldError::InvariantViolation(_)));
    }

    #[test]
    fn test_merges_base_lists_of_all_parts() {
        let units = vec![
            SourceUnit::new(
                "Program.cs",
                "using System.Collections.Generic;\npartial class Program : MyGridProgram\n{\n    void Main() { var sorted = new SortedSet<int>(this); }\n}\n",
            ),
            SourceUnit::new(
                "Compare.cs",
                "// #weight 5\n[Serializable]\npartial class Program : IComparer<int>\n{\n    public int Compare(int x, int y) { return x - y; }\n}\n",
            ),
        ];
        let composition = compose(&units, Config::default());
        let text = composition.text();

        assert!(text.contains("[Serializable]\npartial class Program : MyGridProgram, IComparer<int>\n{"));
        assert_eq!(text.matches("IComparer<int>").count(), 1);
    }

    #[test]
    fn test_shared_bases_are_not_repeated() {
        let units = vec![
            SourceUnit::new("Program.cs", "partial class Program : MyGridProgram { void Main() { } }"),
            SourceUnit::new("Other.cs", "partial class Program : MyGridProgram, IDisposable { public void Dispose() { } }"),
        ];
        let text = compose(&units, Config::default()).text().to_string();
        assert!(text.contains("partial class Program : MyGridProgram, IDisposable\n{"));
    }

    #[test]
    fn test_missing_required_hook_fails() {
        let mut parser = CSharpParser::new().unwrap();
        let units = [SourceUnit::new("Program.cs", "partial class Program : MyGridProgram { void Tick() { } }")];
        let err = ProgramComposer::new(Arc::new(Config::default()))
            .compose(&units, &mut parser)
            .unwrap_err();
        assert!(matches!(err, ScriptfoldError::InvariantViolation(ref m) if m.contains("`Main`")));

        let mut config = Config::default();
        config.project.required_hooks.clear();
        assert!(ProgramComposer::new(Arc::new(config)).compose(&units, &mut parser).is_ok());
    }
}
