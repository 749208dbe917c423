// src/core/minify/renamer.rs
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::DEFAULT_RENAME_ALPHABET;
use crate::core::composition::Composition;
use crate::core::parser::{self, CSharpParser, Edit};
use crate::core::pipeline::Pass;
use crate::core::symbols::SemanticModel;
use crate::error::{ScriptfoldError, Result};

/// Synthetic names longer than this mean the alphabet cannot cover the
/// project
const MAX_SYNTHETIC_LENGTH: usize = 6;

const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class",
    "const", "continue", "decimal", "default", "delegate", "do", "double", "else", "enum", "event",
    "explicit", "extern", "false", "finally", "fixed", "float", "for", "foreach", "goto", "if",
    "implicit", "in", "int", "interface", "internal", "is", "lock", "long", "namespace", "new",
    "null", "object", "operator", "out", "override", "params", "private", "protected", "public",
    "readonly", "ref", "return", "sbyte", "sealed", "short", "sizeof", "stackalloc", "static",
    "string", "struct", "switch", "this", "throw", "true", "try", "typeof", "uint", "ulong",
    "unchecked", "unsafe", "ushort", "using", "virtual", "void", "volatile", "while",
    "add", "and", "alias", "ascending", "async", "await", "by", "descending", "dynamic", "equals",
    "file", "from", "get", "global", "group", "init", "into", "join", "let", "managed", "nameof",
    "nint", "not", "notnull", "nuint", "on", "or", "orderby", "partial", "record", "remove",
    "required", "scoped", "select", "set", "unmanaged", "value", "var", "when", "where", "with",
    "yield",
];

/// Original name -> synthetic name, in assignment order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    entries: BTreeMap<String, String>,
    order: Vec<String>,
}

impl RenameMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs in the order they were assigned
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), self.entries[k].as_str()))
    }

    fn insert(&mut self, from: String, to: String) {
        self.order.push(from.clone());
        self.entries.insert(from, to);
    }
}

/// Generates `a, b, ..., Z, aa, ab, ...` over an alphabet
#[derive(Debug, Clone)]
pub struct NameGenerator {
    alphabet: Vec<char>,
    next: usize,
}

impl NameGenerator {
    pub fn new(alphabet: &str) -> Result<Self> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(ScriptfoldError::RenameCollision("rename alphabet is empty".to_string()));
        }
        if let Some(bad) = alphabet.iter().find(|c| !(c.is_ascii_alphanumeric() || **c == '_')) {
            return Err(ScriptfoldError::RenameCollision(format!(
                "rename alphabet contains `{}`, which cannot appear in an identifier",
                bad
            )));
        }
        let distinct: BTreeSet<_> = alphabet.iter().collect();
        if distinct.len() != alphabet.len() {
            return Err(ScriptfoldError::RenameCollision("rename alphabet repeats characters".to_string()));
        }
        Ok(Self { alphabet, next: 0 })
    }

    /// Name for a given index in bijective base-N
    pub fn name_at(&self, mut index: usize) -> String {
        let base = self.alphabet.len();
        let mut chars = Vec::new();
        loop {
            chars.push(self.alphabet[index % base]);
            if index < base {
                break;
            }
            index = index / base - 1;
        }
        chars.iter().rev().collect()
    }

    /// Next usable candidate without consuming it
    fn peek(&mut self, taken: &BTreeSet<String>) -> Result<String> {
        loop {
            let candidate = self.name_at(self.next);
            if candidate.chars().count() > MAX_SYNTHETIC_LENGTH {
                return Err(ScriptfoldError::RenameCollision(
                    "synthetic names exhausted the alphabet".to_string(),
                ));
            }
            let usable = !candidate.starts_with(|c: char| c.is_ascii_digit())
                && !CSHARP_KEYWORDS.contains(&candidate.as_str())
                && !taken.contains(&candidate);
            if usable {
                return Ok(candidate);
            }
            self.next += 1;
        }
    }

    fn consume(&mut self) {
        self.next += 1;
    }
}

/// Shrinks every renamable symbol to the shortest free synthetic name
pub struct SymbolRenamer {
    alphabet: String,
}

impl Default for SymbolRenamer {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_RENAME_ALPHABET.to_string(),
        }
    }
}

impl SymbolRenamer {
    /// The alphabet is checked when the first plan is made
    pub fn new(alphabet: &str) -> Self {
        Self {
            alphabet: alphabet.to_string(),
        }
    }

    /// Assign synthetic names to the renamable names of a composition
    pub fn plan(&self, model: &SemanticModel, preserve: &[String]) -> Result<RenameMap> {
        let mut generator = NameGenerator::new(&self.alphabet)?;
        let mut taken: BTreeSet<String> = model.identifier_names().cloned().collect();
        let mut map = RenameMap::default();

        for name in model.renamable_names(preserve) {
            let candidate = generator.peek(&taken)?;
            if name.chars().count() <= candidate.chars().count() {
                continue;
            }
            generator.consume();
            taken.insert(candidate.clone());
            map.insert(name, candidate);
        }
        Ok(map)
    }
}

impl Pass for SymbolRenamer {
    fn name(&self) -> &'static str {
        "symbol renaming"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let preserve = composition.config().minify.preserve_names.clone();
        let map = self.plan(&SemanticModel::analyze(composition), &preserve)?;
        info!("🔤 Renaming {} symbols", map.len());
        if map.is_empty() {
            return Ok(composition.clone());
        }
        for (from, to) in map.iter() {
            debug!("Planned {} -> {}", from, to);
        }

        // One symbol per step; spans move after every rename
        let mut current = composition.clone();
        let mut steps = 0;
        loop {
            let model = SemanticModel::analyze(&current);
            let next = model
                .definitions()
                .iter()
                .find_map(|d| map.get(&d.name).map(|to| (d, to.to_string())));
            let Some((definition, to)) = next else { break };
            let from = definition.name.clone();
            debug!("Renaming {:?} {} ({:?} scope) -> {}", definition.kind, from, definition.scope, to);

            steps += 1;
            if steps > map.len() {
                return Err(ScriptfoldError::RenameCollision(format!(
                    "`{}` is still declared after every planned rename was applied",
                    from
                )));
            }

            let edits = model
                .occurrences(&from)
                .iter()
                .map(|range| Edit::replace(range.clone(), to.clone()))
                .collect();
            let text = parser::apply_edits(current.text(), edits);
            current = current.derive(text, parser)?;
        }
        Ok(current)
    }
}
