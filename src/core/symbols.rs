// src/core/symbols.rs
//! Name-based symbol analysis over a composition.
//!
//! Symbols are identified by name: every identifier token with the same text
//! belongs to the same symbol. That is coarse, but it is consistent, which is
//! what renaming and trimming need. Names that may bind to something outside
//! the project (members reached through receivers of unknown type, named
//! arguments, initializers of external types) are reported as externally
//! bound so later passes leave them alone.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Range;
use tree_sitter::Node;

use super::composition::Composition;
use super::parser::{self, SyntaxDocument};

/// Names the renamer never touches: contextual keywords and members the
/// host runtime provides
pub const RESERVED_NAMES: &[&str] = &[
    "value", "var", "dynamic", "nameof", "get", "set", "init", "add", "remove", "global",
    "partial", "async", "await", "yield", "where", "select", "from", "join", "let", "orderby",
    "group", "into", "on", "equals", "by", "ascending", "descending", "when", "record", "with",
    "managed", "unmanaged", "notnull", "args", "_",
    "Runtime", "Echo", "Me", "GridTerminalSystem", "Storage", "IGC",
];

/// Members the compiler or framework binds by shape rather than by a
/// spelled-out call: deconstruction, `foreach`, `using`, `await`,
/// collection initializers and common overridable object members
pub const PATTERN_MEMBERS: &[&str] = &[
    "Deconstruct", "GetEnumerator", "MoveNext", "Current", "Reset", "Dispose", "GetAwaiter",
    "GetResult", "IsCompleted", "OnCompleted", "Add", "CompareTo", "Compare", "Equals",
    "GetHashCode", "ToString", "Invoke",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Type,
    Method,
    Constructor,
    Field,
    Property,
    Event,
    EnumMember,
    Parameter,
    TypeParameter,
    Local,
}

/// Where a declaration lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    File,
    Namespace,
    EntryType,
    /// Member of a type other than the entry type
    Member,
    /// Parameters, locals and anything else inside a body
    Local,
}

#[derive(Debug, Clone)]
pub struct SymbolDefinitionInfo {
    pub name: String,
    pub kind: SymbolKind,
    /// Range of the declaring node
    pub declaration: Range<usize>,
    pub name_range: Range<usize>,
    pub scope: Scope,
    pub is_protected: bool,
}

/// One non-declaring occurrence of a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub range: Range<usize>,
    pub inside_entry_type: bool,
}

/// Result of analyzing one composition
#[derive(Debug, Clone, Default)]
pub struct SemanticModel {
    definitions: Vec<SymbolDefinitionInfo>,
    usages: BTreeMap<String, Vec<Location>>,
    identifiers: BTreeMap<String, Vec<Range<usize>>>,
    externally_bound: BTreeSet<String>,
}

impl SemanticModel {
    pub fn analyze(composition: &Composition) -> Self {
        let document = composition.document();
        let mut analyzer = Analyzer {
            document,
            composition,
            project_types: BTreeSet::new(),
            typed_names: HashMap::new(),
            definitions: Vec::new(),
            declaration_names: HashSet::new(),
        };

        analyzer.collect_types(document.root());
        analyzer.collect_definitions(document.root());

        let mut model = SemanticModel::default();
        let entry_body = composition.entry_body();

        for id in identifier_nodes(document) {
            let name = document.node_text(id).to_string();
            let range = id.byte_range();
            model.identifiers.entry(name.clone()).or_default().push(range.clone());

            if analyzer.declaration_names.contains(&range.start) {
                continue;
            }
            if analyzer.binds_externally(id) {
                model.externally_bound.insert(name.clone());
            }
            model.usages.entry(name).or_default().push(Location {
                inside_entry_type: parser::contains(&entry_body, &range),
                range,
            });
        }

        model.definitions = analyzer.definitions;
        model
    }

    /// All definitions in source order
    pub fn definitions(&self) -> &[SymbolDefinitionInfo] {
        &self.definitions
    }

    /// Usage record of a name
    pub fn usages(&self, name: &str) -> &[Location] {
        self.usages.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether a name is used anywhere outside the entry type's body
    pub fn is_referenced_outside_entry(&self, name: &str) -> bool {
        self.usages(name).iter().any(|l| !l.inside_entry_type)
    }

    /// Every identifier token (declaring or not) with this text
    pub fn occurrences(&self, name: &str) -> &[Range<usize>] {
        self.identifiers.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn identifier_names(&self) -> impl Iterator<Item = &String> {
        self.identifiers.keys()
    }

    /// Names that must keep their spelling
    pub fn protected_names(&self, preserve: &[String]) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .definitions
            .iter()
            .filter(|d| d.is_protected)
            .map(|d| d.name.clone())
            .collect();
        names.extend(self.externally_bound.iter().cloned());
        names.extend(RESERVED_NAMES.iter().chain(PATTERN_MEMBERS).map(|s| s.to_string()));
        names.extend(preserve.iter().cloned());
        names
    }

    /// Distinct renamable names, ordered by first declaration
    pub fn renamable_names(&self, preserve: &[String]) -> Vec<String> {
        let protected = self.protected_names(preserve);
        let mut seen = HashSet::new();
        self.definitions
            .iter()
            .filter(|d| !protected.contains(&d.name))
            .filter(|d| seen.insert(d.name.clone()))
            .map(|d| d.name.clone())
            .collect()
    }
}

/// Identifier-like leaves, including aliased lambda parameters
pub fn identifier_nodes(document: &SyntaxDocument) -> Vec<Node<'_>> {
    let mut found = Vec::new();
    parser::walk(document.root(), &mut |node| match node.kind() {
        "identifier" => {
            found.push(node);
            false
        }
        "implicit_parameter" if node.child_count() == 0 => {
            found.push(node);
            false
        }
        kind => !parser::is_comment(kind),
    });
    found
}

struct Analyzer<'d> {
    document: &'d SyntaxDocument,
    composition: &'d Composition,
    project_types: BTreeSet<String>,
    /// Declared type text per name (fields, locals, parameters, properties,
    /// method return types)
    typed_names: HashMap<String, Vec<String>>,
    definitions: Vec<SymbolDefinitionInfo>,
    /// Start offsets of declaring identifiers
    declaration_names: HashSet<usize>,
}

impl<'d> Analyzer<'d> {
    fn text(&self, node: Node<'_>) -> &'d str {
        &self.document.text()[node.byte_range()]
    }

    fn collect_types(&mut self, root: Node<'d>) {
        let mut names = BTreeSet::new();
        parser::walk(root, &mut |node| {
            if parser::is_type_declaration(node.kind()) {
                if let Some(name) = parser::name_node(node) {
                    names.insert(self.document.node_text(name).to_string());
                }
            }
            true
        });
        self.project_types = names;
    }

    fn collect_definitions(&mut self, root: Node<'d>) {
        let mut nodes = Vec::new();
        parser::walk(root, &mut |node| {
            nodes.push(node);
            true
        });
        for node in nodes {
            self.visit_declaration(node);
        }
    }

    fn visit_declaration(&mut self, node: Node<'d>) {
        let kind = node.kind();
        let symbol_kind = match kind {
            k if parser::is_type_declaration(k) => SymbolKind::Type,
            "method_declaration" => SymbolKind::Method,
            "local_function_statement" => SymbolKind::Local,
            "constructor_declaration" | "destructor_declaration" => SymbolKind::Constructor,
            "property_declaration" => SymbolKind::Property,
            "event_declaration" => SymbolKind::Event,
            "enum_member_declaration" => SymbolKind::EnumMember,
            "parameter" => SymbolKind::Parameter,
            "type_parameter" => SymbolKind::TypeParameter,
            "variable_declarator" => self.declarator_kind(node),
            "catch_declaration" | "declaration_expression" | "declaration_pattern" => SymbolKind::Local,
            "foreach_statement" => SymbolKind::Local,
            "implicit_parameter" => SymbolKind::Parameter,
            _ => return,
        };

        let name = match kind {
            "foreach_statement" => node
                .child_by_field_name("left")
                .filter(|n| n.kind() == "identifier"),
            "implicit_parameter" => parser::name_node(node).or(Some(node)),
            "declaration_pattern" => self.pattern_designation(node),
            "catch_declaration" | "declaration_expression" => node
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier"),
            _ => parser::name_node(node),
        };
        let Some(name) = name else { return };

        self.record_type(kind, node, self.text(name));
        let scope = self.scope_of(node);
        let definition = SymbolDefinitionInfo {
            name: self.text(name).to_string(),
            kind: symbol_kind,
            declaration: node.byte_range(),
            name_range: name.byte_range(),
            scope,
            is_protected: self.is_protected(node, symbol_kind, scope, self.text(name)),
        };
        self.declaration_names.insert(definition.name_range.start);
        self.definitions.push(definition);
    }

    /// Variable introduced by `is T name`, never the type itself
    fn pattern_designation(&self, node: Node<'d>) -> Option<Node<'d>> {
        if let Some(name) = node.child_by_field_name("name").filter(|n| n.kind() == "identifier") {
            return Some(name);
        }
        let ty = node.child_by_field_name("type").map(|t| t.id());
        let identifiers: Vec<_> = parser::named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "identifier" && Some(n.id()) != ty)
            .collect();
        match (ty, identifiers.as_slice()) {
            (Some(_), [.., last]) => Some(*last),
            (None, [_, .., last]) => Some(*last),
            _ => None,
        }
    }

    fn declarator_kind(&self, node: Node<'_>) -> SymbolKind {
        match parser::ancestor(node, |n| {
            matches!(n.kind(), "field_declaration" | "event_field_declaration" | "local_declaration_statement"
                | "block" | "using_statement" | "for_statement" | "fixed_statement")
        })
        .map(|n| n.kind())
        {
            Some("field_declaration") => SymbolKind::Field,
            Some("event_field_declaration") => SymbolKind::Event,
            _ => SymbolKind::Local,
        }
    }

    /// Remember the declared type of a name for receiver resolution
    fn record_type(&mut self, kind: &str, node: Node<'d>, name: &str) {
        let declared = match kind {
            "variable_declarator" => node.parent().and_then(|decl| {
                let ty = decl.child_by_field_name("type")?;
                if self.text(ty) == "var" || ty.kind() == "implicit_type" {
                    Some(self.initializer_type(node).unwrap_or_else(|| "?".to_string()))
                } else {
                    Some(self.text(ty).to_string())
                }
            }),
            "parameter" | "property_declaration" | "declaration_expression" | "event_declaration" => node
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string()),
            "method_declaration" | "local_function_statement" => node
                .child_by_field_name("returns")
                .or_else(|| node.child_by_field_name("type"))
                .map(|t| self.text(t).to_string()),
            "foreach_statement" => node.child_by_field_name("type").map(|t| {
                let text = self.text(t);
                if text == "var" { "?".to_string() } else { text.to_string() }
            }),
            _ => None,
        };
        if let Some(ty) = declared {
            self.typed_names
                .entry(name.to_string())
                .or_default()
                .push(normalize_type(&ty));
        }
    }

    fn initializer_type(&self, declarator: Node<'_>) -> Option<String> {
        let mut found = None;
        for child in parser::named_children(declarator) {
            let expr = if child.kind() == "equals_value_clause" {
                parser::named_children(child).into_iter().next()
            } else {
                Some(child)
            };
            if let Some(expr) = expr {
                if matches!(expr.kind(), "object_creation_expression" | "array_creation_expression") {
                    found = expr.child_by_field_name("type").map(|t| self.text(t).to_string());
                }
            }
        }
        found
    }

    fn scope_of(&self, node: Node<'_>) -> Scope {
        let Some(parent) = node.parent() else { return Scope::File };
        match parent.kind() {
            "compilation_unit" => Scope::File,
            "declaration_list" => match parent.parent() {
                Some(owner) if parser::is_namespace(owner.kind()) => Scope::Namespace,
                Some(owner) if owner.byte_range() == self.composition.entry_range() => Scope::EntryType,
                _ => Scope::Member,
            },
            "enum_member_declaration_list" => Scope::Member,
            "variable_declaration" => match parent.parent() {
                Some(field) if matches!(field.kind(), "field_declaration" | "event_field_declaration") => {
                    self.scope_of(field)
                }
                _ => Scope::Local,
            },
            k if parser::is_namespace(k) => Scope::Namespace,
            _ => Scope::Local,
        }
    }

    fn is_protected(&self, node: Node<'_>, kind: SymbolKind, scope: Scope, name: &str) -> bool {
        let config = self.composition.config();
        if self.composition.annotations().is_preserved(&node.byte_range()) {
            return true;
        }
        if kind == SymbolKind::Type && name == config.project.entry_type {
            return true;
        }
        if scope == Scope::EntryType && config.project.hooks.iter().any(|h| h == name) {
            return true;
        }

        let owner = match kind {
            SymbolKind::Field | SymbolKind::Event if node.kind() == "variable_declarator" => {
                parser::ancestor(node, |n| matches!(n.kind(), "field_declaration" | "event_field_declaration"))
                    .unwrap_or(node)
            }
            _ => node,
        };

        if parser::has_modifier(self.document, owner, "override")
            || parser::has_modifier(self.document, owner, "extern")
        {
            return true;
        }
        if parser::named_children(owner).iter().any(|c| c.kind() == "explicit_interface_specifier") {
            return true;
        }

        // Public members of types that extend something outside the project
        // may implement an external contract
        if scope == Scope::Member && parser::has_modifier(self.document, owner, "public") {
            if let Some(container) = owner.parent().and_then(|list| list.parent()) {
                if self.has_external_base(container) {
                    return true;
                }
            }
        }
        false
    }

    fn has_external_base(&self, type_decl: Node<'_>) -> bool {
        let Some(bases) = parser::named_children(type_decl).into_iter().find(|c| c.kind() == "base_list") else {
            return false;
        };
        parser::named_children(bases).into_iter().any(|base| {
            let base_name = base_name(self.text(base));
            !self.project_types.contains(base_name)
        })
    }

    /// Whether a non-declaring identifier may refer to something outside the
    /// project
    fn binds_externally(&self, id: Node<'_>) -> bool {
        let name_node = match id.parent() {
            Some(p) if p.kind() == "generic_name" => p,
            _ => id,
        };
        let Some(parent) = name_node.parent() else { return false };

        match parent.kind() {
            "member_access_expression" | "qualified_name" | "member_binding_expression" => {
                if !is_right_side(parent, name_node) {
                    return false;
                }
                let receiver = match parent.kind() {
                    "member_access_expression" => parent
                        .child_by_field_name("expression")
                        .or_else(|| parser::named_children(parent).into_iter().next()),
                    "qualified_name" => parent
                        .child_by_field_name("qualifier")
                        .or_else(|| parser::named_children(parent).into_iter().next()),
                    _ => parser::ancestor(parent, |n| n.kind() == "conditional_access_expression").and_then(|c| {
                        c.child_by_field_name("condition")
                            .or_else(|| parser::named_children(c).into_iter().next())
                    }),
                };
                match receiver {
                    Some(r) => !self.resolves_to_project_type(r),
                    None => true,
                }
            }
            "name_colon" => true,
            "argument" => parent.child_by_field_name("name").map(|n| n.id()) == Some(name_node.id()),
            "assignment_expression" => {
                let is_left = parent.child_by_field_name("left").map(|n| n.id()) == Some(name_node.id())
                    || parser::named_children(parent).first().map(|n| n.id()) == Some(name_node.id());
                let creation = parent
                    .parent()
                    .filter(|p| p.kind() == "initializer_expression")
                    .and_then(|p| p.parent());
                match creation {
                    Some(c) if is_left && c.kind() == "object_creation_expression" => {
                        let ty = c.child_by_field_name("type").map(|t| self.text(t)).unwrap_or("");
                        !self.project_types.contains(base_name(ty))
                    }
                    Some(c) if is_left => c.kind() != "anonymous_object_creation_expression",
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn resolves_to_project_type(&self, expr: Node<'_>) -> bool {
        self.resolve(expr, 0)
            .map_or(false, |ty| self.project_types.contains(base_name(&ty)))
    }

    /// Best-effort static type of an expression
    fn resolve(&self, expr: Node<'_>, depth: usize) -> Option<String> {
        if depth > 8 {
            return None;
        }
        match expr.kind() {
            "identifier" => {
                let name = self.text(expr);
                if self.project_types.contains(name) {
                    return Some(name.to_string());
                }
                self.unique_type(name)
            }
            "generic_name" => parser::named_children(expr)
                .into_iter()
                .find(|n| n.kind() == "identifier")
                .and_then(|id| self.resolve(id, depth + 1)),
            "this_expression" | "this" => parser::ancestor(expr, |n| parser::is_type_declaration(n.kind()))
                .and_then(parser::name_node)
                .map(|n| self.text(n).to_string()),
            "member_access_expression" | "qualified_name" => {
                let children = parser::named_children(expr);
                let receiver = children.first()?;
                let member = children.last()?;
                let receiver_type = self.resolve(*receiver, depth + 1)?;
                if !self.project_types.contains(base_name(&receiver_type)) {
                    return None;
                }
                let member_name = self.simple_name(*member)?;
                if self.project_types.contains(member_name) {
                    return Some(member_name.to_string());
                }
                self.unique_type(member_name)
            }
            "invocation_expression" => {
                let function = expr
                    .child_by_field_name("function")
                    .or_else(|| parser::named_children(expr).into_iter().next())?;
                match function.kind() {
                    "identifier" | "generic_name" => self.unique_type(self.simple_name(function)?),
                    _ => self.resolve(function, depth + 1),
                }
            }
            "object_creation_expression" | "cast_expression" => expr
                .child_by_field_name("type")
                .map(|t| normalize_type(self.text(t))),
            "parenthesized_expression" => parser::named_children(expr)
                .into_iter()
                .next()
                .and_then(|inner| self.resolve(inner, depth + 1)),
            "element_access_expression" => {
                let target = expr
                    .child_by_field_name("expression")
                    .or_else(|| parser::named_children(expr).into_iter().next())?;
                element_type(&self.resolve(target, depth + 1)?)
            }
            _ => None,
        }
    }

    fn simple_name(&self, node: Node<'_>) -> Option<&'d str> {
        match node.kind() {
            "identifier" => Some(self.text(node)),
            "generic_name" => parser::named_children(node)
                .into_iter()
                .find(|n| n.kind() == "identifier")
                .map(|n| self.text(n)),
            _ => None,
        }
    }

    /// The declared type of a name when all its declarations agree
    fn unique_type(&self, name: &str) -> Option<String> {
        let types = self.typed_names.get(name)?;
        let first = types.first()?;
        if first == "?" || types.iter().any(|t| t != first) {
            return None;
        }
        Some(first.clone())
    }
}

fn is_right_side(parent: Node<'_>, name_node: Node<'_>) -> bool {
    if let Some(name) = parent.child_by_field_name("name") {
        return name.id() == name_node.id();
    }
    let named = parser::named_children(parent);
    named.len() == 1 || named.last().map(|n| n.id()) == Some(name_node.id())
}

fn normalize_type(ty: &str) -> String {
    let compact: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
    compact.trim_end_matches('?').to_string()
}

/// Simple name of a possibly qualified, generic type
pub fn base_name(ty: &str) -> &str {
    let ty = ty.trim().trim_end_matches('?');
    let ty = ty.split('<').next().unwrap_or(ty);
    ty.rsplit('.').next().unwrap_or(ty).trim()
}

/// Element type of an array or the last type argument of a generic
fn element_type(ty: &str) -> Option<String> {
    if let Some(inner) = ty.strip_suffix("[]") {
        return Some(inner.to_string());
    }
    let open = ty.find('<')?;
    let args = ty.get(open + 1..ty.len().checked_sub(1)?)?;
    let mut depth = 0;
    let mut last_start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => last_start = i + 1,
            _ => {}
        }
    }
    Some(args[last_start..].trim().to_string())
}
