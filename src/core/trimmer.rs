// src/core/trimmer.rs - Reachability-based removal of unused declarations
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use tracing::{debug, info};
use tree_sitter::Node;

use crate::error::{ScriptfoldError, Result};
use super::composition::Composition;
use super::parser::{self, CSharpParser, Edit, SyntaxDocument};
use super::pipeline::Pass;
use super::symbols;

/// Member declarations that can be removed on their own
const TRIMMABLE_MEMBERS: &[&str] = &[
    "method_declaration",
    "property_declaration",
    "field_declaration",
    "event_field_declaration",
    "event_declaration",
];

/// Types whose members are trimmed individually
const MEMBER_OWNERS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "record_declaration",
    "record_struct_declaration",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Type,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Container to nested declaration
    Declares,
    /// Declaration whose body names another declaration
    References,
    /// Container to a member that lives as long as the container does
    /// (overrides, interface implementations)
    KeptWith,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub names: Vec<String>,
    /// Extension method names that also reach the declaring type
    pub aliases: Vec<String>,
    pub range: Range<usize>,
    /// Range removed together with the declaration, including attached
    /// comments and the line it occupies
    pub removal: Range<usize>,
    pub parent: Option<usize>,
    pub keep_with_parent: bool,
    pub preserved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
}

/// Arena of declarations with index edges
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    /// Nodes named from the entry type, from top-level code or by
    /// configuration
    roots: Vec<usize>,
}

impl ReferenceGraph {
    pub fn build(composition: &Composition) -> Self {
        let document = composition.document();
        let mut graph = ReferenceGraph::default();
        graph.collect(composition, document.root(), None);

        // Attribute every identifier to the innermost declaration holding it
        let mut references: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); graph.nodes.len()];
        let mut root_names: BTreeSet<&str> = BTreeSet::new();
        for id in symbols::identifier_nodes(document) {
            let range = id.byte_range();
            let owner = graph.nodes.iter().rposition(|n| parser::contains(&n.range, &range));
            match owner {
                Some(i) => references[i].insert(document.node_text(id)),
                None => root_names.insert(document.node_text(id)),
            };
        }
        let config = composition.config();
        root_names.extend(config.minify.preserve_names.iter().map(|s| s.as_str()));
        root_names.extend(config.project.hooks.iter().map(|s| s.as_str()));

        let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, node) in graph.nodes.iter().enumerate() {
            for name in node.names.iter().chain(node.aliases.iter()) {
                by_name.entry(name.as_str()).or_default().push(i);
            }
        }

        let mut edges = Vec::new();
        for (from, names) in references.iter().enumerate() {
            for name in names {
                for &to in by_name.get(name).into_iter().flatten() {
                    if to != from {
                        edges.push(Edge { from, to, kind: EdgeKind::References });
                    }
                }
            }
        }
        for (i, node) in graph.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                edges.push(Edge { from: parent, to: i, kind: EdgeKind::Declares });
                if node.keep_with_parent {
                    edges.push(Edge { from: parent, to: i, kind: EdgeKind::KeptWith });
                }
            }
        }
        graph.edges = edges;

        let mut roots: Vec<usize> = root_names
            .iter()
            .flat_map(|name| by_name.get(name).into_iter().flatten().copied())
            .collect();
        roots.sort_unstable();
        roots.dedup();
        graph.roots = roots;
        graph
    }

    fn collect(&mut self, composition: &Composition, node: Node<'_>, parent: Option<usize>) {
        let document = composition.document();
        let kind = node.kind();

        if parser::is_type_declaration(kind) && node.byte_range() != composition.entry_range() {
            let index = self.push(composition, node, NodeKind::Type, parent);
            let Some(body) = parser::body_node(node) else { return };
            for child in parser::named_children(body) {
                if MEMBER_OWNERS.contains(&kind) && TRIMMABLE_MEMBERS.contains(&child.kind()) {
                    let member = self.push(composition, child, NodeKind::Member, Some(index));
                    self.nodes[member].keep_with_parent = is_contract_member(document, node, child)
                        || self.nodes[member].names.iter().any(|n| symbols::PATTERN_MEMBERS.contains(&n.as_str()));
                } else {
                    self.collect(composition, child, Some(index));
                }
            }
            return;
        }

        for child in parser::named_children(node) {
            self.collect(composition, child, parent);
        }
    }

    fn push(&mut self, composition: &Composition, node: Node<'_>, kind: NodeKind, parent: Option<usize>) -> usize {
        let document = composition.document();
        let names = parser::declared_names(document, node)
            .into_iter()
            .map(str::to_string)
            .collect();
        let aliases = if kind == NodeKind::Type { extension_methods(document, node) } else { Vec::new() };

        self.nodes.push(GraphNode {
            kind,
            names,
            aliases,
            range: node.byte_range(),
            removal: removal_range(document, node),
            parent,
            keep_with_parent: false,
            preserved: composition.annotations().is_preserved(&node.byte_range()),
        });
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Reachable flags per node, iterated to a fixed point
    pub fn reachable(&self) -> Result<Vec<bool>> {
        let mut live = vec![false; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if node.preserved {
                live[i] = true;
            }
        }

        let limit = self.nodes.len() + 2;
        let mut sweeps = 0;
        loop {
            sweeps += 1;
            if sweeps > limit {
                return Err(ScriptfoldError::TrimmerCycle { iterations: sweeps - 1 });
            }

            let mut changed = false;
            for &root in &self.roots {
                if !live[root] && self.parent_live(root, &live) {
                    live[root] = true;
                    changed = true;
                }
            }
            for edge in &self.edges {
                let reach = match edge.kind {
                    EdgeKind::References => live[edge.from] && !live[edge.to] && self.parent_live(edge.to, &live),
                    EdgeKind::KeptWith => live[edge.from] && !live[edge.to],
                    // a live nested declaration keeps its container
                    EdgeKind::Declares => live[edge.to] && !live[edge.from],
                };
                if reach {
                    let target = if edge.kind == EdgeKind::Declares { edge.from } else { edge.to };
                    live[target] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!("Reachability settled after {} sweeps", sweeps);
        Ok(live)
    }

    fn parent_live(&self, index: usize, live: &[bool]) -> bool {
        match (self.nodes[index].kind, self.nodes[index].parent) {
            (NodeKind::Member, Some(parent)) => live[parent],
            _ => true,
        }
    }
}

/// Removes types and members that nothing reachable refers to
pub struct TypeTrimmer;

impl Pass for TypeTrimmer {
    fn name(&self) -> &'static str {
        "type trimming"
    }

    fn run(&self, composition: &Composition, parser: &mut CSharpParser) -> Result<Composition> {
        let graph = ReferenceGraph::build(composition);
        debug!(
            "Reference graph: {} nodes, {} edges, {} roots",
            graph.nodes().len(),
            graph.edges().len(),
            graph.roots.len()
        );
        let live = graph.reachable()?;

        let mut edits = Vec::new();
        let (mut types, mut members) = (0, 0);
        for (i, node) in graph.nodes().iter().enumerate() {
            let outermost = node.parent.map_or(true, |p| live[p]);
            if live[i] || !outermost {
                continue;
            }
            debug!("Trimming {:?} {}", node.kind, node.names.join(", "));
            match node.kind {
                NodeKind::Type => types += 1,
                NodeKind::Member => members += 1,
            }
            edits.push(Edit::delete(node.removal.clone()));
        }

        info!("✂️  Trimmed {} types and {} members", types, members);
        let text = parser::apply_edits(composition.text(), edits);
        composition.derive(text, parser)
    }
}

/// Members that must exist whenever their type does
fn is_contract_member(document: &SyntaxDocument, owner: Node<'_>, member: Node<'_>) -> bool {
    let has_bases = parser::named_children(owner).iter().any(|c| c.kind() == "base_list");
    ["override", "abstract", "virtual", "extern"]
        .iter()
        .any(|m| parser::has_modifier(document, member, m))
        || parser::named_children(member).iter().any(|c| c.kind() == "explicit_interface_specifier")
        || (has_bases && parser::has_modifier(document, member, "public"))
}

fn extension_methods(document: &SyntaxDocument, type_decl: Node<'_>) -> Vec<String> {
    let Some(body) = parser::body_node(type_decl) else { return Vec::new() };
    parser::named_children(body)
        .into_iter()
        .filter(|m| m.kind() == "method_declaration")
        .filter(|m| {
            m.child_by_field_name("parameters")
                .and_then(|list| parser::named_children(list).into_iter().find(|p| p.kind() == "parameter"))
                .map_or(false, |first| document.node_text(first).trim_start().starts_with("this "))
        })
        .filter_map(|m| parser::name_node(m).map(|n| document.node_text(n).to_string()))
        .collect()
}

/// The declaration plus directly attached comments, widened to whole lines
fn removal_range(document: &SyntaxDocument, node: Node<'_>) -> Range<usize> {
    let text = document.text();
    let mut start = node.start_byte();
    let mut previous = node.prev_sibling();
    while let Some(comment) = previous.filter(|p| parser::is_comment(p.kind())) {
        let between = &text[comment.end_byte()..start];
        if !between.trim().is_empty() || between.matches('\n').count() > 1 {
            break;
        }
        start = comment.start_byte();
        previous = comment.prev_sibling();
    }
    parser::whole_line_range(text, start..node.end_byte())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn trim_with(text: &str, config: Config) -> String {
        let mut parser = CSharpParser::new().unwrap();
        let composition = Composition::new(text.to_string(), Arc::new(config), &mut parser).unwrap();
        TypeTrimmer.run(&composition, &mut parser).unwrap().text().to_string()
    }

    fn trim(text: &str) -> String {
        trim_with(text, Config::default())
    }

    #[test]
    fn test_removes_unused_helper() {
        let out = trim(
            "using System;\n\npartial class Program : MyGridProgram\n{\n    void Tick() { }\n}\n\n// helper docs\nclass Helper\n{\n    int value;\n}\n",
        );
        assert_eq!(out, "using System;\n\npartial class Program : MyGridProgram\n{\n    void Tick() { }\n}\n\n");
    }

    #[test]
    fn test_keeps_transitively_referenced_types() {
        let out = trim(
            "class Program\n{\n    Alpha alpha = new Alpha();\n    void Main() { alpha.Next(); }\n}\nclass Alpha\n{\n    public Beta Next() { return new Beta(); }\n}\nclass Beta { }\nclass Gamma { Delta d; }\nclass Delta { Gamma g; }\n",
        );
        assert!(out.contains("class Alpha"));
        assert!(out.contains("class Beta"));
        // mutually referencing but unreachable
        assert!(!out.contains("class Gamma"));
        assert!(!out.contains("class Delta"));
    }

    #[test]
    fn test_trims_unused_members_of_live_types() {
        let out = trim(
            "class Program\n{\n    void Main() { new Helper().Used(); }\n}\nclass Helper\n{\n    public void Used() { }\n    void Unused() { Other(); }\n    void Other() { }\n    public override string ToString() { return \"\"; }\n}\n",
        );
        assert!(out.contains("void Used()"));
        assert!(!out.contains("Unused"));
        assert!(!out.contains("void Other()"));
        assert!(out.contains("override string ToString()"));
    }

    #[test]
    fn test_keeps_members_bound_by_shape() {
        let out = trim(
            "class Program\n{\n    void Main()\n    {\n        var (x, y) = new Point();\n        foreach (var i in new Bag()) { Echo(x + y + i); }\n    }\n}\nstruct Point\n{\n    public int X;\n    public void Deconstruct(out int x, out int y) { x = X; y = 0; }\n    void Unused() { }\n}\nclass Bag\n{\n    public BagEnum GetEnumerator() { return new BagEnum(); }\n}\nclass BagEnum\n{\n    int position;\n    public int Current { get { return position; } }\n    public bool MoveNext() { return ++position < 3; }\n}\n",
        );
        assert!(out.contains("public void Deconstruct(out int x, out int y)"));
        assert!(out.contains("public BagEnum GetEnumerator()"));
        assert!(out.contains("class BagEnum"));
        assert!(out.contains("public int Current"));
        assert!(out.contains("public bool MoveNext()"));
        assert!(out.contains("int position;"));
        assert!(!out.contains("Unused"));
    }

    #[test]
    fn test_preserved_declarations_survive() {
        let mut config = Config::default();
        config.minify.preserve_names = vec!["Keep".to_string()];
        let out = trim_with(
            "class Program { }\nclass Keep { }\n#region mdk preserve\nclass Region { }\n#endregion\nclass Gone { }\n",
            config,
        );
        assert!(out.contains("class Keep"));
        assert!(out.contains("class Region"));
        assert!(!out.contains("class Gone"));
    }

    #[test]
    fn test_extension_methods_reach_their_type() {
        let out = trim(
            "class Program\n{\n    void Main() { int x = 2; x.Twice(); }\n}\nstatic class Ext\n{\n    public static int Twice(this int v) { return v * 2; }\n}\n",
        );
        assert!(out.contains("static class Ext"));
        assert!(out.contains("Twice(this int v)"));
    }

    #[test]
    fn test_trim_leaves_no_dangling_reference() {
        let mut parser = CSharpParser::new().unwrap();
        let composition = Composition::new(
            "class Program\n{\n    Node root;\n    void Main() { root.Child.Tip = null; }\n}\nclass Node\n{\n    public Node Child;\n    public Leaf Tip;\n    void Dead() { Orphan.Touch(); }\n}\nclass Leaf { }\nstatic class Orphan { public static void Touch() { } }\n".to_string(),
            Arc::new(Config::default()),
            &mut parser,
        )
        .unwrap();
        let trimmed = TypeTrimmer.run(&composition, &mut parser).unwrap();

        let model = symbols::SemanticModel::analyze(&trimmed);
        let declared: BTreeSet<&str> = model.definitions().iter().map(|d| d.name.as_str()).collect();
        for name in ["Node", "Leaf", "Child", "Tip", "root"] {
            assert!(declared.contains(name), "{} was trimmed", name);
        }
        assert!(!trimmed.text().contains("Orphan"));
    }

    #[test]
    fn test_graph_edges() {
        let mut parser = CSharpParser::new().unwrap();
        let composition = Composition::new(
            "class Program { A a; }\nclass A : Base { public void Run() { } B b; }\nclass B { }\nclass Base { }".to_string(),
            Arc::new(Config::default()),
            &mut parser,
        )
        .unwrap();
        let graph = ReferenceGraph::build(&composition);
        let index = |name: &str| graph.nodes().iter().position(|n| n.names == vec![name.to_string()]).unwrap();

        let (a, b, run) = (index("A"), index("B"), index("Run"));
        assert!(graph.edges().contains(&Edge { from: a, to: run, kind: EdgeKind::Declares }));
        assert!(graph.edges().contains(&Edge { from: a, to: run, kind: EdgeKind::KeptWith }));
        let field_b = graph.nodes().iter().position(|n| n.names == vec!["b".to_string()]).unwrap();
        assert!(graph.edges().contains(&Edge { from: field_b, to: b, kind: EdgeKind::References }));

        let live = graph.reachable().unwrap();
        assert!(live[a] && live[run] && live[index("Base")]);
        // `b` is never read, so neither it nor its type survive
        assert!(!live[field_b] && !live[b]);
    }
}
