//! Intra-procedural control flow.
//!
//! Each function body (and the program top level) forms a region. Regions
//! are translated structurally into chains of *units*: declarators,
//! expression statements, condition expressions, loop headers. Loops get
//! back-edges, `try`/`catch` routes every unit of the protected block into
//! the handler, and branches rejoin after the statement. The lazy
//! data-dependence overlay walks these edges backward and forward.

use std::collections::{HashMap, HashSet};

use estree::{NodeId, NodeKind, Role, SyntaxTree};

/// Entries and exits of a translated statement (sub)sequence.
#[derive(Debug, Default, Clone)]
struct Segment {
    entries: Vec<NodeId>,
    exits: Vec<NodeId>,
}

impl Segment {
    fn unit(id: NodeId) -> Segment {
        Segment {
            entries: vec![id],
            exits: vec![id],
        }
    }

    fn empty() -> Segment {
        Segment::default()
    }
}

#[derive(Debug, Default)]
pub struct ControlFlow {
    succs: HashMap<NodeId, Vec<NodeId>>,
    preds: HashMap<NodeId, Vec<NodeId>>,
    units: HashSet<NodeId>,
    /// Region root (Program or function node) -> entry units.
    entries: HashMap<NodeId, Vec<NodeId>>,
}

impl ControlFlow {
    pub fn build(tree: &SyntaxTree) -> ControlFlow {
        let mut cfg = ControlFlow::default();
        let mut builder = Builder { tree, cfg: &mut cfg };
        builder.region(tree.root());
        for node in tree.iter() {
            if node.kind.is_function() {
                builder.region(node.id);
            }
        }
        cfg
    }

    pub fn is_unit(&self, id: NodeId) -> bool {
        self.units.contains(&id)
    }

    pub fn preds(&self, unit: NodeId) -> &[NodeId] {
        self.preds.get(&unit).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn succs(&self, unit: NodeId) -> &[NodeId] {
        self.succs.get(&unit).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Entry units of a region (Program or function node).
    pub fn region_entries(&self, region: NodeId) -> &[NodeId] {
        self.entries
            .get(&region)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The unit whose subtree contains `node`, if any. Declaration names
    /// such as parameters live outside every unit.
    pub fn unit_of(&self, tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
        if self.units.contains(&node) {
            return Some(node);
        }
        tree.ancestors(node).find(|a| self.units.contains(a))
    }

    /// Test expressions the given node is control-dependent on, nearest
    /// first. A statement inside an `if` branch depends on the `if` test, a
    /// short-circuit right operand depends on the left operand, a loop body
    /// on the loop condition, a switch case body on its case test.
    pub fn control_dependencies(tree: &SyntaxTree, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = node;
        for ancestor in tree.ancestors(node) {
            let role = tree.node(cur).role;
            match tree.kind(ancestor) {
                NodeKind::IfStatement | NodeKind::ConditionalExpression => {
                    if matches!(role, Role::Consequent | Role::Alternate) {
                        if let Some(test) = tree.get_one(ancestor, Role::Test) {
                            out.push(test);
                        }
                    }
                }
                NodeKind::LogicalExpression => {
                    if role == Role::Right {
                        if let Some(left) = tree.get_one(ancestor, Role::Left) {
                            out.push(left);
                        }
                    }
                }
                NodeKind::SwitchCase => {
                    if role == Role::Consequent {
                        if let Some(test) = tree.get_one(ancestor, Role::Test) {
                            out.push(test);
                        }
                    }
                }
                NodeKind::WhileStatement | NodeKind::DoWhileStatement | NodeKind::ForStatement => {
                    if role == Role::Body {
                        if let Some(test) = tree.get_one(ancestor, Role::Test) {
                            out.push(test);
                        }
                    }
                }
                NodeKind::ForInStatement | NodeKind::ForOfStatement => {
                    if role == Role::Body {
                        if let Some(right) = tree.get_one(ancestor, Role::Right) {
                            out.push(right);
                        }
                    }
                }
                _ => {}
            }
            cur = ancestor;
        }
        out
    }
}

struct Builder<'t> {
    tree: &'t SyntaxTree,
    cfg: &'t mut ControlFlow,
}

impl Builder<'_> {
    fn region(&mut self, root: NodeId) {
        let segment = match self.tree.kind(root) {
            NodeKind::Program => self.stmt_list(self.tree.children(root).to_vec()),
            _ => match self.tree.get_one(root, Role::Body) {
                Some(body) if self.tree.kind(body) == NodeKind::BlockStatement => {
                    self.stmt_list(self.tree.children(body).to_vec())
                }
                // Arrow function with an expression body: one unit.
                Some(body) => self.register(body),
                None => Segment::empty(),
            },
        };
        self.cfg.entries.insert(root, segment.entries);
    }

    fn register(&mut self, id: NodeId) -> Segment {
        self.cfg.units.insert(id);
        Segment::unit(id)
    }

    fn edge(&mut self, from: NodeId, to: NodeId) {
        self.cfg.succs.entry(from).or_default().push(to);
        self.cfg.preds.entry(to).or_default().push(from);
    }

    fn connect(&mut self, froms: &[NodeId], tos: &[NodeId]) {
        for &f in froms {
            for &t in tos {
                self.edge(f, t);
            }
        }
    }

    fn sequence(&mut self, first: Segment, second: Segment) -> Segment {
        if first.entries.is_empty() {
            return second;
        }
        if second.entries.is_empty() {
            return first;
        }
        self.connect(&first.exits, &second.entries);
        Segment {
            entries: first.entries,
            exits: second.exits,
        }
    }

    fn stmt_list(&mut self, stmts: Vec<NodeId>) -> Segment {
        let mut acc = Segment::empty();
        for stmt in stmts {
            let seg = self.stmt(stmt);
            acc = self.sequence(acc, seg);
        }
        acc
    }

    fn stmt(&mut self, stmt: NodeId) -> Segment {
        match self.tree.kind(stmt) {
            NodeKind::VariableDeclaration => {
                let mut acc = Segment::empty();
                for declarator in self.tree.get(stmt, Role::Declarations).collect::<Vec<_>>() {
                    let seg = self.register(declarator);
                    acc = self.sequence(acc, seg);
                }
                acc
            }
            NodeKind::BlockStatement => self.stmt_list(self.tree.children(stmt).to_vec()),
            NodeKind::LabeledStatement => match self.tree.get_one(stmt, Role::Body) {
                Some(body) => self.stmt(body),
                None => Segment::empty(),
            },
            NodeKind::IfStatement => {
                let test = match self.tree.get_one(stmt, Role::Test) {
                    Some(t) => self.register(t),
                    None => return Segment::empty(),
                };
                let consequent = self
                    .tree
                    .get_one(stmt, Role::Consequent)
                    .map(|c| self.stmt(c))
                    .unwrap_or_default();
                let alternate = self.tree.get_one(stmt, Role::Alternate).map(|a| self.stmt(a));
                self.connect(&test.exits, &consequent.entries);
                let mut exits = consequent.exits;
                match alternate {
                    Some(alt) => {
                        self.connect(&test.exits, &alt.entries);
                        exits.extend(alt.exits);
                    }
                    None => exits.extend(test.exits.iter().copied()),
                }
                Segment {
                    entries: test.entries,
                    exits,
                }
            }
            NodeKind::WhileStatement => {
                let test = match self.tree.get_one(stmt, Role::Test) {
                    Some(t) => self.register(t),
                    None => return Segment::empty(),
                };
                let body = self
                    .tree
                    .get_one(stmt, Role::Body)
                    .map(|b| self.stmt(b))
                    .unwrap_or_default();
                self.connect(&test.exits, &body.entries);
                self.connect(&body.exits, &test.entries);
                Segment {
                    entries: test.entries,
                    exits: test.exits,
                }
            }
            NodeKind::DoWhileStatement => {
                let body = self
                    .tree
                    .get_one(stmt, Role::Body)
                    .map(|b| self.stmt(b))
                    .unwrap_or_default();
                let test = match self.tree.get_one(stmt, Role::Test) {
                    Some(t) => self.register(t),
                    None => return body,
                };
                self.connect(&body.exits, &test.entries);
                self.connect(&test.exits, &body.entries);
                Segment {
                    entries: if body.entries.is_empty() {
                        test.entries.clone()
                    } else {
                        body.entries
                    },
                    exits: test.exits,
                }
            }
            NodeKind::ForStatement => {
                let init = match self.tree.get_one(stmt, Role::Init) {
                    Some(init) if self.tree.kind(init) == NodeKind::VariableDeclaration => {
                        self.stmt(init)
                    }
                    Some(init) => self.register(init),
                    None => Segment::empty(),
                };
                let test = self.tree.get_one(stmt, Role::Test).map(|t| self.register(t));
                let update = self
                    .tree
                    .get_one(stmt, Role::Update)
                    .map(|u| self.register(u));
                let body = self
                    .tree
                    .get_one(stmt, Role::Body)
                    .map(|b| self.stmt(b))
                    .unwrap_or_default();

                let head = test.clone().unwrap_or_else(|| body.clone());
                let mut seg = self.sequence(init, head.clone());
                if let Some(test) = &test {
                    self.connect(&test.exits, &body.entries);
                }
                let after_body = match update {
                    Some(update) => {
                        self.connect(&body.exits, &update.entries);
                        update.exits
                    }
                    None => body.exits.clone(),
                };
                self.connect(&after_body, &head.entries);
                seg.exits = match test {
                    Some(test) => test.exits,
                    None => Vec::new(),
                };
                seg
            }
            NodeKind::ForInStatement | NodeKind::ForOfStatement => {
                // The header (pattern + iterated expression) is one unit.
                let header = self.register(stmt);
                let body = self
                    .tree
                    .get_one(stmt, Role::Body)
                    .map(|b| self.stmt(b))
                    .unwrap_or_default();
                self.connect(&header.exits, &body.entries);
                self.connect(&body.exits, &header.entries);
                Segment {
                    entries: header.entries,
                    exits: header.exits,
                }
            }
            NodeKind::SwitchStatement => {
                let discriminant = match self.tree.get_one(stmt, Role::Discriminant) {
                    Some(d) => self.register(d),
                    None => Segment::empty(),
                };
                let mut exits = Vec::new();
                let mut dispatch = discriminant.exits.clone();
                let mut fallthrough: Vec<NodeId> = Vec::new();
                for case in self.tree.get(stmt, Role::Cases).collect::<Vec<_>>() {
                    let test = self.tree.get_one(case, Role::Test).map(|t| self.register(t));
                    let body = self.stmt_list(self.tree.get(case, Role::Consequent).collect());
                    match test {
                        Some(test) => {
                            self.connect(&dispatch, &test.entries);
                            self.connect(&test.exits, &body.entries);
                            self.connect(&fallthrough, &body.entries);
                            dispatch = test.exits;
                        }
                        None => {
                            self.connect(&dispatch, &body.entries);
                            self.connect(&fallthrough, &body.entries);
                        }
                    }
                    fallthrough = body.exits;
                }
                exits.extend(fallthrough);
                exits.extend(dispatch);
                Segment {
                    entries: if discriminant.entries.is_empty() {
                        exits.clone()
                    } else {
                        discriminant.entries
                    },
                    exits,
                }
            }
            NodeKind::TryStatement => {
                let block = self
                    .tree
                    .get_one(stmt, Role::Block)
                    .map(|b| self.stmt(b))
                    .unwrap_or_default();
                let handler = self.tree.get_one(stmt, Role::Handler);
                let finalizer = self
                    .tree
                    .get_one(stmt, Role::Finalizer)
                    .map(|f| self.stmt(f));

                let mut exits = block.exits.clone();
                if let Some(handler) = handler {
                    let entry = match self.tree.get_one(handler, Role::Param) {
                        Some(param) => self.register(param),
                        None => Segment::empty(),
                    };
                    let body = self
                        .tree
                        .get_one(handler, Role::Body)
                        .map(|b| self.stmt(b))
                        .unwrap_or_default();
                    let catch = self.sequence(entry, body);
                    // Any unit of the protected block may raise.
                    let mut block_units: Vec<NodeId> = Vec::new();
                    collect_units(self.cfg, self.tree, &block.entries, &mut block_units);
                    self.connect(&block_units, &catch.entries);
                    exits.extend(catch.exits);
                }
                let seg = Segment {
                    entries: block.entries,
                    exits,
                };
                match finalizer {
                    Some(fin) => self.sequence(seg, fin),
                    None => seg,
                }
            }
            NodeKind::ReturnStatement | NodeKind::ThrowStatement => {
                let mut seg = self.register(stmt);
                seg.exits.clear();
                seg
            }
            NodeKind::BreakStatement | NodeKind::ContinueStatement => {
                let mut seg = self.register(stmt);
                seg.exits.clear();
                seg
            }
            NodeKind::EmptyStatement | NodeKind::DebuggerStatement => Segment::empty(),
            NodeKind::WithStatement => match self.tree.get_one(stmt, Role::Body) {
                Some(body) => self.stmt(body),
                None => Segment::empty(),
            },
            // Hoisted declarations and everything expression-shaped are one
            // unit each; nested function bodies become their own regions.
            _ => self.register(stmt),
        }
    }
}

/// Transitively collects the units reachable from `starts` within one
/// statement, for exception routing.
fn collect_units(
    cfg: &ControlFlow,
    _tree: &SyntaxTree,
    starts: &[NodeId],
    out: &mut Vec<NodeId>,
) {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = starts.to_vec();
    while let Some(unit) = stack.pop() {
        if !seen.insert(unit) {
            continue;
        }
        out.push(unit);
        for &next in cfg.succs(unit) {
            stack.push(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn straight_line_statements_chain() {
        // a; b;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "ExpressionStatement", "range": [0, 2],
                 "expression": {"type": "Identifier", "name": "a", "range": [0, 1]}},
                {"type": "ExpressionStatement", "range": [3, 5],
                 "expression": {"type": "Identifier", "name": "b", "range": [3, 4]}}
            ]
        });
        let tree = estree::parse_document(&doc, "t.js", "a; b;").unwrap();
        let cfg = ControlFlow::build(&tree);
        let first = tree.children(tree.root())[0];
        let second = tree.children(tree.root())[1];
        assert_eq!(cfg.region_entries(tree.root()), &[first]);
        assert_eq!(cfg.succs(first), &[second]);
        assert_eq!(cfg.preds(second), &[first]);
    }

    #[test]
    fn if_branches_rejoin() {
        // if (c) a; else b; d;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "IfStatement", "range": [0, 18],
                 "test": {"type": "Identifier", "name": "c", "range": [4, 5]},
                 "consequent": {"type": "ExpressionStatement", "range": [7, 9],
                                "expression": {"type": "Identifier", "name": "a", "range": [7, 8]}},
                 "alternate": {"type": "ExpressionStatement", "range": [15, 17],
                               "expression": {"type": "Identifier", "name": "b", "range": [15, 16]}}},
                {"type": "ExpressionStatement", "range": [18, 20],
                 "expression": {"type": "Identifier", "name": "d", "range": [18, 19]}}
            ]
        });
        let tree = estree::parse_document(&doc, "t.js", "if (c) a; else b; d;").unwrap();
        let cfg = ControlFlow::build(&tree);
        let if_stmt = tree.children(tree.root())[0];
        let after = tree.children(tree.root())[1];
        let test = tree.get_one(if_stmt, Role::Test).unwrap();
        let cons = tree.get_one(if_stmt, Role::Consequent).unwrap();
        let alt = tree.get_one(if_stmt, Role::Alternate).unwrap();
        assert_eq!(cfg.succs(test), &[cons, alt]);
        assert_eq!(cfg.succs(cons), &[after]);
        assert_eq!(cfg.succs(alt), &[after]);

        // Statements in the branches are control-dependent on the test.
        let deps = ControlFlow::control_dependencies(&tree, cons);
        assert_eq!(deps, vec![test]);
    }

    #[test]
    fn while_loop_has_back_edge() {
        // while (c) { a; }
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "WhileStatement", "range": [0, 16],
                 "test": {"type": "Identifier", "name": "c", "range": [7, 8]},
                 "body": {"type": "BlockStatement", "range": [10, 16], "body": [
                     {"type": "ExpressionStatement", "range": [12, 14],
                      "expression": {"type": "Identifier", "name": "a", "range": [12, 13]}}
                 ]}}
            ]
        });
        let tree = estree::parse_document(&doc, "t.js", "while (c) { a; }").unwrap();
        let cfg = ControlFlow::build(&tree);
        let while_stmt = tree.children(tree.root())[0];
        let test = tree.get_one(while_stmt, Role::Test).unwrap();
        let body = tree.get_one(while_stmt, Role::Body).unwrap();
        let inner = tree.children(body)[0];
        assert_eq!(cfg.succs(test), &[inner]);
        assert_eq!(cfg.succs(inner), &[test]);
    }

    #[test]
    fn try_block_units_route_into_catch() {
        // try { a; } catch (e) { b; }
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "TryStatement", "range": [0, 27],
                 "block": {"type": "BlockStatement", "range": [4, 10], "body": [
                     {"type": "ExpressionStatement", "range": [6, 8],
                      "expression": {"type": "Identifier", "name": "a", "range": [6, 7]}}
                 ]},
                 "handler": {"type": "CatchClause", "range": [11, 27],
                     "param": {"type": "Identifier", "name": "e", "range": [18, 19]},
                     "body": {"type": "BlockStatement", "range": [21, 27], "body": [
                         {"type": "ExpressionStatement", "range": [23, 25],
                          "expression": {"type": "Identifier", "name": "b", "range": [23, 24]}}
                     ]}}}
            ]
        });
        let tree = estree::parse_document(&doc, "t.js", "try { a; } catch (e) { b; }").unwrap();
        let cfg = ControlFlow::build(&tree);
        let try_stmt = tree.children(tree.root())[0];
        let block = tree.get_one(try_stmt, Role::Block).unwrap();
        let a_stmt = tree.children(block)[0];
        let handler = tree.get_one(try_stmt, Role::Handler).unwrap();
        let param = tree.get_one(handler, Role::Param).unwrap();
        assert!(cfg.succs(a_stmt).contains(&param));
    }
}
