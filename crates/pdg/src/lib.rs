//! Program dependence graph over one file's syntax tree.
//!
//! [`Pdg::build`] resolves scopes, translates control flow, and resolves the
//! call edges that can be determined locally (direct names, immediately
//! invoked function expressions, methods of known object literals, callbacks
//! passed through higher-order parameters). Data-dependence edges are
//! computed lazily through [`Pdg::parents_of`] / [`Pdg::children_of`] and
//! memoized per occurrence and direction.

#![recursion_limit = "256"]

pub mod cfg;
mod data;
pub mod scope;

use std::collections::HashMap;

use estree::{NodeId, NodeKind, Role, SyntaxTree};
use profiles::ApiProfiles;
use tracing::debug;

pub use cfg::ControlFlow;
pub use data::{classify, member_write_root, nth_param, param_index_of, Direction, OccurrenceRole};
pub use scope::{Binding, BindingId, BindingKind, ResolveError, ScopeTable, ScopeId, ScopeKind};

use data::DataDeps;

pub struct Pdg {
    tree: SyntaxTree,
    scopes: ScopeTable,
    cfg: ControlFlow,
    deps: DataDeps,
}

impl Pdg {
    pub fn build(tree: SyntaxTree, profiles: &ApiProfiles) -> Result<Pdg, ResolveError> {
        let scopes = ScopeTable::build(&tree)?;
        let cfg = ControlFlow::build(&tree);
        let (callees, call_sites) = resolve_calls(&tree, &scopes);
        let api_sources = map_api_callbacks(&tree, &scopes, profiles);
        debug!(
            file = %tree.file,
            nodes = tree.len(),
            calls = callees.len(),
            "pdg built"
        );
        Ok(Pdg {
            tree,
            scopes,
            cfg,
            deps: DataDeps::new(callees, call_sites, api_sources),
        })
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn scopes(&self) -> &ScopeTable {
        &self.scopes
    }

    pub fn cfg(&self) -> &ControlFlow {
        &self.cfg
    }

    /// Occurrences whose values flow into `occ`, in source order.
    pub fn parents_of(&self, occ: NodeId) -> Vec<NodeId> {
        self.deps
            .query(&self.tree, &self.scopes, &self.cfg, occ, Direction::Parents)
    }

    /// Occurrences the value at `occ` flows into, in source order.
    pub fn children_of(&self, occ: NodeId) -> Vec<NodeId> {
        self.deps.query(
            &self.tree,
            &self.scopes,
            &self.cfg,
            occ,
            Direction::Children,
        )
    }

    /// Test expressions `node` is control-dependent on, nearest first.
    pub fn control_dependencies(&self, node: NodeId) -> Vec<NodeId> {
        ControlFlow::control_dependencies(&self.tree, node)
    }

    /// Locally resolved callee functions of a call expression.
    pub fn callees_of(&self, call: NodeId) -> &[NodeId] {
        self.deps.callees_of(call)
    }

    /// Call sites of a locally resolved function, in source order.
    pub fn call_sites_of(&self, function: NodeId) -> &[NodeId] {
        self.deps.call_sites_of(function)
    }

    /// The API call whose source profile feeds a callback parameter leaf.
    pub fn api_source_of(&self, param_leaf: NodeId) -> Option<NodeId> {
        self.deps.api_source_of(param_leaf)
    }

    /// All callback parameter leaves fed by profiled API calls, with the
    /// feeding call, in source order of the leaf.
    pub fn api_callback_params(&self) -> Vec<(NodeId, NodeId)> {
        let mut out: Vec<(NodeId, NodeId)> = self.deps.api_sources().collect();
        out.sort_by_key(|&(leaf, _)| self.tree.order_key(leaf));
        out
    }

    /// Identifier leaves of the `index`-th parameter of `function`.
    pub fn param_leaves(&self, function: NodeId, index: usize) -> Vec<NodeId> {
        let Some(param) = nth_param(&self.tree, function, index) else {
            return Vec::new();
        };
        pattern_leaves(&self.tree, param)
    }
}

/// Identifier leaves of a binding pattern, in source order.
pub fn pattern_leaves(tree: &SyntaxTree, pattern: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    leaves_rec(tree, pattern, &mut out);
    out
}

fn leaves_rec(tree: &SyntaxTree, pattern: NodeId, out: &mut Vec<NodeId>) {
    match tree.kind(pattern) {
        NodeKind::Identifier => out.push(pattern),
        NodeKind::ObjectPattern => {
            for property in tree.get(pattern, Role::Properties) {
                match tree.kind(property) {
                    NodeKind::Property => {
                        if let Some(value) = tree.get_one(property, Role::Value) {
                            leaves_rec(tree, value, out);
                        }
                    }
                    NodeKind::RestElement => leaves_rec(tree, property, out),
                    _ => {}
                }
            }
        }
        NodeKind::ArrayPattern => {
            for element in tree.get(pattern, Role::Elements) {
                leaves_rec(tree, element, out);
            }
        }
        NodeKind::AssignmentPattern => {
            if let Some(left) = tree.get_one(pattern, Role::Left) {
                leaves_rec(tree, left, out);
            }
        }
        NodeKind::RestElement => {
            if let Some(argument) = tree.get_one(pattern, Role::Argument) {
                leaves_rec(tree, argument, out);
            }
        }
        _ => {}
    }
}

/// Resolves call edges that can be determined without whole-program
/// analysis. Two passes: the second resolves calls through higher-order
/// parameters using the call sites discovered by the first.
fn resolve_calls(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
) -> (HashMap<NodeId, Vec<NodeId>>, HashMap<NodeId, Vec<NodeId>>) {
    let mut callees: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut call_sites: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    let calls: Vec<NodeId> = tree
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::CallExpression | NodeKind::NewExpression))
        .map(|n| n.id)
        .collect();

    for &call in &calls {
        let Some(callee) = tree.get_one(call, Role::Callee) else {
            continue;
        };
        if let Some(function) = resolve_callee(tree, scopes, callee) {
            callees.insert(call, vec![function]);
            call_sites.entry(function).or_default().push(call);
        }
    }

    // Calls through a parameter: resolved against the function values the
    // parameter receives at already-resolved call sites.
    for &call in &calls {
        if callees.contains_key(&call) {
            continue;
        }
        let Some(callee) = tree.get_one(call, Role::Callee) else {
            continue;
        };
        if tree.kind(callee) != NodeKind::Identifier {
            continue;
        }
        let Some(binding) = scopes.binding_of(callee) else {
            continue;
        };
        let binding = scopes.binding(binding);
        if binding.kind != BindingKind::Param {
            continue;
        }
        let Some(decl) = binding.decl else { continue };
        let Some(function) = tree.enclosing_function(decl) else {
            continue;
        };
        let Some(index) = param_index_of(tree, function, decl) else {
            continue;
        };
        let mut resolved = Vec::new();
        if let Some(sites) = call_sites.get(&function) {
            for &site in sites {
                let args = tree.call_arguments(site);
                if let Some(&arg) = args.get(index) {
                    if tree.kind(arg).is_function() {
                        resolved.push(arg);
                    }
                }
            }
        }
        if !resolved.is_empty() {
            for &f in &resolved {
                call_sites.entry(f).or_default().push(call);
            }
            callees.insert(call, resolved);
        }
    }

    for sites in call_sites.values_mut() {
        sites.sort_by_key(|&s| tree.order_key(s));
        sites.dedup();
    }
    (callees, call_sites)
}

fn resolve_callee(tree: &SyntaxTree, scopes: &ScopeTable, callee: NodeId) -> Option<NodeId> {
    match tree.kind(callee) {
        NodeKind::FunctionExpression | NodeKind::ArrowFunctionExpression => Some(callee),
        NodeKind::ChainExpression => {
            let inner = tree.get_one(callee, Role::Expression)?;
            resolve_callee(tree, scopes, inner)
        }
        NodeKind::Identifier => {
            let binding = scopes.binding_of(callee)?;
            let binding = scopes.binding(binding);
            let decl = binding.decl?;
            match binding.kind {
                BindingKind::Function | BindingKind::FunctionExpressionName => tree.parent(decl),
                _ => {
                    // `const f = function () {...}` / `= () => {...}`.
                    let parent = tree.parent(decl)?;
                    if tree.kind(parent) != NodeKind::VariableDeclarator
                        || tree.node(decl).role != Role::Id
                    {
                        return None;
                    }
                    let init = tree.get_one(parent, Role::Init)?;
                    tree.kind(init).is_function().then_some(init)
                }
            }
        }
        NodeKind::MemberExpression => {
            // A method of a known object literal: `obj.handler(...)`.
            if tree.node(callee).attrs.computed {
                return None;
            }
            let object = tree.get_one(callee, Role::Object)?;
            let property = tree.get_one(callee, Role::Property)?;
            let method = tree.node(property).name()?;
            if tree.kind(object) != NodeKind::Identifier {
                return None;
            }
            let binding = scopes.binding_of(object)?;
            let decl = scopes.binding(binding).decl?;
            let declarator = tree.parent(decl)?;
            if tree.kind(declarator) != NodeKind::VariableDeclarator {
                return None;
            }
            let init = tree.get_one(declarator, Role::Init)?;
            if tree.kind(init) != NodeKind::ObjectExpression {
                return None;
            }
            for prop in tree.get(init, Role::Properties) {
                if tree.kind(prop) != NodeKind::Property {
                    continue;
                }
                let key = tree.get_one(prop, Role::Key)?;
                if tree.node(key).name() == Some(method) {
                    let value = tree.get_one(prop, Role::Value)?;
                    if tree.kind(value).is_function() {
                        return Some(value);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Maps callback parameter leaves to the API calls feeding them, per the
/// sensitive-source profile tables.
fn map_api_callbacks(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    profiles: &ApiProfiles,
) -> HashMap<NodeId, NodeId> {
    let mut out = HashMap::new();
    for node in tree.iter() {
        if node.kind != NodeKind::CallExpression {
            continue;
        }
        let Some(callee) = tree.get_one(node.id, Role::Callee) else {
            continue;
        };
        let Some(dotted) = tree.dotted_name(callee) else {
            continue;
        };
        let Some(profile) = profiles.source(&dotted) else {
            continue;
        };
        let Some(cb_index) = profile.callback_index else {
            continue;
        };
        let args = tree.call_arguments(node.id);
        let Some(&cb) = args.get(cb_index) else {
            continue;
        };
        let function = if tree.kind(cb).is_function() {
            Some(cb)
        } else {
            resolve_callee(tree, scopes, cb)
        };
        let Some(function) = function else { continue };
        for &pi in &profile.param_indices {
            if let Some(param) = nth_param(tree, function, pi) {
                for leaf in pattern_leaves(tree, param) {
                    out.insert(leaf, node.id);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(doc: serde_json::Value, src: &str) -> Pdg {
        let tree = estree::parse_document(&doc, "test.js", src).unwrap();
        Pdg::build(tree, &ApiProfiles::defaults()).unwrap()
    }

    fn ident(pdg: &Pdg, name: &str, nth: usize) -> NodeId {
        pdg.tree()
            .iter()
            .filter(|n| n.kind == NodeKind::Identifier && n.name() == Some(name))
            .map(|n| n.id)
            .nth(nth)
            .unwrap()
    }

    /// `let a = b; a;` — the use of `a` depends on its declarator, whose
    /// value comes from the use of `b`.
    #[test]
    fn declarator_chain() {
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 10], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 9],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                     "init": {"type": "Identifier", "name": "b", "range": [8, 9]}}
                ]},
                {"type": "ExpressionStatement", "range": [11, 13],
                 "expression": {"type": "Identifier", "name": "a", "range": [11, 12]}}
            ]
        });
        let pdg = build(doc, "let a = b; a;");
        let a_decl = ident(&pdg, "a", 0);
        let a_use = ident(&pdg, "a", 1);
        let b_use = ident(&pdg, "b", 0);
        assert_eq!(pdg.parents_of(a_use), vec![a_decl]);
        assert_eq!(pdg.parents_of(a_decl), vec![b_use]);
        assert_eq!(pdg.children_of(a_decl), vec![a_use]);
        assert_eq!(pdg.children_of(b_use), vec![a_decl]);
    }

    /// Repeated queries return identical, memoized results.
    #[test]
    fn queries_are_deterministic() {
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 10], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 9],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                     "init": {"type": "Identifier", "name": "b", "range": [8, 9]}}
                ]},
                {"type": "ExpressionStatement", "range": [11, 19],
                 "expression": {"type": "BinaryExpression", "operator": "+", "range": [11, 18],
                     "left": {"type": "Identifier", "name": "a", "range": [11, 12]},
                     "right": {"type": "Identifier", "name": "a", "range": [17, 18]}}}
            ]
        });
        let pdg = build(doc, "let a = b; a     + a;");
        let a_decl = ident(&pdg, "a", 0);
        let first = pdg.children_of(a_decl);
        let second = pdg.children_of(a_decl);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        // Source order is preserved.
        let keys: Vec<_> = first.iter().map(|&n| pdg.tree().order_key(n)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    /// Object-literal property keys never become flow endpoints:
    /// `let a = 1; let x = {a: b};` gives the `a` declarator no children.
    #[test]
    fn object_literal_keys_do_not_leak() {
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 10], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 9],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                     "init": {"type": "Literal", "value": 1, "raw": "1", "range": [8, 9]}}
                ]},
                {"type": "VariableDeclaration", "kind": "let", "range": [11, 27], "declarations": [
                    {"type": "VariableDeclarator", "range": [15, 26],
                     "id": {"type": "Identifier", "name": "x", "range": [15, 16]},
                     "init": {"type": "ObjectExpression", "range": [19, 26], "properties": [
                         {"type": "Property", "computed": false, "range": [20, 24],
                          "key": {"type": "Identifier", "name": "a", "range": [20, 21]},
                          "value": {"type": "Identifier", "name": "b", "range": [23, 24]}}
                     ]}}
                ]}
            ]
        });
        let pdg = build(doc, "let a = 1; let x = {a: b};");
        let a_decl = ident(&pdg, "a", 0);
        assert!(pdg.children_of(a_decl).is_empty());
        // The property value `b` flows to `x`.
        let b_use = ident(&pdg, "b", 0);
        let x_decl = ident(&pdg, "x", 0);
        assert_eq!(pdg.children_of(b_use), vec![x_decl]);
    }

    /// `const db = x; db.get("Alice").age = 42;` — the member write keeps
    /// taint with the object root, so the declarator reaches the `db` in the
    /// assignment target.
    #[test]
    fn member_write_reaches_object_root() {
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "const", "range": [0, 13], "declarations": [
                    {"type": "VariableDeclarator", "range": [6, 12],
                     "id": {"type": "Identifier", "name": "db", "range": [6, 8]},
                     "init": {"type": "Identifier", "name": "x", "range": [11, 12]}}
                ]},
                {"type": "ExpressionStatement", "range": [14, 40],
                 "expression": {"type": "AssignmentExpression", "operator": "=", "range": [14, 39],
                     "left": {"type": "MemberExpression", "computed": false, "range": [14, 34],
                         "object": {"type": "CallExpression", "range": [14, 30],
                             "callee": {"type": "MemberExpression", "computed": false, "range": [14, 20],
                                 "object": {"type": "Identifier", "name": "db", "range": [14, 16]},
                                 "property": {"type": "Identifier", "name": "get", "range": [17, 20]}},
                             "arguments": [{"type": "Literal", "value": "Alice", "raw": "\"Alice\"", "range": [21, 28]}]},
                         "property": {"type": "Identifier", "name": "age", "range": [31, 34]}},
                     "right": {"type": "Literal", "value": 42, "raw": "42", "range": [37, 39]}}}
            ]
        });
        let pdg = build(doc, "const db = x; db.get(\"Alice\").age = 42;");
        let db_decl = ident(&pdg, "db", 0);
        let db_write = ident(&pdg, "db", 1);
        assert_eq!(
            classify(pdg.tree(), db_write),
            OccurrenceRole::MemberWriteRoot {
                site: pdg
                    .tree()
                    .ancestor_of_kind(db_write, &[NodeKind::AssignmentExpression])
                    .unwrap()
            }
        );
        assert!(pdg.children_of(db_decl).contains(&db_write));
    }

    /// Calls of a hoisted function resolve to its declaration, and the
    /// argument flows into the parameter.
    #[test]
    fn direct_call_resolves_and_links_arguments() {
        // function f(p) { p; } f(x);
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "FunctionDeclaration", "range": [0, 20],
                 "id": {"type": "Identifier", "name": "f", "range": [9, 10]},
                 "params": [{"type": "Identifier", "name": "p", "range": [11, 12]}],
                 "body": {"type": "BlockStatement", "range": [14, 20], "body": [
                     {"type": "ExpressionStatement", "range": [16, 18],
                      "expression": {"type": "Identifier", "name": "p", "range": [16, 17]}}
                 ]}},
                {"type": "ExpressionStatement", "range": [21, 26],
                 "expression": {"type": "CallExpression", "range": [21, 25],
                     "callee": {"type": "Identifier", "name": "f", "range": [21, 22]},
                     "arguments": [{"type": "Identifier", "name": "x", "range": [23, 24]}]}}
            ]
        });
        let pdg = build(doc, "function f(p) { p; } f(x);");
        let fn_decl = pdg
            .tree()
            .iter()
            .find(|n| n.kind == NodeKind::FunctionDeclaration)
            .unwrap()
            .id;
        let call = pdg
            .tree()
            .iter()
            .find(|n| n.kind == NodeKind::CallExpression)
            .unwrap()
            .id;
        assert_eq!(pdg.callees_of(call), &[fn_decl]);
        let x_use = ident(&pdg, "x", 0);
        let p_decl = ident(&pdg, "p", 0);
        let p_use = ident(&pdg, "p", 1);
        assert_eq!(pdg.children_of(x_use), vec![p_decl]);
        assert_eq!(pdg.parents_of(p_decl), vec![x_use]);
        assert_eq!(pdg.children_of(p_decl), vec![p_use]);
    }

    /// A function declaration's name reaches its call sites:
    /// parents of the `v` in `v(e)` are the declaration, never a variable.
    #[test]
    fn callee_use_resolves_to_hoisted_declaration() {
        // !function(){function v(e){return e} function s(e){v(e)}}()
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement", "range": [0, 58],
                "expression": {"type": "UnaryExpression", "operator": "!", "range": [0, 57],
                    "argument": {"type": "CallExpression", "range": [1, 57],
                        "callee": {"type": "FunctionExpression", "range": [1, 55],
                            "params": [],
                            "body": {"type": "BlockStatement", "range": [11, 55], "body": [
                                {"type": "FunctionDeclaration", "range": [12, 35],
                                 "id": {"type": "Identifier", "name": "v", "range": [21, 22]},
                                 "params": [{"type": "Identifier", "name": "e", "range": [23, 24]}],
                                 "body": {"type": "BlockStatement", "range": [25, 35], "body": [
                                     {"type": "ReturnStatement", "range": [26, 34],
                                      "argument": {"type": "Identifier", "name": "e", "range": [33, 34]}}
                                 ]}},
                                {"type": "FunctionDeclaration", "range": [36, 54],
                                 "id": {"type": "Identifier", "name": "s", "range": [45, 46]},
                                 "params": [{"type": "Identifier", "name": "e", "range": [47, 48]}],
                                 "body": {"type": "BlockStatement", "range": [49, 54], "body": [
                                     {"type": "ExpressionStatement", "range": [50, 53],
                                      "expression": {"type": "CallExpression", "range": [50, 53],
                                          "callee": {"type": "Identifier", "name": "v", "range": [50, 51]},
                                          "arguments": [{"type": "Identifier", "name": "e", "range": [52, 53]}]}}
                                 ]}}
                            ]}},
                        "arguments": []}}
            }]
        });
        let pdg = build(doc, "!function(){function v(e){return e} function s(e){v(e)}}()");
        let v_decl = ident(&pdg, "v", 0);
        let v_use = ident(&pdg, "v", 1);
        assert_eq!(pdg.parents_of(v_use), vec![v_decl]);
    }

    /// A function expression's self-name never captures an outer parameter:
    /// parents of `t` in `console.log(t)` are the outer parameter.
    #[test]
    fn function_expression_name_does_not_capture() {
        // (function(t){ !function t(){} ; console.log(t); })(42)
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement", "range": [0, 54],
                "expression": {"type": "CallExpression", "range": [0, 53],
                    "callee": {"type": "FunctionExpression", "range": [1, 49],
                        "params": [{"type": "Identifier", "name": "t", "range": [10, 11]}],
                        "body": {"type": "BlockStatement", "range": [12, 49], "body": [
                            {"type": "ExpressionStatement", "range": [14, 30],
                             "expression": {"type": "UnaryExpression", "operator": "!", "range": [14, 29],
                                 "argument": {"type": "FunctionExpression", "range": [15, 29],
                                     "id": {"type": "Identifier", "name": "t", "range": [24, 25]},
                                     "params": [],
                                     "body": {"type": "BlockStatement", "body": [], "range": [27, 29]}}}},
                            {"type": "ExpressionStatement", "range": [32, 47],
                             "expression": {"type": "CallExpression", "range": [32, 46],
                                 "callee": {"type": "MemberExpression", "computed": false, "range": [32, 43],
                                     "object": {"type": "Identifier", "name": "console", "range": [32, 39]},
                                     "property": {"type": "Identifier", "name": "log", "range": [40, 43]}},
                                 "arguments": [{"type": "Identifier", "name": "t", "range": [44, 45]}]}}
                        ]}},
                    "arguments": [{"type": "Literal", "value": 42, "raw": "42", "range": [51, 53]}]}
            }]
        });
        let pdg = build(doc, "(function(t){ !function t(){} ; console.log(t); })(42)");
        let param = ident(&pdg, "t", 0);
        let self_name = ident(&pdg, "t", 1);
        let logged = ident(&pdg, "t", 2);
        let parents = pdg.parents_of(logged);
        assert!(parents.contains(&param));
        assert!(!parents.contains(&self_name));
    }

    /// A redefinition kills the earlier one on its path.
    #[test]
    fn redefinition_stops_backward_traversal() {
        // let a = 1; a = 2; a;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 10], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 9],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                     "init": {"type": "Literal", "value": 1, "raw": "1", "range": [8, 9]}}
                ]},
                {"type": "ExpressionStatement", "range": [11, 17],
                 "expression": {"type": "AssignmentExpression", "operator": "=", "range": [11, 16],
                     "left": {"type": "Identifier", "name": "a", "range": [11, 12]},
                     "right": {"type": "Literal", "value": 2, "raw": "2", "range": [15, 16]}}},
                {"type": "ExpressionStatement", "range": [18, 20],
                 "expression": {"type": "Identifier", "name": "a", "range": [18, 19]}}
            ]
        });
        let pdg = build(doc, "let a = 1; a = 2; a;");
        let reassigned = ident(&pdg, "a", 1);
        let a_use = ident(&pdg, "a", 2);
        assert_eq!(pdg.parents_of(a_use), vec![reassigned]);
    }

    /// Both branch definitions reach a use after the join.
    #[test]
    fn branch_definitions_merge() {
        // let a; if (c) { a = 1; } else { a = 2; } a;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 6], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 5],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]}}
                ]},
                {"type": "IfStatement", "range": [7, 40],
                 "test": {"type": "Identifier", "name": "c", "range": [11, 12]},
                 "consequent": {"type": "BlockStatement", "range": [14, 24], "body": [
                     {"type": "ExpressionStatement", "range": [16, 22],
                      "expression": {"type": "AssignmentExpression", "operator": "=", "range": [16, 21],
                          "left": {"type": "Identifier", "name": "a", "range": [16, 17]},
                          "right": {"type": "Literal", "value": 1, "raw": "1", "range": [20, 21]}}}
                 ]},
                 "alternate": {"type": "BlockStatement", "range": [30, 40], "body": [
                     {"type": "ExpressionStatement", "range": [32, 38],
                      "expression": {"type": "AssignmentExpression", "operator": "=", "range": [32, 37],
                          "left": {"type": "Identifier", "name": "a", "range": [32, 33]},
                          "right": {"type": "Literal", "value": 2, "raw": "2", "range": [36, 37]}}}
                 ]}},
                {"type": "ExpressionStatement", "range": [41, 43],
                 "expression": {"type": "Identifier", "name": "a", "range": [41, 42]}}
            ]
        });
        let pdg = build(doc, "let a; if (c) { a = 1; } else { a = 2; } a;");
        let then_def = ident(&pdg, "a", 1);
        let else_def = ident(&pdg, "a", 2);
        let a_use = ident(&pdg, "a", 3);
        let parents = pdg.parents_of(a_use);
        assert_eq!(parents, vec![then_def, else_def]);
    }
}
