//! Lexical scope resolution.
//!
//! Two passes over the syntax tree: the first collects declarations per
//! scope (honoring `var`/function hoisting, block scoping of `let`/`const`/
//! `class`, parameter scopes, catch scopes and function-expression
//! self-names), the second binds every value-position Identifier occurrence
//! to the nearest declaration. Names with no visible declaration bind to an
//! implicit global created at the program root, so every occurrence resolves
//! to exactly one binding.

use std::collections::HashMap;

use estree::{NodeId, NodeKind, Role, SyntaxTree};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Class,
    Function,
    Param,
    Catch,
    /// The self-name of a named function expression; visible only inside
    /// the function expression itself.
    FunctionExpressionName,
    ImplicitGlobal,
}

#[derive(Debug)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// The AST node owning this scope (Program, function, block, catch).
    pub owner: NodeId,
    pub parent: Option<ScopeId>,
    bindings: HashMap<String, BindingId>,
}

#[derive(Debug)]
pub struct Binding {
    pub id: BindingId,
    pub name: String,
    pub kind: BindingKind,
    pub scope: ScopeId,
    /// The Identifier node of the declaration; `None` for implicit globals.
    pub decl: Option<NodeId>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed AST: {0} node {1} is missing its {2}")]
    MissingChild(&'static str, u32, &'static str),
}

/// The scope tree and the occurrence-to-binding resolution of one file.
#[derive(Debug)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
    scope_of_owner: HashMap<NodeId, ScopeId>,
    resolved: HashMap<NodeId, BindingId>,
    occurrences: HashMap<BindingId, Vec<NodeId>>,
}

impl ScopeTable {
    pub fn build(tree: &SyntaxTree) -> Result<ScopeTable, ResolveError> {
        let mut table = ScopeTable {
            scopes: Vec::new(),
            bindings: Vec::new(),
            scope_of_owner: HashMap::new(),
            resolved: HashMap::new(),
            occurrences: HashMap::new(),
        };
        let root_scope = table.new_scope(ScopeKind::Global, tree.root(), None);
        let mut collector = Collector { tree, table: &mut table };
        collector.collect(tree.root(), root_scope);
        let mut resolver = Resolver { tree, table: &mut table };
        resolver.resolve(tree.root(), root_scope)?;
        Ok(table)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    /// The binding a resolved Identifier occurrence points at.
    pub fn binding_of(&self, occurrence: NodeId) -> Option<BindingId> {
        self.resolved.get(&occurrence).copied()
    }

    /// All occurrences of a binding, in source order.
    pub fn occurrences_of(&self, binding: BindingId) -> &[NodeId] {
        self.occurrences
            .get(&binding)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    fn new_scope(&mut self, kind: ScopeKind, owner: NodeId, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            owner,
            parent,
            bindings: HashMap::new(),
        });
        self.scope_of_owner.insert(owner, id);
        id
    }

    fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        decl: Option<NodeId>,
    ) -> BindingId {
        // Redeclarations in the same scope collapse into the first binding;
        // `var x; var x;` and a parameter shadowing a function-expression
        // self-name both land here.
        if let Some(&existing) = self.scopes[scope.0 as usize].bindings.get(name) {
            if matches!(kind, BindingKind::Param) {
                // Parameters win over the self-name they shadow.
                let b = &mut self.bindings[existing.0 as usize];
                if b.kind == BindingKind::FunctionExpressionName {
                    b.kind = kind;
                    b.decl = decl;
                }
            }
            return existing;
        }
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            id,
            name: name.to_string(),
            kind,
            scope,
            decl,
        });
        self.scopes[scope.0 as usize]
            .bindings
            .insert(name.to_string(), id);
        id
    }

    fn lookup(&self, mut scope: ScopeId, name: &str) -> Option<BindingId> {
        loop {
            let s = &self.scopes[scope.0 as usize];
            if let Some(&b) = s.bindings.get(name) {
                return Some(b);
            }
            scope = s.parent?;
        }
    }

    fn record(&mut self, occurrence: NodeId, binding: BindingId) {
        self.resolved.insert(occurrence, binding);
        self.occurrences.entry(binding).or_default().push(occurrence);
    }
}

/// Pass 1: create scopes and collect declarations.
struct Collector<'a> {
    tree: &'a SyntaxTree,
    table: &'a mut ScopeTable,
}

impl Collector<'_> {
    fn collect(&mut self, node: NodeId, scope: ScopeId) {
        match self.tree.kind(node) {
            NodeKind::FunctionDeclaration => {
                // Hoists to the enclosing function/script scope; visible
                // throughout it but never outside.
                if let Some(id) = self.tree.get_one(node, Role::Id) {
                    if let Some(name) = self.tree.node(id).name() {
                        let target = self.hoist_target(scope);
                        self.table
                            .declare(target, name, BindingKind::Function, Some(id));
                    }
                }
                self.collect_function(node, scope);
            }
            NodeKind::FunctionExpression | NodeKind::ArrowFunctionExpression => {
                self.collect_function(node, scope);
            }
            NodeKind::VariableDeclaration => {
                let kind = match self.tree.node(node).attrs.decl_kind.as_deref() {
                    Some("let") => BindingKind::Let,
                    Some("const") => BindingKind::Const,
                    _ => BindingKind::Var,
                };
                for declarator in self.tree.get(node, Role::Declarations) {
                    if let Some(pattern) = self.tree.get_one(declarator, Role::Id) {
                        let target = if kind == BindingKind::Var {
                            self.hoist_target(scope)
                        } else {
                            scope
                        };
                        self.declare_pattern(pattern, target, kind);
                    }
                    if let Some(init) = self.tree.get_one(declarator, Role::Init) {
                        self.collect(init, scope);
                    }
                }
            }
            NodeKind::ClassDeclaration => {
                if let Some(id) = self.tree.get_one(node, Role::Id) {
                    if let Some(name) = self.tree.node(id).name() {
                        self.table.declare(scope, name, BindingKind::Class, Some(id));
                    }
                }
                for &child in self.tree.children(node) {
                    if self.tree.node(child).role != Role::Id {
                        self.collect(child, scope);
                    }
                }
            }
            NodeKind::BlockStatement => {
                // A fresh block scope, unless this block is a function body
                // (then collect_function already made the scope).
                let is_function_body = self
                    .tree
                    .parent(node)
                    .map(|p| self.tree.kind(p).is_function())
                    .unwrap_or(false);
                let inner = if is_function_body {
                    scope
                } else {
                    self.table.new_scope(ScopeKind::Block, node, Some(scope))
                };
                for &child in self.tree.children(node) {
                    self.collect(child, inner);
                }
            }
            NodeKind::CatchClause => {
                let catch_scope = self.table.new_scope(ScopeKind::Catch, node, Some(scope));
                if let Some(param) = self.tree.get_one(node, Role::Param) {
                    self.declare_pattern(param, catch_scope, BindingKind::Catch);
                }
                if let Some(body) = self.tree.get_one(node, Role::Body) {
                    // The catch body block shares the catch scope.
                    self.table.scope_of_owner.insert(body, catch_scope);
                    for &child in self.tree.children(body) {
                        self.collect(child, catch_scope);
                    }
                }
            }
            NodeKind::ForStatement | NodeKind::ForInStatement | NodeKind::ForOfStatement => {
                // `for (let i ...)` bindings live in a scope around the loop.
                let loop_scope = self.table.new_scope(ScopeKind::Block, node, Some(scope));
                for &child in self.tree.children(node) {
                    self.collect(child, loop_scope);
                }
            }
            NodeKind::SwitchStatement => {
                let switch_scope = self.table.new_scope(ScopeKind::Block, node, Some(scope));
                for &child in self.tree.children(node) {
                    self.collect(child, switch_scope);
                }
            }
            _ => {
                for &child in self.tree.children(node) {
                    self.collect(child, scope);
                }
            }
        }
    }

    fn collect_function(&mut self, node: NodeId, outer: ScopeId) {
        let fn_scope = self.table.new_scope(ScopeKind::Function, node, Some(outer));
        // A named function expression binds its own name, inside only.
        if self.tree.kind(node) == NodeKind::FunctionExpression {
            if let Some(id) = self.tree.get_one(node, Role::Id) {
                if let Some(name) = self.tree.node(id).name() {
                    self.table
                        .declare(fn_scope, name, BindingKind::FunctionExpressionName, Some(id));
                }
            }
        }
        for param in self.tree.get(node, Role::Params) {
            self.declare_pattern(param, fn_scope, BindingKind::Param);
        }
        if let Some(body) = self.tree.get_one(node, Role::Body) {
            if self.tree.kind(body) == NodeKind::BlockStatement {
                for &child in self.tree.children(body) {
                    self.collect(child, fn_scope);
                }
            } else {
                // Arrow function with an expression body.
                self.collect(body, fn_scope);
            }
        }
    }

    /// Declares every leaf Identifier of a binding pattern.
    fn declare_pattern(&mut self, pattern: NodeId, scope: ScopeId, kind: BindingKind) {
        match self.tree.kind(pattern) {
            NodeKind::Identifier => {
                if let Some(name) = self.tree.node(pattern).name() {
                    self.table.declare(scope, name, kind, Some(pattern));
                }
            }
            NodeKind::ObjectPattern => {
                for property in self.tree.get(pattern, Role::Properties) {
                    match self.tree.kind(property) {
                        NodeKind::Property => {
                            if let Some(value) = self.tree.get_one(property, Role::Value) {
                                self.declare_pattern(value, scope, kind);
                            }
                        }
                        NodeKind::RestElement => self.declare_pattern(property, scope, kind),
                        _ => {}
                    }
                }
            }
            NodeKind::ArrayPattern => {
                for element in self.tree.get(pattern, Role::Elements) {
                    self.declare_pattern(element, scope, kind);
                }
            }
            NodeKind::AssignmentPattern => {
                if let Some(left) = self.tree.get_one(pattern, Role::Left) {
                    self.declare_pattern(left, scope, kind);
                }
                // The default value is an expression of the outer scope and
                // is resolved by pass 2, not declared here.
            }
            NodeKind::RestElement => {
                if let Some(argument) = self.tree.get_one(pattern, Role::Argument) {
                    self.declare_pattern(argument, scope, kind);
                }
            }
            _ => {}
        }
    }

    /// Nearest function or global scope, for `var`/function hoisting.
    fn hoist_target(&self, scope: ScopeId) -> ScopeId {
        let mut cur = scope;
        loop {
            let s = self.table.scope(cur);
            if matches!(s.kind, ScopeKind::Function | ScopeKind::Global) {
                return cur;
            }
            match s.parent {
                Some(parent) => cur = parent,
                None => return cur,
            }
        }
    }
}

/// Pass 2: bind every value-position Identifier occurrence.
struct Resolver<'a> {
    tree: &'a SyntaxTree,
    table: &'a mut ScopeTable,
}

impl Resolver<'_> {
    fn resolve(&mut self, node: NodeId, scope: ScopeId) -> Result<(), ResolveError> {
        // Entering a node that owns a scope switches the lookup chain.
        let scope = self
            .table
            .scope_of_owner
            .get(&node)
            .copied()
            .unwrap_or(scope);

        if self.tree.kind(node).is_function() {
            return self.resolve_function(node, scope);
        }
        if self.tree.kind(node) == NodeKind::Identifier {
            self.resolve_occurrence(node, scope);
            return Ok(());
        }
        for &child in self.tree.children(node).iter() {
            self.resolve(child, scope)?;
        }
        Ok(())
    }

    fn resolve_function(&mut self, node: NodeId, fn_scope: ScopeId) -> Result<(), ResolveError> {
        let outer = self.table.scope(fn_scope).parent.unwrap_or(fn_scope);
        for &child in self.tree.children(node).iter() {
            let role = self.tree.node(child).role;
            match role {
                Role::Id => {
                    // A declaration name, not a value occurrence. Record it
                    // against its own binding so it can act as a definition
                    // endpoint of data flows.
                    if let Some(name) = self.tree.node(child).name() {
                        let lookup_scope = match self.tree.kind(node) {
                            NodeKind::FunctionDeclaration => outer,
                            _ => fn_scope,
                        };
                        if let Some(binding) = self.table.lookup(lookup_scope, name) {
                            self.table.record(child, binding);
                        }
                    }
                }
                Role::Params => self.resolve_param(child, fn_scope, outer)?,
                _ => self.resolve(child, fn_scope)?,
            }
        }
        Ok(())
    }

    fn resolve_param(
        &mut self,
        pattern: NodeId,
        fn_scope: ScopeId,
        outer: ScopeId,
    ) -> Result<(), ResolveError> {
        match self.tree.kind(pattern) {
            NodeKind::Identifier => {
                self.resolve_occurrence(pattern, fn_scope);
                Ok(())
            }
            NodeKind::ObjectPattern => {
                for property in self.tree.get(pattern, Role::Properties).collect::<Vec<_>>() {
                    match self.tree.kind(property) {
                        NodeKind::Property => {
                            if self.tree.node(property).attrs.computed {
                                if let Some(key) = self.tree.get_one(property, Role::Key) {
                                    self.resolve(key, outer)?;
                                }
                            }
                            if let Some(value) = self.tree.get_one(property, Role::Value) {
                                self.resolve_param(value, fn_scope, outer)?;
                            }
                        }
                        NodeKind::RestElement => self.resolve_param(property, fn_scope, outer)?,
                        _ => {}
                    }
                }
                Ok(())
            }
            NodeKind::ArrayPattern => {
                for element in self.tree.get(pattern, Role::Elements).collect::<Vec<_>>() {
                    self.resolve_param(element, fn_scope, outer)?;
                }
                Ok(())
            }
            NodeKind::AssignmentPattern => {
                if let Some(left) = self.tree.get_one(pattern, Role::Left) {
                    self.resolve_param(left, fn_scope, outer)?;
                }
                if let Some(right) = self.tree.get_one(pattern, Role::Right) {
                    // Default values are uses of the outer scope.
                    self.resolve(right, outer)?;
                }
                Ok(())
            }
            NodeKind::RestElement => {
                if let Some(argument) = self.tree.get_one(pattern, Role::Argument) {
                    self.resolve_param(argument, fn_scope, outer)?;
                }
                Ok(())
            }
            _ => self.resolve(pattern, fn_scope),
        }
    }

    fn resolve_occurrence(&mut self, node: NodeId, scope: ScopeId) {
        if !self.tree.is_value_occurrence(node) {
            return;
        }
        let Some(name) = self.tree.node(node).name() else {
            return;
        };
        let binding = match self.table.lookup(scope, name) {
            Some(b) => b,
            None => {
                // Unresolved names become implicit globals at the root.
                self.table
                    .declare(ScopeId(0), name, BindingKind::ImplicitGlobal, None)
            }
        };
        self.table.record(node, binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree_of(doc: serde_json::Value, src: &str) -> SyntaxTree {
        estree::parse_document(&doc, "test.js", src).unwrap()
    }

    fn ident<'t>(tree: &'t SyntaxTree, name: &str, nth: usize) -> NodeId {
        tree.iter()
            .filter(|n| n.kind == NodeKind::Identifier && n.name() == Some(name))
            .map(|n| n.id)
            .nth(nth)
            .unwrap()
    }

    #[test]
    fn let_binding_resolves_use_to_declaration() {
        // let a = 1; a;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "let", "range": [0, 10], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 9],
                     "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                     "init": {"type": "Literal", "value": 1, "raw": "1", "range": [8, 9]}}
                ]},
                {"type": "ExpressionStatement", "range": [11, 13],
                 "expression": {"type": "Identifier", "name": "a", "range": [11, 12]}}
            ]
        });
        let tree = tree_of(doc, "let a = 1; a;");
        let scopes = ScopeTable::build(&tree).unwrap();
        let decl = ident(&tree, "a", 0);
        let usage = ident(&tree, "a", 1);
        assert_eq!(scopes.binding_of(decl), scopes.binding_of(usage));
        let binding = scopes.binding(scopes.binding_of(usage).unwrap());
        assert_eq!(binding.kind, BindingKind::Let);
        assert_eq!(binding.decl, Some(decl));
    }

    #[test]
    fn function_expression_name_binds_only_inside() {
        // var t = function t() {}; t;
        // The trailing `t` must resolve to the var, not the self-name.
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "VariableDeclaration", "kind": "var", "range": [0, 25], "declarations": [
                    {"type": "VariableDeclarator", "range": [4, 24],
                     "id": {"type": "Identifier", "name": "t", "range": [4, 5]},
                     "init": {"type": "FunctionExpression", "range": [8, 24],
                              "id": {"type": "Identifier", "name": "t", "range": [17, 18]},
                              "params": [],
                              "body": {"type": "BlockStatement", "body": [], "range": [21, 24]}}}
                ]},
                {"type": "ExpressionStatement", "range": [26, 28],
                 "expression": {"type": "Identifier", "name": "t", "range": [26, 27]}}
            ]
        });
        let tree = tree_of(doc, "var t = function t() {}; t;");
        let scopes = ScopeTable::build(&tree).unwrap();
        let var_decl = ident(&tree, "t", 0);
        let self_name = ident(&tree, "t", 1);
        let usage = ident(&tree, "t", 2);
        assert_eq!(scopes.binding_of(usage), scopes.binding_of(var_decl));
        assert_ne!(scopes.binding_of(usage), scopes.binding_of(self_name));
        let inner = scopes.binding(scopes.binding_of(self_name).unwrap());
        assert_eq!(inner.kind, BindingKind::FunctionExpressionName);
    }

    #[test]
    fn nested_function_declaration_is_invisible_outside() {
        // function outer() { function inner() {} } inner;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "FunctionDeclaration", "range": [0, 41],
                 "id": {"type": "Identifier", "name": "outer", "range": [9, 14]},
                 "params": [],
                 "body": {"type": "BlockStatement", "range": [17, 41], "body": [
                     {"type": "FunctionDeclaration", "range": [19, 39],
                      "id": {"type": "Identifier", "name": "inner", "range": [28, 33]},
                      "params": [],
                      "body": {"type": "BlockStatement", "body": [], "range": [36, 39]}}
                 ]}},
                {"type": "ExpressionStatement", "range": [42, 48],
                 "expression": {"type": "Identifier", "name": "inner", "range": [42, 47]}}
            ]
        });
        let tree = tree_of(doc, "function outer() { function inner() {} } inner;");
        let scopes = ScopeTable::build(&tree).unwrap();
        let inner_decl = ident(&tree, "inner", 0);
        let outer_use = ident(&tree, "inner", 1);
        assert_ne!(scopes.binding_of(outer_use), scopes.binding_of(inner_decl));
        let b = scopes.binding(scopes.binding_of(outer_use).unwrap());
        assert_eq!(b.kind, BindingKind::ImplicitGlobal);
    }

    #[test]
    fn catch_parameter_gets_its_own_scope() {
        // try {} catch (e) { e; } e;
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "TryStatement", "range": [0, 23],
                 "block": {"type": "BlockStatement", "body": [], "range": [4, 6]},
                 "handler": {"type": "CatchClause", "range": [7, 23],
                     "param": {"type": "Identifier", "name": "e", "range": [14, 15]},
                     "body": {"type": "BlockStatement", "range": [17, 23], "body": [
                         {"type": "ExpressionStatement", "range": [19, 21],
                          "expression": {"type": "Identifier", "name": "e", "range": [19, 20]}}
                     ]}}},
                {"type": "ExpressionStatement", "range": [24, 26],
                 "expression": {"type": "Identifier", "name": "e", "range": [24, 25]}}
            ]
        });
        let tree = tree_of(doc, "try {} catch (e) { e; } e;");
        let scopes = ScopeTable::build(&tree).unwrap();
        let param = ident(&tree, "e", 0);
        let inside = ident(&tree, "e", 1);
        let outside = ident(&tree, "e", 2);
        assert_eq!(scopes.binding_of(inside), scopes.binding_of(param));
        assert_ne!(scopes.binding_of(outside), scopes.binding_of(param));
    }

    #[test]
    fn destructured_parameter_leaves_become_bindings() {
        // ((m, {url: senderUrl}) => { senderUrl; })
        let doc = json!({
            "type": "Program",
            "body": [
                {"type": "ExpressionStatement", "range": [0, 40],
                 "expression": {"type": "ArrowFunctionExpression", "range": [1, 39],
                     "params": [
                         {"type": "Identifier", "name": "m", "range": [2, 3]},
                         {"type": "ObjectPattern", "range": [5, 21], "properties": [
                             {"type": "Property", "computed": false, "range": [6, 20],
                              "key": {"type": "Identifier", "name": "url", "range": [6, 9]},
                              "value": {"type": "Identifier", "name": "senderUrl", "range": [11, 20]}}
                         ]}
                     ],
                     "body": {"type": "BlockStatement", "range": [26, 39], "body": [
                         {"type": "ExpressionStatement", "range": [28, 38],
                          "expression": {"type": "Identifier", "name": "senderUrl", "range": [28, 37]}}
                     ]}}}
            ]
        });
        let tree = tree_of(doc, "((m, {url: senderUrl}) => { senderUrl; })");
        let scopes = ScopeTable::build(&tree).unwrap();
        let leaf = ident(&tree, "senderUrl", 0);
        let usage = ident(&tree, "senderUrl", 1);
        assert_eq!(scopes.binding_of(usage), scopes.binding_of(leaf));
        assert_eq!(
            scopes.binding(scopes.binding_of(leaf).unwrap()).kind,
            BindingKind::Param
        );
        // The property key `url` is a name, not an occurrence.
        let key = ident(&tree, "url", 0);
        assert_eq!(scopes.binding_of(key), None);
    }
}
