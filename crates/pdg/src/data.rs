//! Lazy data-dependence overlay.
//!
//! Data-dependence edges are never materialized as a whole graph. A query
//! for an occurrence walks CFG predecessors (for uses) or successors (for
//! definitions) until the first definition of the occurrence's binding on
//! each path, adds the cross-binding edges implied by assignments,
//! destructuring, member writes, call arguments and returns, and memoizes
//! the answer per (occurrence, direction).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use estree::{NodeId, NodeKind, Role, SyntaxTree};

use crate::cfg::ControlFlow;
use crate::scope::{BindingId, ScopeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Parents,
    Children,
}

/// How an identifier occurrence participates in data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceRole {
    /// Leaf of a `var`/`let`/`const` declarator pattern.
    DeclLeaf { site: NodeId },
    /// Leaf of an assignment target.
    AssignLeaf { site: NodeId },
    /// Root identifier of a member-expression write (`o.p = v`); taints the
    /// object without killing earlier definitions.
    MemberWriteRoot { site: NodeId },
    /// Argument of `++`/`--`: a use and a definition at once.
    UpdateArg,
    /// Name of a function or class declaration (or expression self-name).
    DeclName,
    /// Leaf of a function parameter pattern.
    ParamLeaf { function: NodeId },
    /// Catch-clause parameter.
    CatchParam,
    /// Loop variable of `for...in` / `for...of`.
    ForHeaderLeaf { site: NodeId },
    /// Plain value use.
    Use,
}

impl OccurrenceRole {
    pub fn is_definition(&self) -> bool {
        !matches!(self, OccurrenceRole::Use)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefStrength {
    /// Rebinds the name: stops backward traversal on its path.
    Strong,
    /// Adds taint without rebinding (member writes, definitions inside
    /// nested functions whose execution point is unknown).
    Weak,
}

#[derive(Debug, Clone, Copy)]
struct UnitDef {
    occ: NodeId,
    strength: DefStrength,
}

pub struct DataDeps {
    memo: RefCell<HashMap<(NodeId, Direction), Vec<NodeId>>>,
    in_flight: RefCell<HashSet<(NodeId, Direction)>>,
    /// Call site -> locally resolved callee function nodes.
    callees: HashMap<NodeId, Vec<NodeId>>,
    /// Function node -> call sites, in source order.
    call_sites: HashMap<NodeId, Vec<NodeId>>,
    /// Parameter leaf -> API call whose profile feeds it.
    api_sources: HashMap<NodeId, NodeId>,
}

impl DataDeps {
    pub fn new(
        callees: HashMap<NodeId, Vec<NodeId>>,
        call_sites: HashMap<NodeId, Vec<NodeId>>,
        api_sources: HashMap<NodeId, NodeId>,
    ) -> DataDeps {
        DataDeps {
            memo: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(HashSet::new()),
            callees,
            call_sites,
            api_sources,
        }
    }

    pub fn callees_of(&self, call: NodeId) -> &[NodeId] {
        self.callees.get(&call).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn call_sites_of(&self, function: NodeId) -> &[NodeId] {
        self.call_sites
            .get(&function)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn api_source_of(&self, param_leaf: NodeId) -> Option<NodeId> {
        self.api_sources.get(&param_leaf).copied()
    }

    pub fn api_sources(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.api_sources.iter().map(|(&leaf, &call)| (leaf, call))
    }

    pub fn query(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        occ: NodeId,
        direction: Direction,
    ) -> Vec<NodeId> {
        let key = (occ, direction);
        if let Some(cached) = self.memo.borrow().get(&key) {
            return cached.clone();
        }
        // Re-entry on the same key means a query cycle; answer empty rather
        // than recursing forever.
        if !self.in_flight.borrow_mut().insert(key) {
            return Vec::new();
        }
        let mut result = match direction {
            Direction::Parents => self.parents(tree, scopes, cfg, occ),
            Direction::Children => self.children(tree, scopes, cfg, occ),
        };
        dedup_in_order(tree, &mut result);
        self.in_flight.borrow_mut().remove(&key);
        self.memo.borrow_mut().insert(key, result.clone());
        result
    }

    fn parents(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        occ: NodeId,
    ) -> Vec<NodeId> {
        // A call expression used as a flow node: its value comes from the
        // returns of its locally resolved callees.
        if matches!(
            tree.kind(occ),
            NodeKind::CallExpression | NodeKind::NewExpression
        ) {
            let mut out = Vec::new();
            for &callee in self.callees_of(occ) {
                collect_return_values(tree, scopes, callee, &mut out);
            }
            return out;
        }
        if tree.kind(occ) != NodeKind::Identifier {
            return Vec::new();
        }
        let Some(binding) = scopes.binding_of(occ) else {
            return Vec::new();
        };

        let role = classify(tree, occ);
        let mut out = Vec::new();
        match role {
            OccurrenceRole::DeclLeaf { site } => {
                if let Some(init) = tree.get_one(site, Role::Init) {
                    collect_value_sources(tree, scopes, init, &mut out);
                }
            }
            OccurrenceRole::AssignLeaf { site } | OccurrenceRole::MemberWriteRoot { site } => {
                if let Some(right) = tree.get_one(site, Role::Right) {
                    collect_value_sources(tree, scopes, right, &mut out);
                }
                let compound = tree
                    .node(site)
                    .attrs
                    .operator
                    .as_deref()
                    .map(|op| op != "=")
                    .unwrap_or(false);
                // A member write reads its receiver; a compound assignment
                // reads its previous value.
                if matches!(role, OccurrenceRole::MemberWriteRoot { .. }) || compound {
                    self.backward(tree, scopes, cfg, occ, binding, &mut out);
                }
            }
            OccurrenceRole::ForHeaderLeaf { site } => {
                if let Some(right) = tree.get_one(site, Role::Right) {
                    collect_value_sources(tree, scopes, right, &mut out);
                }
            }
            OccurrenceRole::ParamLeaf { function } => {
                self.param_parents(tree, scopes, occ, function, &mut out);
            }
            OccurrenceRole::DeclName | OccurrenceRole::CatchParam => {}
            OccurrenceRole::UpdateArg | OccurrenceRole::Use => {
                self.backward(tree, scopes, cfg, occ, binding, &mut out);
            }
        }
        out
    }

    fn children(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        occ: NodeId,
    ) -> Vec<NodeId> {
        if matches!(
            tree.kind(occ),
            NodeKind::CallExpression | NodeKind::NewExpression
        ) {
            // The call's value flows wherever the surrounding expression
            // assigns or passes it.
            return self.value_targets(tree, scopes, occ);
        }
        if tree.kind(occ) != NodeKind::Identifier {
            return Vec::new();
        }
        let Some(binding) = scopes.binding_of(occ) else {
            return Vec::new();
        };

        let role = classify(tree, occ);
        let mut out = Vec::new();
        match role {
            OccurrenceRole::DeclLeaf { .. }
            | OccurrenceRole::AssignLeaf { .. }
            | OccurrenceRole::MemberWriteRoot { .. }
            | OccurrenceRole::DeclName
            | OccurrenceRole::CatchParam
            | OccurrenceRole::ForHeaderLeaf { .. } => {
                self.forward(tree, scopes, cfg, occ, binding, role, &mut out);
            }
            OccurrenceRole::ParamLeaf { function } => {
                self.forward_from_entries(tree, scopes, cfg, function, binding, &mut out);
            }
            OccurrenceRole::UpdateArg => {
                self.forward(tree, scopes, cfg, occ, binding, role, &mut out);
                out.extend(self.value_targets(tree, scopes, occ));
            }
            OccurrenceRole::Use => {
                out.extend(self.value_targets(tree, scopes, occ));
            }
        }
        out
    }

    /// Definitions reaching a use, by backward CFG traversal.
    fn backward(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        occ: NodeId,
        binding: BindingId,
        out: &mut Vec<NodeId>,
    ) {
        let mut found_strong = false;
        let mut reached_entry = false;

        let start = cfg.unit_of(tree, occ);
        if let Some(start) = start {
            let defs = defs_in_unit(tree, scopes, start, binding);
            let mut best: Option<NodeId> = None;
            for def in &defs {
                if def.occ == occ || !def_before_use(tree, def.occ, occ) {
                    continue;
                }
                match def.strength {
                    DefStrength::Strong => {
                        if best.map_or(true, |b| tree.order_key(def.occ) > tree.order_key(b)) {
                            best = Some(def.occ);
                        }
                    }
                    DefStrength::Weak => out.push(def.occ),
                }
            }
            if let Some(best) = best {
                out.push(best);
                return;
            }

            let mut visited = HashSet::new();
            visited.insert(start);
            let mut queue: VecDeque<NodeId> = cfg.preds(start).iter().copied().collect();
            if cfg.preds(start).is_empty() {
                reached_entry = true;
            }
            while let Some(unit) = queue.pop_front() {
                if !visited.insert(unit) {
                    continue;
                }
                let defs = defs_in_unit(tree, scopes, unit, binding);
                let mut strong: Option<NodeId> = None;
                for def in &defs {
                    if def.occ == occ {
                        continue;
                    }
                    match def.strength {
                        DefStrength::Strong => {
                            if strong.map_or(true, |s| tree.order_key(def.occ) > tree.order_key(s))
                            {
                                strong = Some(def.occ);
                            }
                        }
                        DefStrength::Weak => out.push(def.occ),
                    }
                }
                if let Some(strong) = strong {
                    out.push(strong);
                    found_strong = true;
                    continue;
                }
                if cfg.preds(unit).is_empty() {
                    reached_entry = true;
                }
                for &pred in cfg.preds(unit) {
                    if !visited.contains(&pred) {
                        queue.push_back(pred);
                    }
                }
            }
        } else {
            reached_entry = true;
        }

        // Entry reached without a definition: hoisted functions, parameters
        // and declarations in enclosing functions reach here.
        if reached_entry || !found_strong {
            if let Some(decl) = scopes.binding(binding).decl {
                if decl != occ && !out.contains(&decl) {
                    out.push(decl);
                }
            }
        }
    }

    /// Uses reached by a definition, by forward CFG traversal.
    fn forward(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        occ: NodeId,
        binding: BindingId,
        role: OccurrenceRole,
        out: &mut Vec<NodeId>,
    ) {
        let Some(start) = cfg.unit_of(tree, occ) else {
            return;
        };
        // Uses later in the defining unit see this definition.
        let next_strong = defs_in_unit(tree, scopes, start, binding)
            .iter()
            .filter(|d| {
                d.strength == DefStrength::Strong
                    && d.occ != occ
                    && tree.order_key(d.occ) > tree.order_key(occ)
            })
            .map(|d| d.occ)
            .min_by_key(|&d| tree.order_key(d));
        for use_occ in uses_in_unit(tree, scopes, start, binding) {
            if use_occ == occ || !def_before_use(tree, occ, use_occ) {
                continue;
            }
            if let Some(killer) = next_strong {
                if !use_before_def(tree, use_occ, killer) {
                    continue;
                }
            }
            out.push(use_occ);
        }
        if next_strong.is_some() && role != OccurrenceRole::UpdateArg {
            return;
        }
        self.forward_walk(tree, scopes, cfg, cfg.succs(start), start, binding, out);
    }

    /// Forward traversal for parameters: every use from function entry on.
    fn forward_from_entries(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        function: NodeId,
        binding: BindingId,
        out: &mut Vec<NodeId>,
    ) {
        let entries = cfg.region_entries(function).to_vec();
        for &entry in &entries {
            self.forward_collect_unit(tree, scopes, cfg, entry, binding, out, &mut HashSet::new());
        }
    }

    fn forward_walk(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        starts: &[NodeId],
        origin: NodeId,
        binding: BindingId,
        out: &mut Vec<NodeId>,
    ) {
        let mut visited = HashSet::new();
        visited.insert(origin);
        for &s in starts {
            self.forward_collect_unit(tree, scopes, cfg, s, binding, out, &mut visited);
        }
    }

    fn forward_collect_unit(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        cfg: &ControlFlow,
        start: NodeId,
        binding: BindingId,
        out: &mut Vec<NodeId>,
        visited: &mut HashSet<NodeId>,
    ) {
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(unit) = queue.pop_front() {
            if !visited.insert(unit) {
                continue;
            }
            let strong = defs_in_unit(tree, scopes, unit, binding)
                .iter()
                .filter(|d| d.strength == DefStrength::Strong)
                .map(|d| d.occ)
                .min_by_key(|&d| tree.order_key(d));
            for use_occ in uses_in_unit(tree, scopes, unit, binding) {
                match strong {
                    Some(killer) => {
                        if use_before_def(tree, use_occ, killer) {
                            out.push(use_occ);
                        }
                    }
                    None => out.push(use_occ),
                }
            }
            if strong.is_some() {
                continue;
            }
            for &succ in cfg.succs(unit) {
                if !visited.contains(&succ) {
                    queue.push_back(succ);
                }
            }
        }
    }

    /// Where the value produced at `occ` flows: the assignment target it
    /// feeds, the parameter of a resolved call it is passed to, or the call
    /// sites its enclosing function returns to.
    fn value_targets(&self, tree: &SyntaxTree, scopes: &ScopeTable, occ: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = occ;
        loop {
            let Some(parent) = tree.parent(cur) else { break };
            let role = tree.node(cur).role;
            let kind = tree.kind(parent);

            if kind.is_function() {
                // An arrow's expression body is its return value.
                if kind == NodeKind::ArrowFunctionExpression && role == Role::Body {
                    out.extend(self.call_sites_of(parent).iter().copied());
                }
                break;
            }
            match kind {
                NodeKind::VariableDeclarator if role == Role::Init => {
                    if let Some(id) = tree.get_one(parent, Role::Id) {
                        collect_binding_leaves(tree, scopes, id, &mut out);
                    }
                    break;
                }
                NodeKind::AssignmentExpression if role == Role::Right => {
                    if let Some(left) = tree.get_one(parent, Role::Left) {
                        collect_assign_targets(tree, scopes, left, &mut out);
                    }
                    break;
                }
                NodeKind::ForInStatement | NodeKind::ForOfStatement if role == Role::Right => {
                    if let Some(left) = tree.get_one(parent, Role::Left) {
                        collect_binding_leaves(tree, scopes, left, &mut out);
                    }
                    break;
                }
                NodeKind::ReturnStatement => {
                    if let Some(function) = tree.enclosing_function(parent) {
                        out.extend(self.call_sites_of(function).iter().copied());
                    }
                    break;
                }
                NodeKind::CallExpression | NodeKind::NewExpression if role == Role::Arguments => {
                    let callees = self.callees_of(parent);
                    if !callees.is_empty() {
                        let index = tree
                            .call_arguments(parent)
                            .iter()
                            .position(|&a| a == cur)
                            .unwrap_or(usize::MAX);
                        for &callee in callees {
                            if let Some(param) = nth_param(tree, callee, index) {
                                collect_binding_leaves(tree, scopes, param, &mut out);
                            }
                        }
                        break;
                    }
                    // Unresolved call: the value may flow through it.
                    cur = parent;
                }
                NodeKind::MemberExpression if role == Role::Object => cur = parent,
                NodeKind::ChainExpression
                | NodeKind::ConditionalExpression
                | NodeKind::LogicalExpression
                | NodeKind::BinaryExpression
                | NodeKind::TemplateLiteral
                | NodeKind::ObjectExpression
                | NodeKind::ArrayExpression
                | NodeKind::SpreadElement
                | NodeKind::SequenceExpression
                | NodeKind::AwaitExpression
                | NodeKind::UnaryExpression => cur = parent,
                NodeKind::Property if role == Role::Value => cur = parent,
                _ => break,
            }
        }
        out
    }

    /// Parents of a parameter leaf: matching arguments at resolved call
    /// sites, plus the API call feeding the callback per the source tables.
    fn param_parents(
        &self,
        tree: &SyntaxTree,
        scopes: &ScopeTable,
        occ: NodeId,
        function: NodeId,
        out: &mut Vec<NodeId>,
    ) {
        if let Some(api_call) = self.api_source_of(occ) {
            out.push(api_call);
        }
        let Some(index) = param_index_of(tree, function, occ) else {
            return;
        };
        for &call in self.call_sites_of(function) {
            let args = tree.call_arguments(call);
            let Some(&arg) = args.get(index) else { continue };
            if tree.kind(arg).is_function() {
                continue;
            }
            collect_value_sources(tree, scopes, arg, out);
            if matches!(
                tree.kind(arg),
                NodeKind::CallExpression | NodeKind::NewExpression
            ) {
                out.push(arg);
            }
        }
    }
}

/// Classifies how an identifier occurrence participates in data flow.
pub fn classify(tree: &SyntaxTree, occ: NodeId) -> OccurrenceRole {
    let mut cur = occ;
    loop {
        let Some(parent) = tree.parent(cur) else {
            return OccurrenceRole::Use;
        };
        let role = tree.node(cur).role;
        match tree.kind(parent) {
            NodeKind::VariableDeclarator if role == Role::Id => {
                return OccurrenceRole::DeclLeaf { site: parent };
            }
            NodeKind::AssignmentExpression if role == Role::Left => {
                if cur == occ || is_pattern(tree, cur) {
                    return OccurrenceRole::AssignLeaf { site: parent };
                }
                // The left side was a member chain rooted at `occ`.
                return OccurrenceRole::MemberWriteRoot { site: parent };
            }
            NodeKind::UpdateExpression => {
                if cur == occ {
                    return OccurrenceRole::UpdateArg;
                }
                return OccurrenceRole::Use;
            }
            NodeKind::FunctionDeclaration | NodeKind::FunctionExpression
                if role == Role::Id && cur == occ =>
            {
                return OccurrenceRole::DeclName;
            }
            NodeKind::ClassDeclaration | NodeKind::ClassExpression
                if role == Role::Id && cur == occ =>
            {
                return OccurrenceRole::DeclName;
            }
            NodeKind::FunctionDeclaration
            | NodeKind::FunctionExpression
            | NodeKind::ArrowFunctionExpression
                if role == Role::Params =>
            {
                return OccurrenceRole::ParamLeaf { function: parent };
            }
            NodeKind::CatchClause if role == Role::Param => {
                return OccurrenceRole::CatchParam;
            }
            NodeKind::ForInStatement | NodeKind::ForOfStatement if role == Role::Left => {
                return OccurrenceRole::ForHeaderLeaf { site: parent };
            }
            NodeKind::ObjectPattern | NodeKind::ArrayPattern | NodeKind::RestElement => {
                cur = parent;
            }
            NodeKind::AssignmentPattern => {
                if role == Role::Right {
                    return OccurrenceRole::Use;
                }
                cur = parent;
            }
            NodeKind::Property if role == Role::Value => {
                // Distinguish `{x} = o` patterns from `{a: x}` literals.
                let grandparent = tree.parent(parent);
                match grandparent.map(|g| tree.kind(g)) {
                    Some(NodeKind::ObjectPattern) => cur = parent,
                    _ => return OccurrenceRole::Use,
                }
            }
            NodeKind::MemberExpression | NodeKind::ChainExpression
                if role == Role::Object || role == Role::Expression =>
            {
                cur = parent;
            }
            NodeKind::CallExpression if role == Role::Callee && cur != occ => {
                // `o.m(...).p = v` keeps `o` as the written root.
                cur = parent;
            }
            _ => return OccurrenceRole::Use,
        }
    }
}

fn is_pattern(tree: &SyntaxTree, node: NodeId) -> bool {
    matches!(
        tree.kind(node),
        NodeKind::ObjectPattern
            | NodeKind::ArrayPattern
            | NodeKind::AssignmentPattern
            | NodeKind::RestElement
            | NodeKind::Property
    )
}

/// True when the definition at `def_occ` takes effect before the use at
/// `use_occ`, for occurrences of the same unit. A use inside the right-hand
/// side of the defining assignment happens before the definition.
fn def_before_use(tree: &SyntaxTree, def_occ: NodeId, use_occ: NodeId) -> bool {
    !use_before_def(tree, use_occ, def_occ)
}

fn use_before_def(tree: &SyntaxTree, use_occ: NodeId, def_occ: NodeId) -> bool {
    if let Some(site) = def_site(tree, def_occ) {
        let rhs = match tree.kind(site) {
            NodeKind::VariableDeclarator => tree.get_one(site, Role::Init),
            NodeKind::AssignmentExpression => tree.get_one(site, Role::Right),
            NodeKind::ForInStatement | NodeKind::ForOfStatement => tree.get_one(site, Role::Right),
            _ => None,
        };
        if let Some(rhs) = rhs {
            if tree.is_inside_or_is(use_occ, rhs) {
                return true;
            }
        }
    }
    tree.order_key(use_occ) < tree.order_key(def_occ)
}

fn def_site(tree: &SyntaxTree, def_occ: NodeId) -> Option<NodeId> {
    match classify(tree, def_occ) {
        OccurrenceRole::DeclLeaf { site }
        | OccurrenceRole::AssignLeaf { site }
        | OccurrenceRole::MemberWriteRoot { site }
        | OccurrenceRole::ForHeaderLeaf { site } => Some(site),
        _ => None,
    }
}

/// Definitions of `binding` inside a unit. Definitions nested in inner
/// functions are demoted to weak: they run at an unknown time, so they taint
/// without killing.
fn defs_in_unit(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    unit: NodeId,
    binding: BindingId,
) -> Vec<UnitDef> {
    let mut out = Vec::new();
    visit_unit(tree, unit, false, &mut |occ, in_nested| {
        if scopes.binding_of(occ) != Some(binding) {
            return;
        }
        let role = classify(tree, occ);
        let strength = match role {
            OccurrenceRole::MemberWriteRoot { .. } => Some(DefStrength::Weak),
            OccurrenceRole::DeclLeaf { .. }
            | OccurrenceRole::AssignLeaf { .. }
            | OccurrenceRole::UpdateArg
            | OccurrenceRole::DeclName
            | OccurrenceRole::CatchParam
            | OccurrenceRole::ForHeaderLeaf { .. } => Some(if in_nested {
                DefStrength::Weak
            } else {
                DefStrength::Strong
            }),
            OccurrenceRole::ParamLeaf { .. } | OccurrenceRole::Use => None,
        };
        if let Some(strength) = strength {
            out.push(UnitDef { occ, strength });
        }
    });
    out
}

/// Value uses of `binding` inside a unit, including uses nested in inner
/// functions (closures read the variable of the enclosing region).
fn uses_in_unit(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    unit: NodeId,
    binding: BindingId,
) -> Vec<NodeId> {
    let mut out = Vec::new();
    visit_unit(tree, unit, false, &mut |occ, _| {
        if scopes.binding_of(occ) != Some(binding) {
            return;
        }
        match classify(tree, occ) {
            OccurrenceRole::Use
            | OccurrenceRole::UpdateArg
            | OccurrenceRole::MemberWriteRoot { .. } => out.push(occ),
            _ => {}
        }
    });
    out.sort_by_key(|&o| tree.order_key(o));
    out
}

/// Walks a unit's identifiers; `in_nested` is true below a function node.
/// A function's own name stays at the nesting level of the function itself
/// (a hoisted declaration is a real definition in its unit).
fn visit_unit(
    tree: &SyntaxTree,
    node: NodeId,
    in_nested: bool,
    f: &mut impl FnMut(NodeId, bool),
) {
    if tree.kind(node) == NodeKind::Identifier {
        f(node, in_nested);
        return;
    }
    if tree.kind(node).is_function() {
        for &child in tree.children(node) {
            let nested = in_nested || tree.node(child).role != Role::Id;
            visit_unit(tree, child, nested, f);
        }
        return;
    }
    for &child in tree.children(node) {
        visit_unit(tree, child, in_nested, f);
    }
}

/// Value-position identifiers a right-hand side draws from, excluding the
/// bodies of function values (their internals do not flow into the target).
fn collect_value_sources(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    rhs: NodeId,
    out: &mut Vec<NodeId>,
) {
    if tree.kind(rhs).is_function() {
        return;
    }
    if tree.kind(rhs) == NodeKind::Identifier {
        if scopes.binding_of(rhs).is_some() {
            out.push(rhs);
        }
        return;
    }
    for &child in tree.children(rhs) {
        collect_value_sources(tree, scopes, child, out);
    }
}

/// Binding leaves of a declaration pattern.
fn collect_binding_leaves(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    pattern: NodeId,
    out: &mut Vec<NodeId>,
) {
    match tree.kind(pattern) {
        NodeKind::Identifier => {
            if scopes.binding_of(pattern).is_some() {
                out.push(pattern);
            }
        }
        NodeKind::VariableDeclaration => {
            for declarator in tree.get(pattern, Role::Declarations) {
                if let Some(id) = tree.get_one(declarator, Role::Id) {
                    collect_binding_leaves(tree, scopes, id, out);
                }
            }
        }
        NodeKind::ObjectPattern => {
            for property in tree.get(pattern, Role::Properties) {
                match tree.kind(property) {
                    NodeKind::Property => {
                        if let Some(value) = tree.get_one(property, Role::Value) {
                            collect_binding_leaves(tree, scopes, value, out);
                        }
                    }
                    NodeKind::RestElement => collect_binding_leaves(tree, scopes, property, out),
                    _ => {}
                }
            }
        }
        NodeKind::ArrayPattern => {
            for element in tree.get(pattern, Role::Elements) {
                collect_binding_leaves(tree, scopes, element, out);
            }
        }
        NodeKind::AssignmentPattern => {
            if let Some(left) = tree.get_one(pattern, Role::Left) {
                collect_binding_leaves(tree, scopes, left, out);
            }
        }
        NodeKind::RestElement => {
            if let Some(argument) = tree.get_one(pattern, Role::Argument) {
                collect_binding_leaves(tree, scopes, argument, out);
            }
        }
        _ => {}
    }
}

/// Targets of an assignment left-hand side: binding leaves for identifier
/// and destructuring targets, the member root for property writes.
fn collect_assign_targets(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    left: NodeId,
    out: &mut Vec<NodeId>,
) {
    match tree.kind(left) {
        NodeKind::MemberExpression | NodeKind::ChainExpression => {
            if let Some(root) = member_write_root(tree, left) {
                if scopes.binding_of(root).is_some() {
                    out.push(root);
                }
            }
        }
        _ => collect_binding_leaves(tree, scopes, left, out),
    }
}

/// Root identifier of a written member chain, looking through calls:
/// `db.get("Alice").age` roots at `db`.
pub fn member_write_root(tree: &SyntaxTree, member: NodeId) -> Option<NodeId> {
    match tree.kind(member) {
        NodeKind::Identifier => Some(member),
        NodeKind::MemberExpression => {
            let object = tree.get_one(member, Role::Object)?;
            member_write_root(tree, object)
        }
        NodeKind::ChainExpression => {
            let inner = tree.get_one(member, Role::Expression)?;
            member_write_root(tree, inner)
        }
        NodeKind::CallExpression | NodeKind::NewExpression => {
            let callee = tree.get_one(member, Role::Callee)?;
            member_write_root(tree, callee)
        }
        _ => None,
    }
}

/// Value identifiers inside the return statements (or expression body) of a
/// function.
fn collect_return_values(
    tree: &SyntaxTree,
    scopes: &ScopeTable,
    function: NodeId,
    out: &mut Vec<NodeId>,
) {
    let Some(body) = tree.get_one(function, Role::Body) else {
        return;
    };
    if tree.kind(body) != NodeKind::BlockStatement {
        collect_value_sources(tree, scopes, body, out);
        return;
    }
    for id in tree.descendants(body) {
        if tree.kind(id) == NodeKind::ReturnStatement
            && tree.enclosing_function(id) == Some(function)
        {
            if let Some(argument) = tree.get_one(id, Role::Argument) {
                collect_value_sources(tree, scopes, argument, out);
            }
        }
    }
}

pub fn nth_param(tree: &SyntaxTree, function: NodeId, index: usize) -> Option<NodeId> {
    tree.get(function, Role::Params).nth(index)
}

pub fn param_index_of(tree: &SyntaxTree, function: NodeId, occ: NodeId) -> Option<usize> {
    tree.get(function, Role::Params)
        .position(|p| tree.is_inside_or_is(occ, p))
}

fn dedup_in_order(tree: &SyntaxTree, items: &mut Vec<NodeId>) {
    let mut seen = HashSet::new();
    items.retain(|&id| seen.insert(id));
    items.sort_by_key(|&id| tree.order_key(id));
}
