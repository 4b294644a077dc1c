//! Flows: ordered occurrence paths linked by data-dependence edges.

use estree::{NodeId, NodeKind, Role, SyntaxTree};
use serde::Serialize;

/// One hop of a flow as it appears in the analysis JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    /// 1-based, consecutive hop number.
    pub no: usize,
    /// `"L:C - L:C"`, inclusive start, exclusive end column.
    pub location: String,
    pub filename: String,
    pub identifier: String,
    pub line_of_code: String,
}

/// A finite path of occurrences. `truncated` marks flows cut short by the
/// configured depth bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub nodes: Vec<NodeId>,
    pub truncated: bool,
}

impl Flow {
    pub fn new(nodes: Vec<NodeId>) -> Flow {
        Flow {
            nodes,
            truncated: false,
        }
    }

    /// A single-node stand-in for sinks that are not identifier flows
    /// (API sink calls, DOM property writes).
    pub fn pseudo(node: NodeId) -> Flow {
        Flow::new(vec![node])
    }

    pub fn last(&self) -> NodeId {
        *self.nodes.last().expect("flows are never empty")
    }

    pub fn first(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn records(&self, tree: &SyntaxTree) -> Vec<FlowRecord> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, &node)| FlowRecord {
                no: i + 1,
                location: tree.location(node),
                filename: tree.file.clone(),
                identifier: match tree.node(node).name() {
                    Some(name) => name.to_string(),
                    None => format!("<{}>", tree.kind(node).as_str()),
                },
                line_of_code: tree.line_of_code(node),
            })
            .collect()
    }

    /// Member names accessed along the flow, in flow order. For a hop `x`
    /// that is the object of `x.y`, the access `y` is recorded; `{y: v} = x`
    /// destructuring hops record `y` as well. Computed accesses with
    /// non-literal keys are skipped.
    pub fn accessed_members(&self, tree: &SyntaxTree, include_last: bool) -> Vec<String> {
        let mut out = Vec::new();
        let nodes = if include_last {
            &self.nodes[..]
        } else {
            &self.nodes[..self.nodes.len().saturating_sub(1)]
        };
        for &node in nodes {
            let Some(parent) = tree.parent(node) else {
                continue;
            };
            match tree.kind(parent) {
                NodeKind::MemberExpression if tree.node(node).role == Role::Object => {
                    let mut member = parent;
                    loop {
                        // Method names are not data accesses: `x.replace(..)`
                        // records nothing, `x.url` records "url".
                        let is_method_call = tree
                            .parent(member)
                            .map(|p| {
                                tree.kind(p) == NodeKind::CallExpression
                                    && tree.node(member).role == Role::Callee
                            })
                            .unwrap_or(false);
                        if !is_method_call {
                            if let Some(name) = accessed_name(tree, member) {
                                out.push(name);
                            }
                        }
                        // Climb nested accesses: `x.y.z` or `x.y().z`.
                        let upper = if is_method_call {
                            tree.parent(member).expect("checked above")
                        } else {
                            member
                        };
                        match tree.parent(upper) {
                            Some(p)
                                if tree.kind(p) == NodeKind::MemberExpression
                                    && tree.node(upper).role == Role::Object =>
                            {
                                member = p;
                            }
                            _ => break,
                        }
                    }
                }
                NodeKind::Property if tree.node(node).role == Role::Value => {
                    let grandparent = tree.parent(parent);
                    if grandparent.map(|g| tree.kind(g)) == Some(NodeKind::ObjectPattern) {
                        if let Some(key) = tree.get_one(parent, Role::Key) {
                            if let Some(name) = tree.node(key).name() {
                                out.push(name.to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// Name of the member accessed by a member expression: the property name
/// for `x.y`, the literal string for `x["y"]`.
fn accessed_name(tree: &SyntaxTree, member: NodeId) -> Option<String> {
    let property = tree.get_one(member, Role::Property)?;
    if tree.node(member).attrs.computed {
        tree.node(property).string_value().map(|s| s.to_string())
    } else {
        tree.node(property).name().map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_carry_locations_and_line_text() {
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement", "range": [0, 8],
                "loc": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 8}},
                "expression": {
                    "type": "Identifier", "name": "cookies", "range": [0, 7],
                    "loc": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 7}}
                }
            }]
        });
        let tree = estree::parse_document(&doc, "bg.js", "cookies;").unwrap();
        let ident = tree
            .iter()
            .find(|n| n.kind == NodeKind::Identifier)
            .unwrap()
            .id;
        let flow = Flow::new(vec![ident]);
        let records = flow.records(&tree);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].no, 1);
        assert_eq!(records[0].location, "1:0 - 1:7");
        assert_eq!(records[0].identifier, "cookies");
        assert_eq!(records[0].line_of_code, "cookies;");
        assert_eq!(records[0].filename, "bg.js");
    }

    #[test]
    fn accessed_members_follow_nested_chains() {
        // s.tab.url
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement", "range": [0, 10],
                "expression": {"type": "MemberExpression", "computed": false, "range": [0, 9],
                    "object": {"type": "MemberExpression", "computed": false, "range": [0, 5],
                        "object": {"type": "Identifier", "name": "s", "range": [0, 1]},
                        "property": {"type": "Identifier", "name": "tab", "range": [2, 5]}},
                    "property": {"type": "Identifier", "name": "url", "range": [6, 9]}}
            }]
        });
        let tree = estree::parse_document(&doc, "t.js", "s.tab.url;").unwrap();
        let s = tree
            .iter()
            .find(|n| n.name() == Some("s"))
            .unwrap()
            .id;
        let flow = Flow::new(vec![s]);
        assert_eq!(flow.accessed_members(&tree, true), vec!["tab", "url"]);
    }
}
