//! Ingest of the external parser's ESTree JSON into a [`SyntaxTree`].
//!
//! The parser process writes one JSON document per file. Nodes carry `type`,
//! `range: [start, end]`, `loc: {start: {line, column}, end: {...}}` and
//! kind-specific fields. Ingest is tolerant of missing `range`/`loc` (they
//! are zeroed) but not of structurally broken documents.

use serde_json::Value;
use thiserror::Error;

use crate::tree::{Attrs, Loc, Node, NodeId, NodeKind, Pos, Role, SyntaxTree};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid AST JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("AST root is not an object")]
    RootNotObject,
    #[error("AST node without a `type` field at node {0}")]
    MissingType(usize),
    #[error("AST root is a {0}, expected Program")]
    RootNotProgram(String),
}

/// Parses an ESTree JSON string into a syntax tree.
pub fn parse_str(json: &str, file: &str, source: &str) -> Result<SyntaxTree, IngestError> {
    let value: Value = serde_json::from_str(json)?;
    parse_document(&value, file, source)
}

/// Parses an already-deserialized ESTree document into a syntax tree.
pub fn parse_document(value: &Value, file: &str, source: &str) -> Result<SyntaxTree, IngestError> {
    let obj = value.as_object().ok_or(IngestError::RootNotObject)?;
    let root_type = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(IngestError::MissingType(0))?;
    if root_type != "Program" {
        return Err(IngestError::RootNotProgram(root_type.to_string()));
    }

    let mut nodes: Vec<Node> = Vec::new();
    walk(value, None, Role::None, &mut nodes)?;
    Ok(SyntaxTree::from_nodes(
        file.to_string(),
        source.to_string(),
        nodes,
    ))
}

fn walk(
    value: &Value,
    parent: Option<NodeId>,
    role: Role,
    nodes: &mut Vec<Node>,
) -> Result<NodeId, IngestError> {
    let obj = value
        .as_object()
        .ok_or(IngestError::MissingType(nodes.len()))?;
    let ty = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(IngestError::MissingType(nodes.len()))?;
    let kind = NodeKind::from_type(ty);

    let id = NodeId(nodes.len() as u32);
    nodes.push(Node {
        id,
        kind,
        parent,
        role,
        children: Vec::new(),
        range: read_range(obj),
        loc: read_loc(obj),
        attrs: read_attrs(kind, obj),
    });

    let mut children = Vec::new();
    match child_fields(kind) {
        Some(fields) => {
            for &field in fields {
                let Some(child_value) = obj.get(field) else {
                    continue;
                };
                collect_children(child_value, id, Role::from_field(field), nodes, &mut children)?;
            }
        }
        None => {
            // Unknown node kind: pick up any nested nodes, in key order.
            for (field, child_value) in obj {
                if matches!(field.as_str(), "type" | "range" | "loc" | "start" | "end") {
                    continue;
                }
                collect_children(child_value, id, Role::from_field(field), nodes, &mut children)?;
            }
        }
    }
    nodes[id.index()].children = children;
    Ok(id)
}

fn collect_children(
    value: &Value,
    parent: NodeId,
    role: Role,
    nodes: &mut Vec<Node>,
    out: &mut Vec<NodeId>,
) -> Result<(), IngestError> {
    match value {
        Value::Array(items) => {
            for item in items {
                // Array patterns and argument lists may contain null holes.
                if item.is_object() && item.get("type").is_some() {
                    out.push(walk(item, Some(parent), role, nodes)?);
                }
            }
        }
        Value::Object(obj) if obj.get("type").is_some() => {
            out.push(walk(value, Some(parent), role, nodes)?);
        }
        _ => {}
    }
    Ok(())
}

fn read_range(obj: &serde_json::Map<String, Value>) -> (usize, usize) {
    let Some(range) = obj.get("range").and_then(|r| r.as_array()) else {
        return (0, 0);
    };
    let start = range.first().and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let end = range.get(1).and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    (start, end)
}

fn read_loc(obj: &serde_json::Map<String, Value>) -> Loc {
    fn pos(value: Option<&Value>) -> Pos {
        let Some(obj) = value.and_then(|v| v.as_object()) else {
            return Pos::default();
        };
        Pos {
            line: obj.get("line").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            column: obj.get("column").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        }
    }
    let Some(loc) = obj.get("loc").and_then(|l| l.as_object()) else {
        return Loc::default();
    };
    Loc {
        start: pos(loc.get("start")),
        end: pos(loc.get("end")),
    }
}

fn read_attrs(kind: NodeKind, obj: &serde_json::Map<String, Value>) -> Attrs {
    let mut attrs = Attrs::default();
    match kind {
        NodeKind::Identifier | NodeKind::PrivateIdentifier => {
            attrs.name = obj
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }
        NodeKind::Literal => {
            attrs.raw = obj
                .get("raw")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            attrs.value = obj.get("value").cloned();
        }
        NodeKind::BinaryExpression
        | NodeKind::LogicalExpression
        | NodeKind::AssignmentExpression
        | NodeKind::UnaryExpression
        | NodeKind::UpdateExpression => {
            attrs.operator = obj
                .get("operator")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }
        NodeKind::MemberExpression => {
            attrs.computed = obj.get("computed").and_then(|v| v.as_bool()).unwrap_or(false);
        }
        NodeKind::Property | NodeKind::MethodDefinition | NodeKind::PropertyDefinition => {
            attrs.computed = obj.get("computed").and_then(|v| v.as_bool()).unwrap_or(false);
            attrs.decl_kind = obj
                .get("kind")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }
        NodeKind::VariableDeclaration => {
            attrs.decl_kind = obj
                .get("kind")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }
        _ => {}
    }
    attrs
}

/// Child fields per node kind, in syntactic order. `None` means the kind is
/// unknown and children are discovered by scanning all fields.
fn child_fields(kind: NodeKind) -> Option<&'static [&'static str]> {
    use NodeKind::*;
    Some(match kind {
        Program | ClassBody | BlockStatement | StaticBlock => &["body"],
        FunctionDeclaration | FunctionExpression | ArrowFunctionExpression => {
            &["id", "params", "body"]
        }
        VariableDeclaration => &["declarations"],
        VariableDeclarator => &["id", "init"],
        ExpressionStatement => &["expression"],
        MemberExpression => &["object", "property"],
        CallExpression | NewExpression => &["callee", "arguments"],
        AssignmentExpression | BinaryExpression | LogicalExpression | AssignmentPattern => {
            &["left", "right"]
        }
        ConditionalExpression | IfStatement => &["test", "consequent", "alternate"],
        UnaryExpression | UpdateExpression | ReturnStatement | ThrowStatement | AwaitExpression
        | YieldExpression | SpreadElement | RestElement => &["argument"],
        SequenceExpression => &["expressions"],
        ForStatement => &["init", "test", "update", "body"],
        ForInStatement | ForOfStatement => &["left", "right", "body"],
        WhileStatement => &["test", "body"],
        DoWhileStatement => &["body", "test"],
        SwitchStatement => &["discriminant", "cases"],
        SwitchCase => &["test", "consequent"],
        TryStatement => &["block", "handler", "finalizer"],
        CatchClause => &["param", "body"],
        LabeledStatement => &["label", "body"],
        BreakStatement | ContinueStatement => &["label"],
        WithStatement => &["object", "body"],
        ObjectExpression | ObjectPattern => &["properties"],
        Property => &["key", "value"],
        ArrayExpression | ArrayPattern => &["elements"],
        ClassDeclaration | ClassExpression => &["id", "superClass", "body"],
        MethodDefinition | PropertyDefinition => &["key", "value"],
        TemplateLiteral => &["quasis", "expressions"],
        TaggedTemplateExpression => &["tag", "quasi"],
        TemplateElement | EmptyStatement | DebuggerStatement | ThisExpression | Super
        | Identifier | PrivateIdentifier | Literal | MetaProperty => &[],
        ChainExpression => &["expression"],
        ImportDeclaration => &["specifiers", "source"],
        ImportSpecifier | ImportDefaultSpecifier | ImportNamespaceSpecifier => &["local"],
        ImportExpression => &["source"],
        ExportNamedDeclaration => &["declaration", "specifiers", "source"],
        ExportDefaultDeclaration => &["declaration"],
        ExportAllDeclaration => &["source"],
        ExportSpecifier => &["local"],
        Other => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ingests_a_minimal_program() {
        let doc = json!({
            "type": "Program",
            "range": [0, 10],
            "body": [{
                "type": "ExpressionStatement",
                "range": [0, 10],
                "expression": {
                    "type": "Identifier",
                    "name": "foo",
                    "range": [0, 3],
                }
            }]
        });
        let tree = parse_document(&doc, "a.js", "foo;").unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.kind(tree.root()), NodeKind::Program);
        let stmt = tree.children(tree.root())[0];
        assert_eq!(tree.kind(stmt), NodeKind::ExpressionStatement);
        let ident = tree.get_one(stmt, Role::Expression).unwrap();
        assert_eq!(tree.node(ident).name(), Some("foo"));
    }

    #[test]
    fn rejects_a_non_program_root() {
        let doc = json!({"type": "Identifier", "name": "x"});
        assert!(matches!(
            parse_document(&doc, "a.js", "x"),
            Err(IngestError::RootNotProgram(_))
        ));
    }

    #[test]
    fn preserves_child_source_order_and_roles() {
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "VariableDeclaration",
                "kind": "let",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "a", "range": [4, 5]},
                    "init": {"type": "Identifier", "name": "b", "range": [8, 9]},
                    "range": [4, 9],
                }],
                "range": [0, 10],
            }]
        });
        let tree = parse_document(&doc, "a.js", "let a = b;").unwrap();
        let decl = tree.children(tree.root())[0];
        assert_eq!(tree.node(decl).attrs.decl_kind.as_deref(), Some("let"));
        let declarator = tree.get_one(decl, Role::Declarations).unwrap();
        let id = tree.get_one(declarator, Role::Id).unwrap();
        let init = tree.get_one(declarator, Role::Init).unwrap();
        assert!(tree.order_key(id) < tree.order_key(init));
        assert_eq!(tree.node(id).name(), Some("a"));
        assert_eq!(tree.node(init).name(), Some("b"));
    }

    #[test]
    fn member_property_is_not_a_value_occurrence() {
        // x.a — `x` is a value, `a` is a property name.
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement",
                "expression": {
                    "type": "MemberExpression",
                    "computed": false,
                    "object": {"type": "Identifier", "name": "x", "range": [0, 1]},
                    "property": {"type": "Identifier", "name": "a", "range": [2, 3]},
                    "range": [0, 3],
                },
                "range": [0, 4],
            }]
        });
        let tree = parse_document(&doc, "a.js", "x.a;").unwrap();
        let idents: Vec<_> = tree
            .iter()
            .filter(|n| n.kind == NodeKind::Identifier)
            .map(|n| (n.name().unwrap().to_string(), tree.is_value_occurrence(n.id)))
            .collect();
        assert_eq!(
            idents,
            vec![("x".to_string(), true), ("a".to_string(), false)]
        );
    }

    #[test]
    fn dotted_name_folds_string_literal_keys() {
        // chrome["storage"].local
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement",
                "expression": {
                    "type": "MemberExpression",
                    "computed": false,
                    "object": {
                        "type": "MemberExpression",
                        "computed": true,
                        "object": {"type": "Identifier", "name": "chrome", "range": [0, 6]},
                        "property": {"type": "Literal", "value": "storage", "raw": "\"storage\"", "range": [7, 16]},
                        "range": [0, 17],
                    },
                    "property": {"type": "Identifier", "name": "local", "range": [18, 23]},
                    "range": [0, 23],
                },
                "range": [0, 24],
            }]
        });
        let tree = parse_document(&doc, "a.js", "chrome[\"storage\"].local;").unwrap();
        let stmt = tree.children(tree.root())[0];
        let member = tree.get_one(stmt, Role::Expression).unwrap();
        assert_eq!(tree.dotted_name(member).as_deref(), Some("chrome.storage.local"));
    }
}
