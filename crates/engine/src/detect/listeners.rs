//! Discovery of extension message listeners.
//!
//! Four listener families are recognized:
//! `chrome.runtime.onMessage.addListener(...)`,
//! `chrome.runtime.onMessageExternal.addListener(...)`,
//! `<port>.onMessage.addListener(...)` (ports from `runtime.onConnect` /
//! `onConnectExternal` / `connect`), and
//! `window.addEventListener("message", ...)`.
//!
//! Runtime listeners take `(message, sender, sendResponse)`; port listeners
//! take `(message, port)` where the port carries the sender; window
//! listeners take the event whose `.data` is attacker-controlled and whose
//! `.origin`/`.source` identify the sender.

use estree::{NodeId, NodeKind, Role, SyntaxTree};
use pdg::{pattern_leaves, Pdg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    RuntimeOnMessage,
    RuntimeOnMessageExternal,
    PortOnMessage,
    WindowMessage,
}

#[derive(Debug, Clone)]
pub struct MessageListener {
    pub kind: ListenerKind,
    /// The registration call expression.
    pub call: NodeId,
    /// The handler function node.
    pub function: NodeId,
    /// Binding leaves carrying the attacker-influenced payload.
    pub message_leaves: Vec<NodeId>,
    /// Binding leaves carrying the sender description.
    pub sender_leaves: Vec<NodeId>,
    /// Binding leaves whose calls answer the sender (`sendResponse`, the
    /// port of a port listener).
    pub response_leaves: Vec<NodeId>,
}

pub fn discover(pdg: &Pdg) -> Vec<MessageListener> {
    let tree = pdg.tree();
    let mut out = Vec::new();
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
        let args = tree.call_arguments(node.id);

        if let Some(kind) = message_listener_kind(&dotted) {
            let Some(&handler_arg) = args.first() else {
                continue;
            };
            let Some(function) = resolve_handler(pdg, handler_arg) else {
                continue;
            };
            let mut listener = MessageListener {
                kind,
                call: node.id,
                function,
                message_leaves: param_leaves(tree, function, 0),
                sender_leaves: param_leaves(tree, function, 1),
                response_leaves: match kind {
                    ListenerKind::PortOnMessage => param_leaves(tree, function, 1),
                    _ => param_leaves(tree, function, 2),
                },
            };
            if kind == ListenerKind::PortOnMessage {
                // The port is frequently captured from the enclosing
                // onConnect handler rather than taken as a parameter.
                if let Some(port_decl) = receiver_declaration(pdg, callee) {
                    if !listener.sender_leaves.contains(&port_decl) {
                        listener.sender_leaves.push(port_decl);
                    }
                    if !listener.response_leaves.contains(&port_decl) {
                        listener.response_leaves.push(port_decl);
                    }
                }
            }
            out.push(listener);
            continue;
        }

        if dotted == "window.addEventListener"
            || dotted == "self.addEventListener"
            || dotted == "addEventListener"
        {
            let is_message = args
                .first()
                .and_then(|&a| tree.node(a).string_value())
                .map(|s| s == "message")
                .unwrap_or(false);
            if !is_message {
                continue;
            }
            let Some(&handler_arg) = args.get(1) else {
                continue;
            };
            let Some(function) = resolve_handler(pdg, handler_arg) else {
                continue;
            };
            let event = param_leaves(tree, function, 0);
            out.push(MessageListener {
                kind: ListenerKind::WindowMessage,
                call: node.id,
                function,
                message_leaves: event.clone(),
                sender_leaves: event,
                response_leaves: Vec::new(),
            });
        }
    }
    out
}

fn message_listener_kind(dotted: &str) -> Option<ListenerKind> {
    let dotted = dotted.strip_prefix("browser.").map_or_else(
        || dotted.to_string(),
        |rest| format!("chrome.{rest}"),
    );
    if dotted == "chrome.runtime.onMessage.addListener" {
        return Some(ListenerKind::RuntimeOnMessage);
    }
    if dotted == "chrome.runtime.onMessageExternal.addListener" {
        return Some(ListenerKind::RuntimeOnMessageExternal);
    }
    if dotted.ends_with(".onMessage.addListener") {
        return Some(ListenerKind::PortOnMessage);
    }
    None
}

fn param_leaves(tree: &SyntaxTree, function: NodeId, index: usize) -> Vec<NodeId> {
    match tree.get(function, Role::Params).nth(index) {
        Some(param) => pattern_leaves(tree, param),
        None => Vec::new(),
    }
}

/// Resolves a handler argument to a function node: a function expression
/// directly, or an identifier pointing at one.
fn resolve_handler(pdg: &Pdg, arg: NodeId) -> Option<NodeId> {
    let tree = pdg.tree();
    if tree.kind(arg).is_function() {
        return Some(arg);
    }
    if tree.kind(arg) != NodeKind::Identifier {
        return None;
    }
    let binding = pdg.scopes().binding_of(arg)?;
    let decl = pdg.scopes().binding(binding).decl?;
    let parent = tree.parent(decl)?;
    match tree.kind(parent) {
        NodeKind::FunctionDeclaration => Some(parent),
        NodeKind::VariableDeclarator => {
            let init = tree.get_one(parent, Role::Init)?;
            tree.kind(init).is_function().then_some(init)
        }
        _ => None,
    }
}

/// Declaration leaf of the receiver of `<port>.onMessage.addListener`.
fn receiver_declaration(pdg: &Pdg, callee: NodeId) -> Option<NodeId> {
    let tree = pdg.tree();
    let root = tree.member_root(callee)?;
    let binding = pdg.scopes().binding_of(root)?;
    pdg.scopes().binding(binding).decl
}
