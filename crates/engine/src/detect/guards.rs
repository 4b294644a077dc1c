//! Sender-verification guard analysis.
//!
//! A sink is considered guarded when it is control-dependent on a boolean
//! expression that inspects a sender property (`sender.url`,
//! `sender.origin`, `sender.tab.url`, `sender.id`, `sender.frameId`, or the
//! event `origin` of a window listener) through an identifier that
//! data-flows from the listener's sender binding.

use std::collections::HashSet;

use estree::{NodeId, NodeKind, Role};
use pdg::Pdg;
use profiles::ApiProfiles;

/// Bound on the transitive parent walk; a guard that takes more hops than
/// this to connect to the sender is not credited.
const REACH_LIMIT: usize = 4096;

/// Whether any control-dependence ancestor of `sink_occ` inspects the
/// sender.
pub fn is_sender_guarded(
    pdg: &Pdg,
    profiles: &ApiProfiles,
    sink_occ: NodeId,
    sender_leaves: &[NodeId],
) -> bool {
    if sender_leaves.is_empty() {
        return false;
    }
    pdg.control_dependencies(sink_occ)
        .into_iter()
        .any(|test| test_mentions_sender(pdg, profiles, test, sender_leaves))
}

/// Whether the listener contains any sender check at all, regardless of
/// what it gates. Used for the opt-in listener-hygiene report.
pub fn has_any_sender_check(
    pdg: &Pdg,
    profiles: &ApiProfiles,
    listener_fn: NodeId,
    sender_leaves: &[NodeId],
) -> bool {
    if sender_leaves.is_empty() {
        return false;
    }
    let tree = pdg.tree();
    for id in tree.descendants(listener_fn) {
        let test = match tree.kind(id) {
            NodeKind::IfStatement | NodeKind::ConditionalExpression => {
                tree.get_one(id, Role::Test)
            }
            NodeKind::LogicalExpression => tree.get_one(id, Role::Left),
            _ => None,
        };
        if let Some(test) = test {
            if test_mentions_sender(pdg, profiles, test, sender_leaves) {
                return true;
            }
        }
    }
    false
}

/// Whether a test expression reads a guard property of the sender.
pub fn test_mentions_sender(
    pdg: &Pdg,
    profiles: &ApiProfiles,
    test: NodeId,
    sender_leaves: &[NodeId],
) -> bool {
    let tree = pdg.tree();
    for id in tree.descendants(test) {
        if tree.kind(id) != NodeKind::MemberExpression {
            continue;
        }
        let Some(root) = tree.member_root(id) else {
            continue;
        };
        let Some(dotted) = tree.dotted_name(id) else {
            continue;
        };
        let Some(root_name) = tree.node(root).name() else {
            continue;
        };
        let Some(path) = dotted
            .strip_prefix(root_name)
            .and_then(|p| p.strip_prefix('.'))
        else {
            continue;
        };
        let is_guard_path = profiles
            .guard_properties
            .iter()
            .any(|prop| path == prop || path.ends_with(&format!(".{prop}")));
        if !is_guard_path {
            continue;
        }
        if reaches_any(pdg, root, sender_leaves) {
            return true;
        }
    }
    false
}

/// Transitive data-flow parents of `from` contain one of `targets`.
fn reaches_any(pdg: &Pdg, from: NodeId, targets: &[NodeId]) -> bool {
    let targets: HashSet<NodeId> = targets.iter().copied().collect();
    if targets.contains(&from) {
        return true;
    }
    let mut visited = HashSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) || visited.len() > REACH_LIMIT {
            continue;
        }
        for parent in pdg.parents_of(node) {
            if targets.contains(&parent) {
                return true;
            }
            if !visited.contains(&parent) {
                stack.push(parent);
            }
        }
    }
    false
}
