//! Vulnerability detection: sources, sinks, rendezvous pairing and
//! sender-guard gating.
//!
//! For every message listener the detector materializes forward flows from
//! the taint sources (privileged API callback results, storage reads, the
//! attacker-influenced message payload) and from the responder bindings
//! (`sendResponse`, ports). A pair is emitted when a source flow and a
//! responder flow end inside the same call expression, unless that sink is
//! control-dependent on a sender check.

pub mod guards;
pub mod listeners;

use std::collections::{BTreeMap, HashSet};

use estree::{NodeId, NodeKind, Role};
use pdg::Pdg;
use profiles::{ApiProfiles, SinkKind, SourceKind};
use serde::Serialize;
use tracing::debug;

use crate::flow::{Flow, FlowRecord};
use crate::graph::{FlowGraph, FlowPolicy};
use listeners::MessageListener;

/// The call (or assignment) where a source flow and a sink flow meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendezvous {
    #[serde(rename = "type")]
    pub node_type: String,
    pub location: String,
    pub filename: String,
    pub line_of_code: String,
}

/// Classification of an emitted flow pair. Not serialized; the report
/// splits dangers into exfiltration and infiltration lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerClass {
    /// Privileged API result answered to an unverified sender (4.1).
    PrivilegedExfiltration,
    /// Extension storage read answered to an unverified sender (4.3).
    StorageExfiltration,
    /// Attacker payload into a privileged, DOM or code-execution sink (4.1).
    PayloadInfiltration,
    /// Attacker payload written into extension storage (4.2).
    StorageWriteInfiltration,
    /// Extension storage read flowing into a DOM sink (4.2).
    StorageToDomInfiltration,
}

impl DangerClass {
    pub fn is_exfiltration(&self) -> bool {
        matches!(
            self,
            DangerClass::PrivilegedExfiltration | DangerClass::StorageExfiltration
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Danger {
    pub from_flow: Vec<FlowRecord>,
    pub to_flow: Vec<FlowRecord>,
    pub rendezvous: Rendezvous,
    pub data_flow_number: String,
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip)]
    pub class: DangerClass,
}

fn is_false(b: &bool) -> bool {
    !b
}

/// An unverified listener without any privileged interaction; reported only
/// on opt-in.
#[derive(Debug, Clone, Serialize)]
pub struct Violation31 {
    pub location: String,
    pub filename: String,
    pub line_of_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageAccess {
    pub operation: String,
    pub location: String,
    pub line_of_code: String,
}

#[derive(Debug, Default, Serialize)]
pub struct FileAnalysis {
    pub exfiltration_dangers: Vec<Danger>,
    pub infiltration_dangers: Vec<Danger>,
    #[serde(rename = "31_violations_without_sensitive_api_access")]
    pub violations_31: Vec<Violation31>,
    pub extension_storage_accesses: BTreeMap<String, Vec<StorageAccess>>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub include_31_violations: bool,
    /// `None` is unbounded; flows cut at the bound are marked truncated.
    pub flow_depth_limit: Option<usize>,
    pub policy: FlowPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            include_31_violations: false,
            flow_depth_limit: None,
            policy: FlowPolicy::OnePerNode,
        }
    }
}

pub struct Detector<'a> {
    pdg: &'a Pdg,
    profiles: &'a ApiProfiles,
    config: DetectorConfig,
}

struct Candidate {
    class: DangerClass,
    listener: Option<usize>,
    from: Flow,
    to: Flow,
    rendezvous: NodeId,
    /// Occurrence whose control dependencies decide the sender gating.
    sink_occ: NodeId,
}

impl<'a> Detector<'a> {
    pub fn new(pdg: &'a Pdg, profiles: &'a ApiProfiles, config: DetectorConfig) -> Detector<'a> {
        Detector {
            pdg,
            profiles,
            config,
        }
    }

    pub fn run(&self) -> FileAnalysis {
        let tree = self.pdg.tree();
        let listeners = listeners::discover(self.pdg);
        let api_params = self.pdg.api_callback_params();
        debug!(
            file = %tree.file,
            listeners = listeners.len(),
            api_params = api_params.len(),
            "detector started"
        );

        let mut candidates: Vec<Candidate> = Vec::new();
        for (index, listener) in listeners.iter().enumerate() {
            self.exfiltration_candidates(index, listener, &api_params, &mut candidates);
            self.infiltration_candidates(index, listener, &mut candidates);
        }
        self.storage_to_dom_candidates(&api_params, &mut candidates);

        // Sender-guard gating.
        let mut listener_had_danger: Vec<bool> = vec![false; listeners.len()];
        let mut emitted: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<(NodeId, NodeId, NodeId)> = HashSet::new();
        for candidate in candidates {
            if !seen.insert((candidate.from.last(), candidate.to.last(), candidate.rendezvous)) {
                continue;
            }
            if let Some(index) = candidate.listener {
                listener_had_danger[index] = true;
                let sender = &listeners[index].sender_leaves;
                if guards::is_sender_guarded(self.pdg, self.profiles, candidate.sink_occ, sender) {
                    debug!(
                        file = %tree.file,
                        rendezvous = %tree.location(candidate.rendezvous),
                        "pair suppressed by sender guard"
                    );
                    continue;
                }
            }
            emitted.push(candidate);
        }

        // Deterministic numbering: sink position, then source position,
        // then stable node id.
        emitted.sort_by_key(|c| {
            (
                tree.order_key(c.rendezvous),
                tree.order_key(c.from.first()),
                c.rendezvous,
            )
        });
        let total = emitted.len();
        let mut analysis = FileAnalysis {
            extension_storage_accesses: self.storage_census(),
            ..FileAnalysis::default()
        };
        for (i, candidate) in emitted.into_iter().enumerate() {
            let danger = Danger {
                from_flow: candidate.from.records(tree),
                to_flow: candidate.to.records(tree),
                rendezvous: Rendezvous {
                    node_type: tree.kind(candidate.rendezvous).as_str().to_string(),
                    location: tree.location(candidate.rendezvous),
                    filename: tree.file.clone(),
                    line_of_code: tree.line_of_code(candidate.rendezvous),
                },
                data_flow_number: format!("{}/{}", i + 1, total),
                truncated: candidate.from.truncated || candidate.to.truncated,
                class: candidate.class,
            };
            if candidate.class.is_exfiltration() {
                analysis.exfiltration_dangers.push(danger);
            } else {
                analysis.infiltration_dangers.push(danger);
            }
        }

        if self.config.include_31_violations {
            for (index, listener) in listeners.iter().enumerate() {
                if listener_had_danger[index] {
                    continue;
                }
                if guards::has_any_sender_check(
                    self.pdg,
                    self.profiles,
                    listener.function,
                    &listener.sender_leaves,
                ) {
                    continue;
                }
                analysis.violations_31.push(Violation31 {
                    location: tree.location(listener.call),
                    filename: tree.file.clone(),
                    line_of_code: tree.line_of_code(listener.call),
                });
            }
        }

        debug!(
            file = %tree.file,
            exfiltration = analysis.exfiltration_dangers.len(),
            infiltration = analysis.infiltration_dangers.len(),
            "detector finished"
        );
        analysis
    }

    /// Privileged-API and storage-read results flowing into the listener's
    /// responders (4.1 exfiltration, 4.3 storage exfiltration).
    fn exfiltration_candidates(
        &self,
        index: usize,
        listener: &MessageListener,
        api_params: &[(NodeId, NodeId)],
        out: &mut Vec<Candidate>,
    ) {
        let tree = self.pdg.tree();
        for &(leaf, api_call) in api_params {
            let Some(kind) = self.source_kind_of(api_call) else {
                continue;
            };
            let class = match kind {
                SourceKind::PrivilegedApi => DangerClass::PrivilegedExfiltration,
                SourceKind::StorageRead => DangerClass::StorageExfiltration,
            };
            let from_graph = FlowGraph::forward(self.pdg, leaf, self.config.flow_depth_limit);
            let from_flows = from_graph.flows(self.config.policy);

            for &response in &listener.response_leaves {
                let to_graph =
                    FlowGraph::forward(self.pdg, response, self.config.flow_depth_limit);
                let to_flows = to_graph.flows(self.config.policy);
                for from in &from_flows {
                    let Some(rendezvous) = rendezvous_of(tree, from.last()) else {
                        continue;
                    };
                    for to in &to_flows {
                        if to.last() == from.last() {
                            continue;
                        }
                        if rendezvous_of(tree, to.last()) != Some(rendezvous) {
                            continue;
                        }
                        out.push(Candidate {
                            class,
                            listener: Some(index),
                            from: from.clone(),
                            to: to.clone(),
                            rendezvous,
                            sink_occ: to.last(),
                        });
                    }
                }
            }

            // Promise-style responders: the listener's own return value.
            for from in &from_flows {
                let Some(ret) = enclosing_return(tree, from.last(), listener.function) else {
                    continue;
                };
                out.push(Candidate {
                    class,
                    listener: Some(index),
                    from: from.clone(),
                    to: Flow::pseudo(ret),
                    rendezvous: ret,
                    sink_occ: from.last(),
                });
            }
        }
    }

    /// Attacker payload flowing into privileged, storage-write, DOM or
    /// code-execution sinks (4.1 infiltration / UXSS, 4.2 storage write).
    fn infiltration_candidates(
        &self,
        index: usize,
        listener: &MessageListener,
        out: &mut Vec<Candidate>,
    ) {
        let tree = self.pdg.tree();
        for &leaf in &listener.message_leaves {
            let graph = FlowGraph::forward(self.pdg, leaf, self.config.flow_depth_limit);
            for flow in graph.flows(self.config.policy) {
                let Some(site) = self.sink_site_of(flow.last()) else {
                    continue;
                };
                let class = match site.kind {
                    Some(SinkKind::StorageWrite) => DangerClass::StorageWriteInfiltration,
                    _ => DangerClass::PayloadInfiltration,
                };
                out.push(Candidate {
                    class,
                    listener: Some(index),
                    sink_occ: flow.last(),
                    from: flow,
                    to: Flow::pseudo(site.target),
                    rendezvous: site.rendezvous,
                });
            }
        }
    }

    /// Storage reads flowing into DOM or code-execution sinks: the second
    /// half of a 4.2 chain. Not tied to a listener, so never sender-gated.
    fn storage_to_dom_candidates(
        &self,
        api_params: &[(NodeId, NodeId)],
        out: &mut Vec<Candidate>,
    ) {
        for &(leaf, api_call) in api_params {
            if self.source_kind_of(api_call) != Some(SourceKind::StorageRead) {
                continue;
            }
            let graph = FlowGraph::forward(self.pdg, leaf, self.config.flow_depth_limit);
            for flow in graph.flows(self.config.policy) {
                let Some(site) = self.sink_site_of(flow.last()) else {
                    continue;
                };
                if !matches!(site.kind, Some(SinkKind::CodeExecution) | None) {
                    continue;
                }
                out.push(Candidate {
                    class: DangerClass::StorageToDomInfiltration,
                    listener: None,
                    sink_occ: flow.last(),
                    from: flow,
                    to: Flow::pseudo(site.target),
                    rendezvous: site.rendezvous,
                });
            }
        }
    }

    fn source_kind_of(&self, api_call: NodeId) -> Option<SourceKind> {
        let tree = self.pdg.tree();
        let callee = tree.get_one(api_call, Role::Callee)?;
        let dotted = tree.dotted_name(callee)?;
        self.profiles.source(&dotted).map(|p| p.kind)
    }

    /// The sink the occurrence feeds, if any: a profiled sink call whose
    /// matching argument contains it, or a DOM-property assignment whose
    /// right-hand side contains it.
    fn sink_site_of(&self, occ: NodeId) -> Option<SinkSite> {
        let tree = self.pdg.tree();
        let mut cur = occ;
        for ancestor in tree.ancestors(occ) {
            let kind = tree.kind(ancestor);
            if kind.is_function() {
                return None;
            }
            match kind {
                NodeKind::CallExpression | NodeKind::NewExpression => {
                    if let Some(site) = self.match_sink_call(ancestor, occ) {
                        return Some(site);
                    }
                }
                NodeKind::AssignmentExpression => {
                    if tree.node(cur).role == Role::Right {
                        if let Some(site) = self.match_dom_assignment(ancestor) {
                            return Some(site);
                        }
                    }
                }
                _ => {}
            }
            cur = ancestor;
        }
        None
    }

    fn match_sink_call(&self, call: NodeId, occ: NodeId) -> Option<SinkSite> {
        let tree = self.pdg.tree();
        let callee = tree.get_one(call, Role::Callee)?;
        if tree.is_inside_or_is(occ, callee) {
            return None;
        }
        let dotted = tree.dotted_name(callee)?;
        let sink = self.profiles.sink(&dotted)?;
        let args = tree.call_arguments(call);
        let position = args.iter().position(|&a| tree.is_inside_or_is(occ, a))?;
        if !sink.arg_indices.is_empty() && !sink.arg_indices.contains(&position) {
            return None;
        }
        Some(SinkSite {
            rendezvous: call,
            target: call,
            kind: Some(sink.kind),
        })
    }

    fn match_dom_assignment(&self, assignment: NodeId) -> Option<SinkSite> {
        let tree = self.pdg.tree();
        let left = tree.get_one(assignment, Role::Left)?;
        if tree.kind(left) != NodeKind::MemberExpression {
            return None;
        }
        let property = tree.get_one(left, Role::Property)?;
        let name = if tree.node(left).attrs.computed {
            tree.node(property).string_value()?.to_string()
        } else {
            tree.node(property).name()?.to_string()
        };
        if !self.profiles.dom_property_sinks.contains(&name) {
            return None;
        }
        Some(SinkSite {
            rendezvous: assignment,
            target: left,
            kind: None,
        })
    }

    /// Census of `chrome.storage.<area>.*` call sites, keyed by area.
    fn storage_census(&self) -> BTreeMap<String, Vec<StorageAccess>> {
        let tree = self.pdg.tree();
        let mut out: BTreeMap<String, Vec<StorageAccess>> = BTreeMap::new();
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
            let Some((area, operation)) = self.profiles.storage_access(&dotted) else {
                continue;
            };
            out.entry(area).or_default().push(StorageAccess {
                operation,
                location: tree.location(node.id),
                line_of_code: tree.line_of_code(node.id),
            });
        }
        out
    }
}

struct SinkSite {
    rendezvous: NodeId,
    /// Node standing in as the to-flow for non-identifier sinks.
    target: NodeId,
    /// `None` for DOM-property assignments.
    kind: Option<SinkKind>,
}

/// The call or assignment expression where a flow endpoint materializes,
/// without crossing a function boundary.
fn rendezvous_of(tree: &estree::SyntaxTree, node: NodeId) -> Option<NodeId> {
    for ancestor in tree.ancestors(node) {
        let kind = tree.kind(ancestor);
        if kind.is_function() {
            return None;
        }
        if matches!(
            kind,
            NodeKind::CallExpression | NodeKind::NewExpression | NodeKind::AssignmentExpression
        ) {
            return Some(ancestor);
        }
    }
    None
}

/// The return statement of `function` containing `node`, when no other
/// function intervenes.
fn enclosing_return(
    tree: &estree::SyntaxTree,
    node: NodeId,
    function: NodeId,
) -> Option<NodeId> {
    for ancestor in tree.ancestors(node) {
        let kind = tree.kind(ancestor);
        if kind == NodeKind::ReturnStatement {
            return (tree.enclosing_function(ancestor) == Some(function)).then_some(ancestor);
        }
        if kind.is_function() {
            return None;
        }
    }
    None
}
