//! The function builder: turns one function's ordered statement list into a
//! linked control flow graph inside the [`Program`] store.
//!
//! Grounded on `Function::CreateControlFlowGraph()` in the original source:
//! a first pass creates a vertex per statement and records label positions,
//! a second pass wires the fallthrough/branch/jump edges now that every
//! label is known, then two structural passes restore the invariants a
//! hand-built CFG can't be trusted to have on its own — `check_for_no_in_edges`
//! (I6: every non-`Entry` leader is reachable) and `add_impossible_edges`
//! (I5: `Exit` post-dominates every vertex) — and a final pass classifies
//! back edges and, where the original tool's `BackEdgeFixupVisitor` would
//! redirect rendering, records a forward target for them.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::visit::{depth_first_search, Control, DfsEvent};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::graph::{FunctionId, Program, VertexId};
use crate::ir::{CaseArm, Edge, EdgeKind, Location, Statement};

/// One statement as the front-end produced it, not yet a graph vertex.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub location: Location,
}

impl ParsedStatement {
    pub fn new(statement: Statement, location: Location) -> Self {
        ParsedStatement { statement, location }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("function `{0}` has no statements")]
    EmptyFunction(String),
}

/// Structural warnings the builder downgrades to diagnostics rather than
/// aborting on, per the error handling policy: a builder issue keeps the
/// graph and merely annotates it.
#[derive(Debug, Clone)]
pub enum BuildWarning {
    UnreachableStatement { function: String, location: Location },
    /// A later `Label(name)` with the same name as an earlier one; the
    /// later vertex wins in `label_map`, per §4.1 step 3.
    DuplicateLabel { function: String, label: String, location: Location },
    /// A `Goto`/`If`/`Switch` target that never appears as a `Label` in the
    /// function; the edge that would have pointed at it is simply not
    /// added (§4.1 failure modes: non-fatal, construction continues).
    UnresolvedLabel { function: String, label: String, location: Location },
}

pub struct BuildOutput {
    pub function: FunctionId,
    pub warnings: Vec<BuildWarning>,
}

/// Build one function's CFG from its parsed statement stream and insert it
/// into `program`. Returns the new function's id plus any non-fatal
/// structural warnings collected along the way.
#[instrument(skip(program, statements), fields(function = %name))]
pub fn build_function(
    program: &mut Program,
    name: &str,
    file: &str,
    statements: Vec<ParsedStatement>,
) -> Result<BuildOutput, BuildError> {
    if statements.is_empty() {
        return Err(BuildError::EmptyFunction(name.to_string()));
    }

    let function_id = program.begin_function(name, file);
    let entry = program.function(function_id).entry;
    let exit = program.function(function_id).exit;

    let mut warnings = Vec::new();

    // Pass 1: materialize a vertex per statement, recording label positions.
    // A later `Label` with a name already seen wins (matching the original's
    // ResolveLinks()), but per §4.1 step 3 the overwrite is reported, not
    // silent.
    let mut vertices = Vec::with_capacity(statements.len());
    let mut label_map: HashMap<String, VertexId> = HashMap::new();
    for parsed in &statements {
        let v = program.add_vertex(function_id, parsed.statement.clone());
        program.set_location(v, parsed.location.clone());
        if let Statement::Label(label_name) = &parsed.statement {
            if label_map.contains_key(label_name) {
                warnings.push(BuildWarning::DuplicateLabel {
                    function: name.to_string(),
                    label: label_name.clone(),
                    location: parsed.location.clone(),
                });
                warn!(function = %name, label = %label_name, location = %parsed.location, "duplicate label");
            }
            label_map.insert(label_name.clone(), v);
        }
        vertices.push(v);
    }

    // Pass 2: wire sequential fallthrough and resolve branch/jump targets.
    program.add_edge(entry, vertices[0], Edge::new(EdgeKind::Fallthrough));

    for (i, parsed) in statements.iter().enumerate() {
        let v = vertices[i];
        let next = vertices.get(i + 1).copied();

        match &parsed.statement {
            Statement::IfUnlinked { true_target, false_target, condition } => {
                let true_v = resolve_label(&label_map, true_target, name, &parsed.location, &mut warnings);
                let false_v = resolve_label(&label_map, false_target, name, &parsed.location, &mut warnings);
                if let Some(tv) = true_v {
                    program.add_edge(v, tv, Edge::new(EdgeKind::IfTrue));
                }
                if let Some(fv) = false_v {
                    program.add_edge(v, fv, Edge::new(EdgeKind::IfFalse));
                }
                *program.statement_mut(v) = Statement::If { condition: condition.clone() };
            }
            Statement::SwitchUnlinked { arms } => {
                let mut any_resolved = false;
                for arm in arms {
                    if let Some(target_v) = resolve_label(&label_map, &arm.target_label, name, &parsed.location, &mut warnings) {
                        program.add_edge(v, target_v, Edge::new(EdgeKind::Fallthrough));
                        any_resolved = true;
                    }
                }
                // §4.1: replaces with `Switch` iff at least one case
                // resolved; otherwise leave the unlinked statement in place
                // (non-fatal, already reported per arm above).
                if any_resolved {
                    *program.statement_mut(v) = Statement::Switch;
                }
            }
            Statement::GotoUnlinked { target_label } => {
                // §4.1: "on success replaces the vertex's statement with
                // Goto" — an unresolved target leaves it unlinked.
                if let Some(target_v) = resolve_label(&label_map, target_label, name, &parsed.location, &mut warnings) {
                    program.add_edge(v, target_v, Edge::new(EdgeKind::Goto));
                    *program.statement_mut(v) = Statement::Goto;
                }
            }
            Statement::ReturnUnlinked => {
                program.add_edge(v, exit, Edge::new(EdgeKind::Fallthrough));
                *program.statement_mut(v) = Statement::Return;
            }
            Statement::Return | Statement::Exit => {
                // Already-linked input (e.g. replayed from a prior build);
                // nothing to wire.
            }
            // Sequential statements: NoOp, Merge, Placeholder, Label,
            // FunctionCallUnresolved/Resolved all fall through to the next
            // statement, or to Exit if this was the last one.
            _ => {
                let target = next.unwrap_or(exit);
                program.add_edge(v, target, Edge::new(EdgeKind::Fallthrough));
            }
        }
    }

    check_for_no_in_edges(program, function_id, entry, &vertices, &statements, &mut warnings);
    add_impossible_edges(program, function_id, exit, &vertices);
    fixup_back_edges(program, entry);

    debug!(vertices = vertices.len(), warnings = warnings.len(), "function built");
    Ok(BuildOutput { function: function_id, warnings })
}

/// Look up `label` in `label_map`. An unresolved label is non-fatal per
/// §4.1's failure modes: this pushes a warning and returns `None` so the
/// caller skips just the one edge instead of aborting the whole function —
/// the leader then picks up an `Impossible` edge from `check_for_no_in_edges`.
fn resolve_label(
    label_map: &HashMap<String, VertexId>,
    label: &str,
    function: &str,
    location: &Location,
    warnings: &mut Vec<BuildWarning>,
) -> Option<VertexId> {
    match label_map.get(label).copied() {
        Some(v) => Some(v),
        None => {
            warnings.push(BuildWarning::UnresolvedLabel {
                function: function.to_string(),
                label: label.to_string(),
                location: location.clone(),
            });
            warn!(function = %function, label = %label, location = %location, "unresolved label");
            None
        }
    }
}

/// I6: every non-`Entry` leader must have an in-edge. A vertex can end up
/// with none if it follows an unconditional jump nothing jumps back to
/// (dead code) — report it and give it a synthetic `Impossible` edge from
/// `Entry` so traversal can still reach and print it.
fn check_for_no_in_edges(
    program: &mut Program,
    function_id: FunctionId,
    entry: VertexId,
    vertices: &[VertexId],
    statements: &[ParsedStatement],
    warnings: &mut Vec<BuildWarning>,
) {
    let function_name = program.function(function_id).name.clone();
    for (i, &v) in vertices.iter().enumerate() {
        if v == entry || program.in_degree(v) > 0 {
            continue;
        }
        warnings.push(BuildWarning::UnreachableStatement {
            function: function_name.clone(),
            location: statements[i].location.clone(),
        });
        warn!(function = %function_name, location = %statements[i].location, "unreachable statement");
        program.add_edge(entry, v, Edge::new(EdgeKind::Impossible));
    }
}

/// I5: `Exit` must post-dominate every vertex. Compute the set of vertices
/// that can already reach `Exit`; anything outside it (infinite loops with
/// no escaping edge, for example) gets a direct synthetic edge to `Exit`.
fn add_impossible_edges(program: &mut Program, function_id: FunctionId, exit: VertexId, vertices: &[VertexId]) {
    let mut can_reach_exit: HashSet<VertexId> = HashSet::new();
    let mut queue = VecDeque::new();
    can_reach_exit.insert(exit);
    queue.push_back(exit);
    while let Some(v) = queue.pop_front() {
        for (_, pred) in program.in_edges(v) {
            if can_reach_exit.insert(pred) {
                queue.push_back(pred);
            }
        }
    }

    for &v in vertices {
        if v != exit && program.function_of(v).map(|f| f.id) == Some(function_id) && !can_reach_exit.contains(&v) {
            program.add_edge(v, exit, Edge::new(EdgeKind::Impossible));
        }
    }
}

/// Classify back edges via a DFS tree rooted at `entry`, then for each back
/// edge whose source has no other forward out-edge, redirect it to the
/// nearest decision-statement ancestor's other live target — the textual
/// renderer uses this to show a loop as "continues at" rather than a bare
/// backward arrow with nothing else to print at the source vertex.
fn fixup_back_edges(program: &mut Program, entry: VertexId) {
    let mut parent: HashMap<VertexId, VertexId> = HashMap::new();
    let mut back_edges: Vec<(VertexId, VertexId)> = Vec::new();

    let graph = program.graph();
    depth_first_search(graph, Some(entry), |event| {
        match event {
            DfsEvent::TreeEdge(u, v) => {
                parent.entry(v).or_insert(u);
            }
            DfsEvent::BackEdge(u, v) => {
                back_edges.push((u, v));
            }
            _ => {}
        }
        Control::<()>::Continue
    });

    for (u, w) in back_edges {
        let mut found_any = false;
        if let Some((edge_id, _)) = program.out_edges(u).find(|(_, t)| *t == w) {
            program.edge_mut(edge_id).is_back_edge = true;
            found_any = true;
        }
        if !found_any {
            continue;
        }
        let other_forward_targets: Vec<VertexId> =
            program.out_edges(u).filter(|(_, t)| *t != w).map(|(_, t)| t).collect();
        if !other_forward_targets.is_empty() {
            // The back-edge source still has a forward way out; nothing to
            // redirect.
            continue;
        }
        if let Some(target) = find_forward_target_for_back_edge(program, &parent, u) {
            if let Some((edge_id, _)) = program.out_edges(u).find(|(_, t)| *t == w) {
                program.edge_mut(edge_id).redirect = Some(target);
            }
        }
    }
}

/// Walk `parent` pointers from `from` up to the nearest ancestor whose
/// statement is a decision point, and return that ancestor's other live
/// (non-back) out-edge target, if it has exactly one besides the one that
/// led toward `from`.
fn find_forward_target_for_back_edge(
    program: &Program,
    parent: &HashMap<VertexId, VertexId>,
    from: VertexId,
) -> Option<VertexId> {
    let mut came_from = from;
    let mut cur = *parent.get(&from)?;
    loop {
        if program.statement(cur).is_decision() {
            let mut others = program
                .out_edges(cur)
                .filter(|(_, t)| *t != came_from)
                .map(|(_, t)| t);
            let first = others.next();
            if let Some(target) = first {
                if others.next().is_none() {
                    return Some(target);
                }
            }
        }
        came_from = cur;
        cur = *parent.get(&cur)?;
    }
}
