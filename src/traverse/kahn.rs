//! Call-stack-aware Kahn topological walk: the canonical traversal for
//! rendering, since it visits every vertex only once its filtered in-degree
//! has been fully discharged, giving the natural top-to-bottom reading
//! order a text CFG outline wants.
//!
//! Grounded on `topological_visit_kahn.h`'s `RemainingInDegreeMap` (lazily
//! initialized per vertex from [`Program::filtered_in_degree`], erased once
//! it reaches zero) and its `std::stack<EdgeDesc>`-driven main loop. Calls
//! are stepped into the same way the DFS driver does; because the same
//! callee can be rendered once per call site, the remaining-in-degree map
//! is scoped per call frame exactly like the DFS driver's per-frame color
//! sets.

use std::collections::HashMap;

use crate::graph::{FunctionId, Handle, Program, VertexId};
use crate::ir::EdgeKind;

use super::{CallFrame, CallStack, Decision, Visitor};

struct StackFrame {
    remaining: HashMap<VertexId, usize>,
    edges: Vec<Handle>,
}

impl StackFrame {
    fn new() -> Self {
        StackFrame { remaining: HashMap::new(), edges: Vec::new() }
    }
}

/// Walk a function's graph (and every callee it reaches) in Kahn
/// topological order starting at `function`'s `Entry`.
pub fn kahn_visit<V: Visitor>(program: &Program, function: FunctionId, visitor: &mut V) -> Decision {
    let entry = program.function(function).entry;
    let mut call_stack = CallStack::new();
    let mut frames: Vec<StackFrame> = vec![StackFrame::new()];

    match visitor.discover_vertex(entry, program) {
        Decision::TerminateSearch => return Decision::TerminateSearch,
        Decision::TerminateBranch => return Decision::Ok,
        Decision::Ok => {}
    }
    for (edge_id, _) in program.out_edges(entry) {
        frames.last_mut().unwrap().edges.push(edge_id);
    }

    loop {
        let edge_id = {
            let Some(top) = frames.last_mut() else { break };
            match top.edges.pop() {
                Some(e) => e,
                None => {
                    if frames.len() > 1 {
                        frames.pop();
                        continue;
                    } else {
                        break;
                    }
                }
            }
        };

        let edge = *program.edge(edge_id);
        if edge.is_back_edge || edge.kind == EdgeKind::Impossible || edge.kind == EdgeKind::FunctionCallBypass {
            continue;
        }
        let Some((from, to)) = program.graph().edge_endpoints(edge_id) else { continue };

        match visitor.examine_edge(edge_id, program, &call_stack) {
            Decision::TerminateSearch => return Decision::TerminateSearch,
            Decision::TerminateBranch => continue,
            Decision::Ok => {}
        }

        if edge.kind == EdgeKind::Return {
            let matches_top = call_stack.top().map(|f| to == f.return_target).unwrap_or(false);
            if !matches_top {
                continue;
            }
            call_stack.pop();
            frames.pop();
            // Discharge `to` in the caller's (now top) frame, standing in
            // for the bypass edge filtered_in_degree counted instead of
            // this Return edge.
            match discharge(&mut frames, &mut call_stack, to, from, edge_id, program, visitor) {
                Decision::TerminateSearch => return Decision::TerminateSearch,
                _ => {}
            }
            continue;
        }

        let ready = {
            let frame = frames.last_mut().unwrap();
            let remaining = frame.remaining.entry(to).or_insert_with(|| program.filtered_in_degree(to));
            if *remaining == 0 {
                false
            } else {
                *remaining -= 1;
                if *remaining == 0 {
                    frame.remaining.remove(&to);
                    true
                } else {
                    false
                }
            }
        };
        if !ready {
            continue;
        }

        match discharge(&mut frames, &mut call_stack, to, from, edge_id, program, visitor) {
            Decision::TerminateSearch => return Decision::TerminateSearch,
            _ => {}
        }
    }

    Decision::Ok
}

/// `to` just became ready (its filtered in-degree fully discharged, whether
/// by an ordinary edge or by the Return edge standing in for a bypassed
/// call). Runs the discover/tree-edge hooks, then either pushes `to`'s
/// out-edges onto the current frame, or — if `to` is a resolved call site —
/// steps into the callee (pushing a fresh frame) unless that would recurse,
/// in which case it falls back to discharging the call's own continuation
/// immediately so the walk doesn't stall waiting for a Return that will
/// never come.
fn discharge<V: Visitor>(
    frames: &mut Vec<StackFrame>,
    call_stack: &mut CallStack,
    to: VertexId,
    arrived_from: VertexId,
    causing_edge: Handle,
    program: &Program,
    visitor: &mut V,
) -> Decision {
    if let Decision::TerminateSearch = visitor.tree_edge(causing_edge, program) {
        return Decision::TerminateSearch;
    }
    match visitor.discover_vertex(to, program) {
        Decision::TerminateSearch => return Decision::TerminateSearch,
        Decision::TerminateBranch => {
            visitor.finish_vertex(to, program);
            return Decision::Ok;
        }
        Decision::Ok => {}
    }

    if let Some(callee) = program.function_of(to) {
        let is_call_entry = to == callee.entry && arrived_from != to;
        if is_call_entry && program.statement(arrived_from).is_function_call() {
            let callee_id = callee.id;
            let return_target = program.out_edges(arrived_from).find(|(_, t)| *t != to).map(|(_, t)| t);
            if let Some(ret) = return_target {
                if call_stack.push(CallFrame { callee: callee_id, call_site: arrived_from, return_target: ret }) {
                    frames.push(StackFrame::new());
                    let mut children_pushed = 0usize;
                    let mut last_pushed_edge = None;
                    for (edge_id, _) in program.out_edges(to) {
                        frames.last_mut().unwrap().edges.push(edge_id);
                        children_pushed += 1;
                        last_pushed_edge = Some(edge_id);
                    }
                    if let Decision::TerminateSearch =
                        visitor.vertex_visit_complete(to, children_pushed, last_pushed_edge, program)
                    {
                        return Decision::TerminateSearch;
                    }
                    visitor.finish_vertex(to, program);
                    return Decision::Ok;
                } else {
                    if let Decision::TerminateSearch = visitor.recursion_detected(arrived_from, callee_id, program) {
                        return Decision::TerminateSearch;
                    }
                    visitor.finish_vertex(to, program);
                    return discharge_call_site(frames, call_stack, arrived_from, ret, program, visitor);
                }
            }
        }
    }

    let mut children_pushed = 0usize;
    let mut last_pushed_edge = None;
    for (edge_id, _) in program.out_edges(to) {
        frames.last_mut().unwrap().edges.push(edge_id);
        children_pushed += 1;
        last_pushed_edge = Some(edge_id);
    }
    if let Decision::TerminateSearch = visitor.vertex_visit_complete(to, children_pushed, last_pushed_edge, program) {
        return Decision::TerminateSearch;
    }
    visitor.finish_vertex(to, program);
    Decision::Ok
}

/// Recursion (or a call with no discoverable return target) was detected at
/// `call_site`: treat its continuation as reached directly, the same
/// bookkeeping effect the matching Return edge would have had.
fn discharge_call_site<V: Visitor>(
    frames: &mut Vec<StackFrame>,
    call_stack: &mut CallStack,
    call_site: VertexId,
    continuation: VertexId,
    program: &Program,
    visitor: &mut V,
) -> Decision {
    let bypass_edge = program
        .out_edges(call_site)
        .find(|(e, _)| program.edge(*e).kind == EdgeKind::FunctionCallBypass)
        .map(|(e, _)| e);
    let Some(bypass_edge) = bypass_edge else { return Decision::Ok };

    let frame = frames.last_mut().unwrap();
    let remaining = frame.remaining.entry(continuation).or_insert_with(|| program.filtered_in_degree(continuation));
    if *remaining == 0 {
        return Decision::Ok;
    }
    *remaining -= 1;
    if *remaining != 0 {
        return Decision::Ok;
    }
    frame.remaining.remove(&continuation);
    discharge(frames, call_stack, continuation, call_site, bypass_edge, program, visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_function, ParsedStatement};
    use crate::ir::{Location, Statement};
    use crate::link::link_program;

    fn loc(line: u32) -> Location {
        Location::new("t.c", line)
    }

    struct OrderRecorder {
        order: Vec<VertexId>,
    }
    impl Visitor for OrderRecorder {
        fn discover_vertex(&mut self, v: VertexId, _program: &Program) -> Decision {
            self.order.push(v);
            Decision::Ok
        }
    }

    #[test]
    fn visits_entry_before_its_successors() {
        let mut p = Program::new();
        build_function(
            &mut p,
            "f",
            "t.c",
            vec![
                ParsedStatement::new(Statement::NoOp, loc(1)),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(2)),
            ],
        )
        .unwrap();
        let f = p.function_by_name("f").unwrap().clone();

        let mut rec = OrderRecorder { order: Vec::new() };
        kahn_visit(&p, f.id, &mut rec);
        assert_eq!(rec.order.first().copied(), Some(f.entry));
        assert_eq!(rec.order.last().copied(), Some(f.exit));
    }

    #[test]
    fn diamond_join_waits_for_both_branches() {
        let mut p = Program::new();
        build_function(
            &mut p,
            "f",
            "t.c",
            vec![
                ParsedStatement::new(
                    Statement::IfUnlinked { condition: "x".into(), true_target: "L1".into(), false_target: "L2".into() },
                    loc(1),
                ),
                ParsedStatement::new(Statement::Label("L1".into()), loc(2)),
                ParsedStatement::new(Statement::GotoUnlinked { target_label: "join".into() }, loc(3)),
                ParsedStatement::new(Statement::Label("L2".into()), loc(4)),
                ParsedStatement::new(Statement::GotoUnlinked { target_label: "join".into() }, loc(5)),
                ParsedStatement::new(Statement::Label("join".into()), loc(6)),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(7)),
            ],
        )
        .unwrap();
        let f = p.function_by_name("f").unwrap().clone();

        let mut rec = OrderRecorder { order: Vec::new() };
        let decision = kahn_visit(&p, f.id, &mut rec);
        assert_eq!(decision, Decision::Ok);
        // entry, exit, if, L1, goto, L2, goto, join, return = 9 vertices,
        // every one of them visited exactly once.
        assert_eq!(rec.order.len(), 9);
        let join_vertex = p
            .vertices_of(f.id)
            .find(|&v| matches!(p.statement(v), Statement::Label(name) if name == "join"))
            .unwrap();
        let goto1 = p.vertices_of(f.id).nth(4).unwrap();
        let goto2 = p.vertices_of(f.id).nth(6).unwrap();
        let join_pos = rec.order.iter().position(|&v| v == join_vertex).unwrap();
        let goto1_pos = rec.order.iter().position(|&v| v == goto1).unwrap();
        let goto2_pos = rec.order.iter().position(|&v| v == goto2).unwrap();
        assert!(join_pos > goto1_pos && join_pos > goto2_pos);
    }

    #[test]
    fn steps_into_calls_in_topological_order() {
        let mut p = Program::new();
        build_function(&mut p, "callee", "t.c", vec![ParsedStatement::new(Statement::ReturnUnlinked, loc(1))])
            .unwrap();
        build_function(
            &mut p,
            "caller",
            "t.c",
            vec![
                ParsedStatement::new(
                    Statement::FunctionCallUnresolved { callee_name: "callee".into(), args: vec![], location: loc(1) },
                    loc(1),
                ),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(2)),
            ],
        )
        .unwrap();
        link_program(&mut p);
        let caller = p.function_by_name("caller").unwrap().clone();
        let callee = p.function_by_name("callee").unwrap().clone();

        let mut rec = OrderRecorder { order: Vec::new() };
        kahn_visit(&p, caller.id, &mut rec);
        let callee_entry_pos = rec.order.iter().position(|&v| v == callee.entry).unwrap();
        let caller_exit_pos = rec.order.iter().position(|&v| v == caller.exit).unwrap();
        assert!(callee_entry_pos < caller_exit_pos);
    }
}
