//! Iterative, call-stack-aware depth-first search.
//!
//! Kept iterative (an explicit work stack, not real recursion) so a
//! pathological input can't blow the host stack the way a recursive walk
//! over an attacker-controlled call graph could. Each call frame gets its
//! own "color" set rather than sharing one global visited set across the
//! whole program, so the same callee visited from two different call sites
//! is explored twice — each occurrence needs its own traversal state, the
//! same way the original's per-call-site visitor re-entered the callee's
//! graph rather than memoizing across calls.

use std::collections::HashSet;

use crate::graph::{Handle, Program, VertexId};
use crate::ir::{EdgeKind, Statement};

use super::{CallFrame, CallStack, Decision, Visitor};

struct WorkFrame {
    vertex: VertexId,
    edges: Vec<(Handle, VertexId)>,
    next: usize,
}

/// Walk the program graph depth-first starting at `start`, stepping into
/// every call the walk reaches and returning once it reaches `return`
/// (back at the caller) or the walk is exhausted.
pub fn dfs_visit<V: Visitor>(program: &Program, start: VertexId, visitor: &mut V) -> Decision {
    let mut call_stack = CallStack::new();
    let mut colors: Vec<HashSet<VertexId>> = vec![HashSet::new()];
    let mut work: Vec<WorkFrame> = Vec::new();

    colors.last_mut().unwrap().insert(start);
    match visitor.discover_vertex(start, program) {
        Decision::TerminateSearch => return Decision::TerminateSearch,
        Decision::TerminateBranch => return Decision::Ok,
        Decision::Ok => {}
    }
    work.push(WorkFrame { vertex: start, edges: program.out_edges(start).collect(), next: 0 });

    while let Some(top) = work.last_mut() {
        if top.next >= top.edges.len() {
            let v = top.vertex;
            work.pop();
            if let Decision::TerminateSearch = visitor.finish_vertex(v, program) {
                return Decision::TerminateSearch;
            }
            continue;
        }

        let (edge_id, target) = top.edges[top.next];
        let current = top.vertex;
        top.next += 1;

        let edge = *program.edge(edge_id);
        if edge.is_back_edge || edge.kind == EdgeKind::FunctionCallBypass {
            continue;
        }

        match visitor.examine_edge(edge_id, program, &call_stack) {
            Decision::TerminateSearch => return Decision::TerminateSearch,
            Decision::TerminateBranch => continue,
            Decision::Ok => {}
        }

        if edge.kind == EdgeKind::Return {
            let matches_top = call_stack.top().map(|f| target == f.return_target).unwrap_or(false);
            if !matches_top {
                continue;
            }
            call_stack.pop();
            colors.pop();
        }

        if edge.kind == EdgeKind::FunctionCall {
            if let Some(callee) = program.function_of(target) {
                let callee_id = callee.id;
                let return_target = program.out_edges(current).find(|(_, t)| *t != target).map(|(_, t)| t);
                match return_target {
                    Some(ret) if call_stack.push(CallFrame { callee: callee_id, call_site: current, return_target: ret }) => {
                        colors.push(HashSet::new());
                    }
                    Some(_) | None => {
                        if let Decision::TerminateSearch = visitor.recursion_detected(current, callee_id, program) {
                            return Decision::TerminateSearch;
                        }
                        continue;
                    }
                }
            }
        }

        if !colors.last_mut().unwrap().insert(target) {
            continue;
        }

        match visitor.discover_vertex(target, program) {
            Decision::TerminateSearch => return Decision::TerminateSearch,
            Decision::TerminateBranch => continue,
            Decision::Ok => {}
        }
        if let Decision::TerminateSearch = visitor.tree_edge(edge_id, program) {
            return Decision::TerminateSearch;
        }

        work.push(WorkFrame { vertex: target, edges: program.out_edges(target).collect(), next: 0 });
    }

    Decision::Ok
}

/// Convenience entry point for analyses that always start at a function's
/// `Entry`.
pub fn dfs_visit_function<V: Visitor>(program: &Program, function: crate::graph::FunctionId, visitor: &mut V) -> Decision {
    let entry = program.function(function).entry;
    dfs_visit(program, entry, visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_function, ParsedStatement};
    use crate::ir::Location;
    use crate::link::link_program;

    fn loc(line: u32) -> Location {
        Location::new("t.c", line)
    }

    struct Collector {
        visited: Vec<VertexId>,
    }

    impl Visitor for Collector {
        fn discover_vertex(&mut self, v: VertexId, _program: &Program) -> Decision {
            self.visited.push(v);
            Decision::Ok
        }
    }

    #[test]
    fn visits_every_vertex_once_in_a_straight_line_function() {
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

        let mut collector = Collector { visited: Vec::new() };
        dfs_visit(&p, f.entry, &mut collector);
        // entry, noop, return, exit
        assert_eq!(collector.visited.len(), 4);
    }

    #[test]
    fn steps_into_calls_and_returns() {
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

        let mut collector = Collector { visited: Vec::new() };
        dfs_visit(&p, caller.entry, &mut collector);
        assert!(collector.visited.contains(&callee.entry));
        assert!(collector.visited.contains(&callee.exit));
        assert!(collector.visited.contains(&caller.exit));
    }

    #[test]
    fn direct_recursion_terminates_branch_instead_of_hanging() {
        let mut p = Program::new();
        build_function(
            &mut p,
            "f",
            "t.c",
            vec![
                ParsedStatement::new(
                    Statement::FunctionCallUnresolved { callee_name: "f".into(), args: vec![], location: loc(1) },
                    loc(1),
                ),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(2)),
            ],
        )
        .unwrap();
        link_program(&mut p);
        let f = p.function_by_name("f").unwrap().clone();

        struct RecursionFlag {
            seen: bool,
        }
        impl Visitor for RecursionFlag {
            fn recursion_detected(&mut self, _call_site: VertexId, _callee: crate::graph::FunctionId, _program: &Program) -> Decision {
                self.seen = true;
                Decision::Ok
            }
        }

        let mut v = RecursionFlag { seen: false };
        let decision = dfs_visit(&p, f.entry, &mut v);
        assert_eq!(decision, Decision::Ok);
        assert!(v.seen);
    }
}
