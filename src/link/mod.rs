//! The inter-procedural linker: turns the per-function CFGs the builder
//! produced into one program-wide graph by resolving call sites to their
//! callee function and wiring the call/return/bypass edge triple.
//!
//! Grounded on `Function::Link()`: a call site starts out as a plain
//! sequential statement with one `Fallthrough` edge to whatever follows it.
//! Linking a resolved call turns that same edge into a `FunctionCallBypass`
//! edge in place (so anything that already held the edge's handle keeps
//! pointing at the right place) and adds two new edges: call-site →
//! callee's `Entry` (`FunctionCall`), and callee's `Exit` → the original
//! fallthrough target (`Return`). Both the mutated bypass edge and the new
//! return edge preserve whatever `is_back_edge` flag the original
//! fallthrough edge had — a call inside a loop body is still inside that
//! loop's back edge accounting.

use tracing::{instrument, warn};

use crate::graph::{Program, VertexId};
use crate::ir::{EdgeKind, Statement};

/// One call site the linker could not resolve, because no function in the
/// program has that name. Aggregated into the end-of-run report per the
/// error handling policy (link errors never abort the run).
#[derive(Debug, Clone)]
pub struct UnresolvedCall {
    pub caller: String,
    pub callee_name: String,
    pub location: crate::ir::Location,
}

/// Link every call site in the program. Must run after every function has
/// been built (a call site may target a function defined later).
#[instrument(skip(program))]
pub fn link_program(program: &mut Program) -> Vec<UnresolvedCall> {
    let mut unresolved = Vec::new();

    let call_sites: Vec<VertexId> = program
        .functions()
        .iter()
        .flat_map(|f| program.vertices_of(f.id).collect::<Vec<_>>())
        .filter(|&v| program.statement(v).is_function_call())
        .collect();

    for call_site in call_sites {
        let (callee_name, args, location) = match program.statement(call_site) {
            Statement::FunctionCallUnresolved { callee_name, args, location } => {
                (callee_name.clone(), args.clone(), location.clone())
            }
            _ => continue,
        };

        let caller_name = program
            .function_of(call_site)
            .map(|f| f.name.clone())
            .unwrap_or_default();

        let Some(callee) = program.function_by_name(&callee_name).cloned() else {
            warn!(caller = %caller_name, callee = %callee_name, "unresolved call");
            unresolved.push(UnresolvedCall { caller: caller_name, callee_name, location });
            continue;
        };

        let Some((bypass_edge, continuation)) = program.out_edges(call_site).next() else {
            // A call site with no outgoing edge at all shouldn't happen —
            // the builder always gives sequential statements a successor —
            // but don't panic on a malformed graph.
            continue;
        };

        let was_back_edge = program.edge(bypass_edge).is_back_edge;

        program.add_edge(call_site, callee.entry, crate::ir::Edge::new(EdgeKind::FunctionCall));
        let mut return_edge = crate::ir::Edge::new(EdgeKind::Return);
        return_edge.is_back_edge = was_back_edge;
        program.add_edge(callee.exit, continuation, return_edge);

        let bypass = program.edge_mut(bypass_edge);
        bypass.kind = EdgeKind::FunctionCallBypass;
        // is_back_edge is untouched: it was already correct for the edge we
        // are repurposing.

        *program.statement_mut(call_site) = Statement::FunctionCallResolved {
            callee: callee.id,
            callee_name,
            args,
            location,
        };
    }

    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_function, ParsedStatement};
    use crate::ir::Location;

    fn loc(line: u32) -> Location {
        Location::new("t.c", line)
    }

    #[test]
    fn call_site_gets_call_return_bypass_triple() {
        let mut p = Program::new();
        build_function(
            &mut p,
            "callee",
            "t.c",
            vec![ParsedStatement::new(Statement::ReturnUnlinked, loc(1))],
        )
        .unwrap();
        build_function(
            &mut p,
            "caller",
            "t.c",
            vec![
                ParsedStatement::new(
                    Statement::FunctionCallUnresolved {
                        callee_name: "callee".into(),
                        args: vec![],
                        location: loc(1),
                    },
                    loc(1),
                ),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(2)),
            ],
        )
        .unwrap();

        let unresolved = link_program(&mut p);
        assert!(unresolved.is_empty());

        let caller = p.function_by_name("caller").unwrap().clone();
        let call_site = p.vertices_of(caller.id).nth(2).unwrap(); // entry, exit, call
        assert!(matches!(p.statement(call_site), Statement::FunctionCallResolved { .. }));

        let kinds: Vec<EdgeKind> = p.out_edges(call_site).map(|(e, _)| p.edge(e).kind).collect();
        assert!(kinds.contains(&EdgeKind::FunctionCall));
        assert!(kinds.contains(&EdgeKind::FunctionCallBypass));
        assert!(!kinds.contains(&EdgeKind::Fallthrough));
    }

    #[test]
    fn unresolved_call_is_reported_not_fatal() {
        let mut p = Program::new();
        build_function(
            &mut p,
            "caller",
            "t.c",
            vec![
                ParsedStatement::new(
                    Statement::FunctionCallUnresolved {
                        callee_name: "missing".into(),
                        args: vec![],
                        location: loc(1),
                    },
                    loc(1),
                ),
                ParsedStatement::new(Statement::ReturnUnlinked, loc(2)),
            ],
        )
        .unwrap();

        let unresolved = link_program(&mut p);
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].callee_name, "missing");
    }
}
