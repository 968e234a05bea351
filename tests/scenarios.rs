//! End-to-end scenario coverage driving the full build -> link -> render
//! pipeline through the public crate API, the way `cli::run` composes it.
//! Complements the colocated unit tests, which exercise each stage (builder,
//! linker, analyzer) in isolation.

use coflo_rs::build::{build_function, ParsedStatement};
use coflo_rs::graph::Program;
use coflo_rs::ir::{CaseArm, EdgeKind, Location, Statement};
use coflo_rs::link::link_program;
use coflo_rs::render::{render_dot, render_text, TextOptions};

fn loc(line: u32) -> Location {
    Location::new("scenario.c", line)
}

/// S1: a straight-line function renders as a single bracketed block with
/// its one real statement, located.
#[test]
fn straight_line_function() {
    let mut p = Program::new();
    build_function(
        &mut p,
        "f",
        "scenario.c",
        vec![
            ParsedStatement::new(Statement::Label("L".into()), loc(1)),
            ParsedStatement::new(Statement::NoOp, loc(2)),
            ParsedStatement::new(Statement::ReturnUnlinked, loc(3)),
        ],
    )
    .unwrap();
    link_program(&mut p);

    let f = p.function_by_name("f").unwrap().clone();
    for v in p.vertices_of(f.id) {
        assert!(p.location_of(v).is_some() || matches!(p.statement(v), Statement::Entry | Statement::Exit));
    }

    let text = render_text(&p, f.id, TextOptions { verbose: true, show_vertex_ids: false });
    assert!(text.starts_with('['));
    assert!(text.trim_end().ends_with(']'));
    assert!(text.contains("scenario.c:2"));
}

/// S2: if/else branches indent under the condition and rejoin at the merge
/// point, both arms falling through to the same successor.
#[test]
fn if_else_branches_and_rejoins() {
    let mut p = Program::new();
    build_function(
        &mut p,
        "f",
        "scenario.c",
        vec![
            ParsedStatement::new(
                Statement::IfUnlinked { condition: "c".into(), true_target: "T".into(), false_target: "F".into() },
                loc(1),
            ),
            ParsedStatement::new(Statement::Label("T".into()), loc(2)),
            ParsedStatement::new(Statement::NoOp, loc(3)),
            ParsedStatement::new(Statement::GotoUnlinked { target_label: "E".into() }, loc(4)),
            ParsedStatement::new(Statement::Label("F".into()), loc(5)),
            ParsedStatement::new(Statement::NoOp, loc(6)),
            ParsedStatement::new(Statement::Label("E".into()), loc(7)),
            ParsedStatement::new(Statement::ReturnUnlinked, loc(8)),
        ],
    )
    .unwrap();

    let f = p.function_by_name("f").unwrap().clone();
    let if_vertex = p
        .vertices_of(f.id)
        .find(|&v| matches!(p.statement(v), Statement::If { .. }))
        .expect("if statement present");

    let out_kinds: Vec<EdgeKind> = p.out_edges(if_vertex).map(|(e, _)| p.edge(e).kind).collect();
    assert!(out_kinds.contains(&EdgeKind::IfTrue));
    assert!(out_kinds.contains(&EdgeKind::IfFalse));

    let merge = p
        .vertices_of(f.id)
        .find(|&v| matches!(p.statement(v), Statement::Label(name) if name == "E"))
        .unwrap();
    assert!(p.filtered_in_degree(merge) >= 2);

    let text = render_text(&p, f.id, TextOptions { verbose: true, show_vertex_ids: false });
    assert!(text.contains("if (c)"));
}

/// S3: a label targeted by a goto that precedes it becomes a back edge, and
/// the builder gives the goto's vertex a synthetic path to `Exit` so the
/// graph still satisfies "every vertex reaches Exit" even though the only
/// real successor loops forever.
#[test]
fn infinite_loop_gets_a_back_edge_and_stays_traversable() {
    let mut p = Program::new();
    build_function(
        &mut p,
        "f",
        "scenario.c",
        vec![
            ParsedStatement::new(Statement::Label("L".into()), loc(1)),
            ParsedStatement::new(Statement::NoOp, loc(2)),
            ParsedStatement::new(Statement::GotoUnlinked { target_label: "L".into() }, loc(3)),
        ],
    )
    .unwrap();

    let f = p.function_by_name("f").unwrap().clone();
    let goto_vertex = p
        .vertices_of(f.id)
        .find(|&v| matches!(p.statement(v), Statement::Goto))
        .expect("goto statement present");

    let back_edges: Vec<_> = p.out_edges(goto_vertex).filter(|(e, _)| p.edge(*e).is_back_edge).collect();
    assert_eq!(back_edges.len(), 1);

    let impossible_edges: Vec<_> =
        p.out_edges(goto_vertex).filter(|(e, _)| p.edge(*e).kind == EdgeKind::Impossible).collect();
    assert_eq!(impossible_edges.len(), 1);

    // Rendering an infinite loop must still terminate (the Kahn driver
    // relies on exactly this impossible edge to discharge the goto vertex).
    let text = render_text(&p, f.id, TextOptions::default());
    assert!(!text.is_empty());
}

/// A switch with a default arm resolves every arm, default included, to a
/// `Fallthrough` edge at its target.
#[test]
fn switch_resolves_value_and_default_arms() {
    let mut p = Program::new();
    build_function(
        &mut p,
        "f",
        "scenario.c",
        vec![
            ParsedStatement::new(
                Statement::SwitchUnlinked {
                    arms: vec![
                        CaseArm { value: Some("1".into()), target_label: "A".into() },
                        CaseArm { value: None, target_label: "D".into() },
                    ],
                },
                loc(1),
            ),
            ParsedStatement::new(Statement::Label("A".into()), loc(2)),
            ParsedStatement::new(Statement::GotoUnlinked { target_label: "E".into() }, loc(3)),
            ParsedStatement::new(Statement::Label("D".into()), loc(4)),
            ParsedStatement::new(Statement::Label("E".into()), loc(5)),
            ParsedStatement::new(Statement::ReturnUnlinked, loc(6)),
        ],
    )
    .unwrap();

    let f = p.function_by_name("f").unwrap().clone();
    let switch_vertex = p
        .vertices_of(f.id)
        .find(|&v| matches!(p.statement(v), Statement::Switch))
        .expect("switch statement present");
    let kinds: Vec<EdgeKind> = p.out_edges(switch_vertex).map(|(e, _)| p.edge(e).kind).collect();
    assert_eq!(kinds.iter().filter(|&&k| k == EdgeKind::Fallthrough).count(), 2);
}

/// S6: a call to a function that is never defined still leaves the program
/// graph buildable, and the unresolved call vertex renders with the
/// unresolved-call color distinct from a resolved one.
#[test]
fn unresolved_call_is_reported_but_does_not_block_the_rest_of_the_graph() {
    let mut p = Program::new();
    build_function(
        &mut p,
        "main",
        "scenario.c",
        vec![
            ParsedStatement::new(
                Statement::FunctionCallUnresolved { callee_name: "extern_f".into(), args: vec![], location: loc(1) },
                loc(1),
            ),
            ParsedStatement::new(
                Statement::FunctionCallUnresolved { callee_name: "extern_f".into(), args: vec![], location: loc(2) },
                loc(2),
            ),
            ParsedStatement::new(Statement::ReturnUnlinked, loc(3)),
        ],
    )
    .unwrap();

    let unresolved = link_program(&mut p);
    let mut names: Vec<&str> = unresolved.iter().map(|u| u.callee_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["extern_f", "extern_f"]); // one per call site, report-side dedup is the driver's job

    let dot = render_dot(&p);
    assert!(dot.contains("color=red"));

    let main = p.function_by_name("main").unwrap().clone();
    assert_eq!(p.vertices_of(main.id).count(), 5); // entry, call, call, return, exit
}
