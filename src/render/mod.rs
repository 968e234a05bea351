//! Rendering: the indented text outline and the GraphViz `.dot` description
//! of a function's control flow graph, plus the minimal post-hoc HTML index
//! over a batch of rendered functions, per §4.6/§4.6.1.
//!
//! The text outline walks in Kahn order — grounded on `Function.cpp`'s
//! `cfg_vertex_property_writer`/outline-printing visitor — because that's
//! the order a reader expects a structured-program listing in: every
//! statement after all of its forward predecessors.

use std::collections::BTreeSet;

use crate::graph::{FunctionId, Handle, Program, VertexId};
use crate::ir::{EdgeKind, Statement};
use crate::traverse::kahn::kahn_visit;
use crate::traverse::{CallStack, Decision, Visitor};

/// Verbosity gating for the text outline: `verbose` prints every statement;
/// otherwise only calls and decisions print (matching the original's
/// default "just show me the shape of the control flow" output).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOptions {
    pub verbose: bool,
    pub show_vertex_ids: bool,
}

/// Render one function's CFG (and every function it transitively calls, as
/// the Kahn driver steps into them) as an indented text outline.
pub fn render_text(program: &Program, function: FunctionId, options: TextOptions) -> String {
    let mut visitor = TextVisitor { program, options, indent: 0, lines: Vec::new() };
    kahn_visit(program, function, &mut visitor);
    visitor.lines.join("\n")
}

struct TextVisitor<'a> {
    program: &'a Program,
    options: TextOptions,
    indent: usize,
    lines: Vec<String>,
}

impl TextVisitor<'_> {
    fn push(&mut self, text: impl Into<String>) {
        self.lines.push(format!("{}{}", "    ".repeat(self.indent), text.into()));
    }

    fn close_brace(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.push("}");
    }

    fn describe(&self, v: VertexId, stmt: &Statement) -> String {
        let mut text = stmt.dot_label();
        if text.is_empty() {
            text = stmt.kind_name().to_string();
        }
        if self.options.show_vertex_ids {
            text = format!("{text} [{:?}]", v);
        }
        if let Some(loc) = self.program.location_of(v) {
            text = format!("{text} <{loc}>");
        }
        text
    }

    fn should_print(&self, stmt: &Statement) -> bool {
        self.options.verbose || stmt.is_function_call() || stmt.is_decision()
    }
}

/// The vertex's "filtered predecessor" per §4.3/§4.6: the first predecessor
/// edge that would count toward `filtered_in_degree`, used to tell whether
/// a filtered-in-degree-1 vertex's sole live predecessor is a decision
/// (opening a brace) as opposed to a plain sequential statement.
fn sole_filtered_predecessor(program: &Program, v: VertexId) -> Option<VertexId> {
    let is_entry = matches!(program.statement(v), Statement::Entry);
    let mut counted_call = false;
    for (edge_id, src) in program.in_edges(v) {
        if src == v {
            continue;
        }
        let edge = program.edge(edge_id);
        if edge.is_back_edge {
            continue;
        }
        match edge.kind {
            EdgeKind::Return => continue,
            EdgeKind::FunctionCall if is_entry => {
                if counted_call {
                    continue;
                }
                counted_call = true;
                return Some(src);
            }
            _ => return Some(src),
        }
    }
    None
}

impl Visitor for TextVisitor<'_> {
    fn discover_vertex(&mut self, v: VertexId, program: &Program) -> Decision {
        let stmt = program.statement(v).clone();
        match &stmt {
            Statement::Entry => {
                self.push("[");
                self.indent += 1;
                return Decision::Ok;
            }
            Statement::Exit => {
                self.indent = self.indent.saturating_sub(1);
                self.push("]");
                return Decision::Ok;
            }
            _ => {}
        }

        let filtered_in_degree = program.filtered_in_degree(v);
        if filtered_in_degree > 2 {
            for _ in 0..(filtered_in_degree - 2) {
                self.close_brace();
            }
        } else if filtered_in_degree == 1 {
            if let Some(pred) = sole_filtered_predecessor(program, v) {
                if program.statement(pred).is_decision() {
                    self.push("{");
                    self.indent += 1;
                }
            }
        }

        if self.should_print(&stmt) {
            let line = self.describe(v, &stmt);
            self.push(line);
        }
        Decision::Ok
    }

    fn vertex_visit_complete(
        &mut self,
        _v: VertexId,
        children_pushed: usize,
        last_pushed_edge: Option<Handle>,
        program: &Program,
    ) -> Decision {
        let close = match (children_pushed, last_pushed_edge) {
            (0, _) => true,
            (1, Some(edge_id)) => program
                .graph()
                .edge_endpoints(edge_id)
                .map(|(_, target)| program.filtered_in_degree(target) > 1)
                .unwrap_or(false),
            _ => false,
        };
        if close {
            self.close_brace();
        }
        Decision::Ok
    }

    fn recursion_detected(&mut self, _call_site: VertexId, callee: FunctionId, program: &Program) -> Decision {
        self.push(format!("RECURSION DETECTED: {}()", program.function(callee).name));
        Decision::Ok
    }
}

/// Emit a GraphViz `.dot` description of every function in `program`, one
/// cluster subgraph per function, per §4.6.
pub fn render_dot(program: &Program) -> String {
    let mut out = String::from("digraph coflo {\n");
    for function in program.functions() {
        out.push_str(&format!("  subgraph cluster_{} {{\n    label=\"{}\";\n", function.id.0, function.name));
        for v in program.vertices_of(function.id) {
            let stmt = program.statement(v);
            out.push_str(&format!(
                "    n{} [label=\"{}\" shape={} color={}];\n",
                v.index(),
                escape_dot(&stmt.dot_label()),
                stmt.dot_shape(),
                stmt.dot_color(),
            ));
        }
        out.push_str("  }\n");
    }
    for edge_id in program.graph().edge_indices() {
        let Some((from, to)) = program.graph().edge_endpoints(edge_id) else { continue };
        if from == to && program.edge(edge_id).kind == EdgeKind::Impossible {
            // Entry/Exit construction self-loops are not meaningful edges
            // to a reader of the rendered graph.
            continue;
        }
        let edge = program.edge(edge_id);
        out.push_str(&format!(
            "  n{} -> n{} [label=\"{}\" color={} style={}];\n",
            from.index(),
            to.index(),
            edge.dot_label(),
            edge.dot_color(),
            edge.dot_style(),
        ));
    }
    out.push_str("}\n");
    out
}

fn escape_dot(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Emit `index.html`: a plain unordered list of `<a href="<function>.png">`
/// entries sorted by function name, per §4.6.1. This is deliberately the
/// simplest possible post-hoc writer — no CSS, no JS — since it's an
/// explicitly out-of-scope "external collaborator" the driver just needs
/// something real to call.
pub fn render_html_index(function_names: &[String]) -> String {
    let sorted: BTreeSet<&String> = function_names.iter().collect();
    let mut out = String::from("<!doctype html>\n<html><body>\n<ul>\n");
    for name in sorted {
        out.push_str(&format!("<li><a href=\"{name}.png\">{name}</a></li>\n"));
    }
    out.push_str("</ul>\n</body></html>\n");
    out
}
