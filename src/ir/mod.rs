//! The statement/edge data model: tagged variants for every vertex and edge
//! kind that can appear in a function's control flow graph.
//!
//! Statements and edges carry no identity of their own beyond their variant
//! and payload; the graph store (see [`crate::graph`]) is what gives them a
//! stable position. Keeping them as plain data makes them cheap to inspect
//! from more than one traversal at a time.

use serde::{Deserialize, Serialize};

use crate::graph::FunctionId;

/// Source location a statement was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Location { file: file.into(), line, column: None }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}", self.file, self.line, col),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// One case arm of a not-yet-linked switch, as parsed from the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArm {
    /// `None` marks the default arm.
    pub value: Option<String>,
    pub target_label: String,
}

/// A function-call argument, kept only for diagnostic rendering.
pub type CallArgs = Vec<String>;

/// A vertex in a function's control flow graph.
///
/// `*Unlinked` variants are produced by the front-end parser and hold a
/// textual label reference; the [function builder](crate::build) resolves
/// them into their linked counterpart once the target vertex is known.
/// `FunctionCallUnresolved` survives function-builder time (its target lives
/// in another function, possibly not yet built) and is only resolved by the
/// whole-program [linker](crate::link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    // -- structural --
    /// The unique vertex every control-flow path starts at.
    Entry,
    /// The unique vertex every control-flow path ends at (invariant I5).
    Exit,
    /// A statement with no control-flow effect of its own (e.g. an
    /// assignment); always falls through to its successor.
    NoOp,
    /// Reserved for the (currently unbuilt) merge-node-insertion pass; see
    /// the Open Questions in `DESIGN.md`.
    Merge,
    /// A placeholder vertex inserted when the builder needs a handle before
    /// it knows what statement belongs there.
    Placeholder,
    /// A label definition; falls through like `NoOp`, but can be the target
    /// of a `Goto` or branch edge.
    Label(String),

    // -- control flow, linked --
    /// A two-way branch; the taken/not-taken targets are the `IfTrue` /
    /// `IfFalse` out-edges, not payload on the statement.
    If { condition: String },
    /// A resolved switch head; every resolved arm, default included, is a
    /// `Fallthrough` out-edge to its target (§4.1: "adds a Fallthrough edge
    /// per case target").
    Switch,
    /// An unconditional jump; the target is the `Goto` out-edge.
    Goto,
    /// A function return; has no successors inside the function (but does
    /// get the synthetic `Impossible` edge to `Exit` if it is not already
    /// `Exit` itself).
    Return,

    // -- control flow, unlinked (pre-build) --
    IfUnlinked { condition: String, true_target: String, false_target: String },
    SwitchUnlinked { arms: Vec<CaseArm> },
    GotoUnlinked { target_label: String },
    ReturnUnlinked,

    // -- calls --
    /// A call site whose callee hasn't been resolved to a function yet.
    FunctionCallUnresolved { callee_name: String, args: CallArgs, location: Location },
    /// A call site resolved to a known callee function.
    FunctionCallResolved { callee: FunctionId, callee_name: String, args: CallArgs, location: Location },
}

impl Statement {
    /// True for statements the traversal framework and renderer treat as a
    /// decision point (multiple live out-edges, indentation increases).
    pub fn is_decision(&self) -> bool {
        matches!(self, Statement::If { .. } | Statement::Switch)
    }

    /// True for both call variants, resolved or not.
    pub fn is_function_call(&self) -> bool {
        matches!(
            self,
            Statement::FunctionCallUnresolved { .. } | Statement::FunctionCallResolved { .. }
        )
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Statement::Entry)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Statement::Exit)
    }

    /// Short diagnostic identifier, e.g. for "unreachable statement" warnings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Entry => "entry",
            Statement::Exit => "exit",
            Statement::NoOp => "no-op",
            Statement::Merge => "merge",
            Statement::Placeholder => "placeholder",
            Statement::Label(_) => "label",
            Statement::If { .. } => "if",
            Statement::Switch => "switch",
            Statement::Goto => "goto",
            Statement::Return => "return",
            Statement::IfUnlinked { .. } => "if",
            Statement::SwitchUnlinked { .. } => "switch",
            Statement::GotoUnlinked { .. } => "goto",
            Statement::ReturnUnlinked => "return",
            Statement::FunctionCallUnresolved { .. } => "call",
            Statement::FunctionCallResolved { .. } => "call",
        }
    }

    /// Label text for the text renderer and GraphViz node label.
    pub fn dot_label(&self) -> String {
        match self {
            Statement::Entry => "ENTRY".to_string(),
            Statement::Exit => "EXIT".to_string(),
            Statement::NoOp => "".to_string(),
            Statement::Merge => "MERGE".to_string(),
            Statement::Placeholder => "".to_string(),
            Statement::Label(name) => format!("{name}:"),
            Statement::If { condition } => format!("if ({condition})"),
            Statement::Switch => "switch".to_string(),
            Statement::Goto => "goto".to_string(),
            Statement::Return => "return".to_string(),
            Statement::IfUnlinked { condition, .. } => format!("if ({condition})"),
            Statement::SwitchUnlinked { .. } => "switch".to_string(),
            Statement::GotoUnlinked { target_label } => format!("goto {target_label}"),
            Statement::ReturnUnlinked => "return".to_string(),
            Statement::FunctionCallUnresolved { callee_name, .. } => format!("{callee_name}()"),
            Statement::FunctionCallResolved { callee_name, .. } => format!("{callee_name}()"),
        }
    }

    /// GraphViz node shape hint.
    pub fn dot_shape(&self) -> &'static str {
        match self {
            Statement::Entry | Statement::Exit => "ellipse",
            Statement::If { .. } | Statement::IfUnlinked { .. } | Statement::Switch
            | Statement::SwitchUnlinked { .. } => "diamond",
            Statement::FunctionCallUnresolved { .. } | Statement::FunctionCallResolved { .. } => "box",
            _ => "box",
        }
    }

    /// GraphViz node color hint.
    pub fn dot_color(&self) -> &'static str {
        match self {
            Statement::Entry => "green",
            Statement::Exit => "red",
            Statement::If { .. } | Statement::IfUnlinked { .. } | Statement::Switch
            | Statement::SwitchUnlinked { .. } => "yellow",
            Statement::FunctionCallResolved { .. } => "lightblue",
            Statement::FunctionCallUnresolved { .. } => "red",
            _ => "white",
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Statement::FunctionCallUnresolved { location, .. }
            | Statement::FunctionCallResolved { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// A directed edge classification between two vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Fallthrough,
    IfTrue,
    IfFalse,
    Goto,
    FunctionCall,
    Return,
    FunctionCallBypass,
    Impossible,
    Exceptional,
}

/// An edge in the program graph: its classification plus the mutable
/// back-edge flag set during the builder's back-edge fixup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub is_back_edge: bool,
    /// Set by the back-edge fixup pass (§4.1) for a back edge whose source
    /// has no remaining forward out-edge of its own: the vertex the
    /// renderer should treat as this edge's forward-flow continuation,
    /// found by walking up to the nearest decision-statement ancestor and
    /// taking its other live out-edge. `None` for every non-back edge, and
    /// for back edges the fixup pass didn't redirect.
    pub redirect: Option<crate::graph::VertexId>,
}

impl Edge {
    pub fn new(kind: EdgeKind) -> Self {
        Edge { kind, is_back_edge: false, redirect: None }
    }

    pub fn back(mut self) -> Self {
        self.is_back_edge = true;
        self
    }

    pub fn dot_color(&self) -> &'static str {
        if self.is_back_edge {
            return "blue";
        }
        match self.kind {
            EdgeKind::Fallthrough => "black",
            EdgeKind::IfTrue => "green",
            EdgeKind::IfFalse => "red",
            EdgeKind::Goto => "black",
            EdgeKind::FunctionCall => "gray",
            EdgeKind::Return => "darkgray",
            EdgeKind::FunctionCallBypass => "gray",
            EdgeKind::Impossible => "purple",
            EdgeKind::Exceptional => "purple",
        }
    }

    pub fn dot_label(&self) -> &'static str {
        match self.kind {
            EdgeKind::Fallthrough => "",
            EdgeKind::IfTrue => "T",
            EdgeKind::IfFalse => "F",
            EdgeKind::Goto => "",
            EdgeKind::FunctionCall => "call",
            EdgeKind::Return => "ret",
            EdgeKind::FunctionCallBypass => "bypass",
            EdgeKind::Impossible => "impossible",
            EdgeKind::Exceptional => "unwind",
        }
    }

    pub fn dot_style(&self) -> &'static str {
        if self.is_back_edge {
            "dashed"
        } else if self.kind == EdgeKind::Impossible {
            "dotted"
        } else {
            "solid"
        }
    }
}
