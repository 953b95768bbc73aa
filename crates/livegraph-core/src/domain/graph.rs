//! The declarative node-graph model and its validator.
//!
//! A script builds a graph out of immutable [`Node`]s.  Each node has an
//! operator family (TOP, CHOP, SOP, ...), an operator type such as `noise`,
//! a set of named parameters, and an ordered list of input nodes.  Nodes are
//! shared through `Arc`, so one node can feed many others; sharing is
//! preserved when the graph is serialized (the node is emitted once).
//!
//! # Serialized form
//!
//! [`Graph::validate`] returns compact JSON keyed by node path:
//!
//! ```json
//! {"/level_top_0":{"family":"TOP","type":"levelTOP","params":{"opacity":"float(0.5)"},"inputs":["/noise_top_1"]},
//!  "/noise_top_1":{"family":"TOP","type":"noiseTOP","params":{},"inputs":[]}}
//! ```
//!
//! Parameter values are rendered as engine expressions (`float(2.0)`,
//! `int(3)`, `"text"`, `True`, `op('/path')`, ...).  Vector parameters are
//! expanded into one entry per component (`t` → `tx`, `ty`, `tz`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Operator families understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Top,
    Chop,
    Sop,
    Mat,
    Dat,
    Comp,
}

impl OpFamily {
    pub const ALL: [OpFamily; 6] = [
        OpFamily::Top,
        OpFamily::Chop,
        OpFamily::Sop,
        OpFamily::Mat,
        OpFamily::Dat,
        OpFamily::Comp,
    ];

    /// Uppercase suffix used by the engine (`TOP`, `CHOP`, ...).
    pub fn suffix(self) -> &'static str {
        match self {
            OpFamily::Top => "TOP",
            OpFamily::Chop => "CHOP",
            OpFamily::Sop => "SOP",
            OpFamily::Mat => "MAT",
            OpFamily::Dat => "DAT",
            OpFamily::Comp => "COMP",
        }
    }

    /// Lowercase name, as used by the script constructors (`c.top`, ...).
    pub fn name(self) -> &'static str {
        match self {
            OpFamily::Top => "top",
            OpFamily::Chop => "chop",
            OpFamily::Sop => "sop",
            OpFamily::Mat => "mat",
            OpFamily::Dat => "dat",
            OpFamily::Comp => "comp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Whether a node of this family may take `input` as an input.
    pub fn accepts_input(self, input: OpFamily) -> bool {
        self == OpFamily::Comp || self == input
    }
}

impl fmt::Display for OpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Component layout of a vector parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Xy,
    Xyz,
    Rgb,
}

impl VectorKind {
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            VectorKind::Xy => &["x", "y"],
            VectorKind::Xyz => &["x", "y", "z"],
            VectorKind::Rgb => &["r", "g", "b"],
        }
    }
}

/// Binary arithmetic between two parameter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// A typed parameter value attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Str(String),
    Toggle(bool),
    Menu(i64),
    Vector(VectorKind, Vec<ParamValue>),
    /// References to other nodes that must all belong to the given family.
    NodeRefs(OpFamily, Vec<Arc<Node>>),
    Arith(ArithOp, Box<ParamValue>, Box<ParamValue>),
    /// One channel of a CHOP node.
    Channel {
        index: Box<ParamValue>,
        source: Arc<Node>,
    },
}

impl ParamValue {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int",
            ParamValue::Str(_) => "string",
            ParamValue::Toggle(_) => "toggle",
            ParamValue::Menu(_) => "menu",
            ParamValue::Vector(..) => "vector",
            ParamValue::NodeRefs(..) => "node reference",
            ParamValue::Arith(..) => "expression",
            ParamValue::Channel { .. } => "channel",
        }
    }
}

/// One operator in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub family: OpFamily,
    pub op_type: String,
    pub params: BTreeMap<String, ParamValue>,
    pub inputs: Vec<Arc<Node>>,
}

impl Node {
    pub fn new(family: OpFamily, op_type: impl Into<String>) -> Self {
        Self {
            family,
            op_type: op_type.into(),
            params: BTreeMap::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, ParamValue>) -> Self {
        self.params = params;
        self
    }

    /// Returns a copy of `self` with `input` appended to its inputs.
    pub fn with_input(&self, input: Arc<Node>) -> Self {
        let mut node = self.clone();
        node.inputs.push(input);
        node
    }

    /// The engine's full operator name, e.g. `noiseTOP`.
    pub fn qualified_type(&self) -> String {
        format!("{}{}", self.op_type, self.family.suffix())
    }
}

/// Structural validation failures, collected rather than short-circuited.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("graph validation failed: {}", details.join("; "))]
pub struct ValidationError {
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn single(detail: impl Into<String>) -> Self {
        Self {
            details: vec![detail.into()],
        }
    }
}

/// The set of output nodes returned by a script.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    roots: Vec<Arc<Node>>,
}

#[derive(Serialize)]
struct SerializedNode {
    family: &'static str,
    #[serde(rename = "type")]
    op_type: String,
    params: BTreeMap<String, String>,
    inputs: Vec<String>,
}

impl Graph {
    pub fn new(roots: Vec<Arc<Node>>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[Arc<Node>] {
        &self.roots
    }

    /// Checks the graph's structure and serializes it to the engine's JSON.
    ///
    /// # Errors
    ///
    /// Returns every structural problem found, or a single detail if the
    /// graph is empty or JSON serialization fails.
    pub fn validate(&self) -> Result<String, ValidationError> {
        if self.roots.is_empty() {
            return Err(ValidationError::single("graph has no output nodes"));
        }

        let mut paths = PathTable::default();
        for root in &self.roots {
            paths.assign(root);
        }

        let mut details = Vec::new();
        for (node, path) in paths.iter() {
            check_node(node, path, &mut details);
        }
        if !details.is_empty() {
            return Err(ValidationError { details });
        }

        let serialized: BTreeMap<String, SerializedNode> = paths
            .iter()
            .map(|(node, path)| (path.to_string(), serialize_node(node, &paths)))
            .collect();

        serde_json::to_string(&serialized)
            .map_err(|e| ValidationError::single(format!("serialization failed: {e}")))
    }
}

/// Assigns each distinct node (by allocation) a stable path, depth-first.
#[derive(Default)]
struct PathTable {
    order: Vec<(Arc<Node>, String)>,
    by_ptr: HashMap<*const Node, usize>,
}

impl PathTable {
    fn assign(&mut self, node: &Arc<Node>) -> String {
        let key = Arc::as_ptr(node);
        if let Some(&idx) = self.by_ptr.get(&key) {
            return self.order[idx].1.clone();
        }

        let path = format!(
            "/{}_{}_{}",
            node.op_type,
            node.family.name(),
            self.order.len()
        );
        self.by_ptr.insert(key, self.order.len());
        self.order.push((Arc::clone(node), path.clone()));

        for input in &node.inputs {
            self.assign(input);
        }
        for param in node.params.values() {
            self.assign_referenced(param);
        }
        path
    }

    fn assign_referenced(&mut self, param: &ParamValue) {
        match param {
            ParamValue::NodeRefs(_, nodes) => {
                for node in nodes {
                    self.assign(node);
                }
            }
            ParamValue::Channel { index, source } => {
                self.assign_referenced(index);
                self.assign(source);
            }
            ParamValue::Arith(_, lhs, rhs) => {
                self.assign_referenced(lhs);
                self.assign_referenced(rhs);
            }
            ParamValue::Vector(_, parts) => {
                for part in parts {
                    self.assign_referenced(part);
                }
            }
            _ => {}
        }
    }

    fn path_of(&self, node: &Arc<Node>) -> &str {
        self.by_ptr
            .get(&Arc::as_ptr(node))
            .map(|&idx| self.order[idx].1.as_str())
            .unwrap_or("/unknown")
    }

    fn iter(&self) -> impl Iterator<Item = (&Arc<Node>, &str)> {
        self.order.iter().map(|(node, path)| (node, path.as_str()))
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_node(node: &Node, path: &str, details: &mut Vec<String>) {
    if !is_identifier(&node.op_type) {
        details.push(format!("{path}: invalid operator type '{}'", node.op_type));
    }
    for input in &node.inputs {
        if !node.family.accepts_input(input.family) {
            details.push(format!(
                "{path}: {} node cannot take a {} input ({})",
                node.family,
                input.family,
                input.qualified_type()
            ));
        }
    }
    for (name, value) in &node.params {
        if !is_identifier(name) {
            details.push(format!("{path}: invalid parameter name '{name}'"));
        }
        check_param(path, name, value, details);
    }
}

fn check_param(path: &str, name: &str, value: &ParamValue, details: &mut Vec<String>) {
    match value {
        ParamValue::NodeRefs(family, nodes) => {
            for node in nodes {
                if node.family != *family {
                    details.push(format!(
                        "{path}: parameter '{name}' expects {family} references, got {}",
                        node.qualified_type()
                    ));
                }
            }
        }
        ParamValue::Channel { index, source } => {
            if source.family != OpFamily::Chop {
                details.push(format!(
                    "{path}: parameter '{name}' reads a channel from {}, which is not a CHOP",
                    source.qualified_type()
                ));
            }
            check_param(path, name, index, details);
        }
        ParamValue::Arith(_, lhs, rhs) => {
            check_param(path, name, lhs, details);
            check_param(path, name, rhs, details);
        }
        ParamValue::Vector(kind, parts) => {
            if parts.len() != kind.suffixes().len() {
                details.push(format!(
                    "{path}: parameter '{name}' needs {} components, got {}",
                    kind.suffixes().len(),
                    parts.len()
                ));
            }
            for part in parts {
                check_param(path, name, part, details);
            }
        }
        ParamValue::Float(v) if !v.is_finite() => {
            details.push(format!("{path}: parameter '{name}' is not a finite number"));
        }
        _ => {}
    }
}

fn serialize_node(node: &Node, paths: &PathTable) -> SerializedNode {
    let mut params = BTreeMap::new();
    for (name, value) in &node.params {
        match value {
            ParamValue::Vector(kind, parts) => {
                for (suffix, part) in kind.suffixes().iter().zip(parts) {
                    params.insert(format!("{name}{suffix}"), render_param(part, paths));
                }
            }
            other => {
                params.insert(name.clone(), render_param(other, paths));
            }
        }
    }

    SerializedNode {
        family: node.family.suffix(),
        op_type: node.qualified_type(),
        params,
        inputs: node
            .inputs
            .iter()
            .map(|input| paths.path_of(input).to_string())
            .collect(),
    }
}

fn render_param(value: &ParamValue, paths: &PathTable) -> String {
    match value {
        ParamValue::Float(v) => format!("float({v:?})"),
        ParamValue::Int(v) => format!("int({v})"),
        ParamValue::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}")),
        ParamValue::Toggle(true) => "True".to_string(),
        ParamValue::Toggle(false) => "False".to_string(),
        ParamValue::Menu(v) => v.to_string(),
        ParamValue::Vector(_, parts) => {
            let rendered: Vec<_> = parts.iter().map(|p| render_param(p, paths)).collect();
            format!("({})", rendered.join(", "))
        }
        ParamValue::NodeRefs(_, nodes) => {
            let refs: Vec<_> = nodes
                .iter()
                .map(|n| format!("op('{}')", paths.path_of(n)))
                .collect();
            match refs.len() {
                1 => refs.into_iter().next().unwrap_or_default(),
                _ => format!("[{}]", refs.join(", ")),
            }
        }
        ParamValue::Arith(op, lhs, rhs) => format!(
            "({} {} {})",
            render_param(lhs, paths),
            op.symbol(),
            render_param(rhs, paths)
        ),
        ParamValue::Channel { index, source } => format!(
            "op('{}')[{}]",
            paths.path_of(source),
            render_param(index, paths)
        ),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
