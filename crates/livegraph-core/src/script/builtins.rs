//! The graph-building namespace `c` and the methods available on values.
//!
//! Everything a script can do to the outside world goes through here or
//! through `require`; there is no other host access.
//!
//! ```text
//! c.top(type, params?)  c.chop  c.sop  c.mat  c.dat  c.comp   node constructors
//! c.fp  c.ip  c.sp  c.tp  c.mp                               scalar parameters
//! c.xyp  c.xyzp  c.rgbp                                      vector parameters
//! c.topp  c.chopp  c.sopp  c.matp  c.datp  c.compp           node references
//! c.addp  c.subp  c.multp  c.divp                            parameter arithmetic
//! c.chan(index, chop)                                        channel reference
//!
//! node.connect(other)  node.run([inputs])  node.out()
//! list.length  list.map(fn)  string.length
//! ```
//!
//! Plain script values used as parameters are converted automatically:
//! numbers become floats, strings stay strings, booleans become toggles, and
//! nodes become a one-element reference list of their own family.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::graph::{ArithOp, Node, OpFamily, ParamValue, VectorKind};

use super::value::{Method, Value};

/// A host function reachable from scripts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Builtin {
    Require,
    Constructor(OpFamily),
    Float,
    Int,
    Str,
    Toggle,
    Menu,
    Vector(VectorKind),
    Refs(OpFamily),
    Arith(ArithOp),
    Channel,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Require => "require",
            Builtin::Constructor(family) => family.name(),
            Builtin::Float => "fp",
            Builtin::Int => "ip",
            Builtin::Str => "sp",
            Builtin::Toggle => "tp",
            Builtin::Menu => "mp",
            Builtin::Vector(VectorKind::Xy) => "xyp",
            Builtin::Vector(VectorKind::Xyz) => "xyzp",
            Builtin::Vector(VectorKind::Rgb) => "rgbp",
            Builtin::Refs(OpFamily::Top) => "topp",
            Builtin::Refs(OpFamily::Chop) => "chopp",
            Builtin::Refs(OpFamily::Sop) => "sopp",
            Builtin::Refs(OpFamily::Mat) => "matp",
            Builtin::Refs(OpFamily::Dat) => "datp",
            Builtin::Refs(OpFamily::Comp) => "compp",
            Builtin::Arith(ArithOp::Add) => "addp",
            Builtin::Arith(ArithOp::Sub) => "subp",
            Builtin::Arith(ArithOp::Mul) => "multp",
            Builtin::Arith(ArithOp::Div) => "divp",
            Builtin::Channel => "chan",
        }
    }
}

/// Resolves `c.<name>`.  Unknown names yield `None`.
pub fn namespace_member(name: &str) -> Option<Builtin> {
    if let Some(family) = OpFamily::from_name(name) {
        return Some(Builtin::Constructor(family));
    }
    let builtin = match name {
        "fp" => Builtin::Float,
        "ip" => Builtin::Int,
        "sp" => Builtin::Str,
        "tp" => Builtin::Toggle,
        "mp" => Builtin::Menu,
        "xyp" => Builtin::Vector(VectorKind::Xy),
        "xyzp" => Builtin::Vector(VectorKind::Xyz),
        "rgbp" => Builtin::Vector(VectorKind::Rgb),
        "addp" => Builtin::Arith(ArithOp::Add),
        "subp" => Builtin::Arith(ArithOp::Sub),
        "multp" => Builtin::Arith(ArithOp::Mul),
        "divp" => Builtin::Arith(ArithOp::Div),
        "chan" => Builtin::Channel,
        other => {
            let family = other.strip_suffix('p').and_then(OpFamily::from_name)?;
            Builtin::Refs(family)
        }
    };
    Some(builtin)
}

/// Reads property `name` of `value`.
///
/// Missing properties of objects and the namespace read as `null`; reading
/// any property of `null` is a `TypeError`.
pub fn member(value: &Value, name: &str) -> Result<Value, String> {
    let found = match value {
        Value::Null => {
            return Err(format!(
                "TypeError: Cannot read properties of null (reading '{name}')"
            ))
        }
        Value::Namespace => namespace_member(name).map(Value::Builtin),
        Value::Map(entries) => entries.get(name).cloned(),
        Value::Node(node) => match name {
            "connect" => Some(Value::Method(Box::new(value.clone()), Method::Connect)),
            "run" => Some(Value::Method(Box::new(value.clone()), Method::Run)),
            "out" => Some(Value::Method(Box::new(value.clone()), Method::Out)),
            "type" => Some(Value::Str(node.qualified_type())),
            "family" => Some(Value::Str(node.family.suffix().to_string())),
            "inputs" => Some(Value::List(
                node.inputs.iter().cloned().map(Value::Node).collect(),
            )),
            _ => None,
        },
        Value::List(items) => match name {
            "length" => Some(Value::Number(items.len() as f64)),
            "map" => Some(Value::Method(Box::new(value.clone()), Method::Map)),
            _ => None,
        },
        Value::Str(s) => match name {
            "length" => Some(Value::Number(s.chars().count() as f64)),
            _ => None,
        },
        _ => None,
    };
    Ok(found.unwrap_or(Value::Null))
}

/// Reads `value[index]` for lists, strings, and objects.
pub fn index(value: &Value, index: &Value) -> Result<Value, String> {
    match (value, index) {
        (Value::List(items), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        (Value::Str(s), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|ch| Value::Str(ch.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Null, _) => Err(format!(
            "TypeError: Cannot read properties of null (reading '{}')",
            index.to_display()
        )),
        (_, Value::Str(name)) => member(value, name),
        (_, Value::Number(n)) => member(value, &super::parser::format_number(*n)),
        _ => Ok(Value::Null),
    }
}

fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// Calls a namespace function.  `require` is handled by the interpreter.
pub fn call(builtin: Builtin, args: &[Value]) -> Result<Value, String> {
    let name = builtin.name();
    match builtin {
        Builtin::Require => Err("TypeError: require must be called directly".to_string()),
        Builtin::Constructor(family) => construct(family, args),
        Builtin::Float => Ok(Value::Param(ParamValue::Float(number_arg(name, args, 0)?))),
        Builtin::Int => Ok(Value::Param(ParamValue::Int(integer_arg(name, args, 0)?))),
        Builtin::Str => match args.first() {
            Some(Value::Str(s)) => Ok(Value::Param(ParamValue::Str(s.clone()))),
            other => Err(expected(name, "a string", other)),
        },
        Builtin::Toggle => Ok(Value::Param(ParamValue::Toggle(
            args.first().is_some_and(Value::is_truthy),
        ))),
        Builtin::Menu => Ok(Value::Param(ParamValue::Menu(integer_arg(name, args, 0)?))),
        Builtin::Vector(kind) => {
            let parts = args
                .iter()
                .map(|arg| to_param(arg).map_err(|e| format!("{name}: {e}")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Param(ParamValue::Vector(kind, parts)))
        }
        Builtin::Refs(family) => {
            let mut nodes = Vec::new();
            for arg in args {
                collect_nodes(arg, &mut nodes)
                    .map_err(|kind| format!("TypeError: {name} expects nodes, got {kind}"))?;
            }
            Ok(Value::Param(ParamValue::NodeRefs(family, nodes)))
        }
        Builtin::Arith(op) => {
            if args.len() != 2 {
                return Err(format!(
                    "TypeError: {name} expects 2 arguments, got {}",
                    args.len()
                ));
            }
            let lhs = to_param(&args[0]).map_err(|e| format!("{name}: {e}"))?;
            let rhs = to_param(&args[1]).map_err(|e| format!("{name}: {e}"))?;
            Ok(Value::Param(ParamValue::Arith(op, Box::new(lhs), Box::new(rhs))))
        }
        Builtin::Channel => {
            let index = match args.first() {
                Some(Value::Number(n)) if n.fract() == 0.0 => ParamValue::Int(*n as i64),
                Some(Value::Param(p)) => p.clone(),
                Some(Value::Str(s)) => ParamValue::Str(s.clone()),
                other => return Err(expected(name, "a channel index", other)),
            };
            match args.get(1) {
                Some(Value::Node(source)) => Ok(Value::Param(ParamValue::Channel {
                    index: Box::new(index),
                    source: Arc::clone(source),
                })),
                other => Err(expected(name, "a CHOP node as its second argument", other)),
            }
        }
    }
}

/// Calls a node method other than `map`.
pub fn call_node_method(node: &Arc<Node>, method: Method, args: &[Value]) -> Result<Value, String> {
    match method {
        Method::Connect => match args.first() {
            Some(Value::Node(target)) => Ok(Value::Node(Arc::new(
                target.with_input(Arc::clone(node)),
            ))),
            other => Err(expected("connect", "a node", other)),
        },
        Method::Run => {
            let mut inputs = Vec::new();
            for arg in args {
                collect_nodes(arg, &mut inputs)
                    .map_err(|kind| format!("TypeError: run expects nodes, got {kind}"))?;
            }
            let mut updated = Node::clone(node);
            updated.inputs.extend(inputs);
            Ok(Value::Node(Arc::new(updated)))
        }
        Method::Out => Ok(Value::Node(Arc::clone(node))),
        Method::Map => Err("TypeError: node.map is not a function".to_string()),
    }
}

fn construct(family: OpFamily, args: &[Value]) -> Result<Value, String> {
    let op_type = match args.first() {
        Some(Value::Str(s)) => s.clone(),
        other => return Err(expected(family.name(), "an operator type string", other)),
    };
    let mut params = BTreeMap::new();
    match args.get(1) {
        None | Some(Value::Null) => {}
        Some(Value::Map(entries)) => {
            for (key, value) in entries {
                let param = to_param(value).map_err(|e| format!("parameter '{key}': {e}"))?;
                params.insert(key.clone(), param);
            }
        }
        other => return Err(expected(family.name(), "a parameter object", other)),
    }
    Ok(Value::Node(Arc::new(
        Node::new(family, op_type).with_params(params),
    )))
}

/// Converts a script value into a parameter value.
pub fn to_param(value: &Value) -> Result<ParamValue, String> {
    match value {
        Value::Param(p) => Ok(p.clone()),
        Value::Number(n) => Ok(ParamValue::Float(*n)),
        Value::Str(s) => Ok(ParamValue::Str(s.clone())),
        Value::Bool(b) => Ok(ParamValue::Toggle(*b)),
        Value::Node(node) => Ok(ParamValue::NodeRefs(node.family, vec![Arc::clone(node)])),
        other => Err(format!(
            "TypeError: a {} cannot be used as a parameter",
            other.kind()
        )),
    }
}

/// Flattens nodes and (nested) lists of nodes into `out`.  On failure returns
/// the kind of the first offending value.
pub fn collect_nodes(value: &Value, out: &mut Vec<Arc<Node>>) -> Result<(), &'static str> {
    match value {
        Value::Node(node) => {
            out.push(Arc::clone(node));
            Ok(())
        }
        Value::List(items) => items.iter().try_for_each(|item| collect_nodes(item, out)),
        other => Err(other.kind()),
    }
}

fn number_arg(name: &str, args: &[Value], idx: usize) -> Result<f64, String> {
    match args.get(idx) {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(expected(name, "a number", other)),
    }
}

fn integer_arg(name: &str, args: &[Value], idx: usize) -> Result<i64, String> {
    let n = number_arg(name, args, idx)?;
    if n.is_finite() {
        Ok(n.trunc() as i64)
    } else {
        Err(format!("RangeError: {name} expects a finite number"))
    }
}

fn expected(name: &str, what: &str, got: Option<&Value>) -> String {
    let got = got.map_or("nothing", Value::kind);
    format!("TypeError: {name} expects {what}, got {got}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
