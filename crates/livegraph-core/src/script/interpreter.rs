//! Tree-walking evaluator.
//!
//! Each call to [`run_program`] starts from a root scope holding exactly two
//! names, `c` and `require`.  There are no other globals: a script cannot
//! reach the file system, the network, or the process except through
//! `require`, which only loads other scripts.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::ast::{BinaryOp, Expr, ExprKind, FnBody, FunctionDef, Stmt, UnaryOp};
use super::builtins::{self, Builtin};
use super::error::{ScriptError, Span};
use super::modules::ModuleLoader;
use super::parser::parse_program;
use super::value::{Closure, Env, Method, Value};

/// Maximum number of nested function calls and `require`s.
pub const MAX_CALL_DEPTH: usize = 256;

/// Maximum number of nested expression evaluations, across all calls.
///
/// The evaluator recurses once per nested expression, so this bounds the
/// native stack a script can use no matter how calls and nesting combine.
pub const MAX_EVAL_DEPTH: usize = 1024;

/// Native stack size for a thread that evaluates scripts.  Fits
/// [`MAX_EVAL_DEPTH`] nested evaluations in an unoptimized build.
pub const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

const STACK_EXCEEDED: &str = "RangeError: Maximum call stack size exceeded";

/// Where evaluation currently is, for stack frames.
struct Frame {
    function: Arc<str>,
    file: Arc<str>,
}

struct Interpreter<'a> {
    loader: &'a ModuleLoader,
    depth: usize,
    eval_depth: usize,
}

/// Parses and runs `source`, returning the value of its first `return`
/// (or `null`).
///
/// # Errors
///
/// Any syntax error, runtime error, or `throw` becomes a [`ScriptError`].
pub fn run_program(source: &str, file: &str, loader: &ModuleLoader) -> Result<Value, ScriptError> {
    let program = parse_program(source, file)?;
    debug!(file, statements = program.body.len(), "running program");

    let mut interpreter = Interpreter {
        loader,
        depth: 0,
        eval_depth: 0,
    };
    let frame = Frame {
        function: Arc::from("<program>"),
        file: Arc::from(file),
    };
    interpreter.run_body(&program.body, root_env(), &frame)
}

fn root_env() -> Env {
    Env::new()
        .bind("c", Value::Namespace)
        .bind("require", Value::Builtin(Builtin::Require))
}

impl<'a> Interpreter<'a> {
    fn error(&self, message: impl Into<String>, frame: &Frame, span: Span) -> ScriptError {
        ScriptError::at(message, &frame.function, &frame.file, span)
    }

    fn run_body(&mut self, stmts: &[Stmt], env: Env, frame: &Frame) -> Result<Value, ScriptError> {
        let mut env = env;
        for stmt in stmts {
            match stmt {
                Stmt::Let { name, value, .. } => {
                    let value = name_function(self.eval(value, &env, frame)?, name);
                    env = env.bind(name.clone(), value);
                }
                Stmt::Return { value, .. } => {
                    return match value {
                        Some(expr) => self.eval(expr, &env, frame),
                        None => Ok(Value::Null),
                    };
                }
                Stmt::Throw { value, span } => {
                    let thrown = self.eval(value, &env, frame)?;
                    return Err(self.error(thrown_message(&thrown), frame, *span));
                }
                Stmt::Expr(expr) => {
                    self.eval(expr, &env, frame)?;
                }
            }
        }
        Ok(Value::Null)
    }

    fn eval(&mut self, expr: &Expr, env: &Env, frame: &Frame) -> Result<Value, ScriptError> {
        if self.eval_depth >= MAX_EVAL_DEPTH {
            return Err(self.error(STACK_EXCEEDED, frame, expr.span));
        }
        self.eval_depth += 1;
        let result = self.eval_expr(expr, env, frame);
        self.eval_depth -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Env, frame: &Frame) -> Result<Value, ScriptError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Ident(name) => env.lookup(name).cloned().ok_or_else(|| {
                self.error(format!("ReferenceError: {name} is not defined"), frame, expr.span)
            }),
            ExprKind::List(items) => self.eval_list(items, env, frame).map(Value::List),
            ExprKind::Object(entries) => self.eval_object(entries, env, frame),
            ExprKind::Member { object, name } => {
                let target = self.eval(object, env, frame)?;
                builtins::member(&target, name).map_err(|m| self.error(m, frame, expr.span))
            }
            ExprKind::Index { object, index } => {
                let target = self.eval(object, env, frame)?;
                let key = self.eval(index, env, frame)?;
                builtins::index(&target, &key).map_err(|m| self.error(m, frame, expr.span))
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, env, frame, expr.span),
            ExprKind::Arrow(def) => Ok(make_closure(def, env, frame)),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, env, frame, expr.span),
            ExprKind::Binary { op, lhs, rhs } => {
                self.eval_binary(*op, lhs, rhs, env, frame, expr.span)
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env, frame)?.is_truthy() {
                    self.eval(then, env, frame)
                } else {
                    self.eval(otherwise, env, frame)
                }
            }
        }
    }

    fn eval_list(&mut self, items: &[Expr], env: &Env, frame: &Frame) -> Result<Vec<Value>, ScriptError> {
        items.iter().map(|item| self.eval(item, env, frame)).collect()
    }

    fn eval_object(
        &mut self,
        entries: &[(String, Expr)],
        env: &Env,
        frame: &Frame,
    ) -> Result<Value, ScriptError> {
        let mut map = std::collections::BTreeMap::new();
        for (key, value) in entries {
            map.insert(key.clone(), self.eval(value, env, frame)?);
        }
        Ok(Value::Map(map))
    }

    fn eval_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        env: &Env,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let value = self.eval(operand, env, frame)?;
        match (op, value) {
            (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
            (UnaryOp::Neg, other) => Err(self.error(
                format!("TypeError: cannot negate a {}", other.kind()),
                frame,
                span,
            )),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        env: &Env,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let a = self.eval(lhs, env, frame)?;
        let b = self.eval(rhs, env, frame)?;
        let result = match (op, &a, &b) {
            (BinaryOp::Eq, _, _) => Value::Bool(a.loosely_equals(&b)),
            (BinaryOp::NotEq, _, _) => Value::Bool(!a.loosely_equals(&b)),
            (BinaryOp::Add, Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            (BinaryOp::Add, Value::Str(_), _) | (BinaryOp::Add, _, Value::Str(_)) => {
                Value::Str(format!("{}{}", a.to_display(), b.to_display()))
            }
            (BinaryOp::Sub, Value::Number(x), Value::Number(y)) => Value::Number(x - y),
            (BinaryOp::Mul, Value::Number(x), Value::Number(y)) => Value::Number(x * y),
            (BinaryOp::Div, Value::Number(x), Value::Number(y)) => Value::Number(x / y),
            _ => {
                let hint = if matches!(a, Value::Param(_)) || matches!(b, Value::Param(_)) {
                    " (use c.addp, c.subp, c.multp or c.divp for parameters)"
                } else {
                    ""
                };
                return Err(self.error(
                    format!(
                        "TypeError: unsupported operand types for {}: {} and {}{hint}",
                        binary_symbol(op),
                        a.kind(),
                        b.kind()
                    ),
                    frame,
                    span,
                ));
            }
        };
        Ok(result)
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        env: &Env,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let function = self.eval(callee, env, frame)?;
        let args = self.eval_list(args, env, frame)?;
        self.call(function, args, &callee.label(), frame, span)
    }

    fn call(
        &mut self,
        function: Value,
        args: Vec<Value>,
        label: &str,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        match function {
            Value::Function(closure) => self.call_closure(&closure, args, frame, span),
            Value::Builtin(Builtin::Require) => self.require(&args, frame, span),
            Value::Builtin(builtin) => {
                builtins::call(builtin, &args).map_err(|m| self.error(m, frame, span))
            }
            Value::Method(receiver, Method::Map) => self.map_list(*receiver, args, frame, span),
            Value::Method(receiver, method) => match *receiver {
                Value::Node(node) => builtins::call_node_method(&node, method, &args)
                    .map_err(|m| self.error(m, frame, span)),
                other => Err(self.error(
                    format!("TypeError: {} is not a method of {}", method.name(), other.kind()),
                    frame,
                    span,
                )),
            },
            _ => Err(self.error(format!("TypeError: {label} is not a function"), frame, span)),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Arc<Closure>,
        args: Vec<Value>,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.error(STACK_EXCEEDED, frame, span));
        }

        let mut env = closure.env.clone();
        if let Some(name) = &closure.name {
            env = env.bind(name.clone(), Value::Function(Arc::clone(closure)));
        }
        let mut args = args.into_iter();
        for param in &closure.def.params {
            env = env.bind(param.clone(), args.next().unwrap_or(Value::Null));
        }

        let inner = Frame {
            function: Arc::from(closure.display_name()),
            file: Arc::clone(&closure.file),
        };
        self.depth += 1;
        let result = match &closure.def.body {
            FnBody::Expr(body) => self.eval(body, &env, &inner),
            FnBody::Block(stmts) => self.run_body(stmts, env, &inner),
        };
        self.depth -= 1;

        result.map_err(|mut err| {
            err.push_frame(&frame.function, &frame.file, span);
            err
        })
    }

    fn map_list(
        &mut self,
        receiver: Value,
        args: Vec<Value>,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let items = match receiver {
            Value::List(items) => items,
            other => {
                return Err(self.error(
                    format!("TypeError: map is not a method of {}", other.kind()),
                    frame,
                    span,
                ))
            }
        };
        let Some(callback) = args.into_iter().next() else {
            return Err(self.error("TypeError: map expects a function", frame, span));
        };
        let mut mapped = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let value = self.call(
                callback.clone(),
                vec![item, Value::Number(i as f64)],
                "map callback",
                frame,
                span,
            )?;
            mapped.push(value);
        }
        Ok(Value::List(mapped))
    }

    fn require(&mut self, args: &[Value], frame: &Frame, span: Span) -> Result<Value, ScriptError> {
        let request = match args.first() {
            Some(Value::Str(s)) => s.as_str(),
            other => {
                return Err(self.error(
                    format!(
                        "TypeError: require expects a path string, got {}",
                        other.map_or("nothing", Value::kind)
                    ),
                    frame,
                    span,
                ))
            }
        };

        let path = self.loader.resolve(request);
        if let Some(cached) = self.loader.cache().get(&path) {
            debug!(path = %path.display(), "module cache hit");
            return Ok(cached);
        }

        self.loader
            .begin(&path)
            .map_err(|chain| self.error(format!("Error: cyclic require: {chain}"), frame, span))?;
        let result = self.load_module(&path, request, frame, span);
        self.loader.finish(&path);

        let value = result?;
        self.loader.cache().insert(path, value.clone());
        Ok(value)
    }

    fn load_module(
        &mut self,
        path: &Path,
        request: &str,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, ScriptError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.error(STACK_EXCEEDED, frame, span));
        }
        let source = std::fs::read_to_string(path).map_err(|e| {
            self.error(
                format!("Error: Cannot find module '{request}' ({}): {e}", path.display()),
                frame,
                span,
            )
        })?;

        let file: Arc<str> = Arc::from(path.display().to_string());
        let module_frame = Frame {
            function: Arc::from("<module>"),
            file: Arc::clone(&file),
        };

        self.depth += 1;
        let result = parse_program(&source, &file)
            .and_then(|program| self.run_body(&program.body, root_env(), &module_frame));
        self.depth -= 1;

        result.map_err(|mut err| {
            err.push_frame(&frame.function, &frame.file, span);
            err
        })
    }
}

fn make_closure(def: &Arc<FunctionDef>, env: &Env, frame: &Frame) -> Value {
    Value::Function(Arc::new(Closure {
        def: Arc::clone(def),
        env: env.clone(),
        name: None,
        file: Arc::clone(&frame.file),
    }))
}

/// Gives an anonymous function the name of the `let` that binds it.
fn name_function(value: Value, name: &str) -> Value {
    match value {
        Value::Function(closure) if closure.name.is_none() => Value::Function(Arc::new(Closure {
            def: Arc::clone(&closure.def),
            env: closure.env.clone(),
            name: Some(name.to_string()),
            file: Arc::clone(&closure.file),
        })),
        other => other,
    }
}

fn thrown_message(value: &Value) -> String {
    match value {
        Value::Map(entries) => entries
            .get("message")
            .map(Value::to_display)
            .unwrap_or_else(|| value.to_display()),
        other => other.to_display(),
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::modules::ModuleCache;

    fn run(source: &str) -> Result<Value, ScriptError> {
        let loader = ModuleLoader::new("/nonexistent", Arc::new(ModuleCache::new()));
        run_program(source, "<document>", &loader)
    }

    fn number(value: Value) -> f64 {
        match value {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_program_without_return_yields_null() {
        assert!(matches!(run("let a = 1").unwrap(), Value::Null));
    }

    #[test]
    fn test_first_return_wins() {
        assert_eq!(number(run("return 1\nreturn 2").unwrap()), 1.0);
    }

    #[test]
    fn test_arithmetic_and_conditionals() {
        assert_eq!(number(run("return 1 + 2 * 3 - 4 / 2").unwrap()), 5.0);
        assert_eq!(number(run("return 1 == 1 ? 10 : 20").unwrap()), 10.0);
        assert_eq!(number(run("return !0 ? -3 : 3").unwrap()), -3.0);
    }

    #[test]
    fn test_string_concatenation() {
        let value = run("return 'n' + 1 + true").unwrap();
        assert!(matches!(value, Value::Str(ref s) if s == "n1true"));
    }

    #[test]
    fn test_closures_capture_their_scope() {
        // Arrange
        let source = "let base = 10\nlet add = (x) => x + base\nlet base = 99\nreturn add(1)";

        // Act / Assert: the closure sees the binding that existed when it was made.
        assert_eq!(number(run(source).unwrap()), 11.0);
    }

    #[test]
    fn test_named_functions_can_recurse() {
        let source = "let fact = (n) => n == 0 ? 1 : n * fact(n - 1)\nreturn fact(5)";
        assert_eq!(number(run(source).unwrap()), 120.0);
    }

    #[test]
    fn test_block_body_without_return_yields_null() {
        assert!(matches!(run("let f = () => { 1 }\nreturn f()").unwrap(), Value::Null));
    }

    #[test]
    fn test_list_map_passes_index() {
        let value = run("return [5, 6].map((x, i) => x * 10 + i)").unwrap();
        let Value::List(items) = value else {
            panic!("expected list");
        };
        assert_eq!(items.into_iter().map(number).collect::<Vec<_>>(), vec![50.0, 61.0]);
    }

    #[test]
    fn test_throw_string_becomes_message_with_program_frame() {
        // Arrange / Act
        let err = run("let a = 1\nthrow 'boom'").unwrap_err();

        // Assert
        assert_eq!(err.message, "boom");
        assert_eq!(err.stack, vec!["at <program> (<document>:2:1)".to_string()]);
    }

    #[test]
    fn test_throw_object_uses_message_field() {
        let err = run("throw { message: 'bad input' }").unwrap_err();
        assert_eq!(err.message, "bad input");
    }

    #[test]
    fn test_error_inside_function_has_caller_frame() {
        // Arrange
        let source = "let explode = () => {\n  throw 'inner'\n}\nexplode()";

        // Act
        let err = run(source).unwrap_err();

        // Assert: innermost first.
        assert_eq!(err.message, "inner");
        assert_eq!(
            err.stack,
            vec![
                "at explode (<document>:2:3)".to_string(),
                "at <program> (<document>:4:8)".to_string(),
            ]
        );
    }

    #[test]
    fn test_undefined_name_is_reference_error() {
        let err = run("return missing").unwrap_err();
        assert_eq!(err.message, "ReferenceError: missing is not defined");
    }

    #[test]
    fn test_calling_a_non_function_is_type_error() {
        let err = run("let a = 3\na()").unwrap_err();
        assert_eq!(err.message, "TypeError: a is not a function");
        let err = run("c.nope('x')").unwrap_err();
        assert_eq!(err.message, "TypeError: c.nope is not a function");
    }

    #[test]
    fn test_unbounded_recursion_is_a_script_failure() {
        let err = run("let f = (n) => f(n + 1)\nreturn f(0)").unwrap_err();
        assert_eq!(err.message, "RangeError: Maximum call stack size exceeded");
        assert_eq!(err.stack.len(), MAX_CALL_DEPTH + 1);
    }

    #[test]
    fn test_recursion_through_nested_expressions_hits_the_eval_limit() {
        // Each call nests ten list literals, so the expression budget runs
        // out long before the call budget does.
        let err = std::thread::Builder::new()
            .stack_size(EVAL_STACK_SIZE)
            .spawn(|| run("let f = (n) => [[[[[[[[[[ f(n + 1) ]]]]]]]]]]\nreturn f(0)"))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.message, "RangeError: Maximum call stack size exceeded");
        assert!(err.stack.len() < MAX_CALL_DEPTH, "{} frames", err.stack.len());
    }

    #[test]
    fn test_parameter_arithmetic_hint() {
        let err = run("return c.fp(1) + 2").unwrap_err();
        assert!(err.message.contains("c.addp"), "{}", err.message);
    }

    #[test]
    fn test_builds_connected_nodes() {
        // Arrange
        let source = "\
            let n = c.top('noise', { period: 2 })\n\
            return n.connect(c.top('level')).out()";

        // Act
        let value = run(source).unwrap();

        // Assert
        let Value::Node(level) = value else {
            panic!("expected node");
        };
        assert_eq!(level.qualified_type(), "levelTOP");
        assert_eq!(level.inputs[0].qualified_type(), "noiseTOP");
    }

    #[test]
    fn test_no_ambient_globals() {
        for name in ["process", "console", "eval", "globalThis", "fs"] {
            let err = run(&format!("return {name}")).unwrap_err();
            assert!(err.message.starts_with("ReferenceError"), "{name} leaked");
        }
    }
}
