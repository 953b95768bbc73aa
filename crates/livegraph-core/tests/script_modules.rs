//! Integration tests for script evaluation with `require`.
//!
//! These tests write helper scripts into a scratch directory and exercise the
//! interpreter, the module loader, the shared cache, and the validator
//! together through the public API.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use livegraph_core::domain::change::substitute_changes;
use livegraph_core::{build_graph, extract, validate, ModuleCache, ModuleLoader, ScriptError};
use uuid::Uuid;

/// A scratch directory removed when dropped.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("livegraph-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        Self(dir)
    }

    fn write(&self, name: &str, contents: &str) {
        let path = self.0.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write scratch file");
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn run(dir: &Path, cache: &Arc<ModuleCache>, source: &str) -> Result<String, String> {
    let loader = ModuleLoader::new(dir, Arc::clone(cache));
    let value = build_graph(source, "<document>", &loader).map_err(|e: ScriptError| {
        std::iter::once(e.message)
            .chain(e.stack)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    validate(&value).map_err(|e| e.details.join("\n"))
}

fn json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).expect("validator output must be JSON")
}

#[test]
fn test_demo_patch_evaluates() {
    // Arrange
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    let source = fs::read_to_string(demos.join("feedback.lg")).expect("demo script");
    let token = extract("", &source).to_token();
    let program = substitute_changes(&source, &token);
    let cache = Arc::new(ModuleCache::new());

    // Act
    let graph = json(&run(&demos, &cache, &program).unwrap());

    // Assert
    assert_eq!(graph["/level_top_0"]["params"]["colorr"], "float(1.0)");
    assert_eq!(graph["/level_top_0"]["inputs"][0], "/noise_top_1");
    assert_eq!(graph["/noise_top_1"]["params"]["resolutiony"], "float(720.0)");
    let text = graph["/text_dat_3"]["params"]["text"].as_str().unwrap();
    assert!(text.contains("added\\tlet lfo"), "{text}");
    assert_eq!(cache.len(), 1, "the palette module is cached");
}

#[test]
fn test_required_value_is_cached_until_cleared() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("lib/size.lg", "return 2");
    let cache = Arc::new(ModuleCache::new());
    let source = "return c.top('noise', { period: require('./lib/size') })";

    // Act: evaluate, edit the helper, evaluate again, then clear and retry.
    let first = json(&run(dir.path(), &cache, source).unwrap());
    dir.write("lib/size.lg", "return 5");
    let second = json(&run(dir.path(), &cache, source).unwrap());
    let dropped = cache.clear();
    let third = json(&run(dir.path(), &cache, source).unwrap());

    // Assert
    assert_eq!(first["/noise_top_0"]["params"]["period"], "float(2.0)");
    assert_eq!(second["/noise_top_0"]["params"]["period"], "float(2.0)");
    assert_eq!(dropped, 1);
    assert_eq!(third["/noise_top_0"]["params"]["period"], "float(5.0)");
}

#[test]
fn test_modules_see_the_namespace_and_can_require_others() {
    let dir = ScratchDir::new();
    dir.write("base.lg", "return c.top('noise')");
    dir.write("chain.lg", "let b = require('./base')\nreturn b.connect(c.top('blur'))");

    let graph = json(&run(dir.path(), &Arc::new(ModuleCache::new()), "return require('./chain.lg')").unwrap());

    assert_eq!(graph["/blur_top_0"]["inputs"][0], "/noise_top_1");
}

#[test]
fn test_cyclic_require_is_a_script_error() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("a.lg", "return require('./b')");
    dir.write("b.lg", "return require('./a')");

    // Act
    let err = run(dir.path(), &Arc::new(ModuleCache::new()), "return require('./a')").unwrap_err();

    // Assert
    assert!(err.starts_with("Error: cyclic require:"), "{err}");
    assert!(err.lines().last().unwrap().starts_with("at <program> (<document>:1:"));
}

#[test]
fn test_missing_module_is_a_script_error() {
    let dir = ScratchDir::new();
    let err = run(dir.path(), &Arc::new(ModuleCache::new()), "require('./nope')").unwrap_err();
    assert!(err.starts_with("Error: Cannot find module './nope'"), "{err}");
}

#[test]
fn test_error_inside_module_reports_module_and_caller_frames() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("broken.lg", "let x = 1\nthrow 'bad helper'");

    // Act
    let err = run(dir.path(), &Arc::new(ModuleCache::new()), "let m = require('./broken')").unwrap_err();

    // Assert
    let lines: Vec<&str> = err.lines().collect();
    assert_eq!(lines[0], "bad helper");
    assert!(lines[1].starts_with("at <module> ("), "{err}");
    assert!(lines[1].ends_with("broken.lg:2:1)"), "{err}");
    assert_eq!(lines[2], "at <program> (<document>:1:16)");
}

#[test]
fn test_failed_module_is_not_cached() {
    let dir = ScratchDir::new();
    dir.write("flaky.lg", "throw 'first time'");
    let cache = Arc::new(ModuleCache::new());

    assert!(run(dir.path(), &cache, "return require('./flaky')").is_err());
    dir.write("flaky.lg", "return c.chop('lfo')");

    assert!(run(dir.path(), &cache, "return require('./flaky')").is_ok());
}
