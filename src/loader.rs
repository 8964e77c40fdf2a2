#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use rhai::{
    AST, Array, CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, NativeCallContext, Scope,
    module_resolvers::DummyModuleResolver,
};
use tracing::debug;

/// File extension every grader and submission script must carry.
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Log target student `print`/`debug` output is routed to.
const SUBMISSION_TARGET: &str = "submission";

/// Creates and returns a new `Engine` with the `Implementation` type and its
/// methods registered.
///
/// Module imports are disabled: anything a script needs has to be defined in
/// the script itself.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.on_print(|text| debug!(target: SUBMISSION_TARGET, "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: SUBMISSION_TARGET, "[{}] {pos:?}: {text}", source.unwrap_or("script"))
    });

    engine
        .register_type_with_name::<Implementation>("Implementation")
        .register_get("name", |imp: &mut Implementation| imp.name.clone())
        .register_fn("invoke", |ctx: NativeCallContext, imp: &mut Implementation| {
            imp.invoke(&ctx, Vec::new())
        })
        .register_fn("invoke", |ctx: NativeCallContext, imp: &mut Implementation, a: Dynamic| {
            imp.invoke(&ctx, vec![a])
        })
        .register_fn(
            "invoke",
            |ctx: NativeCallContext, imp: &mut Implementation, a: Dynamic, b: Dynamic| {
                imp.invoke(&ctx, vec![a, b])
            },
        )
        .register_fn(
            "invoke",
            |ctx: NativeCallContext,
             imp: &mut Implementation,
             a: Dynamic,
             b: Dynamic,
             c: Dynamic| imp.invoke(&ctx, vec![a, b, c]),
        )
        .register_fn(
            "invoke",
            |ctx: NativeCallContext,
             imp: &mut Implementation,
             a: Dynamic,
             b: Dynamic,
             c: Dynamic,
             d: Dynamic| imp.invoke(&ctx, vec![a, b, c, d]),
        )
        .register_fn(
            "invoke_with",
            |ctx: NativeCallContext, imp: &mut Implementation, args: Array| {
                imp.invoke(&ctx, args)
            },
        );
    engine
}

/// Top-level function defined by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSignature {
    /// Function name, exactly as written.
    pub name:  String,
    /// Number of parameters.
    pub arity: usize,
}

/// A successfully evaluated script.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Where the script was read from.
    path:      PathBuf,
    /// Compiled script; functions are resolved against this and nothing else.
    ast:       Arc<AST>,
    /// Top-level variables left in scope after evaluation, in declaration
    /// order.
    variables: Vec<(String, Dynamic)>,
}

impl Unit {
    /// Path of the script this unit was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level variables, in declaration order. Shadowed names appear once
    /// per declaration.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.variables.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Functions declared in this unit's own source.
    pub fn functions(&self) -> impl Iterator<Item = FnSignature> + '_ {
        self.ast.iter_functions().map(|f| FnSignature {
            name:  f.name.to_string(),
            arity: f.params.len(),
        })
    }

    /// True if this unit declares a function called `name` taking `arity`
    /// parameters.
    pub fn defines(&self, name: &str, arity: usize) -> bool {
        self.functions().any(|f| f.name == name && f.arity == arity)
    }

    /// Returns a callable handle to a function declared in this unit.
    pub fn implementation(&self, name: &str) -> Option<Implementation> {
        self.functions().any(|f| f.name == name).then(|| Implementation {
            name: name.to_string(),
            ast:  Arc::clone(&self.ast),
        })
    }

    /// Collects variables named `<prefix><n>` (prefix compared
    /// case-insensitively) into a map keyed by `n`, with lower-cased values.
    pub fn numbered_strings(&self, prefix: &str) -> BTreeMap<u32, String> {
        self.variables()
            .filter_map(|(name, value)| {
                let number = numbered(name, prefix)?;
                Some((number, value.to_string().to_lowercase()))
            })
            .collect()
    }

    /// Calls a function declared in this unit without re-running its
    /// top-level statements.
    pub fn call(
        &self,
        engine: &Engine,
        name: &str,
        args: impl FuncArgs,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        call_in(engine, &self.ast, name, args)
    }
}

/// Parses the `n` out of a binding named `<prefix><n>`.
fn numbered(name: &str, prefix: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    let suffix = lowered.strip_prefix(&prefix.to_ascii_lowercase())?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Calls `name` against `ast` only.
fn call_in(
    engine: &Engine,
    ast: &AST,
    name: &str,
    args: impl FuncArgs,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
    engine.call_fn_with_options::<Dynamic>(options, &mut Scope::new(), ast, name, args)
}

/// A function from one unit handed to a script from another.
///
/// Invoking it always runs the function inside the unit that declared it, so
/// a grader can never accidentally satisfy a test with its own helpers.
#[derive(Debug, Clone)]
pub struct Implementation {
    /// Name of the function.
    name: String,
    /// The declaring unit's compiled script.
    ast:  Arc<AST>,
}

impl Implementation {
    /// Name of the wrapped function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the function with `args`.
    fn invoke(
        &self,
        ctx: &NativeCallContext,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        call_in(ctx.engine(), &self.ast, &self.name, args)
    }
}

/// What came out of loading one script.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The script compiled and its top-level statements ran to completion.
    Loaded(Unit),
    /// Reading, compiling, or evaluating the script failed; holds the full
    /// error text.
    Failed(String),
}

impl LoadOutcome {
    /// The loaded unit, if any.
    pub fn unit(&self) -> Option<&Unit> {
        match self {
            LoadOutcome::Loaded(unit) => Some(unit),
            LoadOutcome::Failed(_) => None,
        }
    }

    /// The failure text, if loading failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            LoadOutcome::Loaded(_) => None,
            LoadOutcome::Failed(error) => Some(error),
        }
    }
}

/// Evaluates scripts, each in a fresh scope.
pub struct Loader {
    /// Engine shared by every unit this loader produces.
    engine: Engine,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Creates a loader backed by [`create_engine`].
    pub fn new() -> Self {
        Self::with_engine(create_engine())
    }

    /// Creates a loader backed by a caller-supplied engine.
    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    /// The engine units are evaluated with.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Loads the script at `path`. Never fails: any error becomes
    /// [`LoadOutcome::Failed`].
    pub fn load(&self, path: &Path) -> LoadOutcome {
        match self.evaluate(path) {
            Ok(unit) => LoadOutcome::Loaded(unit),
            Err(error) => {
                debug!("{} failed to load", path.display());
                LoadOutcome::Failed(error)
            }
        }
    }

    /// Reads, compiles and runs a script.
    fn evaluate(&self, path: &Path) -> Result<Unit, String> {
        let source = fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {e}", path.display()))?;

        let mut ast = self
            .engine
            .compile(&source)
            .map_err(|e| format!("Syntax error in {}: {e}", path.display()))?;
        ast.set_source(path.display().to_string());

        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| format!("Error while running {}:\n{e}", path.display()))?;

        let variables = scope
            .iter()
            .map(|(name, _, value)| (name.to_string(), value))
            .collect();

        Ok(Unit {
            path: path.to_path_buf(),
            ast: Arc::new(ast),
            variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_script(name: &str, contents: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("gradeo-loader-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write script");
        (dir, path)
    }

    #[test]
    fn exposes_top_level_bindings() {
        let (dir, path) = temp_script(
            "unit.rhai",
            "let QUESTION_1 = \"B\";\nconst question_2 = \"c\";\nfn double(x) { x * 2 }\n",
        );
        let loader = Loader::new();
        let outcome = loader.load(&path);
        let unit = outcome.unit().expect("loads");

        assert!(unit.defines("double", 1));
        assert!(!unit.defines("double", 2));
        let answers = unit.numbered_strings("question_");
        assert_eq!(answers.get(&1).map(String::as_str), Some("b"));
        assert_eq!(answers.get(&2).map(String::as_str), Some("c"));

        let result = unit.call(loader.engine(), "double", (21_i64,)).expect("call");
        assert_eq!(result.as_int(), Ok(42));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn syntax_errors_are_captured() {
        let (dir, path) = temp_script("broken.rhai", "fn oops( { \n");
        let outcome = Loader::new().load(&path);
        let error = outcome.error().expect("fails");
        assert!(error.contains("Syntax error"), "{error}");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn runtime_errors_are_captured() {
        let (dir, path) = temp_script("throws.rhai", "let x = 1;\nthrow \"boom\";\n");
        let outcome = Loader::new().load(&path);
        assert!(outcome.error().expect("fails").contains("boom"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn imports_are_refused() {
        let (dir, path) = temp_script("imports.rhai", "import \"solution\" as s;\n");
        assert!(Loader::new().load(&path).error().is_some());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_files_fail_instead_of_erroring() {
        let outcome = Loader::new().load(Path::new("/definitely/not/here.rhai"));
        assert!(outcome.error().expect("fails").contains("Could not read"));
    }

    #[test]
    fn numbered_ignores_non_numeric_suffixes() {
        assert_eq!(numbered("ANSWERS_12", "answers_"), Some(12));
        assert_eq!(numbered("answers_x", "answers_"), None);
        assert_eq!(numbered("answers_", "answers_"), None);
        assert_eq!(numbered("question_1", "answers_"), None);
    }
}
