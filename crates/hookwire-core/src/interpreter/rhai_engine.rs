//! Rhai embedding.
//!
//! An engine is built per interpreter generation. The framework and the user
//! script are compiled separately and merged, so a script function overrides
//! a framework function of the same name and arity. Top-level statements run
//! once at load time; their variables stay in the interpreter's scope.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{
    AST, Array, CallFnOptions, Dynamic, Engine, EvalAltResult, FnAccess, ImmutableString,
    Position, Scope,
};
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::{
    CapturedOutput, Callable, HostCapability, Interpreter, InterpreterFactory, InvokeError,
    LoadSpec, ScriptContext,
};
use crate::error::{Error, Result};
use crate::task::Kwargs;

/// Where `print` and `debug` output goes.
#[derive(Clone)]
enum OutputSink {
    Log,
    Capture(Rc<RefCell<CapturedOutput>>),
}

/// Builds [`RhaiInterpreter`]s.
#[derive(Default, Clone)]
pub struct RhaiFactory {
    host: Option<Arc<dyn HostCapability>>,
}

impl RhaiFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `host` to scripts through `host(method, args)`.
    pub fn with_host(mut self, host: Arc<dyn HostCapability>) -> Self {
        self.host = Some(host);
        self
    }

    fn build_engine(&self, spec: &LoadSpec, context: &ScriptContext, sink: OutputSink) -> Engine {
        let mut engine = Engine::new();

        // Checked between operations; ends any evaluation still running
        // once the generation is torn down.
        let abort = context.abort_handle();
        engine.on_progress(move |_| abort.is_aborted().then_some(Dynamic::UNIT));

        match sink {
            OutputSink::Log => {
                engine.on_print(|s| tracing::info!(target: "hookwire::script", "{}", s));
                engine.on_debug(|s, source, pos| {
                    tracing::debug!(target: "hookwire::script", "[{}:{}] {}", source.unwrap_or("script"), pos, s)
                });
            }
            OutputSink::Capture(output) => {
                let out = output.clone();
                engine.on_print(move |s| {
                    let mut out = out.borrow_mut();
                    out.stdout.push_str(s);
                    out.stdout.push('\n');
                });
                engine.on_debug(move |s, _, _| {
                    let mut out = output.borrow_mut();
                    out.stderr.push_str(s);
                    out.stderr.push('\n');
                });
            }
        }

        let script = spec.script.display().to_string();
        engine.register_fn("script_path", move || script.clone());
        let framework = spec.framework.display().to_string();
        engine.register_fn("framework_path", move || framework.clone());
        let environment = spec.environment.display().to_string();
        engine.register_fn("env_path", move || environment.clone());

        let ctx = context.clone();
        engine.register_fn("is_cancelled", move || ctx.is_cancelled());

        let host = self.host.clone();
        let ctx = context.clone();
        engine.register_fn(
            "host",
            move |method: ImmutableString, args: Array| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
                call_host(host.as_deref(), &ctx, &method, args)
            },
        );
        let host = self.host.clone();
        let ctx = context.clone();
        engine.register_fn(
            "host",
            move |method: ImmutableString| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
                call_host(host.as_deref(), &ctx, &method, Array::new())
            },
        );

        engine
    }

    /// Compile the framework (if any) and the script, and run their
    /// top-level statements.
    fn load(engine: &Engine, spec: &LoadSpec, scope: &mut Scope<'static>) -> Result<AST> {
        let script = compile(engine, &spec.script)?;
        let ast = if spec.framework.as_os_str().is_empty() {
            script
        } else {
            compile(engine, &spec.framework)?.merge(&script)
        };

        engine
            .run_ast_with_scope(scope, &ast)
            .map_err(|e| Error::InterpreterStartup(format!("{}: {}", spec.script.display(), e)))?;
        Ok(ast)
    }
}

fn compile(engine: &Engine, path: &Path) -> Result<AST> {
    engine
        .compile_file(path.to_path_buf())
        .map_err(|e| Error::InterpreterStartup(format!("{}: {}", path.display(), e)))
}

fn runtime_error(message: impl Into<Dynamic>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(message.into(), Position::NONE))
}

fn call_host(
    host: Option<&dyn HostCapability>,
    context: &ScriptContext,
    method: &str,
    args: Array,
) -> std::result::Result<Dynamic, Box<EvalAltResult>> {
    let Some(host) = host else {
        return Err(runtime_error(format!("no host capability for `{}`", method)));
    };
    let args = args
        .iter()
        .map(from_dynamic::<Value>)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let value = host
        .call(method, args, context)
        .map_err(|e| runtime_error(format!("host `{}` failed: {}", method, e)))?;
    to_dynamic(value)
}

impl InterpreterFactory for RhaiFactory {
    fn create(&self, spec: &LoadSpec, context: ScriptContext) -> Result<Box<dyn Interpreter>> {
        let engine = self.build_engine(spec, &context, OutputSink::Log);
        let mut scope = Scope::new();
        let ast = Self::load(&engine, spec, &mut scope)?;

        let mut arities: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut callables = Vec::new();
        for meta in ast.iter_functions() {
            arities
                .entry(meta.name.to_string())
                .or_default()
                .push(meta.params.len());
            if matches!(meta.access, FnAccess::Public) {
                callables.push(Callable {
                    name: meta.name.to_string(),
                    params: meta.params.iter().map(|p| p.to_string()).collect(),
                });
            }
        }
        callables.sort_by(|a, b| a.name.cmp(&b.name).then(a.params.len().cmp(&b.params.len())));

        Ok(Box::new(RhaiInterpreter {
            engine,
            ast,
            scope,
            arities,
            callables,
            context,
        }))
    }

    fn evaluate(&self, spec: &LoadSpec, code: &str) -> CapturedOutput {
        let output = Rc::new(RefCell::new(CapturedOutput::default()));
        let context = ScriptContext::new(&spec.script);
        let engine = self.build_engine(spec, &context, OutputSink::Capture(output.clone()));

        let mut scope = Scope::new();
        let result = Self::load(&engine, spec, &mut scope).and_then(|loaded| {
            let snippet = engine
                .compile(code)
                .map_err(|e| Error::script("<eval>", e.to_string()))?;
            let ast = loaded.clone_functions_only().merge(&snippet);
            engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
                .map_err(|e| Error::script("<eval>", e.to_string()))
        });
        context.teardown();

        let mut output = output.take();
        match result {
            Ok(value) if !value.is_unit() => {
                output.stdout.push_str(&value.to_string());
                output.stdout.push('\n');
            }
            Ok(_) => {}
            Err(e) => {
                output.stderr.push_str(&e.to_string());
                output.stderr.push('\n');
            }
        }
        output
    }
}

/// One loaded Rhai script.
pub struct RhaiInterpreter {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    /// Declared arities per function name, including private functions.
    arities: FxHashMap<String, Vec<usize>>,
    callables: Vec<Callable>,
    context: ScriptContext,
}

impl Interpreter for RhaiInterpreter {
    fn invoke(&mut self, name: &str, args: &[Value], kwargs: &Kwargs) -> std::result::Result<Option<Value>, InvokeError> {
        let Some(arities) = self.arities.get(name) else {
            return Err(InvokeError::NotFound);
        };

        let mut call_args = args
            .iter()
            .map(to_dynamic)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| InvokeError::Raised(format!("invalid argument: {}", e)))?;
        if !kwargs.is_empty() {
            let kwargs = to_dynamic(kwargs).map_err(|e| InvokeError::Raised(format!("invalid keyword argument: {}", e)))?;
            call_args.push(kwargs);
        }

        if !arities.contains(&call_args.len()) {
            return Err(InvokeError::Raised(format!(
                "function `{}` takes {:?} argument(s), called with {}",
                name,
                arities,
                call_args.len()
            )));
        }

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut self.scope, &self.ast, name, call_args)
            .map_err(|e| InvokeError::Raised(e.to_string()))?;

        if result.is_unit() {
            return Ok(None);
        }
        from_dynamic::<Value>(&result)
            .map(Some)
            .map_err(|e| InvokeError::Conversion(format!("{} ({})", e, result.type_name())))
    }

    fn callables(&self) -> Vec<Callable> {
        self.callables.clone()
    }

    fn context(&self) -> &ScriptContext {
        &self.context
    }
}
