//! Eval command implementation for Hookwire CLI.

use std::io::Write;
use std::sync::Arc;

use hookwire_core::{CapturedOutput, InterpreterFactory, RhaiFactory};

use crate::host::CliHost;
use crate::session::{self, Options};

/// Evaluate `code` with the framework and `script` loaded. Captured output
/// goes to stdout. Debug output and evaluation errors go to stderr.
pub fn execute(script: &str, code: &str, options: &Options) -> anyhow::Result<()> {
    let output = evaluate(script, code, options)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.stdout.as_bytes())?;
    stdout.flush()?;

    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    Ok(())
}

/// One-shot evaluation in a throwaway interpreter on the calling thread.
fn evaluate(script: &str, code: &str, options: &Options) -> anyhow::Result<CapturedOutput> {
    let spec = session::load_spec(script, options)?;
    let factory = RhaiFactory::new().with_host(Arc::new(CliHost));
    Ok(factory.evaluate(&spec, code))
}
