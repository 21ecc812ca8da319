//! Call command implementation for Hookwire CLI.
//!
//! Loads a script, calls one function and prints the result as JSON.

use std::time::{Duration, Instant};

use hookwire_core::{Error, Kwargs, Outcome, Resolution};
use serde_json::Value;

use crate::colors;
use crate::session::{Options, Session};

/// How long to wait for the script to load before giving up.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Call `function` in `script` with JSON arguments.
pub fn execute(
    script: &str,
    function: &str,
    args: &[String],
    kwargs: Option<&str>,
    options: &Options,
) -> anyhow::Result<()> {
    let args = args.iter().map(|arg| parse_arg(arg)).collect::<Vec<_>>();
    let kwargs = parse_kwargs(kwargs)?;

    let session = Session::open(script, options, |_| {})?;
    session.wait_started(STARTUP_TIMEOUT)?;

    let start = Instant::now();
    let handle = session.coordinator.submit(function, args, kwargs);
    let outcome = handle.wait();
    let elapsed = start.elapsed();
    tracing::debug!("{} finished in {:.2}ms", function, elapsed.as_secs_f64() * 1000.0);

    let result = match (outcome, handle.resolution()) {
        (Outcome::Success(value), _) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        (Outcome::Error(err), _) => Err(err.into()),
        (Outcome::Empty, Some(Resolution::HookMissing)) => {
            Err(Error::HookNotImplemented(function.to_string()).into())
        }
        (Outcome::Empty, Some(Resolution::Rejected)) => {
            Err(match session.startup_error() {
                Some(err) => err,
                None => Error::AdmissionRejected(function.to_string()),
            }
            .into())
        }
        (Outcome::Empty, _) => {
            println!("{}<empty>{}", colors::DIM, colors::RESET);
            Ok(())
        }
    };

    session.coordinator.shutdown();
    result
}

/// Parse one positional argument as JSON, treating anything else as a
/// plain string.
pub fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

/// Parse `--kwargs`, which must be a JSON object.
pub fn parse_kwargs(kwargs: Option<&str>) -> anyhow::Result<Kwargs> {
    match kwargs {
        None => Ok(Kwargs::new()),
        Some(text) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("--kwargs must be a JSON object, got {}", other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("5"), json!(5));
        assert_eq!(parse_arg("\"x\""), json!("x"));
        assert_eq!(parse_arg("{\"a\":[1,2]}"), json!({"a": [1, 2]}));
        assert_eq!(parse_arg("hello"), json!("hello"));
    }

    #[test]
    fn test_parse_kwargs() {
        assert!(parse_kwargs(None).unwrap().is_empty());

        let kwargs = parse_kwargs(Some("{\"scale\": 2}")).unwrap();
        assert_eq!(kwargs.get("scale"), Some(&json!(2)));

        assert!(parse_kwargs(Some("[1]")).is_err());
        assert!(parse_kwargs(Some("{")).is_err());
    }
}
