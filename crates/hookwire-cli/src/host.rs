//! Host capability exposed to scripts run from the CLI.

use std::time::{SystemTime, UNIX_EPOCH};

use hookwire_core::{HostCapability, ScriptContext};
use serde_json::Value;

/// Methods available through `host(method, args)`:
/// - `log(text)` writes to the log under the script target
/// - `env(name)` reads an environment variable (unit if unset)
/// - `time_ms()` milliseconds since the Unix epoch
/// - `cancelled()` whether the current generation is being torn down
pub struct CliHost;

impl HostCapability for CliHost {
    fn call(&self, method: &str, args: Vec<Value>, context: &ScriptContext) -> Result<Value, String> {
        match method {
            "log" => {
                let text = args
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                tracing::info!(target: "hookwire::script", "{}", text);
                Ok(Value::Null)
            }
            "env" => {
                let name = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or("env expects a variable name")?;
                Ok(std::env::var(name).map(Value::String).unwrap_or(Value::Null))
            }
            "time_ms" => {
                let ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| e.to_string())?
                    .as_millis();
                Ok(Value::from(ms as u64))
            }
            "cancelled" => Ok(Value::Bool(context.is_cancelled())),
            other => Err(format!("unknown host method `{}`", other)),
        }
    }
}
