//! Serve command implementation for Hookwire CLI.
//!
//! Reads one JSON request per line from stdin and writes one JSON response
//! per line to stdout. The script is watched and reloaded when it changes.

use std::sync::Arc;

use hookwire_core::{Callable, Coordinator, Error, Kwargs, Lifecycle, Outcome, Resolution};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::call::STARTUP_TIMEOUT;
use crate::colors;
use crate::session::{Options, Session};

/// Requests accepted on stdin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Call a script function.
    Call {
        #[serde(rename = "fn")]
        function: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Kwargs,
    },
    /// Resume admitting calls.
    Enable,
    /// Reject calls until enabled again.
    Disable,
    /// Report lifecycle and queue length.
    Status,
    /// Force a reload of the script.
    Reload,
    /// List the functions of the loaded script.
    Callables,
}

impl Request {
    /// Parse a request line. Bare words name the argument-less requests.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.starts_with('{') {
            let mut value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
            // `{"fn": ...}` without a type is shorthand for a call.
            if let Value::Object(map) = &mut value {
                if !map.contains_key("type") && map.contains_key("fn") {
                    map.insert("type".into(), Value::from("call"));
                }
            }
            return serde_json::from_value(value).map_err(|e| e.to_string());
        }
        match line {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "status" => Ok(Self::Status),
            "reload" => Ok(Self::Reload),
            "callables" => Ok(Self::Callables),
            other => Err(format!("unknown command `{}`", other)),
        }
    }
}

/// Responses written to stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The call returned a value.
    Value { value: Value },
    /// The call produced nothing.
    Empty { reason: &'static str },
    /// The call or request failed.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<&'static str>,
    },
    /// Current coordinator status.
    Status {
        lifecycle: Lifecycle,
        enabled: bool,
        pending: usize,
    },
    /// Functions of the loaded script.
    Callables { callables: Vec<Callable> },
    /// The request was applied.
    Ok,
}

impl Response {
    fn from_error(err: &Error) -> Self {
        Self::Error {
            message: err.to_string(),
            hint: err.hint(),
        }
    }

    fn from_outcome(outcome: Outcome<Value>, resolution: Option<Resolution>) -> Self {
        match outcome {
            Outcome::Success(value) => Self::Value { value },
            Outcome::Error(err) => Self::from_error(&err),
            Outcome::Empty => Self::Empty {
                reason: match resolution {
                    Some(Resolution::HookMissing) => "not_implemented",
                    Some(Resolution::Rejected) | None => "rejected",
                    _ => "no_value",
                },
            },
        }
    }
}

/// Serve requests from stdin until EOF or Ctrl+C.
pub async fn execute(script: &str, options: &Options) -> anyhow::Result<()> {
    let session = Session::open(script, options, |config| config.watch_files = true)?;

    eprintln!(
        "\n{}Hookwire{} - Script Coordinator",
        colors::BOLD,
        colors::RESET
    );
    eprintln!("{}", "─".repeat(50));
    eprintln!("{}  ◆ Script:{} {}", colors::CYAN, colors::RESET, script);

    // A script that fails to load is retried when it changes, so keep serving.
    match tokio::task::block_in_place(|| session.wait_started(STARTUP_TIMEOUT)) {
        Ok(()) => eprintln!("{}  ◆ Status:{} running", colors::CYAN, colors::RESET),
        Err(e) => eprintln!(
            "{}  ◆ Status:{} {}stopped: {}{}",
            colors::CYAN,
            colors::RESET,
            colors::RED,
            e,
            colors::RESET
        ),
    }
    eprintln!("{}", "─".repeat(50));
    eprintln!("{}Reading requests from stdin, Ctrl+C to stop{}", colors::GREEN, colors::RESET);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match Request::parse(&line) {
            Ok(request) => handle(&session, request).await,
            Err(message) => Response::Error { message, hint: None },
        };

        let mut text = serde_json::to_string(&response)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }

    let coordinator = session.coordinator.clone();
    tokio::task::spawn_blocking(move || coordinator.shutdown()).await?;
    eprintln!("{}Stopped{}", colors::YELLOW, colors::RESET);
    Ok(())
}

async fn handle(session: &Session, request: Request) -> Response {
    let coordinator = &session.coordinator;
    match request {
        Request::Call {
            function,
            args,
            kwargs,
        } => call(coordinator.clone(), function, args, kwargs).await,
        Request::Enable => {
            coordinator.enable();
            Response::Ok
        }
        Request::Disable => {
            coordinator.disable();
            Response::Ok
        }
        Request::Status => {
            let status = coordinator.status();
            Response::Status {
                lifecycle: status.lifecycle,
                enabled: status.enabled,
                pending: coordinator.pending(),
            }
        }
        Request::Reload => {
            let version = session.host_config.bump_version();
            tracing::debug!("Config version bumped to {}", version);
            coordinator.notify_external_change();
            Response::Ok
        }
        Request::Callables => Response::Callables {
            callables: coordinator.callables(),
        },
    }
}

async fn call(coordinator: Arc<Coordinator>, function: String, args: Vec<Value>, kwargs: Kwargs) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let handle = coordinator.submit(function, args, kwargs);
        let outcome = handle.wait();
        (outcome, handle.resolution())
    })
    .await;

    match result {
        Ok((outcome, resolution)) => Response::from_outcome(outcome, resolution),
        Err(e) => Response::Error {
            message: format!("call panicked: {}", e),
            hint: None,
        },
    }
}
