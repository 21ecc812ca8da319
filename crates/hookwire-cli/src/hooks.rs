//! Hooks command implementation for Hookwire CLI.
//!
//! Lists the functions a script defines and which proxy hooks they implement.

use hookwire_core::{ConfigSource, EditorTab, MessageKind, is_hook_name};

use crate::call::STARTUP_TIMEOUT;
use crate::colors;
use crate::session::{Options, Session};

/// Print the callables, intercept hooks and editor tabs of `script`.
pub fn execute(script: &str, options: &Options) -> anyhow::Result<()> {
    let session = Session::open(script, options, |_| {})?;
    session.wait_started(STARTUP_TIMEOUT)?;

    let callables = session.coordinator.callables();
    let hooks = session.coordinator.hooks();
    session.coordinator.shutdown();

    println!(
        "\n{}Script{} {}",
        colors::BOLD,
        colors::RESET,
        session.host_config.user_script_path().display()
    );
    println!("{}", "─".repeat(50));

    println!("{}Functions:{}", colors::BOLD, colors::RESET);
    if callables.is_empty() {
        println!("  {}(none){}", colors::DIM, colors::RESET);
    }
    for callable in &callables {
        let marker = if is_hook_name(&callable.name) {
            format!("{}◆{}", colors::GREEN, colors::RESET)
        } else {
            " ".to_string()
        };
        println!(
            "  {} {}({})",
            marker,
            callable.name,
            callable.params.join(", ")
        );
    }

    for kind in [MessageKind::Request, MessageKind::Response] {
        println!(
            "\n{}{}:{} intercept {}",
            colors::BOLD,
            kind_label(kind),
            colors::RESET,
            if hooks.intercepts(kind) {
                format!("{}yes{}", colors::GREEN, colors::RESET)
            } else {
                format!("{}no{}", colors::DIM, colors::RESET)
            }
        );
        for tab in hooks.editor_tabs(kind) {
            println!("  {}", describe_tab(&tab));
        }
    }

    println!("\n{}", "─".repeat(50));
    println!(
        "{}{}{} hooks defined",
        colors::CYAN,
        hooks.len(),
        colors::RESET
    );

    Ok(())
}

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Request => "Request",
        MessageKind::Response => "Response",
    }
}

fn describe_tab(tab: &EditorTab) -> String {
    let name = tab.name.as_deref().unwrap_or("(default)");
    let mode = match (tab.is_displayable(), tab.is_editable()) {
        (true, true) => format!("{}editable{}", colors::GREEN, colors::RESET),
        (true, false) => format!("{}read-only{}", colors::CYAN, colors::RESET),
        (false, _) => format!("{}hidden: no in hook{}", colors::YELLOW, colors::RESET),
    };
    format!("tab {} [{}]", name, mode)
}
