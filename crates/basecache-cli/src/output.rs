use atty::Stream;
use basecache_core::{CommandStatus, ExecutionOutcome};
use color_eyre::Result;
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

// Report sections worth listing after a pass, in display order.
const PASS_SECTIONS: &[(&str, &str)] = &[
    ("corrupt", "Failed verification"),
    ("removed", "Removed"),
    ("retained", "Too young to remove"),
    ("unknown", "Unknown base files"),
];

pub fn emit_output(opts: &OutputOptions, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = basecache_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }
    if opts.quiet && outcome.status == CommandStatus::Ok {
        return Ok(code);
    }

    if is_passthrough(&outcome.details) {
        println!("{}", outcome.message);
        return Ok(code);
    }
    let message = format!("basecache {command}: {}", outcome.message);
    if outcome.status == CommandStatus::Ok {
        println!("{}", style.status(outcome.status, &message));
    } else {
        eprintln!("{}", style.status(outcome.status, &message));
    }
    if !opts.quiet {
        for line in render_pass_sections(&style, &outcome.details) {
            println!("{line}");
        }
    }
    if let Some(hint) = hint_from_details(&outcome.details) {
        eprintln!("{}", style.info(&format!("Tip: {hint}")));
    }
    Ok(code)
}

fn render_pass_sections(style: &Style, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, title) in PASS_SECTIONS {
        let Some(paths) = details.get(*key).and_then(Value::as_array) else {
            continue;
        };
        if paths.is_empty() {
            continue;
        }
        lines.push(style.section(&format!("{title}:")));
        lines.extend(
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(|path| format!("  • {path}")),
        );
    }
    if let Some(missing) = details.get("missing").and_then(Value::as_object) {
        for (image, instances) in missing {
            let names: Vec<&str> = instances
                .as_array()
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            lines.push(style.warn(&format!(
                "image {image} has no base file (used by {})",
                names.join(", ")
            )));
        }
    }
    if let Some(failures) = details.get("removal_failures").and_then(Value::as_array) {
        for failure in failures {
            let path = failure.get("path").and_then(Value::as_str).unwrap_or("?");
            let error = failure.get("error").and_then(Value::as_str).unwrap_or("");
            lines.push(style.warn(&format!("could not remove {path}: {error}")));
        }
    }
    lines
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
