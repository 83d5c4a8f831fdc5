//! User-Friendly Error Formatting
//!
//! Renders CLI-level errors with a short explanation and troubleshooting
//! hints for the common failure cases.

use std::fmt::Write;

use crate::engine::error::EngineError;

/// Format an error for the terminal
///
/// Engine errors anywhere in the chain are recognised by type; other errors
/// are categorised by their message.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = error.to_string();
    let engine_error = error.chain().find_map(|e| e.downcast_ref::<EngineError>());

    match engine_error {
        Some(EngineError::InvalidModifierTable(_)) => format_modifier_error(&mut output),
        Some(EngineError::InvalidConfig(_)) => format_config_error(&mut output),
        Some(
            EngineError::DuplicateElement(_)
            | EngineError::UnresolvedElement(_)
            | EngineError::InvalidOverride { .. },
        ) => format_element_error(&mut output),
        Some(_) => format_generic_error(&mut output, &error_msg),
        None if error_msg.contains("script") || error_msg.contains("line") => {
            format_script_error(&mut output)
        }
        None if error_msg.contains("config") || error_msg.contains("Config") => {
            format_config_error(&mut output)
        }
        None => format_generic_error(&mut output, &error_msg),
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-remote-pad -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Print the built-in defaults: lamco-remote-pad --dump-config"
    )
    .ok();

    output
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "The configuration file could not be used.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. File not found").ok();
    writeln!(output, "     → Pass the path with: lamco-remote-pad -c pad.toml").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check quotes and [[elements]] table headers").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Invalid timing").ok();
    writeln!(output, "     → Delays must be non-zero").ok();
    writeln!(output, "     → repeat floor_ms must not exceed initial_ms").ok();
}

fn format_modifier_error(output: &mut String) {
    writeln!(output, "Keyboard State Table Error").ok();
    writeln!(output).ok();
    writeln!(output, "The [keyboard] state table is inconsistent.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. A transition names a state that is not declared").ok();
    writeln!(output, "  2. Two states share the same id").ok();
    writeln!(output, "  3. `initial` is not one of the declared states").ok();
    writeln!(output, "     → Or use a preset: preset = \"android\" | \"windows\"").ok();
}

fn format_element_error(output: &mut String) {
    writeln!(output, "Element Or Override Error").ok();
    writeln!(output).ok();
    writeln!(output, "An [[elements]] or [[overrides]] entry is invalid.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Two elements share the same id").ok();
    writeln!(output, "  2. An override names an element that does not exist").ok();
    writeln!(output, "  3. Both override slots are \"same\"").ok();
}

fn format_script_error(output: &mut String) {
    writeln!(output, "Event Script Error").ok();
    writeln!(output).ok();
    writeln!(output, "The event script could not be replayed.").ok();
    writeln!(output).ok();
    writeln!(output, "Expected one JSON object per line, for example:").ok();
    writeln!(output).ok();
    writeln!(
        output,
        r#"  {{"event":"pointer","pointer_id":1,"target":"trackpad","phase":"down","x":10,"y":10,"timestamp_ms":0}}"#
    )
    .ok();
    writeln!(
        output,
        r#"  {{"event":"mode","mode":"media","timestamp_ms":5}}"#
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Engine Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}
