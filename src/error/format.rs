use crate::error::{ErrorContext, UpdaterError};
use colored::{Color, Colorize};

/// Plain rendering, the same layout `ErrorContext` displays
pub fn format_error_chain(error: &UpdaterError) -> String {
    format_error_with_color(error, false)
}

/// Rendering for the terminal. Labels are colored when `use_color` is set;
/// the text is identical either way.
pub fn format_error_with_color(error: &UpdaterError, use_color: bool) -> String {
    let label = |text: &str, color: Color| {
        if use_color {
            text.color(color).bold().to_string()
        } else {
            text.to_string()
        }
    };

    let context = ErrorContext::new(error);
    let mut output = format!("{} {error}", label("Error:", Color::Red));
    if let Some(details) = &context.details {
        output.push_str(&format!("\n\n{} {details}", label("Details:", Color::Cyan)));
    }
    if let Some(suggestion) = &context.suggestion {
        output.push_str(&format!(
            "\n\n{} {suggestion}",
            label("Suggestion:", Color::Yellow)
        ));
    }
    output
}
