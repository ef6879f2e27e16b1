//! Marker search and number extraction over raw firmware replies.

use crate::error::ParseError;

/// Marker preceding a Z value in probe and position reports.
pub const Z_MARKER: &str = "Z:";

/// Marker of the steps-per-unit line in a settings report.
pub const STEPS_MARKER: &str = "M92";

/// Decode reply bytes as text, replacing invalid UTF-8.
pub(crate) fn text(reply: &[u8]) -> String {
    String::from_utf8_lossy(reply).into_owned()
}

/// Text following the first occurrence of `marker`.
pub(crate) fn after<'a>(text: &'a str, marker: &'static str) -> Result<&'a str, ParseError> {
    text.find(marker)
        .map(|pos| &text[pos + marker.len()..])
        .ok_or(ParseError::MarkerNotFound(marker))
}

/// Text following the `nth` (zero-based) occurrence of `marker`.
pub(crate) fn after_nth<'a>(
    text: &'a str,
    marker: &'static str,
    nth: usize,
) -> Result<&'a str, ParseError> {
    text.match_indices(marker)
        .nth(nth)
        .map(|(pos, _)| &text[pos + marker.len()..])
        .ok_or(ParseError::MarkerNotFound(marker))
}

/// Parse the numeric run at the start of `text`, skipping leading blanks.
pub(crate) fn leading_number(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim_start_matches([' ', '\t']);
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .unwrap_or(trimmed.len());
    parse_number(&trimmed[..end])
}

/// Parse everything up to the next line terminator.
pub(crate) fn number_to_eol(text: &str) -> Result<f64, ParseError> {
    let line = text
        .split(['\r', '\n'])
        .next()
        .unwrap_or_default();
    parse_number(line.trim())
}

fn parse_number(run: &str) -> Result<f64, ParseError> {
    run.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(snippet(run)))
}

/// Bounded copy of offending text for error messages.
fn snippet(run: &str) -> String {
    run.chars()
        .take(32)
        .collect()
}

/// Z steps per unit from an `M503` settings report.
///
/// Looks for the `M92` line and reads its Z field up to the next axis field,
/// e.g. `echo:  M92 X80.00 Y80.00 Z400.00 E93.00`.
pub fn steps_per_unit(reply: &[u8]) -> Result<f64, ParseError> {
    let text = text(reply);
    let line = after(&text, STEPS_MARKER)?
        .split(['\r', '\n'])
        .next()
        .unwrap_or_default();
    let field = line
        .split_whitespace()
        .find_map(|field| field.strip_prefix('Z'))
        .ok_or(ParseError::MarkerNotFound("Z"))?;
    parse_number(field)
}
