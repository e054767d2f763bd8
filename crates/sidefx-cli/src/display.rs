//! Terminal rendering of prediction results and input problems.

use std::io::{self, Write};

use sidefx_ai::{ClassificationResult, InferenceError};
use sidefx_core::ValidationErrors;

const BAR_WIDTH: usize = 30;

/// Print the predicted label, optionally followed by one bar per class.
pub fn print_result<W: Write>(
    out: &mut W,
    result: &ClassificationResult,
    show_probabilities: bool,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "--- Prediction Result ---")?;
    writeln!(
        out,
        "The predicted side effect severity is: {}",
        result.label
    )?;

    if !show_probabilities {
        return Ok(());
    }
    let Some(probs) = &result.probabilities else {
        writeln!(out, "(model does not expose class probabilities)")?;
        return Ok(());
    };

    let width = probs.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    writeln!(out)?;
    for (label, p) in probs.iter() {
        let filled = ((p.clamp(0.0, 1.0) * BAR_WIDTH as f64).round()) as usize;
        let marker = if label == result.label { " <" } else { "" };
        writeln!(
            out,
            "  {label:<width$}  {:>5.1}%  {}{}{marker}",
            p * 100.0,
            "#".repeat(filled),
            ".".repeat(BAR_WIDTH - filled),
        )?;
    }
    Ok(())
}

/// Print every validation problem, one per line.
pub fn print_validation_errors<W: Write>(out: &mut W, errors: &ValidationErrors) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Invalid input:")?;
    for err in errors.iter() {
        writeln!(out, "  - {err}")?;
    }
    writeln!(
        out,
        "Make sure dosage is a non-negative number, no field is left blank, \
         and the date format is YYYY-MM-DD."
    )
}

pub fn print_prediction_failure<W: Write>(out: &mut W, err: &InferenceError) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{err}")?;
    writeln!(
        out,
        "Ensure your input data matches the features used during training."
    )
}
