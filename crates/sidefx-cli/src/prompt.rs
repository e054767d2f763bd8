//! Interactive prompt: reads one drug record field by field.

use std::io::{self, BufRead, Write};

use chrono::NaiveDateTime;
use sidefx_ai::{InferenceAdapter, InferenceError};
use sidefx_core::schema::{
    APPROVAL_STATUS, CONTRAINDICATIONS, DOSAGE_MG, DRUG_CLASS, EXPIRY_DATE, INDICATIONS,
    SIDE_EFFECTS, WARNINGS,
};
use sidefx_core::{RawFields, validate};
use tracing::{info, warn};

use crate::display;

/// Field name and prompt label, in the order they are asked.
const PROMPTS: [(&str, &str); 8] = [
    (DOSAGE_MG, "Dosage (mg)"),
    (DRUG_CLASS, "Drug Class"),
    (INDICATIONS, "Indications"),
    (SIDE_EFFECTS, "Side Effects"),
    (CONTRAINDICATIONS, "Contraindications"),
    (WARNINGS, "Warnings"),
    (APPROVAL_STATUS, "Approval Status"),
    (EXPIRY_DATE, "Expiry date (YYYY-MM-DD)"),
];

/// Ask for every field in turn. Stops early at end of input, leaving the
/// unanswered fields absent.
pub fn collect_raw_fields<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<RawFields> {
    writeln!(
        output,
        "Please enter the following information to predict side effect severity:"
    )?;

    let mut raw = RawFields::new();
    for (field, label) in PROMPTS {
        write!(output, "{label}: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        raw.insert(
            field.to_string(),
            line.trim_end_matches(['\r', '\n']).to_string(),
        );
    }
    Ok(raw)
}

/// Run one interactive prediction attempt.
///
/// Bad input or a failed prediction is reported on `output` and the attempt
/// ends normally. Only an unready model is returned as an error.
pub fn run_predict<R: BufRead, W: Write>(
    adapter: &InferenceAdapter,
    input: &mut R,
    output: &mut W,
    now: NaiveDateTime,
    show_probabilities: bool,
) -> anyhow::Result<()> {
    if let Some(reason) = adapter.unready_reason() {
        anyhow::bail!("model not ready: {reason}");
    }

    let raw = collect_raw_fields(input, output)?;

    let record = match validate(&raw, now) {
        Ok(record) => record,
        Err(errors) => {
            warn!(%errors, "interactive input rejected");
            display::print_validation_errors(output, &errors)?;
            return Ok(());
        }
    };

    match adapter.classify(&record) {
        Ok(result) => {
            info!(prediction_class = %result.label, "interactive prediction");
            display::print_result(output, &result, show_probabilities)?;
            Ok(())
        }
        Err(InferenceError::ModelNotReady { reason }) => {
            anyhow::bail!("model not ready: {reason}")
        }
        Err(e @ InferenceError::PredictionFailed(_)) => {
            warn!(error = %e, "interactive prediction failed");
            display::print_prediction_failure(output, &e)?;
            Ok(())
        }
    }
}
