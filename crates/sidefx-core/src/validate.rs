//! Validation of raw caller input into a [`FeatureRecord`].
//!
//! Presence of every field is checked first and all missing fields are
//! reported together. Format checks (dosage number, expiry date) only run
//! when nothing is missing, and they too report every failure at once.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::{ValidationError, ValidationErrors};
use crate::expiry::derive_days_until_expiry;
use crate::record::FeatureRecord;
use crate::schema::{
    APPROVAL_STATUS, CONTRAINDICATIONS, DOSAGE_MG, DRUG_CLASS, EXPIRY_DATE, INDICATIONS,
    SIDE_EFFECTS, WARNINGS,
};

/// Raw caller input: field name → unparsed string value.
pub type RawFields = BTreeMap<String, String>;

/// Fields a caller must supply, in prompt order.
///
/// `expiry_date` here is the calendar date string; the feature row's
/// `expiry_date` column is the derived day count.
pub const INPUT_FIELDS: [&str; 8] = [
    DOSAGE_MG,
    DRUG_CLASS,
    INDICATIONS,
    SIDE_EFFECTS,
    CONTRAINDICATIONS,
    WARNINGS,
    APPROVAL_STATUS,
    EXPIRY_DATE,
];

/// Turn raw caller input into a [`FeatureRecord`].
///
/// `reference_now` anchors the days-until-expiry derivation. Any
/// `days_until_expiry` key in `raw` is ignored.
pub fn validate(
    raw: &RawFields,
    reference_now: NaiveDateTime,
) -> Result<FeatureRecord, ValidationErrors> {
    let missing: Vec<ValidationError> = INPUT_FIELDS
        .iter()
        .filter(|name| present(raw, name).is_none())
        .map(|name| ValidationError::MissingField(name.to_string()))
        .collect();
    if let Some(errors) = ValidationErrors::from_vec(missing) {
        debug!(%errors, "rejected input with missing fields");
        return Err(errors);
    }

    let mut problems = Vec::new();

    let dosage = parse_dosage(&raw[DOSAGE_MG]);
    if let Err(e) = &dosage {
        problems.push(e.clone());
    }

    let days = derive_days_until_expiry(&raw[EXPIRY_DATE], reference_now);
    if let Err(e) = &days {
        problems.push(e.clone());
    }

    if let Some(errors) = ValidationErrors::from_vec(problems) {
        debug!(%errors, "rejected malformed input");
        return Err(errors);
    }

    match (dosage, days) {
        (Ok(dosage_mg), Ok(days_until_expiry)) => Ok(FeatureRecord::new(
            dosage_mg,
            text(raw, DRUG_CLASS),
            text(raw, INDICATIONS),
            text(raw, SIDE_EFFECTS),
            text(raw, CONTRAINDICATIONS),
            text(raw, WARNINGS),
            text(raw, APPROVAL_STATUS),
            days_until_expiry,
        )),
        (Err(e), _) | (_, Err(e)) => Err(e.into()),
    }
}

/// The trimmed value of `name`, if present and non-blank.
fn present<'a>(raw: &'a RawFields, name: &str) -> Option<&'a str> {
    raw.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// A text field already known to be present.
fn text(raw: &RawFields, name: &str) -> String {
    present(raw, name).unwrap_or_default().to_string()
}

fn parse_dosage(raw: &str) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::InvalidNumber {
        field: DOSAGE_MG.to_string(),
        raw: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value)
}
