//! Arrow schema for the single-row feature table the pipeline consumes.

use arrow::datatypes::{DataType, Field, Schema};

pub const DOSAGE_MG: &str = "dosage_mg";
pub const DRUG_CLASS: &str = "drug_class";
pub const INDICATIONS: &str = "indications";
pub const SIDE_EFFECTS: &str = "side_effects";
pub const CONTRAINDICATIONS: &str = "contraindications";
pub const WARNINGS: &str = "warnings";
pub const APPROVAL_STATUS: &str = "approval_status";
pub const DAYS_UNTIL_EXPIRY: &str = "days_until_expiry";
/// Training-time alias for [`DAYS_UNTIL_EXPIRY`]; holds the same day count.
pub const EXPIRY_DATE: &str = "expiry_date";

/// Text feature columns, in feature-row order.
pub const TEXT_COLUMNS: [&str; 6] = [
    DRUG_CLASS,
    INDICATIONS,
    SIDE_EFFECTS,
    CONTRAINDICATIONS,
    WARNINGS,
    APPROVAL_STATUS,
];

/// Every feature-row column, in the order used at training time.
pub const FEATURE_COLUMNS: [&str; 9] = [
    DOSAGE_MG,
    DRUG_CLASS,
    INDICATIONS,
    SIDE_EFFECTS,
    CONTRAINDICATIONS,
    WARNINGS,
    APPROVAL_STATUS,
    DAYS_UNTIL_EXPIRY,
    EXPIRY_DATE,
];

/// Schema of the feature row.
pub fn feature_row_schema() -> Schema {
    Schema::new(vec![
        Field::new(DOSAGE_MG, DataType::Float64, false),
        Field::new(DRUG_CLASS, DataType::Utf8, false),
        Field::new(INDICATIONS, DataType::Utf8, false),
        Field::new(SIDE_EFFECTS, DataType::Utf8, false),
        Field::new(CONTRAINDICATIONS, DataType::Utf8, false),
        Field::new(WARNINGS, DataType::Utf8, false),
        Field::new(APPROVAL_STATUS, DataType::Utf8, false),
        Field::new(DAYS_UNTIL_EXPIRY, DataType::Int64, false),
        Field::new(EXPIRY_DATE, DataType::Int64, false),
    ])
}
