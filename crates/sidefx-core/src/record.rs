use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::schema::feature_row_schema;

/// One validated drug record, ready for classification.
///
/// Built fresh per request and never mutated. `days_until_expiry` is always
/// derived from a calendar date; no caller supplies it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    dosage_mg: f64,
    drug_class: String,
    indications: String,
    side_effects: String,
    contraindications: String,
    warnings: String,
    approval_status: String,
    days_until_expiry: i64,
}

impl FeatureRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dosage_mg: f64,
        drug_class: impl Into<String>,
        indications: impl Into<String>,
        side_effects: impl Into<String>,
        contraindications: impl Into<String>,
        warnings: impl Into<String>,
        approval_status: impl Into<String>,
        days_until_expiry: i64,
    ) -> Self {
        Self {
            dosage_mg,
            drug_class: drug_class.into(),
            indications: indications.into(),
            side_effects: side_effects.into(),
            contraindications: contraindications.into(),
            warnings: warnings.into(),
            approval_status: approval_status.into(),
            days_until_expiry,
        }
    }

    pub fn dosage_mg(&self) -> f64 {
        self.dosage_mg
    }

    pub fn drug_class(&self) -> &str {
        &self.drug_class
    }

    pub fn indications(&self) -> &str {
        &self.indications
    }

    pub fn side_effects(&self) -> &str {
        &self.side_effects
    }

    pub fn contraindications(&self) -> &str {
        &self.contraindications
    }

    pub fn warnings(&self) -> &str {
        &self.warnings
    }

    pub fn approval_status(&self) -> &str {
        &self.approval_status
    }

    pub fn days_until_expiry(&self) -> i64 {
        self.days_until_expiry
    }

    /// Text features in feature-row order.
    pub fn text_features(&self) -> [&str; 6] {
        [
            &self.drug_class,
            &self.indications,
            &self.side_effects,
            &self.contraindications,
            &self.warnings,
            &self.approval_status,
        ]
    }

    /// Build the single-row feature table.
    ///
    /// The day count is written to both `days_until_expiry` and its
    /// `expiry_date` alias.
    pub fn to_feature_row(&self) -> Result<RecordBatch, ArrowError> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(9);
        columns.push(Arc::new(Float64Array::from(vec![self.dosage_mg])));
        for text in self.text_features() {
            columns.push(Arc::new(StringArray::from(vec![text])));
        }
        columns.push(Arc::new(Int64Array::from(vec![self.days_until_expiry])));
        columns.push(Arc::new(Int64Array::from(vec![self.days_until_expiry])));

        RecordBatch::try_new(Arc::new(feature_row_schema()), columns)
    }
}
