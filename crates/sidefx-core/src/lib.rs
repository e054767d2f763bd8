//! Core types for sidefx: the feature record, its Arrow feature-row schema,
//! expiry derivation, and validation of raw caller input.

pub mod error;
pub mod expiry;
pub mod record;
pub mod schema;
pub mod validate;

pub use error::{ValidationError, ValidationErrors};
pub use expiry::{days_until, derive_days_until_expiry, parse_expiry_date};
pub use record::FeatureRecord;
pub use schema::feature_row_schema;
pub use validate::{INPUT_FIELDS, RawFields, validate};
