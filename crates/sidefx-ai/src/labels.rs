//! Label decoder: maps encoded class indices back to severity names.
//!
//! The decoder's class order is canonical. Index `i` of the model's output
//! and index `i` of a probability vector both refer to `classes[i]`. The
//! persisted form is a JSON object `{"classes": ["Mild", "Moderate", ...]}`,
//! i.e. the fitted encoder's `classes_` in order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing label decoder: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label decoder has no classes")]
    Empty,

    #[error("label decoder lists class {0:?} more than once")]
    Duplicate(String),
}

/// Ordered set of class labels known to the trained model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct DecoderFile {
    classes: Vec<String>,
}

impl LabelDecoder {
    /// Build a decoder from classes in encoded order.
    pub fn from_classes<I, S>(classes: I) -> Result<Self, DecoderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(DecoderError::Empty);
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for class in &classes {
            if !seen.insert(class.as_str()) {
                return Err(DecoderError::Duplicate(class.clone()));
            }
        }
        Ok(Self { classes })
    }

    /// Parse the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self, DecoderError> {
        let file: DecoderFile = serde_json::from_str(json)?;
        Self::from_classes(file.classes)
    }

    /// Load the persisted JSON form from disk.
    pub fn load(path: &Path) -> Result<Self, DecoderError> {
        let json = std::fs::read_to_string(path).map_err(|source| DecoderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Label for an encoded class index.
    pub fn decode(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
    }

    /// Classes in canonical (encoded) order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn decodes_by_encoded_index() {
        let decoder = LabelDecoder::from_classes(["Mild", "Moderate", "Severe"]).unwrap();
        assert_eq!(decoder.decode(0), Some("Mild"));
        assert_eq!(decoder.decode(2), Some("Severe"));
    }

    #[test]
    fn order_comes_from_the_decoder_not_a_fixed_table() {
        // An encoder fitted on other data can order classes differently.
        let decoder = LabelDecoder::from_classes(["Severe", "Mild", "Moderate"]).unwrap();
        assert_eq!(decoder.decode(0), Some("Severe"));
        assert_eq!(decoder.decode(1), Some("Mild"));
    }

    #[test]
    fn out_of_range_index_is_none() {
        let decoder = LabelDecoder::from_classes(["Mild", "Severe"]).unwrap();
        assert_eq!(decoder.decode(2), None);
        assert_eq!(decoder.decode(-1), None);
    }

    #[test]
    fn rejects_empty_and_duplicate_classes() {
        assert!(matches!(
            LabelDecoder::from_classes(Vec::<String>::new()),
            Err(DecoderError::Empty)
        ));
        assert!(matches!(
            LabelDecoder::from_classes(["Mild", "Mild"]),
            Err(DecoderError::Duplicate(c)) if c == "Mild"
        ));
    }

    #[test]
    fn parses_json_form() {
        let decoder =
            LabelDecoder::from_json(r#"{"classes": ["Mild", "Moderate", "Severe"]}"#).unwrap();
        assert_eq!(decoder.classes(), &["Mild", "Moderate", "Severe"]);
        assert_eq!(decoder.len(), 3);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            LabelDecoder::from_json(r#"["Mild"]"#),
            Err(DecoderError::Json(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"classes": ["Mild", "Severe"]}"#).unwrap();
        let decoder = LabelDecoder::load(f.path()).unwrap();
        assert_eq!(decoder.decode(1), Some("Severe"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = LabelDecoder::load(Path::new("/nonexistent/label_encoder.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/label_encoder.json"));
    }
}
