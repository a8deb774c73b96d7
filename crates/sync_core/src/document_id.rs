use crate::record::Record;

/// Why a record could not produce a document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRejection {
    /// The id field is absent or holds a falsy value.
    Missing,
    /// The id field held only characters stripped by sanitization.
    EmptyAfterSanitization,
}

impl IdRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing_id",
            Self::EmptyAfterSanitization => "empty_sanitized_id",
        }
    }
}

/// Keeps only alphanumeric characters (Unicode-aware).
pub fn sanitize_document_id(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_alphanumeric()).collect()
}

/// Derives the document id for `record` from `id_field`.
pub fn derive_document_id(record: &Record, id_field: &str) -> Result<String, IdRejection> {
    let value = match record.get(id_field) {
        Some(value) if !value.is_falsy() => value,
        _ => return Err(IdRejection::Missing),
    };

    let sanitized = sanitize_document_id(&value.to_id_string());
    if sanitized.is_empty() {
        return Err(IdRejection::EmptyAfterSanitization);
    }
    Ok(sanitized)
}
