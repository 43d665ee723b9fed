use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required fields are not provided: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("field '{field}' is not a valid path segment: {reason}")]
    InvalidSegment {
        field: &'static str,
        reason: &'static str,
    },

    #[error("file part 'file' is missing")]
    MissingFile,

    #[error("file exceeds maximum allowed size of {max} bytes")]
    FileTooLarge { max: usize },

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("failed to buffer upload: {0}")]
    Spool(String),
}

/// Checks that `value` can be used verbatim as one directory or file name.
pub fn check_path_segment(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value == "." || value == ".." {
        return Err("must not be a relative directory reference");
    }
    if value.contains('/') || value.contains('\\') {
        return Err("must not contain path separators");
    }
    if value.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters");
    }
    if value.len() > 255 {
        return Err("must be at most 255 bytes");
    }
    Ok(())
}

pub fn validate_segment(field: &'static str, value: &str) -> Result<(), ValidationError> {
    check_path_segment(value).map_err(|reason| ValidationError::InvalidSegment { field, reason })
}

/// Required form fields, checked in the order clients are told about them.
pub fn validate_fields(
    key: Option<&str>,
    origin: Option<&str>,
    file_name: Option<&str>,
) -> Result<(), ValidationError> {
    let missing: Vec<&'static str> = [("key", key), ("origin", origin), ("fileName", file_name)]
        .into_iter()
        .filter(|(_, v)| v.is_none_or(str::is_empty))
        .map(|(name, _)| name)
        .collect();

    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    validate_segment("key", key.unwrap_or_default())?;
    validate_segment("origin", origin.unwrap_or_default())?;
    validate_segment("fileName", file_name.unwrap_or_default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path_segment() {
        assert!(check_path_segment("photo.jpg").is_ok());
        assert!(check_path_segment("abc123").is_ok());
        assert!(check_path_segment("фото.png").is_ok());

        assert!(check_path_segment("").is_err());
        assert!(check_path_segment(".").is_err());
        assert!(check_path_segment("..").is_err());
        assert!(check_path_segment("../etc").is_err());
        assert!(check_path_segment("a\\b").is_err());
        assert!(check_path_segment("a\0b").is_err());
        assert!(check_path_segment(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_validate_fields_reports_all_missing() {
        let err = validate_fields(Some("abc"), None, Some("")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["origin", "fileName"])
        );
        assert_eq!(
            err.to_string(),
            "required fields are not provided: origin, fileName"
        );
    }

    #[test]
    fn test_validate_fields_names_bad_segment() {
        let err = validate_fields(Some("abc"), Some("albums"), Some("../x")).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidSegment { field: "fileName", .. }
        ));
    }

    #[test]
    fn test_validate_fields_ok() {
        assert!(validate_fields(Some("abc123"), Some("albums"), Some("photo.jpg")).is_ok());
    }
}
