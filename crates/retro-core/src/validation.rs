use std::collections::HashSet;
use std::num::NonZeroU32;

use crate::board::Column;
use crate::error::ValidationError;

pub const MAX_CONTENT_CHARS: usize = 5000;
pub const MAX_NAME_CHARS: usize = 200;
pub const MAX_ALIAS_CHARS: usize = 50;
pub const MAX_COLUMN_ID_CHARS: usize = 64;

/// Validator for user-supplied fields.
pub struct Validator;

impl Validator {
    /// Validate card content. Must be non-blank, max 5000 chars.
    pub fn validate_content(content: &str) -> Result<(), ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let len = content.chars().count();
        if len > MAX_CONTENT_CHARS {
            return Err(ValidationError::ContentTooLong(len));
        }
        Ok(())
    }

    /// Validate a board or column name. Returns the trimmed name.
    pub fn validate_name(name: &str) -> Result<String, ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidName("name cannot be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::InvalidName(format!(
                "name too long (max {})",
                MAX_NAME_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Validate a display alias. Returns the trimmed alias.
    pub fn validate_alias(alias: &str) -> Result<String, ValidationError> {
        let trimmed = alias.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidAlias(
                "alias cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_ALIAS_CHARS {
            return Err(ValidationError::InvalidAlias(format!(
                "alias too long (max {})",
                MAX_ALIAS_CHARS
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ValidationError::InvalidAlias(
                "alias contains control characters".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// Validate a column id.
    /// Must be non-empty, max 64 chars, and only contain [a-zA-Z0-9_-].
    pub fn validate_column_id(id: &str) -> Result<(), ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::InvalidColumn(
                "column id cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_COLUMN_ID_CHARS {
            return Err(ValidationError::InvalidColumn(format!(
                "column id too long: {} chars (max {})",
                id.len(),
                MAX_COLUMN_ID_CHARS
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidColumn(format!(
                "column id contains invalid characters: {}",
                id
            )));
        }
        Ok(())
    }

    /// Validate a board's column list: valid, unique ids and valid names.
    pub fn validate_columns(columns: &[Column]) -> Result<Vec<Column>, ValidationError> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(columns.len());
        for column in columns {
            Self::validate_column_id(&column.id)?;
            if !seen.insert(column.id.as_str()) {
                return Err(ValidationError::InvalidColumn(format!(
                    "duplicate column id: {}",
                    column.id
                )));
            }
            let name = Self::validate_name(&column.name)?;
            validated.push(Column::new(column.id.clone(), name));
        }
        Ok(validated)
    }

    /// Convert a submitted per-user limit. `None` means unlimited; zero is rejected.
    pub fn validate_limit(
        field: &'static str,
        limit: Option<u32>,
    ) -> Result<Option<NonZeroU32>, ValidationError> {
        match limit {
            None => Ok(None),
            Some(n) => NonZeroU32::new(n)
                .map(Some)
                .ok_or(ValidationError::InvalidLimit(field)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_content() {
        assert!(Validator::validate_content("Standups ran long").is_ok());
        assert!(Validator::validate_content(&"a".repeat(5000)).is_ok());
    }

    #[test]
    fn test_invalid_content() {
        assert_eq!(
            Validator::validate_content("   "),
            Err(ValidationError::EmptyContent)
        );
        assert_eq!(
            Validator::validate_content(&"a".repeat(5001)),
            Err(ValidationError::ContentTooLong(5001))
        );
    }

    #[test]
    fn test_alias_is_trimmed() {
        assert_eq!(Validator::validate_alias("  Ada ").unwrap(), "Ada");
        assert!(Validator::validate_alias("").is_err());
        assert!(Validator::validate_alias("bad\nalias").is_err());
        assert!(Validator::validate_alias(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_column_ids() {
        assert!(Validator::validate_column_id("went_well").is_ok());
        assert!(Validator::validate_column_id("col-2").is_ok());
        assert!(Validator::validate_column_id("").is_err());
        assert!(Validator::validate_column_id("with space").is_err());
        assert!(Validator::validate_column_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let columns = vec![Column::new("a", "First"), Column::new("a", "Second")];
        assert!(Validator::validate_columns(&columns).is_err());
    }

    #[test]
    fn test_limits() {
        assert_eq!(Validator::validate_limit("card_limit", None), Ok(None));
        assert_eq!(
            Validator::validate_limit("card_limit", Some(2)),
            Ok(NonZeroU32::new(2))
        );
        assert_eq!(
            Validator::validate_limit("card_limit", Some(0)),
            Err(ValidationError::InvalidLimit("card_limit"))
        );
    }
}
