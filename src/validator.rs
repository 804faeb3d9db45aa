//! Pure, I/O-free validation of identifiers and paths (spec §4.1).
//!
//! Every function here either returns a normalized value or a specific
//! [`ValidationError`] variant — never a generic failure, per spec §7.

use crate::error::ValidationError;

/// Minimum byte length for a document `_id` (an empty id is meaningless).
pub const ID_MIN_LEN: usize = 1;
/// Maximum byte length for a document `_id`. Chosen to leave headroom under
/// common filesystem path-component limits once the `.json` suffix and any
/// collection prefix are appended.
pub const ID_MAX_LEN: usize = 255;

/// Minimum byte length for a `collectionPath` (the empty string is valid —
/// it denotes the root collection).
pub const COLLECTION_PATH_MIN_LEN: usize = 0;
/// Maximum byte length for a `collectionPath`.
pub const COLLECTION_PATH_MAX_LEN: usize = 255;

/// Maximum byte length for a working-directory path.
pub const WORKING_DIR_MAX_LEN: usize = 1024;

const FORBIDDEN_CHARS: [char; 8] = ['<', '>', ':', '"', '|', '?', '*', '\0'];

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Normalizes a `collectionPath` to either `""` or a form that does not
/// start with `/` and always ends with `/`. Backslash and yen-sign path
/// separators are converted to `/` first, mirroring spec §4.1.
pub fn normalize_collection_path(path: &str) -> String {
    let mut normalized: String = path
        .chars()
        .map(|c| if c == '\\' || c == '¥' { '/' } else { c })
        .collect();

    while normalized.starts_with('/') {
        normalized.remove(0);
    }

    if normalized.is_empty() {
        return normalized;
    }

    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    normalized
}

/// Validates a (already-normalized) `collectionPath`.
pub fn validate_collection_path(path: &str) -> Result<(), ValidationError> {
    let len = path.len();
    if !(COLLECTION_PATH_MIN_LEN..=COLLECTION_PATH_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidCollectionPathLength {
            len,
            min: COLLECTION_PATH_MIN_LEN,
            max: COLLECTION_PATH_MAX_LEN,
        });
    }

    if path.is_empty() {
        return Ok(());
    }

    if path.starts_with('/') || path.starts_with('_') {
        return Err(ValidationError::InvalidCollectionPathCharacter {
            path: path.to_string(),
        });
    }

    if contains_forbidden_char(path) {
        return Err(ValidationError::InvalidCollectionPathCharacter {
            path: path.to_string(),
        });
    }

    for component in path.split('/').filter(|c| !c.is_empty()) {
        if !is_valid_path_component(component) {
            return Err(ValidationError::InvalidCollectionPathCharacter {
                path: path.to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a document `_id` per spec §3 and §4.1.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    let len = id.len();
    if !(ID_MIN_LEN..=ID_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidIdLength {
            len,
            min: ID_MIN_LEN,
            max: ID_MAX_LEN,
        });
    }

    if id.starts_with('_') || id.starts_with('/') || id.ends_with('/') {
        return Err(ValidationError::InvalidIdCharacter { id: id.to_string() });
    }

    if contains_forbidden_char(id) {
        return Err(ValidationError::InvalidIdCharacter { id: id.to_string() });
    }

    for component in id.split('/') {
        if !is_valid_path_component(component) {
            return Err(ValidationError::InvalidIdCharacter { id: id.to_string() });
        }
    }

    Ok(())
}

/// Validates a property name appearing in a document body: only `_id` and
/// `_deleted` may start with an underscore.
pub fn validate_property_name(name: &str) -> Result<(), ValidationError> {
    if name.starts_with('_') && name != "_id" && name != "_deleted" {
        return Err(ValidationError::InvalidPropertyNameInDocument {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Recursively validates every top-level and nested property name of a JSON
/// object per spec §4.1 (the rule applies at every nesting level).
pub fn validate_document_property_names(value: &serde_json::Value) -> Result<(), ValidationError> {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                validate_property_name(k)?;
                validate_document_property_names(v)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                validate_document_property_names(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn validate_working_dir_path(path: &str) -> Result<(), ValidationError> {
    let len = path.len();
    if len > WORKING_DIR_MAX_LEN {
        return Err(ValidationError::InvalidWorkingDirectoryPathLength {
            len,
            max: WORKING_DIR_MAX_LEN,
        });
    }
    Ok(())
}

pub fn validate_db_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::UndefinedDatabaseName);
    }
    if contains_forbidden_char(name) || name.contains('/') {
        return Err(ValidationError::InvalidDbNameCharacter {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn contains_forbidden_char(s: &str) -> bool {
    s.chars().any(|c| FORBIDDEN_CHARS.contains(&c))
}

fn is_valid_path_component(component: &str) -> bool {
    if component.is_empty() || component == "." || component == ".." {
        return false;
    }
    if component.ends_with('.') || component.ends_with(' ') {
        return false;
    }
    let upper = component.to_ascii_uppercase();
    let stem = upper.split('.').next().unwrap_or(&upper);
    if RESERVED_WINDOWS_NAMES.contains(&stem) {
        return false;
    }
    !contains_forbidden_char(component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes_and_leading_slash() {
        assert_eq!(normalize_collection_path(""), "");
        assert_eq!(normalize_collection_path("yoshino"), "yoshino/");
        assert_eq!(normalize_collection_path("/yoshino"), "yoshino/");
        assert_eq!(normalize_collection_path("yoshino\\sub"), "yoshino/sub/");
        assert_eq!(normalize_collection_path("yoshino/"), "yoshino/");
    }

    #[test]
    fn rejects_ids_with_leading_underscore_or_slash() {
        assert!(validate_id("_private").is_err());
        assert!(validate_id("/abs").is_err());
        assert!(validate_id("trailing/").is_err());
        assert!(validate_id("nara").is_ok());
        assert!(validate_id("yoshino/mt_yoshino").is_ok());
    }

    #[test]
    fn rejects_forbidden_filename_characters() {
        assert!(validate_id("bad<name").is_err());
        assert!(validate_id("bad:name").is_err());
        assert!(validate_id("CON").is_err());
        assert!(validate_id("trailing.").is_err());
    }

    #[test]
    fn property_names_allow_only_id_and_deleted_underscore_prefix() {
        assert!(validate_property_name("_id").is_ok());
        assert!(validate_property_name("_deleted").is_ok());
        assert!(validate_property_name("_secret").is_err());
        assert!(validate_property_name("flower").is_ok());
    }

    #[test]
    fn validates_nested_property_names() {
        let doc = serde_json::json!({"_id": "a", "nested": {"_bad": 1}});
        assert!(validate_document_property_names(&doc).is_err());
    }
}
