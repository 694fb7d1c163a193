use serde_json::Value;
use thiserror::Error;

/// Field naming the headword of a record
pub const WORD_FIELD: &str = "word";

/// Field naming the shard a record belongs to
pub const SHARD_FIELD: &str = "letter";

/// Shard keys that would collide with the stats file or the crawl state files
pub const RESERVED_SHARDS: [&str; 3] = ["stats", "progress", "failed_urls"];

/// Reasons a record is rejected before aggregation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' is not a string")]
    NotAString(&'static str),

    #[error("shard key '{0}' cannot be used as a file name")]
    InvalidShardKey(String),
}

/// Validates a record and returns its shard key
///
/// A record is accepted when it is an object whose `word` and `letter`
/// fields are non-empty strings and whose `letter` is usable as a file
/// stem.
///
/// # Examples
///
/// ```
/// use dict_harvester::output::validate;
/// use serde_json::json;
///
/// assert_eq!(validate(&json!({"word": "apple", "letter": "a"})).unwrap(), "a");
/// assert!(validate(&json!({"letter": "a"})).is_err());
/// ```
pub fn validate(record: &Value) -> Result<String, ValidationError> {
    let object = record.as_object().ok_or(ValidationError::NotAnObject)?;

    required_string(object, WORD_FIELD)?;
    let letter = required_string(object, SHARD_FIELD)?;

    check_shard_key(letter)?;
    Ok(letter.to_string())
}

fn required_string<'a>(
    object: &'a serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::NotAString(field)),
    }
}

fn check_shard_key(key: &str) -> Result<(), ValidationError> {
    let unusable = key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || RESERVED_SHARDS
            .iter()
            .any(|reserved| key.eq_ignore_ascii_case(reserved));

    if unusable {
        return Err(ValidationError::InvalidShardKey(key.to_string()));
    }
    Ok(())
}
