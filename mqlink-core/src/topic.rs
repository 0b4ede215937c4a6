//! Topic name and topic filter checks.
//!
//! Names are what a message is published to and may not carry wildcards.
//! Filters are what a subscription matches and may use `+` for one level or a
//! trailing `#` for any number of levels.

use thiserror::Error;

/// Longest topic the wire format can carry (UTF-8 bytes).
pub const MAX_TOPIC_LENGTH: usize = 65535;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicValidationError {
    #[error("topic cannot be empty")]
    Empty,

    #[error("topic exceeds {MAX_TOPIC_LENGTH} bytes")]
    TooLong,

    #[error("topic cannot contain a null character")]
    ContainsNullChar,

    #[error("wildcards (+, #) are not allowed in a topic name")]
    WildcardInPublishTopic,

    #[error("'+' must occupy a whole topic level")]
    InvalidSingleLevelWildcard,

    #[error("'#' must be the last character and occupy a whole topic level")]
    InvalidMultiLevelWildcard,
}

fn check_common(topic: &str) -> Result<(), TopicValidationError> {
    if topic.is_empty() {
        return Err(TopicValidationError::Empty);
    }

    if topic.len() > MAX_TOPIC_LENGTH {
        return Err(TopicValidationError::TooLong);
    }

    if topic.contains('\0') {
        return Err(TopicValidationError::ContainsNullChar);
    }

    Ok(())
}

/// Checks a topic a message can be published to.
pub fn validate_topic_name(topic: &str) -> Result<(), TopicValidationError> {
    check_common(topic)?;

    if topic.contains(['+', '#']) {
        return Err(TopicValidationError::WildcardInPublishTopic);
    }

    Ok(())
}

/// Checks a subscription filter.
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicValidationError> {
    check_common(filter)?;

    let mut levels = filter.split('/').peekable();

    while let Some(level) = levels.next() {
        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return Err(TopicValidationError::InvalidMultiLevelWildcard);
        }

        if level.contains('+') && level != "+" {
            return Err(TopicValidationError::InvalidSingleLevelWildcard);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_accepts_plain_levels() {
        assert_eq!(validate_topic_name("sensors/kitchen/temp"), Ok(()));
        assert_eq!(validate_topic_name("/leading/slash"), Ok(()));
        assert_eq!(validate_topic_name("trailing/"), Ok(()));
        assert_eq!(validate_topic_name("a//b"), Ok(()));
    }

    #[test]
    fn test_topic_name_rejects() {
        assert_eq!(validate_topic_name(""), Err(TopicValidationError::Empty));
        assert_eq!(
            validate_topic_name("a/+/b"),
            Err(TopicValidationError::WildcardInPublishTopic)
        );
        assert_eq!(
            validate_topic_name("a/#"),
            Err(TopicValidationError::WildcardInPublishTopic)
        );
        assert_eq!(
            validate_topic_name("a\0b"),
            Err(TopicValidationError::ContainsNullChar)
        );

        let long = "x".repeat(MAX_TOPIC_LENGTH + 1);
        assert_eq!(validate_topic_name(&long), Err(TopicValidationError::TooLong));
    }

    #[test]
    fn test_topic_filter_wildcards() {
        for filter in ["#", "+", "a/#", "a/+/c", "+/+", "/+", "a/b"] {
            assert_eq!(validate_topic_filter(filter), Ok(()), "{}", filter);
        }

        assert_eq!(
            validate_topic_filter("a/#/c"),
            Err(TopicValidationError::InvalidMultiLevelWildcard)
        );
        assert_eq!(
            validate_topic_filter("a#"),
            Err(TopicValidationError::InvalidMultiLevelWildcard)
        );
        assert_eq!(
            validate_topic_filter("a/b+"),
            Err(TopicValidationError::InvalidSingleLevelWildcard)
        );
        assert_eq!(validate_topic_filter(""), Err(TopicValidationError::Empty));
    }
}
