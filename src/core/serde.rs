use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::core::Error;

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Parses a TOML document into any deserializable type
pub fn from_toml<T>(text: &str) -> crate::core::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    toml::from_str(text).map_err(|e| Error::config(format!("Invalid configuration: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        pause: Duration,
    }

    #[test]
    fn test_duration_serialization() {
        let original = Test {
            pause: Duration::from_millis(10),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"pause":0.01}"#);
        let deserialized: Test = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.pause, original.pause);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: std::result::Result<Test, _> = serde_json::from_str(r#"{"pause":-1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml_reports_config_error() {
        let err = from_toml::<Test>("pause = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
