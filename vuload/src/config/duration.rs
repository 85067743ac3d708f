use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error as _};

/// Parse a duration from either a plain number of seconds (`0.1`, `300`)
/// or a humantime string (`100ms`, `300s`, `5m`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_owned());
    }

    if let Ok(secs) = input.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|err| format!("invalid duration '{input}': {err}"));
    }

    humantime::parse_duration(input).map_err(|err| format!("invalid duration '{input}': {err}"))
}

pub(super) fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(f64),
        Text(String),
    }

    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Seconds(secs)) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(D::Error::custom),
        Some(RawDuration::Text(text)) => parse_duration(&text).map(Some).map_err(D::Error::custom),
    }
}
