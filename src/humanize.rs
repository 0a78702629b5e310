//! Human-readable duration formatting and parsing utilities

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Duration wrapper with human-readable parsing ("15m", "1h30m", "2d")
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub const ZERO: HumanDuration = HumanDuration(Duration::ZERO);

    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_human_readable(&self) -> String {
        const UNITS: &[(&str, u64)] = &[("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)];

        let mut secs = self.0.as_secs();
        let millis = self.0.subsec_millis();
        if secs == 0 {
            return format!("{}ms", millis);
        }

        let mut out = String::new();
        for &(unit, divisor) in UNITS {
            if secs >= divisor {
                out.push_str(&format!("{}{}", secs / divisor, unit));
                secs %= divisor;
            }
        }
        if millis > 0 {
            out.push_str(&format!("{}ms", millis));
        }
        out
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        HumanDuration(value)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"15m\", \"1h30m\") or seconds as integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_secs(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_secs)
                    .map_err(|_| E::custom(format!("negative duration: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        // Plain number means seconds
        if let Ok(num) = s.parse::<u64>() {
            return Ok(HumanDuration::from_secs(num));
        }
        if s.is_empty() {
            return Err(ParseError::InvalidFormat(s));
        }

        let mut total = Duration::ZERO;
        let mut rest = s.as_str();
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return Err(ParseError::InvalidFormat(s.clone()));
            }
            let num: u64 = rest[..digits].parse()?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];

            let part = match unit {
                "ms" => Duration::from_millis(num),
                "s" => Duration::from_secs(num),
                "m" => Duration::from_secs(num * 60),
                "h" => Duration::from_secs(num * 3_600),
                "d" => Duration::from_secs(num * 86_400),
                "w" => Duration::from_secs(num * 7 * 86_400),
                "" => return Err(ParseError::InvalidFormat(s.clone())),
                other => return Err(ParseError::InvalidUnit(other.to_string())),
            };
            total += part;
        }

        Ok(HumanDuration(total))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!("90".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("30s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(
            "1h30m".parse::<HumanDuration>().unwrap().0,
            Duration::from_secs(90 * 60)
        );
        assert_eq!(
            "2d12h".parse::<HumanDuration>().unwrap().0,
            Duration::from_secs(60 * 3_600)
        );
        assert_eq!("250ms".parse::<HumanDuration>().unwrap().0, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("".parse::<HumanDuration>(), Err(ParseError::InvalidFormat(_))));
        assert!(matches!("m".parse::<HumanDuration>(), Err(ParseError::InvalidFormat(_))));
        assert!(matches!("5y".parse::<HumanDuration>(), Err(ParseError::InvalidUnit(_))));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(HumanDuration::from_secs(900).to_human_readable(), "15m");
        assert_eq!(HumanDuration::from_secs(5_400).to_human_readable(), "1h30m");
        assert_eq!(HumanDuration::ZERO.to_human_readable(), "0ms");
    }

    #[test]
    fn test_deserialize_string() {
        let json = r#"{"period": "15m"}"#;
        #[derive(Deserialize)]
        struct TestStruct {
            period: HumanDuration,
        }
        let parsed: TestStruct = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.period.as_duration(), Duration::from_secs(900));
    }

    #[test]
    fn test_deserialize_number() {
        let json = r#"{"period": 60}"#;
        #[derive(Deserialize)]
        struct TestStruct {
            period: HumanDuration,
        }
        let parsed: TestStruct = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.period.as_duration(), Duration::from_secs(60));
    }
}
