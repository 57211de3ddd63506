//! Record URIs
//!
//! A record is addressed as `scheme://identity/collection/key`. The identity
//! is supplied by whoever owns the repository and is never interpreted here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::tid::Key;

/// Scheme used when none is configured
pub const DEFAULT_SCHEME: &str = "at";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordUri {
    pub scheme: String,
    pub identity: String,
    pub collection: String,
    pub key: Key,
}

impl RecordUri {
    pub fn new(
        scheme: impl Into<String>,
        identity: impl Into<String>,
        collection: impl Into<String>,
        key: Key,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            identity: identity.into(),
            collection: collection.into(),
            key,
        }
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.scheme, self.identity, self.collection, self.key
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record uri {0:?}")]
pub struct ParseUriError(pub String);

impl FromStr for RecordUri {
    type Err = ParseUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseUriError(s.to_string());
        let (scheme, rest) = s.split_once("://").ok_or_else(err)?;
        // identities may contain ':' (e.g. did:plc:...) but never '/'
        let mut parts = rest.splitn(3, '/');
        let identity = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        let collection = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        let key = parts.next().and_then(Key::parse).ok_or_else(err)?;
        if scheme.is_empty() {
            return Err(err());
        }
        Ok(Self::new(scheme, identity, collection, key))
    }
}

impl Serialize for RecordUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let key = Key::from_parts(1_700_000_000_000_000, 0);
        let uri = RecordUri::new("at", "did:plc:ffion", "com.ffion.status", key);
        let text = uri.to_string();
        assert_eq!(text, format!("at://did:plc:ffion/com.ffion.status/{}", key));
        assert_eq!(text.parse::<RecordUri>().unwrap(), uri);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let key = Key::from_parts(1, 0);
        for bad in [
            "did:plc:ffion/com.ffion.status".to_string(),
            format!("at:///com.ffion.status/{}", key),
            format!("at://did:plc:ffion//{}", key),
            "at://did:plc:ffion/com.ffion.status/not-a-key".to_string(),
            format!("at://did:plc:ffion/com.ffion.status/{}/extra", key),
        ] {
            assert!(bad.parse::<RecordUri>().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_parse_error_is_std_error() {
        let err = "at://nowhere".parse::<RecordUri>().unwrap_err();
        let boxed: Box<dyn std::error::Error> = Box::new(err.clone());
        assert_eq!(boxed.to_string(), "malformed record uri \"at://nowhere\"");
        assert_eq!(err, ParseUriError("at://nowhere".to_string()));
    }
}
