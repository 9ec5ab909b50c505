//! Mint url

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{ParseError, Url};

use crate::ensure_pocket;

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] ParseError),
    /// Invalid URL structure
    #[error("Invalid URL")]
    InvalidUrl,
}

/// Normalized mint url
///
/// Scheme and host are lowercased and any trailing slash is dropped so that
/// two spellings of the same mint compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MintUrl(String);

impl Serialize for MintUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MintUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl MintUrl {
    fn format_url(url: &str) -> Result<String, Error> {
        ensure_pocket!(!url.is_empty(), Error::InvalidUrl);

        let url = url.trim_end_matches('/');
        let protocol = url
            .split("://")
            .nth(0)
            .ok_or(Error::InvalidUrl)?
            .to_lowercase();
        let host = url
            .split("://")
            .nth(1)
            .ok_or(Error::InvalidUrl)?
            .split('/')
            .nth(0)
            .ok_or(Error::InvalidUrl)?
            .to_lowercase();
        let path = url
            .split("://")
            .nth(1)
            .ok_or(Error::InvalidUrl)?
            .split('/')
            .skip(1)
            .collect::<Vec<&str>>()
            .join("/");
        let mut formatted_url = format!("{protocol}://{host}");
        if !path.is_empty() {
            formatted_url.push_str(&format!("/{path}"));
        }
        Ok(formatted_url)
    }

    /// Join a path onto the url
    pub fn join(&self, path: &str) -> Result<Url, Error> {
        let url = Url::parse(&self.0)?;
        let mut url = url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::InvalidUrl)?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let formatted_url = Self::format_url(url)?;
        Url::from_str(&formatted_url)?;
        Ok(Self(formatted_url))
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_slashes() {
        let very_unformatted_url = "http://url-to-check.com////";
        let formatted_url = "http://url-to-check.com";
        let very_trimmed_url = MintUrl::from_str(very_unformatted_url).unwrap();
        assert_eq!(formatted_url, very_trimmed_url.to_string());
    }

    #[test]
    fn test_case_insensitive_host() {
        let mixed_case = "HTTPS://Mint.Example.COM/Path/To";
        let parsed = MintUrl::from_str(mixed_case).unwrap();
        assert_eq!("https://mint.example.com/Path/To", parsed.to_string());
    }

    #[test]
    fn test_join_path() {
        let url = MintUrl::from_str("https://mint.example.com").unwrap();
        let joined = url.join("v1/checkstate").unwrap();
        assert_eq!("https://mint.example.com/v1/checkstate", joined.as_str());
    }

    #[test]
    fn test_invalid_url() {
        assert!(MintUrl::from_str("").is_err());
        assert!(MintUrl::from_str("not-a-url").is_err());
    }
}
