//! Artifact locators
//!
//! A locator is self-describing: the agent can tell from the string alone
//! how to fetch the bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::task::DistributionMethod;
use crate::error::{Error, Result};

const INLINE_SCHEME: &str = "inline://";
const SHARED_SCHEME: &str = "shared://";

/// Where an agent fetches artifact bytes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactLocator {
    /// Base64 blob stored in the coordination store under `artifact:blob:<name>`
    Inline { name: String },
    /// Absolute path on storage mounted by every node
    Shared { path: PathBuf },
    /// URL served by the controller
    Http { url: String },
}

impl ArtifactLocator {
    pub fn method(&self) -> DistributionMethod {
        match self {
            Self::Inline { .. } => DistributionMethod::Inline,
            Self::Shared { .. } => DistributionMethod::SharedStorage,
            Self::Http { .. } => DistributionMethod::Http,
        }
    }

    /// File name the artifact should be stored under on the receiving side
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Inline { name } => Some(name.clone()),
            Self::Shared { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            Self::Http { url } => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline { name } => write!(f, "{}{}", INLINE_SCHEME, name),
            Self::Shared { path } => write!(f, "{}{}", SHARED_SCHEME, path.display()),
            Self::Http { url } => write!(f, "{}", url),
        }
    }
}

impl FromStr for ArtifactLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(name) = s.strip_prefix(INLINE_SCHEME) {
            if name.is_empty() || name.contains('/') {
                return Err(Error::validation(format!("invalid inline locator '{}'", s)));
            }
            return Ok(Self::Inline {
                name: name.to_string(),
            });
        }

        if let Some(path) = s.strip_prefix(SHARED_SCHEME) {
            let path = PathBuf::from(path);
            if !path.is_absolute() {
                return Err(Error::validation(format!(
                    "shared storage locator must be absolute: '{}'",
                    s
                )));
            }
            return Ok(Self::Shared { path });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::Http { url: s.to_string() });
        }

        Err(Error::validation(format!("unrecognised artifact locator '{}'", s)))
    }
}

impl TryFrom<String> for ArtifactLocator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ArtifactLocator> for String {
    fn from(locator: ArtifactLocator) -> Self {
        locator.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_scheme() {
        let inline: ArtifactLocator = "inline://svc-a.jar_1700".parse().unwrap();
        assert_eq!(inline.method(), DistributionMethod::Inline);
        assert_eq!(inline.file_name().as_deref(), Some("svc-a.jar_1700"));

        let shared: ArtifactLocator = "shared:///mnt/convoy/svc-a.jar".parse().unwrap();
        assert_eq!(
            shared,
            ArtifactLocator::Shared {
                path: PathBuf::from("/mnt/convoy/svc-a.jar")
            }
        );
        assert_eq!(shared.to_string(), "shared:///mnt/convoy/svc-a.jar");

        let http: ArtifactLocator = "http://controller:8080/artifacts/svc-a.jar?x=1"
            .parse()
            .unwrap();
        assert_eq!(http.method(), DistributionMethod::Http);
        assert_eq!(http.file_name().as_deref(), Some("svc-a.jar"));
    }

    #[test]
    fn test_rejects_unknown_locators() {
        assert!("ftp://host/file".parse::<ArtifactLocator>().is_err());
        assert!("shared://relative/path".parse::<ArtifactLocator>().is_err());
        assert!("inline://".parse::<ArtifactLocator>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let locator = ArtifactLocator::Inline {
            name: "svc.jar_1".to_string(),
        };
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"inline://svc.jar_1\"");
        let back: ArtifactLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
        assert!(serde_json::from_str::<ArtifactLocator>("\"bogus\"").is_err());
    }
}
