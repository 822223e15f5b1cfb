//! Language codes used to key recognizers, routing sets, and caption state.
//!
//! The set of supported codes is closed only by configuration, not by the
//! type system: which languages exist is decided at `RecognizerBank`
//! construction time from whichever acoustic models load successfully.

use std::fmt;
use std::sync::Arc;

/// A language identifier such as `"en"`, `"es"`, `"fr"`.
///
/// Cheaply cloneable (an `Arc<str>` under the hood) so it can be used as a
/// map key and passed around event payloads without re-allocating.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct LanguageCode(Arc<str>);

impl LanguageCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(Arc::from(code.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LanguageCode({:?})", self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LanguageCode {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl serde::Serialize for LanguageCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for LanguageCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
