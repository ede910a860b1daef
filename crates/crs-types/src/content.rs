use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The broad shape of an ingested payload.
///
/// Kind drives placement: binary payloads are routed by size, while text and
/// structured payloads prefer the general memory pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// UTF-8 text (documents, transcripts).
    Text,
    /// Opaque bytes (images, audio, video, archives).
    Binary,
    /// Structured data, canonicalized to JSON before hashing.
    Structured,
}

impl ContentKind {
    /// All kinds, in declaration order.
    pub const ALL: [ContentKind; 3] = [Self::Text, Self::Binary, Self::Structured];

    /// Returns `true` for [`ContentKind::Binary`].
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary)
    }

    /// The serialization format a payload of this kind is stored in.
    pub fn default_format(&self) -> PayloadFormat {
        match self {
            Self::Text => PayloadFormat::Utf8,
            Self::Binary => PayloadFormat::Raw,
            Self::Structured => PayloadFormat::CanonicalJson,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
            Self::Structured => write!(f, "structured"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "binary" => Ok(Self::Binary),
            "structured" | "json" => Ok(Self::Structured),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// Serialization format tag recorded alongside the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Bytes stored exactly as given.
    Raw,
    /// UTF-8 encoded text.
    Utf8,
    /// Compact JSON with sorted object keys.
    CanonicalJson,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Utf8 => write!(f, "utf-8"),
            Self::CanonicalJson => write!(f, "canonical-json"),
        }
    }
}

/// Facts about a payload, attached once at ingestion and never changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Size of the stored (canonical) payload in bytes.
    pub size_bytes: u64,
    /// Content kind declared by the caller.
    pub kind: ContentKind,
    /// Declared unit count, e.g. tokens, when the caller knows it.
    pub unit_count: Option<u64>,
    /// Milliseconds since UNIX epoch at first ingestion.
    pub created_at_ms: u64,
    /// How the payload bytes are encoded.
    pub format: PayloadFormat,
    /// Durable payloads are demoted to disk instead of discarded.
    pub durable: bool,
}

impl ContextMetadata {
    /// Metadata with the kind's default format and no unit count.
    pub fn new(kind: ContentKind, size_bytes: u64, created_at_ms: u64) -> Self {
        Self {
            size_bytes,
            kind,
            unit_count: None,
            created_at_ms,
            format: kind.default_format(),
            durable: false,
        }
    }

    pub fn with_unit_count(mut self, units: u64) -> Self {
        self.unit_count = Some(units);
        self
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("TEXT".parse::<ContentKind>().unwrap(), ContentKind::Text);
        assert_eq!("json".parse::<ContentKind>().unwrap(), ContentKind::Structured);
        assert!(matches!(
            "video".parse::<ContentKind>(),
            Err(TypeError::UnknownKind(k)) if k == "video"
        ));
    }

    #[test]
    fn kind_display_matches_parse() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.to_string().parse::<ContentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn default_formats() {
        assert_eq!(ContentKind::Text.default_format(), PayloadFormat::Utf8);
        assert_eq!(ContentKind::Binary.default_format(), PayloadFormat::Raw);
        assert_eq!(
            ContentKind::Structured.default_format(),
            PayloadFormat::CanonicalJson
        );
    }

    #[test]
    fn metadata_builders() {
        let meta = ContextMetadata::new(ContentKind::Text, 42, 1000)
            .with_unit_count(9)
            .with_durable(true);
        assert_eq!(meta.size_bytes, 42);
        assert_eq!(meta.unit_count, Some(9));
        assert_eq!(meta.format, PayloadFormat::Utf8);
        assert!(meta.durable);
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&ContentKind::Structured).unwrap();
        assert_eq!(json, "\"structured\"");
    }
}
