use std::collections::BTreeMap;

use serde::Serialize;

/// Stream properties reported by a [`MediaInspector`](super::MediaInspector).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// Bits per second.
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    /// Comma separated codec list, if known.
    pub codecs: Option<String>,
}

/// Attribute key under which codec names are stored.
pub const CODECS_ATTRIBUTE: &str = "codecs";

/// One rendition listed in the master manifest.
///
/// Equality covers every field including the free-form attributes, so two
/// entries only compare equal when nothing about the rendition changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// File name of the media playlist, unique within a manifest.
    pub name: String,
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>, bandwidth: u64, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            bandwidth,
            width,
            height,
            attributes: BTreeMap::new(),
        }
    }

    pub fn from_media(name: impl Into<String>, info: MediaInfo) -> Self {
        let mut entry = Self::new(name, info.bandwidth, info.width, info.height);
        if let Some(codecs) = info.codecs {
            entry.attributes.insert(CODECS_ATTRIBUTE.to_string(), codecs);
        }
        entry
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn codecs(&self) -> Option<&str> {
        self.attributes.get(CODECS_ATTRIBUTE).map(String::as_str)
    }
}
