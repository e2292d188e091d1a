//! Normalized catalog types shared by every layer of the engine.
//!
//! A [`CatalogRecord`] never mirrors the remote schema: the converter builds
//! it from whatever payload shape the remote returned, and the local store
//! persists it verbatim.

use serde::{Deserialize, Serialize};

/// Studio sentinel used when no concrete developer or publisher is known.
pub const UNKNOWN_DEVELOPER: &str = "Unknown Developer";

/// Name used when a payload carries no usable name.
pub const UNKNOWN_GAME: &str = "Unknown Game";

/// Last-resort description when nothing can be synthesized.
pub const NO_DESCRIPTION: &str = "No description available for this game.";

/// Default cap on stored descriptions, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 2000;

const ELLIPSIS: &str = "...";

/// A game as the rest of the application sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub studio: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    pub rating: f32,
    #[serde(default)]
    pub image_url: String,
}

impl CatalogRecord {
    /// Build a record with empty lists and the default sentinels.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: NO_DESCRIPTION.to_string(),
            studio: UNKNOWN_DEVELOPER.to_string(),
            platforms: Vec::new(),
            genres: Vec::new(),
            stores: Vec::new(),
            screenshots: Vec::new(),
            rating: 0.0,
            image_url: String::new(),
        }
    }

    pub fn has_unknown_studio(&self) -> bool {
        self.studio == UNKNOWN_DEVELOPER
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
    }

    pub fn has_platform(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p.eq_ignore_ascii_case(platform))
    }
}

/// Cut `text` to at most `max_chars` characters, ending with "..." when cut.
pub fn truncate_description(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Optional genre/platform narrowing of a list request.
///
/// Values are passed to the remote as-is (ids or slugs, comma-joined when
/// several are wanted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CatalogFilter {
    pub genre: Option<String>,
    pub platform: Option<String>,
}

impl CatalogFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn genre(slug: impl Into<String>) -> Self {
        Self {
            genre: Some(slug.into()),
            platform: None,
        }
    }

    pub fn platform(slug: impl Into<String>) -> Self {
        Self {
            genre: None,
            platform: Some(slug.into()),
        }
    }

    /// True when no narrowing is applied. Blank values count as absent.
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.genre) && blank(&self.platform)
    }
}

impl std::fmt::Display for CatalogFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.genre, &self.platform) {
            (None, None) => write!(f, "none"),
            (Some(g), None) => write!(f, "genre={}", g),
            (None, Some(p)) => write!(f, "platform={}", p),
            (Some(g), Some(p)) => write!(f, "genre={},platform={}", g, p),
        }
    }
}
