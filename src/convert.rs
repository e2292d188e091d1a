//! Remote payload → [`CatalogRecord`] conversion.
//!
//! List items and detail bodies share one permissive shape; the detail body
//! simply fills more of it (`description_raw`, `developers`, `publishers`).
//! Conversion is pure: no I/O, no clock, no shared state.

use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{
    truncate_description, CatalogRecord, DESCRIPTION_MAX_CHARS, NO_DESCRIPTION, UNKNOWN_DEVELOPER,
    UNKNOWN_GAME,
};
use crate::error::SyncError;
use crate::remote::{RawDetail, RawListItem};

/// Studio names that carry no information.
const GENERIC_STUDIO_NAMES: &[&str] = &[
    "unknown",
    "unknown developer",
    "unknown publisher",
    "n/a",
    "na",
    "none",
    "various",
    "various artists",
    "indie",
    "tba",
    "tbd",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlatformEntry {
    platform: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    store: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Screenshot {
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGame {
    id: RawId,
    name: Option<String>,
    description_raw: Option<String>,
    description: Option<String>,
    released: Option<String>,
    rating: Option<f32>,
    background_image: Option<String>,
    #[serde(default)]
    platforms: Option<Vec<Option<PlatformEntry>>>,
    #[serde(default)]
    genres: Option<Vec<Option<Named>>>,
    #[serde(default)]
    stores: Option<Vec<Option<StoreEntry>>>,
    #[serde(default)]
    developers: Option<Vec<Option<Named>>>,
    #[serde(default)]
    publishers: Option<Vec<Option<Named>>>,
    #[serde(default)]
    short_screenshots: Option<Vec<Option<Screenshot>>>,
}

/// True for studio names too vague to show ("unknown", "indie", one letter...).
pub fn is_generic_studio(name: &str) -> bool {
    let name = name.trim();
    if name.chars().count() < 2 {
        return true;
    }
    let lower = name.to_lowercase();
    GENERIC_STUDIO_NAMES.contains(&lower.as_str())
}

/// First concrete name in priority order, or the unknown-studio sentinel.
///
/// Developers are listed before publishers by the converter; this function
/// is agnostic of where the candidates came from.
pub fn pick_studio<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .map(str::trim)
        .find(|name| !is_generic_studio(name))
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_DEVELOPER.to_string())
}

/// Maps remote payloads into catalog records.
#[derive(Debug, Clone, Copy)]
pub struct RecordConverter {
    description_max_chars: usize,
}

impl Default for RecordConverter {
    fn default() -> Self {
        Self::new(DESCRIPTION_MAX_CHARS)
    }
}

impl RecordConverter {
    pub fn new(description_max_chars: usize) -> Self {
        Self {
            description_max_chars: description_max_chars.max(4),
        }
    }

    pub fn convert_list_item(&self, item: &RawListItem) -> Result<CatalogRecord, SyncError> {
        self.convert(item)
    }

    pub fn convert_detail(&self, detail: &RawDetail) -> Result<CatalogRecord, SyncError> {
        self.convert(detail)
    }

    /// Convert every item that can be converted; bad items are logged and skipped.
    pub fn convert_batch(&self, items: &[RawListItem]) -> Vec<CatalogRecord> {
        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.convert_list_item(item) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping catalog item #{}: {}", index, e),
            }
        }
        records
    }

    fn convert(&self, payload: &Value) -> Result<CatalogRecord, SyncError> {
        let raw = RawGame::deserialize(payload).map_err(|e| SyncError::Conversion(e.to_string()))?;

        let id = match &raw.id {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s.trim().to_string(),
        };
        if id.is_empty() {
            return Err(SyncError::Conversion("empty id".to_string()));
        }

        let name = clean(raw.name.as_deref())
            .unwrap_or(UNKNOWN_GAME)
            .to_string();

        let developers = names(&raw.developers);
        let publishers = names(&raw.publishers);
        let studio = pick_studio(
            developers
                .iter()
                .chain(publishers.iter())
                .map(String::as_str),
        );

        let description = self.description(&raw, &name, &studio);

        let platforms = flatten(&raw.platforms, |e: &PlatformEntry| {
            e.platform.as_ref().and_then(|p| p.name.as_deref())
        });
        let stores = flatten(&raw.stores, |e: &StoreEntry| {
            e.store.as_ref().and_then(|s| s.name.as_deref())
        });
        let screenshots = flatten(&raw.short_screenshots, |s: &Screenshot| s.image.as_deref());

        Ok(CatalogRecord {
            id,
            name,
            description,
            studio,
            platforms,
            genres: names(&raw.genres),
            stores,
            screenshots,
            rating: raw.rating.unwrap_or(0.0),
            image_url: clean(raw.background_image.as_deref())
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn description(&self, raw: &RawGame, name: &str, studio: &str) -> String {
        let text = clean(raw.description_raw.as_deref())
            .map(str::to_string)
            .or_else(|| {
                clean(raw.description.as_deref())
                    .map(strip_html)
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| synthesize_description(name, raw.released.as_deref(), studio));
        truncate_description(&text, self.description_max_chars)
    }
}

/// "Name was released on DATE by STUDIO." from whatever parts are known.
fn synthesize_description(name: &str, released: Option<&str>, studio: &str) -> String {
    let released = clean(released);
    let studio = (studio != UNKNOWN_DEVELOPER).then_some(studio);
    if name == UNKNOWN_GAME || (released.is_none() && studio.is_none()) {
        return NO_DESCRIPTION.to_string();
    }

    let mut sentence = name.to_string();
    match released {
        Some(date) => sentence.push_str(&format!(" was released on {}", date)),
        None => sentence.push_str(" is a game"),
    }
    if let Some(studio) = studio {
        sentence.push_str(&format!(" by {}", studio));
    }
    sentence.push('.');
    sentence
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn names(list: &Option<Vec<Option<Named>>>) -> Vec<String> {
    flatten(list, |n: &Named| n.name.as_deref())
}

fn flatten<T>(list: &Option<Vec<Option<T>>>, pick: impl Fn(&T) -> Option<&str>) -> Vec<String> {
    list.iter()
        .flatten()
        .flatten()
        .filter_map(|entry| clean(pick(entry)))
        .map(str::to_string)
        .collect()
}

/// Tags whose boundaries separate words.
const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "section", "hr",
];

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag: Option<String> = None;
    for ch in html.chars() {
        match ch {
            '<' if tag.is_none() => tag = Some(String::new()),
            '>' if tag.is_some() => {
                let name = tag.take().unwrap_or_default();
                let name = name
                    .trim_start_matches('/')
                    .chars()
                    .take_while(char::is_ascii_alphanumeric)
                    .collect::<String>()
                    .to_ascii_lowercase();
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push(' ');
                }
            }
            _ => match tag.as_mut() {
                Some(name) => name.push(ch),
                None => out.push(ch),
            },
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity(&tail[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Combine a record with the richer record converted from its detail body.
///
/// Detail values win; list fields, image and studio from the original are
/// kept where the detail body left them empty.
pub fn merge_detail(original: &CatalogRecord, detail: CatalogRecord) -> CatalogRecord {
    let keep = |detail: Vec<String>, original: &Vec<String>| {
        if detail.is_empty() {
            original.clone()
        } else {
            detail
        }
    };
    CatalogRecord {
        id: original.id.clone(),
        name: if detail.name == UNKNOWN_GAME {
            original.name.clone()
        } else {
            detail.name
        },
        description: if detail.description == NO_DESCRIPTION {
            original.description.clone()
        } else {
            detail.description
        },
        studio: if detail.studio == UNKNOWN_DEVELOPER {
            original.studio.clone()
        } else {
            detail.studio
        },
        platforms: keep(detail.platforms, &original.platforms),
        genres: keep(detail.genres, &original.genres),
        stores: keep(detail.stores, &original.stores),
        screenshots: keep(detail.screenshots, &original.screenshots),
        rating: if detail.rating > 0.0 {
            detail.rating
        } else {
            original.rating
        },
        image_url: if detail.image_url.is_empty() {
            original.image_url.clone()
        } else {
            detail.image_url
        },
    }
}
