//! Catalog entities as they travel between the origin, the durable store and
//! cached envelopes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treats `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A categorization term (category or country).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Term {
    #[serde(alias = "_id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
}

/// A catalog item keyed by the origin's immutable `_id`.
///
/// Attributes the mirror does not model explicitly are retained verbatim in
/// `attributes` so that cached and stored payloads keep the origin's fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub origin_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumb_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub poster_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub year: i32,
    #[serde(rename = "category", default, deserialize_with = "null_as_default")]
    pub categories: Vec<Term>,
    #[serde(rename = "country", default, deserialize_with = "null_as_default")]
    pub countries: Vec<Term>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link_embed: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link_m3u8: String,
}

/// Episodes served by one streaming server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EpisodeGroup {
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_data: Vec<Episode>,
}

/// A catalog item together with its episodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogDetail {
    pub movie: CatalogItem,
    #[serde(default, deserialize_with = "null_as_default")]
    pub episodes: Vec<EpisodeGroup>,
}

impl CatalogDetail {
    pub fn episode_count(&self) -> usize {
        self.episodes
            .iter()
            .map(|group| group.server_data.len())
            .sum()
    }
}

/// Current blob references of a stored item, as returned by id lookups and
/// the blob-reference scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReferences {
    pub id: String,
    pub slug: String,
    pub thumb_url: String,
    pub poster_url: String,
}
