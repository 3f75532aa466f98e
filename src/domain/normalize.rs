//! Shape detection for origin payloads.
//!
//! Every origin body is classified into exactly one [`OriginShape`]. Listing
//! families try a fixed, ordered list of known layouts; anything that matches
//! none of them becomes [`OriginShape::Unrecognized`] and is reported as a soft
//! failure by the resolver.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entities::{CatalogDetail, Term};
use super::types::PayloadKind;

/// Keys that some origin endpoints use instead of `items`, in priority order.
pub const ALTERNATE_LIST_KEYS: [&str; 4] = ["episodes", "movies", "list", "data"];

/// Canonical listing payload: `{ "items": [...], "pagination": {...} }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListingPage {
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
}

impl ListingPage {
    /// Ids of object items that carry a non-empty `_id`.
    pub fn item_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.get("_id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OriginShape {
    Listing(ListingPage),
    Detail(Box<CatalogDetail>),
    Taxonomy(Vec<Term>),
    /// The body parsed as none of the known shapes. `raw` keeps the body
    /// (as JSON, or as a string when it was not JSON) for diagnostics.
    Unrecognized { reason: String, raw: Value },
}

impl OriginShape {
    /// The `data` member of a successful envelope.
    pub fn data(&self) -> Option<Value> {
        let value = match self {
            OriginShape::Listing(page) => serde_json::to_value(page),
            OriginShape::Detail(detail) => serde_json::to_value(detail.as_ref()),
            OriginShape::Taxonomy(terms) => serde_json::to_value(terms),
            OriginShape::Unrecognized { .. } => return None,
        };
        value.ok()
    }
}

pub fn normalize(kind: PayloadKind, body: &[u8]) -> OriginShape {
    let root: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            return OriginShape::Unrecognized {
                reason: format!("origin body is not valid JSON: {err}"),
                raw: Value::String(String::from_utf8_lossy(body).into_owned()),
            };
        }
    };

    let shape = match kind {
        PayloadKind::Listing => listing(&root).map(OriginShape::Listing),
        PayloadKind::Detail => detail(&root).map(|d| OriginShape::Detail(Box::new(d))),
        PayloadKind::Taxonomy(_) => taxonomy(&root).map(OriginShape::Taxonomy),
    };

    shape.unwrap_or_else(|| OriginShape::Unrecognized {
        reason: unrecognized_reason(kind),
        raw: root,
    })
}

fn unrecognized_reason(kind: PayloadKind) -> String {
    match kind {
        PayloadKind::Listing => "origin listing matched no known shape".to_string(),
        PayloadKind::Detail => "origin detail is missing a `movie` object".to_string(),
        PayloadKind::Taxonomy(term) => {
            format!("origin {} taxonomy is not an array of terms", term.as_str())
        }
    }
}

fn listing(root: &Value) -> Option<ListingPage> {
    let object = root.as_object()?;

    if let Some(data) = object.get("data").and_then(Value::as_object)
        && let Some(items) = data.get("items").and_then(Value::as_array)
    {
        let pagination = data
            .get("params")
            .and_then(|params| params.get("pagination"))
            .or_else(|| data.get("pagination"))
            .cloned();
        return Some(ListingPage {
            items: items.clone(),
            pagination,
        });
    }

    if let Some(items) = object.get("items").and_then(Value::as_array) {
        return Some(ListingPage {
            items: items.clone(),
            pagination: object.get("pagination").cloned(),
        });
    }

    alternate_items(object).map(|items| ListingPage {
        items,
        pagination: object.get("pagination").cloned(),
    })
}

fn alternate_items(object: &Map<String, Value>) -> Option<Vec<Value>> {
    ALTERNATE_LIST_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array).cloned())
}

fn detail(root: &Value) -> Option<CatalogDetail> {
    let movie = root.get("movie")?;
    if !movie.is_object() {
        return None;
    }
    serde_json::from_value(root.clone()).ok()
}

fn taxonomy(root: &Value) -> Option<Vec<Term>> {
    if !root.is_array() {
        return None;
    }
    serde_json::from_value(root.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TermKind;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn data_items_shape_wins_over_root_items() {
        let body = bytes(json!({
            "data": {"items": [{"_id": "a"}], "params": {"pagination": {"totalPages": 3}}},
            "items": [{"_id": "ignored"}],
        }));
        let OriginShape::Listing(page) = normalize(PayloadKind::Listing, &body) else {
            panic!("expected listing");
        };
        assert_eq!(page.item_ids(), vec!["a".to_string()]);
        assert_eq!(page.pagination, Some(json!({"totalPages": 3})));
    }

    #[test]
    fn root_items_shape_keeps_pagination() {
        let body = bytes(json!({
            "status": true,
            "items": [{"_id": "a"}, {"_id": "b"}],
            "pagination": {"currentPage": 1},
        }));
        let OriginShape::Listing(page) = normalize(PayloadKind::Listing, &body) else {
            panic!("expected listing");
        };
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination, Some(json!({"currentPage": 1})));
    }

    #[test]
    fn alternate_keys_are_tried_in_order() {
        let body = bytes(json!({
            "list": [{"_id": "from-list"}],
            "movies": [{"_id": "from-movies"}],
            "episodes": "not an array",
        }));
        let OriginShape::Listing(page) = normalize(PayloadKind::Listing, &body) else {
            panic!("expected listing");
        };
        assert_eq!(page.item_ids(), vec!["from-movies".to_string()]);
    }

    #[test]
    fn unknown_listing_is_unrecognized_with_raw_payload() {
        let body = bytes(json!({"status": false, "msg": "gone"}));
        match normalize(PayloadKind::Listing, &body) {
            OriginShape::Unrecognized { raw, .. } => assert_eq!(raw["msg"], "gone"),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_kept_as_text() {
        let shape = normalize(PayloadKind::Detail, b"<html>oops</html>");
        assert!(shape.data().is_none());
        match shape {
            OriginShape::Unrecognized { raw, .. } => {
                assert_eq!(raw, Value::String("<html>oops</html>".into()))
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn detail_requires_movie_object() {
        let body = bytes(json!({
            "status": true,
            "movie": {"_id": "m1", "slug": "tro-choi"},
            "episodes": [{"server_name": "Vietsub #1", "server_data": [{"slug": "tap-1"}]}],
        }));
        let OriginShape::Detail(detail) = normalize(PayloadKind::Detail, &body) else {
            panic!("expected detail");
        };
        assert_eq!(detail.movie.id, "m1");
        assert_eq!(detail.episode_count(), 1);

        let missing = bytes(json!({"status": false, "movie": null}));
        assert!(matches!(
            normalize(PayloadKind::Detail, &missing),
            OriginShape::Unrecognized { .. }
        ));
    }

    #[test]
    fn taxonomy_is_a_root_array() {
        let body = bytes(json!([{"_id": "1", "name": "Hành Động", "slug": "hanh-dong"}]));
        let OriginShape::Taxonomy(terms) =
            normalize(PayloadKind::Taxonomy(TermKind::Category), &body)
        else {
            panic!("expected taxonomy");
        };
        assert_eq!(terms[0].slug, "hanh-dong");

        let wrapped = bytes(json!({"items": []}));
        assert!(matches!(
            normalize(PayloadKind::Taxonomy(TermKind::Country), &wrapped),
            OriginShape::Unrecognized { .. }
        ));
    }
}
