//! Shared domain enumerations for resolution requests and persisted terms.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Logical resolution family. Each family owns one endpoint template, one
/// cache-key prefix, one tag and one TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    List,
    Search,
    Category,
    Country,
    Newest,
    Detail,
    Categories,
    Countries,
}

/// Expected origin payload shape for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Listing,
    Detail,
    Taxonomy(TermKind),
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::List,
        Family::Search,
        Family::Category,
        Family::Country,
        Family::Newest,
        Family::Detail,
        Family::Categories,
        Family::Countries,
    ];

    /// Families whose cached payloads carry item lists worth revalidating.
    pub const LISTINGS: [Family; 5] = [
        Family::List,
        Family::Search,
        Family::Category,
        Family::Country,
        Family::Newest,
    ];

    /// Cache-key prefix, also used to derive the family tag.
    pub fn prefix(self) -> &'static str {
        match self {
            Family::List => "movie_list",
            Family::Search => "movie_search",
            Family::Category => "movie_category",
            Family::Country => "movie_country",
            Family::Newest => "movie_newest",
            Family::Detail => "movie_details",
            Family::Categories => "categories",
            Family::Countries => "countries",
        }
    }

    pub fn tag(self) -> String {
        format!("{}:cached_keys", self.prefix())
    }

    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Family::Detail => PayloadKind::Detail,
            Family::Categories => PayloadKind::Taxonomy(TermKind::Category),
            Family::Countries => PayloadKind::Taxonomy(TermKind::Country),
            _ => PayloadKind::Listing,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "modified.time")]
    ModifiedTime,
    #[serde(rename = "_id")]
    Id,
    #[serde(rename = "year")]
    Year,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::ModifiedTime => "modified.time",
            SortField::Id => "_id",
            SortField::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "modified.time" => Ok(SortField::ModifiedTime),
            "_id" => Ok(SortField::Id),
            "year" => Ok(SortField::Year),
            other => Err(DomainError::validation(format!(
                "unsupported sort field `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    Asc,
    #[default]
    Desc,
}

impl SortType {
    pub fn as_str(self) -> &'static str {
        match self {
            SortType::Asc => "asc",
            SortType::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "asc" => Ok(SortType::Asc),
            "desc" => Ok(SortType::Desc),
            other => Err(DomainError::validation(format!(
                "unsupported sort type `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortLang {
    Vietsub,
    ThuyetMinh,
    LongTieng,
}

impl SortLang {
    pub fn as_str(self) -> &'static str {
        match self {
            SortLang::Vietsub => "vietsub",
            SortLang::ThuyetMinh => "thuyet-minh",
            SortLang::LongTieng => "long-tieng",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "vietsub" => Ok(SortLang::Vietsub),
            "thuyet-minh" => Ok(SortLang::ThuyetMinh),
            "long-tieng" => Ok(SortLang::LongTieng),
            other => Err(DomainError::validation(format!(
                "unsupported sort language `{other}`"
            ))),
        }
    }
}

/// Categorization term kind (mirrors the `kind` column of `catalog_terms`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Category,
    Country,
}

impl TermKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TermKind::Category => "category",
            TermKind::Country => "country",
        }
    }
}

/// Blob reference columns on a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobField {
    Thumb,
    Poster,
}

impl BlobField {
    pub const ALL: [BlobField; 2] = [BlobField::Thumb, BlobField::Poster];

    pub fn column(self) -> &'static str {
        match self {
            BlobField::Thumb => "thumb_url",
            BlobField::Poster => "poster_url",
        }
    }
}
