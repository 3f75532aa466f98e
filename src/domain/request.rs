//! Resolution requests, canonical cache keys and origin endpoint templates.

use url::form_urlencoded;

use super::error::DomainError;
use super::types::{Family, SortField, SortLang, SortType};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 64;
const KEY_DELIMITER: char = ':';

/// A validated set of query parameters for one family.
///
/// Fields are already defaulted and clamped by the transport; the only
/// invariant enforced here is a non-empty subject for families that need one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionRequest {
    pub family: Family,
    /// List type, search keyword, category/country slug, newest-list slug or
    /// item slug depending on `family`. Empty for taxonomy families.
    pub subject: String,
    pub page: u32,
    pub sort_field: SortField,
    pub sort_type: SortType,
    pub sort_lang: Option<SortLang>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub year: Option<u16>,
    pub limit: u32,
}

impl ResolutionRequest {
    pub fn new(family: Family, subject: impl Into<String>) -> Result<Self, DomainError> {
        let subject = subject.into().trim().to_string();
        let needs_subject = !matches!(family, Family::Categories | Family::Countries);
        if needs_subject && subject.is_empty() {
            return Err(DomainError::validation(format!(
                "family `{family}` requires a non-empty subject"
            )));
        }
        if subject.contains(KEY_DELIMITER) && family != Family::Search {
            return Err(DomainError::validation(format!(
                "subject `{subject}` must not contain `{KEY_DELIMITER}`"
            )));
        }
        if family == Family::Detail
            && format!("{}{KEY_DELIMITER}{}", family.prefix(), key_field(&subject)) == family.tag()
        {
            return Err(DomainError::validation(format!(
                "subject `{subject}` is reserved"
            )));
        }

        Ok(Self {
            family,
            subject,
            page: 1,
            sort_field: SortField::default(),
            sort_type: SortType::default(),
            sort_lang: None,
            category: None,
            country: None,
            year: None,
            limit: DEFAULT_PAGE_LIMIT,
        })
    }

    pub fn detail(slug: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(Family::Detail, slug)
    }

    pub fn taxonomy(family: Family) -> Result<Self, DomainError> {
        match family {
            Family::Categories | Family::Countries => Self::new(family, ""),
            other => Err(DomainError::validation(format!(
                "family `{other}` is not a taxonomy family"
            ))),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    /// Deterministic, delimiter-joined key in a fixed field order. Free-form
    /// fields are percent-encoded so no value can contain the delimiter.
    pub fn cache_key(&self) -> String {
        let prefix = self.family.prefix();
        match self.family {
            Family::Detail => format!("{prefix}{KEY_DELIMITER}{}", key_field(&self.subject)),
            Family::Categories | Family::Countries => format!("{prefix}{KEY_DELIMITER}all"),
            _ => [
                prefix.to_string(),
                key_field(&self.subject),
                self.page.to_string(),
                self.sort_field.as_str().to_string(),
                self.sort_type.as_str().to_string(),
                self.sort_lang.map(SortLang::as_str).unwrap_or_default().to_string(),
                key_field(self.category.as_deref().unwrap_or_default()),
                key_field(self.country.as_deref().unwrap_or_default()),
                self.year.unwrap_or(0).to_string(),
                self.limit.to_string(),
            ]
            .join(&KEY_DELIMITER.to_string()),
        }
    }

    /// Origin URL for this request against the catalog API base.
    pub fn origin_url(&self, api_base: &str) -> String {
        let base = api_base.trim_end_matches('/');
        match self.family {
            Family::Detail => format!("{base}/phim/{}", self.subject),
            Family::Categories => format!("{base}/the-loai"),
            Family::Countries => format!("{base}/quoc-gia"),
            Family::Newest => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("page", &self.page.to_string())
                    .finish();
                format!("{base}/danh-sach/{}?{query}", self.subject)
            }
            Family::List => format!(
                "{base}/v1/api/danh-sach/{}?{}",
                self.subject,
                self.listing_query(None)
            ),
            Family::Search => format!(
                "{base}/v1/api/tim-kiem?{}",
                self.listing_query(Some(("keyword", self.subject.as_str())))
            ),
            Family::Category => format!(
                "{base}/v1/api/the-loai/{}?{}",
                self.subject,
                self.listing_query(None)
            ),
            Family::Country => format!(
                "{base}/v1/api/quoc-gia/{}?{}",
                self.subject,
                self.listing_query(None)
            ),
        }
    }

    fn listing_query(&self, leading: Option<(&str, &str)>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some((name, value)) = leading {
            query.append_pair(name, value);
        }
        query
            .append_pair("page", &self.page.to_string())
            .append_pair("sort_field", self.sort_field.as_str())
            .append_pair("sort_type", self.sort_type.as_str())
            .append_pair("limit", &self.limit.to_string());
        if let Some(lang) = self.sort_lang {
            query.append_pair("sort_lang", lang.as_str());
        }
        if let Some(category) = self.category.as_deref() {
            query.append_pair("category", category);
        }
        if let Some(country) = self.country.as_deref() {
            query.append_pair("country", country);
        }
        if let Some(year) = self.year {
            query.append_pair("year", &year.to_string());
        }
        query.finish()
    }
}

fn key_field(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
