//! Request bodies and their defaulting into [`ResolutionRequest`]s.
//!
//! Out-of-range or unknown values fall back to defaults instead of failing:
//! page below 1 becomes 1, limit outside 1..=64 becomes 20, unknown sort
//! values become the defaults, years outside 1970..=current are dropped and
//! blank filters are treated as absent. Only a missing subject is rejected.

use serde::Deserialize;

use crate::domain::{
    error::DomainError,
    request::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, ResolutionRequest},
    types::{Family, SortField, SortLang, SortType},
};

const MIN_YEAR: i64 = 1970;
const NEWEST_LIST: &str = "phim-moi-cap-nhat";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewestBody {
    pub page: Option<i64>,
    /// Newest-list revision; 1 or absent selects the original list.
    pub v: Option<i64>,
}

impl NewestBody {
    pub fn into_request(self) -> Result<ResolutionRequest, DomainError> {
        let subject = match self.v {
            Some(v) if v > 1 => format!("{NEWEST_LIST}-v{v}"),
            _ => NEWEST_LIST.to_string(),
        };
        Ok(ResolutionRequest::new(Family::Newest, subject)?.with_page(page(self.page)))
    }
}

/// Shared body of the list, search, category and country routes. The
/// family decides which field is the subject.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListingBody {
    pub type_list: Option<String>,
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub sort_field: Option<String>,
    pub sort_type: Option<String>,
    pub sort_lang: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub year: Option<i64>,
    pub limit: Option<i64>,
}

impl ListingBody {
    pub fn into_request(
        self,
        family: Family,
        current_year: i32,
    ) -> Result<ResolutionRequest, DomainError> {
        let (subject, category, country) = match family {
            Family::List => (self.type_list, self.category, self.country),
            Family::Search => (self.keyword, self.category, self.country),
            Family::Category => (self.category, None, self.country),
            Family::Country => (self.country, self.category, None),
            other => {
                return Err(DomainError::validation(format!(
                    "family `{other}` does not accept a listing body"
                )));
            }
        };

        let mut request = ResolutionRequest::new(family, non_blank(subject).unwrap_or_default())?
            .with_page(page(self.page))
            .with_limit(limit(self.limit));

        request.sort_field = non_blank(self.sort_field)
            .and_then(|value| SortField::parse(&value).ok())
            .unwrap_or_default();
        request.sort_type = non_blank(self.sort_type)
            .and_then(|value| SortType::parse(&value).ok())
            .unwrap_or_default();
        request.sort_lang =
            non_blank(self.sort_lang).and_then(|value| SortLang::parse(&value).ok());
        request.category = non_blank(category);
        request.country = non_blank(country);
        request.year = year(self.year, current_year);
        Ok(request)
    }
}

pub fn current_year() -> i32 {
    time::OffsetDateTime::now_utc().year()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn page(value: Option<i64>) -> u32 {
    value
        .and_then(|page| u32::try_from(page).ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

fn limit(value: Option<i64>) -> u32 {
    value
        .and_then(|limit| u32::try_from(limit).ok())
        .filter(|limit| (1..=MAX_PAGE_LIMIT).contains(limit))
        .unwrap_or(DEFAULT_PAGE_LIMIT)
}

fn year(value: Option<i64>, current_year: i32) -> Option<u16> {
    value
        .filter(|year| (MIN_YEAR..=i64::from(current_year)).contains(year))
        .and_then(|year| u16::try_from(year).ok())
}
