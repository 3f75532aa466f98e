//! In-process durable-store adapter with the same idempotency rules as the
//! Postgres repositories.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    application::repos::{CatalogRepo, RepoError},
    cache::{rw_read, rw_write},
    domain::{
        entities::{BlobReferences, CatalogDetail, CatalogItem, EpisodeGroup, Term},
        types::{BlobField, TermKind},
    },
};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
struct CatalogState {
    /// Items without their term lists; those are rebuilt from `links`.
    items: BTreeMap<String, CatalogItem>,
    slugs: HashMap<String, String>,
    terms: HashMap<(TermKind, String), Term>,
    links: HashMap<String, Vec<(TermKind, String)>>,
    episodes: HashMap<String, Vec<EpisodeGroup>>,
}

impl CatalogState {
    fn upsert_term(&mut self, kind: TermKind, term: &Term) {
        self.terms
            .entry((kind, term.id.clone()))
            .or_insert_with(|| term.clone());
    }

    fn link(&mut self, item_id: &str, kind: TermKind, term_id: &str) {
        let links = self.links.entry(item_id.to_string()).or_default();
        if !links.iter().any(|(k, id)| *k == kind && id == term_id) {
            links.push((kind, term_id.to_string()));
        }
    }

    fn terms_of(&self, item_id: &str, kind: TermKind) -> Vec<Term> {
        self.links
            .get(item_id)
            .into_iter()
            .flatten()
            .filter(|(k, _)| *k == kind)
            .filter_map(|(k, id)| self.terms.get(&(*k, id.clone())).cloned())
            .collect()
    }

    fn references(item: &CatalogItem) -> BlobReferences {
        BlobReferences {
            id: item.id.clone(),
            slug: item.slug.clone(),
            thumb_url: item.thumb_url.clone(),
            poster_url: item.poster_url.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a persistence error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful write calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        rw_read(&self.state, SOURCE, "item_count").items.len()
    }

    pub fn episode_count(&self, item_id: &str) -> usize {
        rw_read(&self.state, SOURCE, "episode_count")
            .episodes
            .get(item_id)
            .map(|groups| groups.iter().map(|g| g.server_data.len()).sum())
            .unwrap_or(0)
    }

    pub fn term_count(&self, kind: TermKind) -> usize {
        rw_read(&self.state, SOURCE, "term_count")
            .terms
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn check_writable(&self) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepo for MemoryCatalog {
    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<CatalogDetail>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_detail_by_slug");
        let Some(item) = state.slugs.get(slug).and_then(|id| state.items.get(id)) else {
            return Ok(None);
        };

        let mut movie = item.clone();
        movie.categories = state.terms_of(&item.id, TermKind::Category);
        movie.countries = state.terms_of(&item.id, TermKind::Country);
        let episodes = state.episodes.get(&item.id).cloned().unwrap_or_default();
        Ok(Some(CatalogDetail { movie, episodes }))
    }

    async fn find_blob_references(
        &self,
        ids: &[String],
    ) -> Result<Vec<BlobReferences>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_blob_references");
        Ok(ids
            .iter()
            .filter_map(|id| state.items.get(id))
            .map(CatalogState::references)
            .collect())
    }

    async fn save_detail(&self, detail: &CatalogDetail) -> Result<(), RepoError> {
        self.check_writable()?;
        let movie = &detail.movie;
        if movie.id.is_empty() || movie.slug.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "catalog item requires an id and a slug".into(),
            });
        }

        let mut state = rw_write(&self.state, SOURCE, "save_detail");
        if let Some(owner) = state.slugs.get(&movie.slug)
            && owner != &movie.id
        {
            return Err(RepoError::Duplicate {
                constraint: "catalog_items_slug_key".into(),
            });
        }

        state.items.entry(movie.id.clone()).or_insert_with(|| CatalogItem {
            categories: Vec::new(),
            countries: Vec::new(),
            ..movie.clone()
        });
        state.slugs.insert(movie.slug.clone(), movie.id.clone());

        for (kind, terms) in [
            (TermKind::Category, &movie.categories),
            (TermKind::Country, &movie.countries),
        ] {
            for term in terms.iter().filter(|term| !term.id.is_empty()) {
                state.upsert_term(kind, term);
                state.link(&movie.id, kind, &term.id);
            }
        }

        let groups = state.episodes.entry(movie.id.clone()).or_default();
        for incoming in &detail.episodes {
            let position = groups
                .iter()
                .position(|group| group.server_name == incoming.server_name);
            let group = match position {
                Some(index) => &mut groups[index],
                None => {
                    groups.push(EpisodeGroup {
                        server_name: incoming.server_name.clone(),
                        server_data: Vec::new(),
                    });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };
            for episode in &incoming.server_data {
                if !group.server_data.iter().any(|e| e.slug == episode.slug) {
                    group.server_data.push(episode.clone());
                }
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_terms(&self, kind: TermKind, terms: &[Term]) -> Result<(), RepoError> {
        self.check_writable()?;
        let mut state = rw_write(&self.state, SOURCE, "save_terms");
        for term in terms.iter().filter(|term| !term.id.is_empty()) {
            state.upsert_term(kind, term);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scan_blob_references(&self) -> Result<Vec<BlobReferences>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "scan_blob_references");
        Ok(state.items.values().map(CatalogState::references).collect())
    }

    async fn update_blob_reference(
        &self,
        slug: &str,
        field: BlobField,
        value: &str,
    ) -> Result<(), RepoError> {
        self.check_writable()?;
        let mut state = rw_write(&self.state, SOURCE, "update_blob_reference");
        let id = state.slugs.get(slug).cloned().ok_or(RepoError::NotFound)?;
        let item = state.items.get_mut(&id).ok_or(RepoError::NotFound)?;
        match field {
            BlobField::Thumb => item.thumb_url = value.to_string(),
            BlobField::Poster => item.poster_url = value.to_string(),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Episode;

    fn detail(id: &str, slug: &str, episodes: &[&str]) -> CatalogDetail {
        CatalogDetail {
            movie: CatalogItem {
                id: id.into(),
                slug: slug.into(),
                name: "Trò Chơi".into(),
                thumb_url: "https://img.example/upload/t.jpg".into(),
                categories: vec![Term {
                    id: "c1".into(),
                    name: "Drama".into(),
                    slug: "chinh-kich".into(),
                }],
                ..CatalogItem::default()
            },
            episodes: vec![EpisodeGroup {
                server_name: "Vietsub #1".into(),
                server_data: episodes
                    .iter()
                    .map(|slug| Episode {
                        slug: (*slug).into(),
                        ..Episode::default()
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn repeated_saves_are_idempotent() {
        let catalog = MemoryCatalog::new();
        let record = detail("m1", "tro-choi", &["tap-1", "tap-2"]);

        catalog.save_detail(&record).await.unwrap();
        catalog.save_detail(&record).await.unwrap();

        assert_eq!(catalog.item_count(), 1);
        assert_eq!(catalog.episode_count("m1"), 2);
        assert_eq!(catalog.term_count(TermKind::Category), 1);

        let stored = catalog
            .find_detail_by_slug("tro-choi")
            .await
            .unwrap()
            .expect("stored");
        assert_eq!(stored.movie.categories.len(), 1);
        assert_eq!(stored.episode_count(), 2);
    }

    #[tokio::test]
    async fn existing_item_fields_are_not_overwritten() {
        let catalog = MemoryCatalog::new();
        catalog
            .save_detail(&detail("m1", "tro-choi", &["tap-1"]))
            .await
            .unwrap();

        let mut newer = detail("m1", "tro-choi", &["tap-1", "tap-2"]);
        newer.movie.name = "Renamed".into();
        catalog.save_detail(&newer).await.unwrap();

        let stored = catalog.find_detail_by_slug("tro-choi").await.unwrap().unwrap();
        assert_eq!(stored.movie.name, "Trò Chơi");
        assert_eq!(stored.episode_count(), 2);
    }

    #[tokio::test]
    async fn slug_collision_is_rejected() {
        let catalog = MemoryCatalog::new();
        catalog
            .save_detail(&detail("m1", "tro-choi", &["tap-1"]))
            .await
            .unwrap();
        let err = catalog
            .save_detail(&detail("m2", "tro-choi", &["tap-1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn blob_references_update_by_slug() {
        let catalog = MemoryCatalog::new();
        catalog
            .save_detail(&detail("m1", "tro-choi", &["tap-1"]))
            .await
            .unwrap();
        catalog
            .update_blob_reference("tro-choi", BlobField::Thumb, "upload/t.jpg")
            .await
            .unwrap();

        let refs = catalog.find_blob_references(&["m1".into(), "zz".into()]).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].thumb_url, "upload/t.jpg");

        assert!(matches!(
            catalog
                .update_blob_reference("missing", BlobField::Poster, "x")
                .await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_persistence_errors() {
        let catalog = MemoryCatalog::new();
        catalog.fail_writes(true);
        let err = catalog
            .save_terms(TermKind::Country, &[Term::default()])
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Persistence(_)));
        assert_eq!(catalog.write_count(), 0);
    }
}
