use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder, types::Json};

use super::{PostgresRepositories, map_sqlx_error};
use crate::{
    application::repos::{CatalogRepo, RepoError},
    domain::{
        entities::{BlobReferences, CatalogDetail, CatalogItem, Episode, EpisodeGroup, Term},
        types::{BlobField, TermKind},
    },
};

/// Keeps each multi-row insert well below the Postgres bind limit.
const EPISODE_CHUNK: usize = 500;

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    slug: String,
    name: String,
    origin_name: String,
    content: String,
    kind: String,
    status: String,
    thumb_url: String,
    poster_url: String,
    year: i32,
    attributes: Json<Map<String, Value>>,
}

impl From<ItemRow> for CatalogItem {
    fn from(row: ItemRow) -> Self {
        CatalogItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            origin_name: row.origin_name,
            content: row.content,
            kind: row.kind,
            status: row.status,
            thumb_url: row.thumb_url,
            poster_url: row.poster_url,
            year: row.year,
            categories: Vec::new(),
            countries: Vec::new(),
            attributes: row.attributes.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkedTermRow {
    kind: String,
    id: String,
    name: String,
    slug: String,
}

#[derive(sqlx::FromRow)]
struct EpisodeRow {
    server_name: String,
    name: String,
    slug: String,
    filename: String,
    link_embed: String,
    link_m3u8: String,
}

#[derive(sqlx::FromRow)]
struct ReferenceRow {
    id: String,
    slug: String,
    thumb_url: String,
    poster_url: String,
}

impl From<ReferenceRow> for BlobReferences {
    fn from(row: ReferenceRow) -> Self {
        BlobReferences {
            id: row.id,
            slug: row.slug,
            thumb_url: row.thumb_url,
            poster_url: row.poster_url,
        }
    }
}

/// Rows arrive ordered by server then position; consecutive rows with the
/// same server name form one group.
fn group_episodes(rows: Vec<EpisodeRow>) -> Vec<EpisodeGroup> {
    let mut groups: Vec<EpisodeGroup> = Vec::new();
    for row in rows {
        let episode = Episode {
            name: row.name,
            slug: row.slug,
            filename: row.filename,
            link_embed: row.link_embed,
            link_m3u8: row.link_m3u8,
        };
        match groups.last_mut() {
            Some(group) if group.server_name == row.server_name => group.server_data.push(episode),
            _ => groups.push(EpisodeGroup {
                server_name: row.server_name,
                server_data: vec![episode],
            }),
        }
    }
    groups
}

fn position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

fn push_term_insert(qb: &mut QueryBuilder<'_, Postgres>, kind: TermKind, terms: &[&Term]) {
    qb.push("INSERT INTO catalog_terms (kind, id, name, slug) ");
    qb.push_values(terms, |mut row, term| {
        row.push_bind(kind.as_str())
            .push_bind(term.id.clone())
            .push_bind(term.name.clone())
            .push_bind(term.slug.clone());
    });
    qb.push(" ON CONFLICT (kind, id) DO NOTHING");
}

#[async_trait]
impl CatalogRepo for PostgresRepositories {
    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<CatalogDetail>, RepoError> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT id, slug, name, origin_name, content, kind, status, thumb_url, poster_url, \
             year, attributes FROM catalog_items WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut movie = CatalogItem::from(row);

        let terms = sqlx::query_as::<_, LinkedTermRow>(
            "SELECT t.kind, t.id, t.name, t.slug \
             FROM catalog_item_terms it \
             INNER JOIN catalog_terms t ON t.kind = it.kind AND t.id = it.term_id \
             WHERE it.item_id = $1 \
             ORDER BY it.kind, it.position",
        )
        .bind(&movie.id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        for term in terms {
            let target = if term.kind == TermKind::Country.as_str() {
                &mut movie.countries
            } else {
                &mut movie.categories
            };
            target.push(Term {
                id: term.id,
                name: term.name,
                slug: term.slug,
            });
        }

        let episodes = sqlx::query_as::<_, EpisodeRow>(
            "SELECT server_name, name, slug, filename, link_embed, link_m3u8 \
             FROM catalog_episodes WHERE item_id = $1 \
             ORDER BY server_position, position, id",
        )
        .bind(&movie.id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(CatalogDetail {
            movie,
            episodes: group_episodes(episodes),
        }))
    }

    async fn find_blob_references(
        &self,
        ids: &[String],
    ) -> Result<Vec<BlobReferences>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ReferenceRow>(
            "SELECT id, slug, thumb_url, poster_url FROM catalog_items WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BlobReferences::from).collect())
    }

    async fn save_detail(&self, detail: &CatalogDetail) -> Result<(), RepoError> {
        let movie = &detail.movie;
        if movie.id.is_empty() || movie.slug.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "catalog item requires an id and a slug".into(),
            });
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO catalog_items \
             (id, slug, name, origin_name, content, kind, status, thumb_url, poster_url, year, attributes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&movie.id)
        .bind(&movie.slug)
        .bind(&movie.name)
        .bind(&movie.origin_name)
        .bind(&movie.content)
        .bind(&movie.kind)
        .bind(&movie.status)
        .bind(&movie.thumb_url)
        .bind(&movie.poster_url)
        .bind(movie.year)
        .bind(Json(&movie.attributes))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (kind, terms) in [
            (TermKind::Category, &movie.categories),
            (TermKind::Country, &movie.countries),
        ] {
            let terms: Vec<&Term> = terms.iter().filter(|term| !term.id.is_empty()).collect();
            if terms.is_empty() {
                continue;
            }

            let mut qb = QueryBuilder::new("");
            push_term_insert(&mut qb, kind, &terms);
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO catalog_item_terms (item_id, kind, term_id, position) ",
            );
            qb.push_values(terms.iter().enumerate(), |mut row, (index, term)| {
                row.push_bind(movie.id.clone())
                    .push_bind(kind.as_str())
                    .push_bind(term.id.clone())
                    .push_bind(position(index));
            });
            qb.push(" ON CONFLICT (item_id, kind, term_id) DO NOTHING");
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        let episodes: Vec<(i32, i32, &str, &Episode)> = detail
            .episodes
            .iter()
            .enumerate()
            .flat_map(|(server_index, group)| {
                group
                    .server_data
                    .iter()
                    .enumerate()
                    .map(move |(index, episode)| {
                        (
                            position(server_index),
                            position(index),
                            group.server_name.as_str(),
                            episode,
                        )
                    })
            })
            .collect();

        for chunk in episodes.chunks(EPISODE_CHUNK) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO catalog_episodes \
                 (item_id, server_name, server_position, position, name, slug, filename, link_embed, link_m3u8) ",
            );
            qb.push_values(chunk, |mut row, (server_position, index, server_name, episode)| {
                row.push_bind(movie.id.clone())
                    .push_bind(server_name.to_string())
                    .push_bind(*server_position)
                    .push_bind(*index)
                    .push_bind(episode.name.clone())
                    .push_bind(episode.slug.clone())
                    .push_bind(episode.filename.clone())
                    .push_bind(episode.link_embed.clone())
                    .push_bind(episode.link_m3u8.clone());
            });
            qb.push(" ON CONFLICT (item_id, server_name, slug) DO NOTHING");
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn save_terms(&self, kind: TermKind, terms: &[Term]) -> Result<(), RepoError> {
        let terms: Vec<&Term> = terms.iter().filter(|term| !term.id.is_empty()).collect();
        if terms.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::new("");
        push_term_insert(&mut qb, kind, &terms);
        qb.build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn scan_blob_references(&self) -> Result<Vec<BlobReferences>, RepoError> {
        let rows = sqlx::query_as::<_, ReferenceRow>(
            "SELECT id, slug, thumb_url, poster_url FROM catalog_items ORDER BY slug",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BlobReferences::from).collect())
    }

    async fn update_blob_reference(
        &self,
        slug: &str,
        field: BlobField,
        value: &str,
    ) -> Result<(), RepoError> {
        let sql = format!(
            "UPDATE catalog_items SET {} = $1, updated_at = now() WHERE slug = $2",
            field.column()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(slug)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
