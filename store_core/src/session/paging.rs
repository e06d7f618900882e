use super::Session;
use crate::collection::Collection;
use crate::document::Document;
use crate::errors::RepositoryError;
use crate::query::pagination::sort_signature;
use crate::query::{Cursor, Page, PageRequest, Query, SqlGenerator};

#[derive(sqlx::FromRow)]
struct PageRow {
    #[sqlx(flatten)]
    document: Document,
    cursor_value: Option<String>,
    #[sqlx(default)]
    total_count: Option<i64>,
}

impl Session {
    /// One page of `query` in `request.sort` order, resuming after
    /// `request.cursor`. Fetches one extra row to learn whether more follow.
    pub async fn find_page(
        &self,
        collection: &Collection,
        query: &Query,
        request: &PageRequest,
    ) -> Result<Page<Document>, RepositoryError> {
        request.validate()?;
        let position = request.position()?;
        let limit = request.limit as usize;

        let stmt = SqlGenerator::build_page(
            collection,
            query,
            &request.sort,
            position.as_ref(),
            i64::from(request.limit) + 1,
            request.include_total,
        )?;
        crate::trace_log!("[PAGE] {}: {}", collection.name(), stmt.sql);
        let mut rows = execute_on!(self, "find page", |conn| stmt
            .query_as::<PageRow>()
            .fetch_all(conn))?;

        let has_next = rows.len() > limit;
        rows.truncate(limit);

        let mut total = rows.first().and_then(|row| row.total_count);
        if request.include_total && total.is_none() {
            // nothing on this page to carry the count
            total = Some(self.count(collection, query).await?);
        }

        let next_cursor = if has_next {
            rows.last().map(|row| {
                Cursor {
                    sort: sort_signature(&request.sort),
                    value: row.cursor_value.clone(),
                    id: row.document.id,
                }
                .encode()
            })
        } else {
            None
        };

        Ok(Page {
            items: rows.into_iter().map(|row| row.document).collect(),
            next_cursor,
            has_next,
            total,
        })
    }
}
