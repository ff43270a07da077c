//! Postgres catalog store.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::PgPool;
use super::records::BookRecord;
use super::schema::books;
use super::{CatalogStore, StoreError, StoreResult};
use crate::models::CatalogBook;

#[derive(Clone)]
pub struct DieselCatalogStore {
    pool: PgPool,
}

impl DieselCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for DieselCatalogStore {
    async fn upsert_book(&self, book: &CatalogBook) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let book = book.clone();
        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let existing: Option<BookRecord> = books::table
                    .find(&book.isbn)
                    .select(BookRecord::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                let merged = match existing {
                    Some(record) => {
                        let mut current = CatalogBook::try_from(record)?;
                        current.merge_from(&book);
                        current
                    }
                    None => book,
                };
                let record = BookRecord::try_from(&merged)?;
                diesel::insert_into(books::table)
                    .values(&record)
                    .on_conflict(books::isbn)
                    .do_update()
                    .set(&record)
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<CatalogBook>> {
        let mut conn = self.pool.get().await?;
        let record: Option<BookRecord> = books::table
            .find(isbn)
            .select(BookRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        record.map(CatalogBook::try_from).transpose()
    }

    async fn count_books(&self) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let count: i64 = books::table.count().get_result(&mut conn).await?;
        Ok(count.max(0) as u64)
    }
}
