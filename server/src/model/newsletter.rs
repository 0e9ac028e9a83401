use chrono::{NaiveDate, Utc};
use sea_orm::{sea_query::Index, ActiveValue, ConnectionTrait, FromQueryResult, QuerySelect, Schema};
use serde::Serialize;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    model::category::Category,
};

/// A finalized record produced by the batch processor, not yet persisted.
/// The store assigns the id on insert; rows are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNewsletter {
    pub date: NaiveDate,
    pub sender: String,
    pub subject: String,
    pub summary: String,
    pub category: Category,
    pub word_count: i32,
}

#[derive(Debug, Clone, FromQueryResult, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_category: Vec<CategoryCount>,
}

pub struct NewsletterCtrl;

impl NewsletterCtrl {
    /// Create the newsletter table and its range/equality indexes if the
    /// store is fresh.
    pub async fn ensure_schema(conn: &DatabaseConnection) -> AppResult<()> {
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(Newsletter);
        table.if_not_exists();
        conn.execute(backend.build(&table)).await?;

        let date_idx = Index::create()
            .name("idx_newsletter_date")
            .table(Newsletter)
            .col(newsletter::Column::Date)
            .if_not_exists()
            .to_owned();
        conn.execute(backend.build(&date_idx)).await?;

        let category_idx = Index::create()
            .name("idx_newsletter_category")
            .table(Newsletter)
            .col(newsletter::Column::Category)
            .if_not_exists()
            .to_owned();
        conn.execute(backend.build(&category_idx)).await?;

        Ok(())
    }

    /// Insert a record, returning the assigned id. Rows violating the schema
    /// invariants (empty summary, inconsistent word count) are rejected
    /// before touching the database.
    pub async fn insert(conn: &DatabaseConnection, record: NewNewsletter) -> AppResult<i32> {
        if record.summary.trim().is_empty() {
            return Err(AppError::BadRequest(format!(
                "empty summary for newsletter from {} ({})",
                record.sender, record.subject
            )));
        }

        let expected = record.summary.split_whitespace().count() as i32;
        if record.word_count != expected {
            return Err(AppError::BadRequest(format!(
                "word_count {} does not match summary token count {} for newsletter from {}",
                record.word_count, expected, record.sender
            )));
        }

        let active_model = newsletter::ActiveModel {
            id: ActiveValue::NotSet,
            date: ActiveValue::Set(record.date),
            sender: ActiveValue::Set(record.sender),
            subject: ActiveValue::Set(record.subject),
            summary: ActiveValue::Set(record.summary),
            category: ActiveValue::Set(record.category.to_string()),
            word_count: ActiveValue::Set(record.word_count),
            created_at: ActiveValue::Set(Utc::now()),
        };

        let result = Newsletter::insert(active_model).exec(conn).await?;

        Ok(result.last_insert_id)
    }

    /// Records with `date` in the half-open range `[start, end)`, ascending by
    /// date, ties broken by insertion order.
    pub async fn in_date_range(
        conn: &DatabaseConnection,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<Category>,
    ) -> AppResult<Vec<newsletter::Model>> {
        let mut query = Newsletter::find()
            .filter(newsletter::Column::Date.gte(start))
            .filter(newsletter::Column::Date.lt(end));

        if let Some(category) = category {
            query = query.filter(newsletter::Column::Category.eq(category.to_string()));
        }

        let records = query
            .order_by_asc(newsletter::Column::Date)
            .order_by_asc(newsletter::Column::Id)
            .all(conn)
            .await?;

        Ok(records)
    }

    pub async fn count(conn: &DatabaseConnection) -> AppResult<u64> {
        let count = Newsletter::find().count(conn).await?;

        Ok(count)
    }

    pub async fn stats(conn: &DatabaseConnection) -> AppResult<StoreStats> {
        let total = Self::count(conn).await?;

        let by_category = Newsletter::find()
            .select_only()
            .column(newsletter::Column::Category)
            .column_as(newsletter::Column::Id.count(), "count")
            .group_by(newsletter::Column::Category)
            .into_model::<CategoryCount>()
            .all(conn)
            .await?;

        Ok(StoreStats { total, by_category })
    }
}
