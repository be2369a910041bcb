use sqlx::{Pool, Postgres};

use crate::{
    constants::INGREDIENT_COUNT_PER_PAGE,
    error::{Error, QueryError},
    pagination::{PageContext, PageQuery},
    schema::{Ingredient, IngredientRow},
};

/// Lists catalog ingredients, optionally narrowed by a case-insensitive
/// prefix match on the name.
pub async fn fetch_ingredients(
    search: Option<&str>,
    page: &PageQuery,
    pool: &Pool<Postgres>,
) -> Result<PageContext<IngredientRow>, Error> {
    let page_size = page.page_size(INGREDIENT_COUNT_PER_PAGE);
    let offset = page.offset(INGREDIENT_COUNT_PER_PAGE);

    // Escape LIKE wildcards so the query stays a literal prefix match.
    let prefix = search
        .unwrap_or("")
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    let rows: Vec<IngredientRow> = sqlx::query_as(
        "
        SELECT i.*, COUNT(*) OVER() AS count
        FROM ingredients i
        WHERE i.name ILIKE $1
        ORDER BY i.name
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(format!("{prefix}%"))
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(PageContext::from_rows(
        rows,
        total_count,
        page_size,
        page.page(),
    ))
}

pub async fn get_ingredient(id: i32, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}
