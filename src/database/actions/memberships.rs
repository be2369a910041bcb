use sqlx::{Pool, Postgres};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{Error, ErrorKind, QueryError},
    schema::{RecipeSummary, Uuid},
};

use super::recipes::get_recipe;

/// Loads the compact summary for membership responses; 404 when the recipe
/// does not exist.
async fn get_recipe_summary(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<RecipeSummary, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("No recipe exists with specified id"))?;

    Ok(RecipeSummary {
        id: recipe.id,
        name: recipe.name,
        image: recipe.image,
        cooking_time: recipe.cooking_time,
    })
}

async fn add_membership(
    table: &'static str,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, Error> {
    let summary = get_recipe_summary(recipe_id, pool).await?;

    // Idempotent: a concurrent duplicate add leaves exactly one row, resolved
    // by the uniqueness constraint on (user_id, recipe_id).
    sqlx::query(&format!(
        "INSERT INTO {table} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(summary)
}

async fn remove_membership(
    table: &'static str,
    missing: &'static str,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE user_id = $1 AND recipe_id = $2"
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    // Deleting a row that was never added is an error, never a silent success.
    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new(missing));
    }

    Ok(())
}

async fn has_membership(
    table: &'static str,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: Option<(Uuid,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {table} WHERE user_id = $1 AND recipe_id = $2"
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(row.is_some())
}

pub async fn add_favorite(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, Error> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    add_membership("favorites", session.user_id, recipe_id, pool).await
}

pub async fn remove_favorite(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    remove_membership(
        "favorites",
        "Recipe is not in favorites",
        session.user_id,
        recipe_id,
        pool,
    )
    .await
}

pub async fn is_favorited(
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    has_membership("favorites", user_id, recipe_id, pool).await
}

pub async fn add_to_cart(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, Error> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    add_membership("shopping_cart", session.user_id, recipe_id, pool).await
}

pub async fn remove_from_cart(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    remove_membership(
        "shopping_cart",
        "Recipe is not in the shopping cart",
        session.user_id,
        recipe_id,
        pool,
    )
    .await
}

pub async fn is_in_shopping_cart(
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    has_membership("shopping_cart", user_id, recipe_id, pool).await
}
