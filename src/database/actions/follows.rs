use sqlx::{Pool, Postgres};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::FOLLOW_COUNT_PER_PAGE,
    error::{Error, ErrorKind, QueryError},
    pagination::{PageContext, PageQuery},
    schema::{FollowView, FollowedAuthor, RecipeSummary, Uuid},
};

use super::users::get_user_by_id;

/// Idempotent follow edge creation. The author must exist and may not be the
/// follower themself.
pub async fn add_follow(
    session: &SessionData,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnFollows)?;
    if session.user_id == author_id {
        return Err(ErrorKind::Validation.new("You cannot follow yourself"));
    }
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ErrorKind::NotFound.new("No user exists with specified id"));
    }

    sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}

pub async fn remove_follow(
    session: &SessionData,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnFollows)?;
    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("You are not following this user"));
    }

    Ok(())
}

pub async fn is_following(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT author_id FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row.is_some())
}

/// The user's followed authors, each with a precomputed recipe count.
pub async fn fetch_follows(
    user_id: Uuid,
    page: &PageQuery,
    pool: &Pool<Postgres>,
) -> Result<PageContext<FollowedAuthor>, Error> {
    let page_size = page.page_size(FOLLOW_COUNT_PER_PAGE);
    let offset = page.offset(FOLLOW_COUNT_PER_PAGE);

    let rows: Vec<FollowedAuthor> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
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

pub async fn list_author_recipes(
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeSummary>, Error> {
    let list: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC
    ",
    )
    .bind(author_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

/// Truncates an embedded recipe list to `recipes_limit`. Shorter lists pass
/// through untouched; truncation never pads and never errors.
pub fn apply_recipes_limit(
    mut recipes: Vec<RecipeSummary>,
    limit: Option<usize>,
) -> Vec<RecipeSummary> {
    if let Some(limit) = limit {
        recipes.truncate(limit);
    }
    recipes
}

/// Composes one subscription entry: the followed author plus an embedded,
/// optionally truncated recipe list.
pub async fn view_follow(
    author: &FollowedAuthor,
    recipes_limit: Option<usize>,
    pool: &Pool<Postgres>,
) -> Result<FollowView, Error> {
    let recipes = list_author_recipes(author.id, pool).await?;
    let recipes = apply_recipes_limit(recipes, recipes_limit);

    Ok(FollowView {
        id: author.id,
        email: author.email.to_owned(),
        username: author.username.to_owned(),
        first_name: author.first_name.to_owned(),
        last_name: author.last_name.to_owned(),
        is_subscribed: true,
        recipes,
        recipes_count: author.recipes_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summaries(n: usize) -> Vec<RecipeSummary> {
        (0..n)
            .map(|i| RecipeSummary {
                id: i as i32,
                name: format!("recipe-{i}"),
                image: String::from("images/r.png"),
                cooking_time: 10,
            })
            .collect()
    }

    #[test]
    fn limit_truncates_longer_lists() {
        let recipes = apply_recipes_limit(summaries(5), Some(2));
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].name, "recipe-0");
    }

    #[test]
    fn shorter_lists_pass_through() {
        let recipes = apply_recipes_limit(summaries(2), Some(10));
        assert_eq!(recipes.len(), 2);
    }

    #[test]
    fn missing_limit_keeps_everything() {
        let recipes = apply_recipes_limit(summaries(4), None);
        assert_eq!(recipes.len(), 4);
    }
}
