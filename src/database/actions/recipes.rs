use std::collections::HashSet;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::{MAX_AMOUNT, MIN_AMOUNT, RECIPE_COUNT_PER_PAGE},
    error::{Error, ErrorKind, QueryError},
    media::{ImageData, ImageField},
    pagination::{PageContext, PageQuery},
    schema::{
        IngredientAmount, IngredientLine, Recipe, RecipeFilter, RecipePayload, RecipeRow,
        RecipeView, Tag, Uuid,
    },
};

use super::{
    memberships::{is_favorited, is_in_shopping_cart},
    users::{get_user_by_id, view_user},
};

/// Result of a recipe write. When the payload carried a data-URI image the
/// decoded blob comes back for the caller to persist.
#[derive(Debug)]
pub struct RecipeWrite {
    pub id: Uuid,
    pub image: Option<ImageData>,
}

fn validate_bounded(field: &str, value: i32) -> Result<(), Error> {
    if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&value) {
        return Err(ErrorKind::Validation.new(&format!(
            "{field} must be between {MIN_AMOUNT} and {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

/// Field-level checks that need no store access. Rejects out-of-range values
/// and duplicate ingredient lines before anything is written.
pub fn validate_recipe_payload(payload: &RecipePayload) -> Result<(), Error> {
    if payload.name.trim().is_empty() {
        return Err(ErrorKind::Validation.new("Recipe name is required"));
    }
    if payload.ingredients.is_empty() {
        return Err(ErrorKind::Validation.new("At least one ingredient is required"));
    }
    validate_bounded("cooking_time", payload.cooking_time)?;

    let mut seen = HashSet::new();
    for line in &payload.ingredients {
        validate_bounded("amount", line.amount)?;
        if !seen.insert(line.id) {
            return Err(ErrorKind::Validation.new("Recipe lists an ingredient twice"));
        }
    }
    Ok(())
}

/// Every ingredient and tag id in the payload must resolve to a catalog row.
async fn resolve_catalog_refs(payload: &RecipePayload, pool: &Pool<Postgres>) -> Result<(), Error> {
    let ids: Vec<Uuid> = payload.ingredients.iter().map(|line| line.id).collect();
    let found: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids.as_slice())
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    if found.len() != ids.len() {
        return Err(ErrorKind::NotFound.new("Unknown ingredient id in recipe"));
    }

    let mut tag_ids = payload.tags.to_owned();
    tag_ids.sort_unstable();
    tag_ids.dedup();
    let found: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(tag_ids.as_slice())
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    if found.len() != tag_ids.len() {
        return Err(ErrorKind::NotFound.new("Unknown tag id in recipe"));
    }

    Ok(())
}

async fn insert_lines(
    recipe_id: Uuid,
    lines: &[IngredientAmount],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    builder.push_values(lines, |mut b, line| {
        b.push_bind(recipe_id).push_bind(line.id).push_bind(line.amount);
    });
    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    Ok(())
}

async fn insert_tags(
    recipe_id: Uuid,
    tag_ids: &[Uuid],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let mut tag_ids = tag_ids.to_owned();
    tag_ids.sort_unstable();
    tag_ids.dedup();

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags_map (recipe_id, tag_id) ");
    builder.push_values(tag_ids, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(tag_id);
    });
    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    Ok(())
}

/// Creates the recipe aggregate in one transaction: the recipe row, its full
/// ingredient-line set and its tag set. The session owner becomes the author.
/// Nothing is visible until commit.
pub async fn create_recipe(
    session: &SessionData,
    payload: &RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<RecipeWrite, Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    validate_recipe_payload(payload)?;
    resolve_catalog_refs(payload, pool).await?;
    let image = ImageField::parse(&payload.image)?;

    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    let row: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(image.stored_reference())
    .bind(payload.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    insert_lines(row.0, &payload.ingredients, &mut tx).await?;
    insert_tags(row.0, &payload.tags, &mut tx).await?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    Ok(RecipeWrite {
        id: row.0,
        image: image.into_blob(),
    })
}

/// Updates the aggregate with full-replace semantics: scalars are overwritten
/// and both join sets are deleted and re-inserted, all in one transaction.
/// Callers resolve the recipe through [`get_recipe_mut`] first.
pub async fn update_recipe(
    recipe: &Recipe,
    payload: &RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<RecipeWrite, Error> {
    validate_recipe_payload(payload)?;
    resolve_catalog_refs(payload, pool).await?;
    let image = ImageField::parse(&payload.image)?;

    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    sqlx::query(
        "
        UPDATE recipes SET name = $1, text = $2, image = $3, cooking_time = $4
        WHERE id = $5
    ",
    )
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(image.stored_reference())
    .bind(payload.cooking_time)
    .bind(recipe.id)
    .execute(&mut *tx)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    sqlx::query("DELETE FROM recipe_tags_map WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    insert_lines(recipe.id, &payload.ingredients, &mut tx).await?;
    insert_tags(recipe.id, &payload.tags, &mut tx).await?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    Ok(RecipeWrite {
        id: recipe.id,
        image: image.into_blob(),
    })
}

pub async fn delete_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("No recipe exists with specified id"));
    }

    Ok(())
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

/// Resolves a recipe for mutation: the session must own it, unless its role
/// grants managing all recipes.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool).await?;
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) => {
                if recipe.author_id != session.user_id {
                    Err(ErrorKind::PermissionDenied.default())
                } else {
                    Ok(recipe)
                }
            }
        },
        None => Err(ErrorKind::NotFound.new("No recipe exists with specified id")),
    }
}

pub async fn list_recipe_tags(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags_map m
        INNER JOIN tags t ON t.id = m.tag_id
        WHERE m.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

/// Ingredient lines with the catalog fields resolved. Lines orphaned by a
/// deleted ingredient are not part of the representation.
pub async fn list_recipe_lines(
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<IngredientLine>, Error> {
    let list: Vec<IngredientLine> = sqlx::query_as(
        "
        SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

/// Composes the full recipe representation for a viewer: resolved tags,
/// amount-annotated ingredients, the author and the two membership flags.
pub async fn view_recipe(
    recipe: &Recipe,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    let tags = list_recipe_tags(recipe.id, pool).await?;
    let ingredients = list_recipe_lines(recipe.id, pool).await?;

    let author = get_user_by_id(pool, recipe.author_id)
        .await?
        .ok_or_else(|| ErrorKind::Internal.new("Recipe author is missing"))?;
    let author = view_user(&author, viewer, pool).await?;

    // Anonymous viewers read false without touching the membership tables.
    let (favorited, in_cart) = match viewer {
        Some(session) => (
            is_favorited(session.user_id, recipe.id, pool).await?,
            is_in_shopping_cart(session.user_id, recipe.id, pool).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited: favorited,
        is_in_shopping_cart: in_cart,
        name: recipe.name.to_owned(),
        image: recipe.image.to_owned(),
        text: recipe.text.to_owned(),
        cooking_time: recipe.cooking_time,
    })
}

/// Lists recipes newest first. All filters combine independently; the tag
/// filter keeps recipes carrying at least one of the given slugs (OR), and
/// the membership filters are ignored for anonymous viewers.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<&SessionData>,
    page: &PageQuery,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRow>, Error> {
    let page_size = page.page_size(RECIPE_COUNT_PER_PAGE);
    let offset = page.offset(RECIPE_COUNT_PER_PAGE);

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        builder
            .push(
                "
                AND EXISTS (
                    SELECT 1 FROM recipe_tags_map m
                    INNER JOIN tags t ON t.id = m.tag_id
                    WHERE m.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.to_owned())
            .push("))");
    }
    if let Some(session) = viewer {
        if filter.is_favorited {
            builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(session.user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(session.user_id)
                .push(")");
        }
    }

    builder
        .push(" ORDER BY r.pub_date DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<RecipeRow> = builder
        .build_query_as()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RecipePayload {
        RecipePayload {
            name: String::from("Pancakes"),
            text: String::from("Mix and fry."),
            image: String::from("images/pancakes.png"),
            cooking_time: 20,
            ingredients: vec![
                IngredientAmount { id: 1, amount: 100 },
                IngredientAmount { id: 2, amount: 2 },
            ],
            tags: vec![1, 2],
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert!(validate_recipe_payload(&payload()).is_ok());
    }

    #[test]
    fn cooking_time_bounds_are_enforced() {
        let mut p = payload();
        p.cooking_time = 0;
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );

        p.cooking_time = 10001;
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );

        p.cooking_time = 10000;
        assert!(validate_recipe_payload(&p).is_ok());
    }

    #[test]
    fn amount_bounds_are_enforced() {
        let mut p = payload();
        p.ingredients[1].amount = 0;
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );

        p.ingredients[1].amount = 10001;
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );
    }

    #[test]
    fn duplicate_ingredient_is_rejected() {
        let mut p = payload();
        p.ingredients.push(IngredientAmount { id: 1, amount: 50 });
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );
    }

    #[test]
    fn empty_line_set_is_rejected() {
        let mut p = payload();
        p.ingredients.clear();
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut p = payload();
        p.name = String::from("   ");
        assert_eq!(
            validate_recipe_payload(&p).unwrap_err().kind,
            ErrorKind::Validation
        );
    }
}
