use std::collections::HashMap;

use sqlx::{Pool, Postgres};
use warp::Reply;

use crate::{
    constants::SHOPPING_LIST_FILENAME,
    error::{Error, QueryError},
    schema::CartLine,
};

/// One consolidated shopping-list line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListEntry {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Every ingredient line reachable from the user's cart, with the catalog
/// fields resolved. Ordered newest recipe first, then by ingredient name, so
/// accumulation order is deterministic.
pub async fn fetch_cart_lines(
    user_id: i32,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartLine>, Error> {
    let rows: Vec<CartLine> = sqlx::query_as(
        "
        SELECT r.id AS recipe_id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_cart c
        INNER JOIN recipes r ON r.id = c.recipe_id
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = r.id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        ORDER BY r.pub_date DESC, i.name
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// Folds cart lines into one entry per (name, unit) key. Catalog rows sharing
/// a name and unit collapse together; entry order is the order the keys were
/// first encountered.
pub fn aggregate_shopping_list(lines: &[CartLine]) -> Vec<ShoppingListEntry> {
    let mut entries: Vec<ShoppingListEntry> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for line in lines {
        let key = (line.name.to_owned(), line.measurement_unit.to_owned());
        match index.get(&key) {
            Some(&i) => entries[i].total_amount += i64::from(line.amount),
            None => {
                index.insert(key, entries.len());
                entries.push(ShoppingListEntry {
                    name: line.name.to_owned(),
                    measurement_unit: line.measurement_unit.to_owned(),
                    total_amount: i64::from(line.amount),
                });
            }
        }
    }

    entries
}

/// Plain-text export body: one `"{name} ({unit}) - {total}"` line per entry.
pub fn render_shopping_list(entries: &[ShoppingListEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{} ({}) - {}\n",
                entry.name, entry.measurement_unit, entry.total_amount
            )
        })
        .collect()
}

/// Builds the download reply around a rendered body.
pub fn shopping_list_reply(body: String) -> impl Reply {
    let reply = warp::reply::with_header(body, "Content-Type", "text/plain; charset=UTF-8");
    warp::reply::with_header(
        reply,
        "Content-Disposition",
        format!("attachment; filename={SHOPPING_LIST_FILENAME}"),
    )
}

/// Full export pipeline for a user's cart.
pub async fn export_shopping_list(user_id: i32, pool: &Pool<Postgres>) -> Result<String, Error> {
    let lines = fetch_cart_lines(user_id, pool).await?;
    let entries = aggregate_shopping_list(&lines);
    Ok(render_shopping_list(&entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(recipe_id: i32, name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            recipe_id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn identical_name_and_unit_collapse_into_one_entry() {
        let lines = vec![line(1, "Flour", "g", 100), line(2, "Flour", "g", 150)];
        let entries = aggregate_shopping_list(&lines);
        assert_eq!(entries.len(), 1);
        assert_eq!(render_shopping_list(&entries), "Flour (g) - 250\n");
    }

    #[test]
    fn different_units_stay_separate() {
        let lines = vec![line(1, "Milk", "ml", 200), line(2, "Milk", "l", 1)];
        let entries = aggregate_shopping_list(&lines);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn entries_keep_first_encountered_order() {
        let lines = vec![
            line(1, "Sugar", "g", 50),
            line(1, "Eggs", "pcs", 2),
            line(2, "Sugar", "g", 25),
            line(2, "Butter", "g", 30),
        ];
        let entries = aggregate_shopping_list(&lines);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Sugar", "Eggs", "Butter"]);
        assert_eq!(entries[0].total_amount, 75);
    }

    #[test]
    fn empty_cart_renders_nothing() {
        let entries = aggregate_shopping_list(&[]);
        assert!(entries.is_empty());
        assert_eq!(render_shopping_list(&entries), "");
    }

    #[test]
    fn render_format_matches_export_contract() {
        let entries = vec![ShoppingListEntry {
            name: String::from("Olive oil"),
            measurement_unit: String::from("ml"),
            total_amount: 30,
        }];
        assert_eq!(render_shopping_list(&entries), "Olive oil (ml) - 30\n");
    }
}
