/// Shared bound for ingredient amounts and cooking time (minutes).
pub const MIN_AMOUNT: i32 = 1;
pub const MAX_AMOUNT: i32 = 10000;

pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const INGREDIENT_COUNT_PER_PAGE: i64 = 100;
pub const FOLLOW_COUNT_PER_PAGE: i64 = 6;
pub const MAX_COUNT_PER_PAGE: i64 = 100;

pub const SHOPPING_LIST_FILENAME: &str = "ingredients.txt";

pub const RESERVED_USERNAMES: &[&str] = &["me"];
