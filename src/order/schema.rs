use sqlx::{Pool, Sqlite};

const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT 'NORMAL',
    updated_date DATE
)";

const CREATE_ORDERS: &str = "CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users (id),
    item_name TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_date DATE NOT NULL
)";

const CREATE_ORDERS_DATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_orders_created_date ON orders (created_date)";

/// Creates the `users` and `orders` tables if needed.
pub async fn create_schema(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    for statement in [CREATE_USERS, CREATE_ORDERS, CREATE_ORDERS_DATE_INDEX] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
