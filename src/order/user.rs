use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use log::info;
use sqlx::{QueryBuilder, Row, Sqlite, sqlite::SqliteRow};

use crate::{
    BatchError,
    core::item::{ItemProcessor, ItemProcessorResult, Processed},
    item::rdbc::{RowMapper, SqliteItemBinder},
};

/// Membership level of a user, from the lowest to the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Normal,
    Silver,
    Gold,
    Vip,
}

impl Level {
    /// The level reached from this one, if any.
    pub fn next(&self) -> Option<Level> {
        match self {
            Level::Normal => Some(Level::Silver),
            Level::Silver => Some(Level::Gold),
            Level::Gold => Some(Level::Vip),
            Level::Vip => None,
        }
    }

    /// Total order amount needed to reach this level.
    pub fn threshold(&self) -> i64 {
        match self {
            Level::Normal => 0,
            Level::Silver => 200_000,
            Level::Gold => 300_000,
            Level::Vip => 500_000,
        }
    }

    /// The highest level a total order amount qualifies for.
    pub fn for_total_amount(total_amount: i64) -> Level {
        [Level::Vip, Level::Gold, Level::Silver]
            .into_iter()
            .find(|level| total_amount >= level.threshold())
            .unwrap_or(Level::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Normal => "NORMAL",
            Level::Silver => "SILVER",
            Level::Gold => "GOLD",
            Level::Vip => "VIP",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NORMAL" => Ok(Level::Normal),
            "SILVER" => Ok(Level::Silver),
            "GOLD" => Ok(Level::Gold),
            "VIP" => Ok(Level::Vip),
            other => Err(BatchError::TransformError(format!("unknown level: {}", other))),
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub item_name: String,
    pub amount: i64,
    pub created_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub level: Level,
    /// Sum of the amounts of the user's orders
    pub total_amount: i64,
    pub updated_date: Option<NaiveDate>,
}

impl User {
    pub fn new(id: i64, username: &str, total_amount: i64) -> Self {
        Self {
            id,
            username: username.to_string(),
            level: Level::Normal,
            total_amount,
            updated_date: None,
        }
    }

    /// Whether the user's orders qualify them for the level above their current one.
    pub fn available_level_up(&self) -> bool {
        self.level
            .next()
            .is_some_and(|next| self.total_amount >= next.threshold())
    }

    /// Moves the user to the level their total order amount qualifies for.
    pub fn level_up(&self, today: NaiveDate) -> User {
        User {
            level: Level::for_total_amount(self.total_amount).max(self.level),
            updated_date: Some(today),
            ..self.clone()
        }
    }
}

/// Keeps the users eligible for a level up, leveled up as of `today`.
pub struct LevelUpProcessor {
    today: NaiveDate,
}

impl LevelUpProcessor {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl ItemProcessor<User, User> for LevelUpProcessor {
    fn process(&self, user: &User) -> ItemProcessorResult<User> {
        if user.available_level_up() {
            info!("user update target id: {}", user.id);
            Ok(Processed::Keep(user.level_up(self.today)))
        } else {
            Ok(Processed::Drop)
        }
    }
}

/// Columns read by [`UserRowMapper`], in order.
pub const USER_SELECT_CLAUSE: &str =
    "u.id, u.username, u.level, u.updated_date, COALESCE(sum(o.amount), 0)";
pub const USER_FROM_CLAUSE: &str = "users u LEFT JOIN orders o ON o.user_id = u.id";
pub const USER_GROUP_CLAUSE: &str = "u.id";

pub struct UserRowMapper;

impl RowMapper<User> for UserRowMapper {
    fn map_row(&self, row: &SqliteRow) -> Result<User, BatchError> {
        let unavailable = |error: sqlx::Error| BatchError::SourceUnavailable(error.to_string());
        let level: String = row.try_get(2).map_err(unavailable)?;

        Ok(User {
            id: row.try_get(0).map_err(unavailable)?,
            username: row.try_get(1).map_err(unavailable)?,
            level: level.parse()?,
            updated_date: row.try_get(3).map_err(unavailable)?,
            total_amount: row.try_get(4).map_err(unavailable)?,
        })
    }
}

/// `UPDATE users SET level = ?, updated_date = ? WHERE id = ?`
pub struct UserLevelUpBinder;

impl SqliteItemBinder<User> for UserLevelUpBinder {
    fn bind(&self, user: &User, query_builder: &mut QueryBuilder<'_, Sqlite>) {
        query_builder.push("UPDATE users SET level = ");
        query_builder.push_bind(user.level.as_str());
        query_builder.push(", updated_date = ");
        query_builder.push_bind(user.updated_date);
        query_builder.push(" WHERE id = ");
        query_builder.push_bind(user.id);
    }
}
