use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ClassId = i64;
pub type StudentId = i64;
pub type CategoryId = i64;
pub type SubcategoryId = i64;
pub type ShopItemId = i64;

/// Category label used for shop purchases in the action log.
pub const SHOP_CATEGORY: &str = "Shop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: String,
    pub points: i32,
    pub last_rollover_day: Option<Weekday>,
}

/// A student row as stored. `daily_points` is `None` until the first
/// adjustment of the day creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: StudentId,
    pub class_id: ClassId,
    pub name: String,
    pub daily_points: Option<i32>,
    pub weekly_points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub daily_points: i32,
    pub weekly_points: i32,
}

impl Student {
    pub fn from_record(record: StudentRecord, default_daily: i32) -> Self {
        Self {
            id: record.id,
            name: record.name,
            daily_points: record.daily_points.unwrap_or(default_daily),
            weekly_points: record.weekly_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub student_id: StudentId,
    pub points: i32,
    pub category: String,
    pub subcategory: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub student_id: StudentId,
    pub points: i32,
    pub category: String,
    pub subcategory: String,
    pub created_at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn into_entry(self, id: Uuid) -> ActionLogEntry {
        ActionLogEntry {
            id,
            student_id: self.student_id,
            points: self.points,
            category: self.category,
            subcategory: self.subcategory,
            created_at: self.created_at,
        }
    }
}

/// Log entry joined with the student's display name, for class-wide feeds.
#[derive(Debug, Clone, Serialize)]
pub struct ClassLogEntry {
    pub student_name: String,
    pub entry: ActionLogEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Positive,
    Negative,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Positive => "positive",
            CategoryKind::Negative => "negative",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "positive" => Ok(CategoryKind::Positive),
            "negative" => Ok(CategoryKind::Negative),
            other => Err(format!("unknown category kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub kind: CategoryKind,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subcategory {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub name: String,
    pub points: i32,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopItem {
    pub id: ShopItemId,
    pub name: String,
    pub cost: i32,
    pub is_selected: bool,
}

/// Class-to-catalogue link tables written by selection commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Association {
    Category,
    Subcategory,
    ShopItem,
}

impl Association {
    pub fn as_str(self) -> &'static str {
        match self {
            Association::Category => "class_categories",
            Association::Subcategory => "class_sub_categories",
            Association::ShopItem => "class_shop_items",
        }
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored as 0 = Sunday .. 6 = Saturday.
pub fn weekday_to_db(day: Weekday) -> i16 {
    day.num_days_from_sunday() as i16
}

pub fn weekday_from_db(value: i16) -> Option<Weekday> {
    match value {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}
