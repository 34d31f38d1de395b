use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::models::{
    weekday_from_db, weekday_to_db, ActionLogEntry, Association, Category, CategoryId,
    CategoryKind, ClassId, ClassLogEntry, ClassRecord, NewLogEntry, ShopItem, StudentId,
    StudentRecord, Subcategory, SubcategoryId,
};

pub async fn init_db(pool: &PgPool) -> GatewayResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SEED_CATALOGUE: &[(&str, CategoryKind, &[(&str, i32)])] = &[
    (
        "Punctuality",
        CategoryKind::Negative,
        &[
            ("Up to 2 minutes late", -3),
            ("5 to 10 minutes late", -5),
            ("Over 10 minutes late", -10),
            ("Over 20 minutes late", -30),
        ],
    ),
    (
        "Attendance",
        CategoryKind::Negative,
        &[
            ("Absent", -100),
            ("Staying in class", -3),
            ("Staying seated", -3),
        ],
    ),
    (
        "Respectful behavior",
        CategoryKind::Negative,
        &[
            ("Disruption", -5),
            ("Respect toward a classmate", -3),
            ("Respect toward the teacher", -5),
            ("Physical aggression", -5),
            ("Rough play", -3),
            ("Tattling", -3),
            ("Listening to staff", -3),
            ("Caring for school property", -5),
            ("Phone use", -4),
            ("Verbal aggression", -5),
            ("Dress code", -5),
            ("Exceptional misconduct", -15),
        ],
    ),
    (
        "Bonuses",
        CategoryKind::Positive,
        &[
            ("Helping a friend or staff", 3),
            ("Task bonus", 3),
            ("Large task bonus", 5),
            ("Teacher's discretion", 5),
            ("Teacher's discretion, large", 10),
            ("Ready for class", 5),
        ],
    ),
];

const SEED_SHOP: &[(&str, i32)] = &[
    ("Licorice", 85),
    ("Lollipop", 100),
    ("Candy necklace", 100),
    ("Chocolate", 200),
    ("Ice cream roll", 400),
    ("20 minutes of computer time", 150),
    ("15 minutes in the yard", 150),
    ("15 minutes of phone time", 150),
    ("30 minutes of phone time", 300),
    ("Phone for a 45 minute lesson", 450),
    ("Surprise horn", 300),
    ("Board game or snooker, 20 minutes", 200),
];

/// Inserts a demo class with students, the default behavior catalogue and
/// shop, all enabled for the class. Returns the class id.
pub async fn seed(pool: &PgPool) -> anyhow::Result<ClassId> {
    let class_id: ClassId = sqlx::query(
        r#"
        INSERT INTO classes (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind("Grade 5B")
    .fetch_one(pool)
    .await?
    .get("id");

    for name in ["Noa Levi", "Itai Cohen", "Maya Peretz", "Eitan Mizrahi"] {
        sqlx::query(
            r#"
            INSERT INTO students (class_id, name)
            VALUES ($1, $2)
            ON CONFLICT (class_id, name) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let existing: i64 = sqlx::query("SELECT COUNT(*) AS total FROM categories")
        .fetch_one(pool)
        .await?
        .get("total");
    if existing == 0 {
        for (name, kind, subcategories) in SEED_CATALOGUE {
            let category_id: CategoryId = sqlx::query(
                "INSERT INTO categories (name, kind) VALUES ($1, $2) RETURNING id",
            )
            .bind(*name)
            .bind(kind.as_str())
            .fetch_one(pool)
            .await?
            .get("id");

            for (label, points) in subcategories.iter() {
                sqlx::query(
                    "INSERT INTO sub_categories (category_id, name, points) VALUES ($1, $2, $3)",
                )
                .bind(category_id)
                .bind(*label)
                .bind(*points)
                .execute(pool)
                .await?;
            }
        }
    }

    for (name, cost) in SEED_SHOP {
        sqlx::query(
            r#"
            INSERT INTO shop_items (name, cost)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET cost = EXCLUDED.cost
            "#,
        )
        .bind(*name)
        .bind(*cost)
        .execute(pool)
        .await?;
    }

    for statement in [
        "INSERT INTO class_categories (class_id, category_id) \
         SELECT $1, id FROM categories ON CONFLICT DO NOTHING",
        "INSERT INTO class_sub_categories (class_id, sub_category_id) \
         SELECT $1, id FROM sub_categories ON CONFLICT DO NOTHING",
        "INSERT INTO class_shop_items (class_id, shop_item_id) \
         SELECT $1, id FROM shop_items ON CONFLICT DO NOTHING",
    ] {
        sqlx::query(statement).bind(class_id).execute(pool).await?;
    }

    Ok(class_id)
}

/// Adds students from a CSV with `name` and optional `weekly_points` columns.
/// Names already on the class roster are skipped.
pub async fn import_roster(
    pool: &PgPool,
    class_id: ClassId,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        weekly_points: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let name = row.name.trim();
        if name.is_empty() {
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO students (class_id, name, weekly_points)
            VALUES ($1, $2, $3)
            ON CONFLICT (class_id, name) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(name)
        .bind(row.weekly_points.unwrap_or(0))
        .execute(pool)
        .await
        .with_context(|| format!("failed to import student {name}"))?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

fn association_target(association: Association) -> (&'static str, &'static str) {
    match association {
        Association::Category => ("class_categories", "category_id"),
        Association::Subcategory => ("class_sub_categories", "sub_category_id"),
        Association::ShopItem => ("class_shop_items", "shop_item_id"),
    }
}

fn expect_row(result: PgQueryResult, what: &str) -> GatewayResult<()> {
    if result.rows_affected() == 0 {
        return Err(GatewayError::Rejected(format!("{what} not found")));
    }
    Ok(())
}

fn log_entry_from_row(row: &PgRow) -> ActionLogEntry {
    ActionLogEntry {
        id: row.get("id"),
        student_id: row.get("student_id"),
        points: row.get("points"),
        category: row.get("category"),
        subcategory: row.get("subcategory"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn category_kind(row: &PgRow) -> GatewayResult<CategoryKind> {
    row.get::<String, _>("kind")
        .parse::<CategoryKind>()
        .map_err(GatewayError::Corrupt)
}

/// Postgres-backed gateway.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Gateway for PgGateway {
    async fn fetch_class(&self, class_id: ClassId) -> GatewayResult<Option<ClassRecord>> {
        let row = sqlx::query(
            "SELECT id, name, points, last_rollover_day FROM classes WHERE id = $1",
        )
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> GatewayResult<ClassRecord> {
            let last_rollover_day = row
                .get::<Option<i16>, _>("last_rollover_day")
                .map(|value| {
                    weekday_from_db(value).ok_or_else(|| {
                        GatewayError::Corrupt(format!("weekday {value} out of range"))
                    })
                })
                .transpose()?;
            Ok(ClassRecord {
                id: row.get("id"),
                name: row.get("name"),
                points: row.get("points"),
                last_rollover_day,
            })
        })
        .transpose()
    }

    async fn fetch_students(&self, class_id: ClassId) -> GatewayResult<Vec<StudentRecord>> {
        let rows = sqlx::query(
            "SELECT id, class_id, name, daily_points, weekly_points \
             FROM students WHERE class_id = $1 ORDER BY name",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StudentRecord {
                id: row.get("id"),
                class_id: row.get("class_id"),
                name: row.get("name"),
                daily_points: row.get("daily_points"),
                weekly_points: row.get("weekly_points"),
            })
            .collect())
    }

    async fn fetch_daily_points(&self, student_id: StudentId) -> GatewayResult<Option<i32>> {
        let row = sqlx::query("SELECT daily_points FROM students WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|row| row.get::<Option<i32>, _>("daily_points")))
    }

    async fn set_daily_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()> {
        let result = sqlx::query("UPDATE students SET daily_points = $2 WHERE id = $1")
            .bind(student_id)
            .bind(points)
            .execute(&self.pool)
            .await?;
        expect_row(result, "student")
    }

    async fn set_weekly_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()> {
        let result = sqlx::query("UPDATE students SET weekly_points = $2 WHERE id = $1")
            .bind(student_id)
            .bind(points)
            .execute(&self.pool)
            .await?;
        expect_row(result, "student")
    }

    async fn set_student_totals(
        &self,
        student_id: StudentId,
        daily_points: i32,
        weekly_points: i32,
    ) -> GatewayResult<()> {
        let result = sqlx::query(
            "UPDATE students SET daily_points = $2, weekly_points = $3 WHERE id = $1",
        )
        .bind(student_id)
        .bind(daily_points)
        .bind(weekly_points)
        .execute(&self.pool)
        .await?;
        expect_row(result, "student")
    }

    async fn set_class_points(&self, class_id: ClassId, points: i32) -> GatewayResult<()> {
        let result = sqlx::query("UPDATE classes SET points = $2 WHERE id = $1")
            .bind(class_id)
            .bind(points)
            .execute(&self.pool)
            .await?;
        expect_row(result, "class")
    }

    async fn record_rollover(
        &self,
        class_id: ClassId,
        points: i32,
        day: Weekday,
    ) -> GatewayResult<()> {
        let result = sqlx::query(
            "UPDATE classes SET points = $2, last_rollover_day = $3 WHERE id = $1",
        )
        .bind(class_id)
        .bind(points)
        .bind(weekday_to_db(day))
        .execute(&self.pool)
        .await?;
        expect_row(result, "class")
    }

    async fn append_log(&self, entry: NewLogEntry) -> GatewayResult<ActionLogEntry> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO action_log (id, student_id, points, category, subcategory, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(entry.student_id)
        .bind(entry.points)
        .bind(&entry.category)
        .bind(&entry.subcategory)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(entry.into_entry(id))
    }

    async fn fetch_log_entry(&self, entry_id: Uuid) -> GatewayResult<Option<ActionLogEntry>> {
        let row = sqlx::query(
            "SELECT id, student_id, points, category, subcategory, created_at \
             FROM action_log WHERE id = $1",
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(log_entry_from_row))
    }

    async fn delete_log_entry(&self, entry_id: Uuid) -> GatewayResult<bool> {
        let result = sqlx::query("DELETE FROM action_log WHERE id = $1")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_student_logs(
        &self,
        student_id: StudentId,
        limit: Option<i64>,
    ) -> GatewayResult<Vec<ActionLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, student_id, points, category, subcategory, created_at \
             FROM action_log WHERE student_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(log_entry_from_row).collect())
    }

    async fn fetch_class_logs(
        &self,
        class_id: ClassId,
        limit: i64,
    ) -> GatewayResult<Vec<ClassLogEntry>> {
        let rows = sqlx::query(
            "SELECT l.id, l.student_id, l.points, l.category, l.subcategory, l.created_at, \
             s.name AS student_name \
             FROM action_log l \
             JOIN students s ON s.id = l.student_id \
             WHERE s.class_id = $1 \
             ORDER BY l.created_at DESC LIMIT $2",
        )
        .bind(class_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ClassLogEntry {
                student_name: row.get("student_name"),
                entry: log_entry_from_row(row),
            })
            .collect())
    }

    async fn categories_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, name, kind, is_selected FROM get_categories_with_selection($1)",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> GatewayResult<Category> {
                Ok(Category {
                    id: row.get("id"),
                    name: row.get("name"),
                    kind: category_kind(row)?,
                    is_selected: row.get("is_selected"),
                })
            })
            .collect()
    }

    async fn subcategories_with_selection(
        &self,
        class_id: ClassId,
    ) -> GatewayResult<Vec<Subcategory>> {
        let rows = sqlx::query(
            "SELECT id, category_id, name, points, is_selected \
             FROM get_sub_categories_with_selection($1)",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Subcategory {
                id: row.get("id"),
                category_id: row.get("category_id"),
                name: row.get("name"),
                points: row.get("points"),
                is_selected: row.get("is_selected"),
            })
            .collect())
    }

    async fn shop_items_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<ShopItem>> {
        let rows = sqlx::query(
            "SELECT id, name, cost, is_selected FROM get_shop_items_with_selection($1)",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ShopItem {
                id: row.get("id"),
                name: row.get("name"),
                cost: row.get("cost"),
                is_selected: row.get("is_selected"),
            })
            .collect())
    }

    async fn insert_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()> {
        let (table, column) = association_target(association);
        let statement = format!(
            "INSERT INTO {table} (class_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
        sqlx::query(&statement)
            .bind(class_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()> {
        let (table, column) = association_target(association);
        let statement = format!("DELETE FROM {table} WHERE class_id = $1 AND {column} = $2");
        sqlx::query(&statement)
            .bind(class_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_category(&self, name: &str, kind: CategoryKind) -> GatewayResult<CategoryId> {
        let id = sqlx::query("INSERT INTO categories (name, kind) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?
            .get("id");
        Ok(id)
    }

    async fn update_category(
        &self,
        category_id: CategoryId,
        name: &str,
        kind: CategoryKind,
    ) -> GatewayResult<()> {
        let result = sqlx::query("UPDATE categories SET name = $2, kind = $3 WHERE id = $1")
            .bind(category_id)
            .bind(name)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "category")
    }

    async fn delete_category(&self, category_id: CategoryId) -> GatewayResult<()> {
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_subcategory(
        &self,
        category_id: CategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<SubcategoryId> {
        let id = sqlx::query(
            "INSERT INTO sub_categories (category_id, name, points) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(category_id)
        .bind(name)
        .bind(points)
        .fetch_one(&self.pool)
        .await?
        .get("id");
        Ok(id)
    }

    async fn update_subcategory(
        &self,
        subcategory_id: SubcategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<()> {
        let result = sqlx::query("UPDATE sub_categories SET name = $2, points = $3 WHERE id = $1")
            .bind(subcategory_id)
            .bind(name)
            .bind(points)
            .execute(&self.pool)
            .await?;
        expect_row(result, "subcategory")
    }

    async fn delete_subcategory(&self, subcategory_id: SubcategoryId) -> GatewayResult<()> {
        sqlx::query("DELETE FROM sub_categories WHERE id = $1")
            .bind(subcategory_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
