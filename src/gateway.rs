//! Persistence boundary consumed by the scoring engine and the catalogues.
//!
//! Every method is a single statement against storage and is atomic on its
//! own. Sequences of calls are not: callers own the consequences of a failure
//! halfway through a multi-step operation.

use async_trait::async_trait;
use chrono::Weekday;
use uuid::Uuid;

use crate::error::GatewayResult;
use crate::models::{
    ActionLogEntry, Association, Category, CategoryId, CategoryKind, ClassId, ClassLogEntry,
    ClassRecord, NewLogEntry, ShopItem, StudentId, StudentRecord, Subcategory, SubcategoryId,
};

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_class(&self, class_id: ClassId) -> GatewayResult<Option<ClassRecord>>;

    async fn fetch_students(&self, class_id: ClassId) -> GatewayResult<Vec<StudentRecord>>;

    /// `None` when the student has no daily total for the current day yet.
    async fn fetch_daily_points(&self, student_id: StudentId) -> GatewayResult<Option<i32>>;

    async fn set_daily_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()>;

    async fn set_weekly_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()>;

    async fn set_student_totals(
        &self,
        student_id: StudentId,
        daily_points: i32,
        weekly_points: i32,
    ) -> GatewayResult<()>;

    async fn set_class_points(&self, class_id: ClassId, points: i32) -> GatewayResult<()>;

    async fn record_rollover(
        &self,
        class_id: ClassId,
        points: i32,
        day: Weekday,
    ) -> GatewayResult<()>;

    async fn append_log(&self, entry: NewLogEntry) -> GatewayResult<ActionLogEntry>;

    async fn fetch_log_entry(&self, entry_id: Uuid) -> GatewayResult<Option<ActionLogEntry>>;

    /// Returns whether a row was removed.
    async fn delete_log_entry(&self, entry_id: Uuid) -> GatewayResult<bool>;

    /// Newest first.
    async fn fetch_student_logs(
        &self,
        student_id: StudentId,
        limit: Option<i64>,
    ) -> GatewayResult<Vec<ActionLogEntry>>;

    /// Newest first, across every student of the class.
    async fn fetch_class_logs(
        &self,
        class_id: ClassId,
        limit: i64,
    ) -> GatewayResult<Vec<ClassLogEntry>>;

    async fn categories_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<Category>>;

    async fn subcategories_with_selection(
        &self,
        class_id: ClassId,
    ) -> GatewayResult<Vec<Subcategory>>;

    async fn shop_items_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<ShopItem>>;

    async fn insert_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()>;

    async fn delete_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()>;

    async fn insert_category(&self, name: &str, kind: CategoryKind) -> GatewayResult<CategoryId>;

    async fn update_category(
        &self,
        category_id: CategoryId,
        name: &str,
        kind: CategoryKind,
    ) -> GatewayResult<()>;

    async fn delete_category(&self, category_id: CategoryId) -> GatewayResult<()>;

    async fn insert_subcategory(
        &self,
        category_id: CategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<SubcategoryId>;

    async fn update_subcategory(
        &self,
        subcategory_id: SubcategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<()>;

    async fn delete_subcategory(&self, subcategory_id: SubcategoryId) -> GatewayResult<()>;
}
