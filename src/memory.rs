//! In-memory gateway used by the engine and catalogue tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Weekday;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::models::{
    ActionLogEntry, Association, Category, CategoryId, CategoryKind, ClassId, ClassLogEntry,
    ClassRecord, NewLogEntry, ShopItem, StudentId, StudentRecord, Subcategory, SubcategoryId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SetDaily(StudentId),
    SetTotals(StudentId),
    SetWeekly(StudentId),
    SetClassPoints,
    RecordRollover,
    AppendLog,
    DeleteLog,
    CatalogueQuery,
    InsertAssociation(Association, i64),
    DeleteAssociation(Association, i64),
}

#[derive(Default)]
struct State {
    classes: BTreeMap<ClassId, ClassRecord>,
    students: BTreeMap<StudentId, StudentRecord>,
    logs: Vec<ActionLogEntry>,
    categories: BTreeMap<CategoryId, (String, CategoryKind)>,
    subcategories: BTreeMap<SubcategoryId, (CategoryId, String, i32)>,
    shop_items: BTreeMap<i64, (String, i32)>,
    associations: BTreeSet<(Association, ClassId, i64)>,
    failures: HashSet<FailPoint>,
    journal: Vec<String>,
    catalogue_queries: usize,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory gateway lock")
    }

    pub fn add_class(&self, id: ClassId, name: &str) {
        self.state().classes.insert(
            id,
            ClassRecord {
                id,
                name: name.to_string(),
                points: 0,
                last_rollover_day: None,
            },
        );
    }

    pub fn add_student(
        &self,
        class_id: ClassId,
        id: StudentId,
        name: &str,
        daily: Option<i32>,
        weekly: i32,
    ) {
        self.state().students.insert(
            id,
            StudentRecord {
                id,
                class_id,
                name: name.to_string(),
                daily_points: daily,
                weekly_points: weekly,
            },
        );
    }

    pub fn add_category(&self, id: CategoryId, name: &str, kind: CategoryKind) {
        self.state().categories.insert(id, (name.to_string(), kind));
    }

    pub fn add_subcategory(
        &self,
        id: SubcategoryId,
        category_id: CategoryId,
        name: &str,
        points: i32,
    ) {
        self.state()
            .subcategories
            .insert(id, (category_id, name.to_string(), points));
    }

    pub fn add_shop_item(&self, id: i64, name: &str, cost: i32) {
        self.state().shop_items.insert(id, (name.to_string(), cost));
    }

    pub fn link(&self, association: Association, class_id: ClassId, item_id: i64) {
        self.state().associations.insert((association, class_id, item_id));
    }

    pub fn is_linked(&self, association: Association, class_id: ClassId, item_id: i64) -> bool {
        self.state()
            .associations
            .contains(&(association, class_id, item_id))
    }

    pub fn fail(&self, point: FailPoint) {
        self.state().failures.insert(point);
    }

    pub fn heal(&self, point: FailPoint) {
        self.state().failures.remove(&point);
    }

    pub fn student(&self, id: StudentId) -> Option<StudentRecord> {
        self.state().students.get(&id).cloned()
    }

    pub fn class(&self, id: ClassId) -> Option<ClassRecord> {
        self.state().classes.get(&id).cloned()
    }

    pub fn logs(&self) -> Vec<ActionLogEntry> {
        self.state().logs.clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    pub fn catalogue_queries(&self) -> usize {
        self.state().catalogue_queries
    }

    fn check(state: &State, point: FailPoint) -> GatewayResult<()> {
        if state.failures.contains(&point) {
            return Err(GatewayError::Rejected(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn student_mut(state: &mut State, id: StudentId) -> GatewayResult<&mut StudentRecord> {
        state
            .students
            .get_mut(&id)
            .ok_or_else(|| GatewayError::Rejected(format!("student {id} not found")))
    }

    fn class_mut(state: &mut State, id: ClassId) -> GatewayResult<&mut ClassRecord> {
        state
            .classes
            .get_mut(&id)
            .ok_or_else(|| GatewayError::Rejected(format!("class {id} not found")))
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch_class(&self, class_id: ClassId) -> GatewayResult<Option<ClassRecord>> {
        Ok(self.state().classes.get(&class_id).cloned())
    }

    async fn fetch_students(&self, class_id: ClassId) -> GatewayResult<Vec<StudentRecord>> {
        Ok(self
            .state()
            .students
            .values()
            .filter(|student| student.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn fetch_daily_points(&self, student_id: StudentId) -> GatewayResult<Option<i32>> {
        Ok(self
            .state()
            .students
            .get(&student_id)
            .and_then(|student| student.daily_points))
    }

    async fn set_daily_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()> {
        let mut state = self.state();
        Self::check(&state, FailPoint::SetDaily(student_id))?;
        Self::student_mut(&mut state, student_id)?.daily_points = Some(points);
        state.journal.push(format!("daily {student_id}={points}"));
        Ok(())
    }

    async fn set_weekly_points(&self, student_id: StudentId, points: i32) -> GatewayResult<()> {
        let mut state = self.state();
        Self::check(&state, FailPoint::SetWeekly(student_id))?;
        Self::student_mut(&mut state, student_id)?.weekly_points = points;
        state.journal.push(format!("weekly {student_id}={points}"));
        Ok(())
    }

    async fn set_student_totals(
        &self,
        student_id: StudentId,
        daily_points: i32,
        weekly_points: i32,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        Self::check(&state, FailPoint::SetTotals(student_id))?;
        let student = Self::student_mut(&mut state, student_id)?;
        student.daily_points = Some(daily_points);
        student.weekly_points = weekly_points;
        state
            .journal
            .push(format!("totals {student_id}={daily_points}/{weekly_points}"));
        Ok(())
    }

    async fn set_class_points(&self, class_id: ClassId, points: i32) -> GatewayResult<()> {
        let mut state = self.state();
        Self::check(&state, FailPoint::SetClassPoints)?;
        Self::class_mut(&mut state, class_id)?.points = points;
        state.journal.push(format!("class {class_id} points={points}"));
        Ok(())
    }

    async fn record_rollover(
        &self,
        class_id: ClassId,
        points: i32,
        day: Weekday,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        Self::check(&state, FailPoint::RecordRollover)?;
        let class = Self::class_mut(&mut state, class_id)?;
        class.points = points;
        class.last_rollover_day = Some(day);
        state
            .journal
            .push(format!("rollover {class_id} points={points} day={day}"));
        Ok(())
    }

    async fn append_log(&self, entry: NewLogEntry) -> GatewayResult<ActionLogEntry> {
        let mut state = self.state();
        Self::check(&state, FailPoint::AppendLog)?;
        let entry = entry.into_entry(Uuid::new_v4());
        state.logs.push(entry.clone());
        Ok(entry)
    }

    async fn fetch_log_entry(&self, entry_id: Uuid) -> GatewayResult<Option<ActionLogEntry>> {
        Ok(self
            .state()
            .logs
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned())
    }

    async fn delete_log_entry(&self, entry_id: Uuid) -> GatewayResult<bool> {
        let mut state = self.state();
        Self::check(&state, FailPoint::DeleteLog)?;
        let before = state.logs.len();
        state.logs.retain(|entry| entry.id != entry_id);
        Ok(state.logs.len() < before)
    }

    async fn fetch_student_logs(
        &self,
        student_id: StudentId,
        limit: Option<i64>,
    ) -> GatewayResult<Vec<ActionLogEntry>> {
        let state = self.state();
        // Insertion order breaks timestamp ties, newest last.
        let mut entries: Vec<(usize, ActionLogEntry)> = state
            .logs
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, entry)| entry.student_id == student_id)
            .collect();
        entries.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });
        let limit = limit.map_or(usize::MAX, |value| value.max(0) as usize);
        Ok(entries
            .into_iter()
            .map(|(_, entry)| entry)
            .take(limit)
            .collect())
    }

    async fn fetch_class_logs(
        &self,
        class_id: ClassId,
        limit: i64,
    ) -> GatewayResult<Vec<ClassLogEntry>> {
        let state = self.state();
        let mut entries: Vec<(usize, ClassLogEntry)> = state
            .logs
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let student = state.students.get(&entry.student_id)?;
                (student.class_id == class_id).then(|| {
                    (
                        index,
                        ClassLogEntry {
                            student_name: student.name.clone(),
                            entry: entry.clone(),
                        },
                    )
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.1.entry
                .created_at
                .cmp(&a.1.entry.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });
        Ok(entries
            .into_iter()
            .map(|(_, entry)| entry)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn categories_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<Category>> {
        let mut state = self.state();
        Self::check(&state, FailPoint::CatalogueQuery)?;
        state.catalogue_queries += 1;
        Ok(state
            .categories
            .iter()
            .map(|(id, (name, kind))| Category {
                id: *id,
                name: name.clone(),
                kind: *kind,
                is_selected: state
                    .associations
                    .contains(&(Association::Category, class_id, *id)),
            })
            .collect())
    }

    async fn subcategories_with_selection(
        &self,
        class_id: ClassId,
    ) -> GatewayResult<Vec<Subcategory>> {
        let state = self.state();
        Self::check(&state, FailPoint::CatalogueQuery)?;
        Ok(state
            .subcategories
            .iter()
            .map(|(id, (category_id, name, points))| Subcategory {
                id: *id,
                category_id: *category_id,
                name: name.clone(),
                points: *points,
                is_selected: state
                    .associations
                    .contains(&(Association::Subcategory, class_id, *id)),
            })
            .collect())
    }

    async fn shop_items_with_selection(&self, class_id: ClassId) -> GatewayResult<Vec<ShopItem>> {
        let mut state = self.state();
        Self::check(&state, FailPoint::CatalogueQuery)?;
        state.catalogue_queries += 1;
        Ok(state
            .shop_items
            .iter()
            .map(|(id, (name, cost))| ShopItem {
                id: *id,
                name: name.clone(),
                cost: *cost,
                is_selected: state
                    .associations
                    .contains(&(Association::ShopItem, class_id, *id)),
            })
            .collect())
    }

    async fn insert_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        state
            .journal
            .push(format!("insert {association} {class_id}/{item_id}"));
        Self::check(&state, FailPoint::InsertAssociation(association, item_id))?;
        state.associations.insert((association, class_id, item_id));
        Ok(())
    }

    async fn delete_association(
        &self,
        association: Association,
        class_id: ClassId,
        item_id: i64,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        state
            .journal
            .push(format!("delete {association} {class_id}/{item_id}"));
        Self::check(&state, FailPoint::DeleteAssociation(association, item_id))?;
        state.associations.remove(&(association, class_id, item_id));
        Ok(())
    }

    async fn insert_category(&self, name: &str, kind: CategoryKind) -> GatewayResult<CategoryId> {
        let mut state = self.state();
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.categories.insert(id, (name.to_string(), kind));
        Ok(id)
    }

    async fn update_category(
        &self,
        category_id: CategoryId,
        name: &str,
        kind: CategoryKind,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        let category = state
            .categories
            .get_mut(&category_id)
            .ok_or_else(|| GatewayError::Rejected(format!("category {category_id} not found")))?;
        *category = (name.to_string(), kind);
        Ok(())
    }

    async fn delete_category(&self, category_id: CategoryId) -> GatewayResult<()> {
        let mut state = self.state();
        state.categories.remove(&category_id);
        state
            .subcategories
            .retain(|_, (parent, _, _)| *parent != category_id);
        Ok(())
    }

    async fn insert_subcategory(
        &self,
        category_id: CategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<SubcategoryId> {
        let mut state = self.state();
        if !state.categories.contains_key(&category_id) {
            return Err(GatewayError::Rejected(format!(
                "category {category_id} not found"
            )));
        }
        state.next_id += 1;
        let id = 2000 + state.next_id;
        state
            .subcategories
            .insert(id, (category_id, name.to_string(), points));
        Ok(id)
    }

    async fn update_subcategory(
        &self,
        subcategory_id: SubcategoryId,
        name: &str,
        points: i32,
    ) -> GatewayResult<()> {
        let mut state = self.state();
        let subcategory = state.subcategories.get_mut(&subcategory_id).ok_or_else(|| {
            GatewayError::Rejected(format!("subcategory {subcategory_id} not found"))
        })?;
        subcategory.1 = name.to_string();
        subcategory.2 = points;
        Ok(())
    }

    async fn delete_subcategory(&self, subcategory_id: SubcategoryId) -> GatewayResult<()> {
        self.state().subcategories.remove(&subcategory_id);
        Ok(())
    }
}
