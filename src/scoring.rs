//! Per-class point state: behavior adjustments, undo, shop purchases and the
//! end-of-day rollover into weekly points.
//!
//! Each operation computes the new totals, persists them, and only then
//! commits them to the in-memory student map. A failure between two
//! persistence steps (for example after the daily total was written but before
//! the log entry was appended) is not compensated; the in-memory state then
//! mirrors what storage accepted and a `reload` resynchronizes everything.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Weekday;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::models::{
    ActionLogEntry, ClassId, ClassLogEntry, ClassRecord, NewLogEntry, ShopItem, Student,
    StudentId, SHOP_CATEGORY,
};

/// Daily total at or above which a student banks the whole day and earns the
/// class a point.
pub const FULL_CREDIT_THRESHOLD: i32 = 85;
/// Daily total at or above which a student banks the partial credit.
pub const PARTIAL_CREDIT_THRESHOLD: i32 = 70;
pub const PARTIAL_CREDIT: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyCredit {
    pub increase: i32,
    pub counts_for_class: bool,
}

pub fn weekly_credit(daily_points: i32) -> WeeklyCredit {
    if daily_points >= FULL_CREDIT_THRESHOLD {
        WeeklyCredit {
            increase: daily_points,
            counts_for_class: true,
        }
    } else if daily_points >= PARTIAL_CREDIT_THRESHOLD {
        WeeklyCredit {
            increase: PARTIAL_CREDIT,
            counts_for_class: false,
        }
    } else {
        WeeklyCredit {
            increase: 0,
            counts_for_class: false,
        }
    }
}

pub fn can_rollover(last_rollover_day: Option<Weekday>, today: Weekday) -> bool {
    last_rollover_day != Some(today)
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRollover {
    pub student_id: StudentId,
    pub name: String,
    pub daily_points: i32,
    pub weekly_increase: i32,
    pub weekly_points: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloverSummary {
    pub rolled: Vec<StudentRollover>,
    pub failed: Vec<StudentId>,
    pub class_points: i32,
}

#[derive(Debug, Clone)]
pub enum RolloverOutcome {
    Completed(RolloverSummary),
    AlreadyRolledOver(Weekday),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetSummary {
    pub reset: usize,
    pub failed: Vec<StudentId>,
}

/// Session context for one class. Constructed once and passed to whatever
/// issues the operations; nothing here is process-global.
pub struct ScoringEngine {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    class: Option<ClassRecord>,
    students: BTreeMap<StudentId, Student>,
}

impl ScoringEngine {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            gateway,
            clock,
            config,
            class: None,
            students: BTreeMap::new(),
        }
    }

    /// Loads the class record and its students, replacing any prior state.
    pub async fn load(&mut self, class_id: ClassId) -> EngineResult<()> {
        let class = self
            .gateway
            .fetch_class(class_id)
            .await?
            .ok_or(EngineError::UnknownClass(class_id))?;
        let records = self.gateway.fetch_students(class_id).await?;
        let default_daily = self.config.default_daily_points;
        self.students = records
            .into_iter()
            .map(|record| (record.id, Student::from_record(record, default_daily)))
            .collect();
        info!(
            class_id,
            class = %class.name,
            students = self.students.len(),
            "class loaded"
        );
        self.class = Some(class);
        Ok(())
    }

    pub fn class(&self) -> Option<&ClassRecord> {
        self.class.as_ref()
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    pub fn student(&self, student_id: StudentId) -> Option<&Student> {
        self.students.get(&student_id)
    }

    pub fn can_rollover(&self) -> bool {
        self.class
            .as_ref()
            .is_some_and(|class| can_rollover(class.last_rollover_day, self.clock.weekday()))
    }

    fn loaded_class_id(&self) -> EngineResult<ClassId> {
        self.class
            .as_ref()
            .map(|class| class.id)
            .ok_or(EngineError::ClassNotLoaded)
    }

    fn require_student(&self, student_id: StudentId) -> EngineResult<&Student> {
        self.students
            .get(&student_id)
            .ok_or(EngineError::UnknownStudent(student_id))
    }

    fn next_daily(&self, current: i32, points: i32) -> i32 {
        let next = current.saturating_add(points);
        if self.config.enforce_non_negative_daily {
            next.max(0)
        } else {
            next
        }
    }

    /// Adjusts a student's daily points and records the exact requested delta
    /// in the action log.
    pub async fn apply_score_delta(
        &mut self,
        student_id: StudentId,
        points: i32,
        category: &str,
        subcategory: &str,
    ) -> EngineResult<ActionLogEntry> {
        self.require_student(student_id)?;

        let current = self
            .gateway
            .fetch_daily_points(student_id)
            .await?
            .unwrap_or(self.config.default_daily_points);
        let next = self.next_daily(current, points);

        if let Err(err) = self.gateway.set_daily_points(student_id, next).await {
            error!(student_id, points, error = %err, "failed to update daily points");
            return Err(err.into());
        }
        if let Some(student) = self.students.get_mut(&student_id) {
            student.daily_points = next;
        }

        let entry = NewLogEntry {
            student_id,
            points,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            created_at: self.clock.now(),
        };
        let entry = match self.gateway.append_log(entry).await {
            Ok(entry) => entry,
            Err(err) => {
                error!(student_id, points, error = %err, "daily points updated but log append failed");
                return Err(err.into());
            }
        };

        info!(
            student_id,
            old_daily = current,
            new_daily = next,
            points,
            category,
            subcategory,
            "score updated"
        );
        Ok(entry)
    }

    /// Reverts one behavior log entry. Returns `false` when the entry no
    /// longer resolves, belongs to another student, records a shop purchase,
    /// or either write fails; in that case the in-memory total is untouched.
    pub async fn undo(&mut self, entry: &ActionLogEntry, student_id: StudentId) -> bool {
        if !self.students.contains_key(&student_id) {
            warn!(student_id, entry_id = %entry.id, "undo requested for unknown student");
            return false;
        }

        let stored = match self.gateway.fetch_log_entry(entry.id).await {
            Ok(Some(stored)) if stored.student_id == student_id => stored,
            Ok(Some(_)) => {
                warn!(student_id, entry_id = %entry.id, "log entry belongs to another student");
                return false;
            }
            Ok(None) => {
                warn!(student_id, entry_id = %entry.id, "log entry no longer exists");
                return false;
            }
            Err(err) => {
                error!(student_id, entry_id = %entry.id, error = %err, "failed to resolve log entry");
                return false;
            }
        };

        if stored.category == SHOP_CATEGORY {
            warn!(student_id, entry_id = %entry.id, "purchases cannot be undone");
            return false;
        }

        let current = match self.gateway.fetch_daily_points(student_id).await {
            Ok(points) => points.unwrap_or(self.config.default_daily_points),
            Err(err) => {
                error!(student_id, error = %err, "failed to read daily points for undo");
                return false;
            }
        };
        let reverted = current.saturating_add(-stored.points);

        if let Err(err) = self.gateway.set_daily_points(student_id, reverted).await {
            error!(student_id, entry_id = %entry.id, error = %err, "failed to undo action");
            return false;
        }

        match self.gateway.delete_log_entry(stored.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(student_id, entry_id = %entry.id, "log entry vanished during undo");
                return false;
            }
            Err(err) => {
                error!(student_id, entry_id = %entry.id, error = %err, "failed to delete log entry");
                return false;
            }
        }

        if let Some(student) = self.students.get_mut(&student_id) {
            student.daily_points = reverted;
        }
        info!(
            student_id,
            entry_id = %entry.id,
            old_daily = current,
            new_daily = reverted,
            "action undone"
        );
        true
    }

    /// Spends weekly points on a shop item. Balance is not checked here; the
    /// caller decides whether an overdraft is allowed.
    pub async fn purchase(
        &mut self,
        student_id: StudentId,
        item: &ShopItem,
    ) -> EngineResult<ActionLogEntry> {
        let student = self.require_student(student_id)?;
        let old_weekly = student.weekly_points;
        let new_weekly = old_weekly.saturating_sub(item.cost);

        if let Err(err) = self.gateway.set_weekly_points(student_id, new_weekly).await {
            error!(student_id, item = %item.name, error = %err, "failed to process purchase");
            return Err(err.into());
        }
        if let Some(student) = self.students.get_mut(&student_id) {
            student.weekly_points = new_weekly;
        }

        let entry = NewLogEntry {
            student_id,
            points: -item.cost,
            category: SHOP_CATEGORY.to_string(),
            subcategory: format!("Purchase: {}", item.name),
            created_at: self.clock.now(),
        };
        let entry = self.gateway.append_log(entry).await.map_err(|err| {
            error!(student_id, item = %item.name, error = %err, "purchase saved but log append failed");
            EngineError::from(err)
        })?;

        info!(
            student_id,
            item = %item.name,
            cost = item.cost,
            old_weekly,
            new_weekly,
            "purchase completed"
        );
        Ok(entry)
    }

    /// Banks every student's daily points into weekly points and resets the
    /// day. Runs at most once per weekday. Per-student write failures are
    /// logged and skipped. Once any student row is written, the day counts as
    /// rolled over in memory even if the class row write then fails.
    pub async fn end_of_day_rollover(&mut self) -> EngineResult<RolloverOutcome> {
        let class_id = self.loaded_class_id()?;
        let today = self.clock.weekday();
        if let Some(class) = &self.class {
            if !can_rollover(class.last_rollover_day, today) {
                info!(class_id, day = %today, "rollover already ran today");
                return Ok(RolloverOutcome::AlreadyRolledOver(today));
            }
        }

        let default_daily = self.config.default_daily_points;
        let mut class_points = self.class.as_ref().map_or(0, |class| class.points);
        let mut summary = RolloverSummary::default();

        for student in self.students.values_mut() {
            let credit = weekly_credit(student.daily_points);
            let weekly = student.weekly_points.saturating_add(credit.increase);

            if let Err(err) = self
                .gateway
                .set_student_totals(student.id, default_daily, weekly)
                .await
            {
                error!(
                    class_id,
                    student_id = student.id,
                    error = %err,
                    "failed to roll over student"
                );
                summary.failed.push(student.id);
                continue;
            }

            if credit.counts_for_class {
                class_points += 1;
            }
            debug!(
                student_id = student.id,
                old_daily = student.daily_points,
                old_weekly = student.weekly_points,
                new_weekly = weekly,
                increase = credit.increase,
                "student day ended"
            );
            summary.rolled.push(StudentRollover {
                student_id: student.id,
                name: student.name.clone(),
                daily_points: student.daily_points,
                weekly_increase: credit.increase,
                weekly_points: weekly,
            });
            student.weekly_points = weekly;
            student.daily_points = default_daily;
        }

        if let Err(err) = self
            .gateway
            .record_rollover(class_id, class_points, today)
            .await
        {
            error!(class_id, class_points, error = %err, "failed to update class after rollover");
            if !summary.rolled.is_empty() {
                if let Some(class) = self.class.as_mut() {
                    class.last_rollover_day = Some(today);
                }
            }
            return Err(err.into());
        }
        if let Some(class) = self.class.as_mut() {
            class.points = class_points;
            class.last_rollover_day = Some(today);
        }

        summary.class_points = class_points;
        info!(
            class_id,
            rolled = summary.rolled.len(),
            failed = summary.failed.len(),
            class_points,
            "end of day complete"
        );
        Ok(RolloverOutcome::Completed(summary))
    }

    /// Zeroes weekly points for every student and the class counter, then
    /// reloads from storage to pick up whatever actually persisted.
    pub async fn reset_weekly_scores(&mut self) -> EngineResult<ResetSummary> {
        let class_id = self.loaded_class_id()?;
        let mut summary = ResetSummary::default();

        for student_id in self.students.keys().copied().collect::<Vec<_>>() {
            match self.gateway.set_weekly_points(student_id, 0).await {
                Ok(()) => summary.reset += 1,
                Err(err) => {
                    error!(class_id, student_id, error = %err, "failed to reset weekly points");
                    summary.failed.push(student_id);
                }
            }
        }

        if let Err(err) = self.gateway.set_class_points(class_id, 0).await {
            error!(class_id, error = %err, "failed to reset class points");
        }

        self.load(class_id).await?;
        info!(
            class_id,
            reset = summary.reset,
            failed = summary.failed.len(),
            "weekly scores reset"
        );
        Ok(summary)
    }

    pub async fn student_logs(
        &self,
        student_id: StudentId,
        limit: Option<i64>,
    ) -> EngineResult<Vec<ActionLogEntry>> {
        Ok(self.gateway.fetch_student_logs(student_id, limit).await?)
    }

    pub async fn class_logs(&self, limit: i64) -> EngineResult<Vec<ClassLogEntry>> {
        let class_id = self.loaded_class_id()?;
        Ok(self.gateway.fetch_class_logs(class_id, limit).await?)
    }
}
