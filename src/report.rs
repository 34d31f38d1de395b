use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{ClassLogEntry, ClassRecord, Student};
use crate::scoring::{weekly_credit, FULL_CREDIT_THRESHOLD, PARTIAL_CREDIT_THRESHOLD};

/// Students ordered by weekly points, highest first, ties by name.
pub fn standings<'a>(students: impl IntoIterator<Item = &'a Student>) -> Vec<&'a Student> {
    let mut ranked: Vec<&Student> = students.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.weekly_points
            .cmp(&a.weekly_points)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

pub fn build_report(
    class: &ClassRecord,
    students: &[&Student],
    activity: &[ClassLogEntry],
    generated_on: NaiveDate,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Classroom Rewards Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} (class points this week: {})",
        class.name, generated_on, class.points
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Standings");

    let ranked = standings(students.iter().copied());
    if ranked.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for (rank, student) in ranked.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {}: {} weekly points",
                rank + 1,
                student.name,
                student.weekly_points
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Today");

    let full = ranked
        .iter()
        .filter(|s| s.daily_points >= FULL_CREDIT_THRESHOLD)
        .count();
    let partial = ranked
        .iter()
        .filter(|s| (PARTIAL_CREDIT_THRESHOLD..FULL_CREDIT_THRESHOLD).contains(&s.daily_points))
        .count();
    let _ = writeln!(
        output,
        "{} at or above {}, {} between {} and {}, {} below {}",
        full,
        FULL_CREDIT_THRESHOLD,
        partial,
        PARTIAL_CREDIT_THRESHOLD,
        FULL_CREDIT_THRESHOLD - 1,
        ranked.len() - full - partial,
        PARTIAL_CREDIT_THRESHOLD
    );
    for student in ranked.iter() {
        let _ = writeln!(
            output,
            "- {}: {} daily points (banks {} at end of day)",
            student.name,
            student.daily_points,
            weekly_credit(student.daily_points).increase
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");

    if activity.is_empty() {
        let _ = writeln!(output, "No activity recorded.");
    } else {
        for item in activity.iter() {
            let _ = writeln!(
                output,
                "- {} {}: {:+} ({} / {})",
                item.entry.created_at.format("%Y-%m-%d %H:%M"),
                item.student_name,
                item.entry.points,
                item.entry.category,
                item.entry.subcategory
            );
        }
    }

    output
}
