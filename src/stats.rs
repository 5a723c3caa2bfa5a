use chrono::NaiveDate;
use serde::Serialize;

use crate::models::StudentAttendanceRow;

/// Students under this percentage are flagged in reports.
pub const LOW_ATTENDANCE_THRESHOLD: f64 = 75.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStats {
    pub student_name: String,
    pub email: Option<String>,
    pub present_count: i64,
    pub total_sessions: i64,
    pub percentage: f64,
    pub last_attended: Option<NaiveDate>,
}

/// Present over total, as a percentage rounded to one decimal.
pub fn attendance_percentage(present: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round1(present as f64 * 100.0 / total as f64)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Highest attendance first; ties by name.
pub fn build_student_stats(rows: Vec<StudentAttendanceRow>) -> Vec<StudentStats> {
    let mut stats: Vec<StudentStats> = rows
        .into_iter()
        .map(|row| StudentStats {
            percentage: attendance_percentage(row.present_count, row.total_sessions),
            student_name: row.student_name,
            email: row.email,
            present_count: row.present_count,
            total_sessions: row.total_sessions,
            last_attended: row.last_attended,
        })
        .collect();

    stats.sort_by(|a, b| {
        b.percentage
            .total_cmp(&a.percentage)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    stats
}

pub fn below_threshold(stats: &[StudentStats], threshold: f64) -> Vec<&StudentStats> {
    stats.iter().filter(|s| s.percentage < threshold).collect()
}
