use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Batch, BatchOverview};
use crate::stats::{self, StudentStats};

pub fn build_report(
    batch: &Batch,
    overview: &BatchOverview,
    students: &[StudentStats],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report: {}", batch.name);
    let _ = writeln!(
        output,
        "Generated {} UTC",
        generated_at.format("%Y-%m-%d %H:%M")
    );
    if !batch.description.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", batch.description);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Students: {}", overview.student_count);
    let _ = writeln!(output, "- Sessions: {}", overview.session_count);
    let _ = writeln!(
        output,
        "- Average attendance: {:.1}%",
        stats::round1(overview.average_attendance)
    );
    match overview.last_session_date {
        Some(date) => {
            let _ = writeln!(output, "- Last session: {date}");
        }
        None => {
            let _ = writeln!(output, "- Last session: none yet");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if students.is_empty() {
        let _ = writeln!(output, "No students enrolled in this batch.");
    } else {
        let _ = writeln!(output, "| Student | Present | Sessions | Attendance |");
        let _ = writeln!(output, "|---|---|---|---|");
        for student in students {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1}% |",
                student.student_name,
                student.present_count,
                student.total_sessions,
                student.percentage
            );
        }
    }

    let flagged = stats::below_threshold(students, stats::LOW_ATTENDANCE_THRESHOLD);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Below {:.0}% Attendance",
        stats::LOW_ATTENDANCE_THRESHOLD
    );

    if flagged.is_empty() {
        let _ = writeln!(output, "Everyone is above the threshold.");
    } else {
        for student in flagged {
            let last = student
                .last_attended
                .map_or_else(|| "never".to_string(), |d| d.to_string());
            let _ = writeln!(
                output,
                "- {} at {:.1}% (last attended {})",
                student.student_name, student.percentage, last
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentAttendanceRow;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn batch() -> Batch {
        Batch {
            id: Uuid::new_v4(),
            name: "Cohort Alpha".to_string(),
            description: "Spring cohort".to_string(),
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn report_lists_students_and_flags_low_attendance() {
        let students = stats::build_student_stats(vec![
            StudentAttendanceRow {
                student_name: "Student A".to_string(),
                email: None,
                present_count: 3,
                total_sessions: 3,
                last_attended: NaiveDate::from_ymd_opt(2026, 2, 4),
            },
            StudentAttendanceRow {
                student_name: "Student B".to_string(),
                email: None,
                present_count: 1,
                total_sessions: 3,
                last_attended: NaiveDate::from_ymd_opt(2026, 2, 2),
            },
        ]);
        let overview = BatchOverview {
            student_count: 2,
            session_count: 3,
            average_attendance: 66.666,
            last_session_date: NaiveDate::from_ymd_opt(2026, 2, 4),
        };

        let report = build_report(&batch(), &overview, &students, Utc::now());
        assert!(report.starts_with("# Attendance Report: Cohort Alpha"));
        assert!(report.contains("- Average attendance: 66.7%"));
        assert!(report.contains("| Student A | 3 | 3 | 100.0% |"));
        assert!(report.contains("| Student B | 1 | 3 | 33.3% |"));
        assert!(report.contains("- Student B at 33.3% (last attended 2026-02-02)"));
        assert!(!report.contains("- Student A at"));
    }

    #[test]
    fn empty_batch_report() {
        let overview = BatchOverview {
            student_count: 0,
            session_count: 0,
            average_attendance: 0.0,
            last_session_date: None,
        };
        let report = build_report(&batch(), &overview, &[], Utc::now());
        assert!(report.contains("No students enrolled in this batch."));
        assert!(report.contains("- Last session: none yet"));
        assert!(report.contains("Everyone is above the threshold."));
    }
}
