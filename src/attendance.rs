use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{AttendanceRecord, AttendanceSession};
use crate::stats::StudentStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    High,
    Medium,
    Low,
}

impl Bucket {
    pub fn marker(self) -> char {
        match self {
            Bucket::High => '+',
            Bucket::Medium => '~',
            Bucket::Low => '-',
        }
    }
}

pub fn bucket_for(percentage: f64) -> Bucket {
    if percentage >= 70.0 {
        Bucket::High
    } else if percentage >= 50.0 {
        Bucket::Medium
    } else {
        Bucket::Low
    }
}

/// A day counts as fully attended as soon as one record exists; the roster
/// size is not consulted.
pub fn daily_percentage(present_count: i64) -> f64 {
    if present_count > 0 {
        100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub count: i64,
    pub percentage: f64,
    pub bucket: Bucket,
    pub session: AttendanceSession,
}

pub type Calendar = BTreeMap<NaiveDate, DayCell>;

/// Accepts `YYYY-MM`.
pub fn parse_month(value: &str) -> Result<(i32, u32), String> {
    let (year, month) = value
        .split_once('-')
        .ok_or_else(|| format!("expected YYYY-MM, got '{value}'"))?;
    let year: i32 = year
        .parse()
        .map_err(|_| format!("invalid year in '{value}'"))?;
    let month: u32 = month
        .parse()
        .map_err(|_| format!("invalid month in '{value}'"))?;
    month_bounds(year, month).map_err(|err| err.to_string())?;
    Ok((year, month))
}

/// First and last day of a month, inclusive.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AppError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::Invalid(format!("no such month {year}-{month:02}")))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| AppError::Invalid(format!("month {year}-{month:02} out of range")))?;
    Ok((first, last))
}

/// One cell per date. `sessions` must be ordered by creation; the first
/// session of a day keeps the cell.
pub fn build_calendar(sessions: Vec<(AttendanceSession, i64)>) -> Calendar {
    let mut calendar = Calendar::new();
    for (session, count) in sessions {
        let date = session.session_date;
        calendar.entry(date).or_insert_with(|| {
            let percentage = daily_percentage(count);
            DayCell {
                date,
                count,
                percentage,
                bucket: bucket_for(percentage),
                session,
            }
        });
    }
    calendar
}

/// Month grid, Monday first. Days with a session show their bucket marker and
/// count; cells widen to fit the largest count in the month.
pub fn render_calendar(year: i32, month: u32, calendar: &Calendar) -> Result<String, AppError> {
    let (first, last) = month_bounds(year, month)?;
    let count_width = calendar
        .range(first..=last)
        .map(|(_, cell)| cell.count.to_string().len())
        .max()
        .unwrap_or(1);
    let cell_width = 4 + count_width;

    let mut out = String::new();
    let _ = writeln!(out, "{}", first.format("%B %Y"));
    for weekday in ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] {
        let _ = write!(out, "{weekday:>cell_width$}");
    }
    out.push('\n');

    let lead = first.weekday().num_days_from_monday() as usize;
    let mut column = 0usize;
    for _ in 0..lead {
        out.push_str(&" ".repeat(cell_width));
        column += 1;
    }

    let mut day = first;
    while day <= last {
        match calendar.get(&day) {
            Some(cell) => {
                let _ = write!(
                    out,
                    " {:>2}{}{:<count_width$}",
                    day.day(),
                    cell.bucket.marker(),
                    cell.count
                );
            }
            None => {
                let _ = write!(out, " {:>2} {:count_width$}", day.day(), "");
            }
        }
        column += 1;
        if column % 7 == 0 {
            out.push('\n');
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    if column % 7 != 0 {
        out.push('\n');
    }
    Ok(out)
}

/// One line of the dashboard table for the selected session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRow {
    pub student_name: String,
    pub status: String,
    pub marked_at: DateTime<Utc>,
    pub present_count: i64,
    pub percentage: f64,
}

/// Joins the day's records with each student's batch-wide totals. Students
/// missing from the roster get zero totals.
pub fn build_rows(records: &[AttendanceRecord], stats: &[StudentStats]) -> Vec<AttendanceRow> {
    records
        .iter()
        .map(|record| {
            let totals = stats
                .iter()
                .find(|s| s.student_name.eq_ignore_ascii_case(&record.student_name));
            AttendanceRow {
                student_name: record.student_name.clone(),
                status: record.status.clone(),
                marked_at: record.marked_at,
                present_count: totals.map_or(0, |s| s.present_count),
                percentage: totals.map_or(0.0, |s| s.percentage),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    Name,
    Percentage,
    PresentCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

pub fn filter_rows(rows: &[AttendanceRow], query: &str) -> Vec<AttendanceRow> {
    let needle = query.trim().to_lowercase();
    rows.iter()
        .filter(|row| needle.is_empty() || row.student_name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

pub fn sort_rows(rows: &mut [AttendanceRow], key: SortKey, order: SortOrder) {
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Name => a.student_name.to_lowercase().cmp(&b.student_name.to_lowercase()),
            SortKey::Percentage => a.percentage.total_cmp(&b.percentage),
            SortKey::PresentCount => a.present_count.cmp(&b.present_count),
        };
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

/// The selected day: the session, how many students marked it, and the rows
/// left after search and sort. `present` counts every record, so the header
/// does not move when a search hides rows.
#[derive(Debug, Clone)]
pub struct DayReport {
    pub session: AttendanceSession,
    pub present: i64,
    pub rows: Vec<AttendanceRow>,
}

impl DayReport {
    pub fn build(
        session: AttendanceSession,
        records: &[AttendanceRecord],
        stats: &[StudentStats],
        search: &str,
        key: SortKey,
        order: SortOrder,
    ) -> Self {
        let mut rows = filter_rows(&build_rows(records, stats), search);
        sort_rows(&mut rows, key, order);
        Self {
            session,
            present: records.len() as i64,
            rows,
        }
    }

    pub fn percentage(&self) -> f64 {
        daily_percentage(self.present)
    }

    pub fn header(&self, now: DateTime<Utc>) -> String {
        format!(
            "{} ({}, {}) on {}: {} present, {:.0}%",
            self.session.name,
            self.session.code,
            crate::sessions::state(&self.session, now).label(),
            self.session.session_date,
            self.present,
            self.percentage()
        )
    }
}

/// Writes the rows exactly as displayed. Returns the number of data rows.
pub fn write_csv<W: Write>(rows: &[AttendanceRow], writer: W) -> anyhow::Result<usize> {
    let mut csv = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);
    csv.write_record(["Student Name", "Status", "Marked At", "Present Count", "Attendance %"])?;
    for row in rows {
        let marked_at = row.marked_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let present_count = row.present_count.to_string();
        let percentage = format!("{:.1}", row.percentage);
        csv.write_record([
            row.student_name.as_str(),
            row.status.as_str(),
            marked_at.as_str(),
            present_count.as_str(),
            percentage.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(rows.len())
}

pub fn export_filename(session: &AttendanceSession) -> String {
    format!("attendance-{}-{}.csv", session.code, session.session_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(day: NaiveDate, name: &str) -> AttendanceSession {
        AttendanceSession {
            id: Uuid::new_v4(),
            session_date: day,
            code: "CODE01".to_string(),
            name: name.to_string(),
            batch_id: Uuid::new_v4(),
            is_active: true,
            expires_at: crate::sessions::end_of_day(day),
            public_id: "pub".to_string(),
            created_at: Utc::now(),
        }
    }

    fn row(name: &str, present_count: i64, percentage: f64) -> AttendanceRow {
        AttendanceRow {
            student_name: name.to_string(),
            status: "present".to_string(),
            marked_at: Utc::now(),
            present_count,
            percentage,
        }
    }

    #[test]
    fn buckets_split_at_fifty_and_seventy() {
        assert_eq!(bucket_for(70.0), Bucket::High);
        assert_eq!(bucket_for(69.9), Bucket::Medium);
        assert_eq!(bucket_for(50.0), Bucket::Medium);
        assert_eq!(bucket_for(49.9), Bucket::Low);
    }

    #[test]
    fn daily_percentage_is_binary() {
        assert_eq!(daily_percentage(0), 0.0);
        assert_eq!(daily_percentage(1), 100.0);
        assert_eq!(daily_percentage(42), 100.0);
    }

    #[test]
    fn month_bounds_handle_leap_years() {
        assert_eq!(
            month_bounds(2028, 2).unwrap(),
            (date(2028, 2, 1), date(2028, 2, 29))
        );
        assert_eq!(
            month_bounds(2026, 12).unwrap(),
            (date(2026, 12, 1), date(2026, 12, 31))
        );
        assert!(month_bounds(2026, 13).is_err());
    }

    #[test]
    fn parses_month_arguments() {
        assert_eq!(parse_month("2026-03"), Ok((2026, 3)));
        assert!(parse_month("2026").is_err());
        assert!(parse_month("2026-00").is_err());
    }

    #[test]
    fn calendar_keeps_one_session_per_day() {
        let day = date(2026, 3, 2);
        let first = session(day, "first");
        let second = session(day, "second");
        let other = session(date(2026, 3, 3), "other");

        let calendar = build_calendar(vec![(first, 4), (second, 9), (other, 0)]);
        assert_eq!(calendar.len(), 2);
        let cell = &calendar[&day];
        assert_eq!(cell.session.name, "first");
        assert_eq!(cell.count, 4);
        assert_eq!(cell.bucket, Bucket::High);
        assert_eq!(calendar[&date(2026, 3, 3)].bucket, Bucket::Low);
    }

    #[test]
    fn renders_month_grid() {
        let calendar = build_calendar(vec![(session(date(2026, 3, 2), "mon"), 3)]);
        let grid = render_calendar(2026, 3, &calendar).unwrap();
        assert!(grid.starts_with("March 2026\n"));
        assert!(grid.contains("  2+3"));
        assert!(grid.contains(" 31  "));
    }

    #[test]
    fn large_counts_widen_the_grid() {
        let calendar = build_calendar(vec![
            (session(date(2026, 3, 2), "mon"), 12),
            (session(date(2026, 3, 3), "tue"), 4),
        ]);
        let grid = render_calendar(2026, 3, &calendar).unwrap();
        let lines: Vec<&str> = grid.lines().collect();

        assert!(grid.contains("  2+12"));
        assert!(grid.contains("  3+4 "));
        assert_eq!(lines[1], "   Mon   Tue   Wed   Thu   Fri   Sat   Sun");
        assert!(lines[2..].iter().all(|line| line.len() <= lines[1].len()));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let rows = vec![row("Mina Okafor", 3, 100.0), row("Tomas Rieger", 1, 33.3)];
        let hits = filter_rows(&rows, "OKAFOR");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student_name, "Mina Okafor");
        assert_eq!(filter_rows(&rows, "  ").len(), 2);
    }

    #[test]
    fn percentage_sort_reverses_cleanly() {
        let mut rows = vec![
            row("B", 1, 33.3),
            row("A", 3, 100.0),
            row("C", 2, 66.7),
        ];
        sort_rows(&mut rows, SortKey::Percentage, SortOrder::Descending);
        let descending: Vec<_> = rows.iter().map(|r| r.student_name.clone()).collect();

        sort_rows(&mut rows, SortKey::Percentage, SortOrder::Descending.toggle());
        let mut ascending: Vec<_> = rows.iter().map(|r| r.student_name.clone()).collect();
        ascending.reverse();

        assert_eq!(descending, vec!["A", "C", "B"]);
        assert_eq!(descending, ascending);
    }

    #[test]
    fn default_order_is_ascending() {
        assert_eq!(SortOrder::default(), SortOrder::Ascending);
        assert_eq!(SortOrder::default().toggle(), SortOrder::Descending);
    }

    #[test]
    fn sorts_by_name_and_count() {
        let mut rows = vec![row("carol", 2, 0.0), row("Alice", 5, 0.0), row("bob", 1, 0.0)];
        sort_rows(&mut rows, SortKey::Name, SortOrder::Ascending);
        assert_eq!(rows[0].student_name, "Alice");
        sort_rows(&mut rows, SortKey::PresentCount, SortOrder::Descending);
        assert_eq!(rows[0].present_count, 5);
        assert_eq!(rows[2].present_count, 1);
    }

    #[test]
    fn rows_join_batch_totals() {
        let session_id = Uuid::new_v4();
        let records = vec![
            AttendanceRecord {
                id: Uuid::new_v4(),
                session_id,
                student_name: "mina okafor".to_string(),
                marked_at: Utc::now(),
                status: "present".to_string(),
            },
            AttendanceRecord {
                id: Uuid::new_v4(),
                session_id,
                student_name: "Walk In".to_string(),
                marked_at: Utc::now(),
                status: "present".to_string(),
            },
        ];
        let stats = vec![StudentStats {
            student_name: "Mina Okafor".to_string(),
            email: None,
            present_count: 3,
            total_sessions: 3,
            percentage: 100.0,
            last_attended: None,
        }];

        let rows = build_rows(&records, &stats);
        assert_eq!(rows[0].present_count, 3);
        assert_eq!(rows[0].percentage, 100.0);
        assert_eq!(rows[1].present_count, 0);
    }

    fn record(session_id: Uuid, name: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            session_id,
            student_name: name.to_string(),
            marked_at: Utc::now(),
            status: "present".to_string(),
        }
    }

    #[test]
    fn day_header_ignores_search() {
        let day = date(2026, 3, 2);
        let selected = session(day, "Morning standup");
        let records = vec![record(selected.id, "Mina Okafor")];

        let report = DayReport::build(
            selected,
            &records,
            &[],
            "zzz",
            SortKey::Name,
            SortOrder::Ascending,
        );
        assert!(report.rows.is_empty());
        assert_eq!(report.present, 1);
        assert_eq!(report.percentage(), 100.0);

        let before_expiry = day.and_hms_opt(9, 0, 0).unwrap().and_utc();
        assert_eq!(
            report.header(before_expiry),
            "Morning standup (CODE01, active) on 2026-03-02: 1 present, 100%"
        );
    }

    #[test]
    fn day_report_filters_and_sorts_rows() {
        let selected = session(date(2026, 3, 2), "day");
        let records = vec![
            record(selected.id, "Tomas Rieger"),
            record(selected.id, "Mina Okafor"),
            record(selected.id, "Lena Park"),
        ];
        let report = DayReport::build(
            selected,
            &records,
            &[],
            "er",
            SortKey::Name,
            SortOrder::Descending,
        );
        let names: Vec<_> = report.rows.iter().map(|r| r.student_name.as_str()).collect();
        assert_eq!(names, vec!["Tomas Rieger"]);
        assert_eq!(report.present, 3);
    }

    #[test]
    fn csv_export_matches_displayed_rows() {
        let rows = vec![row("Mina Okafor", 3, 100.0), row("Tomas \"TR\" Rieger", 1, 33.3)];
        let shown = filter_rows(&rows, "rieger");

        let mut buffer = Vec::new();
        let written = write_csv(&shown, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(written, shown.len());
        assert_eq!(lines.len(), shown.len() + 1);
        assert!(lines[0].starts_with("\"Student Name\""));
        assert!(lines[1].starts_with("\"Tomas \"\"TR\"\" Rieger\",\"present\""));
        assert!(lines[1].ends_with("\"1\",\"33.3\""));
    }

    #[test]
    fn csv_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let file = std::fs::File::create(&path).unwrap();
        let written = write_csv(&[row("Mina Okafor", 3, 100.0)], file).unwrap();
        assert_eq!(written, 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
