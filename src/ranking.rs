use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::AppError;
use crate::models::{InterviewRound, ModuleScore};
use crate::stats::round1;

pub const MAX_INTERVIEW_SCORE: i32 = 100;
pub const MAX_MODULE_SCORE: i32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeaderboardSummary {
    pub total_rounds: usize,
    pub average_score: f64,
    pub max_score: i32,
    pub students: usize,
    pub interviewers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivenessSummary {
    pub total_scores: usize,
    pub average_score: f64,
    pub max_score: i32,
    pub students: usize,
    pub modules: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAverage {
    pub student_name: String,
    pub average_score: f64,
    pub modules: usize,
}

pub fn validate_interview_score(score: i32) -> Result<(), AppError> {
    if (0..=MAX_INTERVIEW_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(AppError::Invalid(format!(
            "interview score must be between 0 and {MAX_INTERVIEW_SCORE}, got {score}"
        )))
    }
}

pub fn validate_round_number(round: i32) -> Result<(), AppError> {
    if round >= 1 {
        Ok(())
    } else {
        Err(AppError::Invalid(format!("round number must be at least 1, got {round}")))
    }
}

pub fn validate_module_score(score: i32) -> Result<(), AppError> {
    if (0..=MAX_MODULE_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(AppError::Invalid(format!(
            "activeness score must be between 0 and {MAX_MODULE_SCORE}, got {score}"
        )))
    }
}

fn average(total: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round1(total as f64 / count as f64)
    }
}

pub fn summarize_rounds(rounds: &[InterviewRound]) -> LeaderboardSummary {
    let total: i64 = rounds.iter().map(|r| i64::from(r.score)).sum();
    LeaderboardSummary {
        total_rounds: rounds.len(),
        average_score: average(total, rounds.len()),
        max_score: rounds.iter().map(|r| r.score).max().unwrap_or(0),
        students: rounds
            .iter()
            .map(|r| r.student_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
        interviewers: rounds
            .iter()
            .map(|r| r.interviewer.as_str())
            .collect::<HashSet<_>>()
            .len(),
    }
}

pub fn summarize_scores(scores: &[ModuleScore]) -> ActivenessSummary {
    let total: i64 = scores.iter().map(|s| i64::from(s.score)).sum();
    ActivenessSummary {
        total_scores: scores.len(),
        average_score: average(total, scores.len()),
        max_score: scores.iter().map(|s| s.score).max().unwrap_or(0),
        students: scores
            .iter()
            .map(|s| s.student_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
        modules: scores
            .iter()
            .map(|s| s.module_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
    }
}

/// Per-student mean across modules, highest first.
pub fn student_averages(scores: &[ModuleScore]) -> Vec<StudentAverage> {
    let mut totals: HashMap<&str, (i64, usize)> = HashMap::new();
    for score in scores {
        let entry = totals.entry(score.student_name.as_str()).or_insert((0, 0));
        entry.0 += i64::from(score.score);
        entry.1 += 1;
    }

    let mut averages: Vec<StudentAverage> = totals
        .into_iter()
        .map(|(name, (total, count))| StudentAverage {
            student_name: name.to_string(),
            average_score: average(total, count),
            modules: count,
        })
        .collect();
    averages.sort_by(|a, b| {
        b.average_score
            .total_cmp(&a.average_score)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    averages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn round(student: &str, interviewer: &str, score: i32) -> InterviewRound {
        InterviewRound {
            id: Uuid::new_v4(),
            leaderboard_id: Uuid::nil(),
            student_name: student.to_string(),
            score,
            interviewer: interviewer.to_string(),
            round_number: 1,
            interview_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            notes: String::new(),
        }
    }

    fn module(student: &str, module_name: &str, score: i32) -> ModuleScore {
        ModuleScore {
            id: Uuid::new_v4(),
            board_id: Uuid::nil(),
            student_name: student.to_string(),
            module_name: module_name.to_string(),
            score,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn leaderboard_summary_reduces_rounds() {
        let rounds = vec![
            round("Mina", "Sam", 90),
            round("Tomas", "Sam", 75),
            round("Mina", "Priya", 80),
        ];
        assert_eq!(
            summarize_rounds(&rounds),
            LeaderboardSummary {
                total_rounds: 3,
                average_score: 81.7,
                max_score: 90,
                students: 2,
                interviewers: 2,
            }
        );
    }

    #[test]
    fn empty_sets_summarize_to_zero() {
        assert_eq!(summarize_rounds(&[]), LeaderboardSummary::default());
        assert_eq!(summarize_scores(&[]), ActivenessSummary::default());
    }

    #[test]
    fn activeness_summary_and_averages() {
        let scores = vec![
            module("Mina", "Rust Basics", 9),
            module("Mina", "Async", 7),
            module("Tomas", "Rust Basics", 10),
        ];
        let summary = summarize_scores(&scores);
        assert_eq!(summary.total_scores, 3);
        assert_eq!(summary.average_score, 8.7);
        assert_eq!(summary.max_score, 10);
        assert_eq!(summary.students, 2);
        assert_eq!(summary.modules, 2);

        let averages = student_averages(&scores);
        assert_eq!(averages[0].student_name, "Tomas");
        assert_eq!(averages[1].average_score, 8.0);
        assert_eq!(averages[1].modules, 2);
    }

    #[test]
    fn validates_score_ranges() {
        assert!(validate_module_score(0).is_ok());
        assert!(validate_module_score(10).is_ok());
        assert!(validate_module_score(11).is_err());
        assert!(validate_interview_score(-1).is_err());
        assert!(validate_interview_score(100).is_ok());
        assert!(validate_round_number(0).is_err());
    }
}
