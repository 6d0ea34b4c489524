//! Per-profile, per-category progress derived from attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Category;

/// Milestones recorded on a progress aggregate. Once earned, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    FirstCorrect,
    TenQuestions,
    PerfectFive,
    #[serde(rename = "streak_3")]
    Streak3,
    #[serde(rename = "streak_7")]
    Streak7,
}

/// Cumulative statistics for one (profile, category) pair.
///
/// Only the attempt-recording path (and the recompute path, which replays
/// attempts through the same [`ProgressAggregate::apply`]) ever changes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAggregate {
    pub id: String,
    pub profile_id: String,
    pub category: Category,
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Consecutive UTC days with at least one attempt in this category
    pub streak_days: u32,
    pub total_time_spent_secs: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

impl ProgressAggregate {
    pub fn aggregate_id(profile_id: &str, category: Category) -> String {
        format!("{}_{}", profile_id, category.as_str())
    }

    pub fn new(profile_id: &str, category: Category, at: DateTime<Utc>) -> Self {
        Self {
            id: Self::aggregate_id(profile_id, category),
            profile_id: profile_id.to_string(),
            category,
            total_questions: 0,
            correct_answers: 0,
            streak_days: 0,
            total_time_spent_secs: 0,
            last_updated: at,
            achievements: Vec::new(),
        }
    }

    /// Fold one attempt into the aggregate.
    pub fn apply(&mut self, is_correct: bool, time_spent_secs: u64, at: DateTime<Utc>) {
        self.update_streak(at);

        self.total_questions += 1;
        if is_correct {
            self.correct_answers += 1;
        }
        self.total_time_spent_secs += time_spent_secs;
        if at > self.last_updated || self.total_questions == 1 {
            self.last_updated = at;
        }

        self.award_achievements();
    }

    fn update_streak(&mut self, at: DateTime<Utc>) {
        if self.total_questions == 0 {
            self.streak_days = 1;
            return;
        }
        let last = self.last_updated.date_naive();
        let day = at.date_naive();
        if day == last {
            self.streak_days = self.streak_days.max(1);
        } else if last.succ_opt() == Some(day) {
            self.streak_days += 1;
        } else if day > last {
            self.streak_days = 1;
        }
        // Out-of-order attempts from an earlier day leave the streak alone
    }

    fn award_achievements(&mut self) {
        let earned = [
            (Achievement::FirstCorrect, self.correct_answers >= 1),
            (Achievement::TenQuestions, self.total_questions >= 10),
            (
                Achievement::PerfectFive,
                self.total_questions == 5 && self.correct_answers == 5,
            ),
            (Achievement::Streak3, self.streak_days >= 3),
            (Achievement::Streak7, self.streak_days >= 7),
        ];
        for (achievement, reached) in earned {
            if reached && !self.achievements.contains(&achievement) {
                self.achievements.push(achievement);
            }
        }
    }

    /// Percentage of correct answers, 0 when nothing has been answered.
    pub fn accuracy(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            f64::from(self.correct_answers) * 100.0 / f64::from(self.total_questions)
        }
    }
}
