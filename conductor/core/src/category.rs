//! Session categories
//!
//! The fixed catalog offered with a verdict popup. Each category carries the
//! title the service knows it by and the welcome line that opens a session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Conversation topic for a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Exams and studies
    AcademicExam,
    /// Work, interviews, job search
    CareerJobs,
    /// Partners, family, friends
    Relationship,
    /// Physical health and fitness
    HealthWellness,
    /// Habits and self-improvement
    PersonalGrowth,
    /// Anxiety, mood, general check-in
    #[default]
    MentalHealth,
    /// Money worries
    FinancialStress,
}

impl Category {
    /// Catalog in display order
    pub const ALL: [Category; 7] = [
        Category::AcademicExam,
        Category::CareerJobs,
        Category::Relationship,
        Category::HealthWellness,
        Category::PersonalGrowth,
        Category::MentalHealth,
        Category::FinancialStress,
    ];

    /// Title used on the wire and in the UI
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::AcademicExam => "Academic / Exam",
            Self::CareerJobs => "Career & Jobs",
            Self::Relationship => "Relationship",
            Self::HealthWellness => "Health & Wellness",
            Self::PersonalGrowth => "Personal Growth",
            Self::MentalHealth => "Mental Health",
            Self::FinancialStress => "Financial Stress",
        }
    }

    /// Opening assistant line for a new session
    #[must_use]
    pub fn welcome(&self) -> &'static str {
        match self {
            Self::AcademicExam => "Hello dost! Exam tension ya padhai ki chinta? Don't worry, hum mil kar solution nikalenge. Kya chal raha hai mind mein?",
            Self::CareerJobs => "Hey! Career ki thodi tension hai kya? Interview ya job search ka stress share karna chahoge? Main sun raha hoon.",
            Self::Relationship => "Aao dost, baitho. Relationship issues dil pe bahut heavy hoti hain. Jo bhi feel kar rahe ho, khul kar batao, main sun raha hoon.",
            Self::HealthWellness => "Namaste! Fitness ya physical health ko le kar thode pareshan ho? Let's discuss how you're feeling today.",
            Self::PersonalGrowth => "Hi! Khud ko behtar banana ek journey hai. Aaj kis specific habit ya growth area pe baat karein?",
            Self::MentalHealth => "Hello. Aapka mental peace sabse precious hai. Anxiety ho ya mood swing, main yahan hoon aapke liye.",
            Self::FinancialStress => "Hey dost. Budgeting ya money worries kaafi stress dete hain. Let's break it down together, tension mat lo.",
        }
    }

    /// Look up a category by its title
    #[must_use]
    pub fn from_title(title: &str) -> Option<Self> {
        let title = title.trim();
        Self::ALL.into_iter().find(|c| c.title().eq_ignore_ascii_case(title))
    }

    /// Best-effort category for a stored session title such as
    /// `"Career & Jobs Session"`; falls back to the default
    #[must_use]
    pub fn from_session_title(title: &str) -> Self {
        let title = title.trim();
        Self::ALL
            .into_iter()
            .find(|c| title.starts_with(c.title()))
            .unwrap_or_default()
    }

    /// Title stored with a persisted session
    #[must_use]
    pub fn session_title(&self) -> String {
        format!("{} Session", self.title())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
