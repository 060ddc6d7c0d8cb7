//! The fixed onboarding questionnaire.

/// One onboarding question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    /// Profile answer key.
    pub key: &'static str,
    pub prompt: &'static str,
    /// Enumerated choices, empty for free-text questions.
    pub options: &'static [&'static str],
}

impl Question {
    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    /// Match an answer against the options, ignoring case and surrounding
    /// whitespace. Returns the canonical option text.
    pub fn match_option(&self, answer: &str) -> Option<&'static str> {
        let answer = answer.trim();
        self.options
            .iter()
            .copied()
            .find(|o| o.eq_ignore_ascii_case(answer))
    }
}

/// Questions in the order they are asked.
pub static QUESTIONS: &[Question] = &[
    Question {
        key: "age",
        prompt: "What is your age?",
        options: &[],
    },
    Question {
        key: "gender",
        prompt: "What is your gender?",
        options: &["Male", "Female", "Other"],
    },
    Question {
        key: "height",
        prompt: "What is your height in cm?",
        options: &[],
    },
    Question {
        key: "weight",
        prompt: "What is your weight in kg?",
        options: &[],
    },
    Question {
        key: "fitness_level",
        prompt: "What is your fitness level?",
        options: &["Beginner", "Intermediate", "Advanced"],
    },
    Question {
        key: "training_experience",
        prompt: "Tell me about your training experience (e.g., 1 year, never trained).",
        options: &[],
    },
    Question {
        key: "available_equipment",
        prompt: "What equipment do you have access to? (e.g., Full Gym, Dumbbells only, Bodyweight)",
        options: &[],
    },
    Question {
        key: "training_location",
        prompt: "Where do you prefer to train?",
        options: &["Gym", "Home", "Outdoor"],
    },
    Question {
        key: "injuries",
        prompt: "Do you have any injuries or medical issues I should know about? (Type \"None\" if none)",
        options: &[],
    },
    Question {
        key: "diet_type",
        prompt: "What is your diet type?",
        options: &["No restrictions", "Vegan", "Halal", "Keto", "Vegetarian", "Other"],
    },
    Question {
        key: "daily_schedule",
        prompt: "Briefly describe your daily schedule (e.g., Work 9-5, Active, Sedentary).",
        options: &[],
    },
    Question {
        key: "sleep_hours",
        prompt: "How many hours do you sleep on average?",
        options: &[],
    },
    Question {
        key: "stress_level",
        prompt: "What is your current stress level?",
        options: &["Low", "Moderate", "High"],
    },
    Question {
        key: "goal",
        prompt: "What is your main goal?",
        options: &[
            "Fat loss",
            "Muscle gain",
            "Strength",
            "Endurance",
            "Flexibility",
            "General health",
        ],
    },
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn table_has_fourteen_unique_keys() {
        assert_eq!(QUESTIONS.len(), 14);
        let keys: HashSet<_> = QUESTIONS.iter().map(|q| q.key).collect();
        assert_eq!(keys.len(), QUESTIONS.len());
        assert_eq!(QUESTIONS[0].key, "age");
        assert_eq!(QUESTIONS[13].key, "goal");
    }

    #[test]
    fn option_matching_is_case_insensitive() {
        let location = QUESTIONS.iter().find(|q| q.key == "training_location").unwrap();
        assert_eq!(location.match_option("  home "), Some("Home"));
        assert_eq!(location.match_option("GYM"), Some("Gym"));
        assert_eq!(location.match_option("beach"), None);

        let diet = QUESTIONS.iter().find(|q| q.key == "diet_type").unwrap();
        assert_eq!(diet.match_option("no RESTRICTIONS"), Some("No restrictions"));
    }

    #[test]
    fn free_text_questions_have_no_options() {
        assert!(!QUESTIONS[0].has_options());
        assert_eq!(QUESTIONS[0].match_option("30"), None);
        assert!(QUESTIONS[1].has_options());
    }
}
