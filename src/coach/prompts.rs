//! Prompt templates sent to the completion service.

use crate::store::{ProgressEntry, UserProfile};

/// Persona and safety rules prepended to every request.
pub const SYSTEM_PROMPT: &str = "\
You are AI FITCOACH PRO, a highly intelligent, professional, and motivational virtual gym trainer and fitness assistant.
Expertise: Certified personal trainer, Sports nutritionist, Physiotherapist, Mental coach, Lifestyle mentor.
Mission: Help user achieve best physical, mental, and lifestyle health using science-based methods.
Tone: Friendly, Respectful, Supportive, Confident, Motivating, Professional.
Rules:
- Never promote steroids.
- Never shame user.
- Never give extreme diets.
- Never risk health (prioritize safety).
- Use emojis moderately.
";

pub fn workout_prompt(profile: &UserProfile) -> String {
    format!(
        "Task: Create a highly personalized workout plan based on the user's profile.
User Profile: {}

Include:
- Warm-up
- Main exercises (Sets, Reps, Tempo, Rest)
- Alternatives
- Cool-down
- Stretching

Format as clear Telegram-friendly markdown with emojis.",
        profile.to_context_json()
    )
}

pub fn nutrition_prompt(profile: &UserProfile) -> String {
    format!(
        "Task: Create a personalized nutrition and diet plan based on the user's profile.
User Profile: {}

Include:
- Personalized calorie targets
- Macro breakdown (Protein/Carbs/Fat)
- Meal plans (Breakfast, Lunch, Dinner, Snacks)
- Local/Budget-friendly options
- Hydration advice

Format as clear Telegram-friendly markdown with emojis.",
        profile.to_context_json()
    )
}

pub fn motivation_prompt(profile: &UserProfile) -> String {
    format!(
        "Task: Generate a short, powerful motivational message for the user today.
User Profile: {}

Keep it concise and punchy.",
        profile.to_context_json()
    )
}

/// System message for free-form chat: persona plus whatever profile exists.
pub fn chat_system_prompt(profile: Option<&UserProfile>) -> String {
    let context = profile
        .map(UserProfile::to_context_json)
        .unwrap_or_else(|| "{}".to_string());
    format!("{SYSTEM_PROMPT}\nUser Context: {context}")
}

/// User message asking for feedback on a freshly logged entry.
pub fn progress_feedback_prompt(entry: &ProgressEntry) -> String {
    let weight = entry
        .weight
        .map(|w| format!("{w}kg"))
        .unwrap_or_else(|| "not recorded".to_string());
    format!(
        "The user just logged their progress: Weight: {weight}, Mood: {}, Energy: {}. \
         Give a quick encouraging feedback.",
        entry.mood, entry.energy_level
    )
}
