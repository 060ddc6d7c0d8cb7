//! Message handling: command dispatch, onboarding, progress logging and chat.

use std::sync::Arc;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::coach::commands::Command;
use crate::coach::prompts;
use crate::coach::questions::QUESTIONS;
use crate::coach::state::{ConversationState, ProgressDraft, ProgressStep, SessionTable};
use crate::config::{DialogPolicy, MidDialogCommandPolicy, ValidationPolicy};
use crate::error::{Error, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::{Database, NewProfile, PlanKind, ProgressEntry, UserProfile};

// ── Reply texts ─────────────────────────────────────────────────────

pub const WELCOME: &str = "👋 Welcome! I’m AI FITCOACH PRO, your personal Telegram fitness trainer.\n\n\
Let’s build your strongest body and mind together 💪🔥\n\n\
First, I need to know you better.";
pub const SAVING_PROFILE: &str = "🔄 Saving your profile and preparing your journey...";
pub const PROFILE_SAVED: &str = "✅ Profile saved! You are ready to go.\n\n\
Try these commands:\n\
/workout - Generate a workout plan\n\
/diet - Generate a nutrition plan\n\
/profile - View your profile";
pub const PROFILE_SAVE_FAILED: &str = "❌ Error saving profile. Please try /start again.";
pub const NO_PROFILE: &str = "You haven't set up a profile yet! Type /start to begin.";
pub const PROFILE_REQUIRED: &str = "Please complete your /profile first.";
pub const WORKOUT_NOTICE: &str =
    "🏋️ Generating your personalized workout plan... This may take a moment.";
pub const DIET_NOTICE: &str = "🥗 Creating your nutrition plan...";
pub const WORKOUT_FAILED: &str = "Sorry, I failed to generate a workout plan. Please try again.";
pub const DIET_FAILED: &str = "Sorry, I failed to generate a diet plan.";
pub const MOTIVATION_FALLBACK: &str = "Keep pushing! Your only limit is you. 💪";
pub const WEIGHT_PROMPT: &str = "Please enter your current weight (kg):";
pub const MOOD_PROMPT: &str = "How is your mood today? (e.g. Great, Tired, Motivated)";
pub const ENERGY_PROMPT: &str = "What is your energy level? (Low/Medium/High)";
pub const PROGRESS_LOGGED: &str = "📈 Progress logged successfully! Keep up the great work.";
pub const PROGRESS_FAILED: &str = "Failed to log progress. Please try again.";
pub const WEIGHT_INVALID: &str = "Please enter your weight as a number, e.g. 72.5";
pub const CHAT_FAILED: &str = "Sorry, I encountered an error while thinking. Please try again.";
pub const NO_SAVED_WORKOUT: &str =
    "You don't have a saved workout plan yet. Type /workout to generate one.";
pub const LAST_WORKOUT_FAILED: &str =
    "Sorry, I couldn't load your last workout plan. Please try again.";
pub const DIALOG_CANCELLED: &str = "Okay, I've cancelled what we were doing.";
pub const RESET_TEXT: &str = "If you want to reset, please contact support or wait for future updates. \
For now, you can just type /start to see if you can override.";
pub const HELP_TEXT: &str = "Available commands:\n\
/start - Begin your journey\n\
/profile - View your profile\n\
/workout - Get a workout plan\n\
/diet - Get a nutrition plan\n\
/motivation - Get a daily boost\n\
/progress - Log your weight, mood and energy\n\
/lastworkout - Show your last workout plan\n\n\
You can also just talk to me!";

/// The conversation engine behind every inbound message.
pub struct Coach {
    db: Arc<dyn Database>,
    llm: Arc<dyn LlmProvider>,
    channels: Arc<ChannelManager>,
    sessions: SessionTable,
    policy: DialogPolicy,
}

impl Coach {
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        channels: Arc<ChannelManager>,
        policy: DialogPolicy,
    ) -> Self {
        Self {
            db,
            llm,
            channels,
            sessions: SessionTable::new(),
            policy,
        }
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Handle one inbound text message.
    ///
    /// Commands win over dialog state; everything else is routed by the
    /// sender's current state. Errors returned here are unexpected ones that
    /// the caller reports generically.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<(), Error> {
        if let Some(command) = Command::parse(&msg.content) {
            if self.policy.mid_dialog_commands == MidDialogCommandPolicy::AbortDialog {
                if let Some(previous) = self.sessions.clear(&msg.user_id) {
                    tracing::info!(user = %msg.user_id, state = %previous.label(), "Dialog aborted by command");
                    self.reply(msg, OutgoingResponse::text(DIALOG_CANCELLED).remove_keyboard())
                        .await?;
                }
            }
            return self.dispatch_command(command, msg).await;
        }

        match self.sessions.get(&msg.user_id) {
            None => self.chat(msg).await,
            Some(ConversationState::ProgressLogging { step, draft }) => {
                self.advance_progress(msg, step, draft).await
            }
            Some(ConversationState::Onboarding { step, answers }) => {
                self.advance_onboarding(msg, step, answers).await
            }
        }
    }

    async fn dispatch_command(&self, command: Command, msg: &IncomingMessage) -> Result<(), Error> {
        tracing::debug!(user = %msg.user_id, command = command.as_str(), "Dispatching command");
        match command {
            Command::Start => self.start(msg).await,
            Command::Profile => self.show_profile(msg).await,
            Command::Workout => self.generate_plan(msg, PlanKind::Workout).await,
            Command::Diet => self.generate_plan(msg, PlanKind::Nutrition).await,
            Command::Motivation => self.generate_plan(msg, PlanKind::Motivation).await,
            Command::Progress => self.start_progress(msg).await,
            Command::LastWorkout => self.last_workout(msg).await,
            Command::Reset => self.reply(msg, OutgoingResponse::text(RESET_TEXT)).await,
            Command::Help => self.reply(msg, OutgoingResponse::text(HELP_TEXT)).await,
        }
    }

    // ── Onboarding ──────────────────────────────────────────────────

    async fn start(&self, msg: &IncomingMessage) -> Result<(), Error> {
        if self.load_profile(&msg.user_id).await.is_some() {
            let name = msg.first_name().unwrap_or("there");
            let text = format!(
                "👋 Welcome back, {name}! I’m AI FITCOACH PRO.\n\n\
                 Type /workout for a new plan or /profile to see your data."
            );
            return self.reply(msg, OutgoingResponse::text(text)).await;
        }

        self.reply(msg, OutgoingResponse::text(WELCOME)).await?;
        self.sessions
            .set(&msg.user_id, ConversationState::new_onboarding());
        self.ask_question(msg, 0).await
    }

    async fn ask_question(&self, msg: &IncomingMessage, index: usize) -> Result<(), Error> {
        let Some(question) = QUESTIONS.get(index) else {
            return Ok(());
        };
        let response = if question.has_options() {
            OutgoingResponse::text(question.prompt).with_choices(question.options.iter().copied())
        } else {
            OutgoingResponse::text(question.prompt).remove_keyboard()
        };
        self.reply(msg, response).await
    }

    async fn advance_onboarding(
        &self,
        msg: &IncomingMessage,
        step: usize,
        mut answers: std::collections::BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let Some(question) = QUESTIONS.get(step) else {
            tracing::warn!(user = %msg.user_id, step, "Onboarding step out of range; clearing state");
            self.sessions.clear(&msg.user_id);
            return Ok(());
        };

        let answer = match (self.policy.validation, question.has_options()) {
            (ValidationPolicy::Strict, true) => match question.match_option(&msg.content) {
                Some(option) => option.to_string(),
                None => {
                    let hint = format!("Please choose one of: {}.", question.options.join(", "));
                    self.reply(msg, OutgoingResponse::text(hint)).await?;
                    return self.ask_question(msg, step).await;
                }
            },
            _ => msg.content.clone(),
        };

        answers.insert(question.key.to_string(), answer);
        let next = step + 1;

        if next < QUESTIONS.len() {
            self.sessions.set(
                &msg.user_id,
                ConversationState::Onboarding {
                    step: next,
                    answers,
                },
            );
            return self.ask_question(msg, next).await;
        }

        self.finish_onboarding(msg, answers).await
    }

    async fn finish_onboarding(
        &self,
        msg: &IncomingMessage,
        answers: std::collections::BTreeMap<String, String>,
    ) -> Result<(), Error> {
        self.reply(msg, OutgoingResponse::text(SAVING_PROFILE).remove_keyboard())
            .await?;

        let profile = NewProfile {
            answers,
            username: msg.username().map(String::from),
            full_name: msg.full_name(),
        };
        let result = self.db.upsert_profile(&msg.user_id, profile).await;
        self.sessions.clear(&msg.user_id);

        match result {
            Ok(_) => {
                tracing::info!(user = %msg.user_id, "Onboarding complete, profile saved");
                self.reply(msg, OutgoingResponse::text(PROFILE_SAVED)).await
            }
            Err(e) => {
                tracing::error!(user = %msg.user_id, "Save profile error: {e}");
                self.reply(msg, OutgoingResponse::text(PROFILE_SAVE_FAILED))
                    .await
            }
        }
    }

    // ── Profile & plans ─────────────────────────────────────────────

    async fn show_profile(&self, msg: &IncomingMessage) -> Result<(), Error> {
        match self.load_profile(&msg.user_id).await {
            Some(profile) => {
                self.reply(msg, OutgoingResponse::markdown(render_profile(&profile)))
                    .await
            }
            None => self.reply(msg, OutgoingResponse::text(NO_PROFILE)).await,
        }
    }

    async fn generate_plan(&self, msg: &IncomingMessage, kind: PlanKind) -> Result<(), Error> {
        let Some(profile) = self.load_profile(&msg.user_id).await else {
            return self.reply(msg, OutgoingResponse::text(PROFILE_REQUIRED)).await;
        };

        let (prompt, notice, fallback) = match kind {
            PlanKind::Workout => (
                prompts::workout_prompt(&profile),
                Some(WORKOUT_NOTICE),
                WORKOUT_FAILED,
            ),
            PlanKind::Nutrition => (
                prompts::nutrition_prompt(&profile),
                Some(DIET_NOTICE),
                DIET_FAILED,
            ),
            PlanKind::Motivation => (
                prompts::motivation_prompt(&profile),
                None,
                MOTIVATION_FALLBACK,
            ),
        };

        if let Some(notice) = notice {
            self.reply(msg, OutgoingResponse::text(notice)).await?;
        }

        let generated: Result<String, Error> = async {
            let content = self
                .complete(msg, prompts::SYSTEM_PROMPT.to_string(), prompt)
                .await?;
            self.db.save_plan(&msg.user_id, kind, &content).await?;
            Ok(content)
        }
        .await;

        match generated {
            Ok(content) => {
                let response = match kind {
                    PlanKind::Motivation => OutgoingResponse::text(content),
                    _ => OutgoingResponse::markdown(content),
                };
                self.reply(msg, response).await
            }
            Err(e) => {
                tracing::error!(user = %msg.user_id, kind = %kind, "Plan generation error: {e}");
                self.reply(msg, OutgoingResponse::text(fallback)).await
            }
        }
    }

    async fn last_workout(&self, msg: &IncomingMessage) -> Result<(), Error> {
        match self.db.latest_plan(&msg.user_id, PlanKind::Workout).await {
            Ok(Some(plan)) => self.reply(msg, OutgoingResponse::markdown(plan.content)).await,
            Ok(None) => self.reply(msg, OutgoingResponse::text(NO_SAVED_WORKOUT)).await,
            Err(e) => {
                tracing::error!(user = %msg.user_id, "Latest workout lookup failed: {e}");
                self.reply(msg, OutgoingResponse::text(LAST_WORKOUT_FAILED))
                    .await
            }
        }
    }

    // ── Progress logging ────────────────────────────────────────────

    async fn start_progress(&self, msg: &IncomingMessage) -> Result<(), Error> {
        if self.load_profile(&msg.user_id).await.is_none() {
            return self.reply(msg, OutgoingResponse::text(PROFILE_REQUIRED)).await;
        }

        self.sessions
            .set(&msg.user_id, ConversationState::new_progress());
        self.reply(msg, OutgoingResponse::text(WEIGHT_PROMPT)).await
    }

    async fn advance_progress(
        &self,
        msg: &IncomingMessage,
        step: ProgressStep,
        mut draft: ProgressDraft,
    ) -> Result<(), Error> {
        match step {
            ProgressStep::AwaitingWeight => {
                let weight = parse_weight(&msg.content);
                if weight.is_none() && self.policy.validation == ValidationPolicy::Strict {
                    return self.reply(msg, OutgoingResponse::text(WEIGHT_INVALID)).await;
                }
                draft.weight = weight;
                self.sessions.set(
                    &msg.user_id,
                    ConversationState::ProgressLogging {
                        step: ProgressStep::AwaitingMood,
                        draft,
                    },
                );
                self.reply(msg, OutgoingResponse::text(MOOD_PROMPT)).await
            }
            ProgressStep::AwaitingMood => {
                draft.mood = Some(msg.content.clone());
                self.sessions.set(
                    &msg.user_id,
                    ConversationState::ProgressLogging {
                        step: ProgressStep::AwaitingEnergy,
                        draft,
                    },
                );
                self.reply(msg, OutgoingResponse::text(ENERGY_PROMPT)).await
            }
            ProgressStep::AwaitingEnergy => {
                let entry = ProgressEntry {
                    weight: draft.weight,
                    mood: draft.mood.unwrap_or_default(),
                    energy_level: msg.content.clone(),
                };
                self.finish_progress(msg, entry).await
            }
        }
    }

    async fn finish_progress(&self, msg: &IncomingMessage, entry: ProgressEntry) -> Result<(), Error> {
        let result = self.db.log_progress(&msg.user_id, entry.clone()).await;
        self.sessions.clear(&msg.user_id);

        if let Err(e) = result {
            tracing::error!(user = %msg.user_id, "Progress log error: {e}");
            return self.reply(msg, OutgoingResponse::text(PROGRESS_FAILED)).await;
        }

        self.reply(msg, OutgoingResponse::text(PROGRESS_LOGGED)).await?;

        // Feedback failures are not handled here; the dispatcher reports them.
        let profile = self.load_profile(&msg.user_id).await;
        let feedback = self
            .complete(
                msg,
                prompts::chat_system_prompt(profile.as_ref()),
                prompts::progress_feedback_prompt(&entry),
            )
            .await?;
        self.reply(msg, OutgoingResponse::text(feedback)).await
    }

    // ── Chat ────────────────────────────────────────────────────────

    async fn chat(&self, msg: &IncomingMessage) -> Result<(), Error> {
        let profile = self.load_profile(&msg.user_id).await;
        let system = prompts::chat_system_prompt(profile.as_ref());

        match self.complete(msg, system, msg.content.clone()).await {
            Ok(content) => self.reply(msg, OutgoingResponse::text(content)).await,
            Err(e) => {
                tracing::error!(user = %msg.user_id, "Chat error: {e}");
                self.reply(msg, OutgoingResponse::text(CHAT_FAILED)).await
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Read a profile; lookup errors are logged and read as "no profile".
    async fn load_profile(&self, user_id: &str) -> Option<UserProfile> {
        match self.db.get_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user = %user_id, "Error fetching profile: {e}");
                None
            }
        }
    }

    /// One system + user completion.
    async fn complete(
        &self,
        msg: &IncomingMessage,
        system: String,
        user: String,
    ) -> Result<String, LlmError> {
        if let Err(e) = self.channels.send_typing(msg).await {
            tracing::debug!("Typing indicator failed: {e}");
        }

        let request =
            CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)]);
        let response = self.llm.complete(request).await?;
        tracing::debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Completion finished"
        );
        Ok(response.content)
    }

    async fn reply(&self, msg: &IncomingMessage, response: OutgoingResponse) -> Result<(), Error> {
        self.channels.respond(msg, response).await?;
        Ok(())
    }
}

/// Parse a weight answer from its leading number, so `72.5 kg` and `80kg`
/// both count. A decimal comma is accepted. Text that does not start with a
/// number, or a non-finite value, is `None`.
fn parse_weight(text: &str) -> Option<f64> {
    let text = text.trim().replace(',', ".");
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }

    // Longest prefix that parses: drops a trailing sign or dot such as `72.`.
    (1..=end)
        .rev()
        .find_map(|len| text[..len].parse::<f64>().ok())
        .filter(|w| w.is_finite())
}

/// Markdown summary of a profile for `/profile`.
fn render_profile(profile: &UserProfile) -> String {
    let field = |key: &str| profile.answer(key).unwrap_or("-");
    format!(
        "📋 *User Fitness Profile*\n\n\
         Age: {}\n\
         Gender: {}\n\
         Height: {} cm\n\
         Weight: {} kg\n\
         Goal: {}\n\
         Level: {}\n\
         Location: {}\n\
         Diet: {}",
        field("age"),
        field("gender"),
        field("height"),
        field("weight"),
        field("goal"),
        field("fitness_level"),
        field("training_location"),
        field("diet_type"),
    )
}
