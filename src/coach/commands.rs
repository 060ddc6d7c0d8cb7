//! Command recognition for inbound text.

/// A bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Profile,
    Workout,
    Diet,
    Motivation,
    Progress,
    LastWorkout,
    Reset,
    Help,
}

impl Command {
    /// Parse message content into a Command.
    ///
    /// The first token decides: it is matched case-insensitively, an
    /// `@BotName` suffix is dropped and anything after it is ignored.
    /// Unknown slash tokens are not commands and fall through to text routing.
    pub fn parse(content: &str) -> Option<Command> {
        let token = content.split_whitespace().next()?;
        if !token.starts_with('/') {
            return None;
        }
        let name = token.split('@').next().unwrap_or(token).to_lowercase();

        match name.as_str() {
            "/start" => Some(Self::Start),
            "/profile" => Some(Self::Profile),
            "/workout" => Some(Self::Workout),
            "/diet" => Some(Self::Diet),
            "/motivation" => Some(Self::Motivation),
            "/progress" => Some(Self::Progress),
            "/lastworkout" => Some(Self::LastWorkout),
            "/reset" => Some(Self::Reset),
            "/help" => Some(Self::Help),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "/start",
            Self::Profile => "/profile",
            Self::Workout => "/workout",
            Self::Diet => "/diet",
            Self::Motivation => "/motivation",
            Self::Progress => "/progress",
            Self::LastWorkout => "/lastworkout",
            Self::Reset => "/reset",
            Self::Help => "/help",
        }
    }
}
