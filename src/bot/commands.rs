/// A text command addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Joins the caller, optionally queues a query, then starts playback.
    Play(Option<String>),
    /// Queues a query without starting playback.
    Add(String),
    Pause,
    Resume,
    Skip,
    Loop,
    Shuffle,
    Queue,
    Connect,
    Disconnect,
    Help,
}

/// Usage line and description per command, aliases separated by `|`.
const USAGE: &[(&str, &str)] = &[
    ("play | p [query]", "Join your channel, queue the query if given and start playing"),
    ("add | a <query>", "Queue a song or playlist without starting playback"),
    ("pause", "Pause the current song"),
    ("resume", "Resume a paused song, or start the queue"),
    ("skip | s", "Skip to the next song"),
    ("loop", "Toggle repeating the current song"),
    ("shuffle", "Shuffle the queued songs"),
    ("queue | q", "Show the queue"),
    ("connect", "Join or move to your voice channel"),
    ("dc", "Stop, clear the queue and leave"),
    ("help", "Show this list"),
];

pub fn help_text(prefix: &str) -> String {
    let mut text = String::from("🎵 **Commands**\n");
    for (usage, about) in USAGE {
        text.push_str(&format!("`{prefix}{usage}` - {about}\n"));
    }
    text
}

/// Why a prefixed message did not become a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown(String),
    MissingQuery(&'static str),
}

impl Command {
    /// Parses `content` if it starts with `prefix`. Messages without the
    /// prefix yield `None`.
    pub fn parse(prefix: &str, content: &str) -> Option<Result<Self, ParseError>> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }

        let query = (!args.is_empty()).then(|| args.to_string());

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Ok(Command::Play(query)),
            "add" | "a" => query.map(Command::Add).ok_or(ParseError::MissingQuery("add")),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "skip" | "s" => Ok(Command::Skip),
            "loop" => Ok(Command::Loop),
            "shuffle" => Ok(Command::Shuffle),
            "queue" | "q" => Ok(Command::Queue),
            "connect" => Ok(Command::Connect),
            "dc" => Ok(Command::Disconnect),
            "help" => Ok(Command::Help),
            other => Err(ParseError::Unknown(other.to_string())),
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Add(_) => "add",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Skip => "skip",
            Command::Loop => "loop",
            Command::Shuffle => "shuffle",
            Command::Queue => "queue",
            Command::Connect => "connect",
            Command::Disconnect => "dc",
            Command::Help => "help",
        }
    }

    /// Commands that act on the caller's voice channel.
    pub fn needs_voice(&self) -> bool {
        matches!(self, Command::Play(_) | Command::Add(_) | Command::Connect)
    }
}
