//! Command types and definitions.

use std::fmt;

use thiserror::Error;

/// Static description of one command, used for parsing errors and help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    pub admin_only: bool,
}

const fn open(name: &'static str, usage: &'static str, description: &'static str) -> CommandSpec {
    CommandSpec {
        name,
        usage,
        description,
        admin_only: false,
    }
}

const fn admin(name: &'static str, usage: &'static str, description: &'static str) -> CommandSpec {
    CommandSpec {
        name,
        usage,
        description,
        admin_only: true,
    }
}

/// Every command the bot understands, in help order.
pub const COMMANDS: &[CommandSpec] = &[
    open("start", "/start", "Welcome message"),
    open("help", "/help", "Show available commands"),
    open("search", "/search <text>", "Find movies by title"),
    open("cancel", "/cancel", "Abort the current step-by-step flow"),
    admin("admin", "/admin", "Admin panel"),
    admin("stats", "/stats", "User, movie and view counts"),
    admin("addmovie", "/addmovie", "Add a movie step by step"),
    admin("deletemovie", "/deletemovie <code>", "Retire a movie code"),
    admin("listmovies", "/listmovies", "List active movies"),
    admin("broadcast", "/broadcast [text]", "Send a message to every user"),
    admin("stopbroadcast", "/stopbroadcast", "Stop the running broadcast"),
    admin("msguser", "/msguser <user_id> <text>", "Message a single user"),
    admin("setchannel", "/setchannel <@channel>", "Add a required channel"),
    admin("rmchannel", "/rmchannel <@channel>", "Remove a required channel"),
    admin("channels", "/channels", "List required channels"),
    admin("addadmin", "/addadmin <user_id>", "Grant admin rights"),
    admin("rmadmin", "/rmadmin <user_id>", "Revoke admin rights"),
    admin("admins", "/admins", "List admins"),
    admin("set", "/set <key> <value>", "Change a setting"),
    admin("settings", "/settings", "Show settings"),
    admin("addad", "/addad", "Schedule an ad step by step"),
    admin("listads", "/listads", "List pending ads"),
    admin("deletead", "/deletead <id>", "Delete a scheduled ad"),
];

fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Why a message did not parse into a [`BotCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Not a command")]
    NotACommand,

    #[error("Unknown command: /{0}")]
    Unknown(String),

    #[error("Usage: {}", .0.usage)]
    Usage(&'static CommandSpec),
}

impl CommandError {
    /// Whether the failed command is admin-only (errors for those stay
    /// silent towards non-admins).
    #[must_use]
    pub const fn requires_admin(&self) -> bool {
        match self {
            Self::Usage(entry) => entry.admin_only,
            Self::NotACommand | Self::Unknown(_) => false,
        }
    }
}

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Search(String),
    Cancel,

    Admin,
    Stats,
    AddMovie,
    DeleteMovie(i64),
    ListMovies,
    /// Broadcast the given text, or ask for it when absent.
    Broadcast(Option<String>),
    StopBroadcast,
    MsgUser { user_id: i64, text: String },
    SetChannel(String),
    RmChannel(String),
    Channels,
    AddAdmin(i64),
    RmAdmin(i64),
    Admins,
    Set { key: String, value: String },
    Settings,
    AddAd,
    ListAds,
    DeleteAd(i64),
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Commands start with `/`, may carry an `@botname` suffix, and are
    /// matched case-insensitively.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        let Some(after_slash) = text.strip_prefix('/') else {
            return Err(CommandError::NotACommand);
        };

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (after_slash, ""),
        };
        let name = head.split('@').next().unwrap_or_default().to_lowercase();
        if name.is_empty() {
            return Err(CommandError::NotACommand);
        }

        let Some(entry) = lookup(&name) else {
            return Err(CommandError::Unknown(name));
        };
        let usage = || CommandError::Usage(entry);

        let command = match entry.name {
            "start" => Self::Start,
            "help" => Self::Help,
            "search" => Self::Search(non_empty(args).ok_or_else(usage)?),
            "cancel" => Self::Cancel,
            "admin" => Self::Admin,
            "stats" => Self::Stats,
            "addmovie" => Self::AddMovie,
            "deletemovie" => Self::DeleteMovie(parse_id(args).ok_or_else(usage)?),
            "listmovies" => Self::ListMovies,
            "broadcast" => Self::Broadcast(non_empty(args)),
            "stopbroadcast" => Self::StopBroadcast,
            "msguser" => {
                let (id, text) = args.split_once(char::is_whitespace).ok_or_else(usage)?;
                Self::MsgUser {
                    user_id: parse_id(id).ok_or_else(usage)?,
                    text: non_empty(text).ok_or_else(usage)?,
                }
            }
            "setchannel" => Self::SetChannel(single_word(args).ok_or_else(usage)?),
            "rmchannel" => Self::RmChannel(single_word(args).ok_or_else(usage)?),
            "channels" => Self::Channels,
            "addadmin" => Self::AddAdmin(parse_id(args).ok_or_else(usage)?),
            "rmadmin" => Self::RmAdmin(parse_id(args).ok_or_else(usage)?),
            "admins" => Self::Admins,
            "set" => {
                let (key, value) = args.split_once(char::is_whitespace).ok_or_else(usage)?;
                Self::Set {
                    key: key.to_lowercase(),
                    value: non_empty(value).ok_or_else(usage)?,
                }
            }
            "settings" => Self::Settings,
            "addad" => Self::AddAd,
            "listads" => Self::ListAds,
            "deletead" => Self::DeleteAd(parse_id(args).ok_or_else(usage)?),
            _ => return Err(CommandError::Unknown(name)),
        };
        Ok(command)
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Search(_) => "search",
            Self::Cancel => "cancel",
            Self::Admin => "admin",
            Self::Stats => "stats",
            Self::AddMovie => "addmovie",
            Self::DeleteMovie(_) => "deletemovie",
            Self::ListMovies => "listmovies",
            Self::Broadcast(_) => "broadcast",
            Self::StopBroadcast => "stopbroadcast",
            Self::MsgUser { .. } => "msguser",
            Self::SetChannel(_) => "setchannel",
            Self::RmChannel(_) => "rmchannel",
            Self::Channels => "channels",
            Self::AddAdmin(_) => "addadmin",
            Self::RmAdmin(_) => "rmadmin",
            Self::Admins => "admins",
            Self::Set { .. } => "set",
            Self::Settings => "settings",
            Self::AddAd => "addad",
            Self::ListAds => "listads",
            Self::DeleteAd(_) => "deletead",
        }
    }

    #[must_use]
    pub const fn requires_admin(&self) -> bool {
        !matches!(
            self,
            Self::Start | Self::Help | Self::Search(_) | Self::Cancel
        )
    }

    /// Help lines for the commands visible to the caller.
    #[must_use]
    pub fn all_commands(include_admin: bool) -> Vec<(&'static str, &'static str)> {
        COMMANDS
            .iter()
            .filter(|c| include_admin || !c.admin_only)
            .map(|c| (c.usage, c.description))
            .collect()
    }
}

fn non_empty(args: &str) -> Option<String> {
    let args = args.trim();
    (!args.is_empty()).then(|| args.to_owned())
}

fn single_word(args: &str) -> Option<String> {
    let mut words = args.split_whitespace();
    let word = words.next()?;
    words.next().is_none().then(|| word.to_owned())
}

fn parse_id(args: &str) -> Option<i64> {
    args.trim().parse().ok()
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search(text) => write!(f, "/search {text}"),
            Self::DeleteMovie(code) => write!(f, "/deletemovie {code}"),
            Self::Broadcast(Some(_)) => write!(f, "/broadcast <text>"),
            Self::MsgUser { user_id, .. } => write!(f, "/msguser {user_id} <text>"),
            Self::SetChannel(handle) => write!(f, "/setchannel {handle}"),
            Self::RmChannel(handle) => write!(f, "/rmchannel {handle}"),
            Self::AddAdmin(id) => write!(f, "/addadmin {id}"),
            Self::RmAdmin(id) => write!(f, "/rmadmin {id}"),
            Self::Set { key, value } => write!(f, "/set {key} {value}"),
            Self::DeleteAd(id) => write!(f, "/deletead {id}"),
            _ => write!(f, "/{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,

    /// Whether to ask the ad scheduler for an immediate dispatch.
    pub trigger_dispatch: bool,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            trigger_dispatch: false,
        }
    }

    /// Creates a successful result that wakes the ad scheduler.
    #[must_use]
    pub fn success_with_dispatch(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            trigger_dispatch: true,
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            trigger_dispatch: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_commands() {
        assert_eq!(BotCommand::parse("/start"), Ok(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help"), Ok(BotCommand::Help));
        assert_eq!(BotCommand::parse("/cancel"), Ok(BotCommand::Cancel));
        assert_eq!(
            BotCommand::parse("/search  the matrix "),
            Ok(BotCommand::Search("the matrix".to_owned()))
        );
    }

    #[test]
    fn test_parse_strips_bot_suffix() {
        assert_eq!(BotCommand::parse("/start@movie_bot"), Ok(BotCommand::Start));
        assert_eq!(
            BotCommand::parse("/deletemovie@movie_bot 7"),
            Ok(BotCommand::DeleteMovie(7))
        );
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("/STATS"), Ok(BotCommand::Stats));
        assert_eq!(BotCommand::parse("/AddMovie"), Ok(BotCommand::AddMovie));
    }

    #[test]
    fn test_parse_not_a_command() {
        assert_eq!(BotCommand::parse("42"), Err(CommandError::NotACommand));
        assert_eq!(BotCommand::parse("hello"), Err(CommandError::NotACommand));
        assert_eq!(BotCommand::parse("/"), Err(CommandError::NotACommand));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            BotCommand::parse("/frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_owned()))
        );
    }

    #[test]
    fn test_parse_numeric_arguments() {
        assert_eq!(BotCommand::parse("/addadmin 555"), Ok(BotCommand::AddAdmin(555)));
        assert_eq!(BotCommand::parse("/rmadmin 555"), Ok(BotCommand::RmAdmin(555)));
        assert_eq!(BotCommand::parse("/deletead 3"), Ok(BotCommand::DeleteAd(3)));

        let err = BotCommand::parse("/deletemovie abc").unwrap_err();
        assert!(matches!(err, CommandError::Usage(entry) if entry.name == "deletemovie"));
        assert!(err.requires_admin());
        assert_eq!(err.to_string(), "Usage: /deletemovie <code>");

        assert!(matches!(
            BotCommand::parse("/addadmin"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_broadcast() {
        assert_eq!(BotCommand::parse("/broadcast"), Ok(BotCommand::Broadcast(None)));
        assert_eq!(
            BotCommand::parse("/broadcast New movies today!"),
            Ok(BotCommand::Broadcast(Some("New movies today!".to_owned())))
        );
    }

    #[test]
    fn test_parse_msguser() {
        assert_eq!(
            BotCommand::parse("/msguser 42 Hello there"),
            Ok(BotCommand::MsgUser {
                user_id: 42,
                text: "Hello there".to_owned()
            })
        );
        assert!(BotCommand::parse("/msguser 42").is_err());
        assert!(BotCommand::parse("/msguser bob hi").is_err());
    }

    #[test]
    fn test_parse_channel_and_set() {
        assert_eq!(
            BotCommand::parse("/setchannel @news"),
            Ok(BotCommand::SetChannel("@news".to_owned()))
        );
        assert!(BotCommand::parse("/setchannel a b").is_err());
        assert_eq!(
            BotCommand::parse("/set Force_Subscribe off"),
            Ok(BotCommand::Set {
                key: "force_subscribe".to_owned(),
                value: "off".to_owned()
            })
        );
        assert!(BotCommand::parse("/set force_subscribe").is_err());
    }

    #[test]
    fn test_admin_split() {
        assert!(!BotCommand::Search("x".into()).requires_admin());
        assert!(BotCommand::Stats.requires_admin());
        assert!(BotCommand::Broadcast(None).requires_admin());

        let open_only = BotCommand::all_commands(false);
        assert_eq!(open_only.len(), 4);
        assert_eq!(BotCommand::all_commands(true).len(), COMMANDS.len());
        assert!(!BotCommand::parse("/search").unwrap_err().requires_admin());
    }

    #[test]
    fn test_every_listed_command_parses() {
        for entry in COMMANDS {
            let result = BotCommand::parse(&format!("/{}", entry.name));
            assert!(
                !matches!(result, Err(CommandError::Unknown(_))),
                "{} should be known",
                entry.name
            );
            if let Ok(command) = result {
                assert_eq!(command.name(), entry.name);
                assert_eq!(command.requires_admin(), entry.admin_only);
            }
        }
    }
}
