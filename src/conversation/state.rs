//! Conversation states and input parsing for multi-step admin flows.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Where a user is inside a multi-step flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,

    /// `/addmovie`: waiting for the video upload.
    AwaitingVideo,
    /// `/addmovie`: waiting for the title.
    AwaitingTitle { file_id: String },
    /// `/addmovie`: waiting for "format | language" or `-`.
    AwaitingDetails { file_id: String, title: String },

    /// `/addad`: waiting for a photo or `-`.
    AwaitingAdImage,
    /// `/addad`: waiting for the ad text.
    AwaitingAdText { image: Option<String> },
    /// `/addad`: waiting for "label | url".
    AwaitingAdButton { image: Option<String>, text: String },
    /// `/addad`: waiting for "YYYY-MM-DD HH:MM N" or "now N".
    AwaitingAdSchedule { draft: AdDraft },

    /// `/broadcast` without text: waiting for the message to send.
    AwaitingBroadcast,
}

/// Ad fields collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdDraft {
    pub image: Option<String>,
    pub text: String,
    pub button_text: String,
    pub button_url: String,
}

impl ConversationState {
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Prompt shown when entering (or re-entering) this state.
    #[must_use]
    pub const fn prompt(&self) -> &'static str {
        match self {
            Self::Idle => "Nothing in progress.",
            Self::AwaitingVideo => "🎬 Send the movie video.",
            Self::AwaitingTitle { .. } => "✏️ Send the movie title.",
            Self::AwaitingDetails { .. } => {
                "📀 Send format and language as: format | language\nOr send - to use the defaults."
            }
            Self::AwaitingAdImage => "🖼 Send the ad image, or - for a text-only ad.",
            Self::AwaitingAdText { .. } => "📝 Send the ad text.",
            Self::AwaitingAdButton { .. } => "🔗 Send the button as: label | https://url",
            Self::AwaitingAdSchedule { .. } => {
                "⏰ Send the schedule as: YYYY-MM-DD HH:MM N (UTC), or: now N\nN is how many times the ad is sent."
            }
            Self::AwaitingBroadcast => "📣 Send the message to broadcast to all users.",
        }
    }
}

/// `-` (or an empty reply) means "skip this optional step".
#[must_use]
pub fn is_skip(text: &str) -> bool {
    matches!(text.trim(), "" | "-")
}

/// Splits `left | right`, both sides trimmed and non-empty.
#[must_use]
pub fn split_pair(text: &str) -> Option<(String, String)> {
    let (left, right) = text.split_once('|')?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_owned(), right.to_owned()))
}

/// Parses `label | url`, requiring an http(s) URL.
#[must_use]
pub fn parse_button(text: &str) -> Option<(String, String)> {
    let (label, url) = split_pair(text)?;
    let valid = (url.starts_with("https://") || url.starts_with("http://"))
        && !url.contains(char::is_whitespace);
    valid.then_some((label, url))
}

/// Parses `YYYY-MM-DD HH:MM N` (UTC) or `now N` into a time and a
/// positive repeat count.
#[must_use]
pub fn parse_schedule(text: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, i64)> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let (when, repeat) = match parts.as_slice() {
        [word, repeat] if word.eq_ignore_ascii_case("now") => (now, *repeat),
        [date, time, repeat] => {
            let naive =
                NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").ok()?;
            (naive.and_utc(), *repeat)
        }
        _ => return None,
    };
    let repeat: i64 = repeat.parse().ok()?;
    (repeat > 0).then_some((when, repeat))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_default_is_idle() {
        assert!(ConversationState::default().is_idle());
        assert!(!ConversationState::AwaitingVideo.is_idle());
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(
            split_pair(" MKV | English "),
            Some(("MKV".to_owned(), "English".to_owned()))
        );
        assert_eq!(split_pair("MKV |"), None);
        assert_eq!(split_pair("no separator"), None);
    }

    #[test]
    fn test_parse_button() {
        assert_eq!(
            parse_button("Join | https://t.me/news"),
            Some(("Join".to_owned(), "https://t.me/news".to_owned()))
        );
        assert_eq!(parse_button("Join | t.me/news"), None);
        assert_eq!(parse_button("Join | https://bad url"), None);
    }

    #[test]
    fn test_parse_schedule() {
        assert_eq!(parse_schedule("now 3", now()), Some((now(), 3)));
        assert_eq!(parse_schedule("NOW 1", now()).map(|(_, n)| n), Some(1));

        let (when, repeat) = parse_schedule("2030-01-02 09:30 2", now()).unwrap();
        assert_eq!(when.to_rfc3339(), "2030-01-02T09:30:00+00:00");
        assert_eq!(repeat, 2);

        assert_eq!(parse_schedule("now 0", now()), None);
        assert_eq!(parse_schedule("now -1", now()), None);
        assert_eq!(parse_schedule("2030-13-02 09:30 2", now()), None);
        assert_eq!(parse_schedule("tomorrow", now()), None);
    }

    #[test]
    fn test_is_skip() {
        assert!(is_skip("-"));
        assert!(is_skip("  "));
        assert!(!is_skip("MKV | English"));
    }
}
