//! Per-session line rendering from a user-supplied template.
//!
//! The engine recognizes a closed set of `{key}` placeholders. An unknown
//! key degrades that one session's line to a diagnostic string; it never
//! aborts the whole render.

use super::facts::ActiveSession;

/// Every placeholder the engine substitutes. Anything else in braces is a
/// [`RenderError::MissingTemplateKey`].
pub const TEMPLATE_KEYS: &[&str] = &[
    "user",
    "device",
    "client",
    "title",
    "quality",
    "audio",
    "rating",
    "series",
    "season",
    "episode",
    "artist",
    "icons",
    "position",
    "runtime",
    "percentage",
    "play_method",
    "transcode_fps",
    "transcode_percentage",
    "transcode_reasons",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("missing template key: {0}")]
    MissingTemplateKey(String),
}

/// Renders one session's line, falling back to a bracketed diagnostic when
/// the template names a key the context does not have.
pub fn render_line(template: &str, session: &ActiveSession) -> String {
    match substitute(template, session) {
        Ok(line) => tidy_line(&line),
        Err(err) => format!("[{err}]"),
    }
}

/// Exact `{key}` substitution. An opening brace with no closing brace is
/// kept literally.
pub fn substitute(template: &str, session: &ActiveSession) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_brace = &rest[open + 1..];
        match after_brace.find('}') {
            Some(close) => {
                let key = &after_brace[..close];
                match lookup(session, key) {
                    Some(value) => out.push_str(&value),
                    None => return Err(RenderError::MissingTemplateKey(key.to_string())),
                }
                rest = &after_brace[close + 1..];
            }
            None => {
                out.push('{');
                rest = after_brace;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Lists the `{key}` placeholders a template names, in order of appearance.
/// An opening brace with no closing brace is skipped, matching
/// [`substitute`]. Used for configuration-time validation.
pub fn placeholder_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after_brace = &rest[open + 1..];
        match after_brace.find('}') {
            Some(close) => {
                keys.push(after_brace[..close].to_string());
                rest = &after_brace[close + 1..];
            }
            None => rest = after_brace,
        }
    }
    keys
}

fn lookup(session: &ActiveSession, key: &str) -> Option<String> {
    let value = match key {
        "user" => session.user.clone(),
        "device" => session.device.clone(),
        "client" => session.client.clone(),
        "title" => session.title.clone(),
        "quality" => session.quality.clone(),
        "audio" => session.audio.clone(),
        "rating" => session.rating.clone(),
        "series" => session.series.clone(),
        "season" => session.season.clone(),
        "episode" => session.episode.clone(),
        "artist" => session.artist.clone(),
        "icons" => session.media_type.icon().to_string(),
        "position" => session.position.clone(),
        "runtime" => session.runtime.clone(),
        "percentage" => session.percentage.to_string(),
        "play_method" => session.play_method.clone(),
        "transcode_fps" => session.transcode_fps.clone(),
        "transcode_percentage" => session.transcode_percentage.clone(),
        "transcode_reasons" => session.transcode_reasons.clone(),
        _ => return None,
    };
    Some(value)
}

/// Cleans what an empty field leaves behind: whitespace runs collapse to a
/// single space, then a line starting with "- " or "\u{2013} " loses that
/// prefix and ": - " / ": \u{2013} " runs after a label collapse to ": ".
pub fn tidy_line(line: &str) -> String {
    let mut cleaned = line.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let stripped = cleaned
            .strip_prefix("- ")
            .or_else(|| cleaned.strip_prefix("\u{2013} "));
        match stripped {
            Some(rest) => cleaned = rest.to_string(),
            None => break,
        }
    }
    cleaned
        .replace(": - ", ": ")
        .replace(": \u{2013} ", ": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::wire::{NowPlayingItem, RawSession};
    use crate::sessions::facts::MediaType;

    fn episode_session() -> ActiveSession {
        let raw = RawSession {
            user_name: Some("alice".to_string()),
            device_name: Some("Living Room".to_string()),
            client: Some("WebPlayer".to_string()),
            now_playing_item: Some(NowPlayingItem {
                name: Some("Pilot".to_string()),
                item_type: Some("Episode".to_string()),
                series_name: Some("Some Show".to_string()),
                parent_index_number: Some(1),
                index_number: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        ActiveSession::from_raw(&raw).unwrap()
    }

    #[test]
    fn substitutes_each_known_key_exactly() {
        let session = episode_session();
        let line = render_line("{icons} {user} on {device}: {series} S{season}E{episode}", &session);
        assert_eq!(line, "\u{1F4FA} alice on Living Room: Some Show S01E03");
    }

    #[test]
    fn every_advertised_key_resolves() {
        let session = episode_session();
        for key in TEMPLATE_KEYS {
            assert!(
                lookup(&session, key).is_some(),
                "key {key} should be recognized"
            );
        }
    }

    #[test]
    fn unknown_key_degrades_to_diagnostic_line() {
        let line = render_line("{user} watches {nonsense}", &episode_session());
        assert_eq!(line, "[missing template key: nonsense]");
    }

    #[test]
    fn unmatched_brace_is_literal() {
        let line = render_line("{user} {not closed", &episode_session());
        assert_eq!(line, "alice {not closed");
    }

    #[test]
    fn leading_dash_from_empty_field_is_stripped() {
        let mut session = episode_session();
        session.artist = String::new();
        let line = render_line("{artist} \u{2013} {title}", &session);
        assert_eq!(line, "Pilot");
    }

    #[test]
    fn dash_after_label_collapses() {
        let mut session = episode_session();
        session.series = String::new();
        let line = render_line("{user}: {series} \u{2013} {title}", &session);
        assert_eq!(line, "alice: Pilot");

        let line = render_line("{user}: {series} - {title}", &session);
        assert_eq!(line, "alice: Pilot");
    }

    #[test]
    fn populated_fields_keep_their_dashes() {
        let line = render_line("{user}: {series} \u{2013} {title}", &episode_session());
        assert_eq!(line, "alice: Some Show \u{2013} Pilot");
    }

    #[test]
    fn placeholder_keys_lists_in_order_and_skips_unclosed() {
        assert_eq!(
            placeholder_keys("{user} on {device} {oops"),
            vec!["user".to_string(), "device".to_string()]
        );
        assert!(placeholder_keys("no placeholders here").is_empty());
    }
}
