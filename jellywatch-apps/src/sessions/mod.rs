//! Pure aggregation of a snapshot's raw sessions into a rendered view.
//!
//! No I/O happens here. Given the same snapshot, template and idle message,
//! [`render`] always produces the same [`RenderedView`], and the session
//! order it exposes is a contract consumers may rely on.

pub mod facts;
pub mod filter;
pub mod template;

pub use facts::{ActiveSession, MediaType};
pub use filter::is_active;
pub use template::{RenderError, TEMPLATE_KEYS};

use crate::backend::snapshot::Snapshot;
use crate::backend::wire::RawSession;

/// Per-type tallies over the active sessions. Always computed, even when
/// rendering degrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub active: u64,
    pub audio: u64,
    pub episode: u64,
    pub movie: u64,
}

impl SessionCounts {
    pub fn tally(sessions: &[ActiveSession]) -> SessionCounts {
        let mut counts = SessionCounts {
            active: sessions.len() as u64,
            ..Default::default()
        };
        for session in sessions {
            match session.media_type {
                MediaType::Audio => counts.audio += 1,
                MediaType::Episode => counts.episode += 1,
                MediaType::Movie => counts.movie += 1,
                MediaType::Other => {}
            }
        }
        counts
    }
}

/// Everything one aggregation pass produces.
#[derive(Debug, Clone)]
pub struct RenderedView {
    /// True when at least one session passed the activity filter.
    pub any_active: bool,
    /// Newline-joined rendered lines, or the idle message when nothing is
    /// active.
    pub summary: String,
    pub counts: SessionCounts,
    /// Active sessions in display order.
    pub sessions: Vec<ActiveSession>,
}

/// Filters to active sessions, derives their facts and sorts them by
/// case-insensitive user name, then case-insensitive title. The sort is
/// stable, so equal keys keep their arrival order.
pub fn aggregate(sessions: &[RawSession]) -> Vec<ActiveSession> {
    let mut active: Vec<ActiveSession> = sessions
        .iter()
        .filter(|session| is_active(session))
        .filter_map(ActiveSession::from_raw)
        .collect();
    active.sort_by_key(|session| (session.user.to_lowercase(), session.title.to_lowercase()));
    active
}

/// Renders the whole snapshot: one line per active session through the user
/// template, or the idle message when nothing is playing.
pub fn render(snapshot: &Snapshot, session_template: &str, idle_message: &str) -> RenderedView {
    let sessions = aggregate(&snapshot.sessions);
    let counts = SessionCounts::tally(&sessions);
    let any_active = !sessions.is_empty();
    let summary = if any_active {
        sessions
            .iter()
            .map(|session| template::render_line(session_template, session))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        idle_message.to_string()
    };
    RenderedView {
        any_active,
        summary,
        counts,
        sessions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::wire::{NowPlayingItem, PlayState};

    fn playing_session(user: &str, title: &str, item_type: &str) -> RawSession {
        RawSession {
            user_name: Some(user.to_string()),
            playback_state: Some("Playing".to_string()),
            play_state: Some(PlayState {
                position_ticks: Some(1_000_000_000),
                is_paused: Some(false),
                ..Default::default()
            }),
            now_playing_item: Some(NowPlayingItem {
                name: Some(title.to_string()),
                item_type: Some(item_type.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sessions_sort_by_user_then_title_case_insensitively() {
        let raw = vec![
            playing_session("bob", "Zeta", "Movie"),
            playing_session("Alice", "Alpha", "Movie"),
            playing_session("bob", "Alpha", "Movie"),
        ];
        let ordered: Vec<(String, String)> = aggregate(&raw)
            .into_iter()
            .map(|s| (s.user, s.title))
            .collect();
        assert_eq!(
            ordered,
            vec![
                ("Alice".to_string(), "Alpha".to_string()),
                ("bob".to_string(), "Alpha".to_string()),
                ("bob".to_string(), "Zeta".to_string()),
            ]
        );
    }

    #[test]
    fn idle_snapshot_renders_idle_message_with_zero_counts() {
        let snapshot = Snapshot {
            sessions: vec![RawSession::default()],
            ..Default::default()
        };
        let view = render(&snapshot, "{user}: {title}", "No active sessions");
        assert!(!view.any_active);
        assert_eq!(view.summary, "No active sessions");
        assert_eq!(view.counts, SessionCounts::default());
        assert!(view.sessions.is_empty());
    }

    #[test]
    fn active_snapshot_renders_one_line_per_session_in_order() {
        let snapshot = Snapshot {
            sessions: vec![
                playing_session("bob", "Heat", "Movie"),
                playing_session("alice", "Pilot", "Episode"),
            ],
            ..Default::default()
        };
        let view = render(&snapshot, "{user} - {title}", "idle");
        assert!(view.any_active);
        assert_eq!(view.summary, "alice - Pilot\nbob - Heat");
    }

    #[test]
    fn counts_partition_by_media_type() {
        let raw = vec![
            playing_session("a", "song", "Audio"),
            playing_session("b", "film", "Movie"),
            playing_session("c", "show", "Episode"),
            playing_session("d", "show2", "Episode"),
            playing_session("e", "clip", "Trailer"),
        ];
        let counts = SessionCounts::tally(&aggregate(&raw));
        assert_eq!(counts.active, 5);
        assert_eq!(counts.audio, 1);
        assert_eq!(counts.movie, 1);
        assert_eq!(counts.episode, 2);
    }

    #[test]
    fn one_bad_template_line_does_not_poison_the_rest() {
        let snapshot = Snapshot {
            sessions: vec![
                playing_session("alice", "Pilot", "Episode"),
                playing_session("bob", "Heat", "Movie"),
            ],
            ..Default::default()
        };
        let view = render(&snapshot, "{user} {bogus}", "idle");
        let lines: Vec<&str> = view.summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("missing template key")));
        assert_eq!(view.counts.active, 2);
    }
}
