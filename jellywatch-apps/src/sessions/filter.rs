//! The activity predicate deciding which sessions count as "in progress".

use crate::backend::wire::RawSession;

/// A session is active iff it has a playing item and is either reported as
/// playing outright, or is not explicitly paused while sitting at a non-zero
/// position. Connected-but-idle clients never count.
pub fn is_active(session: &RawSession) -> bool {
    if session.now_playing_item.is_none() {
        return false;
    }
    if session.playback_state.as_deref() == Some("Playing") {
        return true;
    }
    !is_explicitly_paused(session) && session.position_ticks() > 0
}

/// Either signal counts as an explicit pause: the coarse status string or the
/// nested pause flag.
fn is_explicitly_paused(session: &RawSession) -> bool {
    session.playback_state.as_deref() == Some("Paused") || session.is_paused() == Some(true)
}
