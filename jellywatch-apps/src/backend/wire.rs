//! Wire types for the backend's JSON API.
//!
//! Field names follow the server's PascalCase schema. Every field a server
//! build may omit is optional, and unknown fields are ignored, so one sparse
//! or over-eager session entry never fails the whole decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One connected media client, as returned by the sessions endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawSession {
    pub user_name: Option<String>,
    pub client: Option<String>,
    pub device_name: Option<String>,
    /// Version of the server software. Idle sessions usually still carry it.
    pub application_version: Option<String>,
    /// Coarse status string ("Playing", "Paused", ...). Some server builds
    /// omit it and only fill [`RawSession::play_state`].
    pub playback_state: Option<String>,
    pub play_state: Option<PlayState>,
    pub now_playing_item: Option<NowPlayingItem>,
    pub transcoding_info: Option<TranscodingInfo>,
}

impl RawSession {
    /// Current playback position, zero when the session reports none.
    pub fn position_ticks(&self) -> u64 {
        self.play_state
            .as_ref()
            .and_then(|ps| ps.position_ticks)
            .unwrap_or(0)
    }

    /// Whether the session is explicitly flagged as paused.
    pub fn is_paused(&self) -> Option<bool> {
        self.play_state.as_ref().and_then(|ps| ps.is_paused)
    }

    pub fn play_method(&self) -> Option<&str> {
        self.play_state
            .as_ref()
            .and_then(|ps| ps.play_method.as_deref())
    }
}

/// Transport-level playback detail nested inside a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayState {
    pub position_ticks: Option<u64>,
    pub is_paused: Option<bool>,
    pub play_method: Option<String>,
}

/// The item a session is currently playing, when there is one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NowPlayingItem {
    pub name: Option<String>,
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    pub series_name: Option<String>,
    /// Season number, for episodes.
    pub parent_index_number: Option<u32>,
    /// Episode number within the season.
    pub index_number: Option<u32>,
    /// Runtime in ticks (ten million ticks per second).
    pub run_time_ticks: Option<u64>,
    pub official_rating: Option<String>,
    pub artists: Vec<String>,
    pub album_artist: Option<String>,
    pub media_streams: Vec<MediaStream>,
}

impl NowPlayingItem {
    fn stream_of_type(&self, wanted: &str) -> Option<&MediaStream> {
        self.media_streams
            .iter()
            .find(|stream| stream.stream_type.as_deref() == Some(wanted))
    }

    pub fn audio_stream(&self) -> Option<&MediaStream> {
        self.stream_of_type("Audio")
    }

    pub fn video_stream(&self) -> Option<&MediaStream> {
        self.stream_of_type("Video")
    }
}

/// One elementary stream of the playing item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaStream {
    #[serde(rename = "Type")]
    pub stream_type: Option<String>,
    pub codec: Option<String>,
    pub channels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_range: Option<String>,
}

/// Live transcoder statistics for a session, absent on direct play.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TranscodingInfo {
    /// Frames per second the transcoder is achieving. Lenient: numeric
    /// strings are accepted, anything else decodes as absent.
    #[serde(deserialize_with = "lenient_f64")]
    pub framerate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub completion_percentage: Option<f64>,
    pub transcode_reasons: Vec<String>,
}

/// Per-content-type item counts from the library counts endpoint, e.g.
/// `{"MovieCount": 42, "SeriesCount": 7}`. Kept sorted so renderings are
/// deterministic.
pub type LibraryCounts = BTreeMap<String, u64>;

/// Accepts a JSON number or a numeric string; anything else becomes `None`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_session(raw: &str) -> RawSession {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn full_session_decodes() {
        let session = parse_session(
            r#"{
                "UserName": "alice",
                "Client": "WebPlayer",
                "DeviceName": "Living Room",
                "ApplicationVersion": "10.8.13",
                "PlaybackState": "Playing",
                "PlayState": {
                    "PositionTicks": 9000000000,
                    "IsPaused": false,
                    "PlayMethod": "DirectPlay"
                },
                "NowPlayingItem": {
                    "Name": "Pilot",
                    "Type": "Episode",
                    "SeriesName": "Some Show",
                    "ParentIndexNumber": 1,
                    "IndexNumber": 3,
                    "RunTimeTicks": 36000000000,
                    "OfficialRating": "TV-14",
                    "MediaStreams": [
                        {"Type": "Video", "Codec": "hevc", "Width": 3840, "VideoRange": "HDR"},
                        {"Type": "Audio", "Codec": "eac3", "Channels": 6}
                    ]
                },
                "TranscodingInfo": {
                    "Framerate": 59.94,
                    "CompletionPercentage": 23.7,
                    "TranscodeReasons": ["ContainerNotSupported"]
                }
            }"#,
        );

        assert_eq!(session.user_name.as_deref(), Some("alice"));
        assert_eq!(session.playback_state.as_deref(), Some("Playing"));
        assert_eq!(session.position_ticks(), 9_000_000_000);
        assert_eq!(session.is_paused(), Some(false));
        assert_eq!(session.play_method(), Some("DirectPlay"));

        let item = session.now_playing_item.as_ref().unwrap();
        assert_eq!(item.item_type.as_deref(), Some("Episode"));
        assert_eq!(item.parent_index_number, Some(1));
        assert_eq!(item.video_stream().unwrap().width, Some(3840));
        assert_eq!(item.audio_stream().unwrap().channels, Some(6));

        let transcoding = session.transcoding_info.as_ref().unwrap();
        assert_eq!(transcoding.framerate, Some(59.94));
        assert_eq!(transcoding.completion_percentage, Some(23.7));
    }

    #[test]
    fn empty_session_decodes_to_defaults() {
        let session = parse_session("{}");
        assert!(session.user_name.is_none());
        assert!(session.now_playing_item.is_none());
        assert_eq!(session.position_ticks(), 0);
        assert_eq!(session.is_paused(), None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let session = parse_session(r#"{"UserName": "bob", "SupportsRemoteControl": true}"#);
        assert_eq!(session.user_name.as_deref(), Some("bob"));
    }

    #[test]
    fn framerate_accepts_string_and_rejects_garbage() {
        let info: TranscodingInfo =
            serde_json::from_str(r#"{"Framerate": "24.0", "CompletionPercentage": null}"#).unwrap();
        assert_eq!(info.framerate, Some(24.0));
        assert_eq!(info.completion_percentage, None);

        let info: TranscodingInfo =
            serde_json::from_str(r#"{"Framerate": "n/a", "CompletionPercentage": [1]}"#).unwrap();
        assert_eq!(info.framerate, None);
        assert_eq!(info.completion_percentage, None);
    }

    #[test]
    fn library_counts_decode_and_stay_sorted() {
        let counts: LibraryCounts = serde_json::from_str(
            r#"{"SeriesCount": 12, "MovieCount": 345, "EpisodeCount": 678, "TrailerCount": 0}"#,
        )
        .unwrap();
        assert_eq!(counts.get("MovieCount"), Some(&345));
        let keys: Vec<&str> = counts.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["EpisodeCount", "MovieCount", "SeriesCount", "TrailerCount"]
        );
    }
}
