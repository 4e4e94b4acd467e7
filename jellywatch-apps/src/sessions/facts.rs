//! Derived, display-ready facts for one active playback session.
//!
//! Everything here is a pure function of the raw session data. Fields that
//! cannot be derived come out as empty strings so templates degrade to
//! something renderable instead of failing.

use crate::backend::wire::{MediaStream, NowPlayingItem, RawSession};

/// Ticks are the backend's time unit: ten million per second.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Coarse classification of the playing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Movie,
    Episode,
    Other,
}

impl MediaType {
    pub fn classify(item: &NowPlayingItem) -> MediaType {
        match item.item_type.as_deref() {
            Some("Audio") => MediaType::Audio,
            Some("Movie") => MediaType::Movie,
            Some("Episode") => MediaType::Episode,
            _ => MediaType::Other,
        }
    }

    /// Emoji used by the `{icons}` template key.
    pub fn icon(&self) -> &'static str {
        match self {
            MediaType::Audio => "\u{1F3B5}",
            MediaType::Movie => "\u{1F3AC}",
            MediaType::Episode | MediaType::Other => "\u{1F4FA}",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "Audio",
            MediaType::Movie => "Movie",
            MediaType::Episode => "Episode",
            MediaType::Other => "Other",
        }
    }
}

/// One session that passed the activity filter, with every derived fact the
/// template engine can substitute. Exists only for the duration of a single
/// aggregation pass.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub user: String,
    pub media_type: MediaType,
    pub title: String,
    pub device: String,
    pub client: String,
    pub artist: String,
    pub series: String,
    /// Zero-padded season number, empty for non-episodes.
    pub season: String,
    pub episode: String,
    pub rating: String,
    pub quality: String,
    pub audio: String,
    /// Playback position as `HH:MM:SS`.
    pub position: String,
    pub runtime: String,
    /// Whole-number progress through the item, 0 when unknowable.
    pub percentage: u64,
    pub play_method: String,
    pub transcode_fps: String,
    pub transcode_percentage: String,
    pub transcode_reasons: String,
}

impl ActiveSession {
    /// Derives the full fact set from a raw session. Returns `None` when the
    /// session has no playing item, since every fact hangs off it.
    pub fn from_raw(session: &RawSession) -> Option<ActiveSession> {
        let item = session.now_playing_item.as_ref()?;

        let media_type = MediaType::classify(item);
        let is_episode = media_type == MediaType::Episode;

        let position_ticks = session.position_ticks();
        let runtime_ticks = item.run_time_ticks.unwrap_or(0);

        let play_method = session.play_method().unwrap_or_default().to_string();
        let (transcode_fps, transcode_percentage, transcode_reasons) =
            transcode_facts(session, &play_method);

        Some(ActiveSession {
            user: session
                .user_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            media_type,
            title: item.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            device: session.device_name.clone().unwrap_or_default(),
            client: session.client.clone().unwrap_or_default(),
            artist: artist_name(item),
            series: if is_episode {
                item.series_name
                    .clone()
                    .unwrap_or_else(|| "Unknown Series".to_string())
            } else {
                String::new()
            },
            season: if is_episode {
                padded_number(item.parent_index_number)
            } else {
                String::new()
            },
            episode: if is_episode {
                padded_number(item.index_number)
            } else {
                String::new()
            },
            rating: item
                .official_rating
                .as_deref()
                .map(normalize_rating)
                .unwrap_or_default(),
            quality: item.video_stream().map(quality_label).unwrap_or_default(),
            audio: item.audio_stream().map(audio_summary).unwrap_or_default(),
            position: format_ticks(position_ticks),
            runtime: format_ticks(runtime_ticks),
            percentage: progress_percentage(position_ticks, runtime_ticks),
            play_method,
            transcode_fps,
            transcode_percentage,
            transcode_reasons,
        })
    }
}

/// First named artist, else the album artist, else "Unknown".
fn artist_name(item: &NowPlayingItem) -> String {
    item.artists
        .iter()
        .find(|artist| !artist.is_empty())
        .cloned()
        .or_else(|| item.album_artist.clone().filter(|a| !a.is_empty()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn padded_number(value: Option<u32>) -> String {
    value.map(|n| format!("{n:02}")).unwrap_or_default()
}

/// Transcoder facts apply only to sessions whose play method is "Transcode";
/// everything else renders them empty.
fn transcode_facts(session: &RawSession, play_method: &str) -> (String, String, String) {
    if play_method != "Transcode" {
        return (String::new(), String::new(), String::new());
    }
    let info = session.transcoding_info.as_ref();
    let fps = info
        .and_then(|i| i.framerate)
        .map(|rate| rate as i64)
        .unwrap_or(0);
    let completion = info
        .and_then(|i| i.completion_percentage)
        .map(|pct| pct as i64)
        .unwrap_or(100);
    let reasons = info
        .map(|i| i.transcode_reasons.join(", "))
        .unwrap_or_default();
    (fps.to_string(), completion.to_string(), reasons)
}

/// `HH:MM:SS` from a tick count.
pub fn format_ticks(ticks: u64) -> String {
    let total_seconds = ticks / TICKS_PER_SECOND;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Whole-number progress, floored. Zero when position or runtime is zero.
pub fn progress_percentage(position_ticks: u64, runtime_ticks: u64) -> u64 {
    if position_ticks == 0 || runtime_ticks == 0 {
        return 0;
    }
    position_ticks.saturating_mul(100) / runtime_ticks
}

/// Compacts an official rating: first `/`- or `;`-separated segment, text
/// after the last colon, with the literal word "Rated" removed. Turns
/// `US:Rated PG-13` into `PG-13`.
pub fn normalize_rating(raw: &str) -> String {
    let first_segment = raw.split(['/', ';']).next().unwrap_or(raw);
    let after_colon = match first_segment.rfind(':') {
        Some(idx) => &first_segment[idx + 1..],
        None => first_segment,
    };
    after_colon.replace("Rated", "").trim().to_string()
}

/// Codec (uppercased) plus a channel label; empty when the stream has no
/// codec.
pub fn audio_summary(stream: &MediaStream) -> String {
    let Some(codec) = stream.codec.as_deref().filter(|c| !c.is_empty()) else {
        return String::new();
    };
    match stream.channels {
        Some(channels) if channels > 0 => {
            format!("{} {}", codec.to_uppercase(), channel_label(channels))
        }
        _ => codec.to_uppercase(),
    }
}

fn channel_label(channels: u32) -> String {
    match channels {
        1 => "Mono".to_string(),
        2 => "Stereo".to_string(),
        6 => "5.1".to_string(),
        8 => "7.1".to_string(),
        n => format!("{n}ch"),
    }
}

/// Resolution bucket from the video stream width, tagged with the video
/// range unless it is plain SDR.
pub fn quality_label(stream: &MediaStream) -> String {
    let width = stream.width.unwrap_or(0);
    let base = if width >= 3840 {
        "4K".to_string()
    } else if width >= 1920 {
        "1080p".to_string()
    } else if width >= 1280 {
        "720p".to_string()
    } else if width >= 720 {
        "480p".to_string()
    } else if width > 0 {
        format!("{width}p")
    } else {
        String::new()
    };
    match stream.video_range.as_deref() {
        Some(range) if !base.is_empty() && !range.is_empty() && range != "SDR" => {
            format!("{base} {range}")
        }
        _ => base,
    }
}
