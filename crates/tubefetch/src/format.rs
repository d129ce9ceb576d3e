//! Catalog data model: formats, format lists and the video snapshot.
//!
//! Records are deserialized once from catalog JSON and never mutated. Every
//! filtering operation on [`FormatList`] returns a new list, leaving the
//! catalog it was called on untouched.

use std::cmp::Reverse;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize};

/// MIME type without parameters, lowercased.
///
/// `Video/MP4; codecs="avc1.4d401e"` becomes `video/mp4`.
pub fn media_type_of(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// One encoding/container/bitrate variant of a video's streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Format {
    pub itag: u32,
    /// Direct media URL, empty when the source resolves streams itself.
    pub url: String,
    /// Full MIME type, e.g. `video/mp4; codecs="avc1.640028"`.
    pub mime_type: String,
    /// Coarse quality name, e.g. `hd1080`, `medium`, `tiny`.
    pub quality: String,
    /// Display label, e.g. `1080p60`. Empty for audio.
    pub quality_label: String,
    pub bitrate: u64,
    pub average_bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_channels: u32,
    #[serde(deserialize_with = "number_or_string")]
    pub audio_sample_rate: u32,
    /// Declared size in bytes; 0 when unknown.
    #[serde(deserialize_with = "number_or_string")]
    pub content_length: u64,
}

impl Format {
    /// MIME type without parameters, lowercased (`video/mp4`).
    pub fn media_type(&self) -> String {
        media_type_of(&self.mime_type)
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video")
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio")
    }

    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0
    }

    fn video_codec_rank(&self) -> u8 {
        if self.mime_type.contains("av01") {
            1
        } else if self.mime_type.contains("vp9") {
            2
        } else if self.mime_type.contains("avc1") {
            3
        } else {
            4
        }
    }

    fn audio_codec_rank(&self) -> u8 {
        if self.mime_type.contains("mp4") {
            1
        } else if self.mime_type.contains("opus") {
            2
        } else {
            3
        }
    }

    /// Ranking key used by [`FormatList::sorted`]; smaller is better.
    ///
    /// Computed from this format alone so that comparing keys is a total order.
    /// Video formats rank before audio-only ones, then larger frames, higher
    /// frame rates, preferred codecs, more channels, higher bitrates and higher
    /// sample rates. The itag breaks remaining ties.
    fn rank_key(&self) -> RankKey {
        let codec_rank = if self.is_audio() {
            self.audio_codec_rank()
        } else {
            self.video_codec_rank()
        };
        (
            self.is_audio(),
            Reverse(self.width),
            Reverse(self.fps),
            codec_rank,
            Reverse(self.audio_channels),
            Reverse(self.bitrate),
            Reverse(self.audio_sample_rate),
            self.itag,
        )
    }
}

type RankKey = (
    bool,
    Reverse<u32>,
    Reverse<u32>,
    u8,
    Reverse<u32>,
    Reverse<u64>,
    Reverse<u32>,
    u32,
);

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.quality_label.is_empty() {
            &self.quality
        } else {
            &self.quality_label
        };
        write!(
            f,
            "itag {} - {} - {} ({} kbps, {} ch)",
            self.itag,
            self.media_type(),
            label,
            self.bitrate / 1000,
            self.audio_channels
        )
    }
}

/// Ordered collection of formats with non-mutating filter/sort operations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatList(Vec<Format>);

impl FormatList {
    pub fn new(formats: Vec<Format>) -> Self {
        Self(formats)
    }

    fn filtered(&self, predicate: impl Fn(&Format) -> bool) -> Self {
        Self(self.0.iter().filter(|f| predicate(f)).cloned().collect())
    }

    /// Formats whose MIME type contains `fragment` (`"video"`, `"mp4"`, `"audio/webm"`).
    pub fn of_type(&self, fragment: &str) -> Self {
        self.filtered(|f| f.mime_type.contains(fragment))
    }

    pub fn with_audio_channels(&self, channels: u32) -> Self {
        self.filtered(|f| f.audio_channels == channels)
    }

    /// Formats whose quality name or quality label equals `quality`.
    pub fn with_quality(&self, quality: &str) -> Self {
        self.filtered(|f| f.quality == quality || f.quality_label == quality)
    }

    pub fn find_by_itag(&self, itag: u32) -> Option<&Format> {
        self.0.iter().find(|f| f.itag == itag)
    }

    /// A sorted copy, best format first.
    pub fn sorted(&self) -> Self {
        let mut formats = self.0.clone();
        formats.sort_by_key(Format::rank_key);
        Self(formats)
    }

    pub fn best(&self) -> Option<Format> {
        self.0.iter().min_by_key(|f| f.rank_key()).cloned()
    }

    pub fn into_inner(self) -> Vec<Format> {
        self.0
    }
}

impl Deref for FormatList {
    type Target = [Format];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Format>> for FormatList {
    fn from(formats: Vec<Format>) -> Self {
        Self(formats)
    }
}

impl FromIterator<Format> for FormatList {
    fn from_iter<I: IntoIterator<Item = Format>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FormatList {
    type Item = &'a Format;
    type IntoIter = std::slice::Iter<'a, Format>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Immutable snapshot of a video and its available formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration_secs: u64,
    pub formats: FormatList,
}

/// The catalog emits some numeric fields as JSON strings (`"44100"`).
fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + Default + serde::de::DeserializeOwned,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Number(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) if text.is_empty() => Ok(T::default()),
        Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}
