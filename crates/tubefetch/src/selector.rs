//! Format selection for plain and composite downloads.
//!
//! Candidate sets are narrowed with [`FormatList`] filters and ranked with its
//! total sort order, so identical inputs always yield identical choices.

use tracing::debug;

use crate::error::{DownloadError, FormatSubject};
use crate::format::{Format, FormatList};

/// Pick the video-only and audio formats for a composite download.
///
/// The video candidate must carry no audio channels so the merged file ends up
/// with exactly one audio track. When both candidate sets are empty the video
/// error is the one reported.
pub fn select_video_audio(
    catalog: &FormatList,
    quality: &str,
    mime_type: &str,
) -> Result<(Format, Format), DownloadError> {
    let narrowed = if mime_type.is_empty() {
        catalog.clone()
    } else {
        catalog.of_type(mime_type)
    };

    let mut video_candidates = narrowed.of_type("video").with_audio_channels(0);
    let audio_candidates = narrowed.of_type("audio");

    if !quality.is_empty() {
        video_candidates = video_candidates.with_quality(quality);
    }

    debug!(
        quality,
        mime_type,
        video_candidates = video_candidates.len(),
        audio_candidates = audio_candidates.len(),
        "Selecting composite formats"
    );

    let video = video_candidates
        .best()
        .ok_or(DownloadError::not_found(FormatSubject::Video))?;
    let audio = audio_candidates
        .best()
        .ok_or(DownloadError::not_found(FormatSubject::Audio))?;

    debug!(video = %video, audio = %audio, "Selected composite formats");
    Ok((video, audio))
}

/// Exact lookup by itag.
pub fn select_by_itag(catalog: &FormatList, itag: u32) -> Result<Format, DownloadError> {
    catalog
        .find_by_itag(itag)
        .cloned()
        .ok_or(DownloadError::not_found(FormatSubject::Itag(itag)))
}

/// Pick the format for a plain single-stream download.
///
/// A numeric `quality` is treated as an itag, any other non-empty value must
/// match a quality name or label, and an empty one takes the best format.
pub fn select_single(
    catalog: &FormatList,
    quality: &str,
    mime_type: &str,
) -> Result<Format, DownloadError> {
    let narrowed = if mime_type.is_empty() {
        catalog.clone()
    } else {
        catalog.of_type(mime_type)
    };

    if narrowed.is_empty() {
        return Err(DownloadError::not_found(FormatSubject::Format));
    }

    if let Ok(itag) = quality.parse::<u32>() {
        return select_by_itag(&narrowed, itag);
    }

    let candidates = if quality.is_empty() {
        narrowed
    } else {
        narrowed.with_quality(quality)
    };

    candidates
        .best()
        .ok_or(DownloadError::not_found(FormatSubject::Format))
}

/// Whether a quality request can only be served by merging split streams.
///
/// `hd720`, `hd1080` and above are published as video-only streams.
pub fn needs_composite(quality: &str) -> bool {
    quality.starts_with("hd")
}

/// Re-check a composite pair chosen outside [`select_video_audio`].
pub fn verify_composite_pair(video: &Format, audio: &Format) -> Result<(), DownloadError> {
    if !video.is_video() {
        return Err(DownloadError::SelectionPrecheck {
            reason: format!(
                "itag {} is not a video format ({})",
                video.itag, video.mime_type
            ),
        });
    }
    if video.has_audio() {
        return Err(DownloadError::SelectionPrecheck {
            reason: format!(
                "itag {} already carries {} audio channel(s)",
                video.itag, video.audio_channels
            ),
        });
    }
    if !audio.is_audio() {
        return Err(DownloadError::SelectionPrecheck {
            reason: format!(
                "itag {} is not an audio format ({})",
                audio.itag, audio.mime_type
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{audio_format, video_format};
    use proptest::prelude::*;

    fn catalog() -> FormatList {
        let muxed = Format {
            audio_channels: 2,
            ..video_format(22, "video/mp4; codecs=\"avc1\"", "hd720", 1280, 9_000_000)
        };
        FormatList::new(vec![
            muxed,
            video_format(137, "video/mp4; codecs=\"avc1\"", "hd1080", 1920, 4_000_000),
            video_format(136, "video/mp4; codecs=\"avc1\"", "hd720", 1280, 2_000_000),
            video_format(248, "video/webm; codecs=\"vp9\"", "hd1080", 1920, 3_000_000),
            audio_format(140, "audio/mp4; codecs=\"mp4a\"", 128_000),
            audio_format(251, "audio/webm; codecs=\"opus\"", 160_000),
        ])
    }

    /// One 1080p video-only format followed by three audio formats, one of
    /// which does not declare its channel count.
    fn mixed_channel_formats() -> Vec<Format> {
        let vorbis = Format {
            audio_channels: 0,
            ..audio_format(171, "audio/webm; codecs=\"vorbis\"", 150_000)
        };
        vec![
            video_format(137, "video/mp4; codecs=\"avc1\"", "hd1080", 1920, 4_000_000),
            audio_format(140, "audio/mp4; codecs=\"mp4a\"", 100_000),
            audio_format(251, "audio/webm; codecs=\"opus\"", 200_000),
            vorbis,
        ]
    }

    #[test]
    fn test_select_video_audio_best_pair() {
        let (video, audio) = select_video_audio(&catalog(), "", "").unwrap();
        assert_eq!(video.itag, 248);
        assert_eq!(video.audio_channels, 0);
        assert_eq!(audio.itag, 140);
    }

    #[test]
    fn test_select_video_audio_never_picks_muxed_video() {
        let (video, _) = select_video_audio(&catalog(), "hd720", "").unwrap();
        assert_eq!(video.itag, 136);
    }

    #[test]
    fn test_select_video_audio_with_mime_type() {
        let (video, audio) = select_video_audio(&catalog(), "", "mp4").unwrap();
        assert_eq!(video.itag, 137);
        assert_eq!(audio.itag, 140);

        let (video, audio) = select_video_audio(&catalog(), "", "webm").unwrap();
        assert_eq!(video.itag, 248);
        assert_eq!(audio.itag, 251);
    }

    #[test]
    fn test_select_video_audio_results_come_from_catalog() {
        let catalog = catalog();
        let (video, audio) = select_video_audio(&catalog, "hd1080", "").unwrap();
        assert!(catalog.contains(&video));
        assert!(catalog.contains(&audio));
    }

    #[test]
    fn test_quality_excluding_all_video_reports_video() {
        let err = select_video_audio(&catalog(), "hd2160", "").unwrap_err();
        assert!(matches!(
            err,
            DownloadError::NotFound {
                subject: FormatSubject::Video
            }
        ));
    }

    #[test]
    fn test_video_error_precedes_audio_error() {
        let empty = FormatList::default();
        let err = select_video_audio(&empty, "", "").unwrap_err();
        assert!(matches!(
            err,
            DownloadError::NotFound {
                subject: FormatSubject::Video
            }
        ));
    }

    #[test]
    fn test_missing_audio_reported() {
        let only_video = catalog().of_type("video");
        let err = select_video_audio(&only_video, "", "").unwrap_err();
        assert!(matches!(
            err,
            DownloadError::NotFound {
                subject: FormatSubject::Audio
            }
        ));
    }

    #[test]
    fn test_select_video_audio_is_deterministic() {
        let catalog = catalog();
        let first = select_video_audio(&catalog, "", "").unwrap();
        for _ in 0..10 {
            assert_eq!(select_video_audio(&catalog, "", "").unwrap(), first);
        }

        let mut reversed = catalog.clone().into_inner();
        reversed.reverse();
        assert_eq!(
            select_video_audio(&FormatList::from(reversed), "", "").unwrap(),
            first
        );
    }

    #[test]
    fn test_audio_pick_independent_of_catalog_order() {
        const ORDERS: [[usize; 3]; 6] = [
            [1, 2, 3],
            [1, 3, 2],
            [2, 1, 3],
            [2, 3, 1],
            [3, 1, 2],
            [3, 2, 1],
        ];
        let formats = mixed_channel_formats();

        for order in ORDERS {
            let mut shuffled = vec![formats[0].clone()];
            shuffled.extend(order.iter().map(|&i| formats[i].clone()));
            let catalog = FormatList::from(shuffled);

            let (video, audio) = select_video_audio(&catalog, "", "").unwrap();
            assert_eq!(video.itag, 137, "order {order:?}");
            assert_eq!(audio.itag, 140, "order {order:?}");

            let ranked: Vec<u32> = catalog.sorted().iter().map(|f| f.itag).collect();
            assert_eq!(ranked, vec![137, 140, 251, 171], "order {order:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_ranking_independent_of_catalog_order(
            formats in Just(mixed_channel_formats()).prop_shuffle(),
        ) {
            let expected = FormatList::from(mixed_channel_formats());
            let shuffled = FormatList::from(formats);

            prop_assert_eq!(shuffled.sorted(), expected.sorted());
            prop_assert_eq!(
                select_video_audio(&shuffled, "", "").unwrap(),
                select_video_audio(&expected, "", "").unwrap()
            );
        }
    }

    #[test]
    fn test_select_by_itag() {
        let catalog = FormatList::new(vec![
            video_format(18, "video/mp4", "medium", 640, 500_000),
            video_format(22, "video/mp4", "hd720", 1280, 1_000_000),
            audio_format(140, "audio/mp4", 128_000),
        ]);

        assert_eq!(select_by_itag(&catalog, 22).unwrap().itag, 22);

        let err = select_by_itag(&catalog, 99).unwrap_err();
        assert!(matches!(
            err,
            DownloadError::NotFound {
                subject: FormatSubject::Itag(99)
            }
        ));
    }

    #[test]
    fn test_select_single() {
        let catalog = catalog();
        assert_eq!(select_single(&catalog, "", "").unwrap().itag, 248);
        assert_eq!(select_single(&catalog, "140", "").unwrap().itag, 140);
        assert_eq!(select_single(&catalog, "hd720", "").unwrap().itag, 22);
        assert_eq!(select_single(&catalog, "", "audio").unwrap().itag, 140);
        assert!(matches!(
            select_single(&catalog, "", "video/x-flv").unwrap_err(),
            DownloadError::NotFound {
                subject: FormatSubject::Format
            }
        ));
    }

    #[test]
    fn test_needs_composite() {
        assert!(needs_composite("hd1080"));
        assert!(needs_composite("hd720"));
        assert!(!needs_composite("medium"));
        assert!(!needs_composite(""));
    }

    #[test]
    fn test_verify_composite_pair() {
        let video = video_format(137, "video/mp4", "hd1080", 1920, 4_000_000);
        let audio = audio_format(140, "audio/mp4", 128_000);
        assert!(verify_composite_pair(&video, &audio).is_ok());

        let muxed = Format {
            audio_channels: 2,
            ..video.clone()
        };
        assert!(matches!(
            verify_composite_pair(&muxed, &audio),
            Err(DownloadError::SelectionPrecheck { .. })
        ));
        assert!(matches!(
            verify_composite_pair(&audio, &video),
            Err(DownloadError::SelectionPrecheck { .. })
        ));
    }
}
