//! Canonical video identity resolution.
//!
//! Extracts a platform-scoped video id from an arbitrary input URL across
//! YouTube, TikTok, RuTube and VK, each of which has several URL shapes.
//! Resolution is the gate for every downstream operation: it is pure,
//! performs no I/O and never fails — an unrecognized URL simply resolves
//! to `None`.
//!
//! Patterns are tried in a fixed priority order. Ambiguous URLs (e.g. a
//! VK clip vs video path) are settled by that order; do not reorder the
//! table without revisiting the VK entries.

use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered platform pattern table. First match wins.
static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // YouTube
        r"(?:https?://)?(?:www\.)?youtube\.com/watch\?v=([a-zA-Z0-9_-]+)",
        r"(?:https?://)?(?:www\.)?youtu\.be/([a-zA-Z0-9_-]+)",
        r"(?:https?://)?(?:www\.)?youtube\.com/embed/([a-zA-Z0-9_-]+)",
        r"(?:https?://)?(?:www\.)?youtube\.com/v/([a-zA-Z0-9_-]+)",
        r"(?:https?://)?(?:www\.)?youtube\.com/shorts/([a-zA-Z0-9_-]+)",
        // TikTok. The bare short-link pattern must come last within this
        // group: matching is unanchored, so it would otherwise swallow the
        // /t/ and /v/ forms.
        r"(?:https?://)?(?:www\.|vm\.|vt\.)?tiktok\.com/@[^/]+/video/(\d+)",
        r"(?:https?://)?(?:www\.)?tiktok\.com/t/([a-zA-Z0-9]+)/",
        r"(?:https?://)?m\.tiktok\.com/v/(\d+)\.html",
        r"(?:https?://)?(?:vm\.|vt\.)?tiktok\.com/([A-Za-z0-9]+)",
        // RuTube
        r"(?:https?://)?(?:www\.)?rutube\.ru/video/([a-f0-9]+)/?",
        r"(?:https?://)?(?:www\.)?rutube\.ru/shorts/([a-f0-9]+)/?",
        r"(?:https?://)?(?:www\.)?rutube\.ru/video/([a-f0-9]+)\?",
        r"(?:https?://)?(?:www\.)?rutube\.ru/shorts/([a-f0-9]+)\?",
        // VK
        r"(?:https?://)?(?:www\.)?vk\.com/video(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vk\.com/vkvideo\?z=video(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vk\.com/clip(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vk\.com/shvideo\?.*?z=clip(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vk\.com/search/video\?.*?z=video(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vkvideo\.ru/video(-?\d+_\d+)",
        r"(?:https?://)?(?:www\.)?vkvideo\.ru/playlist/[^/]+/video(-?\d+_\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("video id pattern must compile"))
    .collect()
});

/// Extracts the canonical video id from a URL.
///
/// Returns `None` when no supported platform pattern matches.
pub fn extract_video_id(url: &str) -> Option<String> {
    for pattern in VIDEO_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            if let Some(id) = captures.get(1) {
                return Some(id.as_str().to_string());
            }
        }
    }
    None
}

/// Checks whether a URL points at a supported video platform
pub fn is_valid_url(url: &str) -> bool {
    extract_video_id(url).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_shapes() {
        let cases = vec![
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("http://youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/abc123XYZ_-", "abc123XYZ_-"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/v/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/shorts/o-YBDTqX_ZU", "o-YBDTqX_ZU"),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some(expected), "Failed for: {}", url);
        }
    }

    #[test]
    fn test_tiktok_url_shapes() {
        let cases = vec![
            (
                "https://www.tiktok.com/@somebody/video/7106594312292453675",
                "7106594312292453675",
            ),
            ("https://vm.tiktok.com/ZMNkqKUcd", "ZMNkqKUcd"),
            ("https://vt.tiktok.com/ZSJdGk8rq", "ZSJdGk8rq"),
            ("https://www.tiktok.com/t/ZTRav8Q9X/", "ZTRav8Q9X"),
            ("https://m.tiktok.com/v/7106594312292453675.html", "7106594312292453675"),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some(expected), "Failed for: {}", url);
        }
    }

    #[test]
    fn test_rutube_url_shapes() {
        let cases = vec![
            (
                "https://rutube.ru/video/0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c/",
                "0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c",
            ),
            (
                "https://rutube.ru/shorts/0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c/",
                "0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c",
            ),
            (
                "https://rutube.ru/video/0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c?r=plwd",
                "0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c",
            ),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some(expected), "Failed for: {}", url);
        }
    }

    #[test]
    fn test_vk_url_shapes() {
        let cases = vec![
            ("https://vk.com/video-111222333_456789012", "-111222333_456789012"),
            ("https://vk.com/video111222333_456789012", "111222333_456789012"),
            ("https://vk.com/vkvideo?z=video-111222333_456789012", "-111222333_456789012"),
            ("https://vk.com/clip-111222333_456789012", "-111222333_456789012"),
            (
                "https://vk.com/search/video?q=cats&z=video-111222333_456789012",
                "-111222333_456789012",
            ),
            ("https://vkvideo.ru/video-111222333_456789012", "-111222333_456789012"),
            (
                "https://vkvideo.ru/playlist/-22_333/video-111222333_456789012",
                "-111222333_456789012",
            ),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some(expected), "Failed for: {}", url);
        }
    }

    #[test]
    fn test_unsupported_urls_resolve_to_none() {
        let cases = vec![
            "",
            "not a url",
            "https://example.com/watch?v=dQw4w9WgXcQ",
            "https://vimeo.com/148751763",
            "https://vk.com/wall-1_2",
            "https://rutube.ru/channel/123/",
        ];

        for url in cases {
            assert_eq!(extract_video_id(url), None, "Should not resolve: {}", url);
            assert!(!is_valid_url(url));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        // Same URL always yields the same id (the table is fixed-order)
        let url = "https://vk.com/clip-1_2";
        assert_eq!(extract_video_id(url), extract_video_id(url));
    }
}
