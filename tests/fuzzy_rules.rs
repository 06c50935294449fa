//! Shipped fuzzy rule table, case by case.

use offzim::FuzzyRules;

struct Case {
    input: &'static str,
    expected: Option<&'static str>,
}

impl Case {
    fn reduced(input: &'static str, expected: &'static str) -> Self {
        Self {
            input,
            expected: Some(expected),
        }
    }

    fn untouched(input: &'static str) -> Self {
        Self {
            input,
            expected: None,
        }
    }
}

fn check(cases: &[Case]) {
    let rules = FuzzyRules::default();
    for case in cases {
        let reduced = rules.reduce(case.input);
        let expected = case.expected.unwrap_or(case.input);
        assert_eq!(reduced, expected, "input: {}", case.input);
        // First-match semantics: a second application changes nothing.
        assert_eq!(rules.reduce(&reduced), expected, "unstable: {}", case.input);
    }
}

#[test]
fn googlevideo_videoplayback() {
    check(&[
        Case::reduced(
            "foobargooglevideo.com/videoplayback?id=1576&key=value",
            "youtube.fuzzy.replayweb.page/videoplayback?id=1576",
        ),
        Case::reduced(
            "foobargooglevideo.com/videoplayback?some=thing&id=1576",
            "youtube.fuzzy.replayweb.page/videoplayback?id=1576",
        ),
        Case::reduced(
            "foobargooglevideo.com/videoplayback?some=thing&id=1576&key=value",
            "youtube.fuzzy.replayweb.page/videoplayback?id=1576",
        ),
        // videoplayback not followed by '?'
        Case::untouched("foobargooglevideo.com/videoplaybackandfoo?some=thing&id=1576"),
        // no googlevideo.com host
        Case::untouched("foobargoogle_video.com/videoplayback?id=1576"),
    ]);
}

#[test]
fn youtube_get_video_info() {
    check(&[
        Case::reduced(
            "www.youtube.com/get_video_info?video_id=123ah",
            "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah",
        ),
        Case::reduced(
            "www.youtube.com/get_video_info?foo=bar&video_id=123ah",
            "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah",
        ),
        Case::reduced(
            "www.youtube.com/get_video_info?video_id=123ah&foo=bar",
            "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah",
        ),
        Case::reduced(
            "youtube.com/get_video_info?video_id=123ah",
            "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah",
        ),
        Case::reduced(
            "www.youtube-nocookie.com/get_video_info?video_id=123ah",
            "youtube.fuzzy.replayweb.page/get_video_info?video_id=123ah",
        ),
        // no video_id parameter
        Case::untouched("www.youtube-nocookie.com/get_video_info?foo=bar"),
        // not actually a youtube hostname
        Case::untouched("www.youtubeqnocookie.com/get_video_info?video_id=123ah"),
    ]);
}

#[test]
fn youtubei() {
    check(&[
        Case::reduced(
            "www.youtube.com/youtubei/page/?videoId=123ah",
            "youtube.fuzzy.replayweb.page/youtubei/page/?videoId=123ah",
        ),
        Case::reduced(
            "youtube-nocookie.com/youtubei/page/?videoId=123ah",
            "youtube.fuzzy.replayweb.page/youtubei/page/?videoId=123ah",
        ),
        Case::reduced(
            "youtube.com/youtubei/page/?foo=bar&videoId=123ah",
            "youtube.fuzzy.replayweb.page/youtubei/page/?videoId=123ah",
        ),
        Case::reduced(
            "youtube.com/youtubei/page/foo=bar&videoId=123ah",
            "youtube.fuzzy.replayweb.page/youtubei/page/foo=bar&?videoId=123ah",
        ),
    ]);
}

#[test]
fn youtube_embed() {
    check(&[
        Case::reduced(
            "www.youtube-nocookie.com/embed/foo",
            "youtube.fuzzy.replayweb.page/embed/foo",
        ),
        Case::reduced(
            "www.youtube.com/embed/foo/bar",
            "youtube.fuzzy.replayweb.page/embed/foo/bar",
        ),
        Case::reduced(
            "youtube.com/embed/foo?bar=alice",
            "youtube.fuzzy.replayweb.page/embed/foo",
        ),
    ]);
}

#[test]
fn ytimg_thumbnails() {
    check(&[
        Case::reduced(
            "i.ytimg.com/vi/-KpLmsAR23I/maxresdefault.jpg?sqp=-oaymwEmCIAC",
            "i.ytimg.com.fuzzy.replayweb.page/vi/-KpLmsAR23I/thumbnail.jpg",
        ),
        Case::reduced(
            "i.ytimg.com/vi/abc123/hqdefault.webp",
            "i.ytimg.com.fuzzy.replayweb.page/vi/abc123/thumbnail.webp",
        ),
    ]);
}

#[test]
fn vimeo_cdn() {
    check(&[
        Case::reduced(
            "gcs-vimeo.akamaized.net/123.mp4",
            "vimeo-cdn.fuzzy.replayweb.page/123.mp4",
        ),
        Case::reduced(
            "vod.akamaized.net/1/23.mp4",
            "vimeo-cdn.fuzzy.replayweb.page/1/23.mp4",
        ),
        Case::reduced(
            "vod-progressive.akamaized.net/foo/bar/23.mp4",
            "vimeo-cdn.fuzzy.replayweb.page/23.mp4",
        ),
        Case::untouched("foo.akamaized.net/123.mp4"),
        Case::untouched("vod.akamaized.net/23.mp3"),
    ]);
}

#[test]
fn vimeo_range_requests_keep_range() {
    check(&[Case::reduced(
        "vod.akamaized.net/123/456.mp4?base64_init=1&range=100-200",
        "vimeo-cdn.fuzzy.replayweb.page/456.mp4?range=100-200",
    )]);
}

#[test]
fn player_vimeo() {
    check(&[
        Case::reduced(
            "player.vimeo.com/video/123?foo=bar",
            "vimeo.fuzzy.replayweb.page/video/123",
        ),
        Case::reduced(
            "foo.player.vimeo.com/video/123?foo=bar",
            "vimeo.fuzzy.replayweb.page/video/123",
        ),
        Case::untouched("player.vimeo.com/video/1/23?foo=bar"),
        Case::untouched("player.vimeo.com/video/123a?foo=bar"),
        Case::untouched("player.vimeo.com/video/?foo=bar"),
    ]);
}

#[test]
fn cheatography_script_versioning() {
    check(&[Case::reduced(
        "cheatography.com/scripts/useful.min.js?version=123",
        "cheatography.com.fuzzy.replayweb.page/scripts/useful.min.js",
    )]);
}

#[test]
fn trailing_numeric_query_is_trimmed() {
    check(&[
        Case::reduced("www.example.com/page?1234", "www.example.com/page"),
        Case::untouched("www.example.com/page?foo=1234"),
        Case::untouched("www.example.com/page1234"),
        Case::untouched("www.example.com/page?foo=bar&1234"),
        Case::untouched("www.example.com/page?1234=bar"),
    ]);
}
