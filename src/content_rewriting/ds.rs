//! Domain-specific rewrite rules.
//!
//! Some origins ship player code or player configuration that breaks under
//! replay unless nudged: DASH/HLS manifests cannot be served from a static
//! bundle, so the rules below steer players toward the progressive variants
//! that were captured. The table is keyed by URL substring; the first entry
//! that matches the record URL supplies the extra rules, which run after the
//! generic JS/JSON pass.
//!
//! Besides plain text substitutions, three rules reshape embedded JSON:
//! Twitter video descriptors are reduced to their best progressive mp4
//! variant, Vimeo player configs demote the `dash`/`hls` file entries when a
//! progressive list exists, and Vimeo dash manifests keep only the best
//! video/audio rendition. A payload that fails to parse as JSON is left
//! untouched.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::rx_replacer::{
    add_prefix, add_suffix, replace_all_with, wrap_with, RewriteAction, TransformationRule,
};

/// Renditions above this bitrate are never selected for replay.
const MAX_BITRATE: u64 = 5_000_000;

static WIDTH_X_HEIGHT_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d]+)x([\d]+)").expect("WIDTH_X_HEIGHT_RX: hardcoded regex is valid")
});

#[derive(Clone, Copy)]
enum Action {
    Prefix(&'static str),
    Suffix(&'static str),
    Replace(&'static str),
    Wrap(&'static str, &'static str),
    /// Reduce a Twitter video descriptor (everything after the given JSON
    /// key prefix) to its best variant.
    TwitterVideo(&'static str),
    VimeoConfig,
    VimeoDashManifest,
}

struct DsRule {
    pattern: &'static str,
    action: Action,
}

struct RuleSet {
    contains: &'static [&'static str],
    rules: &'static [DsRule],
}

static RULE_SETS: &[RuleSet] = &[
    RuleSet {
        contains: &["youtube.com", "youtube-nocookie.com"],
        rules: &[
            DsRule {
                pattern: r"ytplayer\.load\(\);",
                action: Action::Prefix(
                    r#"ytplayer.config.args.dash = "0"; ytplayer.config.args.dashmpd = ""; "#,
                ),
            },
            DsRule {
                pattern: r#"yt\.setConfig.*PLAYER_CONFIG.*args":\s*\{"#,
                action: Action::Suffix(r#" "dash": "0", dashmpd: "", "#),
            },
            DsRule {
                pattern: r#"(?:"player":|ytplayer\.config).*"args":\s*\{"#,
                action: Action::Suffix(r#""dash":"0","dashmpd":"","#),
            },
            DsRule {
                pattern: r"yt\.setConfig.*PLAYER_VARS.*?\{",
                action: Action::Suffix(r#""dash":"0","dashmpd":"","#),
            },
            DsRule {
                pattern: r"ytplayer\.config=\{args:\s*\{",
                action: Action::Suffix(r#""dash":"0","dashmpd":"","#),
            },
            DsRule {
                pattern: r#""0"\s*?==\s*?\w+\.dash&&"#,
                action: Action::Replace("1&&"),
            },
        ],
    },
    RuleSet {
        contains: &["player.vimeo.com/video/"],
        rules: &[DsRule {
            pattern: r"^\{.+\}$",
            action: Action::VimeoConfig,
        }],
    },
    RuleSet {
        contains: &["master.json?query_string_ranges=0", "master.json?base64"],
        rules: &[DsRule {
            pattern: r"^\{.+\}$",
            action: Action::VimeoDashManifest,
        }],
    },
    RuleSet {
        contains: &["facebook.com/"],
        rules: &[
            DsRule {
                pattern: r#""dash_"#,
                action: Action::Replace(r#""__nodash__"#),
            },
            DsRule {
                pattern: r#"_dash""#,
                action: Action::Replace(r#"__nodash__""#),
            },
            DsRule {
                pattern: r"_dash_",
                action: Action::Replace("__nodash__"),
            },
            DsRule {
                pattern: r#""debugNoBatching\s?":(?:false|0)"#,
                action: Action::Replace(r#""debugNoBatching":true"#),
            },
        ],
    },
    RuleSet {
        contains: &["instagram.com/"],
        rules: &[
            DsRule {
                pattern: r#""is_dash_eligible":(?:true|1)"#,
                action: Action::Replace(r#""is_dash_eligible":false"#),
            },
            DsRule {
                pattern: r#""debugNoBatching\s?":(?:false|0)"#,
                action: Action::Replace(r#""debugNoBatching":true"#),
            },
        ],
    },
    RuleSet {
        contains: &[
            "api.twitter.com/2/",
            "twitter.com/i/api/2/",
            "twitter.com/i/api/graphql/",
        ],
        rules: &[DsRule {
            pattern: r#""video_info":.*?\}\]\}"#,
            action: Action::TwitterVideo(r#""video_info":"#),
        }],
    },
    RuleSet {
        contains: &["cdn.syndication.twimg.com/tweet-result"],
        rules: &[DsRule {
            pattern: r#""video":.*?viewCount":\d+\}"#,
            action: Action::TwitterVideo(r#""video":"#),
        }],
    },
    RuleSet {
        contains: &["/vqlweb.js"],
        rules: &[DsRule {
            pattern: r"(?i:b\w+\.updatePortSize\(\);this\.updateApplicationSize\(\))",
            action: Action::Wrap("/*", "*/"),
        }],
    },
];

/// Extra transformation rules for a record URL; empty for most origins.
pub fn rules_for_url(url: &str) -> Vec<TransformationRule<'static>> {
    for set in RULE_SETS {
        if set.contains.iter().any(|needle| url.contains(needle)) {
            return set
                .rules
                .iter()
                .map(|rule| {
                    let action: RewriteAction<'static> = match rule.action {
                        Action::Prefix(prefix) => add_prefix(prefix),
                        Action::Suffix(suffix) => add_suffix(suffix),
                        Action::Replace(text) => replace_all_with(text),
                        Action::Wrap(prefix, suffix) => wrap_with(prefix, suffix),
                        Action::TwitterVideo(prefix) => {
                            Box::new(move |matched, _| rewrite_twitter_video(prefix, matched))
                        }
                        Action::VimeoConfig => Box::new(|matched, _| rewrite_vimeo_config(matched)),
                        Action::VimeoDashManifest => {
                            Box::new(|matched, _| rewrite_vimeo_dash_manifest(matched))
                        }
                    };
                    TransformationRule::new(rule.pattern, action)
                })
                .collect();
        }
    }
    Vec::new()
}

/// Keep only the best progressive mp4 variant of a Twitter video
/// descriptor. `matched` is the JSON key prefix followed by the descriptor
/// object; the original text is returned whenever the shape is unexpected.
fn rewrite_twitter_video(prefix: &str, matched: &str) -> String {
    let Some(body) = matched.strip_prefix(prefix) else {
        return matched.to_string();
    };
    let Ok(mut data) = serde_json::from_str::<Value>(body) else {
        return matched.to_string();
    };
    let Some(variants) = data.get("variants").and_then(Value::as_array).cloned() else {
        return matched.to_string();
    };

    let mut best: Option<Value> = None;
    let mut best_bitrate = 0u64;
    for variant in &variants {
        let content_type = variant.get("content_type").and_then(Value::as_str);
        let plain_type = variant.get("type").and_then(Value::as_str);
        if content_type.is_some_and(|ct| ct != "video/mp4")
            || plain_type.is_some_and(|ty| ty != "video/mp4")
        {
            continue;
        }

        let bitrate = variant.get("bitrate").and_then(Value::as_u64);
        if let Some(bitrate) = bitrate.filter(|b| *b > best_bitrate && *b <= MAX_BITRATE) {
            best_bitrate = bitrate;
            best = Some(variant.clone());
        } else if let Some(src) = variant.get("src").and_then(Value::as_str) {
            // No usable bitrate field: rank by the WxH embedded in the URL.
            if let Some(caps) = WIDTH_X_HEIGHT_RX.captures(src) {
                let width: u64 = caps[1].parse().unwrap_or(0);
                let height: u64 = caps[2].parse().unwrap_or(0);
                let pixel_rate = width * height;
                if pixel_rate > best_bitrate {
                    best_bitrate = pixel_rate;
                    best = Some(variant.clone());
                }
            }
        }
    }

    if let (Some(best), Some(object)) = (best, data.as_object_mut()) {
        object.insert("variants".to_string(), Value::Array(vec![best]));
    }
    format!("{prefix}{data}")
}

/// Demote the `dash`/`hls` entries of a Vimeo player config when a
/// progressive file list exists, so the player falls back to plain mp4.
/// Configs without progressive files keep streaming but lose range-request
/// query strings, which the bundle cannot answer.
fn rewrite_vimeo_config(matched: &str) -> String {
    let Ok(mut config) = serde_json::from_str::<Value>(matched) else {
        return matched.to_string();
    };
    let files = config
        .get_mut("request")
        .and_then(|request| request.get_mut("files"))
        .and_then(Value::as_object_mut);
    if let Some(files) = files {
        let has_progressive = files
            .get("progressive")
            .and_then(Value::as_array)
            .is_some_and(|progressive| !progressive.is_empty());
        if has_progressive {
            if let Some(dash) = files.remove("dash") {
                files.insert("__dash".to_string(), dash);
            }
            if let Some(hls) = files.remove("hls") {
                files.insert("__hls".to_string(), hls);
            }
            return config.to_string();
        }
    }
    matched.replace("query_string_ranges=1", "query_string_ranges=0")
}

/// Keep only the best renditions of a Vimeo dash manifest: one video/mp4
/// and one audio/mp4 entry, highest bitrate within the cap.
fn rewrite_vimeo_dash_manifest(matched: &str) -> String {
    let Ok(mut manifest) = serde_json::from_str::<Value>(matched) else {
        return matched.to_string();
    };
    for (key, mime) in [("video", "video/mp4"), ("audio", "audio/mp4")] {
        let Some(variants) = manifest.get(key).and_then(Value::as_array) else {
            continue;
        };
        let mut best: Option<Value> = None;
        let mut best_bitrate = 0u64;
        for variant in variants {
            if variant.get("mime_type").and_then(Value::as_str) != Some(mime) {
                continue;
            }
            let Some(bitrate) = variant.get("bitrate").and_then(Value::as_u64) else {
                continue;
            };
            if bitrate > best_bitrate && bitrate <= MAX_BITRATE {
                best_bitrate = bitrate;
                best = Some(variant.clone());
            }
        }
        if let (Some(best), Some(object)) = (best, manifest.as_object_mut()) {
            object.insert(key.to_string(), Value::Array(vec![best]));
        }
    }
    manifest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_rewriting::rx_replacer::{RewriteOpts, RxRewriter};

    #[test]
    fn first_matching_set_wins() {
        assert!(!rules_for_url("https://www.youtube.com/watch?v=x").is_empty());
        assert!(!rules_for_url("https://api.twitter.com/2/timeline/home.json").is_empty());
        assert!(!rules_for_url("https://cdn.syndication.twimg.com/tweet-result?id=1").is_empty());
        assert!(!rules_for_url("https://skyfire.vimeocdn.com/x/master.json?base64_init=1&query_string_ranges=0").is_empty());
        assert!(rules_for_url("https://example.com/page").is_empty());
    }

    #[test]
    fn youtube_dash_is_disabled() {
        let rules = rules_for_url("https://www.youtube.com/player.js");
        let rewriter = RxRewriter::new(rules).unwrap();
        let out = rewriter.rewrite("ytplayer.load();", &RewriteOpts::default());
        assert_eq!(
            out,
            r#"ytplayer.config.args.dash = "0"; ytplayer.config.args.dashmpd = ""; ytplayer.load();"#
        );
    }

    #[test]
    fn instagram_dash_eligibility_is_cleared() {
        let rules = rules_for_url("https://www.instagram.com/graphql/query");
        let rewriter = RxRewriter::new(rules).unwrap();
        let out = rewriter.rewrite(
            r#"{"is_dash_eligible":true,"video_dash_manifest":null}"#,
            &RewriteOpts::default(),
        );
        assert!(out.contains(r#""is_dash_eligible":false"#));
    }

    #[test]
    fn twitter_video_keeps_best_mp4_variant() {
        let rules = rules_for_url("https://api.twitter.com/2/timeline/conversation/1.json");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = concat!(
            r#"{"id":1,"video_info":{"variants":["#,
            r#"{"content_type":"video/mp4","bitrate":320000,"url":"low"},"#,
            r#"{"content_type":"video/mp4","bitrate":2176000,"url":"high"},"#,
            r#"{"content_type":"application/x-mpegURL","url":"hls"}]},"text":"t"}"#,
        );
        let out = rewriter.rewrite(payload, &RewriteOpts::default());
        assert!(out.contains(r#""url":"high""#), "{out}");
        assert!(!out.contains("low"), "{out}");
        assert!(!out.contains("hls"), "{out}");
        // Text outside the matched descriptor is untouched.
        assert!(out.starts_with(r#"{"id":1,"video_info":"#), "{out}");
        assert!(out.ends_with(r#","text":"t"}"#), "{out}");
    }

    #[test]
    fn twitter_video_over_cap_falls_back_to_dimensions() {
        let rules = rules_for_url("https://cdn.syndication.twimg.com/tweet-result?id=9");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = concat!(
            r#"{"video":{"variants":["#,
            r#"{"type":"video/mp4","src":"https://v.twimg.com/640x360/a.mp4"},"#,
            r#"{"type":"video/mp4","src":"https://v.twimg.com/1280x720/b.mp4"}],"#,
            r#""viewCount":5}"#,
        );
        let out = rewriter.rewrite(payload, &RewriteOpts::default());
        assert!(out.contains("1280x720"), "{out}");
        assert!(!out.contains("640x360"), "{out}");
    }

    #[test]
    fn twitter_rules_leave_broken_json_alone() {
        let rules = rules_for_url("https://api.twitter.com/2/timeline/home.json");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = r#"{"video_info":{"variants":[{"oops"}]}"#;
        assert_eq!(rewriter.rewrite(payload, &RewriteOpts::default()), payload);
    }

    #[test]
    fn vimeo_config_demotes_dash_and_hls() {
        let rules = rules_for_url("https://player.vimeo.com/video/123/config");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = concat!(
            r#"{"request":{"files":{"progressive":[{"url":"v.mp4"}],"#,
            r#""dash":{"cdn":"a"},"hls":{"cdn":"b"}}}}"#,
        );
        let out = rewriter.rewrite(payload, &RewriteOpts::default());
        assert!(out.contains(r#""__dash""#), "{out}");
        assert!(out.contains(r#""__hls""#), "{out}");
        assert!(!out.contains(r#""dash""#), "{out}");
        assert!(!out.contains(r#""hls""#), "{out}");
        assert!(out.contains(r#""progressive""#), "{out}");
    }

    #[test]
    fn vimeo_config_without_progressive_loses_range_queries() {
        let rules = rules_for_url("https://player.vimeo.com/video/123/config");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = r#"{"request":{"files":{"hls":{"url":"master.json?query_string_ranges=1"}}}}"#;
        let out = rewriter.rewrite(payload, &RewriteOpts::default());
        assert!(out.contains("query_string_ranges=0"), "{out}");
        assert!(!out.contains("query_string_ranges=1"), "{out}");
    }

    #[test]
    fn vimeo_dash_manifest_keeps_one_rendition_per_track() {
        let rules =
            rules_for_url("https://skyfire.vimeocdn.com/1/master.json?base64_init=1");
        let rewriter = RxRewriter::new(rules).unwrap();
        let payload = concat!(
            r#"{"clip_id":"c","video":["#,
            r#"{"mime_type":"video/mp4","bitrate":1000,"id":"v1"},"#,
            r#"{"mime_type":"video/mp4","bitrate":2000,"id":"v2"},"#,
            r#"{"mime_type":"video/mp4","bitrate":9000000,"id":"v3"}],"#,
            r#""audio":[{"mime_type":"audio/mp4","bitrate":128,"id":"a1"}]}"#,
        );
        let out = rewriter.rewrite(payload, &RewriteOpts::default());
        assert!(out.contains(r#""id":"v2""#), "{out}");
        assert!(!out.contains(r#""id":"v1""#), "{out}");
        // Above the bitrate cap, never selected.
        assert!(!out.contains(r#""id":"v3""#), "{out}");
        assert!(out.contains(r#""id":"a1""#), "{out}");
        assert!(out.contains(r#""clip_id":"c""#), "{out}");
    }
}
