//! Transcript lookup backed by YouTube's caption tracks.
//!
//! The watch page embeds the player response, which lists every caption
//! track for the video. A track's `baseUrl` serves the captions as timed-text
//! XML; the transcript is the text of its `<text>` segments joined by spaces.

use crate::lookup::{LookupError, TranscriptLookup};
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE};
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};
use url::Url;

const WATCH_URL: &str = "https://www.youtube.com/watch";
const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";
const USER_AGENT: &str = concat!("yt-transcript-host/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Preferred transcript languages, most preferred first.
    pub languages: Vec<String>,
    pub timeout: Duration,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

pub struct YoutubeTranscripts {
    client: reqwest::Client,
    runtime: Runtime,
    languages: Vec<String>,
}

impl YoutubeTranscripts {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            client,
            runtime,
            languages: config.languages.clone(),
        })
    }

    async fn fetch_transcript(&self, video_id: &str) -> Result<String, LookupError> {
        let html = self.fetch_watch_page(video_id).await?;
        let tracks = extract_caption_tracks(&html, video_id)?;
        let track = select_track(&tracks, &self.languages, video_id)?;
        debug!(
            "Using {} caption track for {} (generated: {})",
            track.language_code,
            video_id,
            track.is_generated()
        );

        let xml = self
            .client
            .get(track.base_url.replace("&fmt=srv3", ""))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let segments = parse_transcript_xml(&xml);
        if segments.is_empty() {
            return Err(LookupError::TranscriptsDisabled(video_id.to_string()));
        }
        Ok(segments.join(" "))
    }

    async fn fetch_watch_page(&self, video_id: &str) -> Result<String, LookupError> {
        let url = Url::parse_with_params(WATCH_URL, &[("v", video_id)])
            .map_err(|e| LookupError::other(format!("Invalid watch URL: {}", e)))?;

        let html = self.get_page(url.clone(), None).await?;
        match consent_token(&html) {
            Some(token) => {
                warn!("Consent page served for {}, retrying with consent cookie", video_id);
                self.get_page(url, Some(format!("CONSENT=YES+{}", token)))
                    .await
            }
            None => Ok(html),
        }
    }

    async fn get_page(&self, url: Url, cookie: Option<String>) -> Result<String, LookupError> {
        let mut request = self.client.get(url).header(ACCEPT_LANGUAGE, "en-US");
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?.error_for_status()?.text().await?)
    }
}

impl TranscriptLookup for YoutubeTranscripts {
    fn lookup(&mut self, video_id: &str) -> Result<String, LookupError> {
        if !is_valid_video_id(video_id) {
            return Err(LookupError::InvalidVideoId(video_id.to_string()));
        }
        self.runtime.block_on(self.fetch_transcript(video_id))
    }
}

pub fn is_valid_video_id(video_id: &str) -> bool {
    video_id.len() == 11
        && video_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn consent_token(html: &str) -> Option<&str> {
    if !html.contains("action=\"https://consent.youtube.com/s\"") {
        return None;
    }
    let start = html.find("name=\"v\" value=\"")? + "name=\"v\" value=\"".len();
    let len = html[start..].find('"')?;
    Some(&html[start..start + len])
}

fn extract_caption_tracks(html: &str, video_id: &str) -> Result<Vec<CaptionTrack>, LookupError> {
    let Some(start) = html.find(CAPTION_TRACKS_KEY) else {
        if html.contains("class=\"g-recaptcha\"") {
            return Err(LookupError::TooManyRequests);
        }
        if html.contains("\"playabilityStatus\":{\"status\":\"ERROR\"") {
            return Err(LookupError::VideoUnavailable(video_id.to_string()));
        }
        return Err(LookupError::TranscriptsDisabled(video_id.to_string()));
    };

    let json = &html[start + CAPTION_TRACKS_KEY.len()..];
    let mut stream = serde_json::Deserializer::from_str(json).into_iter::<Vec<CaptionTrack>>();
    match stream.next() {
        Some(Ok(tracks)) if !tracks.is_empty() => Ok(tracks),
        Some(Err(e)) => Err(LookupError::other(format!(
            "Failed to parse caption tracks for {}: {}",
            video_id, e
        ))),
        _ => Err(LookupError::TranscriptsDisabled(video_id.to_string())),
    }
}

/// Picks the first language in preference order, manual tracks before
/// auto-generated ones.
fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
    video_id: &str,
) -> Result<&'a CaptionTrack, LookupError> {
    for language in languages {
        let matching = || tracks.iter().filter(|t| &t.language_code == language);
        if let Some(track) = matching()
            .find(|t| !t.is_generated())
            .or_else(|| matching().next())
        {
            return Ok(track);
        }
    }

    Err(LookupError::NoTranscriptFound {
        video_id: video_id.to_string(),
        requested: languages.to_vec(),
        available: tracks.iter().map(|t| t.language_code.clone()).collect(),
    })
}

/// Extracts the text of every non-empty `<text>` element.
fn parse_transcript_xml(xml: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = xml;

    while let Some(open) = rest.find("<text") {
        rest = &rest[open + "<text".len()..];
        // Skip lookalikes such as <textTrack>.
        if !rest.starts_with(['>', ' ', '\t', '\n', '\r', '/']) {
            continue;
        }
        let Some(tag_end) = rest.find('>') else {
            break;
        };
        if rest[..tag_end].ends_with('/') {
            rest = &rest[tag_end + 1..];
            continue;
        }
        rest = &rest[tag_end + 1..];

        let Some(close) = rest.find("</text>") else {
            break;
        };
        // Captions are XML-escaped HTML, so entities are decoded twice.
        let text = unescape_entities(&unescape_entities(&rest[..close]));
        let text = strip_tags(&text);
        let text = text.trim();
        if !text.is_empty() {
            segments.push(text.to_string());
        }
        rest = &rest[close + "</text>".len()..];
    }

    segments
}

fn unescape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
