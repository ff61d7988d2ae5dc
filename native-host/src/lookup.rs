use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    /// An error occurred while making an HTTP request.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The video {0} is no longer available")]
    VideoUnavailable(String),

    #[error("Subtitles are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("No transcript found for video {video_id} in {requested:?}, available: {available:?}")]
    NoTranscriptFound {
        video_id: String,
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("YouTube is blocking requests from this IP (too many requests)")]
    TooManyRequests,

    #[error("Invalid video id: {0:?}")]
    InvalidVideoId(String),

    #[error("Failed to start HTTP runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LookupError {
    pub fn other(msg: impl Into<String>) -> Self {
        LookupError::Other(msg.into())
    }
}

/// Resolves a video id to its transcript text.
pub trait TranscriptLookup {
    fn lookup(&mut self, video_id: &str) -> Result<String, LookupError>;
}

impl<F> TranscriptLookup for F
where
    F: FnMut(&str) -> Result<String, LookupError>,
{
    fn lookup(&mut self, video_id: &str) -> Result<String, LookupError> {
        self(video_id)
    }
}
