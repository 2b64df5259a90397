use thiserror::Error;

/// Errors surfaced by the recognition pipeline.
///
/// The display strings are the client-facing messages. `Internal` keeps its
/// cause for logging but never leaks it outward: its message stays generic.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// Malformed upload form.
    #[error("error parsing form")]
    ParseForm,
    /// Missing, duplicated or unreadable form file.
    #[error("error parsing form file")]
    ParseFile,
    /// Unsupported format, out-of-range dimensions, wrong color model or
    /// decoder rejection.
    #[error("invalid image")]
    BadImage,
    /// Zero or several faces detected.
    #[error("not a single face")]
    NoSingleFace,
    /// Face found but no acceptable catalog match.
    #[error("cannot find idol")]
    NoIdol,
    /// Storage or classification-resource failure.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}
