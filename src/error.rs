use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Failures inside the sequencer.
///
/// None of these ever reach the listener: the sequencer logs them and
/// degrades to silence. They exist so internal steps can use `?`.
#[derive(Debug, Error)]
pub enum AmbienceError {
    #[error("audio output unavailable: {0}")]
    PlatformUnavailable(String),
    #[error("playback session already stopped")]
    AlreadyStopped,
    #[error(transparent)]
    InvalidPlan(#[from] PlanError),
}

/// A sequence plan or session config that could not be loaded.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("malformed JSON at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl PlanError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Render a diagnostic pointing into `source`, the JSON the plan was
    /// loaded from.
    pub fn report(&self, source: &str) -> String {
        let (offset, label) = match self {
            PlanError::Json {
                line,
                column,
                message,
            } => (line_column_offset(source, *line, *column), message.clone()),
            PlanError::Invalid { path, reason } => (key_offset(source, path), reason.clone()),
        };
        let offset = offset.min(source.len());
        let span = offset..(offset + 1).min(source.len()).max(offset);

        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, span.clone())
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new(span).with_message(label))
            .finish()
            .write(Source::from(source), &mut out);
        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(e: serde_json::Error) -> Self {
        PlanError::Json {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}

/// Byte offset of a 1-based line / column pair as reported by serde_json.
fn line_column_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            return offset + column.saturating_sub(1).min(text.len());
        }
        offset += text.len();
    }
    offset
}

/// Best-effort location of the last key of a validation path such as
/// `categories[0].voices[1].gain`.
fn key_offset(source: &str, path: &str) -> usize {
    let key = path
        .rsplit('.')
        .next()
        .unwrap_or(path)
        .split('[')
        .next()
        .unwrap_or_default();
    if key.is_empty() {
        return 0;
    }
    source.rfind(&format!("\"{key}\"")).unwrap_or(0)
}
