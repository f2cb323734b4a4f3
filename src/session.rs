//! The interactive session: an explicit state machine over one upload.
//!
//! | From | Event | Success | Failure |
//! |------|-------|---------|---------|
//! | any | `upload` | `Extracting` → `Reviewing` | `Idle` |
//! | `Reviewing` / `Reporting` | `edit` | `Reviewing` | — |
//! | `Reviewing` / `Reporting` | `generate` | `Generating` → `Reporting` | `Reviewing` |
//! | any | `reset` | `Idle` | — |
//!
//! Transitions happen only on explicit events ([`Session::upload`],
//! [`Session::edit`], [`Session::generate`], [`Session::reset`]). Every event
//! takes `&mut self`, so a session can never run two transitions at once.
//! `Extracting` and `Generating` last for the duration of the awaited model
//! call; the front-end shows its blocking progress indicator meanwhile.
//!
//! Nothing is memoised: pressing generate twice issues two model calls, and
//! the second report replaces the first.

use crate::config::ReportConfig;
use crate::error::{RexError, StageError};
use crate::output::ReportArtifact;
use crate::pipeline::encode::encode_image;
use crate::pipeline::input::UploadedImage;
use crate::pipeline::llm::{ReportGenerator, ReportWriter, TextExtractor, VisionExtractor};
use crate::progress::{NoopObserver, ObserverHandle};
use crate::report::{FormattedReport, ReportId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the session is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No usable image.
    Idle,
    /// Encoding the upload and waiting for the vision model.
    Extracting,
    /// Extracted text is shown and editable.
    Reviewing,
    /// Waiting for the generation model.
    Generating,
    /// A report is shown and downloadable.
    Reporting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Extracting => "extracting",
            Phase::Reviewing => "reviewing",
            Phase::Generating => "generating",
            Phase::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The text under review and where it came from.
#[derive(Debug, Clone)]
struct Review {
    image: UploadedImage,
    extracted: String,
    text: String,
}

#[derive(Debug)]
enum State {
    Idle,
    Extracting { image: UploadedImage },
    Reviewing(Review),
    Generating(Review),
    Reporting { review: Review, report: FormattedReport },
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::Idle => Phase::Idle,
            State::Extracting { .. } => Phase::Extracting,
            State::Reviewing(_) => Phase::Reviewing,
            State::Generating(_) => Phase::Generating,
            State::Reporting { .. } => Phase::Reporting,
        }
    }

    fn review(&self) -> Option<&Review> {
        match self {
            State::Reviewing(r) | State::Generating(r) => Some(r),
            State::Reporting { review, .. } => Some(review),
            State::Idle | State::Extracting { .. } => None,
        }
    }
}

/// One user's interaction, from upload to optional download.
pub struct Session<E, G> {
    extractor: E,
    generator: G,
    state: State,
    last_error: Option<StageError>,
    observer: ObserverHandle,
}

impl Session<VisionExtractor, ReportWriter> {
    /// A session using the providers named in `config`.
    ///
    /// Missing credentials do not fail here; the affected call reports them.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            VisionExtractor::from_config(config),
            ReportWriter::from_config(config),
        )
    }
}

impl<E: TextExtractor, G: ReportGenerator> Session<E, G> {
    pub fn new(extractor: E, generator: G) -> Self {
        Self {
            extractor,
            generator,
            state: State::Idle,
            last_error: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = observer;
        self
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Process a new image, discarding everything from the previous one.
    ///
    /// On success the session is in [`Phase::Reviewing`] with the extracted
    /// text as the current text. On failure it is [`Phase::Idle`], the error
    /// is kept in [`Session::last_error`] and returned as [`RexError::Stage`].
    /// A model reply with no text counts as an extraction failure.
    pub async fn upload(&mut self, image: UploadedImage) -> Result<(), RexError> {
        self.state = State::Idle;
        self.last_error = None;

        let encoded = match encode_image(&image.bytes) {
            Ok(e) => e,
            Err(e) => return Err(self.fail(e, State::Idle)),
        };

        self.observer
            .on_extraction_start(image.display_name(), image.bytes.len());
        info!("Extracting text from {}", image.display_name());
        self.state = State::Extracting { image };

        let result = self.extractor.extract(&encoded).await;
        drop(encoded);

        let State::Extracting { image } = std::mem::replace(&mut self.state, State::Idle) else {
            return Err(RexError::Internal("session left extracting state".into()));
        };

        match result {
            Ok(text) if text.trim().is_empty() => {
                let e = StageError::Extraction {
                    detail: "the model returned no text for this image".into(),
                };
                Err(self.fail(e, State::Idle))
            }
            Ok(text) => {
                self.observer.on_extraction_complete(text.len());
                self.state = State::Reviewing(Review {
                    image,
                    extracted: text.clone(),
                    text,
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e, State::Idle)),
        }
    }

    /// Replace the current text with the reviewer's edit.
    ///
    /// Accepted while reviewing or reporting. Changing the text while a
    /// report is shown drops the report, since it no longer matches; an
    /// unchanged text is a no-op.
    pub fn edit(&mut self, text: impl Into<String>) -> Result<(), RexError> {
        let text = text.into();
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Reviewing(mut review) => {
                review.text = text;
                self.state = State::Reviewing(review);
                Ok(())
            }
            State::Reporting { review, report } if review.text == text => {
                self.state = State::Reporting { review, report };
                Ok(())
            }
            State::Reporting { mut review, .. } => {
                review.text = text;
                self.state = State::Reviewing(review);
                Ok(())
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(RexError::InvalidTransition {
                    event: "edit the text",
                    phase: phase.as_str(),
                })
            }
        }
    }

    /// Generate a report from the current text.
    ///
    /// Always calls the model, even when the text has not changed since the
    /// last report. On success the new report replaces any previous one. On
    /// failure the session returns to [`Phase::Reviewing`] with the text
    /// intact and no report.
    pub async fn generate(&mut self) -> Result<ReportId, RexError> {
        let review = match std::mem::replace(&mut self.state, State::Idle) {
            State::Reviewing(r) | State::Generating(r) => r,
            State::Reporting { review, .. } => review,
            other => {
                let phase = other.phase();
                self.state = other;
                return Err(RexError::InvalidTransition {
                    event: "generate a report",
                    phase: phase.as_str(),
                });
            }
        };

        self.last_error = None;
        self.observer.on_generation_start(review.text.len());
        self.state = State::Generating(review);

        let result = match &self.state {
            State::Generating(r) => self.generator.generate(&r.text).await,
            _ => return Err(RexError::Internal("session left generating state".into())),
        };

        let State::Generating(review) = std::mem::replace(&mut self.state, State::Idle) else {
            return Err(RexError::Internal("session left generating state".into()));
        };

        match result {
            Ok(body) => {
                let report = FormattedReport::new(body);
                let id = report.id;
                info!("Generated report {}", id);
                self.observer.on_generation_complete(&id, report.body.len());
                self.state = State::Reporting { review, report };
                Ok(id)
            }
            Err(e) => Err(self.fail(e, State::Reviewing(review))),
        }
    }

    /// Drop everything and return to [`Phase::Idle`].
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.last_error = None;
    }

    // ── Download ────────────────────────────────────────────────────────

    /// The current report as a downloadable artifact.
    pub fn artifact(&self) -> Result<ReportArtifact, RexError> {
        self.report()
            .map(ReportArtifact::from)
            .ok_or(RexError::NothingToDownload)
    }

    /// Write the current report into `dir`.
    pub async fn download(&self, dir: impl AsRef<Path>) -> Result<PathBuf, RexError> {
        self.artifact()?.write_to(dir).await
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// The uploaded image behind the current text, if any.
    pub fn image(&self) -> Option<&UploadedImage> {
        match &self.state {
            State::Extracting { image } => Some(image),
            other => other.review().map(|r| &r.image),
        }
    }

    /// Text exactly as the vision model returned it.
    pub fn extracted_text(&self) -> Option<&str> {
        self.state.review().map(|r| r.extracted.as_str())
    }

    /// Text that the next `generate` will send, including edits.
    pub fn current_text(&self) -> Option<&str> {
        self.state.review().map(|r| r.text.as_str())
    }

    pub fn report(&self) -> Option<&FormattedReport> {
        match &self.state {
            State::Reporting { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The most recent stage failure, cleared by the next upload or generate.
    pub fn last_error(&self) -> Option<&StageError> {
        self.last_error.as_ref()
    }

    pub fn can_generate(&self) -> bool {
        matches!(self.phase(), Phase::Reviewing | Phase::Reporting)
    }

    pub fn can_download(&self) -> bool {
        self.report().is_some()
    }

    fn fail(&mut self, error: StageError, next: State) -> RexError {
        warn!("{}", error);
        self.observer.on_stage_error(error.stage(), &error.to_string());
        self.state = next;
        self.last_error = Some(error.clone());
        RexError::Stage(error)
    }
}

impl<E, G> fmt::Debug for Session<E, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.state.phase())
            .field("last_error", &self.last_error)
            .finish()
    }
}
