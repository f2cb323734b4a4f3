//! # rex-report
//!
//! Turn a photographed or scanned medical report into a structured
//! pathology report using two language models.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image file
//!  │
//!  ├─ 1. Input     read the upload (.jpg / .jpeg / .png)
//!  ├─ 2. Encode    validate JPEG/PNG → base64 payload (original bytes)
//!  ├─ 3. Extract   vision model transcribes all visible text
//!  ├─ 4. Review    a human edits the text
//!  ├─ 5. Generate  text model writes the seven-section report
//!  └─ 6. Output    header (timestamp + PATH-… id) + body → .txt download
//! ```
//!
//! Steps 3–5 are driven by [`Session`], an explicit state machine that any
//! front-end can feed with events. Every model failure is a [`StageError`]
//! that leaves the session usable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rex_report::{load_image, Credentials, ReportConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ReportConfig::default();
//!     config.credentials = Credentials::from_env(&config.vision, &config.generation);
//!
//!     let mut session = Session::from_config(&config);
//!     session.upload(load_image("lab_slip.jpg").await?).await?;
//!     println!("{}", session.current_text().unwrap_or_default());
//!
//!     session.edit("Hemoglobin: 13.5 g/dL")?;
//!     session.generate().await?;
//!     let path = session.download(&config.output_dir).await?;
//!     eprintln!("saved {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rex-report` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Credentials, ModelSettings, ReportConfig, ReportConfigBuilder, SecretKey};
pub use error::{RexError, Stage, StageError};
pub use output::ReportArtifact;
pub use pipeline::encode::{encode_image, encode_reader, EncodedImage, ImageKind};
pub use pipeline::input::{load_image, UploadedImage};
pub use pipeline::llm::{
    ChatBackend, ReportGenerator, ReportWriter, TextExtractor, VisionExtractor,
};
pub use progress::{NoopObserver, ObserverHandle, SessionObserver};
pub use report::{FormattedReport, ReportId};
pub use session::{Phase, Session};
