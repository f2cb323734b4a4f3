//! Pipeline stages from uploaded image to model output.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the session only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm (extract) ──▶ [human edit] ──▶ llm (generate)
//! (path)    (base64)   (vision model)                     (text model)
//! ```
//!
//! 1. [`input`]  — read the upload and apply the extension allow-list
//! 2. [`encode`] — reject non-images, base64-wrap the original bytes
//! 3. [`llm`]    — the two model clients; the only stage with network I/O

pub mod encode;
pub mod input;
pub mod llm;
