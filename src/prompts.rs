//! Prompts for the two model calls.
//!
//! Centralising both prompts here keeps the clients in
//! [`crate::pipeline::llm`] free of prompt text, and lets unit tests inspect
//! the exact wording without a live model.

/// Instruction sent alongside the uploaded image to the vision model.
///
/// The model must transcribe, not interpret: the human reviewer edits the
/// raw text before any structuring happens.
pub const EXTRACTION_PROMPT: &str = "Please extract all the medical information from this image. \
Include all text you can see, maintaining the medical terminology and formatting. \
Extract it as raw text, don't try to interpret or reorganize it yet.";

/// Sections every generated report must contain, in order.
pub const REPORT_SECTIONS: [&str; 7] = [
    "Patient Demographics",
    "Clinical History",
    "Specimen Details",
    "Gross Description",
    "Microscopic Findings",
    "Diagnosis",
    "Comments",
];

/// Writing requirements the generation model must follow.
pub const REPORT_REQUIREMENTS: [&str; 4] = [
    "Use standard medical terminology",
    "Include measurements where available",
    "Note any abnormal findings",
    "Add relevant clinical recommendations",
];

/// Build the report-generation prompt around the reviewed text.
///
/// `raw_text` is embedded verbatim between the guidelines and the closing
/// instruction.
pub fn pathology_report_prompt(raw_text: &str) -> String {
    let sections: String = REPORT_SECTIONS
        .iter()
        .map(|s| format!("   - {s}\n"))
        .collect();
    let requirements: String = REPORT_REQUIREMENTS
        .iter()
        .map(|r| format!("   - {r}\n"))
        .collect();

    format!(
        "As an expert pathologist doctor, please create a comprehensive pathology report \
from the following medical information according to pathology report writing rules.\n\
Follow these guidelines:\n\n\
1. Key Sections Required:\n{sections}\n\
2. Requirements:\n{requirements}\n\
Raw Medical Information:\n{raw_text}\n\n\
Please format this into a clear, professional pathology report."
    )
}
