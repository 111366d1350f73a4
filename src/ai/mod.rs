//! AI backend abstraction.
//!
//! The workflow only ever needs one thing from a model: send a system prompt
//! and a user prompt, get text back. That contract is the
//! [`AiBackend`](crate::testing::AiBackend) trait; [`LmStudioClient`] is the
//! HTTP implementation for LM Studio (or any OpenAI-compatible
//! `/v1/chat/completions` server).
//!
//! The helper functions in this module ([`generate_code`],
//! [`generate_tests`], [`fix_bugs`], [`analyze_text`]) wrap `chat` with the
//! prompts and sampling settings used for each kind of request.
//!
//! # Example
//!
//! ```rust,ignore
//! use autodev::ai::{generate_tests, LmStudioClient};
//!
//! let client = LmStudioClient::new("http://localhost:1234")?;
//! let tests = generate_tests(&client, "def add(a, b): ...", "pytest").await?;
//! ```

pub mod lm_studio;

pub use lm_studio::LmStudioClient;

use crate::testing::AiBackend;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur when talking to the model server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    /// Server is not running or unreachable.
    #[error("AI server not available at '{base_url}': {message}")]
    ServerUnavailable { base_url: String, message: String },

    /// Request timed out.
    #[error("AI request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Server answered with a non-success status.
    #[error("AI API error ({status}): {body}")]
    Http { status: u16, body: String },

    /// Reply could not be decoded.
    #[error("Invalid response from AI server: {message}")]
    InvalidResponse { message: String },

    /// Reply decoded but contained no choices.
    #[error("AI server returned no choices")]
    EmptyResponse,
}

impl AiError {
    /// Check if this error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerUnavailable { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse { .. } | Self::EmptyResponse => false,
        }
    }
}

// =============================================================================
// Request helpers
// =============================================================================

/// Kind of text analysis requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    BugDetection,
    CodeReview,
    Performance,
    Security,
    General,
}

impl AnalysisKind {
    /// Parse an analysis kind name; unknown names map to `General`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bug_detection" | "bugs" => Self::BugDetection,
            "code_review" | "review" => Self::CodeReview,
            "performance" => Self::Performance,
            "security" => Self::Security,
            _ => Self::General,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::BugDetection => "bug_detection",
            Self::CodeReview => "code_review",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::General => "text",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Self::BugDetection => "You are a code analysis expert. Analyze the code for potential bugs, security issues, and improvements.",
            Self::CodeReview => "You are a senior developer conducting a code review. Provide detailed feedback on code quality, style, and best practices.",
            Self::Performance => "You are a performance optimization expert. Analyze the code for performance bottlenecks and suggest improvements.",
            Self::Security => "You are a security expert. Analyze the code for security vulnerabilities and provide recommendations.",
            Self::General => "You are an expert analyst. Provide detailed analysis of the provided text.",
        }
    }
}

/// Generate code for a free-form request.
pub async fn generate_code(
    ai: &dyn AiBackend,
    request: &str,
    language: &str,
    framework: Option<&str>,
) -> Result<String, AiError> {
    let system = "You are an expert software developer. Generate clean, well-documented code based on the request.";
    let mut user = format!("Generate {} code", language);
    if let Some(framework) = framework.filter(|f| !f.is_empty()) {
        user.push_str(&format!(" using {} framework", framework));
    }
    user.push_str(&format!(
        ":\n\n{}\n\nProvide only the code without explanations.",
        request
    ));
    ai.chat(system, &user, 2000, 0.7).await
}

/// Generate unit tests for existing code.
pub async fn generate_tests(
    ai: &dyn AiBackend,
    code: &str,
    test_framework: &str,
) -> Result<String, AiError> {
    let system = format!(
        "You are a test-driven development expert using {}. Generate comprehensive unit tests following TDD best practices: \
         GIVEN/WHEN/THEN structure in comments, edge cases and error conditions, descriptive test names, proper assertions.",
        test_framework
    );
    let user = format!(
        "Generate {} unit tests for this code:\n\n{}\n\nCover the functionality, edge cases and error conditions, and mock external dependencies.",
        test_framework, code
    );
    ai.chat(&system, &user, 2500, 0.4).await
}

/// Ask the model to fix described bugs in a piece of code.
pub async fn fix_bugs(
    ai: &dyn AiBackend,
    code: &str,
    bug_description: &str,
) -> Result<String, AiError> {
    let system = "You are an expert debugger and software engineer. Fix the reported bugs while maintaining code functionality and style. \
                  Provide only the corrected code without explanations.";
    let user = format!(
        "Fix the bugs in this code:\n\nCODE:\n{}\n\nBUGS TO FIX:\n{}\n\nProvide the corrected code maintaining the same structure and functionality.",
        code, bug_description
    );
    ai.chat(system, &user, 2000, 0.2).await
}

/// Analyze text (usually code) from a given angle.
pub async fn analyze_text(
    ai: &dyn AiBackend,
    text: &str,
    kind: AnalysisKind,
) -> Result<String, AiError> {
    let user = format!("Analyze this {}:\n\n{}", kind.label(), text);
    ai.chat(kind.system_prompt(), &user, 1500, 0.3).await
}

/// Strip a surrounding fenced code block from a model reply.
///
/// Replies that contain a fenced block yield the body of the first block;
/// anything else is returned trimmed.
#[must_use]
pub fn extract_code_block(reply: &str) -> String {
    let Some(start) = reply.find("```") else {
        return reply.trim().to_string();
    };
    let after_fence = &reply[start + 3..];
    // Skip the language tag on the opening fence line.
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}
