//! Testing infrastructure for autodev.
//!
//! This module provides the injectable seams of the crate and controllable
//! test doubles for them.
//!
//! # Architecture
//!
//! - **Traits**: Abstractions for external dependencies (subprocesses, the
//!   model backend, the project test suite, the file system)
//! - **Mocks**: Test doubles that implement the traits with scripted behavior
//!
//! # Example
//!
//! ```rust,ignore
//! use autodev::testing::{MockCommandRunner, MockAiBackend};
//!
//! let runner = MockCommandRunner::new()
//!     .succeed("gh", &["issue", "create"], "https://github.com/o/r/issues/42\n");
//!
//! let ai = MockAiBackend::new().with_response("def test_parse(): ...");
//! ```

pub mod mocks;
pub mod traits;

// Re-export commonly used types
pub use mocks::*;
pub use traits::*;
