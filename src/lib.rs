//! Synthesize tests for a source file and run them in a container sandbox.
//!
//! `auto-tester` takes a source file and a language identifier, writes a small
//! test file exercising every top-level function it can find, and runs that
//! test inside a throwaway container chosen for the language. The captured
//! output is scanned for pass and fail markers and summarised.
//!
//! # Pipeline
//!
//! 1. Resolve the language to an execution profile (image and command).
//! 2. Read the source and synthesize a test in the matching dialect.
//! 3. Stage the source and the test in a fresh per-run working directory.
//! 4. Run the test command in a network-less container with the test file
//!    bind-mounted under the application directory.
//! 5. Analyze the combined output and remove the working directory.
//!
//! # Modules
//!
//! - [`analysis`]: Output scanning and result summaries
//! - [`api`]: Pipeline orchestration shared by the CLI and tests
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection and sandbox execution
//! - [`error`]: Semantic error types for the application
//! - [`registry`]: Language to execution profile mapping
//! - [`staging`]: Per-run working directories
//! - [`synth`]: Declaration extraction and test synthesis

pub mod analysis;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod staging;
pub mod synth;
