//! Integration tests for the MMCD datalogger
//!
//! These tests exercise the layers together without hardware:
//! - sample sources (simulator, protocol engine over the mock transport)
//! - the sampling engine and its watchdog
//! - native log writing and reading, legacy log import
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mmcd-tests
//! ```
//!
//! # Test Structure
//!
//! - `e2e_test.rs` - source to engine to native log
//! - `import_test.rs` - legacy PalmOS logs to native logs

// This crate only contains tests, no library code
