// Test module organization for kdrift
// This module contains all internal unit and integration tests for the crate





// Report rendering tests
pub mod report_tests;
