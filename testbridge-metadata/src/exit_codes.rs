// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testbridge` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TestBridgeExitCode {}

impl TestBridgeExitCode {
    /// No errors occurred and testbridge exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more tests failed, or a cleanup step failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The test binary, settings file or script could not be loaded.
    pub const SETUP_ERROR: i32 = 96;

    /// The legacy filter expression failed to parse.
    pub const INVALID_FILTER: i32 = 94;

    /// The host requested a filter kind that testbridge doesn't support.
    pub const UNSUPPORTED_FILTER: i32 = 93;

    /// Publishing a message to the host failed.
    pub const PUBLISH_ERROR: i32 = 110;
}
