// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capabilities that testbridge advertises to the host.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// The unique identifier of the testbridge extension.
pub const EXTENSION_UID: &str = "testbridge";

/// The version of the testbridge extension.
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name shown to users for the testbridge extension.
pub const EXTENSION_DISPLAY_NAME: &str = "testbridge legacy engine adapter";

/// The description of the testbridge extension.
pub const EXTENSION_DESCRIPTION: &str =
    "Runs tests from a legacy test engine, translating and filtering its events for the host.";

/// Returns the banner shown by the host when the adapter starts.
pub fn banner() -> String {
    format!(
        "{EXTENSION_UID} runner version {EXTENSION_VERSION} ({}-bit {}-{})",
        usize::BITS,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

/// Structured report mode.
///
/// This capability is always supported, and is enabled by the host if it wants report-specific
/// properties attached to each update. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct StructuredReportCapability {
    enabled: Arc<AtomicBool>,
}

impl StructuredReportCapability {
    /// Creates a new, disabled capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true: structured reports are always supported.
    pub fn is_supported(&self) -> bool {
        true
    }

    /// Enables structured report mode.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Returns true if structured report mode is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Graceful stop: the host asks the adapter to stop starting new tests. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct GracefulStopCapability {
    requested: Arc<AtomicBool>,
}

impl GracefulStopCapability {
    /// Creates a new capability with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a graceful stop.
    pub fn request_stop(&self) {
        tracing::debug!("graceful stop requested");
        self.requested.store(true, Ordering::Release);
    }

    /// Returns true if a graceful stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
