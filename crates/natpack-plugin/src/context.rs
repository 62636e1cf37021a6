// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Diagnostic channel back to the host bundler

use parking_lot::Mutex;

/// Prefix carried by every warning the plugin emits.
pub const TAG: &str = "[natpack]";

/// What the plugin needs from the host while a hook runs.
pub trait HostContext: Send + Sync {
    /// Report a non-fatal problem to the host.
    fn warn(&self, message: &str);
}

/// Forwards warnings to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext;

impl HostContext for LogContext {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Buffers warnings so callers can inspect them after a hook returns.
#[derive(Debug, Default)]
pub struct CollectContext {
    warnings: Mutex<Vec<String>>,
}

impl CollectContext {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings received so far
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl HostContext for CollectContext {
    fn warn(&self, message: &str) {
        tracing::debug!("collected warning: {}", message);
        self.warnings.lock().push(message.to_string());
    }
}

/// Send a tagged warning through the host channel.
pub(crate) fn warn(ctx: &dyn HostContext, message: impl std::fmt::Display) {
    ctx.warn(&format!("{} {}", TAG, message));
}
