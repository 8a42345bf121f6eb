//! Shared timing limits.
//!
//! Using centralized constants keeps the generator, action and configuration
//! layers consistent.

use std::time::Duration;

// =============================================================================
// Polling
// =============================================================================

/// Default pause between two state polls of an action loop (200 ms).
pub const DEFAULT_NAP: Duration = Duration::from_millis(200);

/// Number of state polls an action waits after an abort before giving up.
pub const DEFAULT_ABORT_RETRIES: u32 = 50;

// =============================================================================
// Generation
// =============================================================================

/// Longest uninterrupted sleep of a function generator (100 ms).
///
/// Longer active/passive periods are split into equal sub-sleeps no longer
/// than this, bounding the latency of `stop()`.
pub const DEFAULT_MAX_NAP: Duration = Duration::from_millis(100);

/// Lower bound accepted for `max_nap`.
pub const MIN_MAX_NAP: Duration = Duration::from_millis(1);
