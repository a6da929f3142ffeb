//! Application-wide constants for copydesk.
//!
//! Centralizes all magic numbers and configuration values to improve maintainability
//! and make the codebase self-documenting.

use std::time::Duration;

// ============================================================================
// Application Identity
// ============================================================================

/// Application name displayed in the REPL banner and logs.
pub const APP_NAME: &str = "Copydesk";

/// Directory name under the platform config dir holding config.toml.
pub const CONFIG_DIR_NAME: &str = "copydesk";

// ============================================================================
// Command Surface
// ============================================================================

/// Reserved leading character that opens the command palette while typing.
pub const PALETTE_TRIGGER: char = '/';

/// Maximum characters of surrounding document text included as model context.
/// Keeps prompts under typical context windows for small local models.
pub const MAX_CONTEXT_CHARS: usize = 8_000;

// ============================================================================
// AI Transport
// ============================================================================

/// HTTP request timeout for AI operations.
pub const AI_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature. Low for predictable rewrites of marketing copy.
pub const AI_TEMPERATURE: f64 = 0.3;

/// Nucleus sampling cutoff.
pub const AI_TOP_P: f64 = 0.9;

/// Fixed seed so regenerate is reproducible against deterministic backends.
pub const AI_SEED: u64 = 42;

// ============================================================================
// Autosave Queue
// ============================================================================

/// Buffer size for the save queue channel.
/// Size of 1 ensures only one write is pending at a time,
/// with newer snapshots replacing queued ones.
pub const SAVE_QUEUE_BUFFER: usize = 1;

/// Default debounce window for coalescing save requests (milliseconds).
pub const SAVE_DEBOUNCE_MS: u64 = 750;

// ============================================================================
// Media Search
// ============================================================================

/// Base URL for the Openverse search API.
pub const OPENVERSE_BASE_URL: &str = "https://api.openverse.org/v1";

/// Result page size for palette media searches.
pub const MEDIA_SEARCH_PAGE_SIZE: u32 = 12;
