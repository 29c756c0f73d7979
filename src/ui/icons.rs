//! Shared UI icons and emojis.
//!
//! Common emoji constants used across the UI components for consistent
//! visual styling, with plain-text fallbacks for dumb terminals.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");

// Step lifecycle indicators
pub static PEN: Emoji<'_, '_> = Emoji("✍️  ", "[GEN]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[REV]");
