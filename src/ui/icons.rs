//! Shared icons for terminal output.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Loop indicators
pub static PLAN: Emoji<'_, '_> = Emoji("📋 ", "[P]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static REPAIR: Emoji<'_, '_> = Emoji("🔧 ", "[FIX]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static CACHED: Emoji<'_, '_> = Emoji("💾 ", "[C]");
