//! Tracing/logging setup shared by the splitter binaries.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize with a fallback filter used when `RUST_LOG` is unset.
pub fn init_with_default(default_filter: &str) {
    tracing::init_with_default(default_filter);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
