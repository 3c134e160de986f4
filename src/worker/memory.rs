//! JVM heap sizing for the engine process.
//!
//! When the operator has not pinned a heap size, the host asks the JVM for
//! three quarters of the memory basis while always leaving a reserved floor
//! for the rest of the system, and never less than a minimum ceiling.

use sysinfo::System;

/// Fraction of the memory basis offered to the engine.
pub const TARGET_FRACTION: f64 = 0.75;

/// Smallest heap ceiling ever requested, in MiB.
pub const MINIMUM_CEILING_MB: u64 = 512;

/// Memory kept free for the system when sizing from available memory, in MiB.
pub const AVAILABLE_RESERVED_MB: u64 = 1024;

/// Memory kept free for the system when sizing from total memory, in MiB.
pub const TOTAL_RESERVED_MB: u64 = 4096;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Memory figure the heap ceiling is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBasis {
    /// Currently available memory, in MiB.
    Available(u64),
    /// Total installed memory, in MiB. Used where available memory is
    /// under-reported because of file cache accounting.
    Total(u64),
}

impl MemoryBasis {
    /// Read the basis for this platform from the host.
    #[must_use]
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        if cfg!(target_os = "macos") {
            Self::Total(system.total_memory() / BYTES_PER_MB)
        } else {
            Self::Available(system.available_memory() / BYTES_PER_MB)
        }
    }

    /// Memory figure in MiB.
    #[must_use]
    pub fn megabytes(self) -> u64 {
        match self {
            Self::Available(mb) | Self::Total(mb) => mb,
        }
    }

    /// Reserved system floor for this basis, in MiB.
    #[must_use]
    pub fn reserved_megabytes(self) -> u64 {
        match self {
            Self::Available(_) => AVAILABLE_RESERVED_MB,
            Self::Total(_) => TOTAL_RESERVED_MB,
        }
    }
}

/// Compute the heap ceiling in MiB:
/// `max(min(basis − reserved, basis × 0.75), 512)`.
#[must_use]
pub fn heap_ceiling_mb(basis: MemoryBasis) -> u64 {
    let basis_mb = basis.megabytes();
    let after_reserve = basis_mb.saturating_sub(basis.reserved_megabytes());
    let target = fraction_of(basis_mb);
    after_reserve.min(target).max(MINIMUM_CEILING_MB)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fraction_of(megabytes: u64) -> u64 {
    (megabytes as f64 * TARGET_FRACTION).floor() as u64
}

/// Whether the options already pin a heap size (`-Xmx…` or `-Xms…`).
#[must_use]
pub fn has_heap_option(java_options: &str) -> bool {
    java_options.contains("-Xm")
}

/// Append a computed `-Xmx<N>M` option unless the options already size the
/// heap. `basis` is only consulted when a ceiling has to be computed.
#[must_use]
pub fn with_heap_ceiling(java_options: &str, basis: impl FnOnce() -> MemoryBasis) -> String {
    if has_heap_option(java_options) {
        return java_options.to_owned();
    }

    let generated = format!("-Xmx{}M", heap_ceiling_mb(basis()));
    if java_options.is_empty() {
        generated
    } else {
        format!("{java_options} {generated}")
    }
}
