//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error
pub const USAGE: i32 = 64;

/// Data format error (unknown tenant, malformed APIC response)
pub const DATAERR: i32 = 65;

/// Service unavailable (APIC unreachable, Graphviz not installed)
pub const UNAVAILABLE: i32 = 69;

/// Internal software error
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Permission denied (APIC login rejected)
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;
