//! Process-wide constants.

/// Environment variable that controls the logging level.
pub const NASHDBG_LOG: &str = "NASHDBG_LOG";

/// Default debug target host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default debug target JDWP port.
pub const DEFAULT_PORT: u16 = 7777;

/// Opaque token prepended to every piece of code this host evaluates in the
/// target VM. Recovered script sources containing it are our own evaluated
/// code reappearing at reconnection and must be ignored.
pub const EVALUATED_CODE_MARKER: &str = "c19bb39cdbd54e82a29e1f9e9a7c1f53";

/// Reserved property-name prefix for host-internal bookkeeping inside the
/// target VM. Names with this prefix never reach the user.
pub const HIDDEN_PREFIX: &str = "||";

/// How many times source recovery is attempted for a freshly prepared
/// script class before the class is dropped.
pub const INITIAL_SCRIPT_RESOLVE_ATTEMPTS: u32 = 5;

/// Delay between two source-recovery attempts, in milliseconds.
pub const SCRIPT_RESOLVE_RETRY_MS: u64 = 50;

/// Delay before each initialization-quiescence check, in milliseconds.
pub const POSTPONE_INITIALIZE_MS: u64 = 200;

/// Stack-frame id alias for the first frame of the current pause.
pub const TOP_FRAME_ID: &str = "$top";
