//! Engine-wide constants.

/// Maximum number of events retained by the bus; oldest entries are
/// evicted first.
pub const MAX_EVENT_HISTORY: usize = 1000;

/// Smallest roster a playable regulation can describe.
pub const MIN_PLAYERS: usize = 3;

/// Largest roster the engine is sized for.
pub const MAX_PLAYERS: usize = 20;

/// Default per-round discussion time, in seconds.
pub const DEFAULT_DISCUSSION_SECS: u32 = 180;

/// File name of the regulation preset document inside the data directory.
pub const REGULATIONS_FILE: &str = "regulations.json";
