//! Sequential-admission lock data model

use serde::{Deserialize, Serialize};

/// Width of the zero-padded sequence component. The padding makes
/// lexicographic key order equal numeric sequence order, which is what lets
/// ownership be defined as "smallest key under the path".
pub const SEQUENCE_PAD_WIDTH: usize = 10;

/// Claim on a spot in the admission queue for one lock path.
///
/// The ticket's owner is obligated to hand the ticket back (via release, or
/// via the acquire timeout path that removes it) before walking away. An
/// abandoned ticket blocks every later waiter on the path forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTicket {
    /// Registry key, `"{path}/lock-{sequence:010}"`.
    pub key: String,
    /// Sequence number backing the key.
    pub sequence: u64,
}

/// Build the registry key for a waiter.
pub fn waiter_key(path: &str, sequence: u64) -> String {
    format!("{path}/lock-{sequence:0width$}", width = SEQUENCE_PAD_WIDTH)
}

/// Half-open key range covering every waiter under `path`. `'0'` is the
/// successor of `'/'` in ASCII, so `["{path}/", "{path}0")` spans exactly
/// the `{path}/...` keys.
pub(crate) fn path_range(path: &str) -> (String, String) {
    (format!("{path}/"), format!("{path}0"))
}
