use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wire form of a single table, produced by `export` and consumed by
/// `import`. The `memory` field carries exactly `offset` bytes; the index
/// and the three counters are installed byte-exact on import.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TableTransport {
    pub hkeys: HashMap<u64, u64>,
    pub memory: Vec<u8>,
    pub offset: u64,
    pub allocated: u64,
    pub inuse: u64,
    pub garbage: u64,
}
