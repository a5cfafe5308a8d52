//! Instrument metadata

use crate::ids::{InstrumentId, PartyId};
use serde::{Deserialize, Serialize};

/// Metadata for one tradable instrument
///
/// Written exactly once when the book is created; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub instrument_id: InstrumentId,
    pub name: String,
    pub description: String,
    /// Creation instant, Unix nanos
    pub created_at: i64,
    pub created_by: PartyId,
}
