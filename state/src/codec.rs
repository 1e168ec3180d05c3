//! Conversion between raw store payloads and channel state records

use chanstate_core::{ChannelState, StateError, StateResult};

/// Encodes and decodes [`ChannelState`] payloads.
///
/// Payloads are field-named JSON, so other readers of the same store can
/// ignore fields they do not know. Missing payloads map to missing records
/// in both directions.
pub struct StateCodec;

impl StateCodec {
    /// Decode the payload found at `key`.
    ///
    /// A literal `null` payload is treated the same as no payload.
    pub fn decode(key: &str, raw: Option<&[u8]>) -> StateResult<Option<ChannelState>> {
        match raw {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice::<Option<ChannelState>>(bytes).map_err(|e| {
                StateError::MalformedRecord {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Encode a record; `None` encodes to no payload, i.e. a delete.
    pub fn encode(state: Option<&ChannelState>) -> StateResult<Option<Vec<u8>>> {
        state
            .map(|s| serde_json::to_vec(s).map_err(|e| StateError::Encoding(e.to_string())))
            .transpose()
    }
}
