//! Stream-state primitive.

use num_enum::TryFromPrimitive;

/// Stream state. `Unspecified` is an in-memory default only.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamState {
    Unspecified = 0,
    Open = 1,
    NonStreaming = 2,
    ClosedRecover = 3,
    Closed = 4,
    ClosedRedirected = 5,
}

/// Data state of the stream's payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum DataState {
    NoChange = 0,
    Ok = 1,
    Suspect = 2,
}

/// Well-known status codes. Kept as a raw byte on [`State`] since the
/// code space is open-ended.
pub mod status_code {
    pub const NONE: u8 = 0;
    pub const NOT_FOUND: u8 = 1;
    pub const TIMEOUT: u8 = 2;
    pub const NOT_AUTHORIZED: u8 = 3;
    pub const INVALID_ARGUMENT: u8 = 4;
    pub const USAGE_ERROR: u8 = 5;
    pub const PREEMPTED: u8 = 6;
    pub const JIT_CONFLATION_STARTED: u8 = 7;
    pub const REALTIME_RESUMED: u8 = 8;
}

/// Stream state, data state, status code and free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct State<'a> {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: u8,
    pub text: &'a [u8],
}

impl Default for State<'_> {
    fn default() -> Self {
        State {
            stream_state: StreamState::Unspecified,
            data_state: DataState::NoChange,
            code: status_code::NONE,
            text: b"",
        }
    }
}

impl<'a> State<'a> {
    pub fn open_ok() -> Self {
        State {
            stream_state: StreamState::Open,
            data_state: DataState::Ok,
            ..State::default()
        }
    }

    pub(crate) fn wire_len(self) -> usize {
        // lead byte + code + u15rb text length + text
        2 + if self.text.len() < 0x80 { 1 } else { 2 } + self.text.len()
    }
}
