//! Quality-of-service primitive.

use num_enum::TryFromPrimitive;

/// Timeliness class. `Delayed` is the open-valued class carrying an
/// explicit delay on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum QosTimeliness {
    Unspecified = 0,
    Realtime = 1,
    DelayedUnknown = 2,
    Delayed = 3,
}

/// Rate class. `TimeConflated` is the open-valued class carrying an
/// explicit interval on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum QosRate {
    Unspecified = 0,
    TickByTick = 1,
    JitConflated = 2,
    TimeConflated = 3,
}

/// Quality of service: timeliness and rate classes plus their open
/// values. Unspecified classes exist only as in-memory defaults; they are
/// rejected on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Qos {
    pub timeliness: QosTimeliness,
    pub rate: QosRate,
    pub dynamic: bool,
    /// Delay in milliseconds when timeliness is `Delayed`.
    pub time_info: u16,
    /// Conflation interval in milliseconds when rate is `TimeConflated`.
    pub rate_info: u16,
}

impl Default for Qos {
    fn default() -> Self {
        Qos {
            timeliness: QosTimeliness::Unspecified,
            rate: QosRate::Unspecified,
            dynamic: false,
            time_info: 0,
            rate_info: 0,
        }
    }
}

impl Qos {
    pub fn realtime_tick_by_tick() -> Self {
        Qos {
            timeliness: QosTimeliness::Realtime,
            rate: QosRate::TickByTick,
            ..Qos::default()
        }
    }

    pub(crate) fn wire_len(self) -> usize {
        let mut len = 1;
        if self.timeliness == QosTimeliness::Delayed {
            len += 2;
        }
        if self.rate == QosRate::TimeConflated {
            len += 2;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_len_tracks_open_values() {
        assert_eq!(Qos::realtime_tick_by_tick().wire_len(), 1);
        let q = Qos {
            timeliness: QosTimeliness::Delayed,
            rate: QosRate::TimeConflated,
            dynamic: true,
            time_info: 1500,
            rate_info: 100,
        };
        assert_eq!(q.wire_len(), 5);
    }
}
