//! Admission control for incoming connections

use shared::RejectReason;

/// Outcome of a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

/// Accepts a connection only while the room has a free slot and the supplied
/// key matches the shared secret
///
/// Pure decision: the caller owns the peer count and registers the peer.
pub fn decide(
    current_peer_count: usize,
    room_size: usize,
    supplied_key: &str,
    expected_key: &str,
) -> Admission {
    if current_peer_count >= room_size {
        Admission::Reject(RejectReason::RoomFull)
    } else if supplied_key != expected_key {
        Admission::Reject(RejectReason::InvalidKey)
    } else {
        Admission::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "SomeConnectionKey";

    #[test]
    fn test_accepts_with_free_slot_and_key() {
        assert_eq!(decide(0, 2, KEY, KEY), Admission::Accept);
        assert_eq!(decide(1, 2, KEY, KEY), Admission::Accept);
    }

    #[test]
    fn test_rejects_when_full() {
        assert_eq!(
            decide(2, 2, KEY, KEY),
            Admission::Reject(RejectReason::RoomFull)
        );
        assert_eq!(
            decide(5, 2, KEY, KEY),
            Admission::Reject(RejectReason::RoomFull)
        );
    }

    #[test]
    fn test_rejects_wrong_key() {
        assert_eq!(
            decide(0, 2, "wrong", KEY),
            Admission::Reject(RejectReason::InvalidKey)
        );
        assert!(!decide(0, 2, "", KEY).is_accept());
        assert!(!decide(0, 2, "someconnectionkey", KEY).is_accept());
    }

    #[test]
    fn test_exhaustive_combinations() {
        for size in 0..5 {
            for count in 0..7 {
                for key in [KEY, "other"] {
                    let expected = count < size && key == KEY;
                    assert_eq!(decide(count, size, key, KEY).is_accept(), expected);
                }
            }
        }
    }

    #[test]
    fn test_repeated_accepts_never_exceed_size() {
        let room_size = 4;
        let mut connected = 0;
        for _ in 0..20 {
            if decide(connected, room_size, KEY, KEY).is_accept() {
                connected += 1;
            }
            assert!(connected <= room_size);
        }
        assert_eq!(connected, room_size);
    }
}
