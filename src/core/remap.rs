//! Unit-ID remapping: a partial, injective map from client-side to
//! upstream-side Modbus unit IDs, with the inverse applied to replies.

use std::collections::HashMap;

use crate::error::ConfigError;

/// A validated forward map plus its inverse, computed once at construction
/// so the hot path never has to search.
#[derive(Debug, Clone, Default)]
pub struct Remapper {
    forward: HashMap<u8, u8>,
    inverse: HashMap<u8, u8>,
}

impl Remapper {
    /// Build a `Remapper` from a partial map. Fails with
    /// [`ConfigError::NonInjectiveRemap`] if two distinct client IDs would
    /// map to the same upstream ID, since the inverse used on replies would
    /// then be ambiguous.
    pub fn new(forward: HashMap<u8, u8>) -> Result<Self, ConfigError> {
        let mut inverse = HashMap::with_capacity(forward.len());
        for (&client_id, &upstream_id) in &forward {
            if let Some(&existing) = inverse.get(&upstream_id) {
                return Err(ConfigError::NonInjectiveRemap(existing, client_id, upstream_id));
            }
            inverse.insert(upstream_id, client_id);
        }
        Ok(Self { forward, inverse })
    }

    /// Map a client-side unit ID to its upstream-side counterpart. Unit IDs
    /// outside the declared domain pass through unchanged (identity).
    pub fn forward(&self, unit_id: u8) -> u8 {
        self.forward.get(&unit_id).copied().unwrap_or(unit_id)
    }

    /// Map an upstream-side unit ID back to the client-side ID that
    /// produced it. Since `forward` already falls back to identity for
    /// unmapped IDs, the inverse can do the same without tracking which
    /// IDs were actually observed: an upstream ID with no inverse entry
    /// was never the image of a remap, so it must have arrived as an
    /// identity pass-through.
    pub fn inverse(&self, unit_id: u8) -> u8 {
        self.inverse.get(&unit_id).copied().unwrap_or(unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_map_is_empty() {
        let remapper = Remapper::new(HashMap::new()).unwrap();
        assert_eq!(remapper.forward(0x11), 0x11);
        assert_eq!(remapper.inverse(0x11), 0x11);
    }

    #[test]
    fn forward_and_inverse_round_trip() {
        let remapper = Remapper::new(HashMap::from([(0x11, 0x22)])).unwrap();
        assert_eq!(remapper.forward(0x11), 0x22);
        assert_eq!(remapper.inverse(0x22), 0x11);
        // unmapped IDs pass through untouched on both sides
        assert_eq!(remapper.forward(0x01), 0x01);
        assert_eq!(remapper.inverse(0x01), 0x01);
    }

    #[test]
    fn every_injective_map_round_trips_for_every_mapped_id() {
        let forward = HashMap::from([(0x01, 0x10), (0x02, 0x20), (0x03, 0x30)]);
        let remapper = Remapper::new(forward.clone()).unwrap();
        for (&client_id, &upstream_id) in &forward {
            assert_eq!(remapper.inverse(remapper.forward(client_id)), client_id);
            assert_eq!(remapper.forward(client_id), upstream_id);
        }
    }

    #[test]
    fn rejects_a_non_injective_map() {
        let forward = HashMap::from([(0x11, 0x22), (0x13, 0x22)]);
        let err = Remapper::new(forward).unwrap_err();
        assert!(matches!(err, ConfigError::NonInjectiveRemap(_, _, 0x22)));
    }
}
