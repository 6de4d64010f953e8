//! Network-wide next-free-slot lookup against a plan's capacity table.
//!
//! Independent of placement: placement numbers recruits per sponsor, this
//! answers where the next member would go if the network were filled
//! generation by generation.

use crate::error::{NetworkError, Result};
use crate::model::{Membership, Slot};
use crate::plan::PlanType;
use crate::store::MembershipStore;

/// First generation in `1..=max_generation` whose occupancy is below the
/// plan capacity, with the position right after the current occupants.
pub fn next_free_slot(
    memberships: &[Membership],
    plan: &PlanType,
    max_generation: u32,
) -> Option<Slot> {
    (1..=max_generation).find_map(|generation| {
        let occupancy = memberships
            .iter()
            .filter(|m| m.generation == generation)
            .count() as u64;
        if occupancy < plan.capacity(generation) {
            let position_in_generation = u32::try_from(occupancy + 1).ok()?;
            Some(Slot {
                generation,
                position_in_generation,
            })
        } else {
            None
        }
    })
}

/// Parse `plan_type`, load the network's memberships and find the next slot.
///
/// A malformed plan fails before the network is looked up.
pub fn calculate_position<S: MembershipStore>(
    store: &S,
    network_id: &str,
    plan_type: &str,
    max_generation: u32,
) -> Result<Slot> {
    let plan: PlanType = plan_type.parse()?;
    if store.get_network(network_id)?.is_none() {
        return Err(NetworkError::NetworkNotFound(network_id.to_string()));
    }
    let memberships = store.list_memberships(network_id)?;
    next_free_slot(&memberships, &plan, max_generation).ok_or_else(|| {
        NetworkError::PlanExhausted {
            network_id: network_id.to_string(),
            max_generation,
        }
    })
}
