//! Placement engine: sponsor-relative assignment of new members, overflow to
//! fresh networks, and the commercial network bootstrap.

use crate::constants::{DEFAULT_MAX_GENERATION, DEFAULT_MAX_MEMBERS};
use crate::error::{NetworkError, Result};
use crate::model::{Network, NewMembership, NewNetwork, Placement};
use crate::plan::{PlanType, default_plan};
use crate::store::MembershipStore;

/// Tunables shared by placement, bootstrap and the position calculator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Plan given to bootstrapped and overflow networks.
    pub default_plan: PlanType,
    /// Ceiling given to newly created networks.
    pub max_members: u32,
    /// Deepest generation the network-wide position scan considers.
    pub max_generation: u32,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            default_plan: default_plan(),
            max_members: DEFAULT_MAX_MEMBERS,
            max_generation: DEFAULT_MAX_GENERATION,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlacementEngine {
    policy: PlacementPolicy,
}

impl PlacementEngine {
    pub fn new(policy: PlacementPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PlacementPolicy {
        &self.policy
    }

    /// Place `user_id` under the user whose referral code is `referral_code`.
    ///
    /// The new member lands one generation below its sponsor, at the next
    /// position among the sponsor's recruits of that generation. When the
    /// sponsor's network is at its ceiling a new network is spawned for the
    /// same commercial and the member is placed relative to that empty
    /// network (the sponsor has no seat there, so it counts as generation 0).
    ///
    /// `store` must be a write transaction that serializes placements; every
    /// error leaves nothing behind once the caller rolls back.
    pub fn assign<S: MembershipStore>(
        &self,
        store: &S,
        user_id: &str,
        referral_code: &str,
    ) -> Result<Placement> {
        let user = store
            .get_user(user_id)?
            .ok_or_else(|| NetworkError::UserNotFound(user_id.to_string()))?;

        if store.get_membership(&user.id)?.is_some() {
            return Err(NetworkError::AlreadyMember(user.id));
        }

        let sponsor = store
            .find_user_by_referral_code(referral_code)?
            .ok_or_else(|| NetworkError::SponsorNotFound(referral_code.to_string()))?;

        let sponsor_membership = store
            .get_membership(&sponsor.id)?
            .ok_or_else(|| NetworkError::SponsorHasNoNetwork(sponsor.id.clone()))?;

        let sponsor_network = store
            .get_network(&sponsor_membership.network_id)?
            .ok_or_else(|| NetworkError::DanglingMembership {
                user_id: sponsor.id.clone(),
                network_id: sponsor_membership.network_id.clone(),
            })?;

        let (target, sponsor_generation, overflowed) = if sponsor_network.is_full() {
            let spawned = self.spawn_overflow(store, &sponsor_network)?;
            (spawned, 0, true)
        } else {
            (sponsor_network, sponsor_membership.generation, false)
        };

        let generation = sponsor_generation + 1;
        let position_in_generation =
            store.count_memberships(&target.id, &sponsor.id, generation)? + 1;

        store.create_membership(NewMembership {
            network_id: target.id.clone(),
            user_id: user.id,
            sponsor_id: sponsor.id,
            generation,
            position_in_generation,
            is_root: false,
        })?;
        store.increment_total_members(&target.id)?;

        Ok(Placement {
            network_id: target.id,
            generation,
            position_in_generation,
            overflowed,
        })
    }

    fn spawn_overflow<S: MembershipStore>(&self, store: &S, full: &Network) -> Result<Network> {
        store.create_network(NewNetwork {
            commercial_id: full.commercial_id.clone(),
            plan_type: self.policy.default_plan,
            total_members: 0,
            max_members: self.policy.max_members,
            overflow_of: Some(full.id.clone()),
        })
    }

    /// Create a network for `commercial_id` and seat the commercial's user as
    /// its self-sponsored root at generation 1, position 1.
    pub fn create_commercial_network<S: MembershipStore>(
        &self,
        store: &S,
        commercial_id: &str,
    ) -> Result<Network> {
        let commercial = store
            .get_commercial(commercial_id)?
            .ok_or_else(|| NetworkError::CommercialNotFound(commercial_id.to_string()))?;

        if store.get_membership(&commercial.user_id)?.is_some() {
            return Err(NetworkError::AlreadyMember(commercial.user_id));
        }

        let network = store.create_network(NewNetwork {
            commercial_id: Some(commercial.id),
            plan_type: self.policy.default_plan,
            total_members: 1,
            max_members: self.policy.max_members,
            overflow_of: None,
        })?;

        store.create_membership(NewMembership {
            network_id: network.id.clone(),
            user_id: commercial.user_id.clone(),
            sponsor_id: commercial.user_id,
            generation: 1,
            position_in_generation: 1,
            is_root: true,
        })?;

        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{NewCommercial, NewUser};

    fn seeded() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let boss = store.add_user(NewUser {
            id: Some("boss".into()),
            username: "boss".into(),
            referral_code: Some("BOSS".into()),
            ..Default::default()
        });
        let commercial = store.add_commercial(NewCommercial {
            id: Some("c1".into()),
            user_id: boss.id,
            reference: "REF-1".into(),
            ..Default::default()
        });
        let network = PlacementEngine::default()
            .create_commercial_network(&store, &commercial.id)
            .unwrap();
        (store, network.id)
    }

    fn add_user(store: &MemoryStore, id: &str, code: Option<&str>) {
        store.add_user(NewUser {
            id: Some(id.into()),
            username: id.into(),
            referral_code: code.map(String::from),
            ..Default::default()
        });
    }

    #[test]
    fn test_bootstrap_seats_root() {
        let (store, network_id) = seeded();
        let network = store.get_network(&network_id).unwrap().unwrap();
        assert_eq!(network.total_members, 1);
        assert_eq!(network.commercial_id.as_deref(), Some("c1"));
        assert_eq!(network.plan_type.to_string(), "5:4");

        let root = store.get_membership("boss").unwrap().unwrap();
        assert!(root.is_root);
        assert_eq!(root.sponsor_id, "boss");
        assert_eq!((root.generation, root.position_in_generation), (1, 1));
    }

    #[test]
    fn test_bootstrap_unknown_commercial() {
        let store = MemoryStore::new();
        let err = PlacementEngine::default()
            .create_commercial_network(&store, "invalid-id")
            .unwrap_err();
        assert!(matches!(err, NetworkError::CommercialNotFound(_)));
    }

    #[test]
    fn test_bootstrap_twice_conflicts() {
        let (store, _) = seeded();
        let err = PlacementEngine::default()
            .create_commercial_network(&store, "c1")
            .unwrap_err();
        assert!(matches!(err, NetworkError::AlreadyMember(_)));
    }

    #[test]
    fn test_assign_under_root() {
        let (store, network_id) = seeded();
        let engine = PlacementEngine::default();

        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            add_user(&store, id, None);
            let placed = engine.assign(&store, id, "BOSS").unwrap();
            assert_eq!(placed.network_id, network_id);
            assert_eq!(placed.generation, 2);
            assert_eq!(placed.position_in_generation, i as u32 + 1);
            assert!(!placed.overflowed);
        }

        let network = store.get_network(&network_id).unwrap().unwrap();
        assert_eq!(network.total_members, 4);
    }

    #[test]
    fn test_positions_are_per_sponsor() {
        let (store, _) = seeded();
        let engine = PlacementEngine::default();
        add_user(&store, "a", Some("A"));
        add_user(&store, "b", Some("B"));
        engine.assign(&store, "a", "BOSS").unwrap();
        engine.assign(&store, "b", "BOSS").unwrap();

        add_user(&store, "a1", None);
        add_user(&store, "b1", None);
        add_user(&store, "a2", None);
        let a1 = engine.assign(&store, "a1", "A").unwrap();
        let b1 = engine.assign(&store, "b1", "B").unwrap();
        let a2 = engine.assign(&store, "a2", "A").unwrap();

        assert_eq!((a1.generation, a1.position_in_generation), (3, 1));
        assert_eq!((b1.generation, b1.position_in_generation), (3, 1));
        assert_eq!((a2.generation, a2.position_in_generation), (3, 2));
    }

    #[test]
    fn test_missing_user() {
        let (store, _) = seeded();
        let err = PlacementEngine::default()
            .assign(&store, "missing-id", "ABC123")
            .unwrap_err();
        assert!(matches!(err, NetworkError::UserNotFound(ref id) if id == "missing-id"));
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_sponsor() {
        let (store, _) = seeded();
        add_user(&store, "a", None);
        let err = PlacementEngine::default()
            .assign(&store, "a", "NOPE")
            .unwrap_err();
        assert!(matches!(err, NetworkError::SponsorNotFound(ref c) if c == "NOPE"));
    }

    #[test]
    fn test_member_conflicts_regardless_of_code() {
        let (store, _) = seeded();
        let engine = PlacementEngine::default();
        add_user(&store, "a", None);
        engine.assign(&store, "a", "BOSS").unwrap();

        for code in ["BOSS", "NOPE"] {
            let err = engine.assign(&store, "a", code).unwrap_err();
            assert!(matches!(err, NetworkError::AlreadyMember(_)), "code {code}: {err}");
        }
        assert_eq!(store.membership_count(), 2);
    }

    #[test]
    fn test_sponsor_without_network() {
        let (store, _) = seeded();
        add_user(&store, "loner", Some("LONER"));
        add_user(&store, "a", None);
        let err = PlacementEngine::default()
            .assign(&store, "a", "LONER")
            .unwrap_err();
        assert!(matches!(err, NetworkError::SponsorHasNoNetwork(ref s) if s == "loner"));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_overflow_spawns_network() {
        let store = MemoryStore::new();
        add_user(&store, "boss", Some("BOSS"));
        let commercial = store.add_commercial(NewCommercial {
            id: Some("c1".into()),
            user_id: "boss".into(),
            reference: "R".into(),
            ..Default::default()
        });
        let engine = PlacementEngine::new(PlacementPolicy {
            max_members: 3,
            ..Default::default()
        });
        let original = engine
            .create_commercial_network(&store, &commercial.id)
            .unwrap();

        for id in ["a", "b"] {
            add_user(&store, id, None);
            engine.assign(&store, id, "BOSS").unwrap();
        }
        assert!(store.get_network(&original.id).unwrap().unwrap().is_full());

        add_user(&store, "c", None);
        let placed = engine.assign(&store, "c", "BOSS").unwrap();
        assert!(placed.overflowed);
        assert_ne!(placed.network_id, original.id);
        assert_eq!((placed.generation, placed.position_in_generation), (1, 1));

        let spawned = store.get_network(&placed.network_id).unwrap().unwrap();
        assert_eq!(spawned.total_members, 1);
        assert_eq!(spawned.commercial_id.as_deref(), Some("c1"));
        assert_eq!(spawned.overflow_of.as_deref(), Some(original.id.as_str()));

        let full = store.get_network(&original.id).unwrap().unwrap();
        assert_eq!(full.total_members, 3);
    }

    #[test]
    fn test_dangling_sponsor_membership() {
        let store = MemoryStore::new();
        add_user(&store, "s", Some("S"));
        add_user(&store, "a", None);
        store
            .create_membership(NewMembership {
                network_id: "ghost".into(),
                user_id: "s".into(),
                sponsor_id: "s".into(),
                generation: 1,
                position_in_generation: 1,
                is_root: true,
            })
            .unwrap();
        let err = PlacementEngine::default()
            .assign(&store, "a", "S")
            .unwrap_err();
        assert!(matches!(err, NetworkError::DanglingMembership { .. }));
    }
}
