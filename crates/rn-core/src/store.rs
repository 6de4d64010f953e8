//! The membership store contract the placement engine and tree builder run against.
//!
//! Implementations decide the transaction boundary. Placement and bootstrap
//! must be called with a store whose writes commit or roll back together and
//! which serializes concurrent placements (see `rn-store` for the SQLite one).

use std::collections::HashSet;

use crate::error::Result;
use crate::model::{Commercial, Membership, Network, NewMembership, NewNetwork, User};

pub trait MembershipStore {
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    fn get_users(&self, ids: &[&str]) -> Result<Vec<User>>;

    fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>>;

    fn get_commercial(&self, id: &str) -> Result<Option<Commercial>>;

    /// User ids of commercials that own at least one network.
    fn head_user_ids(&self) -> Result<HashSet<String>>;

    fn get_membership(&self, user_id: &str) -> Result<Option<Membership>>;

    fn count_memberships(&self, network_id: &str, sponsor_id: &str, generation: u32)
    -> Result<u32>;

    /// Every membership of a network, in insertion order.
    fn list_memberships(&self, network_id: &str) -> Result<Vec<Membership>>;

    fn get_network(&self, id: &str) -> Result<Option<Network>>;

    fn create_network(&self, network: NewNetwork) -> Result<Network>;

    /// Atomically bumps `total_members`; fails with `NetworkFull` at the ceiling.
    fn increment_total_members(&self, network_id: &str) -> Result<()>;

    fn create_membership(&self, membership: NewMembership) -> Result<Membership>;
}
