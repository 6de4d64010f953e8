//! In-memory [`MembershipStore`] for tests and embedding.
//!
//! Single-threaded and non-transactional: a failed placement may leave
//! partial writes behind, so it is not a substitute for a real store under
//! concurrent load.

use std::cell::RefCell;
use std::collections::HashSet;

use uuid::Uuid;

use crate::error::{NetworkError, Result};
use crate::model::{
    Commercial, Membership, Network, NewCommercial, NewMembership, NewNetwork, NewUser, User,
};
use crate::store::MembershipStore;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    commercials: Vec<Commercial>,
    networks: Vec<Network>,
    memberships: Vec<Membership>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<Tables>,
}

fn new_id(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, new: NewUser) -> User {
        let user = User {
            id: new_id(new.id),
            username: new.username,
            name: new.name,
            email: new.email,
            referral_code: new.referral_code,
        };
        self.tables.borrow_mut().users.push(user.clone());
        user
    }

    pub fn add_commercial(&self, new: NewCommercial) -> Commercial {
        let commercial = Commercial {
            id: new_id(new.id),
            user_id: new.user_id,
            reference: new.reference,
            status: "Active".to_string(),
            country_operation: new.country_operation,
        };
        self.tables
            .borrow_mut()
            .commercials
            .push(commercial.clone());
        commercial
    }

    /// Insert a membership row verbatim, bypassing placement. Lets tests
    /// build shapes placement never produces, such as sponsor cycles.
    pub fn insert_membership(&self, membership: Membership) {
        self.tables.borrow_mut().memberships.push(membership);
    }

    pub fn membership_count(&self) -> usize {
        self.tables.borrow().memberships.len()
    }

    pub fn networks(&self) -> Vec<Network> {
        self.tables.borrow().networks.clone()
    }
}

impl MembershipStore for MemoryStore {
    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .borrow()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    fn get_users(&self, ids: &[&str]) -> Result<Vec<User>> {
        let wanted: HashSet<&str> = ids.iter().copied().collect();
        Ok(self
            .tables
            .borrow()
            .users
            .iter()
            .filter(|u| wanted.contains(u.id.as_str()))
            .cloned()
            .collect())
    }

    fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .borrow()
            .users
            .iter()
            .find(|u| u.referral_code.as_deref() == Some(code))
            .cloned())
    }

    fn get_commercial(&self, id: &str) -> Result<Option<Commercial>> {
        Ok(self
            .tables
            .borrow()
            .commercials
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn head_user_ids(&self) -> Result<HashSet<String>> {
        let tables = self.tables.borrow();
        Ok(tables
            .commercials
            .iter()
            .filter(|c| {
                tables
                    .networks
                    .iter()
                    .any(|n| n.commercial_id.as_deref() == Some(c.id.as_str()))
            })
            .map(|c| c.user_id.clone())
            .collect())
    }

    fn get_membership(&self, user_id: &str) -> Result<Option<Membership>> {
        Ok(self
            .tables
            .borrow()
            .memberships
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned())
    }

    fn count_memberships(
        &self,
        network_id: &str,
        sponsor_id: &str,
        generation: u32,
    ) -> Result<u32> {
        let count = self
            .tables
            .borrow()
            .memberships
            .iter()
            .filter(|m| {
                m.network_id == network_id && m.sponsor_id == sponsor_id && m.generation == generation
            })
            .count();
        u32::try_from(count).map_err(NetworkError::backend)
    }

    fn list_memberships(&self, network_id: &str) -> Result<Vec<Membership>> {
        Ok(self
            .tables
            .borrow()
            .memberships
            .iter()
            .filter(|m| m.network_id == network_id)
            .cloned()
            .collect())
    }

    fn get_network(&self, id: &str) -> Result<Option<Network>> {
        Ok(self
            .tables
            .borrow()
            .networks
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    fn create_network(&self, new: NewNetwork) -> Result<Network> {
        let network = Network {
            id: new_id(None),
            commercial_id: new.commercial_id,
            plan_type: new.plan_type,
            status: "Active".to_string(),
            total_members: new.total_members,
            max_members: new.max_members,
            overflow_of: new.overflow_of,
        };
        self.tables.borrow_mut().networks.push(network.clone());
        Ok(network)
    }

    fn increment_total_members(&self, network_id: &str) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        let network = tables
            .networks
            .iter_mut()
            .find(|n| n.id == network_id)
            .ok_or_else(|| NetworkError::NetworkNotFound(network_id.to_string()))?;
        if network.is_full() {
            return Err(NetworkError::NetworkFull(network_id.to_string()));
        }
        network.total_members += 1;
        Ok(())
    }

    fn create_membership(&self, new: NewMembership) -> Result<Membership> {
        let mut tables = self.tables.borrow_mut();
        if tables.memberships.iter().any(|m| m.user_id == new.user_id) {
            return Err(NetworkError::AlreadyMember(new.user_id));
        }
        let membership = Membership {
            id: new_id(None),
            network_id: new.network_id,
            user_id: new.user_id,
            sponsor_id: new.sponsor_id,
            generation: new.generation,
            position_in_generation: new.position_in_generation,
            is_root: new.is_root,
        };
        tables.memberships.push(membership.clone());
        Ok(membership)
    }
}
