use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_NAME;
use crate::plan::PlanType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Code handed out to recruits; the sponsor lookup key during placement.
    pub referral_code: Option<String>,
}

impl User {
    /// Name shown in trees: `name`, else `username`, else "Unknown".
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(Some(self.username.as_str()).filter(|n| !n.is_empty()))
            .unwrap_or(UNKNOWN_NAME)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewUser {
    /// Explicit id; a v4 UUID is generated when absent.
    pub id: Option<String>,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub referral_code: Option<String>,
}

/// The network-originator role attached to exactly one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commercial {
    pub id: String,
    pub user_id: String,
    pub reference: String,
    pub status: String,
    pub country_operation: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct NewCommercial {
    pub id: Option<String>,
    pub user_id: String,
    pub reference: String,
    pub country_operation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub commercial_id: Option<String>,
    pub plan_type: PlanType,
    pub status: String,
    pub total_members: u32,
    pub max_members: u32,
    /// Set on networks spawned because this one filled up.
    pub overflow_of: Option<String>,
}

impl Network {
    pub fn is_full(&self) -> bool {
        self.total_members >= self.max_members
    }
}

#[derive(Clone, Debug)]
pub struct NewNetwork {
    pub commercial_id: Option<String>,
    pub plan_type: PlanType,
    pub total_members: u32,
    pub max_members: u32,
    pub overflow_of: Option<String>,
}

/// Edge tying a user to a network under a sponsor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub network_id: String,
    pub user_id: String,
    pub sponsor_id: String,
    pub generation: u32,
    pub position_in_generation: u32,
    /// The commercial's own seat: it sponsors itself and heads the tree.
    pub is_root: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMembership {
    pub network_id: String,
    pub user_id: String,
    pub sponsor_id: String,
    pub generation: u32,
    pub position_in_generation: u32,
    pub is_root: bool,
}

/// Outcome of a successful sponsor-relative placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub network_id: String,
    pub generation: u32,
    pub position_in_generation: u32,
    /// True when the sponsor's network was full and a new one was spawned.
    pub overflowed: bool,
}

/// Next free slot in a network's plan capacity table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub generation: u32,
    pub position_in_generation: u32,
}
