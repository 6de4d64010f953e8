//! Referral network core: capacity model, placement engine, position
//! calculator and tree builder.
//!
//! Members join a capacity-bounded network under a sponsor. Placement numbers
//! each recruit by generation and by position among the sponsor's recruits,
//! spilling into a freshly spawned network when the sponsor's is full. The
//! tree builder turns a network's flat membership rows back into a hierarchy.
//!
//! Zero I/O: every operation runs against a [`MembershipStore`] supplied by
//! the caller, which owns transactions and persistence.

pub mod constants;
pub mod error;
pub mod memory;
pub mod model;
pub mod placement;
pub mod plan;
pub mod position;
pub mod store;
pub mod tree;

pub use constants::{
    CYCLE_MARKER, DEFAULT_MAX_GENERATION, DEFAULT_MAX_MEMBERS, DEFAULT_PLAN, UNKNOWN_NAME,
};
pub use error::{ErrorKind, NetworkError, Result};
pub use memory::MemoryStore;
pub use model::{
    Commercial, Membership, Network, NewCommercial, NewMembership, NewNetwork, NewUser, Placement,
    Slot, User,
};
pub use placement::{PlacementEngine, PlacementPolicy};
pub use plan::{PlanType, default_plan, generation_capacity};
pub use position::{calculate_position, next_free_slot};
pub use store::MembershipStore;
pub use tree::{CycleMarker, MemberNode, NetworkIndex, TreeNode, build_network_tree};
