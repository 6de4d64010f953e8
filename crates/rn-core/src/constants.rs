use crate::plan::PlanType;

/// Plan assigned to bootstrapped and overflow networks unless configured otherwise.
pub const DEFAULT_PLAN: PlanType = PlanType {
    first_gen_size: 5,
    multiplier: 4,
};

/// Membership ceiling of a freshly created network.
pub const DEFAULT_MAX_MEMBERS: u32 = 780;

/// Deepest generation scanned by the network-wide position calculator.
pub const DEFAULT_MAX_GENERATION: u32 = 4;

/// Payload of the marker node that replaces a branch revisiting its own path.
pub const CYCLE_MARKER: &str = "cycle detected";

/// Display name for members whose user row carries neither name nor username.
pub const UNKNOWN_NAME: &str = "Unknown";
