use std::fmt;

/// Caller-facing classification of a [`NetworkError`].
///
/// Transports map each kind to their own status vocabulary (HTTP status,
/// MCP error code, process exit).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Transient,
    InvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
            ErrorKind::InvariantViolation => "invariant_violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum NetworkError {
    UserNotFound(String),
    /// Carries the referral code that matched nobody.
    SponsorNotFound(String),
    CommercialNotFound(String),
    NetworkNotFound(String),
    AlreadyMember(String),
    SponsorHasNoNetwork(String),
    /// A membership points at a network row that does not exist.
    DanglingMembership { user_id: String, network_id: String },
    InvalidPlanFormat(String),
    /// Every generation up to the configured bound is at capacity.
    PlanExhausted { network_id: String, max_generation: u32 },
    NetworkFull(String),
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl NetworkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::UserNotFound(_)
            | NetworkError::SponsorNotFound(_)
            | NetworkError::CommercialNotFound(_)
            | NetworkError::NetworkNotFound(_) => ErrorKind::NotFound,
            NetworkError::AlreadyMember(_)
            | NetworkError::PlanExhausted { .. }
            | NetworkError::NetworkFull(_) => ErrorKind::Conflict,
            NetworkError::InvalidPlanFormat(_) => ErrorKind::InvalidInput,
            NetworkError::SponsorHasNoNetwork(_) | NetworkError::DanglingMembership { .. } => {
                ErrorKind::InvariantViolation
            }
            NetworkError::Backend(_) => ErrorKind::Transient,
        }
    }

    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NetworkError::Backend(Box::new(err))
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::UserNotFound(id) => write!(f, "user {id} not found"),
            NetworkError::SponsorNotFound(code) => {
                write!(f, "sponsor with referral code {code} not found")
            }
            NetworkError::CommercialNotFound(id) => write!(f, "commercial {id} not found"),
            NetworkError::NetworkNotFound(id) => write!(f, "network {id} not found"),
            NetworkError::AlreadyMember(id) => {
                write!(f, "user {id} is already a member of a network")
            }
            NetworkError::SponsorHasNoNetwork(id) => {
                write!(f, "sponsor {id} does not belong to any network")
            }
            NetworkError::DanglingMembership {
                user_id,
                network_id,
            } => write!(
                f,
                "membership of user {user_id} references missing network {network_id}"
            ),
            NetworkError::InvalidPlanFormat(plan) => write!(
                f,
                "invalid network plan: {plan:?}, expected format 'X:Y' with positive integers"
            ),
            NetworkError::PlanExhausted {
                network_id,
                max_generation,
            } => write!(
                f,
                "network {network_id} has no free slot in generations 1..={max_generation}"
            ),
            NetworkError::NetworkFull(id) => write!(f, "network {id} is at capacity"),
            NetworkError::Backend(e) => write!(f, "store failure: {e}"),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Backend(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
