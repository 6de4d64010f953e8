use std::path::Path;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;

use rn_core::{
    Commercial, MembershipStore, Network, NetworkError, NewCommercial, NewUser, Placement,
    PlacementEngine, PlacementPolicy, Slot, TreeNode, User, build_network_tree,
};

use crate::error::{Result, StoreError};
use crate::repo::Repo;
use crate::schema;

/// What a cascading user delete removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeletedUser {
    pub user_id: String,
    pub commercial_id: Option<String>,
    pub networks_removed: usize,
    pub memberships_removed: usize,
}

/// One SQLite connection plus the placement engine that runs against it.
///
/// Every mutating operation is its own `BEGIN IMMEDIATE` transaction, so
/// placements from separate connections (threads or processes) on the same
/// database file are serialized by SQLite's write lock.
pub struct Store {
    conn: Connection,
    engine: PlacementEngine,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            engine: PlacementEngine::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            engine: PlacementEngine::default(),
        })
    }

    pub fn with_policy(mut self, policy: PlacementPolicy) -> Self {
        self.engine = PlacementEngine::new(policy);
        self
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn policy(&self) -> &PlacementPolicy {
        self.engine.policy()
    }

    /// Unwrapped access outside any transaction.
    pub fn repo(&self) -> Repo<'_> {
        Repo::new(&self.conn)
    }

    fn write<T>(&self, f: impl FnOnce(&Repo<'_>) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(&Repo::new(&tx))?;
        tx.commit()?;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&Repo<'_>) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        let value = f(&Repo::new(&tx))?;
        tx.commit()?;
        Ok(value)
    }

    // --- Users and commercials ---

    pub fn create_user(&self, new: NewUser) -> Result<User> {
        let user = self.write(|repo| repo.insert_user(new))?;
        tracing::debug!("created user {} ({})", user.id, user.username);
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.repo().user_by_id(id)
    }

    pub fn create_commercial(&self, new: NewCommercial) -> Result<Commercial> {
        let commercial = self.write(|repo| {
            if repo.user_by_id(&new.user_id)?.is_none() {
                return Err(NetworkError::UserNotFound(new.user_id.clone()).into());
            }
            repo.insert_commercial(new)
        })?;
        tracing::debug!(
            "created commercial {} for user {}",
            commercial.id,
            commercial.user_id
        );
        Ok(commercial)
    }

    /// Remove a user together with everything hanging off it: its commercial,
    /// that commercial's networks and their memberships, and the user's own
    /// seat. Later siblings under the same sponsor move up one position so
    /// the next placement reuses the freed slot. Refused while the user still
    /// sponsors members elsewhere.
    pub fn delete_user(&self, user_id: &str) -> Result<DeletedUser> {
        let deleted = self.write(|repo| {
            if repo.user_by_id(user_id)?.is_none() {
                return Err(NetworkError::UserNotFound(user_id.to_string()).into());
            }

            let mut deleted = DeletedUser {
                user_id: user_id.to_string(),
                ..Default::default()
            };

            if let Some(commercial) = repo.commercial_for_user(user_id)? {
                let (networks, memberships) = repo.delete_commercial_networks(&commercial.id)?;
                repo.delete_commercial_row(&commercial.id)?;
                deleted.networks_removed = networks;
                deleted.memberships_removed = memberships;
                deleted.commercial_id = Some(commercial.id);
            }

            if let Some(own) = repo.get_membership(user_id)? {
                repo.delete_membership(&own.id)?;
                if !own.is_root {
                    let shifted = repo.close_position_gap(&own)?;
                    tracing::debug!("shifted {shifted} later sibling(s) of {user_id}");
                }
                repo.decrement_total_members(&own.network_id)?;
                deleted.memberships_removed += 1;
            }

            let sponsored = repo.count_sponsored(user_id)?;
            if sponsored > 0 {
                return Err(StoreError::Conflict(format!(
                    "user {user_id} still sponsors {sponsored} member(s)"
                )));
            }

            repo.delete_user_row(user_id)?;
            Ok(deleted)
        })?;

        tracing::info!(
            "deleted user {} ({} network(s), {} membership(s))",
            deleted.user_id,
            deleted.networks_removed,
            deleted.memberships_removed
        );
        Ok(deleted)
    }

    // --- Placement ---

    pub fn assign_user(&self, user_id: &str, referral_code: &str) -> Result<Placement> {
        let placement =
            self.write(|repo| Ok(self.engine.assign(repo, user_id, referral_code)?))?;

        if placement.overflowed {
            tracing::warn!(
                "sponsor network full, spawned overflow network {}",
                placement.network_id
            );
        }
        tracing::info!(
            "placed user {user_id} in network {} at generation {} position {}",
            placement.network_id,
            placement.generation,
            placement.position_in_generation
        );
        Ok(placement)
    }

    pub fn create_commercial_network(&self, commercial_id: &str) -> Result<Network> {
        let network =
            self.write(|repo| Ok(self.engine.create_commercial_network(repo, commercial_id)?))?;
        tracing::info!(
            "created network {} for commercial {commercial_id}",
            network.id
        );
        Ok(network)
    }

    // --- Reads ---

    pub fn calculate_position(&self, network_id: &str, plan_type: &str) -> Result<Slot> {
        let max_generation = self.policy().max_generation;
        self.read(|repo| {
            Ok(rn_core::calculate_position(
                repo,
                network_id,
                plan_type,
                max_generation,
            )?)
        })
    }

    pub fn network_tree(&self, user_id: &str) -> Result<Option<TreeNode>> {
        let tree = self.read(|repo| Ok(build_network_tree(repo, user_id)?))?;
        if let Some(cycles) = tree.as_ref().map(TreeNode::cycle_count).filter(|&n| n > 0) {
            tracing::warn!("membership cycle below user {user_id}: {cycles} branch(es) cut");
        }
        Ok(tree)
    }

    pub fn get_network(&self, id: &str) -> Result<Option<Network>> {
        self.repo().network_by_id(id)
    }

    pub fn list_networks(&self) -> Result<Vec<Network>> {
        self.repo().list_networks()
    }
}
