//! SQL access to users, commercials, networks and memberships.
//!
//! `Repo` borrows a connection (usually a transaction from [`crate::Store`])
//! and implements the core [`MembershipStore`] contract over it.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use rn_core::{
    Commercial, Membership, MembershipStore, Network, NetworkError, NewCommercial, NewMembership,
    NewNetwork, NewUser, PlanType, User,
};

use crate::error::{Result, StoreError};

const USER_COLUMNS: &str = "id, username, name, email, referral_code";
const NETWORK_COLUMNS: &str =
    "id, commercial_id, plan_type, status, total_members, max_members, overflow_of";
const MEMBER_COLUMNS: &str =
    "id, network_id, user_id, sponsor_id, generation, position_in_generation, is_root";
const COMMERCIAL_COLUMNS: &str = "id, user_id, reference, status, country_operation";

/// Bound on `IN (...)` placeholders per statement.
const IN_CHUNK: usize = 500;

pub struct Repo<'c> {
    conn: &'c Connection,
}

struct NetworkRow {
    id: String,
    commercial_id: Option<String>,
    plan_type: String,
    status: String,
    total_members: u32,
    max_members: u32,
    overflow_of: Option<String>,
}

impl NetworkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            commercial_id: row.get(1)?,
            plan_type: row.get(2)?,
            status: row.get(3)?,
            total_members: row.get(4)?,
            max_members: row.get(5)?,
            overflow_of: row.get(6)?,
        })
    }

    fn into_network(self) -> Result<Network> {
        let plan_type: PlanType = self.plan_type.parse().map_err(|_| {
            StoreError::InvalidData(format!(
                "network {} has malformed plan '{}'",
                self.id, self.plan_type
            ))
        })?;
        Ok(Network {
            id: self.id,
            commercial_id: self.commercial_id,
            plan_type,
            status: self.status,
            total_members: self.total_members,
            max_members: self.max_members,
            overflow_of: self.overflow_of,
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        referral_code: row.get(4)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: row.get(0)?,
        network_id: row.get(1)?,
        user_id: row.get(2)?,
        sponsor_id: row.get(3)?,
        generation: row.get(4)?,
        position_in_generation: row.get(5)?,
        is_root: row.get::<_, i32>(6)? != 0,
    })
}

fn commercial_from_row(row: &Row<'_>) -> rusqlite::Result<Commercial> {
    Ok(Commercial {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reference: row.get(2)?,
        status: row.get(3)?,
        country_operation: row.get(4)?,
    })
}

fn new_id(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl<'c> Repo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // --- Users ---

    pub fn insert_user(&self, new: NewUser) -> Result<User> {
        let user = User {
            id: new_id(new.id),
            username: new.username,
            name: new.name,
            email: new.email,
            referral_code: new.referral_code,
        };
        self.conn.execute(
            "INSERT INTO users (id, username, name, email, referral_code) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.id, user.username, user.name, user.email, user.referral_code],
        )?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], user_from_row).optional()?)
    }

    fn users_by_ids(&self, ids: &[&str]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ({placeholders})");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            users.extend(rows);
        }
        Ok(users)
    }

    fn user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = ?1");
        Ok(self.conn.query_row(&sql, [code], user_from_row).optional()?)
    }

    pub fn delete_user_row(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- Commercials ---

    pub fn insert_commercial(&self, new: NewCommercial) -> Result<Commercial> {
        let commercial = Commercial {
            id: new_id(new.id),
            user_id: new.user_id,
            reference: new.reference,
            status: "Active".to_string(),
            country_operation: new.country_operation,
        };
        self.conn.execute(
            "INSERT INTO commercials (id, user_id, reference, status, country_operation)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                commercial.id,
                commercial.user_id,
                commercial.reference,
                commercial.status,
                commercial.country_operation,
            ],
        )?;
        Ok(commercial)
    }

    pub fn commercial_by_id(&self, id: &str) -> Result<Option<Commercial>> {
        let sql = format!("SELECT {COMMERCIAL_COLUMNS} FROM commercials WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], commercial_from_row)
            .optional()?)
    }

    pub fn commercial_for_user(&self, user_id: &str) -> Result<Option<Commercial>> {
        let sql = format!("SELECT {COMMERCIAL_COLUMNS} FROM commercials WHERE user_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [user_id], commercial_from_row)
            .optional()?)
    }

    fn head_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT c.user_id FROM commercials c
             JOIN networks n ON n.commercial_id = c.id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Delete a commercial's networks and every membership inside them.
    /// Returns `(networks_removed, memberships_removed)`.
    pub fn delete_commercial_networks(&self, commercial_id: &str) -> Result<(usize, usize)> {
        let memberships = self.conn.execute(
            "DELETE FROM network_members
             WHERE network_id IN (SELECT id FROM networks WHERE commercial_id = ?1)",
            [commercial_id],
        )?;
        self.conn.execute(
            "UPDATE networks SET overflow_of = NULL
             WHERE overflow_of IN (SELECT id FROM networks WHERE commercial_id = ?1)",
            [commercial_id],
        )?;
        let networks = self
            .conn
            .execute("DELETE FROM networks WHERE commercial_id = ?1", [commercial_id])?;
        Ok((networks, memberships))
    }

    pub fn delete_commercial_row(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM commercials WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- Networks ---

    pub fn network_by_id(&self, id: &str) -> Result<Option<Network>> {
        let sql = format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], NetworkRow::from_row)
            .optional()?
            .map(NetworkRow::into_network)
            .transpose()
    }

    pub fn list_networks(&self) -> Result<Vec<Network>> {
        let sql = format!("SELECT {NETWORK_COLUMNS} FROM networks ORDER BY rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], NetworkRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(NetworkRow::into_network).collect()
    }

    fn insert_network(&self, new: NewNetwork) -> Result<Network> {
        let network = Network {
            id: new_id(None),
            commercial_id: new.commercial_id,
            plan_type: new.plan_type,
            status: "Active".to_string(),
            total_members: new.total_members,
            max_members: new.max_members,
            overflow_of: new.overflow_of,
        };
        self.conn.execute(
            "INSERT INTO networks (id, commercial_id, plan_type, status, total_members, max_members, overflow_of)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                network.id,
                network.commercial_id,
                network.plan_type.to_string(),
                network.status,
                network.total_members,
                network.max_members,
                network.overflow_of,
            ],
        )?;
        Ok(network)
    }

    fn bump_total_members(&self, network_id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE networks SET total_members = total_members + 1, updated_at = datetime('now')
             WHERE id = ?1 AND total_members < max_members",
            [network_id],
        )?;
        if rows == 0 {
            return Err(match self.network_by_id(network_id)? {
                Some(_) => NetworkError::NetworkFull(network_id.to_string()).into(),
                None => NetworkError::NetworkNotFound(network_id.to_string()).into(),
            });
        }
        Ok(())
    }

    pub fn decrement_total_members(&self, network_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE networks SET total_members = total_members - 1, updated_at = datetime('now')
             WHERE id = ?1 AND total_members > 0",
            [network_id],
        )?;
        Ok(())
    }

    // --- Memberships ---

    fn membership_for_user(&self, user_id: &str) -> Result<Option<Membership>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM network_members WHERE user_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [user_id], membership_from_row)
            .optional()?)
    }

    fn memberships_of(&self, network_id: &str) -> Result<Vec<Membership>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM network_members WHERE network_id = ?1 ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([network_id], membership_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_recruits(&self, network_id: &str, sponsor_id: &str, generation: u32) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM network_members
             WHERE network_id = ?1 AND sponsor_id = ?2 AND generation = ?3",
            params![network_id, sponsor_id, generation],
            |row| row.get(0),
        )?)
    }

    fn insert_membership(&self, new: NewMembership) -> Result<Membership> {
        let membership = Membership {
            id: new_id(None),
            network_id: new.network_id,
            user_id: new.user_id,
            sponsor_id: new.sponsor_id,
            generation: new.generation,
            position_in_generation: new.position_in_generation,
            is_root: new.is_root,
        };
        self.conn.execute(
            "INSERT INTO network_members
             (id, network_id, user_id, sponsor_id, generation, position_in_generation, is_root)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                membership.id,
                membership.network_id,
                membership.user_id,
                membership.sponsor_id,
                membership.generation,
                membership.position_in_generation,
                membership.is_root as i32,
            ],
        )?;
        Ok(membership)
    }

    /// Memberships other than the user's own seat that name `user_id` as sponsor.
    pub fn count_sponsored(&self, user_id: &str) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM network_members WHERE sponsor_id = ?1 AND user_id != ?1",
            [user_id],
            |row| row.get(0),
        )?)
    }

    pub fn delete_membership(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM network_members WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Shift later siblings of a vacated seat down by one so a sponsor's
    /// positions stay dense (`1..=n`). Rows move in ascending order, so each
    /// update lands on a position the previous one just freed.
    pub fn close_position_gap(&self, vacated: &Membership) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM network_members
             WHERE network_id = ?1 AND sponsor_id = ?2 AND generation = ?3
               AND position_in_generation > ?4 AND is_root = 0
             ORDER BY position_in_generation ASC",
        )?;
        let later = stmt
            .query_map(
                params![
                    vacated.network_id,
                    vacated.sponsor_id,
                    vacated.generation,
                    vacated.position_in_generation
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for id in &later {
            self.conn.execute(
                "UPDATE network_members SET position_in_generation = position_in_generation - 1
                 WHERE id = ?1",
                [id],
            )?;
        }
        Ok(later.len())
    }
}

impl MembershipStore for Repo<'_> {
    fn get_user(&self, id: &str) -> rn_core::Result<Option<User>> {
        Ok(self.user_by_id(id)?)
    }

    fn get_users(&self, ids: &[&str]) -> rn_core::Result<Vec<User>> {
        Ok(self.users_by_ids(ids)?)
    }

    fn find_user_by_referral_code(&self, code: &str) -> rn_core::Result<Option<User>> {
        Ok(self.user_by_referral_code(code)?)
    }

    fn get_commercial(&self, id: &str) -> rn_core::Result<Option<Commercial>> {
        Ok(self.commercial_by_id(id)?)
    }

    fn head_user_ids(&self) -> rn_core::Result<HashSet<String>> {
        Ok(self.head_ids()?)
    }

    fn get_membership(&self, user_id: &str) -> rn_core::Result<Option<Membership>> {
        Ok(self.membership_for_user(user_id)?)
    }

    fn count_memberships(
        &self,
        network_id: &str,
        sponsor_id: &str,
        generation: u32,
    ) -> rn_core::Result<u32> {
        Ok(self.count_recruits(network_id, sponsor_id, generation)?)
    }

    fn list_memberships(&self, network_id: &str) -> rn_core::Result<Vec<Membership>> {
        Ok(self.memberships_of(network_id)?)
    }

    fn get_network(&self, id: &str) -> rn_core::Result<Option<Network>> {
        Ok(self.network_by_id(id)?)
    }

    fn create_network(&self, network: NewNetwork) -> rn_core::Result<Network> {
        Ok(self.insert_network(network)?)
    }

    fn increment_total_members(&self, network_id: &str) -> rn_core::Result<()> {
        Ok(self.bump_total_members(network_id)?)
    }

    fn create_membership(&self, membership: NewMembership) -> rn_core::Result<Membership> {
        Ok(self.insert_membership(membership)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn
    }

    fn network(repo: &Repo<'_>, max_members: u32) -> Network {
        repo.create_network(NewNetwork {
            commercial_id: None,
            plan_type: PlanType::default(),
            total_members: 0,
            max_members,
            overflow_of: None,
        })
        .unwrap()
    }

    #[test]
    fn test_user_lookups() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let alice = repo
            .insert_user(NewUser {
                username: "alice".into(),
                referral_code: Some("ALICE".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(repo.get_user(&alice.id).unwrap(), Some(alice.clone()));
        assert_eq!(
            repo.find_user_by_referral_code("ALICE").unwrap(),
            Some(alice.clone())
        );
        assert!(repo.find_user_by_referral_code("BOB").unwrap().is_none());
        assert!(repo.get_user("nobody").unwrap().is_none());

        let found = repo.get_users(&[alice.id.as_str(), "nobody"]).unwrap();
        assert_eq!(found, vec![alice]);
    }

    #[test]
    fn test_get_users_many_ids() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let ids: Vec<String> = (0..1200)
            .map(|i| {
                repo.insert_user(NewUser {
                    username: format!("user{i}"),
                    ..Default::default()
                })
                .unwrap()
                .id
            })
            .collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(repo.get_users(&refs).unwrap().len(), 1200);
    }

    #[test]
    fn test_duplicate_referral_code_rejected() {
        let conn = conn();
        let repo = Repo::new(&conn);
        for name in ["a", "b"] {
            let result = repo.insert_user(NewUser {
                username: name.into(),
                referral_code: Some("SAME".into()),
                ..Default::default()
            });
            if name == "b" {
                let err = result.unwrap_err();
                assert_eq!(err.kind(), rn_core::ErrorKind::Conflict);
            }
        }
    }

    #[test]
    fn test_increment_guarded_by_ceiling() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let net = network(&repo, 2);

        repo.increment_total_members(&net.id).unwrap();
        repo.increment_total_members(&net.id).unwrap();
        let err = repo.increment_total_members(&net.id).unwrap_err();
        assert!(matches!(err, NetworkError::NetworkFull(_)));

        let err = repo.increment_total_members("ghost").unwrap_err();
        assert!(matches!(err, NetworkError::NetworkNotFound(_)));

        assert_eq!(repo.get_network(&net.id).unwrap().unwrap().total_members, 2);
    }

    #[test]
    fn test_membership_counts_and_order() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let net = network(&repo, 780);
        let mut ids = Vec::new();
        for name in ["s", "a", "b", "c"] {
            ids.push(
                repo.insert_user(NewUser {
                    username: name.into(),
                    ..Default::default()
                })
                .unwrap()
                .id,
            );
        }
        let sponsor = &ids[0];
        for (i, user) in ids[1..].iter().enumerate() {
            repo.create_membership(NewMembership {
                network_id: net.id.clone(),
                user_id: user.clone(),
                sponsor_id: sponsor.clone(),
                generation: 2,
                position_in_generation: i as u32 + 1,
                is_root: false,
            })
            .unwrap();
        }

        assert_eq!(repo.count_memberships(&net.id, sponsor, 2).unwrap(), 3);
        assert_eq!(repo.count_memberships(&net.id, sponsor, 3).unwrap(), 0);
        let listed: Vec<String> = repo
            .list_memberships(&net.id)
            .unwrap()
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        assert_eq!(listed, ids[1..].to_vec());
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let net = network(&repo, 780);
        let users: Vec<String> = ["s", "a", "b"]
            .iter()
            .map(|n| {
                repo.insert_user(NewUser {
                    username: (*n).into(),
                    ..Default::default()
                })
                .unwrap()
                .id
            })
            .collect();
        let seat = |user: &str| NewMembership {
            network_id: net.id.clone(),
            user_id: user.to_string(),
            sponsor_id: users[0].clone(),
            generation: 2,
            position_in_generation: 1,
            is_root: false,
        };
        repo.create_membership(seat(&users[1])).unwrap();
        let err: StoreError = repo.create_membership(seat(&users[2])).unwrap_err().into();
        assert_eq!(err.kind(), rn_core::ErrorKind::Conflict);
    }

    #[test]
    fn test_close_position_gap_shifts_later_siblings() {
        let conn = conn();
        let repo = Repo::new(&conn);
        let net = network(&repo, 780);
        let ids: Vec<String> = ["s", "a", "b", "c"]
            .iter()
            .map(|n| {
                repo.insert_user(NewUser {
                    username: (*n).into(),
                    ..Default::default()
                })
                .unwrap()
                .id
            })
            .collect();
        let seats: Vec<Membership> = ids[1..]
            .iter()
            .enumerate()
            .map(|(i, user)| {
                repo.insert_membership(NewMembership {
                    network_id: net.id.clone(),
                    user_id: user.clone(),
                    sponsor_id: ids[0].clone(),
                    generation: 2,
                    position_in_generation: i as u32 + 1,
                    is_root: false,
                })
                .unwrap()
            })
            .collect();

        repo.delete_membership(&seats[0].id).unwrap();
        assert_eq!(repo.close_position_gap(&seats[0]).unwrap(), 2);

        let positions: Vec<(String, u32)> = repo
            .memberships_of(&net.id)
            .unwrap()
            .into_iter()
            .map(|m| (m.user_id, m.position_in_generation))
            .collect();
        assert_eq!(
            positions,
            vec![(ids[2].clone(), 1), (ids[3].clone(), 2)]
        );
        assert_eq!(repo.count_recruits(&net.id, &ids[0], 2).unwrap(), 2);
    }

    #[test]
    fn test_malformed_plan_row_is_invalid_data() {
        let conn = conn();
        conn.execute(
            "INSERT INTO networks (id, plan_type) VALUES ('bad', 'garbage')",
            [],
        )
        .unwrap();
        let repo = Repo::new(&conn);
        let err = repo.network_by_id("bad").unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }
}
