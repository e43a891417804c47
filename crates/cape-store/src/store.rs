use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use cape_core::{
    GroupId, LevelId, ObjectId, SecurityGroup, SecurityLevel, SecurityObject, TokenId, TokenSetId,
    effective_set, signature_of,
};

use crate::error::{Result, StoreError, is_unique_violation};
use crate::schema;

/// Row counts per relation, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub tokens: i64,
    pub token_sets: i64,
    pub groups: i64,
    pub levels: i64,
    pub objects: i64,
}

/// The label engine over one SQLite connection.
///
/// Every find-or-create runs inside a transaction on this connection, so
/// two callers racing on the same content signature serialize here rather
/// than both inserting. Uniqueness of token values, group names and object
/// uuids is additionally enforced by the schema.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Token interner ---

    /// Intern a token value: returns the existing id or inserts a new row.
    /// Idempotent; concurrency-safe via the uniqueness constraint.
    pub fn intern_token(&self, value: &str) -> Result<TokenId> {
        self.conn.execute(
            "INSERT INTO tokens (value) VALUES (?1) ON CONFLICT(value) DO NOTHING",
            [value],
        )?;
        let id: i64 =
            self.conn
                .query_row("SELECT id FROM tokens WHERE value = ?1", [value], |row| {
                    row.get(0)
                })?;
        Ok(TokenId(id))
    }

    /// Intern a batch of values, deduplicating as it goes.
    pub fn intern_tokens<'a>(
        &self,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<BTreeSet<TokenId>> {
        values.into_iter().map(|v| self.intern_token(v)).collect()
    }

    // --- Set canonicalizer ---

    /// Find the canonical token-set for this membership, creating it if no
    /// set with the same signature exists.
    ///
    /// An empty membership never matches an existing row: every no-member
    /// set is freestanding until someone mutates it.
    pub fn get_or_create_token_set(&self, members: &BTreeSet<TokenId>) -> Result<TokenSetId> {
        let tx = self.conn.unchecked_transaction()?;
        let id = self.get_or_create_token_set_on(&tx, members)?;
        tx.commit()?;
        Ok(id)
    }

    fn get_or_create_token_set_on(
        &self,
        conn: &Connection,
        members: &BTreeSet<TokenId>,
    ) -> Result<TokenSetId> {
        if !members.is_empty() {
            let sig = signature_of(members.iter().copied());
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM token_sets WHERE signature = ?1 ORDER BY id LIMIT 1",
                    [&sig],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(TokenSetId(id));
            }
        }
        self.create_token_set_on(conn, members)
    }

    fn create_token_set_on(
        &self,
        conn: &Connection,
        members: &BTreeSet<TokenId>,
    ) -> Result<TokenSetId> {
        conn.execute(
            "INSERT INTO token_sets (signature) VALUES (?1)",
            [signature_of(members.iter().copied())],
        )?;
        let set_id = conn.last_insert_rowid();

        let mut stmt =
            conn.prepare("INSERT INTO token_token_set (token_id, token_set_id) VALUES (?1, ?2)")?;
        for token in members {
            stmt.execute(params![token.get(), set_id])?;
        }

        tracing::debug!("created token-set {set_id} with {} members", members.len());
        Ok(TokenSetId(set_id))
    }

    /// Converge an existing set's membership in place: stale links removed,
    /// new links added, identity unchanged. Never re-dedups against other
    /// sets: a set updated to match another set's membership stays its own
    /// row.
    pub fn update_token_set(&self, set: TokenSetId, members: &BTreeSet<TokenId>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.update_token_set_on(&tx, set, members)?;
        tx.commit()?;
        Ok(())
    }

    fn update_token_set_on(
        &self,
        conn: &Connection,
        set: TokenSetId,
        members: &BTreeSet<TokenId>,
    ) -> Result<()> {
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM token_sets WHERE id = ?1", [set.get()], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::Precondition(format!(
                "token-set {set} does not exist"
            )));
        }

        let current = self.token_set_members(set)?;
        {
            let mut remove = conn.prepare(
                "DELETE FROM token_token_set WHERE token_set_id = ?1 AND token_id = ?2",
            )?;
            for stale in current.difference(members) {
                remove.execute(params![set.get(), stale.get()])?;
            }

            let mut add = conn
                .prepare("INSERT INTO token_token_set (token_id, token_set_id) VALUES (?1, ?2)")?;
            for added in members.difference(&current) {
                add.execute(params![added.get(), set.get()])?;
            }
        }

        conn.execute(
            "UPDATE token_sets SET signature = ?1 WHERE id = ?2",
            params![signature_of(members.iter().copied()), set.get()],
        )?;
        Ok(())
    }

    /// Delete a set's membership links, then the set row.
    pub fn delete_token_set(&self, set: TokenSetId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.delete_token_set_on(&tx, set)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_token_set_on(&self, conn: &Connection, set: TokenSetId) -> Result<()> {
        conn.execute(
            "DELETE FROM token_token_set WHERE token_set_id = ?1",
            [set.get()],
        )?;
        let rows = conn.execute("DELETE FROM token_sets WHERE id = ?1", [set.get()])?;
        if rows == 0 {
            return Err(StoreError::Precondition(format!(
                "token-set {set} does not exist"
            )));
        }
        Ok(())
    }

    /// Member ids of a set. A missing or deleted set reads as empty.
    pub fn token_set_members(&self, set: TokenSetId) -> Result<BTreeSet<TokenId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT token_id FROM token_token_set WHERE token_set_id = ?1")?;
        let members = stmt
            .query_map([set.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TokenId))
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(members)
    }

    /// Member values of a set, via the token relation.
    pub fn token_set_values(&self, set: TokenSetId) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.value FROM token_token_set tts
             JOIN tokens t ON t.id = tts.token_id
             WHERE tts.token_set_id = ?1",
        )?;
        let values = stmt
            .query_map([set.get()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(values)
    }

    // --- Group registry ---

    /// Create a group under a fresh owned token-set, or converge the
    /// existing group's set to `members`. Idempotent; the group id and its
    /// set id are stable across updates, so every level referencing the
    /// group observes the new membership immediately.
    pub fn create_or_update_group(&self, name: &str, members: &BTreeSet<TokenId>) -> Result<GroupId> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, token_set_id FROM security_groups WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (group, set) = match existing {
            Some((group, set)) => (GroupId(group), TokenSetId(set)),
            None => {
                let set = self.create_token_set_on(&tx, &BTreeSet::new())?;
                tx.execute(
                    "INSERT INTO security_groups (name, token_set_id) VALUES (?1, ?2)",
                    params![name, set.get()],
                )?;
                let group = GroupId(tx.last_insert_rowid());
                tracing::debug!("created group {group} ({name})");
                (group, set)
            }
        };

        self.update_token_set_on(&tx, set, members)?;
        tx.commit()?;
        Ok(group)
    }

    pub fn group_by_name(&self, name: &str) -> Result<SecurityGroup> {
        self.conn
            .query_row(
                "SELECT id, name, token_set_id FROM security_groups WHERE name = ?1",
                [name],
                |row| {
                    Ok(SecurityGroup {
                        id: GroupId(row.get(0)?),
                        name: row.get(1)?,
                        token_set: TokenSetId(row.get(2)?),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("group", name.to_string()))
    }

    /// Token ids assigned to a group (its set's membership).
    pub fn group_ids(&self, group: GroupId) -> Result<BTreeSet<TokenId>> {
        let set = self.group_token_set(group)?;
        self.token_set_members(set)
    }

    /// Token values assigned to a group.
    pub fn group_values(&self, group: GroupId) -> Result<BTreeSet<String>> {
        let set = self.group_token_set(group)?;
        self.token_set_values(set)
    }

    fn group_token_set(&self, group: GroupId) -> Result<TokenSetId> {
        let set: Option<i64> = self
            .conn
            .query_row(
                "SELECT token_set_id FROM security_groups WHERE id = ?1",
                [group.get()],
                |row| row.get(0),
            )
            .optional()?;
        set.map(TokenSetId)
            .ok_or_else(|| StoreError::NotFound("group", group.to_string()))
    }

    /// Registered group names, in creation order.
    pub fn list_group_names(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM security_groups ORDER BY id LIMIT ?1 OFFSET ?2")?;
        let names = stmt
            .query_map(
                params![limit.map(i64::from).unwrap_or(-1), offset.unwrap_or(0)],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Delete a group's owned token-set, then the group row. Level links
    /// referencing the group are left dangling by contract.
    pub fn delete_group(&self, group: GroupId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let set: Option<i64> = tx
            .query_row(
                "SELECT token_set_id FROM security_groups WHERE id = ?1",
                [group.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(set) = set else {
            return Err(StoreError::Precondition(format!(
                "group {group} does not exist"
            )));
        };

        // The owned set may already be gone if a level delete claimed a
        // shared set; only delete what is still there.
        if self.token_set_exists(&tx, TokenSetId(set))? {
            self.delete_token_set_on(&tx, TokenSetId(set))?;
        }
        tx.execute("DELETE FROM security_groups WHERE id = ?1", [group.get()])?;
        tx.commit()?;
        Ok(())
    }

    fn token_set_exists(&self, conn: &Connection, set: TokenSetId) -> Result<bool> {
        let row: Option<i64> = conn
            .query_row("SELECT id FROM token_sets WHERE id = ?1", [set.get()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(row.is_some())
    }

    // --- Level composer ---

    /// Find the level whose referenced group-set matches `groups`, creating
    /// one with the given token-set if none exists.
    ///
    /// The lookup key is the group-set signature alone: a match is returned
    /// even when its stored token-set differs from `token_set`, which is
    /// only used at creation. An empty group-set never matches; each
    /// no-group level keeps its own token-set.
    pub fn get_or_create_level(
        &self,
        token_set: TokenSetId,
        groups: &BTreeSet<GroupId>,
    ) -> Result<LevelId> {
        let tx = self.conn.unchecked_transaction()?;

        if !groups.is_empty() {
            let sig = signature_of(groups.iter().copied());
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM security_levels WHERE group_signature = ?1 ORDER BY id LIMIT 1",
                    [&sig],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                tx.commit()?;
                return Ok(LevelId(id));
            }
        }

        tx.execute(
            "INSERT INTO security_levels (token_set_id, group_signature) VALUES (?1, ?2)",
            params![token_set.get(), signature_of(groups.iter().copied())],
        )?;
        let level = tx.last_insert_rowid();

        {
            let mut stmt =
                tx.prepare("INSERT INTO level_group (level_id, group_id) VALUES (?1, ?2)")?;
            for group in groups {
                stmt.execute(params![level, group.get()])?;
            }
        }

        tracing::debug!("created level {level} with {} groups", groups.len());
        tx.commit()?;
        Ok(LevelId(level))
    }

    /// Load a level row with its linked group ids (dangling links included;
    /// they drop out of effective-set reads via the join).
    pub fn level(&self, id: LevelId) -> Result<SecurityLevel> {
        let token_set: Option<i64> = self
            .conn
            .query_row(
                "SELECT token_set_id FROM security_levels WHERE id = ?1",
                [id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(token_set) = token_set else {
            return Err(StoreError::NotFound("level", id.to_string()));
        };

        let mut stmt = self
            .conn
            .prepare("SELECT group_id FROM level_group WHERE level_id = ?1")?;
        let groups = stmt
            .query_map([id.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(GroupId))
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(SecurityLevel {
            id,
            token_set: TokenSetId(token_set),
            groups,
        })
    }

    /// Effective token ids of a level: its own set unioned with every
    /// still-existing referenced group's set. Computed fresh on every call.
    pub fn level_ids(&self, id: LevelId) -> Result<BTreeSet<TokenId>> {
        let level = self.level(id)?;
        let own = self.token_set_members(level.token_set)?;
        let mut group_sets = Vec::new();
        for set in self.level_group_sets(id)? {
            group_sets.push(self.token_set_members(set)?);
        }
        Ok(effective_set(own, group_sets))
    }

    /// Effective token values of a level.
    pub fn level_values(&self, id: LevelId) -> Result<BTreeSet<String>> {
        let level = self.level(id)?;
        let own = self.token_set_values(level.token_set)?;
        let mut group_sets = Vec::new();
        for set in self.level_group_sets(id)? {
            group_sets.push(self.token_set_values(set)?);
        }
        Ok(effective_set(own, group_sets))
    }

    /// Names of the groups a level references, dangling links dropped.
    pub fn level_group_names(&self, id: LevelId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.name FROM level_group lg
             JOIN security_groups g ON g.id = lg.group_id
             WHERE lg.level_id = ?1 ORDER BY g.id",
        )?;
        let names = stmt
            .query_map([id.get()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn level_group_sets(&self, id: LevelId) -> Result<Vec<TokenSetId>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.token_set_id FROM level_group lg
             JOIN security_groups g ON g.id = lg.group_id
             WHERE lg.level_id = ?1",
        )?;
        let sets = stmt
            .query_map([id.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TokenSetId))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sets)
    }

    /// Delete a level's owned token-set, its group-links, then the level
    /// row. Referenced groups are untouched.
    pub fn delete_level(&self, id: LevelId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let set: Option<i64> = tx
            .query_row(
                "SELECT token_set_id FROM security_levels WHERE id = ?1",
                [id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(set) = set else {
            return Err(StoreError::Precondition(format!("level {id} does not exist")));
        };

        if self.token_set_exists(&tx, TokenSetId(set))? {
            self.delete_token_set_on(&tx, TokenSetId(set))?;
        }
        tx.execute("DELETE FROM level_group WHERE level_id = ?1", [id.get()])?;
        tx.execute("DELETE FROM security_levels WHERE id = ?1", [id.get()])?;
        tx.commit()?;
        Ok(())
    }

    // --- Object store ---

    /// Attach a level to a new object.
    ///
    /// With no requested uuid, a fresh UUIDv4 is generated, regenerating on
    /// the (effectively impossible) collision until an unused identifier is
    /// found. A caller-supplied uuid that collides is an
    /// `IdentifierConflict`; it is never silently replaced.
    pub fn create_object(&self, level: LevelId, uuid: Option<&str>) -> Result<SecurityObject> {
        match uuid {
            Some(requested) => self.insert_object(level, requested).map_err(|e| match e {
                StoreError::Sqlite(ref cause) if is_unique_violation(cause) => {
                    StoreError::IdentifierConflict(requested.to_string())
                }
                other => other,
            }),
            None => self.create_object_generated(level, || Uuid::new_v4().to_string()),
        }
    }

    fn create_object_generated(
        &self,
        level: LevelId,
        mut generate: impl FnMut() -> String,
    ) -> Result<SecurityObject> {
        loop {
            let candidate = generate();
            match self.insert_object(level, &candidate) {
                Ok(object) => return Ok(object),
                Err(StoreError::Sqlite(cause)) if is_unique_violation(&cause) => {
                    tracing::warn!("generated uuid collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn insert_object(&self, level: LevelId, uuid: &str) -> Result<SecurityObject> {
        self.conn.execute(
            "INSERT INTO security_objects (uuid, level_id) VALUES (?1, ?2)",
            params![uuid, level.get()],
        )?;
        Ok(SecurityObject {
            id: ObjectId(self.conn.last_insert_rowid()),
            uuid: uuid.to_string(),
            level,
        })
    }

    pub fn object_by_uuid(&self, uuid: &str) -> Result<SecurityObject> {
        self.conn
            .query_row(
                "SELECT id, uuid, level_id FROM security_objects WHERE uuid = ?1",
                [uuid],
                |row| {
                    Ok(SecurityObject {
                        id: ObjectId(row.get(0)?),
                        uuid: row.get(1)?,
                        level: LevelId(row.get(2)?),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("object", uuid.to_string()))
    }

    /// Registered object uuids, in creation order.
    pub fn list_object_uuids(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid FROM security_objects ORDER BY id LIMIT ?1 OFFSET ?2")?;
        let uuids = stmt
            .query_map(
                params![limit.map(i64::from).unwrap_or(-1), offset.unwrap_or(0)],
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(uuids)
    }

    /// Delete the object row only. Its level, token-sets and groups persist.
    pub fn delete_object(&self, object: ObjectId) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM security_objects WHERE id = ?1",
            [object.get()],
        )?;
        if rows == 0 {
            return Err(StoreError::Precondition(format!(
                "object {object} does not exist"
            )));
        }
        Ok(())
    }

    // --- Diagnostics ---

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
        };
        Ok(StoreCounts {
            tokens: count("tokens")?,
            token_sets: count("token_sets")?,
            groups: count("security_groups")?,
            levels: count("security_levels")?,
            objects: count("security_objects")?,
        })
    }
}
