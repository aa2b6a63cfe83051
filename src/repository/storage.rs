//! SQLite-backed connection repositories.
//!
//! Both repositories share one SQLite connection. All token columns hold
//! AES-256-GCM ciphertext with a per-value nonce column.

use crate::connect::{
    AnyConnection, Connection, ConnectionData, ConnectionFactoryRegistry, ConnectionKey,
};
use crate::credentials::{SealedToken, TokenCipher};
use crate::error::{ConnectError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection as Db, ErrorCode, Row};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS connections (
        local_user_id TEXT NOT NULL,
        provider_id TEXT NOT NULL,
        provider_user_id TEXT NOT NULL,
        rank INTEGER NOT NULL,
        display_name TEXT,
        profile_url TEXT,
        image_url TEXT,
        access_token TEXT NOT NULL,
        access_token_nonce TEXT NOT NULL,
        secret TEXT,
        secret_nonce TEXT,
        refresh_token TEXT,
        refresh_token_nonce TEXT,
        expire_time TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (local_user_id, provider_id, provider_user_id),
        UNIQUE (provider_id, provider_user_id)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_rank
        ON connections(local_user_id, provider_id, rank);
"#;

const SELECT_CONNECTION: &str = r#"
    SELECT provider_id, provider_user_id,
           display_name, profile_url, image_url,
           access_token, access_token_nonce,
           secret, secret_nonce,
           refresh_token, refresh_token_nonce,
           expire_time, rank
    FROM connections
"#;

/// Remote account ids bound per `IN (...)` query, well under SQLite's
/// host parameter limit.
const LOOKUP_CHUNK_SIZE: usize = 500;

/// A row as stored: token columns still sealed.
struct StoredConnection {
    provider_id: String,
    provider_user_id: String,
    display_name: Option<String>,
    profile_url: Option<String>,
    image_url: Option<String>,
    access_token: String,
    access_token_nonce: String,
    secret: Option<String>,
    secret_nonce: Option<String>,
    refresh_token: Option<String>,
    refresh_token_nonce: Option<String>,
    expire_time: Option<String>,
    rank: i64,
}

impl StoredConnection {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            provider_id: row.get(0)?,
            provider_user_id: row.get(1)?,
            display_name: row.get(2)?,
            profile_url: row.get(3)?,
            image_url: row.get(4)?,
            access_token: row.get(5)?,
            access_token_nonce: row.get(6)?,
            secret: row.get(7)?,
            secret_nonce: row.get(8)?,
            refresh_token: row.get(9)?,
            refresh_token_nonce: row.get(10)?,
            expire_time: row.get(11)?,
            rank: row.get(12)?,
        })
    }

    /// Decrypt the token columns. Any failure here is fatal for the query.
    fn open(self, cipher: &TokenCipher) -> Result<ConnectionData> {
        let access_token = cipher.open(&self.access_token, &self.access_token_nonce)?;
        let secret = cipher.open_optional(self.secret, self.secret_nonce)?;
        let refresh_token = cipher.open_optional(self.refresh_token, self.refresh_token_nonce)?;
        let expire_time = self
            .expire_time
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| {
                ConnectError::InvalidConnectionData(format!("unreadable expire_time: {}", e))
            })?;

        Ok(ConnectionData {
            provider_id: self.provider_id,
            provider_user_id: self.provider_user_id,
            display_name: self.display_name,
            profile_url: self.profile_url,
            image_url: self.image_url,
            access_token,
            secret,
            refresh_token,
            expire_time,
        })
    }
}

/// Token columns sealed for writing.
struct SealedFields {
    access_token: SealedToken,
    secret: Option<SealedToken>,
    refresh_token: Option<SealedToken>,
    expire_time: Option<String>,
}

impl SealedFields {
    fn seal(data: &ConnectionData, cipher: &TokenCipher) -> Result<Self> {
        Ok(Self {
            access_token: cipher.seal(&data.access_token)?,
            secret: cipher.seal_optional(data.secret.as_deref())?,
            refresh_token: cipher.seal_optional(data.refresh_token.as_deref())?,
            expire_time: data.expire_time.map(|dt| dt.to_rfc3339()),
        })
    }
}

fn split(sealed: Option<SealedToken>) -> (Option<String>, Option<String>) {
    match sealed {
        Some(token) => (Some(token.ciphertext), Some(token.nonce)),
        None => (None, None),
    }
}

fn lock(conn: &Mutex<Db>) -> MutexGuard<'_, Db> {
    // rusqlite keeps the connection consistent if a statement panics midway
    conn.lock().unwrap_or_else(|e| e.into_inner())
}

/// Input ids with repeats dropped, first occurrence kept.
fn distinct_ids<S: AsRef<str>>(ids: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.as_ref())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Connection lookups across all local users.
///
/// # Schema
/// ```sql
/// CREATE TABLE connections (
///     local_user_id TEXT NOT NULL,
///     provider_id TEXT NOT NULL,
///     provider_user_id TEXT NOT NULL,
///     rank INTEGER NOT NULL,             -- 1 = primary connection to the provider
///     display_name TEXT,
///     profile_url TEXT,
///     image_url TEXT,
///     access_token TEXT NOT NULL,        -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     secret TEXT,                       -- Encrypted (OAuth1)
///     secret_nonce TEXT,
///     refresh_token TEXT,                -- Encrypted (OAuth2)
///     refresh_token_nonce TEXT,
///     expire_time TEXT,                  -- RFC 3339
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     PRIMARY KEY (local_user_id, provider_id, provider_user_id),
///     UNIQUE (provider_id, provider_user_id)
/// );
/// ```
///
/// A remote account is linked to at most one local user.
///
/// # Thread Safety
/// - Connection is wrapped in Mutex and shared with every scoped repository
/// - SQLite serializes conflicting writes
pub struct UsersConnectionRepository {
    conn: Arc<Mutex<Db>>,
    registry: Arc<ConnectionFactoryRegistry>,
    cipher: TokenCipher,
}

impl UsersConnectionRepository {
    /// Creates or opens a connection store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `registry` - Factories used to rebuild stored connections
    /// * `cipher` - Token cipher holding the master key
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        registry: Arc<ConnectionFactoryRegistry>,
        cipher: TokenCipher,
    ) -> Result<Self> {
        let conn = Db::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
            cipher,
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionFactoryRegistry> {
        &self.registry
    }

    /// Local user linked to the remote account, if any.
    pub fn find_local_user_id_connected_to(&self, key: &ConnectionKey) -> Result<Option<String>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT local_user_id FROM connections WHERE provider_id = ?1 AND provider_user_id = ?2",
        )?;
        let mut rows = stmt.query(params![key.provider_id(), key.provider_user_id()])?;

        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Local users linked to any of the given remote accounts of one provider.
    pub fn find_local_user_ids_connected_to<S: AsRef<str>>(
        &self,
        provider_id: &str,
        provider_user_ids: &[S],
    ) -> Result<HashSet<String>> {
        let ids = distinct_ids(provider_user_ids);
        let conn = lock(&self.conn);
        let mut local_user_ids = HashSet::new();

        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            let sql = format!(
                "SELECT DISTINCT local_user_id FROM connections WHERE provider_id = ?1 AND provider_user_id IN ({})",
                placeholders(2, chunk.len())
            );
            let values = std::iter::once(provider_id).chain(chunk.iter().copied());

            let mut stmt = conn.prepare(&sql)?;
            for local_user_id in stmt.query_map(params_from_iter(values), |row| row.get(0))? {
                local_user_ids.insert(local_user_id?);
            }
        }

        Ok(local_user_ids)
    }

    /// Repository of one local user's connections.
    pub fn scope_to_user(&self, local_user_id: &str) -> ConnectionRepository {
        ConnectionRepository {
            local_user_id: local_user_id.to_string(),
            conn: Arc::clone(&self.conn),
            registry: Arc::clone(&self.registry),
            cipher: self.cipher.clone(),
        }
    }
}

/// Connections of a single local user.
///
/// Obtained from [`UsersConnectionRepository::scope_to_user`]. Every call hits
/// the store; nothing is cached.
pub struct ConnectionRepository {
    local_user_id: String,
    conn: Arc<Mutex<Db>>,
    registry: Arc<ConnectionFactoryRegistry>,
    cipher: TokenCipher,
}

impl ConnectionRepository {
    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// All connections grouped by provider, each group ordered by rank.
    ///
    /// Every registered provider has an entry, empty when not connected.
    pub fn find_all_connections(&self) -> Result<BTreeMap<String, Vec<Box<dyn AnyConnection>>>> {
        let mut connections: BTreeMap<String, Vec<Box<dyn AnyConnection>>> = self
            .registry
            .registered_provider_ids()
            .into_iter()
            .map(|id| (id, Vec::new()))
            .collect();

        let rows = self.query(
            &format!("{} WHERE local_user_id = ?1 ORDER BY provider_id, rank", SELECT_CONNECTION),
            vec![self.local_user_id.clone()],
        )?;
        for data in rows {
            let connection = self.rebuild(&data)?;
            connections
                .entry(data.provider_id)
                .or_default()
                .push(connection);
        }

        Ok(connections)
    }

    /// Connections to one provider, ordered by rank.
    pub fn find_connections_to_provider(&self, provider_id: &str) -> Result<Vec<Box<dyn AnyConnection>>> {
        self.query(
            &format!(
                "{} WHERE local_user_id = ?1 AND provider_id = ?2 ORDER BY rank",
                SELECT_CONNECTION
            ),
            vec![self.local_user_id.clone(), provider_id.to_string()],
        )?
        .iter()
        .map(|data| self.rebuild(data))
        .collect()
    }

    /// Connections to the provider of API type `A`, ordered by rank.
    pub fn find_connections_by_api<A: Send + Sync + 'static>(&self) -> Result<Vec<Connection<A>>> {
        let provider_id = self.registry.provider_id_for_api::<A>()?.to_string();
        let factory = self.registry.lookup_by_api_type::<A>()?;

        self.query(
            &format!(
                "{} WHERE local_user_id = ?1 AND provider_id = ?2 ORDER BY rank",
                SELECT_CONNECTION
            ),
            vec![self.local_user_id.clone(), provider_id],
        )?
        .iter()
        .map(|data| factory.create_connection_from_data(data))
        .collect()
    }

    /// This user's connections to the given remote accounts of one provider.
    pub fn find_connections_to_users<S: AsRef<str>>(
        &self,
        provider_id: &str,
        provider_user_ids: &[S],
    ) -> Result<Vec<Box<dyn AnyConnection>>> {
        let mut ranked = Vec::new();
        for chunk in distinct_ids(provider_user_ids).chunks(LOOKUP_CHUNK_SIZE) {
            let sql = format!(
                "{} WHERE local_user_id = ?1 AND provider_id = ?2 AND provider_user_id IN ({})",
                SELECT_CONNECTION,
                placeholders(3, chunk.len())
            );
            let mut values = vec![self.local_user_id.clone(), provider_id.to_string()];
            values.extend(chunk.iter().map(|id| id.to_string()));
            ranked.extend(self.query_ranked(&sql, values)?);
        }

        // Chunks come back independently ordered
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.iter().map(|(_, data)| self.rebuild(data)).collect()
    }

    /// Connection for a key, or `NoSuchConnection`.
    pub fn find_connection(&self, key: &ConnectionKey) -> Result<Box<dyn AnyConnection>> {
        let data = self.find_data(key)?;
        self.rebuild(&data)
    }

    /// Typed connection to the provider of API type `A` for one remote account.
    pub fn find_connection_by_api<A: Send + Sync + 'static>(
        &self,
        provider_user_id: &str,
    ) -> Result<Connection<A>> {
        let provider_id = self.registry.provider_id_for_api::<A>()?;
        let key = ConnectionKey::new(provider_id, provider_user_id);
        let factory = self.registry.lookup_by_api_type::<A>()?;
        factory.create_connection_from_data(&self.find_data(&key)?)
    }

    /// The rank-1 connection to the provider of API type `A`.
    pub fn find_primary_connection<A: Send + Sync + 'static>(&self) -> Result<Connection<A>> {
        let provider_id = self.registry.provider_id_for_api::<A>()?.to_string();
        let factory = self.registry.lookup_by_api_type::<A>()?;

        let data = self
            .query(
                &format!(
                    "{} WHERE local_user_id = ?1 AND provider_id = ?2 ORDER BY rank LIMIT 1",
                    SELECT_CONNECTION
                ),
                vec![self.local_user_id.clone(), provider_id.clone()],
            )?
            .into_iter()
            .next()
            .ok_or(ConnectError::NotConnected(provider_id))?;

        factory.create_connection_from_data(&data)
    }

    /// Persist a new connection for this user.
    ///
    /// Fails with `DuplicateConnection` when the remote account is already
    /// linked, to this user or any other.
    pub fn add_connection(&self, connection: &dyn AnyConnection) -> Result<()> {
        let data = connection.create_data();
        let key = data.key();

        // Only store what can be rebuilt later
        self.registry.lookup_by_provider_id(&data.provider_id)?;
        if data.provider_user_id.trim().is_empty() {
            return Err(ConnectError::InvalidConnectionData(format!(
                "connection to '{}' has an empty provider user id",
                data.provider_id
            )));
        }

        let sealed = SealedFields::seal(&data, &self.cipher)?;
        let (secret, secret_nonce) = split(sealed.secret);
        let (refresh_token, refresh_token_nonce) = split(sealed.refresh_token);
        let now = Utc::now().to_rfc3339();

        let result = lock(&self.conn).execute(
            r#"
            INSERT INTO connections (
                local_user_id, provider_id, provider_user_id, rank,
                display_name, profile_url, image_url,
                access_token, access_token_nonce,
                secret, secret_nonce,
                refresh_token, refresh_token_nonce,
                expire_time, created_at, updated_at
            )
            VALUES (
                ?1, ?2, ?3,
                (SELECT COALESCE(MAX(rank), 0) + 1 FROM connections
                 WHERE local_user_id = ?1 AND provider_id = ?2),
                ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14
            )
            "#,
            params![
                self.local_user_id,
                data.provider_id,
                data.provider_user_id,
                data.display_name,
                data.profile_url,
                data.image_url,
                sealed.access_token.ciphertext,
                sealed.access_token.nonce,
                secret,
                secret_nonce,
                refresh_token,
                refresh_token_nonce,
                sealed.expire_time,
                now,
            ],
        );

        match result {
            Ok(_) => {
                debug!(local_user_id = %self.local_user_id, key = %key, "Added connection");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ConnectError::DuplicateConnection(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the profile and token fields of an existing connection.
    pub fn update_connection(&self, connection: &dyn AnyConnection) -> Result<()> {
        let data = connection.create_data();
        let sealed = SealedFields::seal(&data, &self.cipher)?;
        let (secret, secret_nonce) = split(sealed.secret);
        let (refresh_token, refresh_token_nonce) = split(sealed.refresh_token);

        let rows_affected = lock(&self.conn).execute(
            r#"
            UPDATE connections SET
                display_name = ?4, profile_url = ?5, image_url = ?6,
                access_token = ?7, access_token_nonce = ?8,
                secret = ?9, secret_nonce = ?10,
                refresh_token = ?11, refresh_token_nonce = ?12,
                expire_time = ?13, updated_at = ?14
            WHERE local_user_id = ?1 AND provider_id = ?2 AND provider_user_id = ?3
            "#,
            params![
                self.local_user_id,
                data.provider_id,
                data.provider_user_id,
                data.display_name,
                data.profile_url,
                data.image_url,
                sealed.access_token.ciphertext,
                sealed.access_token.nonce,
                secret,
                secret_nonce,
                refresh_token,
                refresh_token_nonce,
                sealed.expire_time,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if rows_affected == 0 {
            return Err(ConnectError::NoSuchConnection(data.key()));
        }

        debug!(local_user_id = %self.local_user_id, key = %data.key(), "Updated connection");
        Ok(())
    }

    /// Delete one connection.
    ///
    /// # Returns
    /// * `Ok(true)` - Connection deleted
    /// * `Ok(false)` - No such connection for this user
    pub fn remove_connection(&self, key: &ConnectionKey) -> Result<bool> {
        let rows_affected = lock(&self.conn).execute(
            "DELETE FROM connections WHERE local_user_id = ?1 AND provider_id = ?2 AND provider_user_id = ?3",
            params![self.local_user_id, key.provider_id(), key.provider_user_id()],
        )?;

        debug!(local_user_id = %self.local_user_id, key = %key, removed = rows_affected > 0, "Removed connection");
        Ok(rows_affected > 0)
    }

    /// Delete every connection to a provider. Returns the number removed.
    pub fn remove_connections_to_provider(&self, provider_id: &str) -> Result<usize> {
        let rows_affected = lock(&self.conn).execute(
            "DELETE FROM connections WHERE local_user_id = ?1 AND provider_id = ?2",
            params![self.local_user_id, provider_id],
        )?;

        debug!(
            local_user_id = %self.local_user_id,
            provider_id = %provider_id,
            removed = rows_affected,
            "Removed connections to provider"
        );
        Ok(rows_affected)
    }

    fn find_data(&self, key: &ConnectionKey) -> Result<ConnectionData> {
        self.query(
            &format!(
                "{} WHERE local_user_id = ?1 AND provider_id = ?2 AND provider_user_id = ?3",
                SELECT_CONNECTION
            ),
            vec![
                self.local_user_id.clone(),
                key.provider_id().to_string(),
                key.provider_user_id().to_string(),
            ],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| ConnectError::NoSuchConnection(key.clone()))
    }

    /// Run a select and decrypt every row.
    fn query(&self, sql: &str, values: Vec<String>) -> Result<Vec<ConnectionData>> {
        Ok(self
            .query_ranked(sql, values)?
            .into_iter()
            .map(|(_, data)| data)
            .collect())
    }

    fn query_ranked(&self, sql: &str, values: Vec<String>) -> Result<Vec<(i64, ConnectionData)>> {
        let stored = {
            let conn = lock(&self.conn);
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), StoredConnection::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        stored
            .into_iter()
            .map(|row| {
                let rank = row.rank;
                row.open(&self.cipher).map(|data| (rank, data))
            })
            .collect()
    }

    fn rebuild(&self, data: &ConnectionData) -> Result<Box<dyn AnyConnection>> {
        self.registry
            .lookup_by_provider_id(&data.provider_id)?
            .create_any_connection_from_data(data)
    }
}
