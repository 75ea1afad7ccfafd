use super::{decode, encode, OrderStore, StoreLock};
use crate::error::{Error, Result};
use crate::models::StopLossOrder;
use redis::{Client, Commands, Connection, Script};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Expiry on the writer lock, so a crashed holder cannot wedge the store
const LOCK_TTL: Duration = Duration::from_secs(30);
const LOCK_RETRY: Duration = Duration::from_millis(20);

// Delete the lock only if we still own it
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis persistence for the order collection
///
/// The whole collection lives under a single key and is replaced with one
/// `SET`, which Redis applies atomically. Writers coordinate through a
/// token-owned `SET NX PX` lock on `<key>:lock`.
pub struct RedisOrderStore {
    client: Client,
    key: String,
    timeout: Duration,
}

impl RedisOrderStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `key` - Key holding the encoded collection
    /// * `timeout` - Bound on connect, read and write
    pub fn new(redis_url: &str, key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let store = Self {
            client,
            key: key.into(),
            timeout,
        };

        // Fail fast instead of on the first evaluation
        store.connection()?;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(store)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn lock_key(&self) -> String {
        format!("{}:lock", self.key)
    }

    fn connection(&self) -> Result<Connection> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        Ok(conn)
    }
}

struct RedisLock {
    conn: Connection,
    key: String,
    token: String,
}

impl Drop for RedisLock {
    fn drop(&mut self) {
        let released: redis::RedisResult<i32> = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke(&mut self.conn);

        if let Err(e) = released {
            tracing::warn!(key = %self.key, "Failed to release store lock: {}", e);
        }
    }
}

impl OrderStore for RedisOrderStore {
    fn load(&self) -> Result<Vec<StopLossOrder>> {
        let mut conn = self.connection()?;
        let raw: Option<String> = conn.get(&self.key)?;

        match raw {
            Some(raw) => decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, orders: &[StopLossOrder]) -> Result<()> {
        let value = encode(orders)?;
        let mut conn = self.connection()?;
        conn.set::<_, _, ()>(&self.key, value)?;

        tracing::debug!(key = %self.key, orders = orders.len(), "Saved orders to Redis");

        Ok(())
    }

    /// Waits up to the store timeout for the current holder to finish
    fn lock(&self) -> Result<StoreLock> {
        let mut conn = self.connection()?;
        let key = self.lock_key();
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.timeout;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL.as_millis() as u64)
                .query(&mut conn)?;

            if acquired.is_some() {
                return Ok(StoreLock::holding(RedisLock { conn, key, token }));
            }
            if Instant::now() >= deadline {
                return Err(Error::StorageUnavailable(
                    format!("timed out waiting for lock {}", key).into(),
                ));
            }
            std::thread::sleep(LOCK_RETRY);
        }
    }
}
