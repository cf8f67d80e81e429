//! Redis-backed `KvStore` for deployments running more than one engine instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;

use crate::cache::{CacheError, KvStore};

#[derive(Clone)]
pub struct RedisKv {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisKv {
    pub async fn connect(client: &redis::Client, prefix: &str) -> Result<Self, CacheError> {
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis cache backend connected (prefix '{prefix}')");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

/// `INCR` and `PEXPIRE ... NX` in one MULTI/EXEC: the expiry is set by the
/// first hit of a window and never left missing. `NX` needs Redis 7.
fn counter_pipeline(key: &str, window: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("INCR")
        .arg(key)
        .cmd("PEXPIRE")
        .arg(key)
        .arg(window.as_millis().max(1) as u64)
        .arg("NX")
        .ignore();
    pipe
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = counter_pipeline(&self.key(key), window)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
