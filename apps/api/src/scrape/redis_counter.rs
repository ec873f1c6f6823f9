//! Redis-backed quota counter shared by every API replica.
//!
//! Keys per local day: `scrape_quota:{day}:count` (completed scrapes) and
//! `scrape_quota:{day}:in_flight`, a sorted set of reservation ids scored by
//! their expiry in epoch millis. Reservations past their deadline are pruned
//! before every check, so a replica that dies mid-scrape only holds its slot
//! until the deadline. Check-and-reserve runs as one Lua script so replicas
//! cannot race past the limit.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::info;
use uuid::Uuid;

use crate::scrape::{QuotaCounter, QuotaError, QuotaSnapshot};

/// Day keys outlive their day so late commits still land, then expire.
const KEY_TTL_SECS: u64 = 48 * 60 * 60;

/// Longest a reservation may stay unsettled; well past the scraper's HTTP timeout.
const RESERVATION_TTL_MS: i64 = 5 * 60 * 1000;

const RESERVE_LUA: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', ARGV[2])
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
local in_flight = redis.call('ZCARD', KEYS[2])
if count + in_flight < tonumber(ARGV[1]) then
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
    redis.call('EXPIRE', KEYS[2], ARGV[5])
    return 1
end
return 0
"#;

const COMMIT_LUA: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[2])
return 1
"#;

pub struct RedisQuotaCounter {
    conn: MultiplexedConnection,
    reserve: Script,
    commit: Script,
}

impl RedisQuotaCounter {
    pub async fn connect(client: &redis::Client) -> Result<Self, QuotaError> {
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis quota counter connected");
        Ok(Self {
            conn,
            reserve: Script::new(RESERVE_LUA),
            commit: Script::new(COMMIT_LUA),
        })
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn reservation_deadline(now_ms: i64) -> i64 {
    now_ms + RESERVATION_TTL_MS
}

fn count_key(day: NaiveDate) -> String {
    format!("scrape_quota:{day}:count")
}

fn in_flight_key(day: NaiveDate) -> String {
    format!("scrape_quota:{day}:in_flight")
}

#[async_trait]
impl QuotaCounter for RedisQuotaCounter {
    async fn try_reserve(
        &self,
        day: NaiveDate,
        limit: u32,
        reservation: Uuid,
    ) -> Result<bool, QuotaError> {
        let mut conn = self.conn.clone();
        let now = now_ms();
        let reserved: i64 = self
            .reserve
            .key(count_key(day))
            .key(in_flight_key(day))
            .arg(limit)
            .arg(now)
            .arg(reservation_deadline(now))
            .arg(reservation.to_string())
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(reserved == 1)
    }

    async fn commit(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .commit
            .key(count_key(day))
            .key(in_flight_key(day))
            .arg(reservation.to_string())
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(in_flight_key(day))
            .arg(reservation.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn snapshot(&self, day: NaiveDate) -> Result<QuotaSnapshot, QuotaError> {
        let mut conn = self.conn.clone();
        let (count, in_flight): (Option<u32>, u32) = redis::pipe()
            .cmd("GET")
            .arg(count_key(day))
            .cmd("ZCOUNT")
            .arg(in_flight_key(day))
            .arg(format!("({}", now_ms()))
            .arg("+inf")
            .query_async(&mut conn)
            .await?;
        Ok(QuotaSnapshot {
            count: count.unwrap_or(0),
            in_flight,
        })
    }
}
