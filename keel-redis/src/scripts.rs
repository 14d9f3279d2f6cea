//! Lua scripts executed atomically by Redis.
//!
//! Every multi-step operation runs as one script so that no other client can
//! observe or interleave with the intermediate state. Time is always read with
//! `TIME` inside the script, never supplied by the caller. Timestamps are
//! carried as integer microseconds since the Unix epoch.

use redis::Script;

/// Compare-and-delete.
const RELEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Compare-and-pexpire.
const EXTEND: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// KEYS[1] window key; ARGV[1] window ms, ARGV[2] member suffix, ARGV[3] expiry ms
const WINDOW_RECORD: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1000000
local cutoff = now - tonumber(ARGV[1]) / 1000
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', string.format('%.6f', cutoff))
redis.call('ZADD', KEYS[1], string.format('%.6f', now),
    string.format('%s.%06d-%s', t[1], tonumber(t[2]), ARGV[2]))
local count = redis.call('ZCARD', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return count
"#;

/// KEYS[1] window key; ARGV[1] window ms
const WINDOW_COUNT: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1000000
local cutoff = now - tonumber(ARGV[1]) / 1000
return redis.call('ZCOUNT', KEYS[1], string.format('(%.6f', cutoff), '+inf')
"#;

/// KEYS[1] id sequence, KEYS[2] pending set, KEYS[3] status counts;
/// ARGV[1] item key prefix, ARGV[2] queue, ARGV[3] name, ARGV[4] payload json
const QUEUE_PUSH: &str = r#"
local t = redis.call('TIME')
local now = t[1] .. string.format('%06d', tonumber(t[2]))
local id = redis.call('INCR', KEYS[1])
redis.call('HSET', ARGV[1] .. id,
    'id', id,
    'queue', ARGV[2],
    'name', ARGV[3],
    'payload', ARGV[4],
    'status', 'pending',
    'created_at', now,
    'updated_at', now)
redis.call('ZADD', KEYS[2], now, string.format('%020d', id))
redis.call('HINCRBY', KEYS[3], 'pending', 1)
return {id, now}
"#;

/// KEYS[1] pending set, KEYS[2] status counts; ARGV[1] item key prefix
///
/// The pending set is scored by creation time and its members are zero-padded
/// ids, so `ZRANGE 0 0` yields the oldest item with ties broken by id.
const QUEUE_CLAIM: &str = r#"
local t = redis.call('TIME')
local now = t[1] .. string.format('%06d', tonumber(t[2]))
while true do
    local head = redis.call('ZRANGE', KEYS[1], 0, 0)
    if #head == 0 then
        return false
    end
    redis.call('ZREM', KEYS[1], head[1])
    local key = ARGV[1] .. tonumber(head[1])
    if redis.call('HGET', key, 'status') == 'pending' then
        redis.call('HSET', key, 'status', 'in_progress', 'updated_at', now)
        redis.call('HINCRBY', KEYS[2], 'pending', -1)
        redis.call('HINCRBY', KEYS[2], 'in_progress', 1)
        return redis.call('HGETALL', key)
    end
end
"#;

/// KEYS[1] pending set, KEYS[2] status counts, KEYS[3] item key;
/// ARGV[1] expected status, ARGV[2] new status, ARGV[3] pending member
const QUEUE_TRANSITION: &str = r#"
local current = redis.call('HGET', KEYS[3], 'status')
if not current then
    return false
end
if current ~= ARGV[1] then
    return current
end
local t = redis.call('TIME')
local now = t[1] .. string.format('%06d', tonumber(t[2]))
redis.call('HSET', KEYS[3], 'status', ARGV[2], 'updated_at', now)
redis.call('HINCRBY', KEYS[2], ARGV[1], -1)
redis.call('HINCRBY', KEYS[2], ARGV[2], 1)
if ARGV[1] == 'pending' then
    redis.call('ZREM', KEYS[1], ARGV[3])
end
if ARGV[2] == 'pending' then
    redis.call('ZADD', KEYS[1], redis.call('HGET', KEYS[3], 'created_at'), ARGV[3])
end
return 'applied'
"#;

/// Script handles, loaded once per store.
#[derive(Clone)]
pub(crate) struct Scripts {
    pub release: Script,
    pub extend: Script,
    pub window_record: Script,
    pub window_count: Script,
    pub queue_push: Script,
    pub queue_claim: Script,
    pub queue_transition: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Self {
            release: Script::new(RELEASE),
            extend: Script::new(EXTEND),
            window_record: Script::new(WINDOW_RECORD),
            window_count: Script::new(WINDOW_COUNT),
            queue_push: Script::new(QUEUE_PUSH),
            queue_claim: Script::new(QUEUE_CLAIM),
            queue_transition: Script::new(QUEUE_TRANSITION),
        }
    }
}

/// Pending-set member for an item id.
pub(crate) fn pending_member(id: i64) -> String {
    format!("{:020}", id)
}
