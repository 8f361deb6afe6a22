//! Atomic scripts used by the engine.
//!
//! Each script pairs Lua (for Redis) with a Rust body (for in-process stores).
//! The two must stay in lockstep: same `KEYS`, same `ARGV`, same reply.

use crate::types::Hold;
use std::time::Duration;
use stockhold_core::script::{Script, ScriptArgs, ScriptContext};
use stockhold_core::store::{KeyTtl, Result, parse_counter};

fn counter(ctx: &dyn ScriptContext, key: &str) -> Result<i64> {
    parse_counter(key, ctx.get(key).as_deref())
}

fn millis_arg(args: &ScriptArgs<'_>, index: usize) -> Result<Duration> {
    let millis = args.arg_i64(index)?;
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| args.error(format!("negative ttl: {millis}")))
}

fn reply(value: impl ToString) -> Result<Option<String>> {
    Ok(Some(value.to_string()))
}

// ---------------------------------------------------------------------------
// Reserve
// ---------------------------------------------------------------------------

/// `RESERVE` reply: not enough unreserved stock.
pub const RESERVE_OUT_OF_STOCK: &str = "0";
/// Units were reserved.
pub const RESERVE_OK: &str = "1";
/// The session already holds a reservation.
pub const RESERVE_ALREADY_HELD: &str = "2";
/// The item's reserved counter is at capacity.
pub const RESERVE_AT_CAPACITY: &str = "-1";

const RESERVE_LUA: &str = r"
if redis.call('EXISTS', KEYS[3]) == 1 then
  return 2
end
local reserved = tonumber(redis.call('GET', KEYS[2]) or '0')
if reserved >= tonumber(ARGV[4]) then
  return -1
end
local stock = tonumber(redis.call('GET', KEYS[1]) or '0')
local qty = tonumber(ARGV[1])
if stock - reserved >= qty then
  redis.call('INCRBY', KEYS[2], qty)
  redis.call('PEXPIRE', KEYS[2], ARGV[2])
  redis.call('SET', KEYS[3], ARGV[3], 'PX', ARGV[2])
  redis.call('INCR', KEYS[4])
  return 1
end
return 0
";

fn reserve(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let stock_key = args.key(0)?;
    let reserved_key = args.key(1)?;
    let hold_key = args.key(2)?;
    let revision_key = args.key(3)?;
    let quantity = args.arg_i64(0)?;
    let ttl = millis_arg(args, 1)?;
    let record = args.arg(2)?;
    let capacity = args.arg_i64(3)?;

    if ctx.get(hold_key).is_some() {
        return reply(RESERVE_ALREADY_HELD);
    }

    let reserved = counter(ctx, reserved_key)?;
    if reserved >= capacity {
        return reply(RESERVE_AT_CAPACITY);
    }

    let stock = counter(ctx, stock_key)?;
    if stock - reserved >= quantity {
        ctx.incr_by(reserved_key, quantity)?;
        ctx.expire(reserved_key, ttl);
        ctx.set_with_ttl(hold_key, record.to_string(), ttl);
        ctx.incr_by(revision_key, 1)?;
        return reply(RESERVE_OK);
    }

    reply(RESERVE_OUT_OF_STOCK)
}

/// Check-and-reserve for one session.
///
/// `KEYS`: stock, reserved, hold, revision. `ARGV`: quantity, ttl (ms), hold record,
/// item capacity.
pub static RESERVE: Script = Script::new("reserve", RESERVE_LUA, reserve);

// ---------------------------------------------------------------------------
// Release / confirm
// ---------------------------------------------------------------------------

const RELEASE_LUA: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return false
end
redis.call('DEL', KEYS[1])
local ok, hold = pcall(cjson.decode, raw)
if not ok or type(hold) ~= 'table' or type(hold.item_id) ~= 'string' or type(hold.quantity) ~= 'number' then
  return raw
end
local reserved_key = ARGV[1] .. hold.item_id
local left = redis.call('DECRBY', reserved_key, hold.quantity)
if left <= 0 then
  redis.call('DEL', reserved_key)
end
redis.call('INCR', ARGV[2] .. hold.item_id)
return raw
";

const CONFIRM_LUA: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return false
end
redis.call('DEL', KEYS[1])
local ok, hold = pcall(cjson.decode, raw)
if not ok or type(hold) ~= 'table' or type(hold.item_id) ~= 'string' or type(hold.quantity) ~= 'number' then
  return raw
end
local reserved_key = ARGV[1] .. hold.item_id
local left = redis.call('DECRBY', reserved_key, hold.quantity)
if left <= 0 then
  redis.call('DEL', reserved_key)
end
redis.call('INCR', ARGV[2] .. hold.item_id)
local stock_key = ARGV[3] .. hold.item_id
local stock = tonumber(redis.call('GET', stock_key) or '0') or 0
if stock >= hold.quantity then
  redis.call('DECRBY', stock_key, hold.quantity)
else
  redis.call('SET', stock_key, 0)
end
return raw
";

/// Delete the hold and give its units back to the reserved counter.
///
/// Returns the decoded hold, or `None` if the record is unreadable (it is
/// deleted either way).
fn consume_hold(
    ctx: &mut dyn ScriptContext,
    hold_key: &str,
    raw: &str,
    reserved_prefix: &str,
    revision_prefix: &str,
) -> Result<Option<Hold>> {
    ctx.delete(hold_key);
    let Ok(hold) = Hold::from_record(raw) else {
        return Ok(None);
    };

    let reserved_key = format!("{reserved_prefix}{}", hold.item_id);
    let left = ctx.incr_by(&reserved_key, -i64::from(hold.quantity))?;
    if left <= 0 {
        ctx.delete(&reserved_key);
    }
    ctx.incr_by(&format!("{revision_prefix}{}", hold.item_id), 1)?;
    Ok(Some(hold))
}

fn release(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let hold_key = args.key(0)?;
    let reserved_prefix = args.arg(0)?;
    let revision_prefix = args.arg(1)?;

    let Some(raw) = ctx.get(hold_key) else {
        return Ok(None);
    };
    consume_hold(ctx, hold_key, &raw, reserved_prefix, revision_prefix)?;
    Ok(Some(raw))
}

fn confirm(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let hold_key = args.key(0)?;
    let reserved_prefix = args.arg(0)?;
    let revision_prefix = args.arg(1)?;
    let stock_prefix = args.arg(2)?;

    let Some(raw) = ctx.get(hold_key) else {
        return Ok(None);
    };
    if let Some(hold) = consume_hold(ctx, hold_key, &raw, reserved_prefix, revision_prefix)? {
        let stock_key = format!("{stock_prefix}{}", hold.item_id);
        let quantity = i64::from(hold.quantity);
        let stock = counter(ctx, &stock_key).unwrap_or(0);
        if stock >= quantity {
            ctx.incr_by(&stock_key, -quantity)?;
        } else {
            ctx.set(&stock_key, "0".to_string());
        }
    }
    Ok(Some(raw))
}

/// Consume a hold without selling it.
///
/// `KEYS`: hold. `ARGV`: reserved-counter prefix, revision prefix. Replies with the
/// raw record, or nil.
///
/// The counter and revision keys are derived from the record inside the script
/// rather than declared in `KEYS`, so this only runs on standalone Redis, not
/// Redis Cluster.
pub static RELEASE: Script = Script::new("release", RELEASE_LUA, release);

/// Consume a hold and sell its units (stock floor-clamped at zero).
///
/// `KEYS`: hold. `ARGV`: reserved-counter prefix, revision prefix, stock prefix.
/// Replies with the raw record, or nil.
///
/// Standalone Redis only, for the same reason as [`RELEASE`].
pub static CONFIRM: Script = Script::new("confirm", CONFIRM_LUA, confirm);

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

const DECREMENT_CLAMPED_LUA: &str = r"
local before = tonumber(redis.call('GET', KEYS[1]) or '0') or 0
local after = before - tonumber(ARGV[1])
if after < 0 then
  after = 0
end
redis.call('SET', KEYS[1], after)
return before .. ':' .. after
";

fn decrement_clamped(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let key = args.key(0)?;
    let amount = args.arg_i64(0)?;

    let before = counter(ctx, key).unwrap_or(0);
    let after = before.saturating_sub(amount).max(0);
    ctx.set(key, after.to_string());
    reply(format!("{before}:{after}"))
}

/// Remove units from stock without going below zero.
///
/// `KEYS`: stock. `ARGV`: amount. Replies `"before:after"`.
pub static DECREMENT_CLAMPED: Script =
    Script::new("decrement_clamped", DECREMENT_CLAMPED_LUA, decrement_clamped);

const REPLACE_LUA: &str = r"
local previous = redis.call('GET', KEYS[1])
redis.call('SET', KEYS[1], ARGV[1])
return previous
";

fn replace(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let key = args.key(0)?;
    let previous = ctx.get(key);
    ctx.set(key, args.arg(0)?.to_string());
    Ok(previous)
}

/// Write a value and return the one it replaced.
///
/// `KEYS`: key. `ARGV`: value.
pub static REPLACE: Script = Script::new("replace", REPLACE_LUA, replace);

const CLAMP_NEGATIVE_LUA: &str = r"
local value = tonumber(redis.call('GET', KEYS[1]) or '0')
if value ~= nil and value < 0 then
  redis.call('SET', KEYS[1], 0)
  return tostring(value)
end
return false
";

fn clamp_negative(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let key = args.key(0)?;
    match counter(ctx, key) {
        Ok(value) if value < 0 => {
            ctx.set(key, "0".to_string());
            reply(value)
        }
        _ => Ok(None),
    }
}

/// Reset a negative stock count to zero.
///
/// `KEYS`: stock. Replies with the negative value found, or nil.
pub static CLAMP_NEGATIVE: Script = Script::new("clamp_negative", CLAMP_NEGATIVE_LUA, clamp_negative);

// ---------------------------------------------------------------------------
// Sweep repairs
// ---------------------------------------------------------------------------

const DELETE_IF_UNCHANGED_LUA: &str = r"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
if ARGV[2] == '1' and redis.call('PTTL', KEYS[1]) ~= -1 then
  return 0
end
redis.call('DEL', KEYS[1])
return 1
";

fn delete_if_unchanged(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let key = args.key(0)?;
    let expected = args.arg(0)?;
    let require_persistent = args.arg(1)? == "1";

    if ctx.get(key).as_deref() != Some(expected) {
        return reply(0);
    }
    if require_persistent && !ctx.ttl(key).is_persistent() {
        return reply(0);
    }
    ctx.delete(key);
    reply(1)
}

/// Delete a key only if it still holds the value seen earlier.
///
/// `KEYS`: key. `ARGV`: expected value, `"1"` to also require no expiry.
/// Replies `1` if deleted.
pub static DELETE_IF_UNCHANGED: Script =
    Script::new("delete_if_unchanged", DELETE_IF_UNCHANGED_LUA, delete_if_unchanged);

/// `RESET_COUNTER` reply: the target was zero and the counter was deleted.
pub const RESET_DELETED: &str = "0";
/// The counter was rewritten.
pub const RESET_WRITTEN: &str = "1";
/// The counter changed since it was observed; nothing was done.
pub const RESET_SKIPPED: &str = "-1";

const RESET_COUNTER_LUA: &str = r"
local current = redis.call('GET', KEYS[1]) or ''
local revision = redis.call('GET', KEYS[2]) or ''
if current ~= ARGV[1] or revision ~= ARGV[2] then
  return -1
end
local target = tonumber(ARGV[3])
if target <= 0 then
  redis.call('DEL', KEYS[1])
  return 0
end
local pttl = redis.call('PTTL', KEYS[1])
if pttl > 0 then
  redis.call('SET', KEYS[1], target, 'PX', pttl)
else
  redis.call('SET', KEYS[1], target, 'PX', ARGV[4])
end
return 1
";

fn reset_counter(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
    let key = args.key(0)?;
    let revision_key = args.key(1)?;
    let observed = args.arg(0)?;
    let observed_revision = args.arg(1)?;
    let target = args.arg_i64(2)?;
    let ttl = millis_arg(args, 3)?;

    if ctx.get(key).unwrap_or_default() != observed
        || ctx.get(revision_key).unwrap_or_default() != observed_revision
    {
        return reply(RESET_SKIPPED);
    }
    if target <= 0 {
        ctx.delete(key);
        return reply(RESET_DELETED);
    }
    let ttl = match ctx.ttl(key) {
        KeyTtl::Expires(remaining) if !remaining.is_zero() => remaining,
        KeyTtl::Expires(_) | KeyTtl::Persistent | KeyTtl::Missing => ttl,
    };
    ctx.set_with_ttl(key, target.to_string(), ttl);
    reply(RESET_WRITTEN)
}

/// Compare-and-set a reserved counter to a recomputed value.
///
/// The revision guards against a hold being consumed and another created for
/// the same quantity between observation and write: the value alone would look
/// unchanged.
///
/// `KEYS`: counter, revision. `ARGV`: value observed earlier (`""` for absent),
/// revision observed earlier (`""` for absent), target, ttl (ms) used when the
/// counter has none. A target of zero deletes the counter.
pub static RESET_COUNTER: Script = Script::new("reset_counter", RESET_COUNTER_LUA, reset_counter);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stockhold_core::KeyValueStore;
    use stockhold_testing::{InMemoryStore, ManualClock};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn reserve_keys() -> Vec<String> {
        args(&["stock:mug", "reserved:mug", "hold:s1", "revision:mug"])
    }

    #[tokio::test]
    async fn test_reserve_replies() {
        let store = InMemoryStore::new();
        store.set("stock:mug", "2".to_string()).await.unwrap();
        let record = r#"{"item_id":"mug","quantity":2}"#;

        let ok = store
            .eval(&RESERVE, reserve_keys(), args(&["2", "600000", record, "25"]))
            .await
            .unwrap();
        assert_eq!(ok.as_deref(), Some(RESERVE_OK));

        let again = store
            .eval(&RESERVE, reserve_keys(), args(&["2", "600000", record, "25"]))
            .await
            .unwrap();
        assert_eq!(again.as_deref(), Some(RESERVE_ALREADY_HELD));
        assert_eq!(store.get("reserved:mug").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("revision:mug").await.unwrap().as_deref(), Some("1"));

        let sold_out = store
            .eval(
                &RESERVE,
                args(&["stock:mug", "reserved:mug", "hold:s2", "revision:mug"]),
                args(&["1", "600000", record, "25"]),
            )
            .await
            .unwrap();
        assert_eq!(sold_out.as_deref(), Some(RESERVE_OUT_OF_STOCK));
        assert_eq!(store.get("hold:s2").await.unwrap(), None);
        assert_eq!(store.get("revision:mug").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_reserve_at_capacity() {
        let store = InMemoryStore::new();
        store.set("stock:mug", "100".to_string()).await.unwrap();
        store.set("reserved:mug", "3".to_string()).await.unwrap();

        let reply = store
            .eval(&RESERVE, reserve_keys(), args(&["1", "1000", "{}", "3"]))
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some(RESERVE_AT_CAPACITY));
    }

    #[tokio::test]
    async fn test_confirm_clamps_stock_and_drops_counter() {
        let store = InMemoryStore::new();
        let record = r#"{"item_id":"mug","quantity":3}"#;
        store.set("stock:mug", "1".to_string()).await.unwrap();
        store.set("reserved:mug", "3".to_string()).await.unwrap();
        store.set("hold:s1", record.to_string()).await.unwrap();

        let reply = store
            .eval(&CONFIRM, args(&["hold:s1"]), args(&["reserved:", "revision:", "stock:"]))
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some(record));
        assert_eq!(store.get("stock:mug").await.unwrap().as_deref(), Some("0"));
        assert_eq!(store.get("reserved:mug").await.unwrap(), None);
        assert_eq!(store.get("hold:s1").await.unwrap(), None);
        assert_eq!(store.get("revision:mug").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_release_of_unreadable_hold_deletes_it_only() {
        let store = InMemoryStore::new();
        store.set("hold:s1", "mug".to_string()).await.unwrap();
        store.set("reserved:mug", "1".to_string()).await.unwrap();

        let reply = store
            .eval(&RELEASE, args(&["hold:s1"]), args(&["reserved:", "revision:"]))
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some("mug"));
        assert_eq!(store.get("hold:s1").await.unwrap(), None);
        assert_eq!(store.get("reserved:mug").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("revision:mug").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decrement_clamped_reports_before_and_after() {
        let store = InMemoryStore::new();
        store.set("stock:mug", "2".to_string()).await.unwrap();

        let reply = store
            .eval(&DECREMENT_CLAMPED, args(&["stock:mug"]), args(&["5"]))
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("2:0"));
    }

    #[tokio::test]
    async fn test_reset_counter_is_compare_and_set() {
        let clock = Arc::new(ManualClock::starting_at_test_epoch());
        let store = InMemoryStore::with_clock(clock);
        store.set("reserved:mug", "4".to_string()).await.unwrap();
        store.set("revision:mug", "7".to_string()).await.unwrap();
        let keys = || args(&["reserved:mug", "revision:mug"]);

        let skipped = store
            .eval(&RESET_COUNTER, keys(), args(&["3", "7", "1", "1000"]))
            .await
            .unwrap();
        assert_eq!(skipped.as_deref(), Some(RESET_SKIPPED));

        // Same value, newer revision: a hold came and went in between.
        let stale = store
            .eval(&RESET_COUNTER, keys(), args(&["4", "6", "1", "1000"]))
            .await
            .unwrap();
        assert_eq!(stale.as_deref(), Some(RESET_SKIPPED));
        assert_eq!(store.get("reserved:mug").await.unwrap().as_deref(), Some("4"));

        let written = store
            .eval(&RESET_COUNTER, keys(), args(&["4", "7", "1", "1000"]))
            .await
            .unwrap();
        assert_eq!(written.as_deref(), Some(RESET_WRITTEN));
        assert_eq!(
            store.ttl("reserved:mug").await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(1))
        );

        let deleted = store
            .eval(&RESET_COUNTER, keys(), args(&["1", "7", "0", "1000"]))
            .await
            .unwrap();
        assert_eq!(deleted.as_deref(), Some(RESET_DELETED));
        assert_eq!(store.get("reserved:mug").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_if_unchanged_respects_expiry_requirement() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("hold:s1", "x".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let kept = store
            .eval(&DELETE_IF_UNCHANGED, args(&["hold:s1"]), args(&["x", "1"]))
            .await
            .unwrap();
        assert_eq!(kept.as_deref(), Some("0"));

        let deleted = store
            .eval(&DELETE_IF_UNCHANGED, args(&["hold:s1"]), args(&["x", "0"]))
            .await
            .unwrap();
        assert_eq!(deleted.as_deref(), Some("1"));
    }
}
