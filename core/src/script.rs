//! Atomic scripted transactions.
//!
//! A [`Script`] is one transaction written twice:
//!
//! - **Lua** source, executed server-side by Redis (`EVALSHA`/`EVAL`). Redis runs
//!   scripts one at a time, so the body is atomic with respect to every other
//!   command.
//! - A **Rust body** over [`ScriptContext`], executed by in-process stores while
//!   they hold their single lock. This gives the same atomicity for tests and
//!   embedded use.
//!
//! Both bodies receive the same `KEYS` and `ARGV` and must return the same reply.
//! Replies are `Option<String>`: integers are rendered in decimal and `nil`
//! becomes `None`.

use crate::store::{KeyTtl, Result, StoreError};
use std::fmt;
use std::time::Duration;

/// Synchronous view of the store used by a script's Rust body.
///
/// Semantics follow the equivalent Redis commands: `set` clears an expiry,
/// `incr_by` preserves it, a missing counter reads as zero.
pub trait ScriptContext {
    /// `GET key`
    fn get(&self, key: &str) -> Option<String>;

    /// `SET key value` (clears expiry)
    fn set(&mut self, key: &str, value: String);

    /// `SET key value PX ttl`
    fn set_with_ttl(&mut self, key: &str, value: String, ttl: Duration);

    /// `INCRBY key delta`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidValue`] if the key holds a non-integer.
    fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64>;

    /// `PEXPIRE key ttl`
    fn expire(&mut self, key: &str, ttl: Duration) -> bool;

    /// `PTTL key`
    fn ttl(&self, key: &str) -> KeyTtl;

    /// `DEL key`
    fn delete(&mut self, key: &str) -> bool;
}

/// `KEYS` and `ARGV` handed to a script's Rust body.
#[derive(Debug, Clone, Copy)]
pub struct ScriptArgs<'a> {
    script: &'static str,
    keys: &'a [String],
    args: &'a [String],
}

impl<'a> ScriptArgs<'a> {
    /// Bundle the arguments of one invocation.
    #[must_use]
    pub const fn new(script: &'static str, keys: &'a [String], args: &'a [String]) -> Self {
        Self { script, keys, args }
    }

    /// `KEYS[index + 1]`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Script`] if the key was not supplied.
    pub fn key(&self, index: usize) -> Result<&'a str> {
        self.keys
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.error(format!("missing KEYS[{}]", index + 1)))
    }

    /// `ARGV[index + 1]`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Script`] if the argument was not supplied.
    pub fn arg(&self, index: usize) -> Result<&'a str> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.error(format!("missing ARGV[{}]", index + 1)))
    }

    /// `tonumber(ARGV[index + 1])`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Script`] if the argument is missing or not an integer.
    pub fn arg_i64(&self, index: usize) -> Result<i64> {
        let raw = self.arg(index)?;
        raw.parse::<i64>()
            .map_err(|_| self.error(format!("ARGV[{}] is not an integer: {raw}", index + 1)))
    }

    /// Build a script error attributed to this invocation.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> StoreError {
        StoreError::Script {
            script: self.script,
            message: message.into(),
        }
    }
}

/// Rust body of a script.
pub type ScriptBody = fn(&mut dyn ScriptContext, &ScriptArgs<'_>) -> Result<Option<String>>;

/// An atomic transaction with a Lua body and an equivalent Rust body.
///
/// Scripts are declared as `static` items next to the code that uses them:
///
/// ```
/// use stockhold_core::script::{Script, ScriptArgs, ScriptContext};
/// use stockhold_core::store::Result;
///
/// fn touch(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
///     let value = ctx.incr_by(args.key(0)?, 1)?;
///     Ok(Some(value.to_string()))
/// }
///
/// static TOUCH: Script = Script::new(
///     "touch",
///     "return redis.call('INCRBY', KEYS[1], 1)",
///     touch,
/// );
///
/// assert_eq!(TOUCH.name(), "touch");
/// ```
pub struct Script {
    name: &'static str,
    lua: &'static str,
    body: ScriptBody,
}

impl Script {
    /// Declare a script.
    #[must_use]
    pub const fn new(name: &'static str, lua: &'static str, body: ScriptBody) -> Self {
        Self { name, lua, body }
    }

    /// Script name (used in logs and errors).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Lua source for server-side execution.
    #[must_use]
    pub const fn lua(&self) -> &'static str {
        self.lua
    }

    /// Execute the Rust body against an in-process store.
    ///
    /// The caller is responsible for holding whatever lock makes the body atomic.
    ///
    /// # Errors
    ///
    /// Propagates any error raised by the body.
    pub fn run_local(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<String>> {
        (self.body)(ctx, &ScriptArgs::new(self.name, keys, args))
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapContext {
        values: HashMap<String, String>,
    }

    impl ScriptContext for MapContext {
        fn get(&self, key: &str) -> Option<String> {
            self.values.get(key).cloned()
        }

        fn set(&mut self, key: &str, value: String) {
            self.values.insert(key.to_string(), value);
        }

        fn set_with_ttl(&mut self, key: &str, value: String, _ttl: Duration) {
            self.set(key, value);
        }

        fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
            let current = crate::store::parse_counter(key, self.get(key).as_deref())?;
            let next = current + delta;
            self.set(key, next.to_string());
            Ok(next)
        }

        fn expire(&mut self, key: &str, _ttl: Duration) -> bool {
            self.values.contains_key(key)
        }

        fn ttl(&self, key: &str) -> KeyTtl {
            if self.values.contains_key(key) {
                KeyTtl::Persistent
            } else {
                KeyTtl::Missing
            }
        }

        fn delete(&mut self, key: &str) -> bool {
            self.values.remove(key).is_some()
        }
    }

    fn add(ctx: &mut dyn ScriptContext, args: &ScriptArgs<'_>) -> Result<Option<String>> {
        let value = ctx.incr_by(args.key(0)?, args.arg_i64(0)?)?;
        Ok(Some(value.to_string()))
    }

    static ADD: Script = Script::new("add", "return redis.call('INCRBY', KEYS[1], ARGV[1])", add);

    #[test]
    fn test_run_local_executes_body() {
        let mut ctx = MapContext::default();
        let keys = vec!["counter".to_string()];

        let reply = ADD.run_local(&mut ctx, &keys, &["3".to_string()]);
        assert_eq!(reply, Ok(Some("3".to_string())));

        let reply = ADD.run_local(&mut ctx, &keys, &["-1".to_string()]);
        assert_eq!(reply, Ok(Some("2".to_string())));
    }

    #[test]
    fn test_missing_argument_is_script_error() {
        let mut ctx = MapContext::default();
        let reply = ADD.run_local(&mut ctx, &["counter".to_string()], &[]);

        assert_eq!(
            reply,
            Err(StoreError::Script {
                script: "add",
                message: "missing ARGV[1]".to_string(),
            })
        );
    }

    #[test]
    fn test_non_integer_argument_is_script_error() {
        let mut ctx = MapContext::default();
        let reply = ADD.run_local(&mut ctx, &["counter".to_string()], &["x".to_string()]);

        assert!(matches!(reply, Err(StoreError::Script { script: "add", .. })));
    }
}
