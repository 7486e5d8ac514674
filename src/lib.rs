#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A concurrent in-memory map whose entries expire a fixed time after they
//! were last *touched*, with an optional bound on the number of entries.
//!
//! The map is a plain key/value store with compare-and-swap style compound
//! operations (`insert_if_absent`, `replace_if_equals`, `remove_if_equals`),
//! backed by a hash table split into independently locked segments so that
//! operations on distinct keys proceed in parallel.
//!
//! Two retention mechanisms compose, and they are independent of each other:
//!
//! - **Time to live** makes an entry logically invisible once the configured
//!   duration has passed since its last touch. Expiry is evaluated lazily at
//!   access time; there is no background sweeper thread, and the raw entry
//!   count reported by `len` keeps counting stale entries until something
//!   overwrites, removes or evicts them.
//! - **Target size** caps the raw entry count. An insert that overflows the
//!   cap synchronously evicts the least-recently-touched entries (stale or
//!   not) and reports each victim to an optional eviction listener.
//!
//! Which accessors count as a touch is fixed at construction time: inserts
//! and successful replaces always touch, `get` and iteration only touch when
//! the `touch_on_get` / `touch_on_iterate` knobs are set, and the `contains_*`
//! checks never touch.
//!
//! # Example
//!
//! ```rust
//! use expiry_map::sync::ExpiringMap;
//! use std::time::Duration;
//!
//! // A lookup memo: entries are dropped two minutes after the last read.
//! let memo: ExpiringMap<u64, String> = ExpiringMap::builder()
//!     .time_to_live(Duration::from_secs(120))
//!     .touch_on_get(true)
//!     .build();
//!
//! memo.insert(42, "forty-two".to_string());
//! assert_eq!(memo.get(&42), Some("forty-two".to_string()));
//! assert_eq!(memo.get(&7), None);
//! ```
//!
//! # Crate features
//!
//! - `quanta` (enabled by default): samples time through a
//!   [quanta](https://crates.io/crates/quanta) clock, which can be cheaper
//!   than `std::time::Instant` on hot read paths.
//! - `logging`: emits a `log` record when an eviction listener panics, before
//!   the panic is propagated to the inserting caller.

pub(crate) mod common;
pub(crate) mod map;
pub mod notification;
mod policy;
pub mod sync;

pub use common::error::ConfigError;
pub use policy::Policy;
