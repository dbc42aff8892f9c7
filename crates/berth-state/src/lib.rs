//! berth-state — task record persistence for Berth.
//!
//! The plan engine only ever talks to the [`TaskStore`] trait. The bundled
//! [`StateStore`] implements it on top of [redb](https://docs.rs/redb),
//! either on disk or fully in memory for tests.
//!
//! # Layout
//!
//! Task records and their latest statuses live in two tables keyed by the
//! task instance name (`{pod_type}-{pod_index}-{task_spec}`). Values are
//! JSON-serialized into redb's `&[u8]` columns.

pub mod error;
pub mod store;
pub mod tables;
pub mod task_store;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use task_store::TaskStore;
