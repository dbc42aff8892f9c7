//! redb table definitions for the Berth task store.

use redb::TableDefinition;

/// A table of JSON-serialized values keyed by string.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Task records keyed by task instance name.
pub const TASKS: JsonTable = TableDefinition::new("tasks");

/// Latest task status keyed by task instance name.
pub const STATUSES: JsonTable = TableDefinition::new("statuses");
