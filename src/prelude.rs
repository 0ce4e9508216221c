//! Convenient imports for common functionality.

pub use crate::config::{ConnectionConfig, FieldDescriptor, FieldSpec, Settings, TableConfig};
pub use crate::driver::{ConnectionFactory, DriverConnection, ExecResult};
pub use crate::error::QuerysetError;
pub use crate::mapper::TableBinding;
pub use crate::pool::{ConnectionLease, ConnectionPool, ConnectionSource};
pub use crate::queryset::{ExecOutcome, Queryset, ReadOutcome, Row};
pub use crate::record::{FieldValue, Record, RecordAdapter};
pub use crate::results::{DbRow, ResultSet};
pub use crate::types::{CrudStatus, FieldKind, RowFormat, SqlArgs, SqlValue};

#[cfg(feature = "mysql")]
pub use crate::mysql::{MysqlConnection, MysqlFactory};
