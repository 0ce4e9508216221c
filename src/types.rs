use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;

/// Values that can be stored in a row, bound to a statement, or read back
/// from a query result.
///
/// One enum for the whole crate so the escaper, the mapper and the driver
/// seam never branch on driver-specific types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let SqlValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let SqlValue::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let SqlValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let SqlValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Arguments for printf-style SQL substitution.
///
/// Mirrors the three shapes the escaper accepts: a positional list, a
/// name-keyed mapping, or a single scalar.
#[derive(Debug, Clone)]
pub enum SqlArgs {
    /// Values consumed left to right by `%s` / `%d` placeholders.
    Positional(Vec<SqlValue>),
    /// Values looked up by `%(name)s` placeholders.
    Named(HashMap<String, SqlValue>),
    /// A single value for a single placeholder.
    Scalar(SqlValue),
}

impl SqlArgs {
    /// The empty positional tuple. Substitution still runs against it, so a
    /// template carrying a literal percent must spell it `%%`.
    #[must_use]
    pub fn empty() -> Self {
        SqlArgs::Positional(Vec::new())
    }
}

impl From<Vec<SqlValue>> for SqlArgs {
    fn from(values: Vec<SqlValue>) -> Self {
        SqlArgs::Positional(values)
    }
}

impl From<SqlValue> for SqlArgs {
    fn from(value: SqlValue) -> Self {
        SqlArgs::Scalar(value)
    }
}

impl From<HashMap<String, SqlValue>> for SqlArgs {
    fn from(values: HashMap<String, SqlValue>) -> Self {
        SqlArgs::Named(values)
    }
}

/// Outcome vocabulary for the CRUD operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudStatus {
    Ok,
    Created,
    Updated,
    NoChanges,
    Failed,
}

impl fmt::Display for CrudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CrudStatus::Ok => "OK",
            CrudStatus::Created => "CREATED",
            CrudStatus::Updated => "UPDATED",
            CrudStatus::NoChanges => "NO CHANGES",
            CrudStatus::Failed => "FAILED",
        };
        f.write_str(msg)
    }
}

/// Shape of the rows a query hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// Column-positional values.
    Tuple,
    /// Column-name keyed values.
    Dict,
    /// Typed records built through the queryset's [`RecordAdapter`].
    ///
    /// [`RecordAdapter`]: crate::record::RecordAdapter
    Record,
}

/// The scalar (and, unsupported, compound) kinds a typed record field can
/// declare. The mapper resolves each kind through a single registry; compound
/// and geographic kinds have no registry entry and fail loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Url,
    Email,
    Uuid,
    ObjectId,
    Number,
    Int,
    Long,
    Float,
    Decimal,
    Md5,
    Sha1,
    Boolean,
    DateTime,
    GeoPoint,
    List,
    SortedList,
    Dict,
    MultiValueDict,
    Embedded,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "String",
            FieldKind::Url => "Url",
            FieldKind::Email => "Email",
            FieldKind::Uuid => "Uuid",
            FieldKind::ObjectId => "ObjectId",
            FieldKind::Number => "Number",
            FieldKind::Int => "Int",
            FieldKind::Long => "Long",
            FieldKind::Float => "Float",
            FieldKind::Decimal => "Decimal",
            FieldKind::Md5 => "Md5",
            FieldKind::Sha1 => "Sha1",
            FieldKind::Boolean => "Boolean",
            FieldKind::DateTime => "DateTime",
            FieldKind::GeoPoint => "GeoPoint",
            FieldKind::List => "List",
            FieldKind::SortedList => "SortedList",
            FieldKind::Dict => "Dict",
            FieldKind::MultiValueDict => "MultiValueDict",
            FieldKind::Embedded => "Embedded",
        };
        f.write_str(name)
    }
}
