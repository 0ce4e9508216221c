use std::collections::HashMap;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::error::QuerysetError;
use crate::results::DbRow;
use crate::types::{FieldKind, SqlValue};

/// One typed attribute of a [`Record`]: the declared scalar kind plus the
/// current value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    kind: FieldKind,
    value: SqlValue,
}

impl FieldValue {
    #[must_use]
    pub fn new(kind: FieldKind, value: SqlValue) -> Self {
        Self { kind, value }
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(FieldKind::String, SqlValue::Text(value.into()))
    }

    #[must_use]
    pub fn url(value: impl Into<String>) -> Self {
        Self::new(FieldKind::Url, SqlValue::Text(value.into()))
    }

    #[must_use]
    pub fn email(value: impl Into<String>) -> Self {
        Self::new(FieldKind::Email, SqlValue::Text(value.into()))
    }

    #[must_use]
    pub fn uuid(value: Uuid) -> Self {
        Self::new(FieldKind::Uuid, SqlValue::Text(value.to_string()))
    }

    #[must_use]
    pub fn object_id(value: impl Into<String>) -> Self {
        Self::new(FieldKind::ObjectId, SqlValue::Text(value.into()))
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::new(FieldKind::Int, SqlValue::Int(value))
    }

    #[must_use]
    pub fn long(value: i64) -> Self {
        Self::new(FieldKind::Long, SqlValue::Int(value))
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::new(FieldKind::Float, SqlValue::Float(value))
    }

    /// Fixed-point decimals travel as their string rendering.
    #[must_use]
    pub fn decimal(value: impl Into<String>) -> Self {
        Self::new(FieldKind::Decimal, SqlValue::Text(value.into()))
    }

    #[must_use]
    pub fn md5(digest: impl Into<String>) -> Self {
        Self::new(FieldKind::Md5, SqlValue::Text(digest.into()))
    }

    #[must_use]
    pub fn sha1(digest: impl Into<String>) -> Self {
        Self::new(FieldKind::Sha1, SqlValue::Text(digest.into()))
    }

    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::new(FieldKind::Boolean, SqlValue::Bool(value))
    }

    #[must_use]
    pub fn datetime(value: NaiveDateTime) -> Self {
        Self::new(FieldKind::DateTime, SqlValue::Timestamp(value))
    }
}

/// An application-level record: an optional integer identity plus named,
/// typed attributes. The mapper only ever reads fields a table descriptor
/// declares; extra fields are ignored, missing ones map to NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    id: Option<i64>,
    fields: HashMap<String, FieldValue>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// The capability a table-specific adapter supplies to turn dict rows into
/// typed records. The generic facade stays generic over row shape; anything
/// asking for record output without an adapter fails with an
/// `Unimplemented` error.
pub trait RecordAdapter: Send + Sync {
    /// Build a typed record from one dict row.
    ///
    /// # Errors
    ///
    /// Implementations surface missing or ill-typed columns as
    /// `QuerysetError`.
    fn record_from_row(&self, row: &DbRow) -> Result<Record, QuerysetError>;
}
