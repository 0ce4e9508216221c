//! Field-to-SQL mapping: safe column lists for SELECT and column=value
//! assignment lists for INSERT/UPDATE.
//!
//! Per-kind behavior lives in one registry keyed by [`FieldKind`], resolved
//! in a single lookup per field, so the formatter and the value extraction
//! cannot drift apart.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::{FieldSpec, TableConfig};
use crate::error::QuerysetError;
use crate::record::{FieldValue, Record};
use crate::types::{FieldKind, SqlValue};

/// How one scalar kind renders into an assignment: the placeholder that goes
/// into the format string and the extraction of the bound value.
pub struct FieldCodec {
    placeholder: &'static str,
    extract: fn(&FieldValue) -> SqlValue,
}

impl FieldCodec {
    #[must_use]
    pub fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    #[must_use]
    pub fn extract(&self, field: &FieldValue) -> SqlValue {
        (self.extract)(field)
    }
}

fn identity(field: &FieldValue) -> SqlValue {
    field.value().clone()
}

// Every supported scalar kind formats through the identity placeholder; the
// escaper decides the literal rendering. Compound and geographic kinds have
// no entry and fail at lookup.
static CODECS: LazyLock<HashMap<FieldKind, FieldCodec>> = LazyLock::new(|| {
    let supported = [
        FieldKind::String,
        FieldKind::Url,
        FieldKind::Email,
        FieldKind::Uuid,
        FieldKind::ObjectId,
        FieldKind::Number,
        FieldKind::Int,
        FieldKind::Long,
        FieldKind::Float,
        FieldKind::Decimal,
        FieldKind::Md5,
        FieldKind::Sha1,
        FieldKind::Boolean,
        FieldKind::DateTime,
    ];
    supported
        .into_iter()
        .map(|kind| {
            (
                kind,
                FieldCodec {
                    placeholder: "%s",
                    extract: identity,
                },
            )
        })
        .collect()
});

/// Resolve the codec for a scalar kind.
///
/// # Errors
///
/// Returns `QuerysetError::UnsupportedFieldType` naming the field for
/// compound and geographic kinds.
pub fn codec_for(field_name: &str, kind: FieldKind) -> Result<&'static FieldCodec, QuerysetError> {
    CODECS.get(&kind).ok_or(QuerysetError::UnsupportedFieldType {
        field: field_name.to_string(),
        kind,
    })
}

/// One field of a bound table descriptor.
#[derive(Debug, Clone)]
pub struct BoundField {
    name: String,
    alias: Option<String>,
    read_format: Option<String>,
    write_format: Option<String>,
}

impl BoundField {
    fn from_spec(spec: &FieldSpec) -> Self {
        match spec {
            FieldSpec::Name(name) => BoundField {
                name: name.clone(),
                alias: None,
                read_format: None,
                write_format: None,
            },
            FieldSpec::Descriptor(desc) => BoundField {
                name: desc.name.clone(),
                alias: desc.alias.clone(),
                read_format: desc.read_format.clone(),
                write_format: desc.write_format.clone(),
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The SELECT-list rendering: quoted, alias-prefixed, with the read
    /// format applied and the result aliased when the field is structured.
    fn select_expr(&self, prefix: &str) -> String {
        let quoted = format!("{prefix}`{}`", self.name);
        if self.alias.is_none() && self.read_format.is_none() && self.write_format.is_none() {
            return quoted;
        }
        let result_alias = self.alias.as_deref().unwrap_or(&self.name);
        let expr = match &self.read_format {
            Some(fmt) => fmt.replacen("%s", &quoted, 1),
            None => quoted,
        };
        format!("{expr} as `{result_alias}`")
    }

    fn plain_expr(&self, prefix: &str) -> String {
        format!("{prefix}`{}`", self.name)
    }

    /// The assignment fragment and bound value for this field against a
    /// record.
    fn assignment(&self, record: &Record) -> Result<(String, SqlValue), QuerysetError> {
        let (placeholder, value) = if self.name == "id" && record.field("id").is_none() {
            // The identity field always formats as %s.
            ("%s", record.id().map_or(SqlValue::Null, SqlValue::Int))
        } else {
            match record.field(&self.name) {
                Some(field) => {
                    let codec = codec_for(&self.name, field.kind())?;
                    (codec.placeholder(), codec.extract(field))
                }
                // Undeclared on the record: store NULL.
                None => ("%s", SqlValue::Null),
            }
        };
        let slot = match &self.write_format {
            Some(fmt) => fmt.replacen("%s", placeholder, 1),
            None => placeholder.to_string(),
        };
        Ok((format!("{}={slot}", self.name), value))
    }
}

/// A table descriptor bound to a queryset: name, full field list, mutable
/// subset. Built once from configuration, immutable thereafter.
#[derive(Debug, Clone)]
pub struct TableBinding {
    table_name: String,
    fields: Vec<BoundField>,
    mutable: Vec<BoundField>,
}

impl TableBinding {
    /// Bind a table configuration. Mutable entries inherit the structured
    /// descriptor of the matching full-list field, if any.
    #[must_use]
    pub fn from_config(config: &TableConfig) -> Self {
        let fields: Vec<BoundField> = config.fields.iter().map(BoundField::from_spec).collect();
        let mutable = config
            .fields_mutable
            .iter()
            .map(|name| {
                fields
                    .iter()
                    .find(|f| f.name == *name)
                    .cloned()
                    .unwrap_or_else(|| BoundField {
                        name: name.clone(),
                        alias: None,
                        read_format: None,
                        write_format: None,
                    })
            })
            .collect();
        TableBinding {
            table_name: config.table_name.clone(),
            fields,
            mutable,
        }
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn prefix(alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!("`{alias}`."),
            None => String::new(),
        }
    }

    /// Backtick-quoted column list for SELECT statements, honoring read
    /// formats and result aliases.
    #[must_use]
    pub fn select_column_list(&self, alias: Option<&str>) -> String {
        let prefix = Self::prefix(alias);
        self.fields
            .iter()
            .map(|f| f.select_expr(&prefix))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Backtick-quoted column list without select-mode formatting.
    #[must_use]
    pub fn column_list(&self, alias: Option<&str>) -> String {
        let prefix = Self::prefix(alias);
        self.fields
            .iter()
            .map(|f| f.plain_expr(&prefix))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `column=%s` assignment list plus bound values over the full field
    /// list, for INSERT.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::UnsupportedFieldType` when a record field
    /// declares a compound or geographic kind.
    pub fn insert_assignments(
        &self,
        record: &Record,
    ) -> Result<(String, Vec<SqlValue>), QuerysetError> {
        Self::assignments(&self.fields, record)
    }

    /// Assignment list over the mutable subset, for UPDATE and the upsert
    /// arm of INSERT.
    ///
    /// # Errors
    ///
    /// Same as [`TableBinding::insert_assignments`].
    pub fn update_assignments(
        &self,
        record: &Record,
    ) -> Result<(String, Vec<SqlValue>), QuerysetError> {
        Self::assignments(&self.mutable, record)
    }

    fn assignments(
        fields: &[BoundField],
        record: &Record,
    ) -> Result<(String, Vec<SqlValue>), QuerysetError> {
        let mut fragments = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let (fragment, value) = field.assignment(record)?;
            fragments.push(fragment);
            values.push(value);
        }
        Ok((fragments.join(","), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldDescriptor;

    fn table_config() -> TableConfig {
        TableConfig {
            table_name: "items".to_string(),
            fields: vec![
                FieldSpec::Name("id".to_string()),
                FieldSpec::Name("title".to_string()),
                FieldSpec::Descriptor(FieldDescriptor {
                    name: "created".to_string(),
                    alias: Some("created_at".to_string()),
                    read_format: Some("UNIX_TIMESTAMP(%s)".to_string()),
                    write_format: Some("FROM_UNIXTIME(%s)".to_string()),
                }),
            ],
            fields_mutable: vec!["title".to_string(), "created".to_string()],
        }
    }

    #[test]
    fn select_list_applies_read_format_and_alias() {
        let binding = TableBinding::from_config(&table_config());
        assert_eq!(
            binding.select_column_list(None),
            "`id`,`title`,UNIX_TIMESTAMP(`created`) as `created_at`"
        );
        assert_eq!(
            binding.select_column_list(Some("i")),
            "`i`.`id`,`i`.`title`,UNIX_TIMESTAMP(`i`.`created`) as `created_at`"
        );
    }

    #[test]
    fn plain_list_skips_select_formatting() {
        let binding = TableBinding::from_config(&table_config());
        assert_eq!(binding.column_list(None), "`id`,`title`,`created`");
    }

    #[test]
    fn assignments_wrap_write_format_and_extract_values() {
        let binding = TableBinding::from_config(&table_config());
        let record = Record::new()
            .with_field("title", FieldValue::string("hello"))
            .with_field("created", FieldValue::int(12));
        let (fmt, values) = binding.insert_assignments(&record).unwrap();
        assert_eq!(fmt, "id=%s,title=%s,created=FROM_UNIXTIME(%s)");
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Text("hello".to_string()),
                SqlValue::Int(12)
            ]
        );

        let (fmt, values) = binding.update_assignments(&record).unwrap();
        assert_eq!(fmt, "title=%s,created=FROM_UNIXTIME(%s)");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn compound_kinds_fail_naming_the_field() {
        let binding = TableBinding::from_config(&table_config());
        let record = Record::new()
            .with_field("title", FieldValue::new(FieldKind::List, SqlValue::Null));
        let err = binding.insert_assignments(&record).unwrap_err();
        match err {
            QuerysetError::UnsupportedFieldType { field, kind } => {
                assert_eq!(field, "title");
                assert_eq!(kind, FieldKind::List);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_record_fields_store_null() {
        let binding = TableBinding::from_config(&table_config());
        let record = Record::new().with_id(9);
        let (_, values) = binding.insert_assignments(&record).unwrap();
        assert_eq!(values[0], SqlValue::Int(9));
        assert_eq!(values[1], SqlValue::Null);
    }
}
