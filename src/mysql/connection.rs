use async_trait::async_trait;
use mysql_async::Conn;
use mysql_async::prelude::Queryable;

use crate::driver::{DriverConnection, ExecResult};
use crate::error::QuerysetError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// [`DriverConnection`] over a live `mysql_async` session.
pub struct MysqlConnection {
    conn: Conn,
}

impl MysqlConnection {
    #[must_use]
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DriverConnection for MysqlConnection {
    async fn ping(&mut self) -> Result<(), QuerysetError> {
        self.conn.ping().await.map_err(QuerysetError::from)
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecResult, QuerysetError> {
        self.conn.query_drop(sql).await?;
        Ok(ExecResult {
            affected_rows: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id(),
        })
    }

    async fn query(&mut self, sql: &str) -> Result<ResultSet, QuerysetError> {
        let rows: Vec<mysql_async::Row> = self.conn.query(sql).await?;
        Ok(build_result_set(rows))
    }

    async fn commit(&mut self) -> Result<(), QuerysetError> {
        self.conn.query_drop("COMMIT").await.map_err(QuerysetError::from)
    }

    async fn rollback(&mut self) -> Result<(), QuerysetError> {
        self.conn
            .query_drop("ROLLBACK")
            .await
            .map_err(QuerysetError::from)
    }

    async fn close(self: Box<Self>) -> Result<(), QuerysetError> {
        self.conn.disconnect().await.map_err(QuerysetError::from)
    }
}

fn build_result_set(rows: Vec<mysql_async::Row>) -> ResultSet {
    let columns: Vec<String> = rows
        .first()
        .map(|row| {
            row.columns_ref()
                .iter()
                .map(|c| c.name_str().to_string())
                .collect()
        })
        .unwrap_or_default();
    let mut result = ResultSet::new(columns);
    for row in rows {
        let values: Vec<SqlValue> = (0..row.len())
            .map(|i| from_driver_value(row.get(i).unwrap_or(mysql_async::Value::NULL)))
            .collect();
        result.push_row(values);
    }
    result
}

fn from_driver_value(value: mysql_async::Value) -> SqlValue {
    match value {
        mysql_async::Value::NULL => SqlValue::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(err) => SqlValue::Blob(err.into_bytes()),
        },
        mysql_async::Value::Int(i) => SqlValue::Int(i),
        mysql_async::Value::UInt(u) => SqlValue::Int(i64::try_from(u).unwrap_or(i64::MAX)),
        mysql_async::Value::Float(f) => SqlValue::Float(f64::from(f)),
        mysql_async::Value::Double(d) => SqlValue::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            let time = chrono::NaiveTime::from_hms_micro_opt(
                u32::from(hour),
                u32::from(min),
                u32::from(sec),
                micro,
            );
            match (date, time) {
                (Some(date), Some(time)) => {
                    SqlValue::Timestamp(chrono::NaiveDateTime::new(date, time))
                }
                _ => SqlValue::Null,
            }
        }
        mysql_async::Value::Time(neg, days, hour, min, sec, micro) => {
            let sign = if neg { "-" } else { "" };
            let hours = days * 24 + u32::from(hour);
            SqlValue::Text(format!("{sign}{hours:02}:{min:02}:{sec:02}.{micro:06}"))
        }
    }
}
