use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{ClientIdentity, Conn, OptsBuilder, SslOpts};
use tracing::debug;

use crate::config::{ConnectionConfig, DEFAULT_UNICODE_COLLATION, Settings, SslConfig};
use crate::driver::{ConnectionFactory, DriverConnection};
use crate::error::QuerysetError;
use crate::mysql::MysqlConnection;

/// Opens MySQL connections from one immutable [`ConnectionConfig`].
pub struct MysqlFactory {
    config: ConnectionConfig,
}

impl MysqlFactory {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.connection.clone())
    }

    fn build_opts(&self) -> OptsBuilder {
        let cfg = &self.config;
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(cfg.host.clone())
            .tcp_port(cfg.port)
            .user(Some(cfg.user.clone()))
            .pass(Some(cfg.password.clone()))
            .db_name(Some(cfg.database.clone()));
        if cfg.uses_default_unicode_collation() {
            // Drivers do not always honor the requested charset; force it at
            // connect time too.
            builder = builder.init(charset_statements());
        }
        if let Some(ssl) = &cfg.ssl {
            builder = builder.ssl_opts(Some(build_ssl_opts(ssl)));
        }
        builder
    }
}

fn charset_statements() -> Vec<String> {
    vec![
        format!("SET NAMES '{DEFAULT_UNICODE_COLLATION}'"),
        format!("SET CHARACTER SET {DEFAULT_UNICODE_COLLATION}"),
    ]
}

fn build_ssl_opts(ssl: &SslConfig) -> SslOpts {
    let mut opts = SslOpts::default();
    if let Some(ca) = &ssl.ca {
        opts = opts.with_root_certs(vec![ca.clone().into()]);
    }
    if let (Some(cert), Some(key)) = (&ssl.cert, &ssl.key) {
        opts = opts.with_client_identity(Some(ClientIdentity::new(
            cert.clone().into(),
            key.clone().into(),
        )));
    }
    opts
}

#[async_trait]
impl ConnectionFactory for MysqlFactory {
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, QuerysetError> {
        let mut conn = Conn::new(self.build_opts()).await.map_err(|e| {
            QuerysetError::Connection(format!(
                "failed to connect to MySQL at {}:{}: {e}",
                self.config.host, self.config.port
            ))
        })?;
        if self.config.uses_default_unicode_collation() {
            for stmt in charset_statements() {
                conn.query_drop(stmt.as_str()).await.map_err(|e| {
                    QuerysetError::Connection(format!("failed to force session charset: {e}"))
                })?;
            }
        }
        debug!(host = %self.config.host, database = %self.config.database, "MySQL connection ready");
        Ok(Box::new(MysqlConnection::new(conn)))
    }
}
