//! Warehouse connections over the Postgres wire protocol.
//!
//! Redshift rejects prepared statements for COPY, DDL, and MERGE, so every
//! statement is sent as plain text through the simple-query protocol. One
//! connection serves one load call; there is no pool.

use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Executor};

use crate::error::{LoadError, Result};

#[derive(Builder, Clone)]
pub struct ConnectionParams {
    #[builder(setter(into))]
    pub host: String,
    #[builder(default = "crate::config::DEFAULT_WAREHOUSE_PORT")]
    pub port: u16,
    #[builder(setter(into))]
    pub database: String,
    #[builder(setter(into))]
    pub username: String,
    #[builder(setter(into))]
    pub password: String,
}

/// Where connections come from. The scripted variant records statements
/// instead of talking to a warehouse.
pub enum Connector {
    Redshift(ConnectionParams),
    #[cfg(test)]
    Scripted(scripted::ScriptedFactory),
}

impl Connector {
    pub async fn connect(&self) -> Result<WarehouseConn> {
        match self {
            Connector::Redshift(params) => {
                let options = PgConnectOptions::new()
                    .host(&params.host)
                    .port(params.port)
                    .database(&params.database)
                    .username(&params.username)
                    .password(&params.password)
                    .ssl_mode(PgSslMode::Prefer);
                let conn = PgConnection::connect_with(&options).await.map_err(|err| {
                    LoadError::connection(format!(
                        "connect to {}:{}: {err}",
                        params.host, params.port
                    ))
                })?;
                Ok(WarehouseConn::Redshift(Box::new(conn)))
            }
            #[cfg(test)]
            Connector::Scripted(factory) => factory.connect(),
        }
    }
}

/// An open connection for one load call.
pub enum WarehouseConn {
    Redshift(Box<PgConnection>),
    #[cfg(test)]
    Scripted(scripted::ScriptedConn),
}

impl WarehouseConn {
    /// Execute one statement as plain text.
    pub async fn execute(&mut self, statement: &str) -> Result<()> {
        match self {
            WarehouseConn::Redshift(conn) => conn
                .execute(statement)
                .await
                .map(|_| ())
                .map_err(|err| LoadError::query(format!("{err}"))),
            #[cfg(test)]
            WarehouseConn::Scripted(conn) => conn.execute(statement),
        }
    }

    pub async fn close(self) -> Result<()> {
        match self {
            WarehouseConn::Redshift(conn) => conn
                .close()
                .await
                .map_err(|err| LoadError::connection(format!("close: {err}"))),
            #[cfg(test)]
            WarehouseConn::Scripted(conn) => conn.close(),
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Scripted connections for tests. A factory and every connection it
    //! hands out share one transcript, so a test can assert the exact
    //! statement sequence after the code under test finishes.

    use std::sync::{Arc, Mutex};

    use crate::error::{LoadError, Result};

    #[derive(Default)]
    struct Script {
        executed: Vec<String>,
        connects: usize,
        closed: usize,
        fail_connect: bool,
        fail_on_fragment: Option<String>,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedFactory {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next connect attempt fail.
        pub fn fail_connect(&self) {
            self.script.lock().unwrap().fail_connect = true;
        }

        /// Fail any statement containing the fragment. The statement is
        /// still recorded as attempted.
        pub fn fail_on(&self, fragment: &str) {
            self.script.lock().unwrap().fail_on_fragment = Some(fragment.to_string());
        }

        pub fn executed(&self) -> Vec<String> {
            self.script.lock().unwrap().executed.clone()
        }

        pub fn connects(&self) -> usize {
            self.script.lock().unwrap().connects
        }

        pub fn closed(&self) -> usize {
            self.script.lock().unwrap().closed
        }

        pub(crate) fn connect(&self) -> Result<super::WarehouseConn> {
            let mut script = self.script.lock().unwrap();
            if script.fail_connect {
                return Err(LoadError::connection("scripted connect failure"));
            }
            script.connects += 1;
            drop(script);
            Ok(super::WarehouseConn::Scripted(ScriptedConn {
                script: self.script.clone(),
            }))
        }
    }

    pub struct ScriptedConn {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedConn {
        pub(crate) fn execute(&mut self, statement: &str) -> Result<()> {
            let mut script = self.script.lock().unwrap();
            script.executed.push(statement.to_string());
            if let Some(fragment) = &script.fail_on_fragment
                && statement.contains(fragment.as_str())
            {
                return Err(LoadError::query(format!(
                    "scripted failure on '{fragment}'"
                )));
            }
            Ok(())
        }

        pub(crate) fn close(self) -> Result<()> {
            self.script.lock().unwrap().closed += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_builder_defaults_the_port() {
        let params = ConnectionParamsBuilder::default()
            .host("warehouse.example.com")
            .database("analytics")
            .username("loader")
            .password("secret")
            .build()
            .unwrap();
        assert_eq!(params.port, crate::config::DEFAULT_WAREHOUSE_PORT);
    }

    #[tokio::test]
    async fn scripted_connections_share_a_transcript() {
        let factory = scripted::ScriptedFactory::new();
        let connector = Connector::Scripted(factory.clone());

        let mut conn = connector.connect().await.unwrap();
        conn.execute("SELECT 1").await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(factory.executed(), vec!["SELECT 1"]);
        assert_eq!(factory.connects(), 1);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_still_records_the_statement() {
        let factory = scripted::ScriptedFactory::new();
        factory.fail_on("MERGE");
        let connector = Connector::Scripted(factory.clone());

        let mut conn = connector.connect().await.unwrap();
        let err = conn.execute("MERGE INTO t USING s ON 1=1").await.unwrap_err();
        assert!(matches!(err, LoadError::Query(_)), "{err}");
        assert_eq!(factory.executed().len(), 1);
    }
}
