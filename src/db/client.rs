use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use super::collection::Collection;
use super::connection::{ClientConfig, Credentials};
use super::driver::{collect_remaining, BindVars, Connector, Driver};
use super::error::{DatabaseError, Result};
use super::executor::{Executor, Pending};
use super::outcome::{all_of_same_type, Try};
use super::validation::{combine, require_non_blank};

/// Entry point: owns the worker runtime and opens database sessions
pub struct Client {
    connector: Arc<dyn Connector>,
    executor: Arc<Executor>,
}

impl Client {
    pub fn new(connector: impl Connector + 'static, config: ClientConfig) -> Result<Self> {
        let executor = Executor::new(&config)?;
        Ok(Self::with_executor(connector, Arc::new(executor)))
    }

    pub fn with_executor(connector: impl Connector + 'static, executor: Arc<Executor>) -> Self {
        Self {
            connector: Arc::new(connector),
            executor,
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Open a session for `credentials`.
    ///
    /// Credentials are validated when built, so this only fails when the
    /// client is shut down or the connector refuses the session.
    pub fn connect(&self, credentials: Credentials) -> Result<Database> {
        if self.executor.is_shut_down() {
            return Err(DatabaseError::Shutdown);
        }
        let driver = self.connector.open(&credentials)?;
        info!(
            host = credentials.hostname(),
            port = credentials.port(),
            database = credentials.database_name(),
            "connected"
        );
        Ok(Database {
            credentials: Arc::new(credentials),
            driver,
            executor: Arc::clone(&self.executor),
        })
    }

    /// Stop the worker runtime. In-flight operations report
    /// [`DatabaseError::Shutdown`].
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

/// A database session
#[derive(Clone)]
pub struct Database {
    credentials: Arc<Credentials>,
    driver: Arc<dyn Driver>,
    executor: Arc<Executor>,
}

impl Database {
    pub fn name(&self) -> &str {
        self.credentials.database_name()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Handle to the collection `name`, with documents decoded as `T`.
    pub fn collection<T>(&self, name: &str) -> Result<Collection<T>> {
        require_non_blank(name, "Collection name cannot be blank")
            .map(|name| {
                Collection::new(
                    name.into(),
                    Arc::clone(&self.driver),
                    Arc::clone(&self.executor),
                )
            })
            .into_result()
    }

    /// Run `query` and deliver every row decoded as `T`.
    ///
    /// Unlike the other operations, invalid input is not returned as an
    /// error: the returned `Try` says whether the query was scheduled at
    /// all (`Failure` for a blank query or a shut-down client, in which case
    /// no callback fires). The query's own result or error arrives later
    /// through the callbacks.
    pub fn execute_aql<T, S, F>(
        &self,
        query: &str,
        bind_vars: BindVars,
        on_success: S,
        on_failure: F,
    ) -> Try<()>
    where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(Vec<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        combine([
            require_non_blank(query, "Query cannot be blank").void(),
            Try::run(|| {
                if self.executor.is_shut_down() {
                    Err(DatabaseError::Shutdown)
                } else {
                    Ok(())
                }
            }),
        ])
        .map(|()| {
            debug!(query, "scheduling query");
            let driver = Arc::clone(&self.driver);
            let query = query.to_string();
            self.executor.dispatch(
                move || {
                    Ok(async move {
                        let cursor = driver.query(&query, &bind_vars).await?;
                        let rows = collect_remaining(cursor).await?;
                        all_of_same_type(
                            rows.into_iter()
                                .map(|row| Try::capture(|| serde_json::from_value::<T>(row))),
                        )
                        .into_result()
                    })
                },
                on_success,
                on_failure,
            );
        })
    }

    /// Shut down the driver session.
    pub fn close(&self) -> Pending<()> {
        let driver = Arc::clone(&self.driver);
        info!(database = self.name(), "closing session");
        self.executor
            .submit(async move { driver.shutdown().await })
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::db::drivers::memory::MemoryConnector;
    use serde_json::Value;
    use std::sync::mpsc;
    use std::time::Duration;

    fn client() -> Client {
        Client::new(MemoryConnector::new(), ClientConfig::new().with_worker_threads(2)).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("localhost", 8529, "root", "", "app").unwrap()
    }

    #[test]
    fn test_collection_rejects_blank_name() {
        let db = client().connect(credentials()).unwrap();
        assert_eq!(
            db.collection::<Value>(" ").err(),
            Some(DatabaseError::InvalidArgument("Collection name cannot be blank".into()))
        );
        assert_eq!(db.collection::<Value>("users").unwrap().name(), "users");
    }

    #[test]
    fn test_execute_aql_returns_validation_failure() {
        let db = client().connect(credentials()).unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        let tx_err = tx.clone();
        let scheduled = db.execute_aql::<Value, _, _>(
            "   ",
            BindVars::new(),
            move |_| tx.send(()).unwrap(),
            move |_| tx_err.send(()).unwrap(),
        );
        assert_eq!(
            scheduled,
            Try::failure(DatabaseError::InvalidArgument("Query cannot be blank".into()))
        );
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_execute_aql_after_shutdown_is_not_scheduled() {
        let client = client();
        let db = client.connect(credentials()).unwrap();
        client.shutdown();
        assert!(client.executor().is_shut_down());
        let scheduled = db.execute_aql::<Value, _, _>(
            "FOR u IN users RETURN u",
            BindVars::new(),
            |_| {},
            |_| {},
        );
        assert_eq!(scheduled, Try::failure(DatabaseError::Shutdown));
        assert_eq!(client.connect(credentials()).err(), Some(DatabaseError::Shutdown));
    }

    #[test]
    fn test_close_shuts_driver_down() {
        let db = client().connect(credentials()).unwrap();
        assert_eq!(db.close().wait(), Ok(()));

        let (tx, rx) = mpsc::channel();
        let tx_ok = tx.clone();
        db.execute_aql::<Value, _, _>(
            "FOR u IN users RETURN u",
            BindVars::new(),
            move |rows| tx_ok.send(Ok(rows)).unwrap(),
            move |e| tx.send(Err(e)).unwrap(),
        )
        .into_result()
        .unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(DatabaseError::Failed(_))));
    }
}
