use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arango_bridge::db::drivers::memory::MemoryConnector;
use arango_bridge::db::entity::{DocumentCreateEntity, DocumentDeleteEntity};
use arango_bridge::{BindVars, Client, ClientConfig, Credentials, DatabaseError, Result};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Planet {
    #[serde(rename = "_key", skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    name: String,
    moons: u32,
}

/// Turn a callback pair into a channel the main thread can wait on
fn channel<T: Send + 'static>() -> (
    impl FnOnce(T) + Send + 'static,
    impl FnOnce(DatabaseError) + Send + 'static,
    mpsc::Receiver<Result<T>>,
) {
    let (tx, rx) = mpsc::channel();
    let tx_err = tx.clone();
    (
        move |value| {
            let _ = tx.send(Ok(value));
        },
        move |err| {
            let _ = tx_err.send(Err(err));
        },
        rx,
    )
}

fn wait<T>(rx: mpsc::Receiver<Result<T>>) -> Result<T> {
    rx.recv_timeout(CALLBACK_TIMEOUT)
        .map_err(|e| DatabaseError::Failed(format!("no callback delivered: {e}")))?
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn run() -> Result<()> {
    let client = Client::new(MemoryConnector::new(), ClientConfig::default())?;
    let database = client.connect(Credentials::new("localhost", 8529, "root", "", "solar")?)?;
    let planets = database.collection::<Planet>("planets")?;

    for (name, moons) in [("Mercury", 0), ("Earth", 1), ("Mars", 2)] {
        let planet = Planet {
            key: Some(name.to_lowercase()),
            name: name.to_string(),
            moons,
        };
        let (on_success, on_failure, rx) = channel::<DocumentCreateEntity<Planet>>();
        planets.save(&planet, on_success, on_failure)?;
        let created = wait(rx)?;
        info!(id = %created.meta.id, rev = %created.meta.rev, "saved");
    }

    let (on_success, on_failure, rx) = channel::<Option<Planet>>();
    planets.document("earth")?.fetch(on_success, on_failure);
    info!(planet = ?wait(rx)?, "fetched");

    let mut bind_vars = BindVars::new();
    bind_vars.insert("moons".into(), 2.into());
    let (on_success, on_failure, rx) = channel::<Vec<Planet>>();
    database
        .execute_aql(
            "FOR p IN planets FILTER p.moons == @moons RETURN p",
            bind_vars,
            on_success,
            on_failure,
        )
        .into_result()?;
    info!(rows = wait(rx)?.len(), "queried");

    let (on_success, on_failure, rx) = channel::<DocumentDeleteEntity<Planet>>();
    planets.document("pluto")?.delete(on_success, on_failure);
    if let Err(err) = wait(rx) {
        info!(error = %err, "delete of a missing document failed as expected");
    }

    database.close().wait()?;
    client.shutdown();
    Ok(())
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        error!(error = %err, "demo failed");
        std::process::exit(1);
    }
}
