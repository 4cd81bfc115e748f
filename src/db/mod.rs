pub mod client;
pub mod collection;
pub mod connection;
pub mod document;
pub mod driver;
pub mod drivers;
pub mod entity;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod validation;

pub use client::{Client, Database};
pub use collection::Collection;
pub use connection::{ClientConfig, Credentials};
pub use document::Document;
pub use driver::{BindVars, Connector, Cursor, Driver};
pub use error::{DatabaseError, Result};
pub use executor::{Executor, Pending};
pub use outcome::Try;
