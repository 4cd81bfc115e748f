//! Callback-driven facade over an asynchronous document database driver.
//!
//! Arguments are checked synchronously with the [`Try`] combinators in
//! [`db::validation`]; accepted operations run on the client's
//! [`Executor`], which invokes exactly one of the two callbacks supplied
//! with each call.

pub mod db;

pub use db::{
    BindVars, Client, ClientConfig, Collection, Connector, Credentials, Cursor, Database,
    DatabaseError, Document, Driver, Executor, Pending, Result, Try,
};
