//! Database access layer.
//!
//! - `registry`: name to shared handle, single-flight creation and teardown
//! - `handle`: per data source passthroughs plus the string-row `select`
//! - `pool`: pool creation behind the `Connector` capability
//! - `dsn`: data-source string classification and normalisation
//! - `decode`: rendering of result cells as strings
//! - `transaction` / `statement`: handles returned by `begin` and `prepare`

#[macro_use]
pub mod macros;
pub mod decode;
pub mod dsn;
pub mod executor;
pub mod handle;
pub mod params;
pub mod pool;
pub mod registry;
pub mod statement;
pub mod transaction;

pub use decode::{DbRow, DecodeRow};
pub use dsn::{Dsn, DsnError};
pub use executor::RowStream;
pub use handle::ConnectionHandle;
pub use pool::{Connector, DbPool, SqlxConnector, create_pool};
pub use registry::{CloseReport, SessionRegistry};
pub use statement::PreparedStatement;
pub use transaction::DbTransaction;
