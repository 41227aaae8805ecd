//! In-memory tabular data: typed schema, delimited-text loader, snapshot store.

pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{LoadReport, RowIssue};
pub use schema::{CellValue, Column, ColumnType, Row, Schema, Table};
pub use store::TableStore;
