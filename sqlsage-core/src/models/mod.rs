pub mod fragment;
pub mod response;
pub mod schema;
pub mod session;

pub use fragment::{FragmentEntry, FragmentIndex, FragmentIndexHandle};
pub use response::{CellValue, ColumnKind, QueryComplexity, QueryMetrics, QueryResponse, ResultColumn, TabularResult};
pub use schema::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot};
pub use session::Session;
