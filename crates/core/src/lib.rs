// crates/core/src/lib.rs
pub mod collection;
pub mod config;
pub mod correlation;
pub mod entry;
pub mod error;
pub mod grouping;
pub mod job_prefix;
pub mod parser;
pub mod request;
pub mod text_format;

pub use collection::Collection;
pub use config::{Config, IgnoredEnv, LoggerType};
pub use correlation::CorrelationTable;
pub use entry::{Entry, EntryKind, EntryType, HttpFields, Params, QueryEntry, QueryOperation};
pub use error::ConfigError;
pub use grouping::group_by_request;
pub use parser::LineParser;
pub use request::Request;
