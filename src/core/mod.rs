pub mod campaign;
pub mod cleaning;
pub mod dispatcher;
pub mod etl;
pub mod export;
pub mod import;
pub mod inference;
pub mod parser;
pub mod pipeline;
pub mod rate_limit;
pub mod template;

pub use crate::domain::model::{
    Cell, ColumnProfile, ColumnType, ParsedTable, Record, TransformResult,
};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
