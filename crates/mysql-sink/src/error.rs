use thiserror::Error;

/// Why a change event cannot be turned into statements for a mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Column '{column}' mapped for table '{table}' is not present in the change event")]
    UnknownColumn { table: String, column: String },

    #[error("Table '{0}' has no primary key")]
    NoPrimaryKey(String),

    #[error("Row image of table '{table}' has no value at position {position}")]
    MissingValue { table: String, position: usize },

    #[error("Invalid mapping configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MappingError>;
