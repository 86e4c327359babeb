use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Field index {index} out of range for {field_type} ({len} entries)")]
    FieldIndexOutOfRange {
        field_type: String,
        index: usize,
        len: usize,
    },
}
