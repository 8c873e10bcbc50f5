use thiserror::Error;

/// Rotation domain errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GridError {
    #[error("rotation must be 0, 90, 180 or 270, got {0}")]
    InvalidRotation(i32),
}

/// Structural scan and edit errors. These are always fatal to the
/// operation that raised them; a recovered structural error would leave
/// a corrupted document behind.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StructureError {
    #[error("expected '(' at offset {0}")]
    NotABlockStart(usize),
    #[error("end of input at depth {0} before block closed")]
    UnbalancedBlock(usize),
    #[error("key \"{0}\" not found")]
    KeyNotFound(String),
    #[error("no ({kind} block found before key \"{key}\"")]
    ParentBlockNotFound { key: String, kind: String },
    #[error("({kind} block found for key \"{key}\" does not contain it")]
    KeyNotInBlock { key: String, kind: String },
}
