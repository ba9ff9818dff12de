use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("Allocation error: {0}")]
    Allocation(#[from] pantry_allocation::AllocationError),

    #[error("Allocation backend error: {0}")]
    Backend(String),
}
