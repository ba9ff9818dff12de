use thiserror::Error;

pub type Result<T> = std::result::Result<T, AllocationError>;

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("minimums require {required} units but only {total} are available")]
    InfeasibleMinimums { required: u64, total: u32 },

    #[error("minimums length {minimums} does not match claimant count {claimants}")]
    LengthMismatch { claimants: usize, minimums: usize },

    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
