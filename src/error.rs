use thiserror::Error;

/// Errors from starting a background [`crate::Sweeper`].
#[derive(Error, Debug)]
pub enum SweepError {
    /// The operating system refused to create the sweeper thread
    #[error("failed to spawn sweeper thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The configured interval was zero
    #[error("sweeper interval must be non-zero")]
    ZeroInterval,
}
