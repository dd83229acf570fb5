use thiserror::Error;

/// Crate-wide error type. Every fallible entry point surfaces one of
/// these; none are recovered silently inside the core (the one
/// deliberate exception is the game-time fallback to a uniform random
/// policy when no policy file is supplied, which is not an error).
#[derive(Debug, Error)]
pub enum Error {
    /// Bad geometry, colliding start positions, malformed probabilities,
    /// negative tolerances: fatal at configuration time.
    #[error("{0}")]
    Config(String),

    /// A state expected to be valid was missing from the valid state
    /// space. Indicates a bug, not user error.
    #[error("state was not found in the valid state space")]
    NotValid,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A worker thread panicked or hit a fatal error during a sweep; the
    /// coordinator terminates all workers and re-raises this.
    #[error("worker failed: {0}")]
    WorkerFailed(String),
}
