//! Error types shared by the sampler, the control service and the engine.

/// A sampling cycle failed. The refresh task logs these and keeps serving the
/// last published snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// A procfs file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A procfs file was readable but did not have the expected shape.
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
}

/// A process-control request was rejected, either by validation or by the OS.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("permission denied for process {0}")]
    PermissionDenied(u32),

    #[error("invalid signal number {0}")]
    InvalidSignal(i32),

    #[error("invalid core id {core} (host has {core_count} cores)")]
    InvalidCore { core: usize, core_count: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other errno from the underlying syscall.
    #[error("{op} failed for process {pid}: {source}")]
    Os {
        op: &'static str,
        pid: u32,
        source: nix::Error,
    },
}

/// The engine could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("initial sample failed: {0}")]
    InitialSample(#[from] SamplerError),

    #[error("refresh task is no longer running")]
    RefresherStopped,
}
