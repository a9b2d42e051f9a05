//! Runtime error type.
//!
//! Transform-time problems never reach this crate; everything here is a
//! region-entry or execution-time failure. Panics raised by user bodies are
//! not errors: they are captured per worker or per task and re-raised on the
//! originating side (see `team` and `tasking`).

#[derive(Debug, Clone, thiserror::Error)]
pub enum OmpError {
    /// Workers of one team issued different worksharing constructs.
    #[error("each worker must execute the same instruction stream")]
    WorkerDivergence,

    /// A region could not be entered (bad team size, exhausted limits).
    /// Carries the directive's `message(...)` text when one was given.
    #[error("cannot start parallel region: {reason}")]
    Region { reason: String },

    /// An environment or clause value failed to convert at region entry.
    #[error("invalid control value for {what}: {value}")]
    InvalidControl { what: &'static str, value: String },

    /// A worksharing call arrived outside the construct that owns it.
    #[error("{0} used outside its construct")]
    OutsideConstruct(&'static str),
}

pub type Result<T> = std::result::Result<T, OmpError>;
