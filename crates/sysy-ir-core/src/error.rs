//! Fallible, non-invariant surface errors (§7, §2A). Internal invariant
//! violations never flow through here — those `panic!`/`unreachable!` at
//! the point of detection, per the error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("function `{0}` is external and has no basic blocks to build into")]
    ExternalFunctionHasNoBody(String),

    #[error("duplicate name `{0}` in module")]
    DuplicateName(String),

    #[error("module has no `main` function")]
    MissingMain,

    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
