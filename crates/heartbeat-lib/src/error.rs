use thiserror::Error;

/// Broad class of an argument failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The argument has the wrong kind (not a numeric sequence, not an integer, ...).
    Type,
    /// The argument has the right kind but violates a documented constraint.
    Value,
}

/// Errors raised by argument validation at the entry of every public operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeatError {
    #[error("{arg}: {message}")]
    Type { arg: &'static str, message: String },
    #[error("{arg}: {message}")]
    Value { arg: &'static str, message: String },
}

impl BeatError {
    pub fn type_error(arg: &'static str, message: impl Into<String>) -> Self {
        BeatError::Type {
            arg,
            message: message.into(),
        }
    }

    pub fn value_error(arg: &'static str, message: impl Into<String>) -> Self {
        BeatError::Value {
            arg,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BeatError::Type { .. } => ErrorKind::Type,
            BeatError::Value { .. } => ErrorKind::Value,
        }
    }

    /// Name of the offending argument.
    pub fn arg(&self) -> &'static str {
        match self {
            BeatError::Type { arg, .. } | BeatError::Value { arg, .. } => arg,
        }
    }
}

pub type Result<T> = std::result::Result<T, BeatError>;

/// Rejects empty sequences and non-finite samples.
pub(crate) fn check_samples(arg: &'static str, data: &[f64]) -> Result<()> {
    if data.is_empty() {
        return Err(BeatError::value_error(arg, "sequence must not be empty"));
    }
    if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
        return Err(BeatError::value_error(
            arg,
            format!("sample {} is not finite", pos),
        ));
    }
    Ok(())
}

pub(crate) fn check_fs(fs: u32) -> Result<()> {
    if fs == 0 {
        return Err(BeatError::value_error(
            "fs",
            "sampling frequency must be a positive integer",
        ));
    }
    Ok(())
}
