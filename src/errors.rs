//! Definition of errors.

use std::error::Error;
use std::fmt;

/// A specialized Result type.
pub type Result<T, E = CrfError> = core::result::Result<T, E>;

/// The error type for seqcrf.
#[derive(Debug)]
pub enum CrfError {
    /// A configuration value or an argument is invalid.
    InvalidArgument(InvalidArgumentError),

    /// A model is inconsistent.
    InvalidModel(InvalidModelError),

    /// Encoded features and labels do not line up.
    ShapeMismatch(ShapeMismatchError),

    /// Calibration produced a non-finite partition function.
    NumericalInstability(NumericalInstabilityError),

    /// The optimizer failed.
    Optimization(OptimizationError),

    /// Failed to decode a model.
    DecodeError(bincode::error::DecodeError),

    /// Failed to encode a model.
    EncodeError(bincode::error::EncodeError),

    /// I/O error.
    IOError(std::io::Error),
}

impl CrfError {
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(InvalidModelError { msg: msg.into() })
    }

    pub(crate) fn shape_mismatch<S>(sequence: usize, position: usize, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::ShapeMismatch(ShapeMismatchError {
            sequence,
            position,
            msg: msg.into(),
        })
    }

    pub(crate) fn numerical_instability<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::NumericalInstability(NumericalInstabilityError { msg: msg.into() })
    }

    #[cfg(feature = "train")]
    pub(crate) fn optimization<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Optimization(OptimizationError { msg: msg.into() })
    }
}

impl fmt::Display for CrfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidArgument(e) => e.fmt(f),
            Self::InvalidModel(e) => e.fmt(f),
            Self::ShapeMismatch(e) => e.fmt(f),
            Self::NumericalInstability(e) => e.fmt(f),
            Self::Optimization(e) => e.fmt(f),
            Self::DecodeError(e) => e.fmt(f),
            Self::EncodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for CrfError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// Error used when the model is invalid.
#[derive(Debug)]
pub struct InvalidModelError {
    pub(crate) msg: String,
}

impl fmt::Display for InvalidModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidModelError: {}", self.msg)
    }
}

impl Error for InvalidModelError {}

/// Error used when encoded arrays disagree with each other.
#[derive(Debug)]
pub struct ShapeMismatchError {
    /// Index of the sequence in its dataset.
    pub(crate) sequence: usize,

    /// Position inside the sequence.
    pub(crate) position: usize,

    pub(crate) msg: String,
}

impl fmt::Display for ShapeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ShapeMismatchError: sequence {}, position {}: {}",
            self.sequence, self.position, self.msg
        )
    }
}

impl Error for ShapeMismatchError {}

/// Error used when the forward-backward pass degenerates.
#[derive(Debug)]
pub struct NumericalInstabilityError {
    pub(crate) msg: String,
}

impl fmt::Display for NumericalInstabilityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NumericalInstabilityError: {}", self.msg)
    }
}

impl Error for NumericalInstabilityError {}

/// Error used when the optimizer stops abnormally.
#[derive(Debug)]
pub struct OptimizationError {
    pub(crate) msg: String,
}

impl fmt::Display for OptimizationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OptimizationError: {}", self.msg)
    }
}

impl Error for OptimizationError {}

impl From<bincode::error::DecodeError> for CrfError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::DecodeError(error)
    }
}

impl From<bincode::error::EncodeError> for CrfError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::EncodeError(error)
    }
}

impl From<std::io::Error> for CrfError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
