use std::fmt;

use thiserror::Error;

/// Error kinds used to key the per-report error summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorKind {
    /// Backend transport failure.
    BusError,
    /// Malformed or missing parameter, or inconsistent configuration.
    BadValue,
    /// Structurally invalid row/column markup.
    BadMarkupName,
    /// Unrecognized `Format` string at decode time.
    FormattingNotImplemented,
    /// Backend has no such register.
    BadRegName,
    /// Register permissions forbid the requested access.
    AccessDenied,
}

impl ErrorKind {
    /// Returns the stable name used in error summaries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BusError => "BusError",
            Self::BadValue => "BadValue",
            Self::BadMarkupName => "BadMarkupName",
            Self::FormattingNotImplemented => "FormattingNotImplemented",
            Self::BadRegName => "BadRegName",
            Self::AccessDenied => "AccessDenied",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a denied register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Register read.
    Read,
    /// Register write.
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Failure raised by register backends, conversions and status tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// The backend does not know the register.
    #[error("unknown register: {name}")]
    BadRegName {
        /// Register name as requested.
        name: String,
    },
    /// A parameter is missing, malformed or inconsistent.
    #[error("bad value: {message}")]
    BadValue {
        /// Human readable cause.
        message: String,
    },
    /// Row/column markup could not be parsed.
    #[error("bad markup name: {message}")]
    BadMarkupName {
        /// Human readable cause.
        message: String,
    },
    /// The `Format` string names no known decoding.
    #[error("formatting not implemented for format \"{format}\"")]
    FormattingNotImplemented {
        /// Offending format text.
        format: String,
    },
    /// The transport failed while accessing the device.
    #[error("bus error on {target}: {reason}")]
    BusError {
        /// Register name or address that failed.
        target: String,
        /// Transport-specific description.
        reason: String,
    },
    /// The register permissions forbid the access.
    #[error("{access} access denied for register {name}")]
    AccessDenied {
        /// Register name.
        name: String,
        /// Denied direction.
        access: Access,
    },
}

impl RegisterError {
    /// Builds a [`RegisterError::BadValue`].
    #[must_use]
    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::BadValue {
            message: message.into(),
        }
    }

    /// Builds a [`RegisterError::BadMarkupName`].
    #[must_use]
    pub fn bad_markup(message: impl Into<String>) -> Self {
        Self::BadMarkupName {
            message: message.into(),
        }
    }

    /// Builds a [`RegisterError::BadRegName`].
    #[must_use]
    pub fn bad_reg_name(name: impl Into<String>) -> Self {
        Self::BadRegName { name: name.into() }
    }

    /// Builds a [`RegisterError::FormattingNotImplemented`].
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::FormattingNotImplemented {
            format: format.into(),
        }
    }

    /// Returns the summary kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRegName { .. } => ErrorKind::BadRegName,
            Self::BadValue { .. } => ErrorKind::BadValue,
            Self::BadMarkupName { .. } => ErrorKind::BadMarkupName,
            Self::FormattingNotImplemented { .. } => ErrorKind::FormattingNotImplemented,
            Self::BusError { .. } => ErrorKind::BusError,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
        }
    }
}
