//! Error types for yamltag
//!
//! Errors are structured: a kind, the document path where resolution
//! failed, an optional source location, the underlying cause and an
//! actionable help message.

use std::fmt;

/// Result type alias for yamltag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for yamltag operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Path in the document where the error occurred (e.g., "database.port")
    pub path: Option<String>,
    /// Source location (file, line) if available
    pub source_location: Option<SourceLocation>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Location in a source file or fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input document or a directive fragment is not well-formed YAML
    Parse,
    /// The resolved tree does not fit the destination type
    Decode,
    /// A directive resolver failed
    Resolver(ResolverErrorKind),
    /// A file includes itself, directly or transitively
    CircularReference,
    /// Directive fragments are nested deeper than the configured limit
    DepthExceeded { limit: usize },
    /// Reading the input stream failed
    Io,
}

/// Specific resolver error categories
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverErrorKind {
    /// A directive tag was applied to a sequence or mapping
    #[error("{tag} on a non-scalar node")]
    NonScalar { tag: String },
    /// Environment variable is unset or empty
    #[error("environment variable {var_name} not set")]
    EnvNotSet { var_name: String },
    /// Caller variable is absent from the variable table
    #[error("variable {name} not set")]
    VarNotSet { name: String },
    /// Included file could not be read
    #[error("failed to read {path}")]
    FileRead {
        path: String,
        io_kind: std::io::ErrorKind,
    },
    /// Tag rejected at registration time
    #[error("invalid directive tag '{tag}'")]
    InvalidTag { tag: String },
    /// Resolver returned an error
    #[error("resolver '{resolver}' error: {message}")]
    Custom { resolver: String, message: String },
}

impl Error {
    fn resolver(kind: ResolverErrorKind) -> Self {
        Self {
            kind: ErrorKind::Resolver(kind),
            path: None,
            source_location: None,
            help: None,
            cause: None,
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            path: None,
            source_location: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Create a parse error from the YAML parser, keeping its location.
    ///
    /// `origin` names where the text came from: a file path, `<input>`,
    /// or the directive that produced the fragment.
    pub fn from_yaml(err: &serde_yaml::Error, origin: impl Into<String>) -> Self {
        let location = err.location().map(|loc| SourceLocation {
            file: origin.into(),
            line: Some(loc.line()),
            column: Some(loc.column()),
        });
        Self {
            source_location: location,
            ..Self::parse(err.to_string())
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Decode,
            path: None,
            source_location: None,
            help: Some("Check that the document matches the shape of the destination type".into()),
            cause: Some(message.into()),
        }
    }

    /// Create a structural error: a directive on a sequence or mapping
    pub fn non_scalar(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::resolver(ResolverErrorKind::NonScalar { tag: tag.clone() }).with_help(format!(
            "{} takes a single scalar argument, e.g. `key: {} value`",
            tag, tag
        ))
    }

    /// Create an env var not set error
    pub fn env_not_set(var_name: impl Into<String>) -> Self {
        let var = var_name.into();
        Self::resolver(ResolverErrorKind::EnvNotSet {
            var_name: var.clone(),
        })
        .with_help(format!(
            "Export a non-empty value for {} before loading",
            var
        ))
    }

    /// Create a caller variable not set error
    pub fn var_not_set(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::resolver(ResolverErrorKind::VarNotSet { name: name.clone() })
            .with_help(format!("Pass {}=<value> in the load arguments", name))
    }

    /// Create an included-file read error; the I/O error text is kept verbatim
    pub fn file_read(path: impl Into<String>, err: &std::io::Error) -> Self {
        let mut error = Self::resolver(ResolverErrorKind::FileRead {
            path: path.into(),
            io_kind: err.kind(),
        });
        error.cause = Some(err.to_string());
        error
    }

    /// Create an invalid tag error
    pub fn invalid_tag(tag: impl Into<String>) -> Self {
        Self::resolver(ResolverErrorKind::InvalidTag { tag: tag.into() })
            .with_help("Directive tags must be non-empty, e.g. \"!include\"")
    }

    /// Create a custom resolver error
    pub fn resolver_custom(resolver: impl Into<String>, message: impl Into<String>) -> Self {
        let resolver_name = resolver.into();
        Self::resolver(ResolverErrorKind::Custom {
            resolver: resolver_name.clone(),
            message: message.into(),
        })
        .with_help(format!(
            "Check the '{}' resolver implementation",
            resolver_name
        ))
    }

    /// Create a circular include error
    pub fn circular_reference(chain: Vec<String>) -> Self {
        let chain_str = chain.join(" → ");
        Self {
            kind: ErrorKind::CircularReference,
            path: None,
            source_location: None,
            help: Some("Break the cycle by removing one of the !include directives".into()),
            cause: Some(format!("Chain: {}", chain_str)),
        }
    }

    /// Create a nesting depth error
    pub fn depth_exceeded(limit: usize) -> Self {
        Self {
            kind: ErrorKind::DepthExceeded { limit },
            path: None,
            source_location: None,
            help: Some(
                "A directive keeps producing further directives; raise max_depth if this is intended"
                    .into(),
            ),
            cause: None,
        }
    }

    /// Create an I/O error for the top-level input
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Io,
            path: None,
            source_location: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() { None } else { Some(path) };
        self
    }

    /// Add path context unless the error already carries a deeper one
    pub fn or_path(self, path: impl Into<String>) -> Self {
        if self.path.is_some() {
            self
        } else {
            self.with_path(path)
        }
    }

    /// Add source location to the error
    pub fn with_source_location(mut self, loc: SourceLocation) -> Self {
        self.source_location = Some(loc);
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// The resolver-specific kind, if this is a resolver error
    pub fn resolver_kind(&self) -> Option<&ResolverErrorKind> {
        match &self.kind {
            ErrorKind::Resolver(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Main error message
        match &self.kind {
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::Decode => write!(f, "Decode error")?,
            ErrorKind::Resolver(r) => write!(f, "{}", r)?,
            ErrorKind::CircularReference => write!(f, "Circular include detected")?,
            ErrorKind::DepthExceeded { limit } => {
                write!(f, "Directive nesting exceeds maximum depth of {}", limit)?
            }
            ErrorKind::Io => write!(f, "I/O error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(loc) = &self.source_location {
            write!(f, "\n  File: {}", loc.file)?;
            if let Some(line) = loc.line {
                write!(f, ":{}", line)?;
                if let Some(column) = loc.column {
                    write!(f, ":{}", column)?;
                }
            }
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
