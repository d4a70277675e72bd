//! Error types for stackplan.
//!
//! Three families of failure, mirroring how a declaration run can go wrong:
//! configuration-shape errors (caught before any provider call), resolution
//! errors (a query or reference never produced a value), and provider-call
//! failures (surfaced from the engine behind the [`CloudProvider`] seam).
//! Every failure is terminal for the run; there is no partial-success mode.
//!
//! [`CloudProvider`]: crate::provider::CloudProvider

use thiserror::Error;

/// Result type alias for stackplan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for stackplan.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration-shape Errors
    // ========================================================================
    /// A CIDR block failed to parse.
    #[error("Invalid CIDR block '{text}': {message}")]
    InvalidCidr {
        /// The offending text
        text: String,
        /// What was wrong with it
        message: String,
    },

    /// The address range cannot cover the requested number of subnets.
    #[error(
        "Address space exhausted: {cidr} cannot be split into {requested} subnets \
         of at least /{max_prefix}"
    )]
    AddressSpaceExhausted {
        /// The parent CIDR block
        cidr: String,
        /// Number of subnets requested
        requested: usize,
        /// Longest prefix a subnet may have
        max_prefix: u8,
    },

    /// A listener was declared with no routing targets.
    #[error("Listener on port {port} of balancer '{balancer}' has no routing targets")]
    EmptyListener {
        /// Balancer name
        balancer: String,
        /// Listener port
        port: u16,
    },

    /// The balancer's access-control set does not permit traffic to a listener port.
    #[error(
        "Access-control set '{access_set}' has no egress rule covering port {port} \
         required by balancer '{balancer}'"
    )]
    EgressNotPermitted {
        /// Balancer name
        balancer: String,
        /// Attached access-control set name
        access_set: String,
        /// Listener port with no covering rule
        port: u16,
    },

    /// Two outputs were declared under the same name.
    #[error("Duplicate output name: '{0}'")]
    DuplicateOutput(String),

    /// An instance was declared without any access-control sets.
    #[error("Instance '{0}' has no access-control sets attached")]
    NoAccessSets(String),

    /// An instance was placed into a subnet that is not public.
    #[error("Instance '{instance}' must be placed in a public subnet, but '{subnet}' is private")]
    PrivateSubnetPlacement {
        /// Instance name
        instance: String,
        /// Subnet name
        subnet: String,
    },

    /// Generic declaration-shape validation failure.
    #[error("Stack validation failed: {0}")]
    Validation(String),

    // ========================================================================
    // Graph Errors
    // ========================================================================
    /// A reference names an entity that does not exist in the stack.
    #[error("Unknown entity: '{0}'")]
    UnknownEntity(String),

    /// Two entities were registered under the same id.
    #[error("Duplicate entity id: '{0}'")]
    DuplicateEntity(String),

    /// The reference graph contains a cycle.
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// An image query matched nothing.
    #[error("Image query matched no images: pattern '{pattern}', owner '{owner}'")]
    ImageQueryEmpty {
        /// Name glob the query carried
        pattern: String,
        /// Owner identifier the query carried
        owner: String,
    },

    /// An output references an entity that never resolved.
    #[error("Output '{output}' references entity '{entity}' which never resolved")]
    UnresolvedOutput {
        /// Output name
        output: String,
        /// Referenced entity id
        entity: String,
    },

    /// An output references an attribute the resolved entity does not expose.
    #[error("Resolved entity '{entity}' has no attribute '{attribute}'")]
    MissingAttribute {
        /// Referenced entity id
        entity: String,
        /// Requested attribute key
        attribute: String,
    },

    // ========================================================================
    // Provider Errors
    // ========================================================================
    /// The provisioning engine rejected a resource.
    #[error("Provider call failed for '{entity}': {message}")]
    Provider {
        /// Entity the call was realizing
        entity: String,
        /// Error message from the engine
        message: String,
    },

    // ========================================================================
    // Manifest / IO Errors
    // ========================================================================
    /// A manifest carried an invalid or unresolvable value.
    #[error("Manifest error at '{key}': {message}")]
    Manifest {
        /// Offending manifest key
        key: String,
        /// Error message
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an invalid-CIDR error.
    pub fn invalid_cidr(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCidr {
            text: text.into(),
            message: message.into(),
        }
    }

    /// Creates a generic validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a provider-call error.
    pub fn provider(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a manifest error.
    pub fn manifest(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Manifest {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was detected before any provider call.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCidr { .. }
                | Error::AddressSpaceExhausted { .. }
                | Error::EmptyListener { .. }
                | Error::EgressNotPermitted { .. }
                | Error::DuplicateOutput(_)
                | Error::NoAccessSets(_)
                | Error::PrivateSubnetPlacement { .. }
                | Error::Validation(_)
                | Error::UnknownEntity(_)
                | Error::DuplicateEntity(_)
                | Error::DependencyCycle(_)
        )
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            e if e.is_shape_error() => 4,
            Error::ImageQueryEmpty { .. }
            | Error::UnresolvedOutput { .. }
            | Error::MissingAttribute { .. } => 2,
            Error::Provider { .. } => 3,
            Error::Manifest { .. } | Error::YamlParse(_) => 5,
            _ => 1,
        }
    }
}
