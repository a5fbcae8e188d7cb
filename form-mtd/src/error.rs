use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised while loading or validating operator configuration.
/// All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Malformed prefix, expected address/mask_length: {0}")]
    MalformedPrefix(String),

    #[error("Invalid mask length {mask} in prefix {prefix}, expected 1..=32")]
    InvalidMaskLength {
        prefix: String,
        mask: u32,
    },

    #[error("Prefix pool is empty")]
    EmptyPrefixPool,

    #[error("Flow timeouts must be non-zero")]
    InvalidTimeout,

    #[error("Unable to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised by a regeneration pass. The previous mapping stays in
/// effect whenever one of these is returned.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegenerateError {
    #[error(
        "Address space exhausted: {hosts} hosts but only {available} drawable virtual addresses"
    )]
    AddressSpaceExhausted {
        hosts: usize,
        available: u64,
    },

    #[error("Gave up drawing a virtual address for {host} after {attempts} attempts")]
    DrawAttemptsExceeded {
        host: Ipv4Addr,
        attempts: usize,
    },
}

/// Errors raised when handing a command to the control plane.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Control plane channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum MtdError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Regenerate(#[from] RegenerateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
