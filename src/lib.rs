//! STUN client and RFC 3489 NAT-type discovery.
//!
//! The crate splits into four layers, leaves first:
//!
//! - [`addr`]: textual transport addresses and byte conversions
//! - [`protocol`]: the STUN attribute and packet codec (RFC 3489 and
//!   RFC 5389 padding disciplines)
//! - [`client`]: binding probes over UDP with RFC 3489 retransmission
//! - [`discovery`]: the Test I/II/III decision tree and the resulting
//!   NAT classification
//!
//! ```no_run
//! use natprobe::{discover, ClientConfig, StunClient};
//!
//! # async fn run() -> natprobe::StunResult<()> {
//! let client = StunClient::new(ClientConfig::new("203.0.113.1:3478"))?;
//! let nat = discover(&client).await?;
//! println!("{nat}");
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod client;
pub mod discovery;
pub mod error;
pub mod protocol;

pub use client::{ClientConfig, Probe, StunClient, DEFAULT_SOFTWARE};
pub use discovery::{discover, NatType};
pub use error::{StunError, StunResult};
pub use protocol::{Attribute, Packet, RfcMode, TransactionId, XorMapped};

/// Initialize the logging system.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
