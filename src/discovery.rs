//! RFC 3489 NAT-type discovery.
//!
//! Runs the Test I / Test II / Test III probe sequence against the
//! configured server and classifies the path between the local host and
//! the public Internet. Probes run strictly one after another; every
//! classification is reached either through a decoded response or an
//! exhausted retry budget, never through a panic on remote input.

use std::fmt;

use tracing::{debug, info};

use crate::addr;
use crate::client::{Probe, StunClient};
use crate::error::StunResult;

/// NAT classification produced by [`discover`].
///
/// Failures (socket errors, malformed configuration) are reported
/// through the `Err` arm of the surrounding `StunResult` instead of a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatType {
    /// Test I got no response: UDP does not reach the server at all.
    Blocked,
    /// The server's answers do not allow a classification.
    Unknown,
    /// Mapped and local addresses match and the changed-address probe
    /// came through: no NAT, no filtering firewall.
    OpenInternet,
    /// No NAT, but a firewall only passes UDP flows the host initiated.
    SymmetricUdpFirewall,
    FullCone,
    Restricted,
    PortRestricted,
    Symmetric,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NatType::Blocked => "UDP is blocked",
            NatType::Unknown => "behind a NAT of undetermined type",
            NatType::OpenInternet => "open Internet access, not behind a NAT",
            NatType::SymmetricUdpFirewall => "behind a symmetric UDP firewall",
            NatType::FullCone => "behind a full cone NAT",
            NatType::Restricted => "behind a restricted cone NAT",
            NatType::PortRestricted => "behind a port restricted cone NAT",
            NatType::Symmetric => "behind a symmetric NAT",
        };
        write!(f, "{text}")
    }
}

/// What a Test I exchange established.
#[derive(Debug)]
struct BindingOutcome {
    responded: bool,
    /// Canonical mapped transport, XOR-mapped preferred when present.
    mapped: Option<String>,
    /// Canonical CHANGED-ADDRESS transport, when the server offers one.
    changed: Option<String>,
    /// Mapped address equals the probe socket's local address.
    identical: bool,
}

impl BindingOutcome {
    fn silent() -> Self {
        Self {
            responded: false,
            mapped: None,
            changed: None,
            identical: false,
        }
    }
}

/// Classify the NAT between this host and the configured server.
pub async fn discover(client: &StunClient) -> StunResult<NatType> {
    // Test I against the default server. No response at all means UDP
    // connectivity is absent.
    let test1 = run_test1(client, None).await?;
    if !test1.responded {
        info!("no response to test I, UDP is blocked");
        return Ok(NatType::Blocked);
    }

    if test1.mapped.is_none() {
        info!("response carried no usable mapped address");
        return Ok(NatType::Unknown);
    }

    // Tests II and III only mean something on a server that can answer
    // from an alternate transport address.
    let Some(changer) = test1.changed.clone() else {
        info!("server offered no CHANGED-ADDRESS, cannot probe further");
        return Ok(NatType::Unknown);
    };
    debug!(changed = %changer, "server supports address changing");

    if test1.identical {
        // Not translated. Test II tells a fully open path apart from a
        // firewall that only passes outbound-initiated flows.
        if run_test2(client).await? {
            info!("test II answered, open Internet access");
            Ok(NatType::OpenInternet)
        } else {
            info!("test II unanswered, symmetric UDP firewall");
            Ok(NatType::SymmetricUdpFirewall)
        }
    } else {
        // Translated. A response from the alternate address can only
        // pass a full cone mapping.
        if run_test2(client).await? {
            info!("test II answered, full cone NAT");
            return Ok(NatType::FullCone);
        }

        // Repeat Test I against the changed address: a different mapping
        // per destination is the symmetric NAT signature.
        let test1b = run_test1(client, Some(&changer)).await?;
        if !test1b.responded {
            info!("changed address did not answer, classification impossible");
            return Ok(NatType::Unknown);
        }
        if !test1b.identical {
            info!("mapping differs per destination, symmetric NAT");
            return Ok(NatType::Symmetric);
        }

        // Same mapping both ways; Test III separates the two cone
        // filters that are left.
        if run_test3(client).await? {
            info!("test III answered, restricted cone NAT");
            Ok(NatType::Restricted)
        } else {
            info!("test III unanswered, port restricted cone NAT");
            Ok(NatType::PortRestricted)
        }
    }
}

/// Test I: plain binding request, no CHANGE-REQUEST attribute.
async fn run_test1(client: &StunClient, dest: Option<&str>) -> StunResult<BindingOutcome> {
    match dest {
        Some(dest) => info!(%dest, "test I"),
        None => info!(dest = %client.config().server, "test I"),
    }

    let probe = client.binding_probe(dest).await?;
    let Some(response) = probe.response.as_ref() else {
        return Ok(BindingOutcome::silent());
    };

    let mapped = mapped_transport(&probe, response)?;
    let changed = match response.changed_address()? {
        Some((ip, port)) => Some(addr::make_transport(&ip, port)?),
        None => None,
    };

    let identical = mapped.as_deref() == Some(probe.local.as_str());
    info!(
        local = %probe.local,
        mapped = mapped.as_deref().unwrap_or("<none>"),
        changed = changed.as_deref().unwrap_or("<none>"),
        identical,
        "test I complete"
    );

    Ok(BindingOutcome {
        responded: true,
        mapped,
        changed,
        identical,
    })
}

/// Test II: ask the server to answer from a different IP and port.
async fn run_test2(client: &StunClient) -> StunResult<bool> {
    info!("test II");
    Ok(client.change_request_probe(true).await?.received())
}

/// Test III: ask the server to answer from a different port only.
async fn run_test3(client: &StunClient) -> StunResult<bool> {
    info!("test III");
    Ok(client.change_request_probe(false).await?.received())
}

/// Canonical mapped transport for a response.
///
/// RFC 3489 servers only send MAPPED-ADDRESS; newer ones add the XOR
/// form. When both are present and disagree, the XOR form wins on the
/// assumption that a middlebox rewrote the plain one; both are traced
/// for diagnostics.
fn mapped_transport(
    probe: &Probe,
    response: &crate::protocol::Packet,
) -> StunResult<Option<String>> {
    let plain = match response.mapped_address()? {
        Some((ip, port)) => Some(addr::make_transport(&ip, port)?),
        None => None,
    };
    let xored = match response.xor_mapped_address()? {
        Some(xor) => Some(addr::make_transport(&xor.ip, xor.port)?),
        None => None,
    };

    Ok(match (plain, xored) {
        (Some(plain), Some(xored)) => {
            if plain != xored {
                debug!(
                    mapped = %plain,
                    xor_mapped = %xored,
                    local = %probe.local,
                    "mapped and XOR-mapped addresses disagree, trusting the XOR form"
                );
            }
            Some(xored)
        }
        (Some(plain), None) => Some(plain),
        (None, Some(xored)) => Some(xored),
        (None, None) => None,
    })
}
