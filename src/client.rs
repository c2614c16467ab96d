//! UDP transport for binding probes.
//!
//! Each probe owns a fresh connected socket for its whole lifetime, so a
//! late response from an earlier probe can never reach a later one. The
//! retransmission discipline follows RFC 3489 section 9.3: start at
//! 100 ms, double up to 1.6 s, give up after nine sends.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::addr;
use crate::error::{StunError, StunResult};
use crate::protocol::{
    hex_dump, Attribute, Packet, RfcMode, TransactionId, BINDING_REQUEST, MAX_MESSAGE_SIZE,
};

/// SOFTWARE attribute value sent with every probe.
pub const DEFAULT_SOFTWARE: &str = "TestClient01";

/// Fixed transaction id used for all probes. Sound only because every
/// probe opens its own socket; an implementation that reuses sockets
/// must randomize this and match responses against it.
pub const PROBE_TRANSACTION_ID: [u8; 12] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12,
];

/// Client configuration, fixed for the lifetime of a [`StunClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default server transport address, `"ip:port"` or `"[ip]:port"`.
    pub server: String,

    /// SOFTWARE attribute value.
    pub software: String,

    /// Padding discipline for built and parsed packets.
    pub mode: RfcMode,

    /// First retransmission timeout (RFC 3489: 100 ms).
    pub initial_rto_ms: u64,

    /// Ceiling for the doubled timeout (RFC 3489: 1600 ms).
    pub max_rto_ms: u64,

    /// Total send attempts before the probe counts as unanswered
    /// (RFC 3489: 9).
    pub max_attempts: u32,

    /// Undecodable datagrams tolerated per exchange before the probe is
    /// abandoned. Caps the starvation path where a noisy source keeps
    /// the read loop busy forever.
    pub max_invalid_datagrams: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            software: DEFAULT_SOFTWARE.to_string(),
            mode: RfcMode::default(),
            initial_rto_ms: 100,
            max_rto_ms: 1600,
            max_attempts: 9,
            max_invalid_datagrams: 50,
        }
    }
}

impl ClientConfig {
    /// Configuration with RFC 3489 timing and the given default server.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one probe: where the socket was bound, and the response
/// if one arrived before the retry budget ran out.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Canonical transport string of the local socket.
    pub local: String,

    /// Decoded response, `None` on timeout.
    pub response: Option<Packet>,
}

impl Probe {
    pub fn received(&self) -> bool {
        self.response.is_some()
    }
}

/// STUN client issuing binding probes against one server.
pub struct StunClient {
    config: ClientConfig,
}

impl StunClient {
    /// Validate the configured server address and build a client.
    pub fn new(config: ClientConfig) -> StunResult<Self> {
        addr::split_transport(&config.server)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a BINDING request (SOFTWARE + FINGERPRINT) to `dest`, or to
    /// the default server when `dest` is `None`.
    pub async fn binding_probe(&self, dest: Option<&str>) -> StunResult<Probe> {
        let packet = self.build_request(None)?;
        let dest = dest.unwrap_or(&self.config.server);
        self.exchange(dest, packet).await
    }

    /// Send a BINDING request carrying a CHANGE-REQUEST attribute to the
    /// default server. The change-port flag is always set; `change_ip`
    /// additionally asks the server to answer from its alternate IP.
    pub async fn change_request_probe(&self, change_ip: bool) -> StunResult<Probe> {
        let packet = self.build_request(Some(change_ip))?;
        self.exchange(&self.config.server, packet).await
    }

    /// Run one request/response exchange with retransmission.
    ///
    /// `Ok(None)` means the retry budget ran out with no decodable
    /// response. Datagrams that fail to parse are dropped without
    /// consuming the budget; only timeouts do.
    pub async fn send_request(
        &self,
        socket: &UdpSocket,
        request: &Packet,
    ) -> StunResult<Option<Packet>> {
        let wire = request.to_bytes();
        trace!("request\n{}", hex_dump(&wire));

        let max_rto = Duration::from_millis(self.config.max_rto_ms);
        let mut rto = Duration::from_millis(self.config.initial_rto_ms);
        let mut invalid = 0u32;
        let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

        for attempt in 1..=self.config.max_attempts {
            socket.send(&wire).await?;
            let deadline = Instant::now() + rto;

            loop {
                match timeout_at(deadline, socket.recv(&mut buf)).await {
                    Ok(Ok(count)) => match Packet::from_bytes(&buf[..count], self.config.mode) {
                        Ok(response) => {
                            trace!("response\n{}", hex_dump(&buf[..count]));
                            debug!("received\n{response}");
                            return Ok(Some(response));
                        }
                        Err(err) => {
                            invalid += 1;
                            debug!(%err, "dropping undecodable datagram");
                            if invalid > self.config.max_invalid_datagrams {
                                warn!("too many undecodable datagrams, abandoning probe");
                                return Ok(None);
                            }
                        }
                    },
                    Ok(Err(err)) => return Err(err.into()),
                    Err(_) => {
                        debug!(
                            attempt,
                            timeout_ms = rto.as_millis() as u64,
                            "timeout exceeded, retrying"
                        );
                        break;
                    }
                }
            }

            rto = (rto * 2).min(max_rto);
        }

        Ok(None)
    }

    fn build_request(&self, change_ip: Option<bool>) -> StunResult<Packet> {
        let mode = self.config.mode;
        let mut packet = Packet::new(mode);
        packet.set_type(BINDING_REQUEST);
        packet.set_transaction_id(TransactionId::from_bytes(PROBE_TRANSACTION_ID));
        packet.add_attribute(Attribute::software(&self.config.software, mode)?);
        if let Some(change_ip) = change_ip {
            packet.add_attribute(Attribute::change_request(change_ip, true, mode)?);
        }
        let fingerprint = Attribute::fingerprint(&packet)?;
        packet.add_attribute(fingerprint);
        Ok(packet)
    }

    async fn exchange(&self, dest: &str, request: Packet) -> StunResult<Probe> {
        addr::split_transport(dest)?;
        let target: SocketAddr = dest
            .parse()
            .map_err(|_| StunError::MalformedAddress(dest.to_string()))?;

        let socket = if target.is_ipv4() {
            UdpSocket::bind("0.0.0.0:0").await?
        } else {
            UdpSocket::bind("[::]:0").await?
        };
        socket.connect(target).await?;
        let local = addr::socket_transport(&socket.local_addr()?);

        debug!(%dest, %local, "sending binding request\n{request}");
        let response = self.send_request(&socket, &request).await?;
        Ok(Probe { local, response })
    }
}
