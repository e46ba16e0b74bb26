use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{Context as _, Result, anyhow};
use coap_lite::{
    CoapRequest, ContentFormat, MessageClass, MessageType, Packet, RequestType, ResponseType,
};
use sqlx::SqlitePool;
use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, warn};

use crate::{
    cache::PredictionCache,
    handler::{get_prediction, post_data, post_prediction},
};

pub const DEFAULT_PORT: u16 = 5683;

/// One Ethernet MTU; nodes never send more than a single small datagram.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// How long a reply is kept for answering retransmissions (RFC 7252 EXCHANGE_LIFETIME).
pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

const MAX_EXCHANGES: usize = 256;

/// Returns `bind:port` if given, otherwise the address the local host name
/// resolves to, preferring IPv4.
pub async fn resolve_bind_addr(bind: Option<IpAddr>, port: u16) -> Result<SocketAddr> {
    if let Some(ip) = bind {
        return Ok(SocketAddr::new(ip, port));
    }

    let host = hostname::get()
        .context("failed to get host name")?
        .into_string()
        .map_err(|h| anyhow!("host name is not valid UTF-8: {h:?}"))?;

    let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), port))
        .await
        .with_context(|| format!("failed to resolve host name: {host}"))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow!("host name resolved to no addresses: {host}"))
}

type ExchangeKey = (SocketAddr, u16);

/// Replies to recent requests, keyed by peer and message id.
#[derive(Debug, Default)]
struct Exchanges {
    replies: HashMap<ExchangeKey, (Instant, Vec<u8>)>,
}

impl Exchanges {
    fn get(&mut self, key: &ExchangeKey, now: Instant) -> Option<Vec<u8>> {
        self.expire(now);
        self.replies.get(key).map(|(_, reply)| reply.clone())
    }

    fn insert(&mut self, key: ExchangeKey, reply: Vec<u8>, now: Instant) {
        self.expire(now);
        if self.replies.len() >= MAX_EXCHANGES
            && let Some(oldest) = self
                .replies
                .iter()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(k, _)| *k)
        {
            self.replies.remove(&oldest);
        }

        self.replies.insert(key, (now, reply));
    }

    fn expire(&mut self, now: Instant) {
        self.replies
            .retain(|_, (at, _)| now.duration_since(*at) < EXCHANGE_LIFETIME);
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    pool: SqlitePool,
    predictions: Arc<PredictionCache>,
    exchanges: Arc<Mutex<Exchanges>>,
}

impl Router {
    pub fn new(pool: SqlitePool, predictions: Arc<PredictionCache>) -> Self {
        Self {
            pool,
            predictions,
            exchanges: Arc::default(),
        }
    }

    /// Handles one inbound datagram and returns the reply to send, if any.
    pub async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let packet = match Packet::from_bytes(datagram) {
            Ok(p) => p,
            Err(err) => {
                debug!(%peer, "dropped malformed datagram: {err:?}");
                return None;
            }
        };

        match packet.header.code {
            MessageClass::Request(_)
                if matches!(
                    packet.header.get_type(),
                    MessageType::Confirmable | MessageType::NonConfirmable
                ) => {}
            MessageClass::Empty if packet.header.get_type() == MessageType::Confirmable => {
                return encode(&reset(&packet), peer);
            }
            code => {
                debug!(%peer, ?code, message_type = ?packet.header.get_type(), "dropped message");
                return None;
            }
        }

        let key = (peer, packet.header.message_id);
        let cached = self.lock_exchanges().get(&key, Instant::now());
        if let Some(reply) = cached {
            debug!(%peer, message_id = key.1, "answered retransmission from cache");
            return Some(reply);
        }

        let mut request = CoapRequest::from_packet(packet, peer);
        let path = request.get_path();
        let path = path.trim_matches('/');

        let (status, payload) = self
            .route(request.get_method(), path, &request.message.payload)
            .await;
        debug!(%peer, method = ?request.get_method(), path, ?status, "handled request");

        let response = request.response.as_mut()?;
        response.set_status(status);
        if !payload.is_empty() {
            response
                .message
                .set_content_format(ContentFormat::ApplicationOctetStream);
        }
        response.message.payload = payload;

        let reply = encode(&response.message, peer)?;
        self.lock_exchanges()
            .insert(key, reply.clone(), Instant::now());

        Some(reply)
    }

    fn lock_exchanges(&self) -> MutexGuard<'_, Exchanges> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn route(
        &self,
        method: &RequestType,
        path: &str,
        payload: &[u8],
    ) -> (ResponseType, Vec<u8>) {
        match (path, method) {
            ("data", RequestType::Post) => (post_data(&self.pool, payload).await, Vec::new()),
            ("predictions", RequestType::Post) => {
                (post_prediction(&self.predictions, payload), Vec::new())
            }
            ("predictions", RequestType::Get) => get_prediction(&self.predictions),
            ("data" | "predictions", _) => (ResponseType::MethodNotAllowed, Vec::new()),
            _ => (ResponseType::NotFound, Vec::new()),
        }
    }
}

/// Receives and answers datagrams one at a time, forever.
pub async fn serve(socket: UdpSocket, router: Router) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(err) => {
                warn!("failed to receive datagram: {err}");
                continue;
            }
        };

        let Some(reply) = router.handle_datagram(&buf[..len], peer).await else {
            continue;
        };

        if let Err(err) = socket.send_to(&reply, peer).await {
            warn!(%peer, "failed to send response: {err}");
        }
    }
}

fn reset(ping: &Packet) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Reset);
    packet.header.code = MessageClass::Empty;
    packet.header.message_id = ping.header.message_id;
    packet
}

fn encode(packet: &Packet, peer: SocketAddr) -> Option<Vec<u8>> {
    match packet.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(%peer, "failed to encode response: {err:?}");
            None
        }
    }
}
