use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use super::codec::DvrCodec;
use super::messages::{Cost, DvrPacket, PacketType, INFINITY};
use super::routing_table::ForwardingTable;
use super::scheduler::Scheduler;
use crate::config::RouterConfig;
use crate::error::{HandshakeError, TransportError};

pub type SharedTable = Arc<Mutex<ForwardingTable>>;

type RelaySink<S> = Arc<Mutex<SplitSink<Framed<S, DvrCodec>, DvrPacket>>>;
type RelayStream<S> = SplitStream<Framed<S, DvrCodec>>;

/// How long shutdown waits on writes to a relay that may have stopped reading.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Handshaking,
    Active,
    Terminating,
    Terminated,
}

/// Why a run ended.
#[derive(Debug)]
pub enum Termination {
    /// The relay sent QUIT.
    Quit,
    /// The relay connection failed while active.
    ConnectionLost(TransportError),
    /// No usable topology snapshot was obtained.
    HandshakeFailed(HandshakeError),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Quit => write!(f, "quit requested by relay"),
            Termination::ConnectionLost(e) => write!(f, "connection lost: {}", e),
            Termination::HandshakeFailed(e) => write!(f, "handshake failed: {}", e),
        }
    }
}

/// Outcome of one router run: the final table, whatever state it is in.
#[derive(Debug)]
pub struct RunReport {
    pub table: ForwardingTable,
    pub termination: Termination,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        matches!(self.termination, Termination::Quit)
    }
}

/// Distance-vector router talking to the topology relay.
///
/// The forwarding table is shared between the receive loop and the
/// advertisement scheduler behind one lock; every read-modify-write of the
/// table happens with that lock held.
pub struct RouterEngine {
    config: RouterConfig,
    table: SharedTable,
    state: EngineState,
}

impl RouterEngine {
    pub fn new(config: RouterConfig) -> Self {
        let table = ForwardingTable::new(config.router_id);
        Self {
            config,
            table: Arc::new(Mutex::new(table)),
            state: EngineState::Disconnected,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Connects to the relay and runs until QUIT or connection failure.
    pub async fn start(&mut self) -> RunReport {
        info!(
            "Starting router {} against relay {} ({})",
            self.config.router_id, self.config.server_name, self.config.relay_addr
        );
        self.set_state(EngineState::Handshaking);

        match TcpStream::connect(self.config.relay_addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle on relay socket: {}", e);
                }
                self.run_on(stream).await
            }
            Err(e) => {
                error!("Could not connect to relay {}: {}", self.config.relay_addr, e);
                self.finish(Termination::HandshakeFailed(HandshakeError::Connect(e)))
                    .await
            }
        }
    }

    /// Runs the protocol over an already open duplex stream to the relay.
    pub async fn run_on<S>(&mut self, stream: S) -> RunReport
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.set_state(EngineState::Handshaking);

        let (sink, mut inbound) = Framed::new(stream, DvrCodec::new()).split();
        let sink: RelaySink<S> = Arc::new(Mutex::new(sink));

        if let Err(e) = self.handshake(&sink, &mut inbound).await {
            error!("Handshake with relay failed: {}", e);
            self.set_state(EngineState::Terminating);
            close_relay(&sink).await;
            return self.finish(Termination::HandshakeFailed(e)).await;
        }

        let scheduler = self.arm_advertisements(&sink);
        self.set_state(EngineState::Active);

        let termination = self.receive_loop(&mut inbound, &scheduler).await;

        self.set_state(EngineState::Terminating);
        scheduler.cancel(SHUTDOWN_GRACE).await;
        close_relay(&sink).await;
        drop(inbound);

        self.finish(termination).await
    }

    async fn handshake<S>(
        &self,
        sink: &RelaySink<S>,
        inbound: &mut RelayStream<S>,
    ) -> Result<(), HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        sink.lock()
            .await
            .send(DvrPacket::hello(self.config.router_id))
            .await
            .map_err(HandshakeError::Send)?;
        debug!("Sent HELLO as router {}", self.config.router_id);

        let reply = match inbound.next().await {
            None => return Err(HandshakeError::PrematureClose),
            Some(Err(e)) => return Err(HandshakeError::Transport(e)),
            Some(Ok(frame)) => frame?,
        };

        if reply.kind != PacketType::Route || !reply.is_from_relay() {
            return Err(HandshakeError::UnexpectedReply(format!(
                "{:?} from {}",
                reply.kind, reply.source
            )));
        }

        self.install_snapshot(&reply.vector).await;
        Ok(())
    }

    async fn receive_loop<S>(
        &self,
        inbound: &mut RelayStream<S>,
        scheduler: &Scheduler,
    ) -> Termination
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        loop {
            let packet = match inbound.next().await {
                None => {
                    warn!("Relay closed the connection");
                    return Termination::ConnectionLost(TransportError::Closed);
                }
                Some(Err(e)) => {
                    error!("Relay connection failed: {}", e);
                    return Termination::ConnectionLost(e);
                }
                Some(Ok(Err(e))) => {
                    warn!("Dropping malformed frame from relay: {}", e);
                    continue;
                }
                Some(Ok(Ok(packet))) => packet,
            };

            match packet.kind {
                PacketType::Quit => {
                    info!("QUIT received from {}", packet.source);
                    return Termination::Quit;
                }
                PacketType::Route if packet.is_from_relay() => {
                    info!("Relay pushed a new topology snapshot");
                    self.install_snapshot(&packet.vector).await;
                    scheduler.rearm();
                }
                PacketType::Route => {
                    if self.apply_advertisement(&packet).await {
                        scheduler.fire_now();
                    }
                }
                other => {
                    debug!("Ignoring {:?} packet from {}", other, packet.source);
                }
            }
        }
    }

    async fn install_snapshot(&self, vector: &[Cost]) {
        let mut table = self.table.lock().await;
        let neighbors = ForwardingTable::direct_neighbors(self.config.router_id, vector);
        table.initialize(vector, &neighbors);
        info!(
            "Router {} initialized with {} destinations, direct neighbors {:?}",
            self.config.router_id,
            table.len(),
            neighbors
        );
    }

    async fn apply_advertisement(&self, packet: &DvrPacket) -> bool {
        let mut table = self.table.lock().await;
        let direct_cost = table.cost_to(packet.source).unwrap_or(INFINITY);
        let changed = table.update(packet.source, direct_cost, &packet.vector);

        if changed {
            info!("Table updated from advertisement of router {}", packet.source);
            debug!("Current table:\n{}", table.render());
        } else {
            debug!("Advertisement from {} changed nothing", packet.source);
        }
        changed
    }

    fn arm_advertisements<S>(&self, sink: &RelaySink<S>) -> Scheduler
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let table = self.table.clone();
        let sink = sink.clone();

        Scheduler::arm(self.config.update_interval, move || {
            let table = table.clone();
            let sink = sink.clone();
            async move {
                advertise(&table, &sink).await;
            }
        })
    }

    async fn finish(&mut self, termination: Termination) -> RunReport {
        let table = self.table.lock().await.clone();
        self.set_state(EngineState::Terminated);
        info!("Router {} terminated: {}", self.config.router_id, termination);

        RunReport { table, termination }
    }

    fn set_state(&mut self, next: EngineState) {
        if self.state != next {
            debug!("Router {} state {:?} -> {:?}", self.config.router_id, self.state, next);
            self.state = next;
        }
    }
}

/// Sends one ROUTE per reachable destination to its next hop.
async fn advertise<S>(table: &SharedTable, sink: &RelaySink<S>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let packets = table.lock().await.advertisements();
    if packets.is_empty() {
        return;
    }

    let mut sink = sink.lock().await;
    let count = packets.len();
    for packet in packets {
        let dest = packet.dest;
        if let Err(e) = sink.feed(packet).await {
            warn!("Failed to queue advertisement for {}: {}", dest, e);
            return;
        }
    }
    match sink.flush().await {
        Ok(()) => debug!("Sent {} advertisements", count),
        Err(e) => warn!("Failed to send advertisements: {}", e),
    }
}

/// Flushes and shuts down our write half; the read half goes when dropped.
/// Pending output is abandoned if the relay does not drain it in time.
async fn close_relay<S>(sink: &RelaySink<S>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let closing = async { sink.lock().await.close().await };
    match timeout(SHUTDOWN_GRACE, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error while closing relay connection: {}", e),
        Err(_) => warn!("Relay did not drain pending output, dropping connection"),
    }
}
