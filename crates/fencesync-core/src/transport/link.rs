//! Websocket link to a vehicle.
//!
//! A background thread owns the socket; the transport talks to it over
//! channels so every `FenceTransport` call stays non-blocking.

use super::{FenceTransport, TransportError, TransportEvent};
use crate::geo::GeoCoordinate;
use crate::protocol::{LinkRequest, LinkResponse};
use crate::schema::{self, Decoded, FenceSnapshot};
use crate::shapes::{FenceCircle, FencePolygon};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Commands sent to the socket thread.
enum LinkCommand {
    Send(String),
    Close,
}

/// Events from the socket thread.
enum SocketEvent {
    Connected,
    Disconnected,
    Response(LinkResponse),
    Error(String),
}

#[derive(Debug, Clone)]
enum Operation {
    Load,
    Send(FenceSnapshot),
    RemoveAll,
}

/// Vehicle reached over a websocket.
///
/// After the vehicle says hello the link asks for its protocol version
/// and issues the initial fence load on its own.
pub struct LinkTransport {
    state: ConnectionState,
    cmd_tx: Option<Sender<LinkCommand>>,
    event_rx: Option<Receiver<SocketEvent>>,
    _thread: Option<JoinHandle<()>>,
    operation: Option<Operation>,
    reported: FenceSnapshot,
    initial_load_complete: bool,
    events: Vec<TransportEvent>,
}

impl LinkTransport {
    /// Create a disconnected link.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
            operation: None,
            reported: FenceSnapshot::default(),
            initial_load_complete: false,
            events: Vec::new(),
        }
    }

    /// Connect to a vehicle at `url` (`ws://` or `wss://`).
    pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::Connection("Already connected".to_string()));
        }

        let parsed_url = Url::parse(url).map_err(|e| TransportError::Connection(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(TransportError::Connection(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        self.state = ConnectionState::Connecting;
        self.initial_load_complete = false;

        let (cmd_tx, cmd_rx) = channel::<LinkCommand>();
        let (event_tx, event_rx) = channel::<SocketEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || socket_loop(&url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Close the link. An outstanding request completes with an error.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(LinkCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
        self.abort_operation();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Ask the vehicle to change a parameter.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), TransportError> {
        self.send_request(&LinkRequest::SetParameter {
            name: name.to_string(),
            value,
        })
    }

    fn send_request(&self, request: &LinkRequest) -> Result<(), TransportError> {
        let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let json = serde_json::to_string(request).map_err(|e| TransportError::Send(e.to_string()))?;
        tx.send(LinkCommand::Send(json))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn begin(&mut self, operation: Operation, request: &LinkRequest) -> Result<(), TransportError> {
        if self.operation.is_some() {
            return Err(TransportError::Busy);
        }
        self.send_request(request)?;
        self.operation = Some(operation);
        self.events.push(TransportEvent::InProgressChanged(true));
        Ok(())
    }

    fn finish(&mut self) -> Option<Operation> {
        let operation = self.operation.take();
        if operation.is_some() {
            self.events.push(TransportEvent::InProgressChanged(false));
        }
        operation
    }

    /// Complete any outstanding request with an error.
    fn abort_operation(&mut self) {
        match self.finish() {
            Some(Operation::Load) => self.events.push(TransportEvent::LoadComplete),
            Some(Operation::Send(_)) => self.events.push(TransportEvent::SendComplete { error: true }),
            Some(Operation::RemoveAll) => self.events.push(TransportEvent::RemoveAllComplete { error: true }),
            None => {}
        }
    }

    fn handle_response(&mut self, response: LinkResponse) {
        match response {
            LinkResponse::Hello { peer } => {
                log::info!("Vehicle {} connected", peer.vehicle_id);
                self.events.push(TransportEvent::PeerConnected(peer));
                if let Err(e) = self.send_request(&LinkRequest::RequestProtocolVersion) {
                    log::warn!("Protocol version request failed: {}", e);
                }
                if let Err(e) = self.load_from_vehicle() {
                    log::warn!("Initial fence load failed: {}", e);
                }
            }
            LinkResponse::ProtocolVersion { max_protocol_version } => {
                self.events
                    .push(TransportEvent::ProtocolVersionChanged(max_protocol_version));
            }
            LinkResponse::CapabilityBits { capability_bits } => {
                self.events.push(TransportEvent::CapabilityBitsChanged(capability_bits));
            }
            LinkResponse::Fence { fence } => {
                if !matches!(self.operation, Some(Operation::Load)) {
                    log::debug!("Unsolicited fence from vehicle");
                }
                match schema::decode(&fence) {
                    Ok(Decoded::Fence(snapshot)) => self.reported = snapshot,
                    Ok(Decoded::Legacy) => self.reported = FenceSnapshot::default(),
                    Err(e) => log::warn!("Vehicle sent an unreadable fence: {}", e),
                }
                self.finish();
                self.initial_load_complete = true;
                self.events.push(TransportEvent::LoadComplete);
            }
            LinkResponse::SendAck { error } => {
                let sent = match self.finish() {
                    Some(Operation::Send(fence)) => Some(fence),
                    _ => None,
                };
                if let Some(message) = &error {
                    log::warn!("Vehicle rejected fence: {}", message);
                } else if let Some(fence) = sent {
                    self.reported = fence;
                }
                self.events.push(TransportEvent::SendComplete { error: error.is_some() });
            }
            LinkResponse::RemoveAllAck { error } => {
                self.finish();
                if let Some(message) = &error {
                    log::warn!("Vehicle failed to remove fence: {}", message);
                } else {
                    self.reported = FenceSnapshot::default();
                }
                self.events
                    .push(TransportEvent::RemoveAllComplete { error: error.is_some() });
            }
            LinkResponse::ParameterChanged { name, value } => {
                self.events.push(TransportEvent::ParameterChanged { name, value });
            }
            LinkResponse::Error { message } => {
                log::warn!("Vehicle reported error: {}", message);
                self.abort_operation();
            }
        }
    }
}

impl Default for LinkTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LinkTransport {
    fn drop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(LinkCommand::Close);
        }
    }
}

impl FenceTransport for LinkTransport {
    fn load_from_vehicle(&mut self) -> Result<(), TransportError> {
        self.begin(Operation::Load, &LinkRequest::Load)
    }

    fn send_to_vehicle(
        &mut self,
        breach_return: Option<GeoCoordinate>,
        polygons: &[FencePolygon],
        circles: &[FenceCircle],
    ) -> Result<(), TransportError> {
        let fence = FenceSnapshot {
            breach_return,
            polygons: polygons.to_vec(),
            circles: circles.to_vec(),
        };
        let request = LinkRequest::Send {
            fence: schema::encode(&fence),
        };
        self.begin(Operation::Send(fence), &request)
    }

    fn remove_all(&mut self) -> Result<(), TransportError> {
        self.begin(Operation::RemoveAll, &LinkRequest::RemoveAll)
    }

    fn in_progress(&self) -> bool {
        self.operation.is_some()
    }

    fn initial_load_complete(&self) -> bool {
        self.initial_load_complete
    }

    fn breach_return_point(&self) -> Option<GeoCoordinate> {
        self.reported.breach_return
    }

    fn polygons(&self) -> &[FencePolygon] {
        &self.reported.polygons
    }

    fn circles(&self) -> &[FenceCircle] {
        &self.reported.circles
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut received = Vec::new();
        let mut thread_gone = false;
        if let Some(ref rx) = self.event_rx {
            loop {
                match rx.try_recv() {
                    Ok(event) => received.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        thread_gone = true;
                        break;
                    }
                }
            }
        }

        for event in received {
            match event {
                SocketEvent::Connected => self.state = ConnectionState::Connected,
                SocketEvent::Disconnected => {
                    self.state = ConnectionState::Disconnected;
                    self.cmd_tx = None;
                    self.abort_operation();
                }
                SocketEvent::Error(message) => {
                    log::error!("Vehicle link error: {}", message);
                    self.state = ConnectionState::Error;
                    self.cmd_tx = None;
                    self.abort_operation();
                }
                SocketEvent::Response(response) => self.handle_response(response),
            }
        }

        // The socket thread exited without a word, possibly by panicking.
        if thread_gone {
            log::debug!("Vehicle link event channel closed");
            self.event_rx = None;
            self.cmd_tx = None;
            if self.state != ConnectionState::Error {
                self.state = ConnectionState::Disconnected;
            }
            self.abort_operation();
        }

        std::mem::take(&mut self.events)
    }
}

/// At most `max_chars` characters of `msg`.
fn preview(msg: &str, max_chars: usize) -> &str {
    match msg.char_indices().nth(max_chars) {
        Some((end, _)) => &msg[..end],
        None => msg,
    }
}

/// Socket thread body: forwards commands out and responses in until the
/// socket closes or the command channel goes away.
fn socket_loop(url: &str, cmd_rx: Receiver<LinkCommand>, event_tx: Sender<SocketEvent>) {
    log::info!("Vehicle link: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("Vehicle link connection failed: {}", e);
            let _ = event_tx.send(SocketEvent::Error(format!("Connection failed: {}", e)));
            return;
        }
    };
    log::info!("Vehicle link connected, status: {}", response.status());
    let _ = event_tx.send(SocketEvent::Connected);

    // Short read timeout keeps the loop responsive to outgoing commands.
    match socket.get_mut() {
        tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("TLS or other stream - using default timeout handling"),
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(LinkCommand::Send(msg)) => {
                log::debug!("Vehicle link sending: {}", preview(&msg, 100));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("Vehicle link send error: {}", e);
                    break;
                }
            }
            Ok(LinkCommand::Close) => {
                log::info!("Vehicle link close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("Vehicle link command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<LinkResponse>(&txt) {
                Ok(response) => {
                    let _ = event_tx.send(SocketEvent::Response(response));
                }
                Err(e) => log::warn!("Failed to parse vehicle message: {} ({})", txt, e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Vehicle link received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Vehicle link read error: {}", e);
                break;
            }
        }
    }

    log::info!("Vehicle link thread exiting");
    let _ = event_tx.send(SocketEvent::Disconnected);
}
