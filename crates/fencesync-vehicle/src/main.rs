//! FenceSync Simulated Vehicle
//!
//! Serves onboard fence storage for any number of simulated vehicles over
//! WebSocket. Each vehicle lives at `/vehicle/{id}` and keeps its fence and
//! parameters for the lifetime of the server; several links may attach to
//! the same vehicle.
//!
//! ## Protocol
//!
//! Messages are JSON text frames tagged by `type`:
//! ```json
//! { "type": "load" }
//! { "type": "send", "fence": { "version": 2, "polygons": [], "circles": [] } }
//! { "type": "fence", "fence": { ... } }
//! ```

mod vehicle;

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use clap::Parser;
use dashmap::DashMap;
use fencesync_core::capability::MISSION_FENCE;
use fencesync_core::protocol::{LinkRequest, LinkResponse};
use futures_util::{SinkExt, StreamExt};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vehicle::{Reply, Vehicle, VehicleOptions};

const CHANNEL_CAPACITY: usize = 256;

/// Simulated vehicle with onboard geofence storage
#[derive(Parser, Debug)]
#[command(name = "fencesync-vehicle", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5790")]
    addr: SocketAddr,

    /// Capability bits advertised by every vehicle
    #[arg(long, default_value_t = MISSION_FENCE)]
    capability_bits: u64,

    /// Highest protocol version (major * 100) reported on request
    #[arg(long, default_value_t = 200)]
    protocol_version: u32,

    /// Expose the single-radius fence parameter with this value
    #[arg(long)]
    fence_radius: Option<f64>,
}

/// A vehicle plus the channel fanning its notifications out to links.
struct VehicleSlot {
    vehicle: Vehicle,
    tx: broadcast::Sender<LinkResponse>,
}

/// Shared application state
struct AppState {
    vehicles: DashMap<String, VehicleSlot>,
    options: VehicleOptions,
}

impl AppState {
    fn new(options: VehicleOptions) -> Self {
        Self {
            vehicles: DashMap::new(),
            options,
        }
    }

    /// Attach a link, creating the vehicle on first contact.
    fn attach(&self, vehicle_id: &str) -> (LinkResponse, broadcast::Receiver<LinkResponse>) {
        let slot = self.vehicles.entry(vehicle_id.to_string()).or_insert_with(|| {
            info!("Creating vehicle {}", vehicle_id);
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            VehicleSlot {
                vehicle: Vehicle::new(vehicle_id, &self.options),
                tx,
            }
        });
        (slot.vehicle.hello(), slot.tx.subscribe())
    }

    /// Apply a request; broadcast replies go out here, the direct replies
    /// are returned.
    fn handle(&self, vehicle_id: &str, request: LinkRequest) -> Vec<LinkResponse> {
        let Some(mut slot) = self.vehicles.get_mut(vehicle_id) else {
            warn!("Request for unknown vehicle {}", vehicle_id);
            return Vec::new();
        };
        let Reply { direct, broadcast } = slot.vehicle.handle(request);
        debug!("Vehicle {} fence: {}", slot.vehicle.id(), slot.vehicle.fence());
        if let Some(response) = broadcast {
            let _ = slot.tx.send(response);
        }
        direct
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fencesync_vehicle=info,tower_http=info".into()),
        )
        .init();

    let mut options = VehicleOptions {
        capability_bits: args.capability_bits,
        max_protocol_version: args.protocol_version,
        ..VehicleOptions::default()
    };
    if let Some(radius) = args.fence_radius {
        options = options.with_fence_radius(radius);
    }
    let state = Arc::new(AppState::new(options));

    info!("FenceSync vehicle listening on {}", args.addr);
    info!("WebSocket endpoint: ws://{}/vehicle/{{id}}", args.addr);

    let listener = match tokio::net::TcpListener::bind(args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!("Server error: {}", e);
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/vehicle/{id}", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "FenceSync Vehicle - Connect via WebSocket at /vehicle/{id}"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(vehicle_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, vehicle_id, state))
}

fn to_message(response: &LinkResponse) -> Option<Message> {
    match serde_json::to_string(response) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode response: {}", e);
            None
        }
    }
}

/// Handle one link to a vehicle
async fn handle_socket(socket: WebSocket, vehicle_id: String, state: Arc<AppState>) {
    let link_id = Uuid::new_v4().to_string();
    info!("Link {} attached to vehicle {}", link_id, vehicle_id);

    let (mut sender, mut receiver) = socket.split();
    let (hello, mut vehicle_rx) = state.attach(&vehicle_id);

    if let Some(msg) = to_message(&hello) {
        if sender.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match serde_json::from_str::<LinkRequest>(&text) {
                            Ok(request) => {
                                debug!("Link {} request {:?}", link_id, request);
                                state.handle(&vehicle_id, request)
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", link_id, e);
                                vec![LinkResponse::Error {
                                    message: format!("Invalid message: {}", e),
                                }]
                            }
                        };
                        let mut closed = false;
                        for msg in replies.iter().filter_map(to_message) {
                            if sender.send(msg).await.is_err() {
                                closed = true;
                                break;
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", link_id, e);
                        break;
                    }
                }
            }

            notification = vehicle_rx.recv() => {
                match notification {
                    Ok(response) => {
                        if let Some(msg) = to_message(&response) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Link {} missed {} notifications", link_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Link {} detached from vehicle {}", link_id, vehicle_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencesync_core::capability::LEGACY_FENCE_RADIUS_PARAM;
    use serde_json::json;
    use tokio_tungstenite::{connect_async, tungstenite};

    async fn spawn_server(options: VehicleOptions) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(options));
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        addr
    }

    type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn recv(client: &mut Client) -> LinkResponse {
        loop {
            let msg = client.next().await.unwrap().unwrap();
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send(client: &mut Client, request: &LinkRequest) {
        let json = serde_json::to_string(request).unwrap();
        client.send(tungstenite::Message::Text(json.into())).await.unwrap();
    }

    #[test]
    fn test_state_keeps_vehicle_between_links() {
        let state = AppState::new(VehicleOptions::default());
        state.attach("3");
        let fence = json!({
            "version": 2,
            "polygons": [],
            "circles": [{ "version": 1, "inclusion": true, "circle": { "center": [8.5, 47.25], "radius": 75.0 } }],
        });
        let reply = state.handle("3", LinkRequest::Send { fence: fence.clone() });
        assert_eq!(reply, vec![LinkResponse::SendAck { error: None }]);

        state.attach("3");
        assert_eq!(state.handle("3", LinkRequest::Load), vec![LinkResponse::Fence { fence }]);
        assert_eq!(state.vehicles.len(), 1);
    }

    #[test]
    fn test_state_unknown_vehicle() {
        let state = AppState::new(VehicleOptions::default());
        assert!(state.handle("9", LinkRequest::Load).is_empty());
    }

    #[tokio::test]
    async fn test_link_hello_and_protocol_version() {
        let addr = spawn_server(VehicleOptions::default()).await;
        let (mut client, _) = connect_async(format!("ws://{}/vehicle/1", addr)).await.unwrap();

        match recv(&mut client).await {
            LinkResponse::Hello { peer } => {
                assert_eq!(peer.vehicle_id, "1");
                assert_eq!(peer.max_protocol_version, vehicle::INITIAL_PROTOCOL_VERSION);
            }
            other => panic!("Expected hello, got {:?}", other),
        }

        send(&mut client, &LinkRequest::RequestProtocolVersion).await;
        assert_eq!(
            recv(&mut client).await,
            LinkResponse::ProtocolVersion { max_protocol_version: 200 }
        );
        assert_eq!(
            recv(&mut client).await,
            LinkResponse::CapabilityBits { capability_bits: MISSION_FENCE }
        );
    }

    #[tokio::test]
    async fn test_parameter_change_reaches_every_link() {
        let addr = spawn_server(VehicleOptions::default().with_fence_radius(100.0)).await;
        let url = format!("ws://{}/vehicle/2", addr);
        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = connect_async(url.as_str()).await.unwrap();
        recv(&mut first).await;
        recv(&mut second).await;

        send(
            &mut first,
            &LinkRequest::SetParameter {
                name: LEGACY_FENCE_RADIUS_PARAM.to_string(),
                value: 140.0,
            },
        )
        .await;

        let expected = LinkResponse::ParameterChanged {
            name: LEGACY_FENCE_RADIUS_PARAM.to_string(),
            value: 140.0,
        };
        assert_eq!(recv(&mut first).await, expected);
        assert_eq!(recv(&mut second).await, expected);
    }

    #[tokio::test]
    async fn test_invalid_message_gets_error() {
        let addr = spawn_server(VehicleOptions::default()).await;
        let (mut client, _) = connect_async(format!("ws://{}/vehicle/1", addr)).await.unwrap();
        recv(&mut client).await;

        client
            .send(tungstenite::Message::Text("{\"type\":\"launch\"}".into()))
            .await
            .unwrap();
        assert!(matches!(recv(&mut client).await, LinkResponse::Error { .. }));
    }
}
