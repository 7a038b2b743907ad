//! Room, transport and consumer endpoints
//!
//! Request and response bodies use camelCase keys. Peers identify themselves
//! with a `ship` id of their own choosing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use conclave_sfu::{
    ConsumerMap, DtlsParameters, MediaKind, PeerId, RoomId, RtpCapabilities, RtpParameters,
    TransportId, TransportInfo,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{AppError, AppResult, AppState};

pub fn create_room_router() -> Router<AppState> {
    Router::new()
        .route("/capabilities", get(get_capabilities))
        .route("/rooms", post(create_room))
        .route(
            "/rooms/{room_id}/transports/{transport_id}/connect",
            post(connect_transport),
        )
        .route(
            "/rooms/{room_id}/transports/{transport_id}/produce",
            post(produce),
        )
        .route("/rooms/{room_id}/peers/{ship}", delete(delete_peer))
        .route("/rooms/{room_id}/peers/{ship}/consumers", get(list_consumers))
        .route(
            "/rooms/{room_id}/peers/{ship}/consumers/{target_ship}/{kind}/resume",
            post(resume_consumer),
        )
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub router_rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub transport: TransportInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub ship: String,
    pub dtls_parameters: DtlsParameters,
    pub rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub ship: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumersResponse {
    pub consumers: ConsumerMap,
}

async fn get_capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        router_rtp_capabilities: state.sfu.capabilities(),
    })
}

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<Json<CreateRoomResponse>> {
    let room_id = RoomId::new(req.room_id);
    let room = state.sfu.get_or_create_room(&room_id).await?;

    Ok(Json(CreateRoomResponse {
        transport: room.transport().clone(),
    }))
}

async fn connect_transport(
    State(state): State<AppState>,
    Path((room_id, transport_id)): Path<(String, String)>,
    Json(req): Json<ConnectRequest>,
) -> AppResult<Json<IdResponse>> {
    let peer_id = PeerId::new(req.ship);
    let transport_id = state
        .sfu
        .connect(
            &RoomId::new(room_id),
            &TransportId::new(transport_id),
            &peer_id,
            req.dtls_parameters,
            req.rtp_capabilities,
        )
        .await?;

    Ok(Json(IdResponse {
        id: transport_id.to_string(),
    }))
}

async fn produce(
    State(state): State<AppState>,
    Path((room_id, transport_id)): Path<(String, String)>,
    Json(req): Json<ProduceRequest>,
) -> AppResult<Json<IdResponse>> {
    let peer_id = PeerId::new(req.ship);
    let published = state
        .sfu
        .produce(
            &RoomId::new(room_id),
            &TransportId::new(transport_id),
            &peer_id,
            req.kind,
            &req.rtp_parameters,
        )
        .await?;

    // Fan-out keeps running after the response is sent
    Ok(Json(IdResponse {
        id: published.producer.id.to_string(),
    }))
}

async fn list_consumers(
    State(state): State<AppState>,
    Path((room_id, ship)): Path<(String, String)>,
) -> AppResult<Json<ConsumersResponse>> {
    let consumers = state
        .sfu
        .list_consumers(&RoomId::new(room_id), &PeerId::new(ship))
        .await?;

    Ok(Json(ConsumersResponse { consumers }))
}

async fn resume_consumer(
    State(state): State<AppState>,
    Path((room_id, ship, target_ship, kind)): Path<(String, String, String, String)>,
) -> AppResult<StatusCode> {
    let kind: MediaKind = kind.parse().map_err(AppError::bad_request)?;
    let consumer_id = state
        .sfu
        .resume_consumer(
            &RoomId::new(room_id),
            &PeerId::new(ship),
            &PeerId::new(target_ship),
            kind,
        )
        .await?;

    debug!(consumer_id = %consumer_id, "Consumer resumed over HTTP");
    Ok(StatusCode::OK)
}

async fn delete_peer(
    State(state): State<AppState>,
    Path((room_id, ship)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    state
        .sfu
        .delete_peer(&RoomId::new(room_id), &PeerId::new(ship))
        .await?;
    Ok(StatusCode::OK)
}
