use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::clients::{BlockchainClient, TransactionClient};
use crate::core::block::Block;
use crate::core::miner::{MineOutcome, Miner, MinerError, MinerStatus};
use crate::core::view::ViewError;

/// Shared miner state for the Miner service
pub type MinerData = web::Data<Miner>;

/// Response for the mine endpoint
#[derive(Serialize, ToSchema)]
pub struct MineResponse {
    /// "mined" or "cancelled"
    pub status: String,

    /// The accepted block when status is "mined"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

/// Response for the status endpoint
#[derive(Serialize, ToSchema)]
pub struct MinerStatusResponse {
    pub status: MinerStatus,

    /// Whether the continuous loop is active
    pub running: bool,
}

/// Response for the start/stop endpoints
#[derive(Serialize, ToSchema)]
pub struct LoopResponse {
    pub status: String,
}

fn miner_error_response(err: &MinerError) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": match err {
            MinerError::LostRace(_) => "invalid-linkage",
            MinerError::Chain(ViewError::Unavailable(_)) => "unavailable",
            MinerError::Chain(_) => "rejected",
        },
    });

    match err {
        MinerError::LostRace(_) => HttpResponse::Conflict().json(body),
        MinerError::Chain(ViewError::Unavailable(_)) => {
            HttpResponse::ServiceUnavailable().json(body)
        }
        MinerError::Chain(_) => HttpResponse::BadRequest().json(body),
    }
}

/// Run one mining cycle
///
/// Assembles a candidate from the pending pool, searches for a valid
/// nonce and submits the solved block to the Blockchain service. Losing
/// the append race restarts assembly internally.
#[utoipa::path(
    post,
    path = "/mine",
    responses(
        (status = 200, description = "Cycle finished", body = MineResponse),
        (status = 409, description = "Lost the linkage race repeatedly"),
        (status = 503, description = "A peer service is unreachable")
    )
)]
pub async fn mine_once(
    miner: MinerData,
    chain: web::Data<BlockchainClient>,
    pool: web::Data<TransactionClient>,
) -> impl Responder {
    match miner.mine_once(chain.get_ref(), pool.get_ref()).await {
        Ok(MineOutcome::Mined(block)) => HttpResponse::Ok().json(MineResponse {
            status: "mined".to_string(),
            block: Some(block),
        }),
        Ok(MineOutcome::Cancelled) => HttpResponse::Ok().json(MineResponse {
            status: "cancelled".to_string(),
            block: None,
        }),
        Err(err) => miner_error_response(&err),
    }
}

/// Start the continuous mining loop
#[utoipa::path(
    post,
    path = "/mine/start",
    responses(
        (status = 200, description = "Loop started or already running", body = LoopResponse)
    )
)]
pub async fn start_mining(
    miner: MinerData,
    chain: web::Data<BlockchainClient>,
    pool: web::Data<TransactionClient>,
) -> impl Responder {
    let started = miner.start(chain.clone().into_inner(), pool.clone().into_inner());

    HttpResponse::Ok().json(LoopResponse {
        status: if started {
            "started".to_string()
        } else {
            "already-running".to_string()
        },
    })
}

/// Stop the continuous mining loop
///
/// Cancels any in-flight search; partial work is discarded.
#[utoipa::path(
    post,
    path = "/mine/stop",
    responses(
        (status = 200, description = "Loop stopped or was not running", body = LoopResponse)
    )
)]
pub async fn stop_mining(miner: MinerData) -> impl Responder {
    let stopped = miner.stop();

    HttpResponse::Ok().json(LoopResponse {
        status: if stopped {
            "stopped".to_string()
        } else {
            "not-running".to_string()
        },
    })
}

/// Report the miner's state machine
#[utoipa::path(
    get,
    path = "/mine/status",
    responses(
        (status = 200, description = "Miner status", body = MinerStatusResponse)
    )
)]
pub async fn mining_status(miner: MinerData) -> impl Responder {
    HttpResponse::Ok().json(MinerStatusResponse {
        status: miner.status(),
        running: miner.is_running(),
    })
}

/// Configures the Miner service routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/mine")
            .route("", web::post().to(mine_once))
            .route("/start", web::post().to(start_mining))
            .route("/stop", web::post().to(stop_mining))
            .route("/status", web::get().to(mining_status)),
    );
}
