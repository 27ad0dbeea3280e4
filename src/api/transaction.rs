use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::clients::BlockchainClient;
use crate::config::Config;
use crate::core::block::Block;
use crate::core::crypto::Address;
use crate::core::pool::{PoolError, SubmitOutcome, TransactionPool};
use crate::core::transaction::Transaction;
use crate::core::view::ViewError;

/// Shared pool state for the Transaction service
pub type PoolData = web::Data<TransactionPool>;

/// Response for the submit endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    /// "pending" on admission, "already-pending" on idempotent re-submit
    pub status: String,

    /// Content-derived transaction id
    pub id: String,
}

/// Response for the pending endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PendingResponse {
    pub transactions: Vec<Transaction>,
}

/// Response for the eviction endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct EvictResponse {
    pub evicted: usize,
}

#[derive(Deserialize)]
pub struct PendingQuery {
    pub limit: Option<usize>,
    pub sender: Option<String>,
}

fn pool_error_response(err: &PoolError) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });

    match err {
        PoolError::Unavailable(ViewError::Unavailable(_)) => {
            HttpResponse::ServiceUnavailable().json(body)
        }
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Submit a signed transaction
///
/// Validates signature, nonce and spendable balance against the
/// Blockchain service's head state plus already-pooled transactions from
/// the same sender. Idempotent per transaction id.
#[utoipa::path(
    post,
    path = "/transaction/send",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction admitted or already pending", body = SubmitResponse),
        (status = 400, description = "Invalid signature, nonce or balance"),
        (status = 503, description = "Blockchain service unreachable")
    )
)]
pub async fn submit_transaction(
    pool: PoolData,
    chain: web::Data<BlockchainClient>,
    tx: web::Json<Transaction>,
) -> impl Responder {
    let tx = tx.into_inner();
    let id = tx.id();

    match pool.submit(tx, chain.get_ref()).await {
        Ok(SubmitOutcome::Admitted) => HttpResponse::Ok().json(SubmitResponse {
            status: "pending".to_string(),
            id,
        }),
        Ok(SubmitOutcome::AlreadyPending) => HttpResponse::Ok().json(SubmitResponse {
            status: "already-pending".to_string(),
            id,
        }),
        Err(err) => pool_error_response(&err),
    }
}

/// List pending transactions
///
/// Admission (FIFO) order. `limit` caps the count, `sender` filters by
/// address; listing never removes anything from the pool.
#[utoipa::path(
    get,
    path = "/transaction/pending",
    responses(
        (status = 200, description = "Pending transactions", body = PendingResponse)
    )
)]
pub async fn get_pending(pool: PoolData, query: web::Query<PendingQuery>) -> impl Responder {
    let transactions = match &query.sender {
        Some(sender) => pool.pending_from(&Address(sender.clone())),
        None => pool.select_for_block(query.limit.unwrap_or(usize::MAX)),
    };

    HttpResponse::Ok().json(PendingResponse { transactions })
}

/// Evict transactions settled by a block
///
/// Called by the Miner after the Blockchain service accepted the block.
#[utoipa::path(
    post,
    path = "/transaction/evict-mined",
    request_body = Block,
    responses(
        (status = 200, description = "Eviction count", body = EvictResponse)
    )
)]
pub async fn evict_mined(pool: PoolData, block: web::Json<Block>) -> impl Responder {
    let evicted = pool.evict_mined(&block.into_inner());
    HttpResponse::Ok().json(EvictResponse { evicted })
}

/// Evict transactions older than the configured maximum age
#[utoipa::path(
    post,
    path = "/transaction/evict-expired",
    responses(
        (status = 200, description = "Eviction count", body = EvictResponse)
    )
)]
pub async fn evict_expired(pool: PoolData, config: web::Data<Config>) -> impl Responder {
    let evicted = pool.evict_expired(config.pool_max_age());
    HttpResponse::Ok().json(EvictResponse { evicted })
}

/// Configures the Transaction service routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/transaction")
            .route("/send", web::post().to(submit_transaction))
            .route("/pending", web::get().to(get_pending))
            .route("/evict-mined", web::post().to(evict_mined))
            .route("/evict-expired", web::post().to(evict_expired)),
    );
}
