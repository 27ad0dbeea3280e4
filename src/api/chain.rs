use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::block::Block;
use crate::core::crypto::Address;
use crate::core::ledger::{Ledger, LedgerError};

/// Shared ledger state for the Blockchain service
pub type LedgerData = web::Data<Ledger>;

/// Response for the full chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// Number of blocks including genesis
    pub length: usize,

    /// The blocks, genesis first
    pub chain: Vec<Block>,

    /// Whether the chain passes a full audit
    pub is_valid: bool,
}

/// Response for a successful append
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AppendResponse {
    pub message: String,

    /// The appended block
    pub block: Block,

    /// Chain length after the append
    pub chain_length: usize,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,

    /// Height the balance was evaluated at
    pub height: u64,
}

/// Response for the account endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub address: String,
    pub balance: u64,
    pub nonce: u64,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Deserialize)]
pub struct BalanceQuery {
    pub height: Option<u64>,
}

fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });

    match err {
        LedgerError::InvalidLinkage { .. } => HttpResponse::Conflict().json(body),
        LedgerError::NotFound(_) => HttpResponse::NotFound().json(body),
        LedgerError::Storage(_) => HttpResponse::InternalServerError().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Get the full blockchain
///
/// Returns every block plus the result of a full chain audit
#[utoipa::path(
    get,
    path = "/blockchain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let chain = ledger.chain();
    let is_valid = ledger.is_valid();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Append a candidate block
///
/// Validates linkage, proof of work and every contained transaction.
/// A stale parent is reported as 409 so miners can tell the expected
/// race apart from a hard rejection.
#[utoipa::path(
    post,
    path = "/blockchain/blocks",
    request_body = Block,
    responses(
        (status = 201, description = "Block appended", body = AppendResponse),
        (status = 400, description = "Invalid proof of work or transactions"),
        (status = 409, description = "Linkage race: head moved")
    )
)]
pub async fn append_block(ledger: LedgerData, block: web::Json<Block>) -> impl Responder {
    let block = block.into_inner();

    match ledger.append(block.clone()) {
        Ok(()) => HttpResponse::Created().json(AppendResponse {
            message: "Block appended".to_string(),
            chain_length: ledger.height() as usize + 1,
            block,
        }),
        Err(err) => ledger_error_response(&err),
    }
}

/// Get a single block by height
#[utoipa::path(
    get,
    path = "/blockchain/blocks/{height}",
    responses(
        (status = 200, description = "Block retrieved", body = Block),
        (status = 404, description = "No block at that height")
    )
)]
pub async fn get_block(ledger: LedgerData, height: web::Path<u64>) -> impl Responder {
    match ledger.block_at(height.into_inner()) {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(err) => ledger_error_response(&err),
    }
}

/// Get an account's confirmed balance
///
/// Evaluated at the head, or at a historical height via the `height`
/// query parameter (replayed from genesis).
#[utoipa::path(
    get,
    path = "/blockchain/balance/{address}",
    responses(
        (status = 200, description = "Balance retrieved", body = BalanceResponse),
        (status = 404, description = "Height beyond head")
    )
)]
pub async fn get_balance(
    ledger: LedgerData,
    address: web::Path<String>,
    query: web::Query<BalanceQuery>,
) -> impl Responder {
    let address = Address(address.into_inner());
    let height = query.height;

    match ledger.balance_of(&address, height) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse {
            address: address.0,
            balance,
            height: height.unwrap_or_else(|| ledger.height()),
        }),
        Err(err) => ledger_error_response(&err),
    }
}

/// Get an account's balance and nonce at the head
///
/// Fresh accounts report zero balance and nonce rather than 404; the pool
/// and wallets need a well-defined starting state.
#[utoipa::path(
    get,
    path = "/blockchain/accounts/{address}",
    responses(
        (status = 200, description = "Account state retrieved", body = AccountResponse)
    )
)]
pub async fn get_account(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let info = ledger.account(&address);

    HttpResponse::Ok().json(AccountResponse {
        address: address.0,
        balance: info.balance,
        nonce: info.nonce,
    })
}

/// Get the chain head
///
/// Height, hash and the difficulty the next block must satisfy, taken as
/// one consistent snapshot.
#[utoipa::path(
    get,
    path = "/blockchain/head",
    responses(
        (status = 200, description = "Head snapshot retrieved")
    )
)]
pub async fn get_head(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.head_info())
}

/// Audit the whole chain
#[utoipa::path(
    get,
    path = "/blockchain/validate",
    responses(
        (status = 200, description = "Audit result", body = ValidateResponse)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse {
        valid: ledger.is_valid(),
    })
}

/// Configures the Blockchain service routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/blockchain")
            .route("", web::get().to(get_chain))
            .route("/blocks", web::post().to(append_block))
            .route("/blocks/{height}", web::get().to(get_block))
            .route("/balance/{address}", web::get().to(get_balance))
            .route("/accounts/{address}", web::get().to(get_account))
            .route("/head", web::get().to(get_head))
            .route("/validate", web::get().to(validate_chain)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::KeyPair;
    use crate::core::ledger::LedgerParams;
    use actix_web::{test, App};

    fn test_app_ledger() -> LedgerData {
        let keys = KeyPair::generate();
        web::Data::new(Ledger::new(LedgerParams {
            initial_difficulty: 1,
            genesis_grants: vec![(keys.address().clone(), 100)],
            ..LedgerParams::default()
        }))
    }

    #[actix_web::test]
    async fn test_get_chain_endpoint() {
        let ledger = test_app_ledger();
        let app = test::init_service(
            App::new()
                .app_data(ledger.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/blockchain").to_request();
        let body: ChainResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.length, 1);
        assert!(body.is_valid);
    }

    #[actix_web::test]
    async fn test_append_rejects_stale_parent_with_409() {
        let ledger = test_app_ledger();
        let app = test::init_service(
            App::new()
                .app_data(ledger.clone())
                .configure(configure_routes),
        )
        .await;

        let stranger = Block::new(
            1,
            "not the head".to_string(),
            Vec::new(),
            chrono::Utc::now(),
            0,
        );
        let req = test::TestRequest::post()
            .uri("/blockchain/blocks")
            .set_json(&stranger)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_unknown_height_is_404() {
        let ledger = test_app_ledger();
        let app = test::init_service(
            App::new()
                .app_data(ledger.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/blockchain/blocks/99")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_fresh_account_is_zeroed() {
        let ledger = test_app_ledger();
        let app = test::init_service(
            App::new()
                .app_data(ledger.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/blockchain/accounts/nobody")
            .to_request();
        let body: AccountResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.balance, 0);
        assert_eq!(body.nonce, 0);
    }
}
