use actix_web::{web, HttpResponse, Responder};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::clients::{BlockchainClient, TransactionClient};
use crate::core::crypto::Address;
use crate::core::transaction::Transaction;
use crate::core::view::ViewError;
use crate::core::wallet::{BalanceBreakdown, Wallet, WalletError};

/// In-memory keystore of the Wallet service. Keys are created here and
/// never leave the process; callers only ever see addresses.
#[derive(Debug, Default)]
pub struct Keystore {
    wallets: DashMap<String, Wallet>,
}

impl Keystore {
    pub fn new() -> Self {
        Keystore::default()
    }

    pub fn create(&self) -> Address {
        let wallet = Wallet::generate();
        let address = wallet.address().clone();
        self.wallets.insert(address.0.clone(), wallet);
        address
    }

    pub fn get(&self, address: &str) -> Option<Wallet> {
        self.wallets.get(address).map(|w| w.clone())
    }
}

/// Shared keystore state for the Wallet service
pub type KeystoreData = web::Data<Keystore>;

/// Response for the create endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateWalletResponse {
    pub address: String,
}

/// Request for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendRequest {
    pub recipient: String,
    pub amount: u64,
}

/// Response for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendResponse {
    /// Pool admission status
    pub status: String,

    /// Transaction id
    pub id: String,

    /// The signed transaction as submitted
    pub transaction: Transaction,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletBalanceResponse {
    pub address: String,
    pub confirmed: u64,
    pub pending_outgoing: u64,
    pub spendable: u64,
}

fn wallet_error_response(err: &WalletError) -> HttpResponse {
    let kind = match err {
        WalletError::InsufficientBalance { .. } => "insufficient-balance",
        WalletError::Transaction(_) | WalletError::Crypto(_) => "invalid-transaction",
        WalletError::Peer(ViewError::Unavailable(_)) => "unavailable",
        WalletError::Peer(_) => "rejected",
    };
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": kind,
    });

    match err {
        WalletError::Peer(ViewError::Unavailable(_)) => {
            HttpResponse::ServiceUnavailable().json(body)
        }
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Create a new wallet
///
/// Generates a key pair and returns only the address. The private key
/// stays in the service keystore.
#[utoipa::path(
    post,
    path = "/wallet/create",
    responses(
        (status = 201, description = "Wallet created", body = CreateWalletResponse)
    )
)]
pub async fn create_wallet(keystore: KeystoreData) -> impl Responder {
    let address = keystore.create();

    HttpResponse::Created().json(CreateWalletResponse { address: address.0 })
}

/// Build, sign and submit a transaction
///
/// Reads balance and nonce from the Blockchain and Transaction services,
/// fails locally on overspend before signing, then forwards the signed
/// transaction to the Transaction service.
#[utoipa::path(
    post,
    path = "/wallet/{address}/transactions",
    request_body = SendRequest,
    responses(
        (status = 200, description = "Transaction submitted", body = SendResponse),
        (status = 400, description = "Insufficient balance or invalid request"),
        (status = 404, description = "Unknown wallet"),
        (status = 503, description = "A peer service is unreachable")
    )
)]
pub async fn send_transaction(
    keystore: KeystoreData,
    chain: web::Data<BlockchainClient>,
    transactions: web::Data<TransactionClient>,
    address: web::Path<String>,
    request: web::Json<SendRequest>,
) -> impl Responder {
    let wallet = match keystore.get(&address) {
        Some(wallet) => wallet,
        None => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("unknown wallet: {}", address),
                "kind": "not-found",
            }))
        }
    };

    let recipient = Address(request.recipient.clone());
    let tx = match wallet
        .create_transaction(recipient, request.amount, chain.get_ref(), transactions.get_ref())
        .await
    {
        Ok(tx) => tx,
        Err(err) => return wallet_error_response(&err),
    };

    match transactions.submit(&tx).await {
        Ok(receipt) => HttpResponse::Ok().json(SendResponse {
            status: receipt.status,
            id: receipt.id,
            transaction: tx,
        }),
        Err(err) => wallet_error_response(&WalletError::Peer(err)),
    }
}

/// Get a wallet's balance
///
/// Confirmed funds from the Blockchain service plus this wallet's pending
/// outgoing transactions, reported separately.
#[utoipa::path(
    get,
    path = "/wallet/{address}/balance",
    responses(
        (status = 200, description = "Balance retrieved", body = WalletBalanceResponse),
        (status = 404, description = "Unknown wallet"),
        (status = 503, description = "A peer service is unreachable")
    )
)]
pub async fn get_balance(
    keystore: KeystoreData,
    chain: web::Data<BlockchainClient>,
    transactions: web::Data<TransactionClient>,
    address: web::Path<String>,
) -> impl Responder {
    let wallet = match keystore.get(&address) {
        Some(wallet) => wallet,
        None => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("unknown wallet: {}", address),
                "kind": "not-found",
            }))
        }
    };

    match wallet.balance(chain.get_ref(), transactions.get_ref()).await {
        Ok(BalanceBreakdown {
            confirmed,
            pending_outgoing,
            spendable,
        }) => HttpResponse::Ok().json(WalletBalanceResponse {
            address: wallet.address().0.clone(),
            confirmed,
            pending_outgoing,
            spendable,
        }),
        Err(err) => wallet_error_response(&err),
    }
}

/// Configures the Wallet service routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallet")
            .route("/create", web::post().to(create_wallet))
            .route("/{address}/transactions", web::post().to(send_transaction))
            .route("/{address}/balance", web::get().to(get_balance)),
    );
}
