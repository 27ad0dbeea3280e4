use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use minicoin::api::clients::{BlockchainClient, TransactionClient};
use minicoin::api::wallet;
use minicoin::api::wallet::Keystore;
use minicoin::config::Config;
use minicoin::core::{Address, DigitalSignature, Transaction};

#[derive(OpenApi)]
#[openapi(
    paths(
        wallet::create_wallet,
        wallet::send_transaction,
        wallet::get_balance
    ),
    components(
        schemas(
            Transaction,
            Address,
            DigitalSignature,
            wallet::CreateWalletResponse,
            wallet::SendRequest,
            wallet::SendResponse,
            wallet::WalletBalanceResponse
        )
    ),
    tags(
        (name = "wallet", description = "Key custody and transaction construction")
    ),
    info(
        title = "Minicoin Wallet Service",
        version = "1.0.0",
        description = "Holds key pairs and builds signed transfers against live chain state"
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let keystore = web::Data::new(Keystore::new());
    let chain = web::Data::new(BlockchainClient::new(&config.blockchain_url));
    let transactions = web::Data::new(TransactionClient::new(&config.transaction_url));
    let port = config.wallet_port;

    info!("Starting Wallet service at http://0.0.0.0:{}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(keystore.clone())
            .app_data(chain.clone())
            .app_data(transactions.clone())
            .configure(wallet::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
