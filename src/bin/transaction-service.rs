use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::time::Duration;

use minicoin::api::clients::BlockchainClient;
use minicoin::api::transaction;
use minicoin::config::Config;
use minicoin::core::{Address, DigitalSignature, Transaction, TransactionPool};

/// How often the background sweeper drops expired transactions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(OpenApi)]
#[openapi(
    paths(
        transaction::submit_transaction,
        transaction::get_pending,
        transaction::evict_mined,
        transaction::evict_expired
    ),
    components(
        schemas(
            Transaction,
            Address,
            DigitalSignature,
            transaction::SubmitResponse,
            transaction::PendingResponse,
            transaction::EvictResponse
        )
    ),
    tags(
        (name = "transaction", description = "Pending transaction pool")
    ),
    info(
        title = "Minicoin Transaction Service",
        version = "1.0.0",
        description = "Validates and holds transactions until a miner settles them"
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let pool = web::Data::new(TransactionPool::new());
    let chain = web::Data::new(BlockchainClient::new(&config.blockchain_url));
    let port = config.transaction_port;

    // Periodic expiry so abandoned transactions do not pin balances forever.
    let sweeper_pool = pool.clone();
    let max_age = config.pool_max_age();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sweeper_pool.evict_expired(max_age);
            if evicted > 0 {
                info!("Expired {} stale transaction(s)", evicted);
            }
        }
    });

    let config = web::Data::new(config);

    info!("Starting Transaction service at http://0.0.0.0:{}", port);

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
            .app_data(pool.clone())
            .app_data(chain.clone())
            .app_data(config.clone())
            .configure(transaction::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
