use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use minicoin::api::clients::{BlockchainClient, TransactionClient};
use minicoin::api::miner;
use minicoin::config::Config;
use minicoin::core::{Address, Block, DigitalSignature, Miner, MinerStatus, Transaction};

#[derive(OpenApi)]
#[openapi(
    paths(
        miner::mine_once,
        miner::start_mining,
        miner::stop_mining,
        miner::mining_status
    ),
    components(
        schemas(
            Block,
            Transaction,
            Address,
            DigitalSignature,
            MinerStatus,
            miner::MineResponse,
            miner::MinerStatusResponse,
            miner::LoopResponse
        )
    ),
    tags(
        (name = "mine", description = "Proof-of-work block production")
    ),
    info(
        title = "Minicoin Miner Service",
        version = "1.0.0",
        description = "Assembles candidate blocks from the pool and searches for valid nonces"
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let miner = web::Data::new(Miner::new(config.miner_config()));
    let chain = web::Data::new(BlockchainClient::new(&config.blockchain_url));
    let pool = web::Data::new(TransactionClient::new(&config.transaction_url));
    let port = config.miner_port;

    info!(
        "Starting Miner service at http://0.0.0.0:{} (rewards to {})",
        port, config.miner_address
    );

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
            .app_data(miner.clone())
            .app_data(chain.clone())
            .app_data(pool.clone())
            .configure(miner::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
