use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use minicoin::api::chain;
use minicoin::config::Config;
use minicoin::core::{Address, Block, DigitalSignature, Ledger, Transaction};

// Open the ledger from the sled log; a storage failure falls back to an
// in-memory chain so the service still comes up.
fn initialize_ledger(config: &Config) -> Ledger {
    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match Ledger::with_storage(config.ledger_params(), &config.data_dir) {
        Ok(ledger) => {
            info!(
                "Loaded ledger from {} at height {}",
                config.data_dir,
                ledger.height()
            );
            ledger
        }
        Err(err) => {
            warn!("Failed to open ledger storage: {}", err);
            warn!("Running with an in-memory chain instead");
            Ledger::new(config.ledger_params())
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        chain::get_chain,
        chain::append_block,
        chain::get_block,
        chain::get_balance,
        chain::get_account,
        chain::get_head,
        chain::validate_chain
    ),
    components(
        schemas(
            Block,
            Transaction,
            Address,
            DigitalSignature,
            chain::ChainResponse,
            chain::AppendResponse,
            chain::BalanceResponse,
            chain::AccountResponse,
            chain::ValidateResponse
        )
    ),
    tags(
        (name = "blockchain", description = "Ledger: block storage, validation and account state")
    ),
    info(
        title = "Minicoin Blockchain Service",
        version = "1.0.0",
        description = "Authoritative chain of blocks and settled account balances"
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let ledger = web::Data::new(initialize_ledger(&config));
    let port = config.blockchain_port;

    info!("Starting Blockchain service at http://0.0.0.0:{}", port);

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
            .app_data(ledger.clone())
            .configure(chain::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
