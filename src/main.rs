use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use opennet::api;
use opennet::blockchain::{self, storage};
use opennet::network::{self, HttpPeerClient};
use opennet::{Node, NodeConfig};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::submit_transaction,
        api::handlers::mine_block,
        api::handlers::receive_block,
        api::handlers::full_sync,
        api::handlers::get_chain,
        api::handlers::get_pending,
        api::handlers::get_balance,
        api::handlers::get_transactions,
        api::handlers::faucet,
        api::handlers::validate_chain,
        api::handlers::get_peers
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionKind,
            blockchain::crypto::Address,
            blockchain::chain::TransactionRecord,
            network::PeerStatus,
            network::PeerOutcome,
            network::sync::PeerReport,
            api::schema::TransactionRequest,
            api::schema::FaucetRequestBody,
            api::schema::TransactionResponse,
            api::schema::MineResponse,
            api::schema::ReceiveResponse,
            api::schema::SyncResponse,
            api::schema::PendingResponse,
            api::schema::BalanceResponse,
            api::schema::RejectionResponse
        )
    ),
    tags(
        (name = "opennet", description = "Ledger node API")
    ),
    info(
        title = "OpenNet Node API",
        version = "0.1.0",
        description = "Signed transfers, block production and peer sync for an OpenNet ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

fn seconds(value: Option<u64>) -> Option<Duration> {
    value.filter(|secs| *secs > 0).map(Duration::from_secs)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::load().context("failed to load configuration")?;
    info!(
        "Starting node {} ({}) with {} peers",
        config.node.id,
        config.node.role,
        config.network.peers.len()
    );

    if config.ledger.treasury_public_key.is_none() {
        warn!("No treasury public key configured; faucet requests will be rejected");
    }

    let storage_path = config.storage_path();
    let storage = storage::open_storage(config.storage.backend, &storage_path)
        .with_context(|| format!("failed to open storage at {}", storage_path.display()))?;
    let ledger = blockchain::Blockchain::open(config.ledger_params(), storage)
        .context("failed to load ledger")?;

    let client = HttpPeerClient::new(Duration::from_secs(config.network.peer_timeout_secs))
        .context("failed to build peer client")?;

    let node = Node::new(
        ledger,
        Arc::new(client),
        config.network.peers.clone(),
        config.node.role.clone(),
        config.network.verify_adopted_chains,
    );
    node.spawn_timers(
        seconds(config.mining.interval_secs),
        seconds(config.network.sync_interval_secs),
    );

    let node = web::Data::new(node);
    let bind = (config.node.host.clone(), config.node.port);

    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
    })
    .bind(bind)
    .context("failed to bind HTTP listener")?
    .run()
    .await?;

    Ok(())
}
