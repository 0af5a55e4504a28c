use actix_web::{error, web, HttpResponse};

use super::handlers;
use super::schema::RejectionResponse;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Unparseable bodies are reported like any other malformed request
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(RejectionResponse::new("malformed", &err));
        error::InternalError::from_response(err, response).into()
    });

    cfg.service(
        web::scope("/api/v1")
            .app_data(json_config)
            .route("/tx", web::post().to(handlers::submit_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/receive_block", web::post().to(handlers::receive_block))
            .route("/fullsync", web::post().to(handlers::full_sync))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/index", web::get().to(handlers::get_pending))
            .route("/balance/{address}", web::get().to(handlers::get_balance))
            .route("/transactions/{address}", web::get().to(handlers::get_transactions))
            .route("/faucet", web::post().to(handlers::faucet))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/peers", web::get().to(handlers::get_peers))
    );
}
