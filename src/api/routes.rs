use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/keys/new", web::get().to(handlers::generate_keys))
            .route("/sign", web::post().to(handlers::sign))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/chain/{index}", web::get().to(handlers::get_block))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/validate", web::get().to(handlers::validate_chain)),
    );
}
