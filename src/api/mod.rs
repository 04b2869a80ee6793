// API module
//
// Thin HTTP layer over the ledger core. Handlers decode arguments and map
// errors to status codes; all ledger rules live in `crate::blockchain`.

pub mod handlers;
pub mod routes;

use utoipa::OpenApi;

// Re-export main components for easier access
pub use routes::configure_routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::generate_keys,
        handlers::sign,
        handlers::get_chain,
        handlers::get_block,
        handlers::get_pending_transactions,
        handlers::new_transaction,
        handlers::mine_block,
        handlers::validate_chain
    ),
    components(
        schemas(
            crate::blockchain::Block,
            crate::blockchain::Transaction,
            crate::blockchain::Address,
            crate::blockchain::DigitalSignature,
            crate::blockchain::KeyPair,
            crate::blockchain::ValidationReport,
            handlers::ChainResponse,
            handlers::SignRequest,
            handlers::SignResponse,
            handlers::TransactionRequest,
            handlers::TransactionResponse,
            handlers::MineRequest,
            handlers::MineResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Ledger API",
        version = "1.0.0",
        description = "Signed proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
