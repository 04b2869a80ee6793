use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use signed_ledger::api::{self, ApiDoc};
use signed_ledger::{Blockchain, ChainConfig};

mod cli;

use cli::Cli;

// Open the ledger from disk when a data directory is given, in memory otherwise
fn initialize_blockchain(cli: &Cli, config: ChainConfig) -> anyhow::Result<Blockchain> {
    let Some(data_dir) = &cli.data_dir else {
        info!("No data directory given, keeping the chain in memory");
        return Ok(Blockchain::new(config)?);
    };

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match Blockchain::with_storage(data_dir, config.clone()) {
        Ok(blockchain) => {
            info!("Loaded blockchain from storage at {}", data_dir.display());
            Ok(blockchain)
        }
        Err(err) => {
            warn!("Failed to load blockchain from storage: {}", err);
            warn!("Creating in-memory blockchain instead");
            Ok(Blockchain::new(config)?)
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = cli.chain_config();
    info!(
        "Difficulty {} bits, reward {}, empty blocks {}",
        config.difficulty,
        config.mining_reward,
        if config.allow_empty_blocks { "allowed" } else { "refused" }
    );

    let blockchain = web::Data::new(initialize_blockchain(&cli, config)?);

    match blockchain.validate() {
        Ok(()) => info!("Chain of {} blocks is valid", blockchain.len()),
        Err(tampered) => warn!("Starting with an invalid chain: {}", tampered),
    }

    // Stop any in-flight proof of work once shutdown is requested
    let shutdown_chain = blockchain.get_ref().clone();
    actix_web::rt::spawn(async move {
        if actix_web::rt::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, cancelling mining");
            shutdown_chain.cancel_mining();
        }
    });

    info!("Starting HTTP server at http://{}:{}", cli.host, cli.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((cli.host.as_str(), cli.port))?
    .run()
    .await?;

    Ok(())
}
