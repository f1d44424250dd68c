use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;

use hotel_membership::{build_membership_service, config::Config, configure_routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().expect("Failed to load configuration");

    let membership_service = build_membership_service(&config)
        .await
        .expect("Failed to initialize membership service");

    log::info!(
        "Resolving membership with {:?} selection policy",
        membership_service.policy()
    );

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting membership server on {}", bind_address);

    let membership_service = web::Data::new(membership_service);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
            )
            .app_data(membership_service.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
