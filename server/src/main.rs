use crate::api::{ErrorResponse, HealthResponse, PushRequest, PushResponse};
use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, web};
use common::{DeliveryResult, MessageRequest, PlatformRegistry, PushError};
use dingding_group_bot::DingdingPlatformFactory;
use log::*;

mod api;

const DEFAULT_ADDR: &str = "127.0.0.1:8888";

#[get("/health")]
async fn health(registry: web::Data<PlatformRegistry>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        platforms: registry.list_platforms(),
    })
}

#[post("/push")]
async fn push(req: web::Json<PushRequest>, registry: web::Data<PlatformRegistry>) -> HttpResponse {
    let req = req.into_inner();
    info!(
        "Received push request for platform: {}, type: {}",
        req.platform, req.message.message_type
    );

    match dispatch(req, &registry).await {
        Ok(result) => HttpResponse::Ok().json(PushResponse { result }),
        Err(err) => {
            warn!("Rejected push request: {}", err);
            HttpResponse::BadRequest().json(ErrorResponse::from(&err))
        }
    }
}

async fn dispatch(
    req: PushRequest,
    registry: &PlatformRegistry,
) -> Result<DeliveryResult, PushError> {
    let platform = registry.create(&req.platform, req.config)?;
    let message = MessageRequest::from_json(req.message)?;
    platform.send(message).await
}

fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(push);
}

fn build_registry() -> PlatformRegistry {
    let mut registry = PlatformRegistry::new();
    registry.register(Box::new(DingdingPlatformFactory));
    registry
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));

    let registry = build_registry();
    info!("Registered platforms: {:?}", registry.list_platforms());

    let addr = std::env::var("PUSH_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    info!("Listening on {}", addr);

    let registry_data = web::Data::new(registry);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(registry_data.clone())
            .configure(app_config)
    })
    .bind(addr)?
    .run()
    .await
}
