pub mod comments;
pub mod videos;
pub mod wsroute;

use actix_web::web;

/// Every route the service exposes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(wsroute::ws_views)
        .service(wsroute::ws_ratings)
        .service(wsroute::ws_comments)
        .service(videos::get_video)
        .service(comments::create_comment)
        .route("/metrics", web::get().to(crate::metrics::metrics_handler))
        .route("/health", web::get().to(|| async { "OK" }));
}
