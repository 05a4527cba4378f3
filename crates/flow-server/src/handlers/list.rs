use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "mode": state.mode,
        "flows": state.registry.descriptors(),
    }))
}
