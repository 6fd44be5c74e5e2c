use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde_json::Value;
use tracing::{info, warn};

use pizzeria_core::{
    serialize::{to_payload, to_payload_list},
    Include, NewRestaurantPizza,
};

use crate::error::ApiError;
use crate::router::AppState;

/// Records the outcome of a catalog request.
fn observe<T>(route: &'static str, result: &Result<T, ApiError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => err.metric_label(),
    };
    counter!("api_requests_total", "route" => route, "result" => label).increment(1);
}

/// Non-integer ids can never match a row, so they are reported like missing ones.
fn restaurant_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::RestaurantNotFound)
}

pub async fn list_restaurants(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result: Result<Json<Value>, ApiError> = async {
        let restaurants = state.storage().restaurants().list().await?;
        Ok(Json(Value::Array(to_payload_list(&restaurants, Include::Columns))))
    }
    .await;
    observe("restaurants.list", &result);
    result
}

pub async fn show_restaurant(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let result: Result<Json<Value>, ApiError> = async {
        let id = restaurant_id(path)?;
        let restaurant = state.storage().restaurants().fetch_with_pizzas(id).await?;
        Ok(Json(Value::Object(to_payload(&restaurant, Include::Relationships))))
    }
    .await;
    observe("restaurants.show", &result);
    result
}

pub async fn delete_restaurant(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let result: Result<StatusCode, ApiError> = async {
        let id = restaurant_id(path)?;
        state.storage().restaurants().delete(id).await?;
        info!(stage = "api", restaurant_id = id, "restaurant deleted");
        Ok(StatusCode::NO_CONTENT)
    }
    .await;
    observe("restaurants.delete", &result);
    result
}

pub async fn list_pizzas(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result: Result<Json<Value>, ApiError> = async {
        let pizzas = state.storage().pizzas().list().await?;
        Ok(Json(Value::Array(to_payload_list(&pizzas, Include::Columns))))
    }
    .await;
    observe("pizzas.list", &result);
    result
}

/// Creates a restaurant pizza from `{"price", "pizza_id", "restaurant_id"}`.
///
/// The body is read as raw bytes so malformed JSON falls into the same
/// generic 400 as every other validation failure.
pub async fn create_restaurant_pizza(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let result: Result<(StatusCode, Json<Value>), ApiError> = async {
        let json: Value = serde_json::from_slice(&body).map_err(ApiError::invalid_json)?;
        let record = NewRestaurantPizza::from_json(&json)?;
        let created = state.storage().restaurant_pizzas().insert(&record).await?;
        info!(
            stage = "api",
            restaurant_pizza_id = created.id,
            restaurant_id = created.restaurant_id,
            pizza_id = created.pizza_id,
            price = created.price,
            "restaurant pizza created"
        );
        Ok((
            StatusCode::CREATED,
            Json(Value::Object(to_payload(&created, Include::Relationships))),
        ))
    }
    .await;

    if let Err(ApiError::Validation { reason, detail }) = &result {
        warn!(stage = "api", reason, %detail, "restaurant pizza rejected");
        counter!("restaurant_pizza_rejections_total", "reason" => *reason).increment(1);
    }
    observe("restaurant_pizzas.create", &result);
    result
}
