use std::sync::Arc;

use axum::{
    Json,
    extract::{
        self, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::{
    associations::{create_restaurant, delete_restaurant, update_restaurant},
    error::AppError,
    lookups::{
        get_scratchpad, list_boroughs, list_lookups, list_names, list_tags, ping, save_scratchpad,
        stats, upsert_tag,
    },
    models::{
        Category, Lookup, Restaurant, RestaurantPayload, Scratchpad, ScratchpadPayload, Stats, Tag,
        TagPayload,
    },
    query::{ListParams, RestaurantFilter, get_restaurant, list_restaurants},
    state::State,
};

type Shared = extract::State<Arc<State>>;

pub async fn list_restaurants_handler(
    extract::State(state): Shared,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Restaurant>>, AppError> {
    let Query(params) = query?;
    let filter = RestaurantFilter::try_from(params)?;

    let restaurants = state
        .run(move |connection| list_restaurants(connection, &filter))
        .await?;
    Ok(Json(restaurants))
}

pub async fn get_restaurant_handler(
    extract::State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Restaurant>, AppError> {
    let Path(id) = id?;

    let restaurant = state
        .run(move |connection| get_restaurant(connection, id))
        .await?;
    Ok(Json(restaurant))
}

pub async fn create_restaurant_handler(
    extract::State(state): Shared,
    payload: Result<Json<RestaurantPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;

    let id = state
        .run(move |connection| create_restaurant(connection, &payload))
        .await?;

    Ok(Json(json!({
        "id": id,
        "message": "Restaurant created successfully",
    })))
}

pub async fn update_restaurant_handler(
    extract::State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RestaurantPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    state
        .run(move |connection| update_restaurant(connection, id, &payload))
        .await?;

    Ok(Json(json!({ "message": "Restaurant updated successfully" })))
}

pub async fn delete_restaurant_handler(
    extract::State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(id) = id?;

    state
        .run(move |connection| delete_restaurant(connection, id))
        .await?;

    Ok(Json(json!({ "message": "Restaurant deleted successfully" })))
}

pub async fn cuisines_handler(
    extract::State(state): Shared,
) -> Result<Json<Vec<Lookup>>, AppError> {
    let cuisines = state
        .run(|connection| list_lookups(connection, Category::Cuisines))
        .await?;
    Ok(Json(cuisines))
}

pub async fn types_handler(extract::State(state): Shared) -> Result<Json<Vec<Lookup>>, AppError> {
    let types = state
        .run(|connection| list_lookups(connection, Category::Types))
        .await?;
    Ok(Json(types))
}

pub async fn neighborhoods_handler(
    extract::State(state): Shared,
) -> Result<Json<Vec<String>>, AppError> {
    let neighborhoods = state
        .run(|connection| list_names(connection, Category::Neighborhoods))
        .await?;
    Ok(Json(neighborhoods))
}

pub async fn tags_handler(extract::State(state): Shared) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(state.run(|connection| list_tags(connection)).await?))
}

pub async fn upsert_tag_handler(
    extract::State(state): Shared,
    payload: Result<Json<TagPayload>, JsonRejection>,
) -> Result<Json<Tag>, AppError> {
    let Json(payload) = payload?;

    let tag = state
        .run(move |connection| {
            upsert_tag(connection, &payload.name, payload.color.as_deref())
        })
        .await?;
    Ok(Json(tag))
}

pub async fn boroughs_handler(
    extract::State(state): Shared,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.run(|connection| list_boroughs(connection)).await?))
}

pub async fn stats_handler(extract::State(state): Shared) -> Result<Json<Stats>, AppError> {
    Ok(Json(state.run(|connection| stats(connection)).await?))
}

pub async fn health_handler(extract::State(state): Shared) -> Result<Json<Value>, AppError> {
    state.run(|connection| ping(connection)).await?;

    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

pub async fn get_scratchpad_handler(
    extract::State(state): Shared,
) -> Result<Json<Scratchpad>, AppError> {
    Ok(Json(state.run(|connection| get_scratchpad(connection)).await?))
}

pub async fn save_scratchpad_handler(
    extract::State(state): Shared,
    payload: Result<Json<ScratchpadPayload>, JsonRejection>,
) -> Result<Json<Scratchpad>, AppError> {
    let Json(payload) = payload?;
    let content = payload.content.unwrap_or_default();

    let scratchpad = state
        .run(move |connection| save_scratchpad(connection, &content))
        .await?;
    Ok(Json(scratchpad))
}

pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
