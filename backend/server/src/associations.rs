//! # Restaurant Writes
//!
//! Create, update and delete each run inside one transaction. Any failure drops the
//! transaction before commit, so no partial association state is ever visible.
//!
//! ## Association rewrite
//! For every category a request carries, the restaurant's links are deleted and the supplied
//! names are linked again. Names are trimmed, blanks are skipped, missing lookup rows are
//! created and existing ones reused. An empty list clears the category. A category missing from
//! an update is left alone.
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter, types::Value};
use tracing::info;

use crate::{
    database::{ensure_lookup, link},
    error::AppError,
    models::{Category, DEFAULT_STATUS, HappyHourSchedule, RestaurantPayload},
};

type Assignment = (&'static str, Value);

fn text(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::Text)
}

fn coordinate(
    column: &'static str,
    value: Option<f64>,
    bound: f64,
) -> Result<Value, AppError> {
    match value {
        None => Ok(Value::Null),
        Some(v) if v.is_finite() && v.abs() <= bound => Ok(Value::Real(v)),
        Some(v) => Err(AppError::bad_request(format!("Invalid {column} {v}"))),
    }
}

fn schedules(value: &Option<Vec<HappyHourSchedule>>) -> Result<Value, AppError> {
    match value {
        None => Ok(Value::Null),
        Some(list) => {
            for schedule in list {
                schedule.validate()?;
            }
            Ok(Value::Text(serde_json::to_string(list)?))
        }
    }
}

/// Columns the payload explicitly sets, in a stable order.
fn scalar_assignments(payload: &RestaurantPayload) -> Result<Vec<Assignment>, AppError> {
    let mut assignments = Vec::new();

    if let Some(name) = &payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("Name is required"));
        }
        assignments.push(("name", Value::Text(name.to_string())));
    }

    let text_columns = [
        ("neighborhood", &payload.neighborhood),
        ("borough", &payload.borough),
        ("happy_hour", &payload.happy_hour),
        ("happy_hour_start_time", &payload.happy_hour_start_time),
        ("happy_hour_end_time", &payload.happy_hour_end_time),
        ("notes", &payload.notes),
        ("what_to_order", &payload.what_to_order),
        ("website_link", &payload.website_link),
    ];
    for (column, value) in text_columns {
        if let Some(value) = value {
            assignments.push((column, text(value)));
        }
    }

    if let Some(status) = &payload.status {
        assignments.push(("status", Value::Text(status.clone())));
    }
    if let Some(liked) = payload.liked {
        assignments.push(("liked", Value::Integer(liked.into())));
    }
    if let Some(data) = &payload.happy_hour_data {
        assignments.push(("happy_hour_data", schedules(data)?));
    }
    if let Some(has_happy_hour) = payload.has_happy_hour {
        assignments.push(("has_happy_hour", Value::Integer(has_happy_hour.into())));
    }
    if let Some(latitude) = payload.latitude {
        assignments.push(("latitude", coordinate("latitude", latitude, 90.0)?));
    }
    if let Some(longitude) = payload.longitude {
        assignments.push(("longitude", coordinate("longitude", longitude, 180.0)?));
    }

    Ok(assignments)
}

fn derive_has_happy_hour(payload: &RestaurantPayload) -> bool {
    let has_schedule = payload
        .happy_hour_data
        .as_ref()
        .and_then(Option::as_ref)
        .is_some_and(|list| !list.is_empty());
    let has_text = payload
        .happy_hour
        .as_ref()
        .and_then(Option::as_deref)
        .is_some_and(|text| !text.trim().is_empty());

    has_schedule || has_text
}

fn has_column(assignments: &[Assignment], column: &str) -> bool {
    assignments.iter().any(|(name, _)| *name == column)
}

/// Makes the restaurant's links for `category` exactly match `names`.
pub fn rewrite_associations(
    tx: &Transaction<'_>,
    restaurant_id: i64,
    category: Category,
    names: &[String],
) -> Result<(), AppError> {
    tx.prepare_cached(&format!(
        "DELETE FROM {} WHERE restaurant_id = ?1",
        category.join_table()
    ))?
    .execute(params![restaurant_id])?;

    for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        let lookup_id = ensure_lookup(tx, category, name)?;
        link(tx, category, restaurant_id, lookup_id)?;
    }

    Ok(())
}

fn restaurant_exists(tx: &Transaction<'_>, id: i64) -> Result<bool, AppError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM restaurants WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn create_restaurant(
    connection: &mut Connection,
    payload: &RestaurantPayload,
) -> Result<i64, AppError> {
    if payload.name.is_none() {
        return Err(AppError::bad_request("Name is required"));
    }

    let mut assignments = scalar_assignments(payload)?;
    if !has_column(&assignments, "status") {
        assignments.push(("status", Value::Text(DEFAULT_STATUS.to_string())));
    }
    if !has_column(&assignments, "liked") {
        assignments.push(("liked", Value::Integer(0)));
    }
    if !has_column(&assignments, "has_happy_hour") {
        assignments.push((
            "has_happy_hour",
            Value::Integer(derive_has_happy_hour(payload).into()),
        ));
    }

    let columns: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO restaurants ({}) VALUES ({placeholders})",
        columns.join(", ")
    );

    let tx = connection.transaction()?;
    tx.execute(
        &sql,
        params_from_iter(assignments.into_iter().map(|(_, value)| value)),
    )?;
    let id = tx.last_insert_rowid();

    for category in Category::ALL {
        let names = payload.associations(category).unwrap_or_default();
        rewrite_associations(&tx, id, category, names)?;
    }

    tx.commit()?;
    info!("Created restaurant {id}");

    Ok(id)
}

pub fn update_restaurant(
    connection: &mut Connection,
    id: i64,
    payload: &RestaurantPayload,
) -> Result<(), AppError> {
    let assignments = scalar_assignments(payload)?;
    if assignments.is_empty() && !payload.has_associations() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let tx = connection.transaction()?;
    if !restaurant_exists(&tx, id)? {
        tx.rollback()?;
        return Err(AppError::not_found(format!("Restaurant {id} not found")));
    }

    let mut sets: Vec<String> = assignments
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect();
    sets.push("updated_at = CURRENT_TIMESTAMP".to_string());

    let mut values: Vec<Value> = assignments.into_iter().map(|(_, value)| value).collect();
    values.push(Value::Integer(id));

    tx.execute(
        &format!("UPDATE restaurants SET {} WHERE id = ?", sets.join(", ")),
        params_from_iter(values),
    )?;

    for category in Category::ALL {
        if let Some(names) = payload.associations(category) {
            rewrite_associations(&tx, id, category, names)?;
        }
    }

    tx.commit()?;
    info!("Updated restaurant {id}");

    Ok(())
}

pub fn delete_restaurant(connection: &mut Connection, id: i64) -> Result<(), AppError> {
    let tx = connection.transaction()?;

    for category in Category::ALL {
        tx.execute(
            &format!("DELETE FROM {} WHERE restaurant_id = ?1", category.join_table()),
            params![id],
        )?;
    }

    let deleted = tx.execute("DELETE FROM restaurants WHERE id = ?1", params![id])?;
    if deleted == 0 {
        tx.rollback()?;
        return Err(AppError::not_found(format!("Restaurant {id} not found")));
    }

    tx.commit()?;
    info!("Deleted restaurant {id}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{count_rows, open_in_memory},
        models::Weekday,
        query::get_restaurant,
    };

    fn payload(json: &str) -> RestaurantPayload {
        serde_json::from_str(json).unwrap()
    }

    fn links(connection: &Connection, category: Category) -> i64 {
        count_rows(connection, category.join_table()).unwrap()
    }

    #[test]
    fn test_create_with_defaults() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "  Joe's  ", "cuisines": ["Diner"]}"#),
        )
        .unwrap();

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert_eq!(restaurant.name, "Joe's");
        assert_eq!(restaurant.cuisines, vec!["Diner"]);
        assert_eq!(restaurant.status, "Unvisited");
        assert!(!restaurant.liked);
        assert!(!restaurant.has_happy_hour);
        assert!(restaurant.created_at.is_some());
    }

    #[test]
    fn test_blank_name_persists_nothing() {
        let mut connection = open_in_memory().unwrap();

        for body in [r#"{"name": "   "}"#, r#"{"cuisines": ["Thai"]}"#] {
            let result = create_restaurant(&mut connection, &payload(body));
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }

        assert_eq!(count_rows(&connection, "restaurants").unwrap(), 0);
        assert_eq!(count_rows(&connection, "cuisines").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_names_link_once() {
        let mut connection = open_in_memory().unwrap();
        create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Carbone", "cuisines": ["Italian", "Italian", " Italian ", ""]}"#),
        )
        .unwrap();

        assert_eq!(count_rows(&connection, "cuisines").unwrap(), 1);
        assert_eq!(links(&connection, Category::Cuisines), 1);
    }

    #[test]
    fn test_create_derives_happy_hour_flag() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(
                r#"{"name": "Dante", "happy_hour_data": [
                    {"days": ["Mon", "Tuesday"], "start_time": "16:00", "end_time": "18:00",
                     "offer": "$10 negronis"}
                ]}"#,
            ),
        )
        .unwrap();

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert!(restaurant.has_happy_hour);

        let schedules = restaurant.happy_hour_data.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(
            schedules[0].days.iter().copied().collect::<Vec<_>>(),
            vec![Weekday::Mon, Weekday::Tue]
        );
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut connection = open_in_memory().unwrap();
        let result = create_restaurant(
            &mut connection,
            &payload(
                r#"{"name": "Dante", "happy_hour_data": [
                    {"days": ["Mon"], "start_time": "4pm", "end_time": "18:00"}
                ]}"#,
            ),
        );

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(count_rows(&connection, "restaurants").unwrap(), 0);
    }

    #[test]
    fn test_clearing_tags_leaves_other_categories() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Sunday", "cuisines": ["American"], "tags": ["brunch"]}"#),
        )
        .unwrap();

        update_restaurant(&mut connection, id, &payload(r#"{"tags": []}"#)).unwrap();

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert!(restaurant.tags.is_empty());
        assert_eq!(restaurant.cuisines, vec!["American"]);
        assert_eq!(count_rows(&connection, "tags").unwrap(), 1);
    }

    #[test]
    fn test_update_bumps_updated_at() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Sunday", "tags": ["brunch"]}"#),
        )
        .unwrap();
        connection
            .execute(
                "UPDATE restaurants SET updated_at = '2000-01-01 00:00:00' WHERE id = ?1",
                params![id],
            )
            .unwrap();

        update_restaurant(&mut connection, id, &payload(r#"{"tags": []}"#)).unwrap();

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert!(restaurant.updated_at.is_some());
        assert_ne!(restaurant.updated_at.as_deref(), Some("2000-01-01 00:00:00"));
    }

    #[test]
    fn test_partial_update() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(
                r#"{"name": "Lilia", "notes": "pasta", "borough": "Brooklyn", "latitude": 40.7}"#,
            ),
        )
        .unwrap();

        update_restaurant(
            &mut connection,
            id,
            &payload(r#"{"notes": "", "liked": true, "status": "Visited", "latitude": null}"#),
        )
        .unwrap();

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert_eq!(restaurant.name, "Lilia");
        assert_eq!(restaurant.notes.as_deref(), Some(""));
        assert_eq!(restaurant.borough.as_deref(), Some("Brooklyn"));
        assert_eq!(restaurant.latitude, None);
        assert_eq!(restaurant.status, "Visited");
        assert!(restaurant.liked);
    }

    #[test]
    fn test_update_rejections() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(&mut connection, &payload(r#"{"name": "Lilia"}"#)).unwrap();

        assert!(matches!(
            update_restaurant(&mut connection, id, &payload("{}")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            update_restaurant(&mut connection, id, &payload(r#"{"name": " "}"#)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            update_restaurant(&mut connection, id, &payload(r#"{"longitude": 500.0}"#)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            update_restaurant(&mut connection, id + 1, &payload(r#"{"tags": ["x"]}"#)),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(count_rows(&connection, "tags").unwrap(), 0);
    }

    #[test]
    fn test_delete_removes_links() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(
                r#"{"name": "Carbone", "cuisines": ["Italian"], "types": ["Restaurant"],
                    "neighborhoods": ["Greenwich Village"], "tags": ["pricey"]}"#,
            ),
        )
        .unwrap();

        delete_restaurant(&mut connection, id).unwrap();

        assert_eq!(count_rows(&connection, "restaurants").unwrap(), 0);
        for category in Category::ALL {
            assert_eq!(links(&connection, category), 0);
        }
        assert_eq!(count_rows(&connection, "cuisines").unwrap(), 1);
    }

    #[test]
    fn test_delete_unknown_leaves_tables() {
        let mut connection = open_in_memory().unwrap();
        let id = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Carbone", "cuisines": ["Italian"]}"#),
        )
        .unwrap();

        let result = delete_restaurant(&mut connection, id + 10);

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(count_rows(&connection, "restaurants").unwrap(), 1);
        assert_eq!(links(&connection, Category::Cuisines), 1);
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let mut connection = open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TRIGGER reject_tag BEFORE INSERT ON tags WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'tag rejected'); END;",
            )
            .unwrap();

        let result = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Doomed", "cuisines": ["Italian"], "tags": ["boom"]}"#),
        );
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(count_rows(&connection, "restaurants").unwrap(), 0);
        assert_eq!(count_rows(&connection, "cuisines").unwrap(), 0);

        let id = create_restaurant(
            &mut connection,
            &payload(r#"{"name": "Survivor", "tags": ["patio"]}"#),
        )
        .unwrap();
        let result = update_restaurant(
            &mut connection,
            id,
            &payload(r#"{"name": "Renamed", "tags": ["boom"]}"#),
        );
        assert!(result.is_err());

        let restaurant = get_restaurant(&connection, id).unwrap();
        assert_eq!(restaurant.name, "Survivor");
        assert_eq!(restaurant.tags.len(), 1);
        assert_eq!(restaurant.tags[0].name, "patio");
    }
}
