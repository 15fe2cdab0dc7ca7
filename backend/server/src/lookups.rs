use rusqlite::{Connection, params};

use crate::{
    database::{SCRATCHPAD_ID, count_rows},
    error::AppError,
    models::{Category, DEFAULT_TAG_COLOR, Lookup, Scratchpad, Stats, Tag, VISITED_STATUS},
    utils::is_hex_color,
};

pub fn list_lookups(connection: &Connection, category: Category) -> Result<Vec<Lookup>, AppError> {
    let mut statement = connection.prepare(&format!(
        "SELECT id, name FROM {} ORDER BY name ASC",
        category.lookup_table()
    ))?;

    let rows = statement
        .query_map([], |row| {
            Ok(Lookup {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn list_names(connection: &Connection, category: Category) -> Result<Vec<String>, AppError> {
    Ok(list_lookups(connection, category)?
        .into_iter()
        .map(|lookup| lookup.name)
        .collect())
}

pub fn list_tags(connection: &Connection) -> Result<Vec<Tag>, AppError> {
    let mut statement = connection.prepare(
        "SELECT id, name, COALESCE(NULLIF(color, ''), ?1) FROM tags ORDER BY name ASC",
    )?;

    let rows = statement
        .query_map(params![DEFAULT_TAG_COLOR], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Creates the tag or recolors an existing one.
pub fn upsert_tag(
    connection: &Connection,
    name: &str,
    color: Option<&str>,
) -> Result<Tag, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Tag name is required"));
    }

    let color = color.map(str::trim).unwrap_or(DEFAULT_TAG_COLOR);
    if !is_hex_color(color) {
        return Err(AppError::bad_request(format!("Invalid tag color '{color}'")));
    }

    let tag = connection.query_row(
        "INSERT INTO tags (name, color) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET color = excluded.color
         RETURNING id, name, color",
        params![name, color],
        |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            })
        },
    )?;

    Ok(tag)
}

pub fn list_boroughs(connection: &Connection) -> Result<Vec<String>, AppError> {
    let mut statement = connection.prepare(
        "SELECT DISTINCT borough FROM restaurants
         WHERE borough IS NOT NULL AND TRIM(borough) != ''
         ORDER BY borough ASC",
    )?;

    let rows = statement
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(rows)
}

pub fn stats(connection: &Connection) -> Result<Stats, AppError> {
    let (total_restaurants, visited, liked, happy_hours) = connection.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = ?1), 0),
                COALESCE(SUM(liked = 1), 0),
                COALESCE(SUM(has_happy_hour = 1), 0)
         FROM restaurants",
        params![VISITED_STATUS],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    Ok(Stats {
        total_restaurants,
        visited,
        liked,
        happy_hours,
        cuisines: count_rows(connection, Category::Cuisines.lookup_table())?,
        types: count_rows(connection, Category::Types.lookup_table())?,
        neighborhoods: count_rows(connection, Category::Neighborhoods.lookup_table())?,
        tags: count_rows(connection, Category::Tags.lookup_table())?,
    })
}

pub fn get_scratchpad(connection: &Connection) -> Result<Scratchpad, AppError> {
    let note = connection.query_row(
        "SELECT content, updated_at FROM scratchpad WHERE id = ?1",
        params![SCRATCHPAD_ID],
        |row| {
            Ok(Scratchpad {
                content: row.get(0)?,
                updated_at: row.get(1)?,
            })
        },
    )?;

    Ok(note)
}

pub fn save_scratchpad(connection: &Connection, content: &str) -> Result<Scratchpad, AppError> {
    connection.execute(
        "INSERT INTO scratchpad (id, content, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(id) DO UPDATE SET content = excluded.content, updated_at = CURRENT_TIMESTAMP",
        params![SCRATCHPAD_ID, content],
    )?;

    get_scratchpad(connection)
}

pub fn ping(connection: &Connection) -> Result<(), AppError> {
    connection.query_row("SELECT 1", [], |_| Ok(()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        associations::create_restaurant, database::open_in_memory, models::RestaurantPayload,
    };

    fn create(connection: &mut Connection, json: &str) {
        let payload: RestaurantPayload = serde_json::from_str(json).unwrap();
        create_restaurant(connection, &payload).unwrap();
    }

    #[test]
    fn test_lookups_ordered_by_name() {
        let mut connection = open_in_memory().unwrap();
        create(
            &mut connection,
            r#"{"name": "A", "cuisines": ["Thai", "Italian"],
                "neighborhoods": ["SoHo", "Astoria"]}"#,
        );

        let cuisines = list_lookups(&connection, Category::Cuisines).unwrap();
        assert_eq!(
            cuisines.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Italian", "Thai"]
        );
        assert_eq!(
            list_names(&connection, Category::Neighborhoods).unwrap(),
            vec!["Astoria", "SoHo"]
        );
    }

    #[test]
    fn test_boroughs_are_distinct() {
        let mut connection = open_in_memory().unwrap();
        create(&mut connection, r#"{"name": "A", "borough": "Queens"}"#);
        create(&mut connection, r#"{"name": "B", "borough": "Brooklyn"}"#);
        create(&mut connection, r#"{"name": "C", "borough": "Queens"}"#);
        create(&mut connection, r#"{"name": "D", "borough": ""}"#);
        create(&mut connection, r#"{"name": "E"}"#);

        assert_eq!(list_boroughs(&connection).unwrap(), vec!["Brooklyn", "Queens"]);
    }

    #[test]
    fn test_stats() {
        let mut connection = open_in_memory().unwrap();
        create(
            &mut connection,
            r#"{"name": "A", "status": "Visited", "liked": true, "tags": ["patio"]}"#,
        );
        create(&mut connection, r#"{"name": "B", "happy_hour": "4-7pm daily"}"#);

        let stats = stats(&connection).unwrap();
        assert_eq!(
            stats,
            Stats {
                total_restaurants: 2,
                visited: 1,
                liked: 1,
                happy_hours: 1,
                cuisines: 0,
                types: 0,
                neighborhoods: 0,
                tags: 1,
            }
        );
    }

    #[test]
    fn test_stats_on_empty_database() {
        let connection = open_in_memory().unwrap();
        assert_eq!(stats(&connection).unwrap().total_restaurants, 0);
    }

    #[test]
    fn test_upsert_tag() {
        let connection = open_in_memory().unwrap();

        let created = upsert_tag(&connection, " brunch ", None).unwrap();
        assert_eq!(created.name, "brunch");
        assert_eq!(created.color, DEFAULT_TAG_COLOR);

        let recolored = upsert_tag(&connection, "brunch", Some("#FF0000")).unwrap();
        assert_eq!(recolored.id, created.id);
        assert_eq!(list_tags(&connection).unwrap(), vec![recolored]);

        assert!(matches!(
            upsert_tag(&connection, "brunch", Some("red")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            upsert_tag(&connection, "  ", None),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_scratchpad_replaces_note() {
        let connection = open_in_memory().unwrap();
        assert_eq!(get_scratchpad(&connection).unwrap().content, "");

        save_scratchpad(&connection, "try the spritz").unwrap();
        let note = save_scratchpad(&connection, "call for reservations").unwrap();

        assert_eq!(note.content, "call for reservations");
        assert!(note.updated_at.is_some());
        assert_eq!(count_rows(&connection, "scratchpad").unwrap(), 1);
    }
}
