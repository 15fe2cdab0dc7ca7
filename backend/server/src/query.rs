//! # Restaurant Listing
//!
//! Every listing joins all four lookup relations and groups back to one row per restaurant.
//!
//! ## Filters
//! - Equality filters (`borough`, `status`, `liked`) restrict base rows in `WHERE`
//! - Category filters test the grouped membership in `HAVING`: any requested value within a
//!   category, every requested category across categories
//! - Search is a case-insensitive substring match over the text columns and every linked
//!   lookup name. It is ORed with the category filters, so a text hit is listed even when the
//!   category filters reject it
//!
//! Filters are collected as a [`Predicate`] tree first and rendered once, which keeps the SQL
//! text and the bound parameters in the same order.
use rusqlite::{
    Connection, Row, params_from_iter,
    types::{Type, Value},
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::AppError,
    models::{Category, DEFAULT_STATUS, DEFAULT_TAG_COLOR, HappyHourSchedule, Restaurant},
    utils::{TAG_COLOR_SEPARATOR, decode_aggregate, decode_tags, escape_like, split_param},
};

/// Large enough that an unbounded listing returns everything.
pub const DEFAULT_LIMIT: i64 = 10_000;

const STATUS_COLUMN: &str = "COALESCE(r.status, 'Unvisited')";

const SEARCH_COLUMNS: [&str; 4] = ["r.name", "r.notes", "r.what_to_order", "r.borough"];

#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantFilter {
    pub id: Option<i64>,
    pub search: Option<String>,
    pub cuisines: Vec<String>,
    pub types: Vec<String>,
    pub neighborhoods: Vec<String>,
    pub tags: Vec<String>,
    pub borough: Option<String>,
    pub status: Option<String>,
    pub liked: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RestaurantFilter {
    fn default() -> Self {
        Self {
            id: None,
            search: None,
            cuisines: Vec::new(),
            types: Vec::new(),
            neighborhoods: Vec::new(),
            tags: Vec::new(),
            borough: None,
            status: None,
            liked: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl RestaurantFilter {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            limit: 1,
            ..Self::default()
        }
    }

    pub fn memberships(&self, category: Category) -> &[String] {
        match category {
            Category::Cuisines => &self.cuisines,
            Category::Types => &self.types,
            Category::Neighborhoods => &self.neighborhoods,
            Category::Tags => &self.tags,
        }
    }
}

/// Query string of `GET /api/restaurants`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub cuisines: Option<String>,
    pub types: Option<String>,
    pub neighborhoods: Option<String>,
    pub tags: Option<String>,
    #[serde(alias = "borough")]
    pub boroughs: Option<String>,
    pub status: Option<String>,
    pub liked: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bound(key: &str, value: Option<String>, default: i64) -> Result<i64, AppError> {
    match non_blank(value) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| AppError::bad_request(format!("Invalid {key} '{raw}'"))),
    }
}

impl TryFrom<ListParams> for RestaurantFilter {
    type Error = AppError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let liked = match non_blank(params.liked).as_deref() {
            None => None,
            Some("true" | "1") => Some(true),
            Some("false" | "0") => Some(false),
            Some(other) => {
                return Err(AppError::bad_request(format!("Invalid liked '{other}'")));
            }
        };

        Ok(Self {
            id: None,
            search: non_blank(params.search),
            cuisines: split_param(params.cuisines.as_deref()),
            types: split_param(params.types.as_deref()),
            neighborhoods: split_param(params.neighborhoods.as_deref()),
            tags: split_param(params.tags.as_deref()),
            borough: non_blank(params.boroughs),
            status: non_blank(params.status),
            liked,
            limit: parse_bound("limit", params.limit, DEFAULT_LIMIT)?,
            offset: parse_bound("offset", params.offset, 0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchTarget {
    Column(&'static str),
    Lookup(Category),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Equals { column: &'static str, value: Value },
    MemberOf { category: Category, names: Vec<String> },
    Contains { target: SearchTarget, term: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Clause(Clause),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction of `parts`, `None` when there is nothing to test.
    pub fn all(mut parts: Vec<Predicate>) -> Option<Predicate> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Predicate::All(parts)),
        }
    }

    /// Disjunction of `parts`, `None` when there is nothing to test.
    pub fn any(mut parts: Vec<Predicate>) -> Option<Predicate> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Predicate::Any(parts)),
        }
    }

    pub fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Predicate::Clause(clause) => clause.render(sql, params),
            Predicate::All(parts) => render_group(parts, " AND ", sql, params),
            Predicate::Any(parts) => render_group(parts, " OR ", sql, params),
        }
    }
}

fn render_group(parts: &[Predicate], joiner: &str, sql: &mut String, params: &mut Vec<Value>) {
    sql.push('(');
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            sql.push_str(joiner);
        }
        part.render(sql, params);
    }
    sql.push(')');
}

impl Clause {
    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Clause::Equals { column, value } => {
                sql.push_str(column);
                sql.push_str(" = ?");
                params.push(value.clone());
            }
            Clause::MemberOf { category, names } => {
                let placeholders = vec!["?"; names.len()].join(", ");
                sql.push_str(&format!(
                    "MAX({}.name IN ({placeholders})) = 1",
                    category.alias()
                ));
                params.extend(names.iter().cloned().map(Value::Text));
            }
            Clause::Contains { target, term } => {
                match target {
                    SearchTarget::Column(column) => {
                        sql.push_str(&format!("{column} LIKE ? ESCAPE '!'"));
                    }
                    SearchTarget::Lookup(category) => {
                        sql.push_str(&format!(
                            "MAX({}.name LIKE ? ESCAPE '!') = 1",
                            category.alias()
                        ));
                    }
                }
                params.push(Value::Text(format!("%{}%", escape_like(term))));
            }
        }
    }
}

fn base_predicate(filter: &RestaurantFilter) -> Option<Predicate> {
    let mut parts = Vec::new();

    if let Some(id) = filter.id {
        parts.push(Predicate::Clause(Clause::Equals {
            column: "r.id",
            value: Value::Integer(id),
        }));
    }
    if let Some(borough) = &filter.borough {
        parts.push(Predicate::Clause(Clause::Equals {
            column: "r.borough",
            value: Value::Text(borough.clone()),
        }));
    }
    if let Some(status) = &filter.status {
        parts.push(Predicate::Clause(Clause::Equals {
            column: STATUS_COLUMN,
            value: Value::Text(status.clone()),
        }));
    }
    if let Some(liked) = filter.liked {
        parts.push(Predicate::Clause(Clause::Equals {
            column: "r.liked",
            value: Value::Integer(liked.into()),
        }));
    }

    Predicate::all(parts)
}

fn search_predicate(term: &str) -> Option<Predicate> {
    let columns = SEARCH_COLUMNS.iter().map(|&column| SearchTarget::Column(column));
    let lookups = Category::ALL.into_iter().map(SearchTarget::Lookup);

    Predicate::any(
        columns
            .chain(lookups)
            .map(|target| {
                Predicate::Clause(Clause::Contains {
                    target,
                    term: term.to_string(),
                })
            })
            .collect(),
    )
}

/// Post-grouping filter: `(category AND category ...) OR search`.
fn group_predicate(filter: &RestaurantFilter) -> Option<Predicate> {
    let categories = Predicate::all(
        Category::ALL
            .into_iter()
            .filter(|&category| !filter.memberships(category).is_empty())
            .map(|category| {
                Predicate::Clause(Clause::MemberOf {
                    category,
                    names: filter.memberships(category).to_vec(),
                })
            })
            .collect(),
    );
    let search = filter.search.as_deref().and_then(search_predicate);

    match (categories, search) {
        (Some(categories), Some(search)) => Predicate::any(vec![categories, search]),
        (categories, search) => categories.or(search),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

pub fn build_list_query(filter: &RestaurantFilter) -> ListQuery {
    let mut sql = format!(
        "SELECT r.id, r.name, r.neighborhood, r.borough, {STATUS_COLUMN} AS status, r.liked, \
         r.happy_hour, r.happy_hour_start_time, r.happy_hour_end_time, r.happy_hour_data, \
         r.has_happy_hour, r.notes, r.what_to_order, r.website_link, r.latitude, r.longitude, \
         r.created_at, r.updated_at, \
         json_group_array(DISTINCT c.name) AS cuisines, \
         json_group_array(DISTINCT ty.name) AS types, \
         json_group_array(DISTINCT n.name) AS neighborhoods, \
         json_group_array(DISTINCT t.name || '{TAG_COLOR_SEPARATOR}' || \
             COALESCE(NULLIF(t.color, ''), '{DEFAULT_TAG_COLOR}')) AS tags \
         FROM restaurants r"
    );
    let mut params = Vec::new();

    for category in Category::ALL {
        sql.push_str(&format!(
            " LEFT JOIN {join} {join_alias} ON {join_alias}.restaurant_id = r.id \
             LEFT JOIN {table} {alias} ON {alias}.id = {join_alias}.{fk}",
            join = category.join_table(),
            join_alias = category.join_alias(),
            table = category.lookup_table(),
            alias = category.alias(),
            fk = category.foreign_key(),
        ));
    }

    if let Some(predicate) = base_predicate(filter) {
        sql.push_str(" WHERE ");
        predicate.render(&mut sql, &mut params);
    }

    sql.push_str(" GROUP BY r.id");

    if let Some(predicate) = group_predicate(filter) {
        sql.push_str(" HAVING ");
        predicate.render(&mut sql, &mut params);
    }

    sql.push_str(" ORDER BY r.name ASC, r.id ASC LIMIT ? OFFSET ?");
    params.push(Value::Integer(filter.limit));
    params.push(Value::Integer(filter.offset));

    ListQuery { sql, params }
}

fn parse_schedules(id: i64, raw: Option<String>) -> Option<Vec<HappyHourSchedule>> {
    let raw = raw.filter(|text| !text.trim().is_empty())?;

    serde_json::from_str(&raw)
        .map_err(|e| {
            warn!("Restaurant {id} has unreadable happy_hour_data: {e}");
        })
        .ok()
}

fn conversion_error(index: usize) -> impl FnOnce(serde_json::Error) -> rusqlite::Error {
    move |e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
}

fn aggregate(row: &Row<'_>, index: usize) -> rusqlite::Result<Vec<String>> {
    decode_aggregate(row.get(index)?).map_err(conversion_error(index))
}

fn restaurant_from_row(row: &Row<'_>) -> rusqlite::Result<Restaurant> {
    let id = row.get::<_, i64>(0)?;

    Ok(Restaurant {
        id,
        name: row.get(1)?,
        neighborhood: row.get(2)?,
        borough: row.get(3)?,
        status: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        liked: row.get::<_, Option<bool>>(5)?.unwrap_or_default(),
        happy_hour: row.get(6)?,
        happy_hour_start_time: row.get(7)?,
        happy_hour_end_time: row.get(8)?,
        happy_hour_data: parse_schedules(id, row.get(9)?),
        has_happy_hour: row.get::<_, Option<bool>>(10)?.unwrap_or_default(),
        notes: row.get(11)?,
        what_to_order: row.get(12)?,
        website_link: row.get(13)?,
        latitude: row.get(14)?,
        longitude: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        cuisines: aggregate(row, 18)?,
        types: aggregate(row, 19)?,
        neighborhoods: aggregate(row, 20)?,
        tags: decode_tags(row.get(21)?).map_err(conversion_error(21))?,
    })
}

pub fn list_restaurants(
    connection: &Connection,
    filter: &RestaurantFilter,
) -> Result<Vec<Restaurant>, AppError> {
    let query = build_list_query(filter);

    let mut statement = connection.prepare(&query.sql)?;
    let restaurants = statement
        .query_map(params_from_iter(query.params.iter()), restaurant_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(restaurants)
}

pub fn get_restaurant(connection: &Connection, id: i64) -> Result<Restaurant, AppError> {
    list_restaurants(connection, &RestaurantFilter::by_id(id))?
        .pop()
        .ok_or_else(|| AppError::not_found(format!("Restaurant {id} not found")))
}
