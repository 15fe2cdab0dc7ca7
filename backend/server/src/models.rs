//! # Models
//!
//! Rows and payloads exchanged between the REST layer and SQLite.
//!
//! ## Restaurants
//! - Scalar columns live on `restaurants`
//! - Cuisines, types, neighborhoods and tags are lookup tables linked through join tables
//! - `happy_hour_data` is stored as serialized JSON, a list of [`HappyHourSchedule`]
//!
//! ## Payloads
//! Create and update share [`RestaurantPayload`]. Every field is optional so an update only
//! touches what the client sent. Nullable text columns use `Option<Option<_>>` to tell an
//! absent key apart from an explicit `null`.
use std::collections::BTreeSet;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    utils::{deserialize_flag, present},
};

pub const DEFAULT_TAG_COLOR: &str = "#6B7280";
pub const DEFAULT_STATUS: &str = "Unvisited";
pub const VISITED_STATUS: &str = "Visited";

/// One of the four many-to-many lookup relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Cuisines,
    Types,
    Neighborhoods,
    Tags,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Cuisines,
        Category::Types,
        Category::Neighborhoods,
        Category::Tags,
    ];

    pub fn lookup_table(self) -> &'static str {
        match self {
            Category::Cuisines => "cuisines",
            Category::Types => "types",
            Category::Neighborhoods => "neighborhoods",
            Category::Tags => "tags",
        }
    }

    pub fn join_table(self) -> &'static str {
        match self {
            Category::Cuisines => "restaurant_cuisines",
            Category::Types => "restaurant_types",
            Category::Neighborhoods => "restaurant_neighborhoods",
            Category::Tags => "restaurant_tags",
        }
    }

    pub fn foreign_key(self) -> &'static str {
        match self {
            Category::Cuisines => "cuisine_id",
            Category::Types => "type_id",
            Category::Neighborhoods => "neighborhood_id",
            Category::Tags => "tag_id",
        }
    }

    /// Alias of the lookup table inside the listing query.
    pub fn alias(self) -> &'static str {
        match self {
            Category::Cuisines => "c",
            Category::Types => "ty",
            Category::Neighborhoods => "n",
            Category::Tags => "t",
        }
    }

    /// Alias of the join table inside the listing query.
    pub fn join_alias(self) -> &'static str {
        match self {
            Category::Cuisines => "rc",
            Category::Types => "rty",
            Category::Neighborhoods => "rn",
            Category::Tags => "rt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(alias = "Monday", alias = "monday", alias = "mon")]
    Mon,
    #[serde(alias = "Tuesday", alias = "tuesday", alias = "tue")]
    Tue,
    #[serde(alias = "Wednesday", alias = "wednesday", alias = "wed")]
    Wed,
    #[serde(alias = "Thursday", alias = "thursday", alias = "thu")]
    Thu,
    #[serde(alias = "Friday", alias = "friday", alias = "fri")]
    Fri,
    #[serde(alias = "Saturday", alias = "saturday", alias = "sat")]
    Sat,
    #[serde(alias = "Sunday", alias = "sunday", alias = "sun")]
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HappyHourSchedule {
    pub days: BTreeSet<Weekday>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub offer: String,
}

pub const TIME_FORMAT: &str = "%H:%M";

impl HappyHourSchedule {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.days.is_empty() {
            return Err(AppError::bad_request(
                "Happy hour schedule needs at least one day",
            ));
        }

        for time in [&self.start_time, &self.end_time] {
            NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|_| {
                AppError::bad_request(format!("Invalid happy hour time '{time}', expected HH:MM"))
            })?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub neighborhood: Option<String>,
    pub borough: Option<String>,
    pub status: String,
    pub liked: bool,
    pub happy_hour: Option<String>,
    pub happy_hour_start_time: Option<String>,
    pub happy_hour_end_time: Option<String>,
    pub happy_hour_data: Option<Vec<HappyHourSchedule>>,
    pub has_happy_hour: bool,
    pub notes: Option<String>,
    pub what_to_order: Option<String>,
    pub website_link: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub cuisines: Vec<String>,
    pub types: Vec<String>,
    pub neighborhoods: Vec<String>,
    pub tags: Vec<TagRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RestaurantPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub neighborhood: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub borough: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub liked: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub happy_hour: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub happy_hour_start_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub happy_hour_end_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub happy_hour_data: Option<Option<Vec<HappyHourSchedule>>>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub has_happy_hour: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub what_to_order: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub website_link: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub longitude: Option<Option<f64>>,
    #[serde(default)]
    pub cuisines: Option<Vec<String>>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub neighborhoods: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl RestaurantPayload {
    pub fn associations(&self, category: Category) -> Option<&[String]> {
        match category {
            Category::Cuisines => self.cuisines.as_deref(),
            Category::Types => self.types.as_deref(),
            Category::Neighborhoods => self.neighborhoods.as_deref(),
            Category::Tags => self.tags.as_deref(),
        }
    }

    pub fn has_associations(&self) -> bool {
        Category::ALL
            .iter()
            .any(|&category| self.associations(category).is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
pub struct TagPayload {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_restaurants: i64,
    pub visited: i64,
    pub liked: i64,
    pub happy_hours: i64,
    pub cuisines: i64,
    pub types: i64,
    pub neighborhoods: i64,
    pub tags: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scratchpad {
    pub content: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScratchpadPayload {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_accepts_full_names() {
        let days: Vec<Weekday> = serde_json::from_str(r#"["Mon", "Tuesday", "friday"]"#).unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Tue, Weekday::Fri]);
        assert_eq!(serde_json::to_string(&Weekday::Sun).unwrap(), r#""Sun""#);
    }

    #[test]
    fn test_schedule_validation() {
        let schedule = HappyHourSchedule {
            days: [Weekday::Mon, Weekday::Fri].into_iter().collect(),
            start_time: "16:00".to_string(),
            end_time: "19:30".to_string(),
            offer: "$6 negronis".to_string(),
        };
        assert!(schedule.validate().is_ok());

        let bad_time = HappyHourSchedule {
            end_time: "7pm".to_string(),
            ..schedule.clone()
        };
        assert!(matches!(bad_time.validate(), Err(AppError::BadRequest(_))));

        let no_days = HappyHourSchedule {
            days: BTreeSet::new(),
            ..schedule
        };
        assert!(matches!(no_days.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_payload_distinguishes_null_from_absent() {
        let payload: RestaurantPayload =
            serde_json::from_str(r#"{"notes": null, "borough": "", "liked": 1}"#).unwrap();

        assert_eq!(payload.notes, Some(None));
        assert_eq!(payload.borough, Some(Some(String::new())));
        assert_eq!(payload.what_to_order, None);
        assert_eq!(payload.liked, Some(true));
        assert!(!payload.has_associations());
    }

    #[test]
    fn test_payload_associations() {
        let payload: RestaurantPayload = serde_json::from_str(r#"{"tags": []}"#).unwrap();

        assert!(payload.has_associations());
        assert_eq!(payload.associations(Category::Tags), Some(&[][..]));
        assert_eq!(payload.associations(Category::Cuisines), None);
    }
}
