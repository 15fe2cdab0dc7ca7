use std::{collections::BTreeSet, sync::LazyLock};

use chrono::NaiveTime;
use regex::{Captures, Regex};
use server::models::{HappyHourSchedule, TIME_FORMAT, Weekday};

use crate::models::LegacyHappyHour;

const DAY: &str = r"\b(mon|tue|wed|thu|fri|sat|sun)(?:day|sday|nesday|rsday|rs|r|s|urday)?s?\b";
const CLOCK: &str = r"(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?";
const RANGE_JOINER: &str = r"\s*(?:-|–|—|to|through|thru|until|till|til)\s*";

static DAY_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(DAY).unwrap());
static DAY_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{DAY}\.?{RANGE_JOINER}{DAY}")).unwrap());
static EVERY_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:daily|every\s*day|7\s*days)\b").unwrap());
static WEEKDAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bweekdays?\b").unwrap());
static WEEKENDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bweekends?\b").unwrap());
static TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(&format!(r"^\s*{CLOCK}\s*$")).unwrap());
static TIME_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{CLOCK}{RANGE_JOINER}{CLOCK}")).unwrap());
static NEIGHBORHOOD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|/|&|;|\band\b)\s*").unwrap());

pub fn split_neighborhoods(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for part in NEIGHBORHOOD_SEPARATOR
        .split(text)
        .map(str::trim)
        .filter(|part| !part.is_empty())
    {
        if !names.iter().any(|name| name == part) {
            names.push(part.to_string());
        }
    }

    names
}

fn weekday(stem: &str) -> Option<Weekday> {
    match stem {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from `start` through `end`, wrapping past Sunday.
fn day_span(start: Weekday, end: Weekday) -> impl Iterator<Item = Weekday> {
    let len = (end.index() + 7 - start.index()) % 7 + 1;

    (0..len).map(move |offset| Weekday::ALL[(start.index() + offset) % 7])
}

/// Days mentioned in free text. Text naming no day at all means every day.
pub fn parse_days(text: &str) -> BTreeSet<Weekday> {
    let lower = text.to_lowercase();
    let every_day: BTreeSet<Weekday> = Weekday::ALL.into_iter().collect();

    if EVERY_DAY.is_match(&lower) {
        return every_day;
    }

    let mut days = BTreeSet::new();
    for caps in DAY_RANGE.captures_iter(&lower) {
        if let (Some(start), Some(end)) = (weekday(&caps[1]), weekday(&caps[2])) {
            days.extend(day_span(start, end));
        }
    }

    let rest = DAY_RANGE.replace_all(&lower, " ");
    for caps in DAY_TOKEN.captures_iter(&rest) {
        if let Some(day) = weekday(&caps[1]) {
            days.insert(day);
        }
    }
    if WEEKDAYS.is_match(&rest) {
        days.extend(&Weekday::ALL[..5]);
    }
    if WEEKENDS.is_match(&rest) {
        days.extend([Weekday::Sat, Weekday::Sun]);
    }

    if days.is_empty() { every_day } else { days }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "am" | "a.m." => Some(Meridiem::Am),
            "pm" | "p.m." => Some(Meridiem::Pm),
            _ => None,
        }
    }

    fn flip(self) -> Self {
        match self {
            Meridiem::Am => Meridiem::Pm,
            Meridiem::Pm => Meridiem::Am,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clock {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

impl Clock {
    /// Reads the three `CLOCK` groups starting at `first`.
    fn from_captures(caps: &Captures<'_>, first: usize) -> Option<Self> {
        Some(Self {
            hour: caps.get(first)?.as_str().parse().ok()?,
            minute: caps
                .get(first + 1)
                .map_or(Some(0), |m| m.as_str().parse().ok())?,
            meridiem: caps
                .get(first + 2)
                .and_then(|m| Meridiem::parse(m.as_str())),
        })
    }

    fn to_time(self, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
        let hour = match (meridiem, self.hour) {
            (None, hour) => hour,
            (Some(Meridiem::Am), 12) => 0,
            (Some(Meridiem::Pm), 12) => 12,
            (Some(Meridiem::Am), hour @ 1..=11) => hour,
            (Some(Meridiem::Pm), hour @ 1..=11) => hour + 12,
            (Some(_), _) => return None,
        };

        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }
}

fn parse_clock(text: &str) -> Option<Clock> {
    let lower = text.to_lowercase();
    let caps = TIME.captures(&lower)?;

    Clock::from_captures(&caps, 1)
}

/// Resolves a start/end pair where either side may omit am/pm.
///
/// A missing suffix is borrowed from the other side, and bare hours read as afternoon. When the
/// borrowed suffix puts the start after the end, the range crosses noon instead ("11-2pm").
fn resolve_range(start: Clock, end: Clock) -> Option<(NaiveTime, NaiveTime)> {
    let twenty_four = start.meridiem.is_none()
        && end.meridiem.is_none()
        && [start.hour, end.hour].iter().any(|&h| h == 0 || h > 12);

    let (start_meridiem, end_meridiem) = if twenty_four {
        (None, None)
    } else {
        (
            start.meridiem.or(end.meridiem).or(Some(Meridiem::Pm)),
            end.meridiem.or(start.meridiem).or(Some(Meridiem::Pm)),
        )
    };

    let start_time = start.to_time(start_meridiem)?;
    let end_time = end.to_time(end_meridiem)?;
    if start_time <= end_time {
        return Some((start_time, end_time));
    }

    if start.meridiem.is_none() {
        if let Some(flipped) = start.to_time(start_meridiem.map(Meridiem::flip)) {
            if flipped <= end_time {
                return Some((flipped, end_time));
            }
        }
    }
    if end.meridiem.is_none() {
        if let Some(flipped) = end.to_time(end_meridiem.map(Meridiem::flip)) {
            if start_time <= flipped {
                return Some((start_time, flipped));
            }
        }
    }

    // late night windows such as 10pm-1am run past midnight
    Some((start_time, end_time))
}

/// First time range in free text, ignoring price ranges such as `$5-7`.
pub fn parse_time_range(text: &str) -> Option<(NaiveTime, NaiveTime)> {
    let lower = text.to_lowercase();

    TIME_RANGE.captures_iter(&lower).find_map(|caps| {
        let whole = caps.get(0)?;
        if lower[..whole.start()].ends_with('$') {
            return None;
        }

        resolve_range(
            Clock::from_captures(&caps, 1)?,
            Clock::from_captures(&caps, 4)?,
        )
    })
}

fn legacy_columns(legacy: &LegacyHappyHour) -> Option<(NaiveTime, NaiveTime)> {
    let start = legacy.start_time.as_deref().and_then(parse_clock)?;
    let end = legacy.end_time.as_deref().and_then(parse_clock)?;

    resolve_range(start, end)
}

/// Structured schedule for a legacy row, `None` when no time range can be recovered.
pub fn build_schedule(legacy: &LegacyHappyHour) -> Option<HappyHourSchedule> {
    let text = legacy.text.as_deref().map(str::trim).unwrap_or_default();
    let (start, end) = legacy_columns(legacy).or_else(|| parse_time_range(text))?;

    Some(HappyHourSchedule {
        days: parse_days(text),
        start_time: start.format(TIME_FORMAT).to_string(),
        end_time: end.format(TIME_FORMAT).to_string(),
        offer: text.to_string(),
    })
}
