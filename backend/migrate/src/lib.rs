//! # Legacy Migrations
//!
//! Reshapes free text columns left over from the first version of the tracker.
//!
//! ## Neighborhoods
//! The `neighborhood` column used to hold a free text list such as `Flatiron / NoMad`. Each
//! restaurant with such text and no neighborhood links gets the text split into names, every
//! name upserted into `neighborhoods` and linked. The legacy column is left untouched.
//!
//! ## Happy hours
//! `happy_hour`, `happy_hour_start_time` and `happy_hour_end_time` were free text. Every row with
//! a NULL `happy_hour_data` gets a single structured schedule built from them:
//! 1. Days come from day names, ranges (`Mon-Fri`), `daily`, `weekdays` or `weekends`. No day at
//!    all means every day.
//!
//! 2. Times come from the legacy columns when both parse, otherwise from the first time range in
//!    the text (`4-7pm`, `11am - 2pm`, `16:00-18:30`).
//!
//! 3. The offer is the trimmed text.
//!
//! Rows without a usable time range are skipped and stay NULL, so running again retries them.
//!
//! ## Notes
//! - Each migration gathers its rows first, then applies everything inside one transaction.
//! - Both migrations are safe to repeat, already migrated rows no longer match their selection.
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{Connection, Transaction, params};
use server::{associations::rewrite_associations, database::open, models::Category};

pub mod models;
pub mod utils;

pub use models::{Migration, Step};
use models::{LegacyHappyHour, LegacyNeighborhood, MigrationReport, Outcome};
use utils::{build_schedule, split_neighborhoods};

pub fn migrate_file(path: impl AsRef<Path>, migration: Migration) -> Result<()> {
    let path = path.as_ref();
    let mut connection =
        open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    for (step, report) in run(&mut connection, migration)? {
        println!("Migration: {}", step.label());
        println!("Total: {}", report.total);
        println!("Migrated: {}", report.migrated);
        println!("Skipped: {}\n", report.skipped);
    }

    Ok(())
}

/// Runs every step of `migration` in order, one transaction per step.
pub fn run(
    connection: &mut Connection,
    migration: Migration,
) -> Result<Vec<(Step, MigrationReport)>> {
    migration
        .steps()
        .iter()
        .map(|&step| {
            let report = match step {
                Step::Neighborhoods => migrate_neighborhoods(connection),
                Step::HappyHours => migrate_happy_hours(connection),
            }
            .with_context(|| format!("Migration {} failed", step.label()))?;

            Ok((step, report))
        })
        .collect()
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    Ok(pb)
}

pub fn migrate_neighborhoods(connection: &mut Connection) -> Result<MigrationReport> {
    let tx = connection.transaction()?;

    let pending = tx
        .prepare(
            "SELECT r.id, r.neighborhood FROM restaurants r
             WHERE TRIM(COALESCE(r.neighborhood, '')) != ''
               AND NOT EXISTS (
                   SELECT 1 FROM restaurant_neighborhoods rn WHERE rn.restaurant_id = r.id
               )
             ORDER BY r.id",
        )?
        .query_map([], |row| {
            Ok(LegacyNeighborhood {
                id: row.get(0)?,
                text: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let pb = progress_bar(pending.len())?;
    pb.set_message("Linking neighborhoods");

    let report = pending
        .iter()
        .try_fold(MigrationReport::new(pending.len()), |report, legacy| {
            let outcome = link_neighborhoods(&tx, legacy)?;
            pb.inc(1);

            Ok::<_, anyhow::Error>(report.record(outcome))
        })?;

    tx.commit()?;
    pb.finish_with_message("Done");

    Ok(report)
}

fn link_neighborhoods(tx: &Transaction<'_>, legacy: &LegacyNeighborhood) -> Result<Outcome> {
    let names = split_neighborhoods(&legacy.text);
    if names.is_empty() {
        return Ok(Outcome::Skipped);
    }

    rewrite_associations(tx, legacy.id, Category::Neighborhoods, &names)?;

    Ok(Outcome::Migrated)
}

pub fn migrate_happy_hours(connection: &mut Connection) -> Result<MigrationReport> {
    let tx = connection.transaction()?;

    let pending = tx
        .prepare(
            "SELECT id, happy_hour, happy_hour_start_time, happy_hour_end_time FROM restaurants
             WHERE happy_hour_data IS NULL
               AND (TRIM(COALESCE(happy_hour, '')) != ''
                    OR TRIM(COALESCE(happy_hour_start_time, '')) != ''
                    OR TRIM(COALESCE(happy_hour_end_time, '')) != '')
             ORDER BY id",
        )?
        .query_map([], |row| {
            Ok(LegacyHappyHour {
                id: row.get(0)?,
                text: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let pb = progress_bar(pending.len())?;
    pb.set_message("Structuring happy hours");

    let report = pending
        .iter()
        .try_fold(MigrationReport::new(pending.len()), |report, legacy| {
            let outcome = store_schedule(&tx, legacy)?;
            pb.inc(1);

            Ok::<_, anyhow::Error>(report.record(outcome))
        })?;

    tx.commit()?;
    pb.finish_with_message("Done");

    Ok(report)
}

fn store_schedule(tx: &Transaction<'_>, legacy: &LegacyHappyHour) -> Result<Outcome> {
    let Some(schedule) = build_schedule(legacy) else {
        return Ok(Outcome::Skipped);
    };

    let data = serde_json::to_string(&[schedule])?;
    tx.prepare_cached(
        "UPDATE restaurants
         SET happy_hour_data = ?1, has_happy_hour = 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?2",
    )?
    .execute(params![data, legacy.id])?;

    Ok(Outcome::Migrated)
}

#[cfg(test)]
mod tests {
    use super::*;

    use server::{
        database::open_in_memory,
        lookups::list_names,
        models::{HappyHourSchedule, Weekday},
        query::get_restaurant,
    };

    #[derive(Default)]
    struct Legacy<'a> {
        name: &'a str,
        neighborhood: Option<&'a str>,
        happy_hour: Option<&'a str>,
        start_time: Option<&'a str>,
        end_time: Option<&'a str>,
    }

    fn insert_legacy(connection: &Connection, legacy: Legacy<'_>) -> i64 {
        connection
            .execute(
                "INSERT INTO restaurants
                 (name, neighborhood, happy_hour, happy_hour_start_time, happy_hour_end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    legacy.name,
                    legacy.neighborhood,
                    legacy.happy_hour,
                    legacy.start_time,
                    legacy.end_time
                ],
            )
            .unwrap();

        connection.last_insert_rowid()
    }

    fn neighborhood<'a>(name: &'a str, text: &'a str) -> Legacy<'a> {
        Legacy {
            name,
            neighborhood: Some(text),
            ..Legacy::default()
        }
    }

    fn happy_hour<'a>(name: &'a str, text: &'a str) -> Legacy<'a> {
        Legacy {
            name,
            happy_hour: Some(text),
            ..Legacy::default()
        }
    }

    fn schedules(connection: &Connection, id: i64) -> Option<Vec<HappyHourSchedule>> {
        get_restaurant(connection, id).unwrap().happy_hour_data
    }

    fn backdate(connection: &Connection, id: i64) {
        connection
            .execute(
                "UPDATE restaurants SET updated_at = '2000-01-01 00:00:00' WHERE id = ?1",
                params![id],
            )
            .unwrap();
    }

    #[test]
    fn test_migrate_neighborhoods() {
        let mut connection = open_in_memory().unwrap();
        let split = insert_legacy(&connection, neighborhood("Carbone", "Flatiron / NoMad"));
        let blank = insert_legacy(&connection, neighborhood("Dante", "  "));
        let separators = insert_legacy(&connection, neighborhood("Lucali", " ; "));

        let report = migrate_neighborhoods(&mut connection).unwrap();
        assert_eq!(
            report,
            MigrationReport {
                total: 2,
                migrated: 1,
                skipped: 1
            }
        );

        let carbone = get_restaurant(&connection, split).unwrap();
        assert_eq!(carbone.neighborhoods, vec!["Flatiron", "NoMad"]);
        assert!(get_restaurant(&connection, blank).unwrap().neighborhoods.is_empty());
        assert!(get_restaurant(&connection, separators).unwrap().neighborhoods.is_empty());

        let again = migrate_neighborhoods(&mut connection).unwrap();
        assert_eq!(again.total, 1);
        assert_eq!(again.migrated, 0);
    }

    #[test]
    fn test_migrate_neighborhoods_shares_lookups() {
        let mut connection = open_in_memory().unwrap();
        insert_legacy(&connection, neighborhood("Carbone", "Greenwich Village"));
        insert_legacy(
            &connection,
            neighborhood("Via Carota", "Greenwich Village and West Village"),
        );

        migrate_neighborhoods(&mut connection).unwrap();

        assert_eq!(
            list_names(&connection, Category::Neighborhoods).unwrap(),
            vec!["Greenwich Village", "West Village"]
        );
    }

    #[test]
    fn test_migrate_happy_hours() {
        let mut connection = open_in_memory().unwrap();
        let from_text = insert_legacy(
            &connection,
            happy_hour("Dante", "Mon-Fri 4-7pm $10 negronis"),
        );
        let from_columns = insert_legacy(
            &connection,
            Legacy {
                start_time: Some("3pm"),
                end_time: Some("6pm"),
                ..happy_hour("Fish Cheeks", "Weekends")
            },
        );
        let unparsable = insert_legacy(&connection, happy_hour("Carbone", "ask the bar"));

        let report = migrate_happy_hours(&mut connection).unwrap();
        assert_eq!(
            report,
            MigrationReport {
                total: 3,
                migrated: 2,
                skipped: 1
            }
        );

        let dante = schedules(&connection, from_text).unwrap();
        assert_eq!(dante.len(), 1);
        assert_eq!(dante[0].start_time, "16:00");
        assert_eq!(dante[0].end_time, "19:00");
        assert_eq!(dante[0].days.len(), 5);
        assert_eq!(dante[0].offer, "Mon-Fri 4-7pm $10 negronis");
        assert!(get_restaurant(&connection, from_text).unwrap().has_happy_hour);

        let fish_cheeks = schedules(&connection, from_columns).unwrap();
        assert_eq!(
            fish_cheeks[0].days.iter().copied().collect::<Vec<_>>(),
            vec![Weekday::Sat, Weekday::Sun]
        );
        assert_eq!(fish_cheeks[0].start_time, "15:00");

        assert_eq!(schedules(&connection, unparsable), None);
        assert!(!get_restaurant(&connection, unparsable).unwrap().has_happy_hour);
    }

    #[test]
    fn test_migrate_happy_hours_bumps_updated_at() {
        let mut connection = open_in_memory().unwrap();
        let migrated = insert_legacy(&connection, happy_hour("Dante", "daily 3-5pm"));
        let skipped = insert_legacy(&connection, happy_hour("Carbone", "ask the bar"));
        backdate(&connection, migrated);
        backdate(&connection, skipped);

        migrate_happy_hours(&mut connection).unwrap();

        let dante = get_restaurant(&connection, migrated).unwrap();
        assert!(dante.updated_at.is_some());
        assert_ne!(dante.updated_at.as_deref(), Some("2000-01-01 00:00:00"));

        let carbone = get_restaurant(&connection, skipped).unwrap();
        assert_eq!(carbone.updated_at.as_deref(), Some("2000-01-01 00:00:00"));
    }

    #[test]
    fn test_migrate_happy_hours_keeps_structured_rows() {
        let mut connection = open_in_memory().unwrap();
        let id = insert_legacy(&connection, happy_hour("Dante", "daily 3-5pm"));
        connection
            .execute(
                "UPDATE restaurants SET happy_hour_data = '[]' WHERE id = ?1",
                params![id],
            )
            .unwrap();

        let report = migrate_happy_hours(&mut connection).unwrap();

        assert_eq!(report, MigrationReport::default());
        assert_eq!(schedules(&connection, id), Some(vec![]));
    }

    #[test]
    fn test_run_all() {
        let mut connection = open_in_memory().unwrap();
        insert_legacy(
            &connection,
            Legacy {
                neighborhood: Some("West Village"),
                ..happy_hour("Dante", "daily 3-5pm")
            },
        );

        let reports = run(&mut connection, Migration::All).unwrap();

        assert_eq!(
            reports.iter().map(|(step, _)| *step).collect::<Vec<_>>(),
            vec![Step::Neighborhoods, Step::HappyHours]
        );
        assert!(reports.iter().all(|(_, report)| report.migrated == 1));
    }

    #[test]
    fn test_migrate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restaurants.db");

        {
            let connection = open(&path).unwrap();
            insert_legacy(&connection, neighborhood("Dante", "West Village"));
        }

        migrate_file(&path, Migration::Neighborhoods).unwrap();

        let connection = open(&path).unwrap();
        assert_eq!(
            list_names(&connection, Category::Neighborhoods).unwrap(),
            vec!["West Village"]
        );
    }
}
