//! Source recipes: raw text tables to hourly [`Table`]s.
//!
//! Each recipe resolves French labels to [`Field`]s, builds a `longdate` per
//! row, averages rows that fall into the same hour and keeps exactly the
//! requested columns. Gap filling is left to the join.
//!
//! A raw table whose first header is `longdate` is treated as already clean
//! (see [`table_to_raw`]), which makes every recipe idempotent.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::dates;
use crate::domain::{Field, Frame, INDEX_NAME, Origin, Table};
use crate::error::{PipelineError, Result};
use crate::io::collector::RawTable;

/// Label prefixes of the regional feeds, after normalisation.
const PREFIX_FIELDS: [(&str, Field); 6] = [
    ("code insee", Field::Code),
    ("vitesse vent", Field::Wspd),
    ("rayonnement solaire", Field::Sun),
    ("tmin", Field::Tmin),
    ("tmax", Field::Tmax),
    ("tmoy", Field::Tmoy),
];

/// How a recipe reads the timestamp of a raw row.
#[derive(Debug, Clone, Copy)]
enum Stamp {
    /// Separate date and time-of-day fields.
    DateAndHour,
    /// One ISO date-time field, possibly with an offset.
    Zoned,
    /// One date field (daily data).
    Day,
}

/// Lower-case, ASCII-fold and strip unit decorations from a label.
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().trim_start_matches('\u{feff}').to_lowercase();
    let folded: String = lowered.nfkd().filter(char::is_ascii).collect();
    let trimmed = folded.trim();
    let stripped = trimmed.strip_suffix(" (mw)").unwrap_or(trimmed);
    stripped.replace("prevision j-1", "prevision_j1")
}

/// Map a normalised label to a field, by exact name or known prefix.
pub fn resolve_field(normalized: &str) -> Option<Field> {
    if let Ok(field) = normalized.parse::<Field>() {
        return Some(field);
    }
    let spaced = normalized.replace('_', " ");
    PREFIX_FIELDS
        .iter()
        .find(|(prefix, _)| spaced.starts_with(prefix))
        .map(|(_, field)| *field)
}

/// Parse a numeric cell. Empty and unparseable cells are missing.
pub fn parse_number(cell: &str) -> Option<f64> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }
    let v: f64 = if s.contains(',') {
        s.replace(',', ".").parse().ok()?
    } else {
        s.parse().ok()?
    };
    v.is_finite().then_some(v)
}

/// National production and consumption, sub-hourly.
pub fn clean_power(raw: &RawTable, columns: &[Field], origin: Origin) -> Result<Table> {
    clean_with(raw, columns, origin, Stamp::DateAndHour, "power")
}

/// Tri-hourly regional sun and wind readings.
pub fn clean_weather(raw: &RawTable, columns: &[Field], origin: Origin) -> Result<Table> {
    clean_with(raw, columns, origin, Stamp::Zoned, "weather")
}

/// Daily regional temperatures.
pub fn clean_temperature(raw: &RawTable, columns: &[Field], origin: Origin) -> Result<Table> {
    clean_with(raw, columns, origin, Stamp::Day, "temperature")
}

/// Remove every row with at least one missing cell.
pub fn drop_missing_rows(table: &Table) -> Frame {
    table.drop_missing_rows()
}

/// Render a cleaned table back to text with a leading `longdate` column.
pub fn table_to_raw(table: &Table) -> RawTable {
    let mut headers = vec![INDEX_NAME.to_string()];
    headers.extend(table.fields().iter().map(|f| f.as_str().to_string()));

    let rows = (0..table.len())
        .map(|row| {
            let mut cells = vec![dates::format_timestamp(table.index()[row])];
            for field in table.fields() {
                let cell = table
                    .column(*field)
                    .and_then(|col| col[row])
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                cells.push(cell);
            }
            cells
        })
        .collect();

    RawTable::new(headers, rows)
}

fn clean_with(
    raw: &RawTable,
    columns: &[Field],
    origin: Origin,
    stamp: Stamp,
    source: &str,
) -> Result<Table> {
    let canonical = raw.headers.first().map(String::as_str) == Some(INDEX_NAME);

    let stamp_cols: Vec<usize> = if canonical {
        vec![0]
    } else {
        let date = require_header(raw, origin.date_field(), source)?;
        match stamp {
            Stamp::DateAndHour => vec![date, require_header(raw, origin.hour_field(), source)?],
            Stamp::Zoned | Stamp::Day => vec![date],
        }
    };

    // First column resolving to a field wins.
    let mut by_field: BTreeMap<Field, usize> = BTreeMap::new();
    for (idx, header) in raw.headers.iter().enumerate() {
        if stamp_cols.contains(&idx) {
            continue;
        }
        if let Some(field) = resolve_field(&normalize_header(header)) {
            by_field.entry(field).or_insert(idx);
        }
    }
    let picked: Vec<usize> = columns
        .iter()
        .map(|field| {
            by_field.get(field).copied().ok_or_else(|| {
                PipelineError::Schema(format!("{source}: column '{field}' not found in source"))
            })
        })
        .collect::<Result<_>>()?;

    let mut hours: BTreeMap<NaiveDateTime, Vec<(f64, u32)>> = BTreeMap::new();
    let mut skipped = 0usize;
    for row in 0..raw.len() {
        let ts = match row_timestamp(raw, row, &stamp_cols, stamp, canonical) {
            Ok(ts) => dates::floor_hour(ts),
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let acc = hours
            .entry(ts)
            .or_insert_with(|| vec![(0.0, 0); picked.len()]);
        for (slot, &col) in acc.iter_mut().zip(&picked) {
            if let Some(v) = parse_number(raw.cell(row, col)) {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(source, skipped, "rows with an unparseable timestamp were skipped");
    }
    debug!(source, rows = raw.len(), hours = hours.len(), "source cleaned");

    let index: Vec<NaiveDateTime> = hours.keys().copied().collect();
    let cols = (0..picked.len())
        .map(|c| {
            hours
                .values()
                .map(|acc| {
                    let (sum, n) = acc[c];
                    (n > 0).then(|| sum / f64::from(n))
                })
                .collect()
        })
        .collect();

    Table::new(index, columns.to_vec(), cols)
}

fn require_header(raw: &RawTable, name: &str, source: &str) -> Result<usize> {
    raw.position(name)
        .ok_or_else(|| PipelineError::Schema(format!("{source}: field '{name}' not found")))
}

fn row_timestamp(
    raw: &RawTable,
    row: usize,
    stamp_cols: &[usize],
    stamp: Stamp,
    canonical: bool,
) -> std::result::Result<NaiveDateTime, dates::ParseError> {
    let first = raw.cell(row, stamp_cols[0]);
    if canonical {
        return dates::parse_timestamp(first);
    }
    match stamp {
        Stamp::DateAndHour => {
            let hour = raw.cell(row, stamp_cols[1]);
            dates::parse_timestamp(&format!("{} {}", first.trim(), hour.trim()))
        }
        Stamp::Zoned => dates::parse_zoned_timestamp(first),
        Stamp::Day => dates::parse_timestamp(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[rstest]
    #[case("Consommation (MW)", Some(Field::Consommation))]
    #[case("Prévision J-1 (MW)", Some(Field::PrevisionJ1))]
    #[case("Nucléaire (MW)", Some(Field::Nucleaire))]
    #[case("Bioénergies (MW)", Some(Field::Bioenergies))]
    #[case("TMoy (°C)", Some(Field::Tmoy))]
    #[case("Code INSEE Région", Some(Field::Code))]
    #[case("Rayonnement Solaire Global (W/m²)", Some(Field::Sun))]
    #[case("Vitesse Vent Moyenne 10 m (m/s)", Some(Field::Wspd))]
    #[case("vitesse_vent_moyenne_10m", Some(Field::Wspd))]
    #[case("Fioul - TAC (MW)", None)]
    #[case("Périmètre", None)]
    fn labels_resolve_to_fields(#[case] label: &str, #[case] expected: Option<Field>) {
        assert_eq!(resolve_field(&normalize_header(label)), expected);
    }

    #[test]
    fn numbers_accept_decimal_commas() {
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number(" 7 "), Some(7.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("ND"), None);
    }

    #[test]
    fn power_is_averaged_per_hour() {
        let table = raw(
            &["Date", "Heure", "Consommation (MW)", "Prévision J-1 (MW)", "Gaz (MW)"],
            &[
                &["2022-01-01", "00:30", "300", "290", "10"],
                &["2022-01-01", "00:00", "100", "110", "10"],
                &["2022-01-01", "01:00", "", "120", "11"],
                &["bad", "01:15", "1", "1", "1"],
            ],
        );
        let cleaned = clean_power(&table, &[Field::Consommation, Field::PrevisionJ1], Origin::Csv).unwrap();
        assert_eq!(cleaned.index(), &[at(1, 0), at(1, 1)]);
        assert_eq!(cleaned.fields(), &[Field::Consommation, Field::PrevisionJ1]);
        assert_eq!(cleaned.column(Field::Consommation).unwrap(), &[Some(200.0), None]);
        assert_eq!(cleaned.column(Field::PrevisionJ1).unwrap(), &[Some(200.0), Some(120.0)]);
    }

    #[test]
    fn api_origin_uses_lower_case_stamp_fields() {
        let table = raw(
            &["date", "heure", "consommation"],
            &[&["2022-01-01", "05:00", "42"]],
        );
        let cleaned = clean_power(&table, &[Field::Consommation], Origin::Api).unwrap();
        assert_eq!(cleaned.index(), &[at(1, 5)]);

        let err = clean_power(&table, &[Field::Consommation], Origin::Csv).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn missing_requested_column_is_schema_error() {
        let table = raw(&["Date", "Heure", "Gaz (MW)"], &[&["2022-01-01", "00:00", "1"]]);
        let err = clean_power(&table, &[Field::Consommation], Origin::Csv).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(msg) if msg.contains("consommation")));
    }

    #[test]
    fn weather_keeps_wall_clock_and_averages_regions() {
        let table = raw(
            &[
                "Date",
                "Code INSEE Région",
                "Rayonnement Solaire Global (W/m²)",
                "Vitesse Vent Moyenne 10 m (m/s)",
            ],
            &[
                &["2022-01-01T03:00:00+01:00", "11", "0", "4,0"],
                &["2022-01-01T03:00:00+01:00", "24", "0", "6,0"],
                &["2022-01-01T00:00:00+01:00", "11", "0", "2"],
            ],
        );
        let cleaned = clean_weather(&table, &[Field::Wspd, Field::Sun], Origin::Csv).unwrap();
        assert_eq!(cleaned.index(), &[at(1, 0), at(1, 3)]);
        assert_eq!(cleaned.column(Field::Wspd).unwrap(), &[Some(2.0), Some(5.0)]);
    }

    #[test]
    fn temperature_is_indexed_at_midnight() {
        let table = raw(
            &["ID", "Date", "Code INSEE Région", "Région", "TMin (°C)", "TMax (°C)", "TMoy (°C)"],
            &[
                &["a", "2022-01-02", "11", "IDF", "1", "9", "5"],
                &["b", "2022-01-02", "24", "CVL", "3", "11", "7"],
                &["c", "2022-01-01", "11", "IDF", "0", "8", "4"],
            ],
        );
        let cleaned =
            clean_temperature(&table, &[Field::Tmin, Field::Tmax, Field::Tmoy], Origin::Csv).unwrap();
        assert_eq!(cleaned.index(), &[at(1, 0), at(2, 0)]);
        assert_eq!(cleaned.column(Field::Tmoy).unwrap(), &[Some(4.0), Some(6.0)]);
    }

    #[test]
    fn cleaners_are_idempotent() {
        let table = raw(
            &["Date", "Heure", "Consommation (MW)", "Eolien (MW)"],
            &[
                &["2022-01-01", "00:00", "61000,3", "1200"],
                &["2022-01-01", "00:15", "60999,1", ""],
                &["2022-01-01", "02:00", "", "1300"],
            ],
        );
        let cols = [Field::Consommation, Field::Eolien];
        let once = clean_power(&table, &cols, Origin::Csv).unwrap();
        let twice = clean_power(&table_to_raw(&once), &cols, Origin::Csv).unwrap();
        assert_eq!(once, twice);

        let weather = clean_weather(&table_to_raw(&once), &[Field::Eolien], Origin::Api).unwrap();
        assert_eq!(weather.column(Field::Eolien), once.column(Field::Eolien));
    }

    #[test]
    fn drop_missing_rows_yields_dense_frame() {
        let table = raw(
            &["Date", "Heure", "Consommation (MW)"],
            &[&["2022-01-01", "00:00", "1"], &["2022-01-01", "01:00", ""]],
        );
        let cleaned = clean_power(&table, &[Field::Consommation], Origin::Csv).unwrap();
        let dense = drop_missing_rows(&cleaned);
        assert_eq!(dense.len(), 1);
        assert_eq!(dense.column(Field::Consommation).unwrap(), &[1.0]);
    }
}
