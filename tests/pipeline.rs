//! End-to-end runs of the pipeline on synthetic source files.

use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conso_forecast::config::{Config, Source};
use conso_forecast::dates;
use conso_forecast::domain::{Field, Frame, Origin, SaveMode};
use conso_forecast::error::PipelineError;
use conso_forecast::io::store;
use conso_forecast::pipeline::{Pipeline, ProcessOutcome};

const REGIONS: [&str; 2] = ["11", "84"];

fn first_day() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 12, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

const DAYS: i64 = 46;

fn comma(v: f64) -> String {
    format!("{v:.1}").replace('.', ",")
}

fn temperature_of(day: i64) -> f64 {
    6.0 + 3.0 * ((day * 5) % 7) as f64 / 7.0
}

/// Half-hourly national feed, the way the open-data export lays it out.
fn power_csv() -> String {
    let mut out = String::from(
        "Périmètre;Nature;Date;Heure;Consommation (MW);Prévision J-1 (MW);Fioul (MW);Charbon (MW);\
         Gaz (MW);Nucléaire (MW);Eolien (MW);Solaire (MW);Hydraulique (MW);Pompage (MW);Bioénergies (MW)\n",
    );
    let steps = DAYS * 48;
    for step in 0..steps {
        let t = first_day() + Duration::minutes(30 * step);
        let day = step / 48;
        let hour = t.hour() as f64 + t.minute() as f64 / 60.0;
        let cons = 62_000.0 + 6_000.0 * (hour / 24.0 * std::f64::consts::TAU).sin()
            - 900.0 * temperature_of(day)
            + 700.0 * (t.weekday().num_days_from_monday() % 5) as f64;
        let mut cells = vec![
            "France".to_string(),
            "Données définitives".to_string(),
            t.format("%Y-%m-%d").to_string(),
            t.format("%H:%M").to_string(),
            format!("{cons:.0}"),
            format!("{:.0}", cons + 400.0),
        ];
        for k in 0..9 {
            cells.push(format!("{}", 1_000 * (k + 1) + (step % 13) as i64));
        }
        out.push_str(&cells.join(";"));
        out.push('\n');
    }
    out
}

/// Daily regional temperatures with decimal commas.
fn temperature_csv() -> String {
    let mut out = String::from("Date;Code INSEE Région;Région;TMin (°C);TMax (°C);TMoy (°C)\n");
    for day in 0..DAYS {
        let d = first_day() + Duration::days(day);
        for (r, code) in REGIONS.iter().enumerate() {
            let tmoy = temperature_of(day) + r as f64;
            out.push_str(&format!(
                "{};{code};Région {code};{};{};{}\n",
                d.format("%Y-%m-%d"),
                comma(tmoy - 3.0 - 0.5 * (day % 3) as f64),
                comma(tmoy + 4.0 + 0.5 * (day % 4) as f64),
                comma(tmoy)
            ));
        }
    }
    out
}

/// Tri-hourly regional readings stamped with their UTC offset.
fn weather_csv() -> String {
    let mut out = String::from(
        "Date;Code INSEE Région;Région;Vitesse Vent Moyenne 10 m (m/s);Rayonnement Solaire Global (W/m²)\n",
    );
    for step in 0..DAYS * 8 {
        let t = first_day() + Duration::hours(3 * step);
        for (r, code) in REGIONS.iter().enumerate() {
            let sun = if (9..=15).contains(&t.hour()) { 120.0 + 10.0 * r as f64 } else { 0.0 };
            out.push_str(&format!(
                "{}+01:00;{code};Région {code};{};{}\n",
                t.format("%Y-%m-%dT%H:%M:%S"),
                comma(4.0 + (step % 5) as f64),
                comma(sun)
            ));
        }
    }
    out
}

fn write_sources(config: &Config) {
    std::fs::create_dir_all(config.raw_folder()).unwrap();
    std::fs::write(config.raw_path(Source::Power), power_csv()).unwrap();
    std::fs::write(config.raw_path(Source::Temperature), temperature_csv()).unwrap();
    std::fs::write(config.raw_path(Source::Weather), weather_csv()).unwrap();
}

/// Configuration under `home` whose download URLs can never be reached.
fn offline_config(home: &Path) -> Config {
    let mut config = Config::rooted_at(home);
    config.power.csv_url = "http://127.0.0.1:9/power.csv".to_string();
    config.temperature.csv_url = "http://127.0.0.1:9/temperature.csv".to_string();
    config.weather.csv_url = "http://127.0.0.1:9/weather.csv".to_string();
    config
}

fn built_pipeline(home: &Path) -> Pipeline {
    let config = offline_config(home);
    write_sources(&config);
    let mut pipeline = Pipeline::new(config);
    assert_eq!(pipeline.process(false, false, Origin::Csv).unwrap(), ProcessOutcome::Rebuilt);
    pipeline
}

#[tokio::test(flavor = "multi_thread")]
async fn cold_start_downloads_and_builds_the_canonical_table() {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/power.csv", power_csv()),
        ("/temperature.csv", temperature_csv()),
        ("/weather.csv", weather_csv()),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let home = tempfile::tempdir().unwrap();
    let mut config = Config::rooted_at(home.path());
    config.power.csv_url = format!("{}/power.csv", server.uri());
    config.temperature.csv_url = format!("{}/temperature.csv", server.uri());
    config.weather.csv_url = format!("{}/weather.csv", server.uri());
    let db = config.db_path();
    let raw: Vec<_> = Source::ALL.iter().map(|s| config.raw_path(*s)).collect();

    // The blocking HTTP client lives and dies on the blocking pool.
    let (index, table) = tokio::task::spawn_blocking(move || {
        let mut pipeline = Pipeline::new(config);
        let outcome = pipeline.process(true, true, Origin::Csv).unwrap();
        assert_eq!(outcome, ProcessOutcome::Rebuilt);
        (
            pipeline.serve_index().unwrap(),
            pipeline.serve(None, None, None, &[]).unwrap(),
        )
    })
    .await
    .unwrap();

    assert!(raw.iter().all(|p| p.exists()));
    assert!(db.exists());

    assert!(!index.is_empty());
    assert!(index.first() <= index.last());
    assert!(index.iter().all(|t| dates::is_hour_aligned(*t)));
    assert!(index.windows(2).all(|w| w[1] - w[0] == Duration::hours(1)));

    let mut expected = vec![
        Field::Consommation,
        Field::PrevisionJ1,
        Field::Fioul,
        Field::Charbon,
        Field::Gaz,
        Field::Nucleaire,
        Field::Eolien,
        Field::Solaire,
        Field::Hydraulique,
        Field::Pompage,
        Field::Bioenergies,
    ];
    expected.extend([Field::Wspd, Field::Sun, Field::Tmin, Field::Tmax, Field::Tmoy]);
    assert_eq!(table.fields(), expected.as_slice());
    // Regions are averaged: 6 + 3·0/7 for region 11, one degree more for 84.
    assert!((table.column(Field::Tmoy).unwrap()[0] - 6.5).abs() < 1e-9);
}

#[test]
fn warm_start_reads_the_database_without_network() {
    let home = tempfile::tempdir().unwrap();
    let rows = built_pipeline(home.path()).serve_index().unwrap().len();

    let config = offline_config(home.path());
    let newest = Source::ALL
        .iter()
        .map(|s| std::fs::metadata(config.raw_path(*s)).unwrap().modified().unwrap())
        .max()
        .unwrap();

    let mut pipeline = Pipeline::new(config);
    assert_eq!(pipeline.process(false, false, Origin::Csv).unwrap(), ProcessOutcome::Loaded);
    assert_eq!(pipeline.serve_index().unwrap().len(), rows);

    let stamp = pipeline.download_timestamp().unwrap();
    assert_eq!(std::time::SystemTime::from(stamp), newest);
}

#[test]
fn missing_database_triggers_one_rebuild_and_sources_are_optional_for_freshness() {
    let home = tempfile::tempdir().unwrap();
    let config = offline_config(home.path());
    built_pipeline(home.path());

    std::fs::remove_file(config.db_path()).unwrap();
    let mut pipeline = Pipeline::new(config.clone());
    assert_eq!(pipeline.process(false, false, Origin::Csv).unwrap(), ProcessOutcome::Rebuilt);
    assert!(config.db_path().exists());

    // Without raw files the database's own mtime is reported.
    for source in Source::ALL {
        std::fs::remove_file(config.raw_path(source)).unwrap();
    }
    let db_mtime = std::fs::metadata(config.db_path()).unwrap().modified().unwrap();
    let stamp = pipeline.download_timestamp().unwrap();
    assert_eq!(std::time::SystemTime::from(stamp), db_mtime);
}

#[test]
fn empty_persisted_table_triggers_one_rebuild() {
    let home = tempfile::tempdir().unwrap();
    let config = offline_config(home.path());
    write_sources(&config);
    store::try_save_table(&Frame::empty(), &config.db_path(), &config.table_name, SaveMode::Replace)
        .unwrap();

    let mut pipeline = Pipeline::new(config.clone());
    assert_eq!(pipeline.process(false, false, Origin::Csv).unwrap(), ProcessOutcome::Rebuilt);
    let rows = pipeline.serve_index().unwrap().len();
    assert!(rows > 0);

    // The rebuild replaced the empty table, so the next start just loads it.
    let mut restarted = Pipeline::new(config);
    assert_eq!(restarted.process(false, false, Origin::Csv).unwrap(), ProcessOutcome::Loaded);
    assert_eq!(restarted.serve_index().unwrap().len(), rows);
}

#[test]
fn rebuild_without_sources_or_network_fails() {
    let home = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(offline_config(home.path()));
    let err = pipeline.process(false, false, Origin::Csv).unwrap_err();
    assert!(matches!(err, PipelineError::Network { .. }));
    assert!(!pipeline.is_ready());
}

#[test]
fn serve_slice_is_a_week_of_hours() {
    let home = tempfile::tempdir().unwrap();
    let pipeline = built_pipeline(home.path());

    let slice = pipeline
        .serve(
            Some(ts(2020, 1, 1)),
            Some(ts(2020, 1, 8)),
            None,
            &[Field::Consommation, Field::Tmoy],
        )
        .unwrap();
    assert_eq!(slice.len(), 168);
    assert_eq!(slice.fields(), &[Field::Consommation, Field::Tmoy]);
    assert!(slice.is_strictly_increasing());
    assert_eq!(slice.first_timestamp(), Some(ts(2020, 1, 1)));

    let one = pipeline.serve(None, None, Some(ts(2020, 1, 2)), &[]).unwrap();
    assert_eq!(one.len(), 1);
}

#[test]
fn time_only_model_forecasts_a_week_within_bounds() {
    let home = tempfile::tempdir().unwrap();
    let mut pipeline = built_pipeline(home.path());
    pipeline.build_models();
    assert!(pipeline.train_model("prophet_time").unwrap());

    let (forecast, forecaster) = pipeline
        .test(ts(2020, 1, 1), ts(2020, 1, 8), &[], "prophet_time")
        .unwrap();
    assert_eq!(forecast.len(), 168);
    for name in ["ds", "yhat", "yhat_lower", "yhat_upper"] {
        assert!(forecast.columns().iter().any(|c| c == name));
    }
    for i in 0..forecast.len() {
        assert!(forecast.yhat_lower[i] <= forecast.yhat[i]);
        assert!(forecast.yhat[i] <= forecast.yhat_upper[i]);
    }
    let last_train = forecaster.df_train().unwrap().last_timestamp().unwrap();
    assert!(last_train < ts(2019, 12, 31));
}

#[test]
fn forgotten_model_recovers_from_its_blob() {
    let home = tempfile::tempdir().unwrap();
    let mut pipeline = built_pipeline(home.path());
    assert!(pipeline.train_model("prophet_temp").unwrap());

    pipeline.registry_mut().forget("prophet_temp").unwrap();
    let (forecast, forecaster) = pipeline
        .test(ts(2020, 1, 1), ts(2020, 1, 8), &[], "prophet_temp")
        .unwrap();
    assert_eq!(forecast.len(), 168);
    // A retrained model would remember its training frame.
    assert!(forecaster.df_train().is_none());
    assert_eq!(forecaster.df_test().unwrap().fields(), &[Field::Consommation, Field::Tmoy]);
}

#[test]
fn retraining_one_model_leaves_the_others_alone() {
    let home = tempfile::tempdir().unwrap();
    let mut pipeline = built_pipeline(home.path());
    assert_eq!(pipeline.train_models().unwrap(), 3);

    let time_blob = home.path().join("models").join("prophet_time.blob");
    let before = std::fs::read(&time_blob).unwrap();

    assert!(pipeline.train_model("prophet_weather").unwrap());
    assert_eq!(std::fs::read(&time_blob).unwrap(), before);
    assert!(home.path().join("models").join("prophet_weather.blob").exists());

    let states: Vec<&str> = pipeline.registry().list().iter().map(|m| m.state).collect();
    assert_eq!(states, ["persisted", "persisted", "persisted"]);
}

#[test]
fn unknown_model_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    let mut pipeline = built_pipeline(home.path());
    let err = pipeline
        .test(ts(2020, 1, 1), ts(2020, 1, 2), &[], "prophet_rain")
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}
