use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use engine::ResultSink;
use model::{RaceResult, Route};

pub fn load_routes(path: &Path) -> Result<Vec<Route>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let routes = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("decode routes from {}", path.display()))?;
    Ok(routes)
}

pub fn save_routes(routes: &[Route], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), routes)?;
    Ok(())
}

/// File-backed store of every saved route and its race history. Doubles
/// as the engine's result sink: a completed race is appended to the
/// owning route, newest first, and the whole file is rewritten.
pub struct JsonRouteStore {
    path: PathBuf,
}

impl JsonRouteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Vec<Route>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        load_routes(&self.path)
    }

    pub fn save(&self, routes: &[Route]) -> Result<()> {
        save_routes(routes, &self.path)
    }

    pub fn append_result(&self, route_id: Uuid, result: &RaceResult) -> Result<()> {
        let mut routes = self.load()?;
        let route = routes
            .iter_mut()
            .find(|r| r.id == route_id)
            .with_context(|| format!("no route with id {route_id}"))?;

        route.race_history.push(result.clone());
        route.race_history.sort_by(|a, b| b.date.cmp(&a.date));
        self.save(&routes)
    }
}

impl ResultSink for JsonRouteStore {
    fn record(&self, route_id: Uuid, result: &RaceResult) -> Result<()> {
        self.append_result(route_id, result)
    }
}

pub fn export_results_csv(route: &Route, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["Date", "TotalSeconds", "DistanceMeters", "AverageSpeedMps", "Splits"])?;
    for result in &route.race_history {
        w.write_record(&[
            result.date.format(&Rfc3339)?,
            format!("{:.3}", result.total_duration_s),
            format!("{:.1}", result.total_distance_m),
            format!("{:.2}", result.average_speed_mps),
            result
                .segment_durations_s
                .iter()
                .map(|s| format!("{s:.3}"))
                .collect::<Vec<_>>()
                .join("|"),
        ])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Coordinate;
    use time::OffsetDateTime;

    fn result_at(unix: i64) -> RaceResult {
        RaceResult {
            id: Uuid::new_v4(),
            date: OffsetDateTime::from_unix_timestamp(unix).unwrap(),
            total_duration_s: 30.0,
            segment_durations_s: vec![12.3, 17.7],
            total_distance_m: 2224.0,
            average_speed_mps: 74.1,
        }
    }

    fn temp_store(name: &str) -> JsonRouteStore {
        JsonRouteStore::new(std::env::temp_dir().join(name))
    }

    fn route() -> Route {
        Route::new(
            "harbor sprint",
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)],
        )
    }

    #[test]
    fn missing_store_loads_empty() {
        let store = temp_store("race_io_missing.json");
        std::fs::remove_file(&store.path).ok();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn routes_round_trip_and_results_sort_newest_first() {
        let store = temp_store("race_io_round_trip.json");
        let route = route();
        let id = route.id;
        store.save(&[route]).unwrap();

        store.append_result(id, &result_at(2_000)).unwrap();
        store.append_result(id, &result_at(3_000)).unwrap();
        store.append_result(id, &result_at(1_000)).unwrap();

        let routes = store.load().unwrap();
        std::fs::remove_file(&store.path).ok();

        assert_eq!(routes.len(), 1);
        let dates: Vec<i64> = routes[0]
            .race_history
            .iter()
            .map(|r| r.date.unix_timestamp())
            .collect();
        assert_eq!(dates, vec![3_000, 2_000, 1_000]);
    }

    #[test]
    fn appending_to_an_unknown_route_fails() {
        let store = temp_store("race_io_unknown_route.json");
        store.save(&[route()]).unwrap();
        let err = store.append_result(Uuid::new_v4(), &result_at(1_000));
        std::fs::remove_file(&store.path).ok();
        assert!(err.is_err());
    }

    #[test]
    fn exports_history_as_csv() {
        let mut route = route();
        route.race_history.push(result_at(1_700_000_000));
        let path = std::env::temp_dir().join("race_io_export.csv");

        export_results_csv(&route, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(contents.starts_with("Date,TotalSeconds"));
        assert!(contents.contains("12.300|17.700"));
        assert!(contents.contains("30.000"));
    }
}
