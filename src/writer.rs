/*!
 * Route file output
 *
 * Layout under the output directory:
 *
 * ```text
 * routes/
 * ├── top-5.json.gz                 global selection
 * ├── per-station-top-3.json.gz     aggregate selection
 * ├── by-station/
 * │   ├── s030.json.gz
 * │   └── s067.json.gz
 * └── manifest.json
 * ```
 *
 * Every file is written to a temporary sibling and renamed into place.
 */

use crate::config::OutputConfig;
use crate::error::{Result, SpokesError};
use crate::model::RouteGeometry;
use crate::organizer::{DirectedRoute, Direction};
use crate::routing::polyline::PRECISION;
use crate::selection::SelectionStrategy;
use chrono::{SecondsFormat, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const MANIFEST_VERSION: &str = "1.0";

/// Writes route files and the manifest below `OutputConfig::base_dir`
#[derive(Debug, Clone)]
pub struct RouteFileWriter {
    config: OutputConfig,
}

#[derive(Serialize)]
struct StrategyInfo {
    #[serde(rename = "type")]
    kind: &'static str,
    value: serde_json::Value,
}

impl StrategyInfo {
    fn new(strategy: &SelectionStrategy) -> Self {
        let value = match strategy {
            SelectionStrategy::TopN(n) => serde_json::Value::from(n.get()),
            SelectionStrategy::Coverage(pct) => serde_json::Value::from(pct.get()),
        };
        Self {
            kind: strategy.kind(),
            value,
        }
    }
}

#[derive(Serialize)]
struct RouteEntry<'a> {
    route_key: &'a str,
    from: &'a str,
    to: &'a str,
    polyline: &'a str,
    distance_km: f64,
    duration_min: f64,
    bidirectional: bool,
}

impl<'a> From<&'a RouteGeometry> for RouteEntry<'a> {
    fn from(route: &'a RouteGeometry) -> Self {
        RouteEntry {
            route_key: route.canonical_key().as_str(),
            from: route.departure_station_id(),
            to: route.return_station_id(),
            polyline: route.polyline(),
            distance_km: round_to(route.distance_km(), 2),
            duration_min: round_to(route.duration_minutes(), 1),
            bidirectional: true,
        }
    }
}

#[derive(Serialize)]
struct RouteFile<'a> {
    generation_strategy: StrategyInfo,
    routes: Vec<RouteEntry<'a>>,
    count: usize,
}

#[derive(Serialize)]
struct StationEntry<'a> {
    to: &'a str,
    polyline: &'a str,
    direction: Direction,
    bidirectional: bool,
    distance_km: f64,
    duration_min: f64,
}

#[derive(Serialize)]
struct StationFile<'a> {
    station_id: &'a str,
    routes: Vec<StationEntry<'a>>,
    count: usize,
}

/// Run-level counts recorded in the manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestStatistics {
    pub total_routes: usize,
    pub unique_routes: usize,
    pub stations_count: usize,
    pub generation_time_seconds: f64,
    pub success_rate_pct: f64,
}

/// Strategy per scope, `None` when the scope was disabled
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestStrategies {
    pub global: Option<String>,
    pub individual: Option<String>,
    pub aggregate: Option<String>,
}

impl ManifestStrategies {
    pub fn new(
        global: Option<&SelectionStrategy>,
        individual: Option<&SelectionStrategy>,
        aggregate: Option<&SelectionStrategy>,
    ) -> Self {
        Self {
            global: global.map(ToString::to_string),
            individual: individual.map(ToString::to_string),
            aggregate: aggregate.map(ToString::to_string),
        }
    }
}

/// Names of the files written, relative to their directory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestFiles {
    pub global: Option<String>,
    pub aggregate: Option<String>,
    pub station_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestFormat {
    pub encoding: &'static str,
    pub precision: u32,
    pub compression: &'static str,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub generated_at: String,
    pub version: &'static str,
    pub statistics: ManifestStatistics,
    pub strategies: ManifestStrategies,
    pub files: ManifestFiles,
    pub format: ManifestFormat,
}

impl RouteFileWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Create the base and per-station directories
    pub fn setup_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config.base_dir)?;
        fs::create_dir_all(self.config.station_dir())?;
        debug!("Output directories ready under {:?}", self.config.base_dir);
        Ok(())
    }

    fn file_name(&self, stem: &str) -> String {
        if self.config.use_compression {
            format!("{}.json.gz", stem)
        } else {
            format!("{}.json", stem)
        }
    }

    /// `top-5.json.gz`, `top-80pct.json.gz`
    pub fn global_file_name(&self, strategy: &SelectionStrategy) -> String {
        self.file_name(&format!("top-{}", strategy.file_tag()))
    }

    /// `per-station-top-3.json.gz`, `per-station-50pct.json.gz`
    pub fn aggregate_file_name(&self, strategy: &SelectionStrategy) -> String {
        match strategy {
            SelectionStrategy::TopN(_) => {
                self.file_name(&format!("per-station-top-{}", strategy.file_tag()))
            }
            SelectionStrategy::Coverage(_) => {
                self.file_name(&format!("per-station-{}", strategy.file_tag()))
            }
        }
    }

    /// `s030.json.gz`. Ids that could escape the station directory are
    /// rejected.
    pub fn station_file_name(&self, station_id: &str) -> Result<String> {
        if !is_safe_station_id(station_id) {
            return Err(SpokesError::InvalidData(format!(
                "Station id not usable as a file name: {:?}",
                station_id
            )));
        }
        Ok(self.file_name(&format!("s{}", station_id)))
    }

    /// Write the global selection. Returns the file name.
    pub fn write_global(
        &self,
        routes: &[RouteGeometry],
        strategy: &SelectionStrategy,
    ) -> Result<String> {
        let name = self.global_file_name(strategy);
        let bytes = self.write_route_file(&name, routes, strategy)?;
        info!(
            "Wrote {} global routes to {} ({} bytes)",
            routes.len(),
            name,
            bytes
        );
        Ok(name)
    }

    /// Write the aggregate (top routes of every station) selection
    pub fn write_aggregate(
        &self,
        routes: &[RouteGeometry],
        strategy: &SelectionStrategy,
    ) -> Result<String> {
        let name = self.aggregate_file_name(strategy);
        let bytes = self.write_route_file(&name, routes, strategy)?;
        info!(
            "Wrote {} aggregate routes to {} ({} bytes)",
            routes.len(),
            name,
            bytes
        );
        Ok(name)
    }

    fn write_route_file(
        &self,
        name: &str,
        routes: &[RouteGeometry],
        strategy: &SelectionStrategy,
    ) -> Result<u64> {
        let body = RouteFile {
            generation_strategy: StrategyInfo::new(strategy),
            routes: routes.iter().map(RouteEntry::from).collect(),
            count: routes.len(),
        };
        self.write_json(&self.config.base_dir.join(name), &body)
    }

    /// One file per station. Returns the file names in station order.
    pub fn write_stations(
        &self,
        view: &BTreeMap<String, Vec<DirectedRoute>>,
    ) -> Result<Vec<String>> {
        let station_dir = self.config.station_dir();
        let mut names = Vec::with_capacity(view.len());
        let mut total_bytes = 0;

        for (station_id, routes) in view {
            let body = StationFile {
                station_id,
                routes: routes
                    .iter()
                    .map(|route| StationEntry {
                        to: &route.return_station_id,
                        polyline: &route.polyline,
                        direction: route.direction,
                        bidirectional: true,
                        distance_km: round_to(route.distance_km, 2),
                        duration_min: round_to(route.duration_minutes, 1),
                    })
                    .collect(),
                count: routes.len(),
            };

            let name = self.station_file_name(station_id)?;
            total_bytes += self.write_json(&station_dir.join(&name), &body)?;
            names.push(name);
        }

        info!(
            "Wrote {} station files (total: {} bytes)",
            names.len(),
            total_bytes
        );
        Ok(names)
    }

    /// Build the manifest for this writer's format settings
    pub fn manifest(
        &self,
        statistics: ManifestStatistics,
        strategies: ManifestStrategies,
        mut files: ManifestFiles,
    ) -> Manifest {
        files.station_files.sort();
        Manifest {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: MANIFEST_VERSION,
            statistics,
            strategies,
            files,
            format: ManifestFormat {
                encoding: "polyline",
                precision: PRECISION,
                compression: if self.config.use_compression {
                    "gzip"
                } else {
                    "none"
                },
            },
        }
    }

    /// Write `manifest.json` (always uncompressed, pretty-printed)
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = self.config.manifest_path();
        let json = serde_json::to_vec_pretty(manifest)?;
        atomic_write(&path, |out| Ok(out.write_all(&json)?))?;
        info!("Wrote manifest: {:?}", path);
        Ok(path)
    }

    /// Serialize `value` to `path`; gzip-compact or plain-pretty depending
    /// on the config. Returns the size on disk.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<u64> {
        if self.config.use_compression {
            let level = Compression::new(self.config.compression_level);
            atomic_write(path, |out| {
                let mut encoder = GzEncoder::new(out, level);
                serde_json::to_writer(&mut encoder, value)?;
                encoder.finish()?;
                Ok(())
            })?;
        } else {
            atomic_write(path, |out| {
                serde_json::to_writer_pretty(&mut *out, value)?;
                Ok(())
            })?;
        }
        Ok(fs::metadata(path)?.len())
    }
}

/// Write through a temporary file in the target directory, then rename
fn atomic_write<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    let dir = path
        .parent()
        .ok_or_else(|| SpokesError::Other(format!("No parent directory for {:?}", path)))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(&mut temp);
        write(&mut out)?;
        out.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| SpokesError::Io(e.error))?;
    Ok(())
}

/// Read a JSON file written by [`RouteFileWriter`], gzip or plain
pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let bytes = fs::read(path)?;
    let is_gzip = path.extension().is_some_and(|ext| ext == "gz");
    if is_gzip {
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn is_safe_station_id(station_id: &str) -> bool {
    !station_id.is_empty()
        && !station_id.contains("..")
        && !station_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CanonicalKey;
    use tempfile::TempDir;

    fn writer(dir: &TempDir, compress: bool) -> RouteFileWriter {
        let writer = RouteFileWriter::new(OutputConfig {
            base_dir: dir.path().join("routes"),
            use_compression: compress,
            ..Default::default()
        });
        writer.setup_directories().unwrap();
        writer
    }

    fn route(from: &str, to: &str) -> RouteGeometry {
        RouteGeometry::new(from, to, "_p~iF~ps|U", 2.5149, 10.04).unwrap()
    }

    #[test]
    fn test_file_names() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, true);
        let top = SelectionStrategy::top_n(5).unwrap();
        let pct = SelectionStrategy::coverage(80.0).unwrap();

        assert_eq!(w.global_file_name(&top), "top-5.json.gz");
        assert_eq!(w.global_file_name(&pct), "top-80pct.json.gz");
        assert_eq!(w.aggregate_file_name(&top), "per-station-top-5.json.gz");
        assert_eq!(w.aggregate_file_name(&pct), "per-station-80pct.json.gz");
        assert_eq!(w.station_file_name("030").unwrap(), "s030.json.gz");

        let plain = writer(&dir, false);
        assert_eq!(plain.global_file_name(&top), "top-5.json");
    }

    #[test]
    fn test_global_file_contents() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, true);
        let strategy = SelectionStrategy::top_n(5).unwrap();

        let name = w.write_global(&[route("030", "067")], &strategy).unwrap();
        let json = read_json_file(&dir.path().join("routes").join(name)).unwrap();

        assert_eq!(json["generation_strategy"]["type"], "top_n");
        assert_eq!(json["generation_strategy"]["value"], 5);
        assert_eq!(json["count"], 1);
        let entry = &json["routes"][0];
        assert_eq!(entry["route_key"], "030-067");
        assert_eq!(entry["from"], "030");
        assert_eq!(entry["to"], "067");
        assert_eq!(entry["distance_km"], 2.51);
        assert_eq!(entry["duration_min"], 10.0);
        assert_eq!(entry["bidirectional"], true);
    }

    #[test]
    fn test_station_files() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, false);

        let mut view = BTreeMap::new();
        view.insert(
            "067".to_string(),
            vec![DirectedRoute {
                canonical_key: CanonicalKey::new("030", "067"),
                departure_station_id: "067".to_string(),
                return_station_id: "030".to_string(),
                polyline: "abc".to_string(),
                direction: Direction::Reverse,
                distance_km: 2.5,
                duration_minutes: 10.0,
            }],
        );

        let names = w.write_stations(&view).unwrap();
        assert_eq!(names, vec!["s067.json".to_string()]);

        let json = read_json_file(&dir.path().join("routes/by-station/s067.json")).unwrap();
        assert_eq!(json["station_id"], "067");
        assert_eq!(json["count"], 1);
        assert_eq!(json["routes"][0]["to"], "030");
        assert_eq!(json["routes"][0]["direction"], "reverse");
    }

    #[test]
    fn test_station_ids_cannot_escape_directory() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, true);

        assert_eq!(w.station_file_name("A-12_b").unwrap(), "sA-12_b.json.gz");
        for bad in ["", "../x", "a/b", "..", "a\\b", "c:d", "a\nb"] {
            assert!(w.station_file_name(bad).is_err(), "{:?} accepted", bad);
        }

        let mut view = BTreeMap::new();
        view.insert("../escape".to_string(), Vec::new());
        let err = w.write_stations(&view).unwrap_err();
        assert!(matches!(err, SpokesError::InvalidData(_)));
        assert!(!dir.path().join("routes/sescape.json.gz").exists());
    }

    #[test]
    fn test_manifest() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, true);
        let top = SelectionStrategy::top_n(5).unwrap();

        let manifest = w.manifest(
            ManifestStatistics {
                total_routes: 2,
                unique_routes: 2,
                stations_count: 2,
                generation_time_seconds: 1.5,
                success_rate_pct: 100.0,
            },
            ManifestStrategies::new(Some(&top), None, None),
            ManifestFiles {
                global: Some("top-5.json.gz".to_string()),
                aggregate: None,
                station_files: vec!["s067.json.gz".to_string(), "s030.json.gz".to_string()],
            },
        );
        let path = w.write_manifest(&manifest).unwrap();
        let json = read_json_file(&path).unwrap();

        assert_eq!(json["version"], "1.0");
        assert!(json["generated_at"].as_str().unwrap().ends_with('Z'));
        assert_eq!(json["strategies"]["global"], "Top 5 routes");
        assert!(json["strategies"]["individual"].is_null());
        assert_eq!(json["files"]["station_files"][0], "s030.json.gz");
        assert_eq!(json["format"]["precision"], 6);
        assert_eq!(json["format"]["compression"], "gzip");
    }

    #[test]
    fn test_rewrite_replaces_file() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, true);
        let strategy = SelectionStrategy::top_n(5).unwrap();

        w.write_global(&[route("030", "067"), route("030", "045")], &strategy)
            .unwrap();
        let name = w.write_global(&[route("030", "067")], &strategy).unwrap();

        let json = read_json_file(&dir.path().join("routes").join(name)).unwrap();
        assert_eq!(json["count"], 1);
        // no temp files left behind
        let leftovers = fs::read_dir(dir.path().join("routes"))
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name();
                name.to_string_lossy().starts_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.5149, 2), 2.51);
        assert_eq!(round_to(10.04, 1), 10.0);
    }
}
