/*!
 * PostgreSQL statistics source
 *
 * Reads the `trips` and `stations` tables of the configured schema with the
 * synchronous `postgres` client. Station positions are PostGIS points.
 */

use super::{log_missing, DatabaseSummary, StatisticsSource};
use crate::config::DatabaseConfig;
use crate::error::{Result, SpokesError};
use crate::model::{PairStatistic, StationCoordinate};
use ::postgres::{Client, NoTls};
use std::collections::{BTreeSet, HashMap};
use tracing::{error, info};

pub struct PostgresSource {
    client: Client,
    schema: String,
}

impl PostgresSource {
    /// Connect using `config`. The schema name is validated before it is
    /// interpolated into any query.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let client = ::postgres::Config::new()
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .application_name("spokes")
            .connect(NoTls)
            .map_err(|e| {
                error!("Database connection failed: {}", e);
                SpokesError::Database(format!(
                    "Cannot connect to {}:{}/{}: {}",
                    config.host, config.port, config.database, e
                ))
            })?;

        info!(
            "Connected to database {} at {}:{}",
            config.database, config.host, config.port
        );
        Ok(Self {
            client,
            schema: config.schema.clone(),
        })
    }

    fn count(&mut self, query: &str) -> Result<u64> {
        let row = self.client.query_one(query, &[])?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }
}

impl StatisticsSource for PostgresSource {
    fn pair_statistics(&mut self, min_trips: u64) -> Result<Vec<PairStatistic>> {
        let query = format!(
            "SELECT departure_station_id, return_station_id, COUNT(*) AS trip_count, \
                    AVG(distance_meters)::float8 AS avg_distance_m, \
                    AVG(duration_seconds)::float8 AS avg_duration_s \
             FROM {}.trips \
             WHERE departure_station_id <> return_station_id \
             GROUP BY departure_station_id, return_station_id \
             HAVING COUNT(*) >= $1 \
             ORDER BY trip_count DESC, departure_station_id, return_station_id",
            self.schema
        );
        let threshold = i64::try_from(min_trips).unwrap_or(i64::MAX);

        let rows = self.client.query(query.as_str(), &[&threshold])?;
        let routes = rows
            .iter()
            .map(|row| {
                let trip_count: i64 = row.try_get(2)?;
                let distance: Option<f64> = row.try_get(3)?;
                let duration: Option<f64> = row.try_get(4)?;
                PairStatistic::new(
                    row.try_get::<_, String>(0)?,
                    row.try_get::<_, String>(1)?,
                    trip_count.max(0) as u64,
                    distance.unwrap_or(0.0),
                    duration.unwrap_or(0.0),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Found {} routes with >= {} trips", routes.len(), min_trips);
        Ok(routes)
    }

    fn station_coordinates(
        &mut self,
        station_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, StationCoordinate>> {
        let query = format!(
            "SELECT station_id, \
                    ST_Y(location::geometry) AS latitude, \
                    ST_X(location::geometry) AS longitude \
             FROM {}.stations \
             WHERE station_id = ANY($1)",
            self.schema
        );
        let ids: Vec<&str> = station_ids.iter().map(String::as_str).collect();

        let rows = self.client.query(query.as_str(), &[&ids])?;
        let mut coordinates = HashMap::with_capacity(rows.len());
        for row in &rows {
            let station_id: String = row.try_get(0)?;
            let coordinate =
                StationCoordinate::new(station_id.clone(), row.try_get(1)?, row.try_get(2)?)?;
            coordinates.insert(station_id, coordinate);
        }

        info!("Fetched coordinates for {} stations", coordinates.len());
        log_missing(station_ids, &coordinates);
        Ok(coordinates)
    }

    fn summary(&mut self) -> Result<DatabaseSummary> {
        let schema = self.schema.clone();
        let summary = DatabaseSummary {
            total_trips: self.count(&format!("SELECT COUNT(*) FROM {}.trips", schema))?,
            unique_stations: self.count(&format!(
                "SELECT COUNT(DISTINCT station_id) FROM {}.stations",
                schema
            ))?,
            unique_departure_stations: self.count(&format!(
                "SELECT COUNT(DISTINCT departure_station_id) FROM {}.trips",
                schema
            ))?,
            unique_return_stations: self.count(&format!(
                "SELECT COUNT(DISTINCT return_station_id) FROM {}.trips",
                schema
            ))?,
            unique_station_pairs: self.count(&format!(
                "SELECT COUNT(*) FROM (\
                     SELECT DISTINCT departure_station_id, return_station_id \
                     FROM {}.trips \
                     WHERE departure_station_id <> return_station_id\
                 ) AS pairs",
                schema
            ))?,
        };

        info!("Database statistics: {}", summary);
        Ok(summary)
    }
}
