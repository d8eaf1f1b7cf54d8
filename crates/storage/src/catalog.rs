//! PostGIS tile catalog for conserved rasters.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info, instrument};

use worldpop_common::{IntGrid, PopError, PopResult, RasterFileInfo};

use crate::raster_wkb::{encode_tile_hex, DEFAULT_SRID};

/// Tile edge length, matching `raster2pgsql -t 400x400`.
pub const DEFAULT_TILE_SIZE: usize = 400;

/// Cell size every inserted tile is snapped to (~1km at the equator).
pub const STANDARD_SCALE: f64 = 0.00833333329986236;

/// How tiles are written into one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileInsertOptions {
    /// Tile edge length in cells.
    pub tile_size: usize,
    /// SRID stamped on every tile.
    pub srid: i32,
    /// Cast tiles to `32BSI` with `ST_MapAlgebra`, as the production database expects.
    pub cast_to_int32: bool,
}

impl Default for TileInsertOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            srid: DEFAULT_SRID,
            cast_to_int32: true,
        }
    }
}

/// Primary key of one catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileKey {
    /// ISO3 code, uppercase.
    pub iso3_code: String,
    pub tile_number: i32,
    pub year: i32,
    pub gender: String,
    pub age_lower: i32,
}

impl TileKey {
    pub fn new(info: &RasterFileInfo, tile_number: usize) -> Self {
        Self {
            iso3_code: info.iso3.to_uppercase(),
            tile_number: tile_number as i32,
            year: info.year as i32,
            gender: info.gender.as_str().to_string(),
            age_lower: info.age.lower() as i32,
        }
    }
}

/// Tile catalog backed by one PostgreSQL/PostGIS database.
pub struct TileCatalog {
    pool: PgPool,
    name: String,
}

impl TileCatalog {
    /// Connect to a database; `name` labels it in logs.
    pub async fn connect(name: &str, database_url: &str) -> PopResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PopError::DatabaseError(format!("Connection to {} failed: {}", name, e)))?;

        Ok(Self {
            pool,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the `worldpop` table if it does not exist.
    pub async fn migrate(&self) -> PopResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| PopError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Insert every tile of a conserved raster in one transaction.
    ///
    /// Existing rows with the same key are replaced. Returns the number of
    /// tiles written.
    #[instrument(skip(self, grid, options), fields(db = %self.name, file = %info.file_name))]
    pub async fn insert_raster(
        &self,
        info: &RasterFileInfo,
        grid: &IntGrid,
        options: &TileInsertOptions,
    ) -> PopResult<usize> {
        let sql = insert_sql(options.cast_to_int32);
        let age_upper = info.age.upper().map(|v| v as i32);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PopError::DatabaseError(format!("Begin failed: {}", e)))?;

        let mut count = 0;
        for tile in grid.tiles(options.tile_size) {
            let key = TileKey::new(info, tile.index);
            let hex = encode_tile_hex(&tile, options.srid)?;

            sqlx::query(&sql)
                .bind(&key.iso3_code)
                .bind(key.tile_number)
                .bind(key.year)
                .bind(&key.gender)
                .bind(key.age_lower)
                .bind(age_upper)
                .bind(hex)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    PopError::DatabaseError(format!("Insert of tile {} failed: {}", key.tile_number, e))
                })?;

            debug!(tile = key.tile_number, "Inserted tile");
            count += 1;
        }

        tx.commit()
            .await
            .map_err(|e| PopError::DatabaseError(format!("Commit failed: {}", e)))?;

        info!(tiles = count, "Inserted raster tiles");
        Ok(count)
    }
}

/// Snap the tile to the shared ~1km grid, optionally casting to 32-bit.
fn standardize_expr(param: &str, cast_to_int32: bool) -> String {
    let resampled = format!(
        "ST_Resample({}::raster, {}, -{}, 0, 0, 0, 0, 'NearestNeighbor')",
        param, STANDARD_SCALE, STANDARD_SCALE
    );
    if cast_to_int32 {
        format!("ST_MapAlgebra({}, '32BSI', '[rast]')", resampled)
    } else {
        resampled
    }
}

fn insert_sql(cast_to_int32: bool) -> String {
    format!(
        "INSERT INTO worldpop (iso3_code, tile_number, year, gender, age_lower, age_upper, rast) \
         VALUES ($1, $2, $3, $4, $5, $6, {}) \
         ON CONFLICT (iso3_code, tile_number, year, gender, age_lower) \
         DO UPDATE SET age_upper = EXCLUDED.age_upper, rast = EXCLUDED.rast",
        standardize_expr("$7", cast_to_int32)
    )
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;
CREATE EXTENSION IF NOT EXISTS postgis_raster;

CREATE TABLE IF NOT EXISTS worldpop (
    iso3_code VARCHAR(3) NOT NULL,
    tile_number INTEGER NOT NULL,
    year INTEGER NOT NULL,
    gender VARCHAR(1) NOT NULL,
    age_lower INTEGER NOT NULL,
    age_upper INTEGER,
    rast raster,

    PRIMARY KEY (iso3_code, tile_number, year, gender, age_lower)
);

CREATE INDEX IF NOT EXISTS idx_worldpop_country_year ON worldpop(iso3_code, year);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_from_file_info() {
        let info = RasterFileInfo::parse("nga_m_80_2020.tif").unwrap();
        let key = TileKey::new(&info, 7);
        assert_eq!(key.iso3_code, "NGA");
        assert_eq!(key.tile_number, 7);
        assert_eq!(key.gender, "m");
        assert_eq!(key.age_lower, 80);
        assert_eq!(info.age.upper(), None);
    }

    #[test]
    fn test_insert_sql_production_casts() {
        let sql = insert_sql(true);
        assert!(sql.contains("ST_MapAlgebra(ST_Resample($7::raster, 0.00833333329986236, -0.00833333329986236, 0, 0, 0, 0, 'NearestNeighbor'), '32BSI', '[rast]')"));
        assert!(sql.contains("ON CONFLICT (iso3_code, tile_number, year, gender, age_lower)"));
    }

    #[test]
    fn test_insert_sql_development_only_resamples() {
        let sql = insert_sql(false);
        assert!(sql.contains("ST_Resample($7::raster"));
        assert!(!sql.contains("ST_MapAlgebra"));
    }

    #[test]
    fn test_schema_has_primary_key() {
        assert!(SCHEMA_SQL.contains("PRIMARY KEY (iso3_code, tile_number, year, gender, age_lower)"));
    }
}
