//! Elevations from local SRTM `.hgt` tiles
//!
//! Each tile covers one degree square; the file name encodes its south-west
//! corner (`N45W001.hgt` covers lat 45..46, lng -1..0). Samples are row-major
//! big-endian `i16`, row 0 northernmost. SRTM1 tiles have 3601 samples per
//! side, SRTM3 tiles 1201. `-32768` marks a void.

use floodwise_common::LatLng;
use futures::future::BoxFuture;
use futures::FutureExt;
use rustc_hash::FxHashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use super::{ElevationSource, ProviderError};

const SRTM_VOID: i16 = -32768;
const SRTM1_SAMPLES: usize = 3601;
const SRTM3_SAMPLES: usize = 1201;

/// One degree-square elevation grid
#[derive(Debug, Clone)]
pub struct SrtmTile {
    lat_sw: i16,
    lng_sw: i16,
    samples: usize,
    data: Vec<i16>,
}

impl SrtmTile {
    /// Build a tile from raw samples; `data.len()` must be a perfect square
    pub fn new(lat_sw: i16, lng_sw: i16, data: Vec<i16>) -> Result<Self, ProviderError> {
        let samples = (data.len() as f64).sqrt() as usize;
        if samples < 2 || samples * samples != data.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "tile ({lat_sw}, {lng_sw}) has {} samples, not a square grid",
                data.len()
            )));
        }
        Ok(Self {
            lat_sw,
            lng_sw,
            samples,
            data,
        })
    }

    fn sample(&self, row: usize, col: usize) -> Option<f64> {
        match self.data.get(row * self.samples + col) {
            Some(&v) if v != SRTM_VOID => Some(v as f64),
            _ => None,
        }
    }

    /// Bilinear interpolation; `None` outside the tile or next to a void
    fn interpolate(&self, lat: f64, lng: f64) -> Option<f64> {
        let frac_lat = lat - self.lat_sw as f64;
        let frac_lng = lng - self.lng_sw as f64;
        if !(0.0..=1.0).contains(&frac_lat) || !(0.0..=1.0).contains(&frac_lng) {
            return None;
        }

        let intervals = (self.samples - 1) as f64;
        let row_f = (1.0 - frac_lat) * intervals;
        let col_f = frac_lng * intervals;

        // keep a full 2x2 cell on the last row/column
        let row0 = (row_f.floor() as usize).min(self.samples - 2);
        let col0 = (col_f.floor() as usize).min(self.samples - 2);

        let v00 = self.sample(row0, col0)?;
        let v01 = self.sample(row0, col0 + 1)?;
        let v10 = self.sample(row0 + 1, col0)?;
        let v11 = self.sample(row0 + 1, col0 + 1)?;

        let dr = row_f - row0 as f64;
        let dc = col_f - col0 as f64;
        let top = v00 + (v01 - v00) * dc;
        let bottom = v10 + (v11 - v10) * dc;
        Some(top + (bottom - top) * dr)
    }
}

/// South-west corner encoded in an `.hgt` file name such as `S12W077.hgt`
pub fn parse_hgt_filename(filename: &str) -> Option<(i16, i16)> {
    let stem = filename
        .strip_suffix(".hgt")
        .or_else(|| filename.strip_suffix(".HGT"))
        .unwrap_or(filename);
    if stem.len() != 7 || !stem.is_ascii() {
        return None;
    }

    let lat_sign = match &stem[0..1] {
        "N" | "n" => 1,
        "S" | "s" => -1,
        _ => return None,
    };
    let lng_sign = match &stem[3..4] {
        "E" | "e" => 1,
        "W" | "w" => -1,
        _ => return None,
    };
    let lat: i16 = stem[1..3].parse().ok()?;
    let lng: i16 = stem[4..7].parse().ok()?;
    Some((lat_sign * lat, lng_sign * lng))
}

fn load_tile(path: &Path) -> Result<SrtmTile, ProviderError> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let (lat_sw, lng_sw) = parse_hgt_filename(name)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not an SRTM tile name: {name}")))?;

    let mut file = fs::File::open(path)?;
    let samples = match file.metadata()?.len() {
        n if n == (SRTM1_SAMPLES * SRTM1_SAMPLES * 2) as u64 => SRTM1_SAMPLES,
        n if n == (SRTM3_SAMPLES * SRTM3_SAMPLES * 2) as u64 => SRTM3_SAMPLES,
        n => {
            return Err(ProviderError::InvalidResponse(format!(
                "{name}: unexpected size {n} bytes"
            )))
        }
    };

    let mut buf = vec![0u8; samples * samples * 2];
    file.read_exact(&mut buf)?;
    let data = buf
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    SrtmTile::new(lat_sw, lng_sw, data)
}

/// Elevation source over a set of loaded SRTM tiles
#[derive(Debug, Clone, Default)]
pub struct SrtmSource {
    tiles: FxHashMap<(i16, i16), SrtmTile>,
}

impl SrtmSource {
    /// Load every `.hgt` file in `dir` (not recursive)
    pub fn load_from_dir(dir: &Path) -> Result<Self, ProviderError> {
        let mut tiles = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_hgt = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("hgt"));
            if path.is_file() && is_hgt {
                let tile = load_tile(&path)?;
                tracing::debug!(lat = tile.lat_sw, lng = tile.lng_sw, samples = tile.samples, "loaded SRTM tile");
                tiles.push(tile);
            }
        }
        tracing::info!(dir = %dir.display(), tiles = tiles.len(), "SRTM tiles ready");
        Ok(Self::from_tiles(tiles))
    }

    pub fn from_tiles(tiles: Vec<SrtmTile>) -> Self {
        Self {
            tiles: tiles.into_iter().map(|t| ((t.lat_sw, t.lng_sw), t)).collect(),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Interpolated elevation, `None` without coverage.
    ///
    /// Points on a tile's north or east edge fall back to the neighbouring
    /// tile below or to the left when the primary tile is missing.
    pub fn elevation_at(&self, lat: f64, lng: f64) -> Option<f64> {
        let tile_lat = lat.floor() as i16;
        let tile_lng = lng.floor() as i16;
        let on_lat_edge = lat == lat.floor();
        let on_lng_edge = lng == lng.floor();

        let candidates = [
            Some((tile_lat, tile_lng)),
            on_lat_edge.then_some((tile_lat - 1, tile_lng)),
            on_lng_edge.then_some((tile_lat, tile_lng - 1)),
            (on_lat_edge && on_lng_edge).then_some((tile_lat - 1, tile_lng - 1)),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter_map(|key| self.tiles.get(&key))
            .find_map(|tile| tile.interpolate(lat, lng))
    }
}

impl ElevationSource for SrtmSource {
    fn elevations<'a>(
        &'a self,
        coords: &'a [LatLng],
    ) -> BoxFuture<'a, Result<Vec<Option<f64>>, ProviderError>> {
        let elevations = coords.iter().map(|c| self.elevation_at(c.lat, c.lng)).collect();
        futures::future::ready(Ok(elevations)).boxed()
    }
}
