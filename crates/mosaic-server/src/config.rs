use mosaic_core::guard::{
    DEFAULT_CELL_SIZE, DEFAULT_MAX_COORDINATE, DEFAULT_MAX_EXTENT, GuardConfig,
};
use mosaic_core::snap::SnapConfig;
use mosaic_core::{DEFAULT_TOLERANCE, FileStorage};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// A tile of the largest extent may span at most this many cells per axis.
const MAX_CELLS_PER_EXTENT: f64 = 64.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Explicit listen address; overrides `port` when set.
    pub bind: Option<SocketAddr>,
    pub data_dir: PathBuf,
    /// Credential required for deletion. `None` disables deletion entirely.
    pub secret: Option<String>,
    pub max_image_size: usize,
    pub guard: GuardConfig,
    pub snap: SnapConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            data_dir: PathBuf::from("./data"),
            secret: None,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            guard: GuardConfig::default(),
            snap: SnapConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let guard = sanitize_guard(GuardConfig {
            tolerance: parse_or(&lookup, "OVERLAP_TOLERANCE", DEFAULT_TOLERANCE),
            cell_size: parse_or(&lookup, "CELL_SIZE", DEFAULT_CELL_SIZE),
            max_extent: parse_or(&lookup, "MAX_TILE_EXTENT", DEFAULT_MAX_EXTENT),
            max_coordinate: parse_or(&lookup, "MAX_COORDINATE", DEFAULT_MAX_COORDINATE),
            ..GuardConfig::default()
        });
        // Snapping validates against the same tolerance the guard enforces.
        let snap = SnapConfig {
            threshold: parse_or(&lookup, "SNAP_THRESHOLD", SnapConfig::default().threshold),
            tolerance: guard.tolerance,
            ..SnapConfig::default()
        };

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| FileStorage::default_path().ok())
            .unwrap_or_else(|| PathBuf::from("./data"));

        Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            bind: lookup("BIND").and_then(|value| match value.trim().parse() {
                Ok(addr) => Some(addr),
                Err(err) => {
                    tracing::warn!("Invalid BIND='{}': {}. Using PORT instead", value, err);
                    None
                }
            }),
            data_dir,
            secret: lookup("MOSAIC_SECRET").filter(|s| !s.is_empty()),
            max_image_size: parse_or(&lookup, "MAX_IMAGE_SIZE", DEFAULT_MAX_IMAGE_SIZE),
            guard,
            snap,
        }
    }

    /// Address the server listens on.
    pub fn bind_address(&self) -> SocketAddr {
        self.bind
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.port)))
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Limits must be positive, and cells may not be so small that one tile
/// covers an unbounded number of them.
fn sanitize_guard(mut guard: GuardConfig) -> GuardConfig {
    let defaults = GuardConfig::default();
    if !(guard.max_extent.is_finite() && guard.max_extent > 0.0) {
        tracing::warn!("Ignoring invalid MAX_TILE_EXTENT {}", guard.max_extent);
        guard.max_extent = defaults.max_extent;
    }
    if !(guard.max_coordinate.is_finite() && guard.max_coordinate > 0.0) {
        tracing::warn!("Ignoring invalid MAX_COORDINATE {}", guard.max_coordinate);
        guard.max_coordinate = defaults.max_coordinate;
    }
    if !(guard.cell_size.is_finite() && guard.cell_size > 0.0) {
        tracing::warn!("Ignoring invalid CELL_SIZE {}", guard.cell_size);
        guard.cell_size = defaults.cell_size;
    }
    let min_cell = guard.max_extent / MAX_CELLS_PER_EXTENT;
    if guard.cell_size < min_cell {
        tracing::warn!(
            "CELL_SIZE {} is too small for MAX_TILE_EXTENT {}; using {}",
            guard.cell_size,
            guard.max_extent,
            min_cell
        );
        guard.cell_size = min_cell;
    }
    if !(guard.tolerance.is_finite() && guard.tolerance >= 0.0) {
        tracing::warn!("Ignoring invalid OVERLAP_TOLERANCE {}", guard.tolerance);
        guard.tolerance = defaults.tolerance;
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATA_DIR", "/tmp/mosaic")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/mosaic"));
        assert_eq!(config.secret, None);
        assert_eq!(config.max_image_size, DEFAULT_MAX_IMAGE_SIZE);
        assert_eq!(config.guard, GuardConfig::default());
        assert_eq!(config.snap, SnapConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:3030".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("MOSAIC_SECRET", "hunter2"),
            ("MAX_IMAGE_SIZE", "1024"),
            ("OVERLAP_TOLERANCE", "0.5"),
            ("SNAP_THRESHOLD", "40"),
            ("CELL_SIZE", "256"),
            ("MAX_TILE_EXTENT", "4096"),
            ("MAX_COORDINATE", "1000000"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.secret.as_deref(), Some("hunter2"));
        assert_eq!(config.max_image_size, 1024);
        assert_eq!(config.guard.tolerance, 0.5);
        assert_eq!(config.snap.tolerance, 0.5);
        assert_eq!(config.snap.threshold, 40.0);
        assert_eq!(config.guard.cell_size, 256.0);
        assert_eq!(config.guard.max_extent, 4096.0);
        assert_eq!(config.guard.max_coordinate, 1.0e6);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[
            ("PORT", "not-a-port"),
            ("CELL_SIZE", "-3"),
            ("BIND", "nowhere"),
            ("MOSAIC_SECRET", ""),
        ]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.guard.cell_size, DEFAULT_CELL_SIZE);
        assert_eq!(config.bind, None);
        assert_eq!(config.secret, None);
    }

    #[test]
    fn test_tiny_cell_size_is_raised() {
        let tiny = config(&[("CELL_SIZE", "0.001"), ("MAX_COORDINATE", "-1")]);
        assert_eq!(tiny.guard.cell_size, DEFAULT_MAX_EXTENT / 64.0);
        assert_eq!(tiny.guard.max_coordinate, DEFAULT_MAX_COORDINATE);

        let small = config(&[("CELL_SIZE", "100"), ("MAX_TILE_EXTENT", "1000")]);
        assert_eq!(small.guard.cell_size, 100.0);
    }

    #[test]
    fn test_bind_overrides_port() {
        let config = config(&[("PORT", "9000"), ("BIND", "127.0.0.1:4000")]);
        assert_eq!(config.bind_address(), "127.0.0.1:4000".parse::<SocketAddr>().unwrap());
    }
}
