//! Module for loading and representing TSP instances.
//!
//! An instance is a named cost matrix, optionally with the city
//! coordinates it was built from. Three sources are supported:
//! - TSPLIB files with a `NODE_COORD_SECTION` (Euclidean 2D)
//! - JSON matrix files (`{"name": ..., "matrix": [[...]]}`, `null` = forbidden edge)
//! - Random Euclidean instances drawn from a seed

use crate::error::{TspError, TspResult};
use crate::matrix::CostMatrix;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

/// Side length of the square random cities are drawn from.
const RANDOM_EXTENT: f64 = 100.0;

/// A city with planar coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier (1-indexed in files, 0-indexed internally)
    pub id: usize,
    pub x: f64,
    pub y: f64,
}

/// A complete TSP instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TspInstance {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// Coordinates, empty for matrix-only instances
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    pub matrix: CostMatrix,
}

impl TspInstance {
    /// Instance from an explicit cost matrix.
    pub fn from_matrix(name: &str, matrix: CostMatrix) -> Self {
        TspInstance {
            name: name.to_string(),
            comment: String::new(),
            nodes: Vec::new(),
            matrix,
        }
    }

    /// Euclidean instance over 2D points.
    pub fn from_coordinates(name: &str, points: &[(f64, f64)]) -> TspResult<Self> {
        let matrix = CostMatrix::euclidean(points)?;
        let nodes = points
            .iter()
            .enumerate()
            .map(|(id, &(x, y))| Node { id, x, y })
            .collect();

        Ok(TspInstance {
            name: name.to_string(),
            comment: String::new(),
            nodes,
            matrix,
        })
    }

    /// Random Euclidean instance, reproducible from `seed`.
    pub fn random(num_cities: usize, seed: u64) -> TspResult<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let points: Vec<(f64, f64)> = (0..num_cities)
            .map(|_| (rng.gen::<f64>() * RANDOM_EXTENT, rng.gen::<f64>() * RANDOM_EXTENT))
            .collect();

        let mut instance = Self::from_coordinates(&format!("random-{}-{}", num_cities, seed), &points)?;
        instance.comment = format!("{} uniform cities in [0, {})^2", num_cities, RANDOM_EXTENT);
        Ok(instance)
    }

    /// Load by extension: `.json` as a matrix file, anything else as TSPLIB.
    pub fn load<P: AsRef<Path>>(path: P) -> TspResult<Self> {
        let is_json = path
            .as_ref()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_tsplib_file(path)
        }
    }

    /// Parse a TSPLIB file with Euclidean node coordinates
    pub fn from_tsplib_file<P: AsRef<Path>>(path: P) -> TspResult<Self> {
        let file = File::open(&path)?;
        let mut instance = Self::parse_tsplib(BufReader::new(file))?;
        if instance.name.is_empty() {
            instance.name = file_stem(path.as_ref());
        }
        Ok(instance)
    }

    /// Parse TSPLIB text from any reader.
    pub fn parse_tsplib<R: BufRead>(reader: R) -> TspResult<Self> {
        let mut name = String::new();
        let mut comment = String::new();
        let mut dimension: Option<usize> = None;
        let mut coords: Vec<(usize, f64, f64)> = Vec::new();
        let mut in_coords = false;
        let mut line_no = 0;

        let parse_error = |line: usize, message: String| TspError::Parse { line, message };

        for line in reader.lines() {
            let line = line?;
            line_no += 1;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if line == "EOF" {
                break;
            }

            if line.starts_with("NODE_COORD_SECTION") {
                in_coords = true;
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                in_coords = false;
                let value = value.trim();
                match key.trim() {
                    "NAME" => name = value.to_string(),
                    "COMMENT" => comment = value.to_string(),
                    "DIMENSION" => {
                        let n = value
                            .parse()
                            .map_err(|_| parse_error(line_no, format!("invalid dimension '{}'", value)))?;
                        dimension = Some(n);
                    }
                    "EDGE_WEIGHT_TYPE" if value != "EUC_2D" => {
                        return Err(parse_error(
                            line_no,
                            format!("unsupported EDGE_WEIGHT_TYPE '{}', only EUC_2D is read", value),
                        ));
                    }
                    _ => {}
                }
                continue;
            }

            if line.ends_with("_SECTION") {
                in_coords = false;
                continue;
            }

            if in_coords {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 3 {
                    return Err(parse_error(line_no, format!("expected 'id x y', got '{}'", line)));
                }
                let id: usize = parts[0]
                    .parse()
                    .map_err(|_| parse_error(line_no, format!("invalid node id '{}'", parts[0])))?;
                let x: f64 = parts[1]
                    .parse()
                    .map_err(|_| parse_error(line_no, format!("invalid x coordinate '{}'", parts[1])))?;
                let y: f64 = parts[2]
                    .parse()
                    .map_err(|_| parse_error(line_no, format!("invalid y coordinate '{}'", parts[2])))?;
                coords.push((id, x, y));
            }
        }

        if coords.is_empty() {
            return Err(parse_error(line_no, "no NODE_COORD_SECTION entries".to_string()));
        }
        if let Some(n) = dimension {
            if n != coords.len() {
                return Err(parse_error(
                    line_no,
                    format!("DIMENSION is {} but {} coordinates were read", n, coords.len()),
                ));
            }
        }

        let points: Vec<(f64, f64)> = coords.iter().map(|&(_, x, y)| (x, y)).collect();
        let matrix = CostMatrix::euclidean(&points)?;
        let nodes = coords
            .iter()
            .enumerate()
            .map(|(i, &(id, x, y))| Node { id: id.checked_sub(1).unwrap_or(i), x, y })
            .collect();

        Ok(TspInstance {
            name,
            comment,
            nodes,
            matrix,
        })
    }

    /// Load a JSON instance. A bare array of rows is accepted too.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TspResult<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum JsonInstance {
            Full(TspInstance),
            Bare(CostMatrix),
        }

        let reader = BufReader::new(File::open(&path)?);
        let instance = match serde_json::from_reader(reader)? {
            JsonInstance::Full(instance) => instance,
            JsonInstance::Bare(matrix) => Self::from_matrix(&file_stem(path.as_ref()), matrix),
        };

        if !instance.nodes.is_empty() && instance.nodes.len() != instance.matrix.dimension() {
            return Err(TspError::invalid_input(format!(
                "{} nodes listed for a {}-city matrix",
                instance.nodes.len(),
                instance.matrix.dimension()
            )));
        }
        Ok(instance)
    }

    /// Write the instance as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> TspResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Number of cities
    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.dimension();
        let mut finite = Vec::with_capacity(n * (n - 1));
        let mut forbidden_edges = 0;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let cost = self.matrix.cost(i, j);
                if cost.is_finite() {
                    finite.push(cost);
                } else {
                    forbidden_edges += 1;
                }
            }
        }

        let avg_cost = if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        let max_cost = finite.iter().cloned().fold(0.0, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            dimension: n,
            symmetric: self.matrix.is_symmetric(),
            forbidden_edges,
            avg_cost,
            max_cost,
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Statistics about a TSP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub symmetric: bool,
    /// Directed edges with infinite cost
    pub forbidden_edges: usize,
    pub avg_cost: f64,
    pub max_cost: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Cities: {}", self.dimension)?;
        writeln!(f, "  Symmetric: {}", self.symmetric)?;
        writeln!(f, "  Forbidden edges: {}", self.forbidden_edges)?;
        writeln!(f, "  Avg edge cost: {:.2}", self.avg_cost)?;
        writeln!(f, "  Max edge cost: {:.2}", self.max_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SQUARE: &str = "\
NAME : square4
COMMENT : unit square
TYPE : TSP
DIMENSION : 4
EDGE_WEIGHT_TYPE : EUC_2D
NODE_COORD_SECTION
1 0.0 0.0
2 1.0 0.0
3 1.0 1.0
4 0.0 1.0
EOF
";

    #[test]
    fn test_parse_tsplib() {
        let instance = TspInstance::parse_tsplib(Cursor::new(SQUARE)).unwrap();

        assert_eq!(instance.name, "square4");
        assert_eq!(instance.comment, "unit square");
        assert_eq!(instance.dimension(), 4);
        assert_eq!(instance.nodes[3], Node { id: 3, x: 0.0, y: 1.0 });
        assert!((instance.matrix.cost(0, 2) - 2f64.sqrt()).abs() < 1e-12);
        assert!((instance.matrix.tour_cost(&[0, 1, 2, 3]) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_error_has_line_number() {
        let text = SQUARE.replace("3 1.0 1.0", "3 1.0 abc");
        match TspInstance::parse_tsplib(Cursor::new(text)) {
            Err(TspError::Parse { line, .. }) => assert_eq!(line, 9),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let text = SQUARE.replace("DIMENSION : 4", "DIMENSION : 5");
        assert!(matches!(
            TspInstance::parse_tsplib(Cursor::new(text)),
            Err(TspError::Parse { .. })
        ));
    }

    #[test]
    fn test_unsupported_weight_type() {
        let text = SQUARE.replace("EUC_2D", "EXPLICIT");
        assert!(matches!(
            TspInstance::parse_tsplib(Cursor::new(text)),
            Err(TspError::Parse { line: 5, .. })
        ));
    }

    #[test]
    fn test_random_is_reproducible() {
        let a = TspInstance::random(12, 7).unwrap();
        let b = TspInstance::random(12, 7).unwrap();
        let c = TspInstance::random(12, 8).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.matrix, c.matrix);
        assert!(a.matrix.is_symmetric());
        assert!(a.nodes.iter().all(|n| (0.0..RANDOM_EXTENT).contains(&n.x)));
    }

    #[test]
    fn test_json_round_trip_keeps_forbidden_edges() {
        let rows = vec![
            vec![0.0, 2.0, f64::INFINITY],
            vec![2.0, 0.0, 1.0],
            vec![3.0, 1.0, 0.0],
        ];
        let instance = TspInstance::from_matrix("tri", CostMatrix::new(rows).unwrap());

        let path = std::env::temp_dir().join(format!("tsp_optim_instance_{}.json", std::process::id()));
        instance.save_json(&path).unwrap();
        let loaded = TspInstance::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, instance);
        assert_eq!(loaded.statistics().forbidden_edges, 1);
    }

    #[test]
    fn test_bare_json_matrix() {
        let path = std::env::temp_dir().join(format!("tsp_optim_bare_{}.json", std::process::id()));
        std::fs::write(&path, "[[0, 1], [1, 0]]").unwrap();
        let loaded = TspInstance::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.dimension(), 2);
        assert!(loaded.name.starts_with("tsp_optim_bare_"));
    }

    #[test]
    fn test_statistics() {
        let instance = TspInstance::from_coordinates("line", &[(0.0, 0.0), (3.0, 4.0)]).unwrap();
        let stats = instance.statistics();
        assert_eq!(stats.dimension, 2);
        assert!(stats.symmetric);
        assert!((stats.max_cost - 5.0).abs() < 1e-12);
        assert!(stats.to_string().contains("Cities: 2"));
    }
}
