use crate::dataset_loader::DatasetError;

use ndarray::{Array2, Axis};

/// Diffusion weighting of every direction: one b-value and one b-vector
/// per channel of the volume.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionSet {
    b_values: Vec<f64>,
    /// 3 x D, one column per direction
    b_vectors: Array2<f64>,
}

impl DirectionSet {
    /// # Errors
    ///
    /// Returns [`DatasetError::Mismatch`] if the b-vector matrix does not
    /// have one column per b-value, and [`DatasetError::Shape`] if it does
    /// not have three rows.
    pub fn new(b_values: Vec<f64>, b_vectors: Array2<f64>) -> Result<Self, DatasetError> {
        if b_vectors.nrows() != 3 {
            return Err(DatasetError::Shape(format!(
                "b-vectors must have 3 rows, found {}",
                b_vectors.nrows()
            )));
        }
        if b_vectors.ncols() != b_values.len() {
            return Err(DatasetError::Mismatch {
                image: None,
                b_values: b_values.len(),
                b_vectors: b_vectors.ncols(),
            });
        }
        Ok(Self {
            b_values,
            b_vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.b_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b_values.is_empty()
    }

    pub fn b_values(&self) -> &[f64] {
        &self.b_values
    }

    pub fn b_vectors(&self) -> &Array2<f64> {
        &self.b_vectors
    }

    /// b-value and b-vector of one direction
    pub fn get(&self, direction: usize) -> Option<(f64, [f64; 3])> {
        let b_value = *self.b_values.get(direction)?;
        let column = self.b_vectors.column(direction);
        Some((b_value, [column[0], column[1], column[2]]))
    }

    /// Keeps only the given directions, in order
    pub fn select(&self, directions: &[usize]) -> Self {
        Self {
            b_values: directions.iter().map(|&d| self.b_values[d]).collect(),
            b_vectors: self.b_vectors.select(Axis(1), directions),
        }
    }
}

/// Parses an FSL b-values file: floats separated by any whitespace.
pub fn parse_b_values(text: &str) -> Result<Vec<f64>, DatasetError> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| DatasetError::Parse(format!("invalid b-value '{token}'")))
        })
        .collect()
}

/// Parses an FSL b-vectors file into a 3 x D matrix.
///
/// Both the FSL layout (three rows of D values) and the transposed layout
/// (D rows of three values) are accepted.
pub fn parse_b_vectors(text: &str) -> Result<Array2<f64>, DatasetError> {
    let rows: Vec<Vec<f64>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_b_values)
        .collect::<Result<_, _>>()?;

    let width = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != width) {
        return Err(DatasetError::Shape("b-vector rows differ in length".into()));
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let matrix = if rows.len() == 3 {
        Array2::from_shape_vec((3, width), flat)
    } else if width == 3 {
        Array2::from_shape_vec((rows.len(), 3), flat).map(|m| m.reversed_axes())
    } else {
        return Err(DatasetError::Shape(format!(
            "b-vectors must be 3 x D or D x 3, found {} x {width}",
            rows.len()
        )));
    };
    matrix.map_err(|e| DatasetError::Shape(e.to_string()))
}

/// One line of space separated b-values, as FSL expects
pub fn format_b_values(b_values: &[f64]) -> String {
    let mut line = join(b_values.iter());
    line.push('\n');
    line
}

/// Three lines, one per gradient component
pub fn format_b_vectors(b_vectors: &Array2<f64>) -> String {
    b_vectors
        .axis_iter(Axis(0))
        .map(|row| join(row.iter()) + "\n")
        .collect()
}

fn join<'a>(values: impl Iterator<Item = &'a f64>) -> String {
    values
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_b_values_any_whitespace() {
        let values = parse_b_values("0 1000\n1000\t1000   1000\n").unwrap();
        assert_eq!(values, vec![0.0, 1000.0, 1000.0, 1000.0, 1000.0]);
        assert!(matches!(parse_b_values("0 abc"), Err(DatasetError::Parse(_))));
    }

    #[test]
    fn test_parse_b_vectors_both_layouts() {
        let fsl = parse_b_vectors("1 0 0 0.5\n0 1 0 0.5\n0 0 1 0.7071\n").unwrap();
        assert_eq!(fsl.dim(), (3, 4));
        assert_eq!(fsl[[2, 3]], 0.7071);

        let transposed = parse_b_vectors("1 0 0\n0 1 0\n0 0 1\n0.5 0.5 0.7071\n").unwrap();
        assert_eq!(transposed, fsl);
    }

    #[test]
    fn test_parse_b_vectors_rejects_ragged() {
        assert!(matches!(parse_b_vectors("1 0\n0 1 0\n0 0 1\n"), Err(DatasetError::Shape(_))));
        assert!(matches!(parse_b_vectors("1 0\n0 1\n"), Err(DatasetError::Shape(_))));
    }

    #[test]
    fn test_direction_set_counts_must_agree() {
        let vectors = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let err = DirectionSet::new(vec![0.0, 1000.0, 1000.0], vectors.clone()).unwrap_err();
        assert!(matches!(err, DatasetError::Mismatch { b_values: 3, b_vectors: 2, .. }));

        let set = DirectionSet::new(vec![0.0, 1000.0], vectors).unwrap();
        assert_eq!(set.get(1), Some((1000.0, [0.0, 1.0, 0.0])));
        assert_eq!(set.get(2), None);
    }

    #[test]
    fn test_select_and_format() {
        let set = DirectionSet::new(
            vec![0.0, 1000.0, 2000.5],
            array![[1.0, 0.0, 0.6], [0.0, 1.0, 0.8], [0.0, 0.0, 0.0]],
        )
        .unwrap();
        let kept = set.select(&[0, 2]);
        assert_eq!(format_b_values(kept.b_values()), "0 2000.5\n");
        assert_eq!(format_b_vectors(kept.b_vectors()), "1 0.6\n0 0.8\n0 0\n");
    }
}
