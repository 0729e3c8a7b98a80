//! Read/write matrices and vectors as JSON.
//!
//! Matrix files store data row-major:
//!
//! ```json
//! { "rows": 2, "cols": 3, "data": [1, 2, 3, 4, 5, 6] }
//! ```
//!
//! Vector files are `{ "values": [...] }`. Observation error files accept
//! either form (standard deviations or a covariance matrix).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{IesError, IesResult};
use crate::workflow::ObservationErrors;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixFile {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorFile {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ErrorsFile {
    Vector(VectorFile),
    Matrix(MatrixFile),
}

impl MatrixFile {
    pub fn from_matrix(m: &DMatrix<f64>) -> Self {
        // Column-major storage of the transpose is the row-major layout of `m`.
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.transpose().as_slice().to_vec(),
        }
    }

    pub fn into_matrix(self) -> IesResult<DMatrix<f64>> {
        if self.rows.checked_mul(self.cols) != Some(self.data.len()) {
            return Err(IesError::InvalidArgument(format!(
                "Matrix file declares {}x{} but holds {} values.",
                self.rows,
                self.cols,
                self.data.len()
            )));
        }
        Ok(DMatrix::from_row_slice(self.rows, self.cols, &self.data))
    }
}

fn open(path: &Path) -> IesResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        IesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open '{}': {e}", path.display()),
        ))
    })?;
    Ok(BufReader::new(file))
}

pub fn read_matrix_json(path: &Path) -> IesResult<DMatrix<f64>> {
    let file: MatrixFile = serde_json::from_reader(open(path)?)?;
    file.into_matrix()
}

pub fn read_vector_json(path: &Path) -> IesResult<DVector<f64>> {
    let file: VectorFile = serde_json::from_reader(open(path)?)?;
    Ok(DVector::from_vec(file.values))
}

pub fn read_observation_errors(path: &Path) -> IesResult<ObservationErrors> {
    match serde_json::from_reader(open(path)?)? {
        ErrorsFile::Vector(v) => Ok(ObservationErrors::StdDev(DVector::from_vec(v.values))),
        ErrorsFile::Matrix(m) => Ok(ObservationErrors::Covariance(m.into_matrix()?)),
    }
}

/// Write a matrix JSON file.
pub fn write_matrix_json(path: &Path, m: &DMatrix<f64>) -> IesResult<()> {
    let file = File::create(path).map_err(|e| {
        IesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create '{}': {e}", path.display()),
        ))
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &MatrixFile::from_matrix(m))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_file_is_row_major() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let file = MatrixFile::from_matrix(&m);
        assert_eq!(file.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(file.into_matrix().unwrap(), m);
    }

    #[test]
    fn declared_shape_must_match_data() {
        let file = MatrixFile {
            rows: 2,
            cols: 2,
            data: vec![1.0, 2.0, 3.0],
        };
        assert!(matches!(file.into_matrix(), Err(IesError::InvalidArgument(_))));
    }

    #[test]
    fn errors_file_accepts_vector_or_matrix() {
        let dir = tempfile::tempdir().unwrap();

        let vec_path = dir.path().join("sd.json");
        std::fs::write(&vec_path, r#"{"values": [0.5, 1.0]}"#).unwrap();
        assert_eq!(
            read_observation_errors(&vec_path).unwrap(),
            ObservationErrors::StdDev(DVector::from_row_slice(&[0.5, 1.0]))
        );

        let mat_path = dir.path().join("cov.json");
        std::fs::write(&mat_path, r#"{"rows": 1, "cols": 1, "data": [4.0]}"#).unwrap();
        assert_eq!(
            read_observation_errors(&mat_path).unwrap(),
            ObservationErrors::Covariance(DMatrix::from_element(1, 1, 4.0))
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_matrix_json(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, IesError::Io(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
