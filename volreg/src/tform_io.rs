//! Reading and writing the transform interchange format: a 3x4 row-major
//! matrix as whitespace-separated ASCII, one row per line.

use std::fs;
use std::path::Path;
use volreg_core::{Affine, Result};

/// Write a transform to a file in the interchange format.
pub fn write_affine(path: impl AsRef<Path>, tform: &Affine) -> Result<()> {
    fs::write(path, tform.to_string())?;
    Ok(())
}

/// Read a transform from a file in the interchange format.
pub fn read_affine(path: impl AsRef<Path>) -> Result<Affine> {
    fs::read_to_string(path)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};
    use volreg_core::Error;

    #[test]
    fn file_round_trip_is_exact() {
        let tform = Affine::from_parts(
            Matrix3::new(0.99, 0.087, 0.0, -0.087, 0.99, 0.0, 0.0, 0.0, 1.0),
            Vector3::new(1.25, -0.5, 3.0),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("affine.txt");
        write_affine(&path, &tform).unwrap();
        assert_eq!(read_affine(&path).unwrap(), tform);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_affine(dir.path().join("absent.txt")),
            Err(Error::Io(_))
        ));
    }
}
