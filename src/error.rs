use thiserror::Error;

/// Every way a single conversion run can fail.
///
/// All variants are terminal for the current run: the pipeline stops at the
/// first one and no partial archive is produced.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to fetch source document: {0}")]
    Fetch(String),
    #[error("No KML document found in container: {0}")]
    Container(String),
    #[error("Failed to parse KML: {0}")]
    Parse(String),
    #[error("No point coordinates found in document")]
    NoData,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Degenerate viewport: {axis} span is zero")]
    DegenerateViewport { axis: &'static str },
    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
