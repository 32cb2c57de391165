/// The error type shared by all registration crates.
///
/// Per-candidate numeric failures inside keypoint detection and descriptor
/// extraction are never surfaced through this type; those candidates are
/// silently dropped. Errors here are cross-cutting: they are fatal to the
/// current operation but never to the process.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad volume dimensions {got:?}: {requirement}")]
    BadDimensions {
        got: (usize, usize, usize, usize),
        requirement: &'static str,
    },
    #[error("numeric failure in {context}")]
    Numeric { context: &'static str },
    #[error("consensus found {found} inliers, but at least {needed} are required")]
    InsufficientInliers { found: usize, needed: usize },
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error("transform i/o failed")]
    Io(#[from] std::io::Error),
    #[error("could not parse transform matrix: {0}")]
    Parse(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
