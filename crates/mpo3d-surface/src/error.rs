use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("point cloud is empty")]
    EmptyInput,
    #[error("triangulation produced no faces")]
    SurfaceEmpty,
    #[error("invalid surface parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("failed to write mesh to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
