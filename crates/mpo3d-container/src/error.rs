use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid MPO: {0}")]
    InvalidContainer(&'static str),
    #[error("container holds {0} images, expected a stereo pair")]
    WrongImageCount(u32),
    #[error("image {index} is not a JPEG (attribute {attribute:#010x})")]
    NotJpeg { index: usize, attribute: u32 },
    #[error("{len} bytes at offset {offset} run past the end of a {size}-byte container")]
    Truncated { offset: usize, len: usize, size: usize },
    #[error("image {index} failed to decode: {source}")]
    Jpeg {
        index: usize,
        #[source]
        source: image::ImageError,
    },
}
