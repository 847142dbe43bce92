//! File transfer responder.
//!
//! Reads the target file on every trigger and turns it into a [`Frame`].
//! Nothing is cached between triggers, so a file replaced on disk is picked
//! up by the next trigger. The whole file is held in memory while it is sent.

use crate::frame::Frame;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the frame's size field comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SizeSource {
    /// Length of the bytes actually read.
    #[default]
    Content,
    /// File length from a metadata query taken before the read. The file can
    /// change between the query and the read, so the size may not match the
    /// content.
    Metadata,
}

/// Failure to produce a frame. The connection stays open.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("failed to read '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is {size} bytes, larger than a frame can carry", .path.display())]
    FileTooLarge { path: PathBuf, size: u64 },
}

/// Produces transfer frames for one fixed file.
#[derive(Debug, Clone)]
pub struct Responder {
    path: PathBuf,
    size_from: SizeSource,
}

impl Responder {
    pub fn new(path: impl Into<PathBuf>, size_from: SizeSource) -> Self {
        Self {
            path: path.into(),
            size_from,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_from(&self) -> SizeSource {
        self.size_from
    }

    /// Read the target file and build a frame from it.
    pub async fn load(&self) -> Result<Frame, ResponderError> {
        let declared = match self.size_from {
            SizeSource::Metadata => Some(
                tokio::fs::metadata(&self.path)
                    .await
                    .map_err(|source| self.read_error(source))?
                    .len(),
            ),
            SizeSource::Content => None,
        };

        let content = Bytes::from(
            tokio::fs::read(&self.path)
                .await
                .map_err(|source| self.read_error(source))?,
        );

        match declared {
            Some(size) => {
                let size = u32::try_from(size).map_err(|_| ResponderError::FileTooLarge {
                    path: self.path.clone(),
                    size,
                })?;
                Ok(Frame::with_declared_size(size, content))
            }
            None => {
                let len = content.len() as u64;
                Frame::new(content).map_err(|_| ResponderError::FileTooLarge {
                    path: self.path.clone(),
                    size: len,
                })
            }
        }
    }

    fn read_error(&self, source: std::io::Error) -> ResponderError {
        ResponderError::FileRead {
            path: self.path.clone(),
            source,
        }
    }
}
