//! Artifact publishing.
//!
//! This crate provides:
//! - The `ArtifactPublisher` capability (`upload(path) -> url`)
//! - An S3-compatible publisher (AWS S3, R2, Spaces, MinIO)
//! - A Google Cloud Storage publisher
//! - A local-directory publisher for development
//! - Publisher selection from configuration

pub mod client;
pub mod error;
pub mod gcs;
pub mod publisher;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use gcs::{GcsConfig, GcsPublisher};
pub use publisher::{publisher_from_env, ArtifactPublisher, LocalDirPublisher, PublisherKind};

#[cfg(any(test, feature = "mock"))]
pub use publisher::MockArtifactPublisher;
