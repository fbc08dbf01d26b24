// src/config/mod.rs

//! Graph manifests.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest from disk (`loader.rs`).
//! - Validate names, references and kind-specific fields (`validate.rs`).
//! - Turn a validated manifest into a graph (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::{ManifestGraph, build_graph};
pub use loader::{default_manifest_path, load_and_validate, load_from_path};
pub use model::{
    BufferSpec, EdgeSpec, EngineSection, Manifest, NodeKindSpec, NodeMode, NodeSpec, RawManifest,
};
