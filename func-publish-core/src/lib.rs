#![doc = "func-publish-core: core logic library for func-publish."]

//! This crate contains the publish pipeline for Function App projects: choosing
//! which files ship, packaging them, uploading the package, and reconciling app
//! settings. HTTP clients and the terminal prompt live in the CLI crate and plug in
//! through the traits in [`contract`] and [`reconcile::ConflictPrompt`].
//!
//! # Usage
//! Build [`config::PublishOptions`], then drive a [`publish::Publisher`] with
//! implementations of [`contract::RemoteSettings`] and [`contract::BlobStore`].

pub mod archive;
pub mod config;
pub mod contract;
pub mod ignore;
pub mod publish;
pub mod reconcile;
pub mod sas;
pub mod settings;
pub mod storage;
