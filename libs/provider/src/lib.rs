//! Minecraft edition providers.
//!
//! A [`Provider`] knows which versions of an edition exist, how to fetch and
//! prepare their server resources into a [`StoreLayout`], and how to run the
//! result as a [`mcl_startstop::ManagedProcess`].

mod bundle;
mod check;
mod error;
mod java;
mod provider;
mod server;
mod store;

pub use bundle::Bundle;
pub use check::{check_requirements, ActionRequirements};
pub use error::{ProviderError, StoreError};
pub use java::{JavaProvider, ServerDownload, VersionInfo, LAUNCHER_MANIFEST_URL, SERVER_JAR};
pub use provider::{Edition, Instance, Provider, RunOptions};
pub use server::{JavaServer, DEFAULT_STOP_GRACE};
pub use store::{StoreLayout, DEFAULT_STRUCTURE};
