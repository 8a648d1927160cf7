//! Stepform backend clients.
//!
//! This crate provides the two network collaborators of the step-flow engine:
//!
//! - [`FormClient`]: fetches form definitions and stored progress, submits steps
//!   (JSON values and file uploads), persists action write-backs and records events
//! - [`ActionClient`]: executes templated action calls against third-party endpoints
//!
//! Both are configured through [`ClientConfig`], usually read from `STEPFORM_*`
//! environment variables.
//!
//! # Example
//!
//! ```no_run
//! use stepform_api::FormClient;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = FormClient::from_env()?;
//! let definition = client.fetch_form("my-form").await?;
//! println!("{} steps", definition.steps.len());
//! # Ok(())
//! # }
//! ```

mod call;
mod client;
pub mod config;
pub mod payload;

pub use call::ActionClient;
pub use client::FormClient;
pub use config::ClientConfig;
