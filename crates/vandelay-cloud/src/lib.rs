//! Vandelay Cloud Plumbing
//!
//! This crate provides the provider-agnostic pieces a Vandelay stack is
//! declared against: late-bound values, the synthesized template model,
//! the provisioning engine seam and local state tracking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 vandelay-core                    │
//! │        (compose → synthesize → deploy)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                vandelay-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Engine Abstraction               │   │
//! │  │  trait ProvisioningEngine { ... }         │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Template   │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼────────────────┐
//! │ external engine        │
//! │ (CloudFormation, etc.) │
//! └────────────────────────┘
//! ```

pub mod deferred;
pub mod error;
pub mod provider;
pub mod state;
pub mod template;

// Re-exports
pub use deferred::Deferred;
pub use error::{CloudError, Result};
pub use provider::{MaterializedStack, ProvisioningEngine};
pub use state::{
    GlobalState, PHYSICAL_NAME_ATTRIBUTE, ProviderState, ResourceState, ResourceStatus, StateLock,
    StateManager,
};
pub use template::{
    AUTO_DELETE_OBJECTS_TAG, RemovalPolicy, Template, TemplateOutput, TemplateResource,
};
