//! Warden Security Gateway
//!
//! Ties the authentication and authorization stages into one HTTP security
//! pipeline:
//!
//! - [`SecurityGateway`] - sealed engine built from configuration and application components
//! - [`RequestSecurity`] - per-request state: lazy identity, permission stages, endpoint checks
//! - [`EndpointRegistry`] - routed endpoints with their resolved mechanism and check
//! - [`EventBus`] - authentication and authorization lifecycle events
//! - [`SecurityFailure`] - failure kinds and their HTTP responses
//! - [`security_middleware`] - axum adapter
//!
//! ## Usage
//!
//! ```ignore
//! use security_gateway::{ConfigLoader, DeclarationSite, EndpointDeclaration, SecurityGateway};
//!
//! let config = ConfigLoader::new().with_config_path("warden.yaml").load()?;
//! let gateway = SecurityGateway::builder(config)
//!     .endpoint(
//!         EndpointDeclaration::new(Method::GET, "/orders/{id}", "OrderResource", "get")
//!             .on_type(DeclarationSite::new().check(SecurityCheck::roles(["reader"]))),
//!     )
//!     .build()?;
//! let app = gateway.protect(Router::new().route("/orders/{id}", get(get_order)));
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod endpoint;
pub mod events;
pub mod failure;
pub mod gateway;
pub mod middleware;
pub mod pipeline;

// Re-export main types at crate root
pub use config::{ConfigLoader, WardenConfig};
pub use endpoint::{DeclarationSite, EndpointDeclaration, EndpointRegistry, ResolvedEndpoint};
pub use events::{EventBus, SecurityEvent, SecurityEventKind, SecurityEventObserver};
pub use failure::{FailureHandler, Problem, SecurityFailure};
pub use gateway::{SecurityGateway, SecurityGatewayBuilder};
pub use middleware::{PeerCertificate, security_middleware};
pub use pipeline::RequestSecurity;
