//! The conversion gateway of the `SvartSkjaif` resource.
//!
//! The [`ConversionGateway`] is a pure, synchronous adapter: it validates the
//! requested direction, hands every object to the conversion engine of
//! [`skjaif_crd`] and answers with either the complete converted batch or a
//! single structured failure. [`ConversionGateway::review`] speaks the
//! Kubernetes `ConversionReview` protocol, and the
//! [`ConversionWebhookServer`] exposes it over HTTP.
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use skjaif_crd::SchemaRegistry;
//! use skjaif_webhook::ConversionGateway;
//!
//! let gateway = ConversionGateway::new(Arc::new(SchemaRegistry::new()));
//! let converted = gateway
//!     .convert("skjaif.skjaiferator.no/v1beta1", vec![json!({
//!         "apiVersion": "skjaif.skjaiferator.no/v1alpha1",
//!         "kind": "SvartSkjaif",
//!         "metadata": {"name": "morning"},
//!         "spec": {"container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}}
//!     })])
//!     .expect("conversion must succeed");
//!
//! assert_eq!(converted[0]["spec"]["kaffe"], "melk");
//! ```
pub mod gateway;
pub mod review;
pub mod server;

// Selected re-exports
pub use crate::{
    gateway::{ConversionFailure, ConversionGateway, GatewayError, GatewayRequest, GatewayResponse},
    server::{ConversionWebhookError, ConversionWebhookOptions, ConversionWebhookServer},
};
