//! The `SvartSkjaif` custom resource in both of its schema revisions.
//!
//! The resource exists as `v1alpha1` (a spoke, which nests its fields inside a
//! `container` object) and `v1beta1` (the hub, which stores the same fields
//! flat on the spec). Only the hub revision is ever persisted. This crate
//! provides:
//!
//! - the typed revisions in [`v1alpha1`] and [`v1beta1`],
//! - the [`Revision`] marker parsed from an object's `apiVersion`,
//! - the immutable [`SchemaRegistry`] describing both revisions and the
//!   field-level mapping between them,
//! - and the pure conversion engine in [`conversion`].
//!
//! ```
//! use skjaif_crd::{conversion, v1alpha1};
//!
//! let spoke = v1alpha1::SvartSkjaif::new(
//!     "morning",
//!     v1alpha1::SvartSkjaifSpec {
//!         container: v1alpha1::SvartSkjaifContainer {
//!             kaffe: "melk".to_owned(),
//!             kopp: "krus".to_owned(),
//!             vann: "kaldt".to_owned(),
//!         },
//!     },
//! );
//!
//! let hub = conversion::to_hub(spoke.clone());
//! assert_eq!(hub.spec.kaffe, "melk");
//! assert_eq!(conversion::to_spoke(hub), spoke);
//! ```
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod conversion;
pub mod crd;
pub mod registry;
pub mod revision;
pub mod v1alpha1;
pub mod v1beta1;

// Selected re-exports
pub use crate::{
    conversion::VersionedObject,
    registry::{Field, SchemaDescriptor, SchemaRegistry},
    revision::{Revision, Role},
};

/// The API group both revisions are served under.
pub const GROUP: &str = "skjaif.skjaiferator.no";

/// The kind shared by both revisions.
pub const KIND: &str = "SvartSkjaif";

/// The plural name both revisions are served under.
pub const PLURAL: &str = "svartskjaifs";

/// Observed state of a `SvartSkjaif`.
///
/// The status is shared by both revisions and is carried over verbatim
/// during conversion. It currently has no fields and is reserved for future
/// use.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SvartSkjaifStatus {}
