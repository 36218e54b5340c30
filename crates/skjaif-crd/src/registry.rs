//! An explicit, immutable description of both schema revisions.
//!
//! The [`SchemaRegistry`] is built once at process start and handed to the
//! conversion gateway and the reconciler by reference. It answers two
//! questions: which revisions exist (and which one is the hub), and how the
//! three logical fields are laid out in each revision.
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::IntoEnumIterator as _;

use crate::{
    GROUP, KIND, PLURAL,
    revision::{ParseRevisionError, Revision, Role},
    v1alpha1, v1beta1,
};

#[derive(Debug, Snafu)]
pub enum ShapeError {
    #[snafu(display("spec must be an object"))]
    SpecNotAnObject,

    #[snafu(display("field {field:?} is not part of the {revision} spec"))]
    UnexpectedField { field: String, revision: Revision },

    #[snafu(display("{container:?} of the {revision} spec must be an object"))]
    ContainerNotAnObject {
        container: &'static str,
        revision: Revision,
    },

    #[snafu(display("required field {field:?} of the {revision} spec is missing"))]
    MissingField {
        field: &'static str,
        revision: Revision,
    },
}

#[derive(Debug, Snafu)]
#[snafu(display("failed to resolve api version {api_version:?}"))]
pub struct ResolveError {
    source: ParseRevisionError,
    api_version: String,
}

/// One of the three logical fields both revisions carry.
///
/// Every field has the same wire name in both revisions. The hub stores it
/// directly on the spec, the spoke nests it below `container`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Coffee,
    Cup,
    Water,
}

impl Field {
    /// The JSON name of the field.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Coffee => "kaffe",
            Self::Cup => "kopp",
            Self::Water => "vann",
        }
    }

    pub fn hub<'a>(&self, spec: &'a v1beta1::SvartSkjaifSpec) -> &'a str {
        match self {
            Self::Coffee => &spec.kaffe,
            Self::Cup => &spec.kopp,
            Self::Water => &spec.vann,
        }
    }

    pub fn hub_mut<'a>(&self, spec: &'a mut v1beta1::SvartSkjaifSpec) -> &'a mut String {
        match self {
            Self::Coffee => &mut spec.kaffe,
            Self::Cup => &mut spec.kopp,
            Self::Water => &mut spec.vann,
        }
    }

    pub fn spoke<'a>(&self, spec: &'a v1alpha1::SvartSkjaifSpec) -> &'a str {
        match self {
            Self::Coffee => &spec.container.kaffe,
            Self::Cup => &spec.container.kopp,
            Self::Water => &spec.container.vann,
        }
    }

    pub fn spoke_mut<'a>(&self, spec: &'a mut v1alpha1::SvartSkjaifSpec) -> &'a mut String {
        match self {
            Self::Coffee => &mut spec.container.kaffe,
            Self::Cup => &mut spec.container.kopp,
            Self::Water => &mut spec.container.vann,
        }
    }

    /// The path of the field below `spec` in the given revision, eg.
    /// `container.kaffe` for the spoke.
    pub fn path(&self, revision: Revision) -> String {
        match revision.role() {
            Role::Hub => self.wire_name().to_owned(),
            Role::Spoke => format!(
                "{container}.{field}",
                container = SPOKE_CONTAINER,
                field = self.wire_name()
            ),
        }
    }
}

const SPOKE_CONTAINER: &str = "container";
const HUB_SPEC_KEYS: &[&str] = &["kaffe", "kopp", "vann"];
const SPOKE_SPEC_KEYS: &[&str] = &[SPOKE_CONTAINER];
const SPOKE_CONTAINER_KEYS: &[&str] = HUB_SPEC_KEYS;

/// Describes the spec layout of a single revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub revision: Revision,

    /// Keys which may appear directly below `spec`.
    pub spec_keys: &'static [&'static str],

    /// Keys which must appear directly below `spec`.
    pub required_spec_keys: &'static [&'static str],

    /// The nested object below `spec` and the keys which may appear in it.
    pub container: Option<(&'static str, &'static [&'static str])>,
}

impl SchemaDescriptor {
    fn for_revision(revision: Revision) -> Self {
        match revision.role() {
            Role::Hub => Self {
                revision,
                spec_keys: HUB_SPEC_KEYS,
                required_spec_keys: &[],
                container: None,
            },
            Role::Spoke => Self {
                revision,
                spec_keys: SPOKE_SPEC_KEYS,
                required_spec_keys: SPOKE_SPEC_KEYS,
                container: Some((SPOKE_CONTAINER, SPOKE_CONTAINER_KEYS)),
            },
        }
    }

    pub fn role(&self) -> Role {
        self.revision.role()
    }

    pub fn api_version(&self) -> String {
        self.revision.api_version()
    }

    /// Checks that an untyped `spec` value has the shape of this revision.
    ///
    /// This catches objects whose declared `apiVersion` does not match their
    /// payload, for example a flat hub spec labelled as `v1alpha1`, and
    /// unknown keys which would otherwise be dropped by the conversion.
    pub fn check_shape(&self, spec: &Value) -> Result<(), ShapeError> {
        let spec: &Map<String, Value> = spec.as_object().context(SpecNotAnObjectSnafu)?;
        self.check_keys(spec, self.spec_keys, None)?;

        for field in self.required_spec_keys {
            ensure!(
                spec.contains_key(*field),
                MissingFieldSnafu {
                    field: *field,
                    revision: self.revision
                }
            );
        }

        if let Some((container, keys)) = self.container
            && let Some(nested) = spec.get(container)
        {
            let nested = nested.as_object().context(ContainerNotAnObjectSnafu {
                container,
                revision: self.revision,
            })?;
            self.check_keys(nested, keys, Some(container))?;
        }

        Ok(())
    }

    fn check_keys(
        &self,
        object: &Map<String, Value>,
        allowed: &[&str],
        parent: Option<&str>,
    ) -> Result<(), ShapeError> {
        match object.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => UnexpectedFieldSnafu {
                field: match parent {
                    Some(parent) => format!("{parent}.{key}"),
                    None => key.clone(),
                },
                revision: self.revision,
            }
            .fail(),
            None => Ok(()),
        }
    }
}

/// The immutable mapping from revision to schema descriptor.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    v1alpha1: SchemaDescriptor,
    v1beta1: SchemaDescriptor,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            v1alpha1: SchemaDescriptor::for_revision(Revision::V1Alpha1),
            v1beta1: SchemaDescriptor::for_revision(Revision::V1Beta1),
        }
    }

    pub fn group(&self) -> &'static str {
        GROUP
    }

    pub fn kind(&self) -> &'static str {
        KIND
    }

    /// The name of the CRD, eg. `svartskjaifs.skjaif.skjaiferator.no`.
    pub fn crd_name(&self) -> String {
        format!("{PLURAL}.{GROUP}")
    }

    /// The canonical, stored revision.
    pub fn hub(&self) -> &SchemaDescriptor {
        self.descriptor(Revision::HUB)
    }

    pub fn descriptor(&self, revision: Revision) -> &SchemaDescriptor {
        match revision {
            Revision::V1Alpha1 => &self.v1alpha1,
            Revision::V1Beta1 => &self.v1beta1,
        }
    }

    /// All descriptors, ordered from the oldest to the newest revision.
    pub fn revisions(&self) -> impl Iterator<Item = &SchemaDescriptor> {
        Revision::iter().map(|revision| self.descriptor(revision))
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + use<> {
        Field::iter()
    }

    /// Looks up the descriptor for an `apiVersion` string.
    pub fn resolve(&self, api_version: &str) -> Result<&SchemaDescriptor, ResolveError> {
        let revision = api_version
            .parse::<Revision>()
            .context(ResolveSnafu { api_version })?;

        Ok(self.descriptor(revision))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn registry_knows_both_revisions() {
        let registry = SchemaRegistry::new();
        let revisions: Vec<_> = registry.revisions().map(|d| d.revision).collect();

        assert_eq!(revisions, vec![Revision::V1Alpha1, Revision::V1Beta1]);
        assert_eq!(registry.hub().revision, Revision::V1Beta1);
        assert_eq!(registry.hub().role(), Role::Hub);
    }

    #[rstest]
    #[case("skjaif.skjaiferator.no/v1alpha1", Revision::V1Alpha1)]
    #[case("skjaif.skjaiferator.no/v1beta1", Revision::V1Beta1)]
    fn resolve_known_api_version(#[case] api_version: &str, #[case] expected: Revision) {
        let registry = SchemaRegistry::new();
        let descriptor = registry.resolve(api_version).expect("known revision");
        assert_eq!(descriptor.revision, expected);
    }

    #[rstest]
    #[case("skjaif.skjaiferator.no/v2")]
    #[case("example.com/v1beta1")]
    #[case("v1beta1")]
    fn resolve_unknown_api_version(#[case] api_version: &str) {
        let registry = SchemaRegistry::new();
        assert!(registry.resolve(api_version).is_err());
    }

    #[rstest]
    #[case(Field::Coffee, "kaffe", "container.kaffe")]
    #[case(Field::Cup, "kopp", "container.kopp")]
    #[case(Field::Water, "vann", "container.vann")]
    fn field_paths(#[case] field: Field, #[case] hub: &str, #[case] spoke: &str) {
        assert_eq!(field.path(Revision::V1Beta1), hub);
        assert_eq!(field.path(Revision::V1Alpha1), spoke);
    }

    #[rstest]
    #[case(Revision::V1Beta1, json!({"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}))]
    #[case(Revision::V1Beta1, json!({}))]
    #[case(Revision::V1Alpha1, json!({"container": {"kaffe": "melk"}}))]
    fn matching_shape(#[case] revision: Revision, #[case] spec: Value) {
        let registry = SchemaRegistry::new();
        registry
            .descriptor(revision)
            .check_shape(&spec)
            .expect("shape must match");
    }

    #[rstest]
    #[case(Revision::V1Beta1, json!({"container": {"kaffe": "melk"}}))]
    #[case(Revision::V1Alpha1, json!({"kaffe": "melk", "kopp": "krus", "vann": "kaldt"}))]
    #[case(Revision::V1Alpha1, json!({}))]
    #[case(Revision::V1Alpha1, json!("container"))]
    #[case(Revision::V1Alpha1, json!({"container": "melk"}))]
    #[case(Revision::V1Alpha1, json!({"container": {"kaffe": "melk", "sukker": "ja"}}))]
    fn mismatching_shape(#[case] revision: Revision, #[case] spec: Value) {
        let registry = SchemaRegistry::new();
        assert!(registry.descriptor(revision).check_shape(&spec).is_err());
    }

    #[test]
    fn unknown_container_field_is_named() {
        let registry = SchemaRegistry::new();
        let spec = json!({
            "container": {"kaffe": "melk", "kopp": "krus", "vann": "kaldt", "sukker": "ja"}
        });

        let err = registry
            .descriptor(Revision::V1Alpha1)
            .check_shape(&spec)
            .expect_err("unknown container field must be rejected");

        assert!(matches!(
            err,
            ShapeError::UnexpectedField { ref field, revision: Revision::V1Alpha1 }
                if field == "container.sukker"
        ));
    }
}
