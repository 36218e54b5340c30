use std::{fmt::Display, str::FromStr, sync::LazyLock};

use regex::Regex;
use snafu::{OptionExt, Snafu, ensure};

use crate::GROUP;

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v(?P<major>\d+)(?:(?P<level>alpha|beta)(?P<level_version>\d+))?$")
        .expect("failed to compile version regex")
});

#[derive(Debug, PartialEq, Snafu)]
pub enum ParseRevisionError {
    #[snafu(display("api version {input:?} has no group"))]
    MissingGroup { input: String },

    #[snafu(display("group {group:?} is not served here, expected {expected:?}"))]
    UnknownGroup { group: String, expected: &'static str },

    #[snafu(display("version {version:?} is not a valid Kubernetes API version"))]
    InvalidVersionFormat { version: String },

    #[snafu(display("version {version:?} is not a known revision"))]
    UnknownVersion { version: String },
}

/// Whether a revision is the canonical stored shape or a presentation of it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::IntoStaticStr)]
pub enum Role {
    Hub,
    Spoke,
}

/// A schema revision of the `SvartSkjaif` resource, identified by the
/// `(<GROUP>/)<VERSION>` API version, for example
/// `skjaif.skjaiferator.no/v1beta1`.
///
/// ```
/// use skjaif_crd::{Revision, Role};
///
/// let revision: Revision = "skjaif.skjaiferator.no/v1alpha1".parse()
///     .expect("valid revision");
///
/// assert_eq!(revision, Revision::V1Alpha1);
/// assert_eq!(revision.role(), Role::Spoke);
/// ```
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::EnumIter,
)]
pub enum Revision {
    V1Alpha1,
    V1Beta1,
}

impl Revision {
    /// The revision the API server stores.
    pub const HUB: Self = Self::V1Beta1;

    pub const fn version(&self) -> &'static str {
        match self {
            Self::V1Alpha1 => "v1alpha1",
            Self::V1Beta1 => "v1beta1",
        }
    }

    pub const fn role(&self) -> Role {
        match self {
            Self::V1Alpha1 => Role::Spoke,
            Self::V1Beta1 => Role::Hub,
        }
    }

    pub const fn is_hub(&self) -> bool {
        matches!(self.role(), Role::Hub)
    }

    /// Returns the fully qualified API version, including the group.
    pub fn api_version(&self) -> String {
        self.to_string()
    }

    fn from_version(version: &str) -> Result<Self, ParseRevisionError> {
        ensure!(
            VERSION_REGEX.is_match(version),
            InvalidVersionFormatSnafu { version }
        );

        match version {
            "v1alpha1" => Ok(Self::V1Alpha1),
            "v1beta1" => Ok(Self::V1Beta1),
            _ => UnknownVersionSnafu { version }.fail(),
        }
    }
}

impl FromStr for Revision {
    type Err = ParseRevisionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (group, version) = input
            .split_once('/')
            .context(MissingGroupSnafu { input })?;

        ensure!(
            group == GROUP,
            UnknownGroupSnafu {
                group,
                expected: GROUP
            }
        );

        Self::from_version(version)
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{GROUP}/{version}", version = self.version())
    }
}
