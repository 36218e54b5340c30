//! Generation of the merged `CustomResourceDefinition` serving both
//! revisions, with `v1beta1` as the stored version.
use std::io::Write;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    CustomResourceExt as _,
    core::crd::{MergeError, merge_crds},
};
use snafu::{ResultExt, Snafu};

use crate::{Revision, v1alpha1, v1beta1};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to merge CRD revisions"))]
    MergeCrd { source: MergeError },

    #[snafu(display("failed to serialize CRD as YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write CRD YAML to stdout"))]
    WriteToStdout { source: std::io::Error },
}

/// Returns the CRD serving all revisions, storing only the hub.
pub fn merged_crd() -> Result<CustomResourceDefinition> {
    merge_crds(
        vec![v1alpha1::SvartSkjaif::crd(), v1beta1::SvartSkjaif::crd()],
        Revision::HUB.version(),
    )
    .context(MergeCrdSnafu)
}

/// Returns the merged CRD as an explicit YAML document (with leading `---`).
pub fn yaml_schema() -> Result<String> {
    let crd = merged_crd()?;
    let yaml = serde_yaml::to_string(&crd).context(SerializeYamlSnafu)?;

    Ok(format!("---\n{yaml}"))
}

/// Prints the merged CRD to stdout.
pub fn print_yaml_schema() -> Result<()> {
    let yaml = yaml_schema()?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(yaml.as_bytes())
        .context(WriteToStdoutSnafu)
}
