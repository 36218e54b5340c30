//! The normalized state every `SvartSkjaif` is driven towards.
use skjaif_crd::{Field, SchemaRegistry, v1beta1::SvartSkjaifSpec};

pub const DEFAULT_COFFEE: &str = "svart";
pub const DEFAULT_CUP: &str = "mummi";
pub const DEFAULT_WATER: &str = "varmt";

/// The values the reconciler enforces on every object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedFields {
    pub coffee: String,
    pub cup: String,
    pub water: String,
}

impl Default for NormalizedFields {
    fn default() -> Self {
        Self {
            coffee: DEFAULT_COFFEE.to_owned(),
            cup: DEFAULT_CUP.to_owned(),
            water: DEFAULT_WATER.to_owned(),
        }
    }
}

impl NormalizedFields {
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Coffee => &self.coffee,
            Field::Cup => &self.cup,
            Field::Water => &self.water,
        }
    }

    /// Lists the fields of `spec` that deviate from the normalized values,
    /// in the order the registry declares them.
    ///
    /// An empty list means the object has converged.
    pub fn evaluate(&self, registry: &SchemaRegistry, spec: &SvartSkjaifSpec) -> Vec<Correction> {
        registry
            .fields()
            .filter_map(|field| {
                let observed = field.hub(spec);
                let normalized = self.value(field);

                (observed != normalized).then(|| Correction {
                    field,
                    observed: observed.to_owned(),
                    normalized: normalized.to_owned(),
                })
            })
            .collect()
    }
}

/// A single field that has to be rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correction {
    pub field: Field,
    pub observed: String,
    pub normalized: String,
}

impl Correction {
    pub fn apply(&self, spec: &mut SvartSkjaifSpec) {
        self.normalized.clone_into(self.field.hub_mut(spec));
    }
}
