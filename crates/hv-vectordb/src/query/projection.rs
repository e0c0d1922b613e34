use std::collections::BTreeMap;

use hv_core::{FieldValue, ID_FIELD};

use crate::error::{Result, VectorDbError};
use crate::schema::SchemaRegistry;

/// Which fields a read returns.
///
/// `include` and `exclude` are mutually exclusive; `pack` further narrows
/// whatever the first two leave.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    pack: Option<Vec<String>>,
}

impl Projection {
    /// Every field.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(
        include: Option<Vec<String>>,
        exclude: Option<Vec<String>>,
        pack: Option<Vec<String>>,
    ) -> Result<Self> {
        if include.is_some() && exclude.is_some() {
            return Err(VectorDbError::ConflictingProjection);
        }
        Ok(Self { include, exclude, pack })
    }

    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self { include: Some(fields.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self { exclude: Some(fields.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    /// Every named field must exist in the schema.
    pub fn validate(&self, schema: &SchemaRegistry) -> Result<()> {
        let named = [&self.include, &self.exclude, &self.pack];
        for name in named.into_iter().flatten().flatten() {
            if name != ID_FIELD && !schema.contains(name) {
                return Err(VectorDbError::UnknownField(name.clone()));
            }
        }
        Ok(())
    }

    pub fn apply(&self, fields: &BTreeMap<String, FieldValue>) -> BTreeMap<String, FieldValue> {
        fields
            .iter()
            .filter(|(name, _)| {
                let included = match (&self.include, &self.exclude) {
                    (Some(inc), _) => inc.contains(name),
                    (None, Some(exc)) => !exc.contains(name),
                    (None, None) => true,
                };
                included && self.pack.as_ref().map_or(true, |p| p.contains(name))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
