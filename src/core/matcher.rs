use std::borrow::Cow;

use jsonschema::JSONSchema;
use serde_json::Value as Json;
use serde_json_path::JsonPath;
use tracing::{debug, warn};

use super::{
    credential::{effective_claims, effective_types, Credential},
    credential_format::ClaimFormatMap,
    input_descriptor::{ConstraintsField, InputDescriptor},
};

/// Decides whether a credential conforms to a schema URI.
///
/// Implementations must answer without blocking for long: schemas requiring
/// network access should be resolved ahead of time, see
/// [ResolvedSchemas](super::schema_resolution::ResolvedSchemas).
pub trait SchemaConformance {
    fn conforms<C: Credential + ?Sized>(&self, credential: &C, uri: &str) -> bool;
}

impl<F> SchemaConformance for F
where
    F: Fn(&str, &str) -> bool,
{
    fn conforms<C: Credential + ?Sized>(&self, credential: &C, uri: &str) -> bool {
        self(credential.id(), uri)
    }
}

/// Schema conformance as declared by the credential itself.
///
/// A credential conforms to a schema URI when the URI is one of its
/// `credentialSchema` ids or `@context` entries, or when it designates one of
/// the credential types (`https://example.org/vocab#UniversityDegreeCredential`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredSchemas;

impl SchemaConformance for DeclaredSchemas {
    fn conforms<C: Credential + ?Sized>(&self, credential: &C, uri: &str) -> bool {
        let claims = credential.claims();
        let claims = claims.get("vc").unwrap_or(claims);

        let credential_schemas = string_or_objects(claims.get("credentialSchema"), "id");
        let contexts = string_or_objects(claims.get("@context"), "id");
        if credential_schemas.chain(contexts).any(|declared| declared == uri) {
            return true;
        }

        let Some(fragment) = uri.rsplit(&['#', '/'][..]).next().filter(|f| !f.is_empty()) else {
            return false;
        };

        let top_level: Vec<String> = string_or_objects(claims.get("type"), "")
            .map(ToOwned::to_owned)
            .collect();

        effective_types(credential)
            .iter()
            .chain(top_level.iter())
            .any(|t| t == fragment)
    }
}

/// Strings found in a property that is either a string, an object holding
/// `key`, or an array of those.
fn string_or_objects<'a>(value: Option<&'a Json>, key: &'a str) -> impl Iterator<Item = &'a str> {
    let items: Vec<&Json> = match value {
        Some(Json::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    };

    items.into_iter().filter_map(move |item| match item {
        Json::String(s) => Some(s.as_str()),
        Json::Object(o) => o.get(key).and_then(Json::as_str),
        _ => None,
    })
}

/// Matches candidate credentials against input descriptors.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMatcher<'a, O: ?Sized> {
    oracle: &'a O,
    definition_format: Option<&'a ClaimFormatMap>,
}

impl<'a, O: SchemaConformance + ?Sized> DescriptorMatcher<'a, O> {
    pub fn new(oracle: &'a O) -> Self {
        Self {
            oracle,
            definition_format: None,
        }
    }

    /// Formats accepted by the presentation definition, used for input
    /// descriptors that do not restrict formats themselves.
    pub fn with_definition_format(mut self, format: Option<&'a ClaimFormatMap>) -> Self {
        self.definition_format = format;
        self
    }

    /// Return the candidates satisfying the input descriptor, in candidate order.
    pub fn match_descriptor<'c, C: Credential>(
        &self,
        descriptor: &InputDescriptor,
        candidates: &'c [C],
    ) -> Vec<&'c C> {
        candidates
            .iter()
            .filter(|candidate| self.matches(descriptor, *candidate))
            .collect()
    }

    /// Whether a single credential satisfies the input descriptor.
    pub fn matches<C: Credential + ?Sized>(&self, descriptor: &InputDescriptor, credential: &C) -> bool {
        self.matches_claims(descriptor, credential, &effective_claims(credential))
    }

    /// Same as [DescriptorMatcher::matches], with the effective claims of the
    /// credential already resolved.
    pub(crate) fn matches_claims<C: Credential + ?Sized>(
        &self,
        descriptor: &InputDescriptor,
        credential: &C,
        claims: &Json,
    ) -> bool {
        if !self.accepts_format(descriptor, credential) {
            debug!(
                descriptor = descriptor.id(),
                credential = credential.id(),
                format = %credential.format(),
                "format not accepted"
            );
            return false;
        }

        if let Some(schema) = descriptor
            .required_schemas()
            .find(|schema| !self.oracle.conforms(credential, schema.uri()))
        {
            debug!(
                descriptor = descriptor.id(),
                credential = credential.id(),
                schema = schema.uri(),
                "required schema not satisfied"
            );
            return false;
        }

        let constraints = descriptor.constraints();

        if constraints.requires_limited_disclosure() && !credential.supports_selective_disclosure()
        {
            debug!(
                descriptor = descriptor.id(),
                credential = credential.id(),
                "limited disclosure required"
            );
            return false;
        }

        let unsatisfied = constraints
            .fields()
            .iter()
            .filter(|field| field.is_required())
            .find(|field| !field_matches(field, claims));

        match unsatisfied {
            Some(field) => {
                debug!(
                    descriptor = descriptor.id(),
                    credential = credential.id(),
                    path = field.path().first().as_str(),
                    "constraint field not satisfied"
                );
                false
            }
            None => true,
        }
    }

    fn accepts_format<C: Credential + ?Sized>(&self, descriptor: &InputDescriptor, credential: &C) -> bool {
        let accepted = if descriptor.format().is_empty() {
            match self.definition_format {
                Some(format) if !format.is_empty() => format,
                _ => return true,
            }
        } else {
            descriptor.format()
        };

        let format = credential.format();
        accepted.keys().any(|designation| format.is_accepted_as(designation))
    }
}

/// Whether one of the field paths selects a value accepted by the field filter.
///
/// An array value is accepted if either the array itself or one of its
/// elements passes the filter, so that `$.type` can be constrained with a
/// plain `const`.
fn field_matches(field: &ConstraintsField, claims: &Json) -> bool {
    let validator = match field.validator() {
        None => None,
        Some(Ok(validator)) => Some(validator),
        Some(Err(e)) => {
            warn!(path = field.path().first().as_str(), "invalid constraint filter: {e}");
            return false;
        }
    };

    field.path().iter().any(|path| {
        let path = match JsonPath::parse(path) {
            Ok(path) => path,
            Err(e) => {
                warn!(path, "invalid JSONPath: {e}");
                return false;
            }
        };

        // If the result returned no JSONPath match, skip to the next path.
        path.query(claims)
            .all()
            .into_iter()
            .any(|node| match &validator {
                None => true,
                Some(validator) => accepts(validator, node),
            })
    })
}

fn accepts(validator: &JSONSchema, node: &Json) -> bool {
    if validator.is_valid(node) {
        return true;
    }

    match node {
        Json::Array(items) => items.iter().any(|item| validator.is_valid(item)),
        _ => false,
    }
}

/// The effective claims of every candidate, resolved once per query.
pub(crate) fn resolve_candidates<C: Credential>(candidates: &[C]) -> Vec<Cow<'_, Json>> {
    candidates.iter().map(effective_claims).collect()
}
