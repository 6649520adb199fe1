use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::{debug, warn};

use super::{
    credential::{effective_claims, Credential},
    matcher::SchemaConformance,
    presentation_definition::PresentationDefinition,
};

/// Checks credentials against schemas that must be fetched or evaluated
/// asynchronously.
#[async_trait]
pub trait SchemaResolver: Sync {
    /// Whether the credential claims conform to the schema at `uri`.
    async fn conforms(&self, credential_id: &str, claims: &Json, uri: &str) -> anyhow::Result<bool>;
}

/// Schema conformance answers computed ahead of matching.
///
/// Matching itself is synchronous, so every `(credential, schema)` pair a
/// presentation definition could ask about is resolved up front. Pairs that
/// failed or timed out are treated as non-conforming.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchemas {
    conforming: HashSet<(String, String)>,
}

impl ResolvedSchemas {
    /// Resolve every required schema of `definition` against every candidate.
    pub async fn resolve<R, C>(
        resolver: &R,
        definition: &PresentationDefinition,
        candidates: &[C],
        timeout: Duration,
    ) -> Self
    where
        R: SchemaResolver + ?Sized,
        C: Credential + Sync,
    {
        let uris: HashSet<&str> = definition
            .input_descriptors()
            .iter()
            .flat_map(|descriptor| descriptor.required_schemas())
            .map(|schema| schema.uri())
            .collect();

        let mut resolved = Self::default();
        if uris.is_empty() {
            return resolved;
        }

        for candidate in candidates {
            let claims = effective_claims(candidate);
            for &uri in &uris {
                let answer =
                    tokio::time::timeout(timeout, resolver.conforms(candidate.id(), &claims, uri))
                        .await;

                match answer {
                    Ok(Ok(true)) => resolved.insert(candidate.id(), uri),
                    Ok(Ok(false)) => {
                        debug!(credential = candidate.id(), schema = uri, "does not conform");
                    }
                    Ok(Err(e)) => {
                        warn!(
                            credential = candidate.id(),
                            schema = uri,
                            "schema resolution failed: {e:#}"
                        );
                    }
                    Err(_) => {
                        warn!(
                            credential = candidate.id(),
                            schema = uri,
                            ?timeout,
                            "schema resolution timed out"
                        );
                    }
                }
            }
        }

        resolved
    }

    /// Record that a credential conforms to a schema.
    pub fn insert(&mut self, credential_id: impl Into<String>, uri: impl Into<String>) {
        self.conforming.insert((credential_id.into(), uri.into()));
    }

    pub fn len(&self) -> usize {
        self.conforming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conforming.is_empty()
    }
}

impl SchemaConformance for ResolvedSchemas {
    fn conforms<C: Credential + ?Sized>(&self, credential: &C, uri: &str) -> bool {
        self.conforming
            .contains(&(credential.id().to_owned(), uri.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{
        credential::JsonCredential,
        input_descriptor::{Constraints, InputDescriptor, Schema},
    };
    use anyhow::bail;
    use serde_json::json;

    struct Registry;

    #[async_trait]
    impl SchemaResolver for Registry {
        async fn conforms(&self, credential_id: &str, claims: &Json, uri: &str) -> anyhow::Result<bool> {
            match uri {
                "https://example.org/slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(true)
                }
                "https://example.org/broken" => bail!("registry unavailable"),
                "https://example.org/degree" => Ok(credential_id == "urn:degree"
                    && claims["credentialSubject"]["degree"].is_object()),
                _ => Ok(false),
            }
        }
    }

    fn definition(uris: &[&str]) -> PresentationDefinition {
        let descriptor = uris.iter().fold(
            InputDescriptor::new("schemas".into(), Constraints::new()),
            |descriptor, uri| descriptor.add_schema(Schema::new(*uri).set_required(true)),
        );
        PresentationDefinition::new("definition".into(), descriptor)
    }

    fn candidates() -> Vec<JsonCredential> {
        vec![
            JsonCredential::new(json!({
                "id": "urn:degree",
                "credentialSubject": { "degree": { "type": "BachelorDegree" } }
            })),
            JsonCredential::new(json!({ "id": "urn:other", "credentialSubject": {} })),
        ]
    }

    #[tokio::test]
    async fn resolves_conforming_pairs() {
        let candidates = candidates();
        let resolved = ResolvedSchemas::resolve(
            &Registry,
            &definition(&["https://example.org/degree"]),
            &candidates,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(resolved.len(), 1);
        assert!(resolved.conforms(&candidates[0], "https://example.org/degree"));
        assert!(!resolved.conforms(&candidates[1], "https://example.org/degree"));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_timeouts_do_not_conform() {
        let candidates = candidates();
        let resolved = ResolvedSchemas::resolve(
            &Registry,
            &definition(&["https://example.org/slow", "https://example.org/broken"]),
            &candidates,
            Duration::from_millis(10),
        )
        .await;

        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn nothing_to_resolve() {
        let definition = PresentationDefinition::new(
            "definition".into(),
            InputDescriptor::new("schemas".into(), Constraints::new())
                .add_schema(Schema::new("https://example.org/slow")),
        );

        let resolved =
            ResolvedSchemas::resolve(&Registry, &definition, &candidates(), Duration::from_secs(1))
                .await;

        assert!(resolved.is_empty());
    }
}
