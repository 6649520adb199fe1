pub mod assembler;
pub mod store;

use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::debug;

use crate::{
    config::Config,
    core::{
        matcher::DeclaredSchemas,
        presentation_definition::PresentationDefinition,
        schema_resolution::{ResolvedSchemas, SchemaResolver},
    },
    presentation_exchange::{submit, PresentationExchangeError},
};

use self::{assembler::PresentationAssembler, store::CredentialStore};

/// A credential holder answering presentation definitions from its store.
#[async_trait]
pub trait Holder: Sync {
    type Store: CredentialStore;

    fn config(&self) -> &Config;
    fn store(&self) -> &Self::Store;

    /// Resolver for schemas the credentials do not declare themselves.
    ///
    /// Without a resolver, schema requirements are checked against the
    /// schemas declared by the credentials.
    fn schema_resolver(&self) -> Option<&dyn SchemaResolver> {
        None
    }

    /// Answer a presentation definition with an unsigned verifiable
    /// presentation.
    ///
    /// The definition is validated before any credential is matched.
    async fn present(&self, definition: &PresentationDefinition) -> Result<Json, PresentationExchangeError> {
        let candidates = self
            .store()
            .get_all()
            .await
            .map_err(PresentationExchangeError::Store)?;

        debug!(
            definition = definition.id(),
            candidates = candidates.len(),
            "answering presentation definition"
        );

        let assembler = PresentationAssembler::from_config(self.config());

        let presentation = match self.schema_resolver() {
            Some(resolver) => {
                let resolved = ResolvedSchemas::resolve(
                    resolver,
                    definition,
                    &candidates,
                    *self.config().schema_resolution_timeout,
                )
                .await;

                submit(definition, &candidates, &resolved, &assembler)?.to_json()
            }
            None => submit(definition, &candidates, &DeclaredSchemas, &assembler)?.to_json(),
        };

        presentation.map_err(|e| assembler::AssemblyError::from(e).into())
    }
}
