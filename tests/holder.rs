use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use credential_matcher::{
    config::Config,
    core::{
        credential::{Credential, Disclosure, JsonCredential},
        credential_format::ClaimFormatDesignation,
        presentation_definition::PresentationDefinition,
        schema_resolution::SchemaResolver,
    },
    holder::{
        assembler::SelectionPreference,
        store::{CredentialStore, MemoryStore},
        Holder,
    },
    presentation_exchange::{parse_and_validate, PresentationExchangeError},
};
use serde_json::{json, Value as Json};

const EMPLOYMENT_SCHEMA: &str = "https://schemas.example.org/employment.json";

#[derive(Debug)]
struct Wallet {
    config: Config,
    store: MemoryStore<JsonCredential>,
    resolver: Option<EmploymentSchemas>,
}

#[async_trait]
impl Holder for Wallet {
    type Store = MemoryStore<JsonCredential>;

    fn config(&self) -> &Config {
        &self.config
    }

    fn store(&self) -> &Self::Store {
        &self.store
    }

    fn schema_resolver(&self) -> Option<&dyn SchemaResolver> {
        self.resolver
            .as_ref()
            .map(|resolver| resolver as &dyn SchemaResolver)
    }
}

/// Conformance answers as a schema registry would give them.
#[derive(Debug)]
struct EmploymentSchemas {
    delay: Duration,
}

#[async_trait]
impl SchemaResolver for EmploymentSchemas {
    async fn conforms(&self, _credential_id: &str, claims: &Json, uri: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;

        if uri != EMPLOYMENT_SCHEMA {
            bail!("unknown schema {uri}")
        }

        Ok(claims["credentialSubject"]["employer"].is_string())
    }
}

fn employment() -> JsonCredential {
    JsonCredential::new(json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "id": "urn:employment",
        "type": ["VerifiableCredential", "EmploymentCredential"],
        "credentialSubject": { "id": "did:example:holder", "employer": "ACME" }
    }))
}

fn email() -> JsonCredential {
    JsonCredential::new(json!({
        "id": "urn:email",
        "vct": "https://example.org/EmailCredential",
        "credentialSubject": { "id": "did:example:holder" }
    }))
    .with_format(ClaimFormatDesignation::DcSdJwt)
    .with_disclosures(vec![Disclosure::new(
        "email",
        json!("alice@example.com"),
    )])
}

fn definition() -> PresentationDefinition {
    parse_and_validate(
        json!({
            "id": "onboarding",
            "input_descriptors": [
                {
                    "id": "employment",
                    "schema": [{ "uri": EMPLOYMENT_SCHEMA, "required": true }]
                },
                {
                    "id": "email",
                    "constraints": {
                        "limit_disclosure": "required",
                        "fields": [{
                            "path": ["$.credentialSubject.email"],
                            "filter": { "type": "string", "format": "email" }
                        }]
                    }
                }
            ]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap()
}

async fn wallet(resolver: Option<EmploymentSchemas>) -> Wallet {
    let config = Config::from_json(
        br#"{
            "schema_resolution_timeout": 1,
            "selection_preference": "selective_disclosure",
            "holder": "did:example:holder"
        }"#,
    )
    .unwrap();

    let store = MemoryStore::default();
    store.insert(employment()).await;
    store.insert(email()).await;

    Wallet {
        config,
        store,
        resolver,
    }
}

#[tokio::test]
async fn present_with_resolved_schemas() {
    let wallet = wallet(Some(EmploymentSchemas {
        delay: Duration::from_millis(1),
    }))
    .await;

    let vp = wallet.present(&definition()).await.unwrap();

    assert_eq!(vp["holder"], "did:example:holder");
    assert_eq!(vp["verifiableCredential"][0]["id"], "urn:employment");
    assert_eq!(
        vp["verifiableCredential"][1]["credentialSubject"]["email"],
        "alice@example.com"
    );

    let descriptor_map = vp["presentation_submission"]["descriptor_map"]
        .as_array()
        .unwrap();
    assert_eq!(descriptor_map.len(), 2);
    assert_eq!(descriptor_map[0]["id"], "employment");
    assert_eq!(descriptor_map[1]["format"], "dc+sd-jwt");
}

#[tokio::test(start_paused = true)]
async fn schema_resolution_timeout_fails_closed() {
    let wallet = wallet(Some(EmploymentSchemas {
        delay: Duration::from_secs(10),
    }))
    .await;

    let error = wallet.present(&definition()).await.unwrap_err();

    let PresentationExchangeError::Unsatisfied(unsatisfied) = &error else {
        panic!("unexpected error: {error}")
    };
    assert_eq!(unsatisfied.unmatched(), ["employment".to_string()]);
    assert!(error
        .to_string()
        .contains("credentials do not satisfy requirements"));
}

#[tokio::test]
async fn declared_schemas_without_resolver() {
    let wallet = wallet(None).await;

    // The employment credential does not declare the required schema.
    let error = wallet.present(&definition()).await.unwrap_err();
    assert!(matches!(error, PresentationExchangeError::Unsatisfied(_)));

    wallet
        .store()
        .insert(JsonCredential::new(json!({
            "id": "urn:employment-v2",
            "credentialSchema": { "id": EMPLOYMENT_SCHEMA, "type": "JsonSchema" },
            "credentialSubject": { "employer": "ACME" }
        })))
        .await;

    let vp = wallet.present(&definition()).await.unwrap();
    assert_eq!(vp["verifiableCredential"][0]["id"], "urn:employment-v2");
}

#[tokio::test]
async fn store_lookup() {
    let wallet = wallet(None).await;

    let credential = wallet.store().get("urn:email").await.unwrap();
    assert!(credential.supports_selective_disclosure());
    assert!(wallet.store().get("urn:unknown").await.is_err());

    assert_eq!(
        wallet.config().selection_preference,
        SelectionPreference::SelectiveDisclosure
    );
}

#[tokio::test]
async fn invalid_definition_is_rejected() {
    let wallet = wallet(None).await;

    let definition = PresentationDefinition::parse(
        br#"{
            "id": "broken",
            "submission_requirements": [{ "rule": "all", "from": "missing" }],
            "input_descriptors": [{ "id": "email", "group": ["A"] }]
        }"#,
    )
    .unwrap();

    let error = wallet.present(&definition).await.unwrap_err();
    assert!(matches!(error, PresentationExchangeError::Validation(_)));
}
