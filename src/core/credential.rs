use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::credential_format::{ClaimFormatDesignation, CredentialType};

const TYPE_CLAIM: &str = "type";
const CREDENTIAL_SUBJECT: &str = "credentialSubject";

/// A claim the holder chose to reveal independently of the rest of its
/// credential.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disclosure {
    pub name: String,
    pub value: Json,
}

impl Disclosure {
    pub fn new(name: impl Into<String>, value: Json) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A verifiable credential held by the holder.
///
/// The matching engine only reads credentials: it borrows them for the
/// duration of one query and never mutates them. Proof checking is left to
/// the caller, which is expected to only hand over trusted credentials.
pub trait Credential {
    /// Stable identifier of the credential.
    fn id(&self) -> &str;

    /// The JSON representation of the credential, as decoded from its format.
    fn claims(&self) -> &Json;

    /// Claims revealed through selective disclosure, if any.
    fn selectively_disclosed_claims(&self) -> &[Disclosure] {
        &[]
    }

    /// Claim format of the credential.
    fn format(&self) -> ClaimFormatDesignation {
        ClaimFormatDesignation::LdpVc
    }

    /// Whether the credential can be presented revealing only some of its claims.
    fn supports_selective_disclosure(&self) -> bool {
        self.format().is_selectively_disclosable()
            || !self.selectively_disclosed_claims().is_empty()
    }
}

impl<C: Credential + ?Sized> Credential for &C {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn claims(&self) -> &Json {
        (**self).claims()
    }

    fn selectively_disclosed_claims(&self) -> &[Disclosure] {
        (**self).selectively_disclosed_claims()
    }

    fn format(&self) -> ClaimFormatDesignation {
        (**self).format()
    }

    fn supports_selective_disclosure(&self) -> bool {
        (**self).supports_selective_disclosure()
    }
}

/// A credential already decoded into its JSON representation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonCredential {
    id: String,
    format: ClaimFormatDesignation,
    claims: Json,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    disclosures: Vec<Disclosure>,
}

impl JsonCredential {
    /// Wrap a decoded credential.
    ///
    /// The identifier is taken from the credential's `id` (or the JWT `jti`)
    /// claim. A `urn:uuid` identifier is generated for credentials without one.
    pub fn new(claims: Json) -> Self {
        let id = claims
            .get("id")
            .or_else(|| claims.get("jti"))
            .and_then(Json::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("urn:uuid:{}", uuid::Uuid::new_v4()));

        Self {
            id,
            format: ClaimFormatDesignation::LdpVc,
            claims,
            disclosures: Vec::new(),
        }
    }

    /// Override the credential identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the claim format of the credential.
    pub fn with_format(mut self, format: ClaimFormatDesignation) -> Self {
        self.format = format;
        self
    }

    /// Attach the claims revealed through selective disclosure.
    pub fn with_disclosures(mut self, disclosures: Vec<Disclosure>) -> Self {
        self.disclosures = disclosures;
        self
    }

    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }
}

impl Credential for JsonCredential {
    fn id(&self) -> &str {
        &self.id
    }

    fn claims(&self) -> &Json {
        &self.claims
    }

    fn selectively_disclosed_claims(&self) -> &[Disclosure] {
        &self.disclosures
    }

    fn format(&self) -> ClaimFormatDesignation {
        self.format.clone()
    }
}

/// The shapes a `type` claim can take once decoded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ClaimTypes {
    #[default]
    Absent,
    Single(CredentialType),
    Many(Vec<CredentialType>),
}

impl ClaimTypes {
    /// Normalize a raw `type` claim value.
    ///
    /// A list is only accepted when every element is a string; a list with a
    /// single non-string element yields [ClaimTypes::Absent] rather than a
    /// partial list.
    pub fn from_value(value: &Json) -> Self {
        match value {
            Json::String(t) => Self::Single(t.clone()),
            Json::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(ToOwned::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(Self::Many)
                .unwrap_or(Self::Absent),
            _ => Self::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn into_vec(self) -> Vec<CredentialType> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(t) => vec![t],
            Self::Many(types) => types,
        }
    }
}

/// Resolve the `type` claim of a credential as it will be seen by the verifier.
///
/// A selectively disclosed `type` claim always wins over the one embedded in
/// the credential subject. Only the first credential subject is inspected.
pub fn effective_types<C: Credential + ?Sized>(credential: &C) -> Vec<CredentialType> {
    let disclosed = credential
        .selectively_disclosed_claims()
        .iter()
        .find(|disclosure| disclosure.name == TYPE_CLAIM);

    let types = match disclosed {
        Some(disclosure) => ClaimTypes::from_value(&disclosure.value),
        None => first_subject(credential.claims())
            .and_then(|subject| subject.get(TYPE_CLAIM))
            .map(ClaimTypes::from_value)
            .unwrap_or_default(),
    };

    types.into_vec()
}

/// The claims constraints are evaluated against.
///
/// Without disclosures this is the credential's own JSON. Otherwise every
/// disclosed claim is written into the first credential subject, replacing any
/// embedded value of the same name.
pub fn effective_claims<C: Credential + ?Sized>(credential: &C) -> Cow<'_, Json> {
    let disclosures = credential.selectively_disclosed_claims();
    if disclosures.is_empty() {
        return Cow::Borrowed(credential.claims());
    }

    let mut claims = credential.claims().clone();
    if let Some(subject) = first_subject_mut(&mut claims) {
        for disclosure in disclosures {
            subject.insert(disclosure.name.clone(), disclosure.value.clone());
        }
    } else {
        tracing::debug!(
            credential = credential.id(),
            "credential is not a JSON object, ignoring disclosed claims"
        );
    }

    Cow::Owned(claims)
}

fn subject_container(claims: &Json) -> Option<&Json> {
    match claims.get(CREDENTIAL_SUBJECT) {
        Some(subject) => Some(subject),
        None => claims.get("vc")?.get(CREDENTIAL_SUBJECT),
    }
}

fn first_subject(claims: &Json) -> Option<&Map<String, Json>> {
    match subject_container(claims)? {
        Json::Object(subject) => Some(subject),
        Json::Array(subjects) => subjects.first()?.as_object(),
        _ => None,
    }
}

fn first_subject_mut(claims: &mut Json) -> Option<&mut Map<String, Json>> {
    let root = claims.as_object_mut()?;

    let holder = if root.contains_key(CREDENTIAL_SUBJECT) {
        root
    } else if root
        .get("vc")
        .and_then(|vc| vc.get(CREDENTIAL_SUBJECT))
        .is_some()
    {
        root.get_mut("vc")?.as_object_mut()?
    } else {
        root
    };

    let subject = holder
        .entry(CREDENTIAL_SUBJECT)
        .or_insert_with(|| Json::Object(Map::new()));

    match subject {
        Json::Array(subjects) => {
            if subjects.is_empty() {
                subjects.push(Json::Object(Map::new()));
            }
            subjects.first_mut()?.as_object_mut()
        }
        subject => subject.as_object_mut(),
    }
}
