use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::{
    config::Config,
    core::{
        credential::{effective_claims, Credential},
        presentation_definition::Rule,
        presentation_submission::{DescriptorMap, PresentationSubmission},
        requirement::{
            InputDescriptorResult, RequirementChildren, RequirementTree, SubmissionRequirementNode,
        },
    },
    presentation_exchange::PresentationExchangeError,
};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

/// How the assembler chooses between several credentials matching the same
/// input descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPreference {
    /// The first matching credential, in candidate order.
    #[default]
    FirstMatch,
    /// The first matching credential supporting selective disclosure, if any,
    /// otherwise the first match.
    SelectiveDisclosure,
}

impl SelectionPreference {
    pub fn select<'a, C: Credential>(&self, matches: &[&'a C]) -> Option<&'a C> {
        let preferred = match self {
            Self::FirstMatch => None,
            Self::SelectiveDisclosure => matches
                .iter()
                .find(|credential| credential.supports_selective_disclosure()),
        };

        preferred.or_else(|| matches.first()).copied()
    }
}

/// Turns a satisfied [RequirementTree] into a single presentation.
#[derive(Debug, Clone, Default)]
pub struct PresentationAssembler {
    preference: SelectionPreference,
    holder: Option<String>,
}

impl PresentationAssembler {
    pub fn new(preference: SelectionPreference) -> Self {
        Self {
            preference,
            holder: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            preference: config.selection_preference,
            holder: config.holder.clone(),
        }
    }

    /// Set the holder identifier written into the presentation.
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    pub fn preference(&self) -> SelectionPreference {
        self.preference
    }

    /// Select one credential for every satisfied input descriptor of the tree.
    ///
    /// Only satisfied requirement nodes are descended into. A credential
    /// selected for several input descriptors is presented once.
    pub fn assemble<'a, C: Credential>(
        &self,
        tree: &RequirementTree<'a, C>,
    ) -> Result<Presentation<'a, C>, PresentationExchangeError> {
        tree.ensure_satisfied()?;

        let mut selection = Selection::default();
        for node in tree.requirements() {
            self.select_node(node, &mut selection)?;
        }

        let mut credentials: Vec<&'a C> = Vec::new();
        let mut descriptor_map = Vec::with_capacity(selection.entries.len());

        for (descriptor_id, credential) in selection.entries {
            let index = match credentials.iter().position(|c| std::ptr::eq(*c, credential)) {
                Some(index) => index,
                None => {
                    credentials.push(credential);
                    credentials.len() - 1
                }
            };

            descriptor_map.push(
                DescriptorMap::verifiable_credential(descriptor_id, credential.format(), index)
                    .map_err(AssemblyError::from)?,
            );
        }

        debug!(
            definition = tree.definition_id(),
            descriptors = descriptor_map.len(),
            credentials = credentials.len(),
            "presentation assembled"
        );

        Ok(Presentation {
            submission: PresentationSubmission::new(
                uuid::Uuid::new_v4(),
                tree.definition_id().to_owned(),
                descriptor_map,
            ),
            credentials,
            holder: self.holder.clone(),
        })
    }

    fn select_node<'a, C: Credential>(
        &self,
        node: &SubmissionRequirementNode<'a, C>,
        selection: &mut Selection<'a, C>,
    ) -> Result<(), AssemblyError> {
        match node.children() {
            RequirementChildren::Descriptors(results) => {
                for result in results {
                    self.select_descriptor(node.rule(), result, selection)?;
                }
            }
            RequirementChildren::Nested(nodes) => {
                for nested in nodes {
                    if nested.is_satisfied() {
                        self.select_node(nested, selection)?;
                    } else if node.rule() == Rule::All {
                        return Err(AssemblyError::UnsatisfiedRequirement(
                            nested.name().cloned().unwrap_or_default(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn select_descriptor<'a, C: Credential>(
        &self,
        rule: Rule,
        result: &InputDescriptorResult<'a, C>,
        selection: &mut Selection<'a, C>,
    ) -> Result<(), AssemblyError> {
        if selection.contains(result.id()) {
            return Ok(());
        }

        match self.preference.select(result.matched_credentials()) {
            Some(credential) => {
                selection.entries.push((result.id(), credential));
                Ok(())
            }
            None if rule == Rule::All => Err(AssemblyError::MissingCredential(result.id().to_owned())),
            None => Ok(()),
        }
    }
}

struct Selection<'a, C> {
    entries: Vec<(&'a str, &'a C)>,
}

impl<C> Default for Selection<'_, C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> Selection<'_, C> {
    fn contains(&self, descriptor_id: &str) -> bool {
        self.entries.iter().any(|(id, _)| *id == descriptor_id)
    }
}

/// An unsigned presentation, with the submission describing how it answers
/// the presentation definition.
#[derive(Debug, Clone)]
pub struct Presentation<'a, C> {
    submission: PresentationSubmission,
    credentials: Vec<&'a C>,
    holder: Option<String>,
}

impl<'a, C: Credential> Presentation<'a, C> {
    pub fn submission(&self) -> &PresentationSubmission {
        &self.submission
    }

    /// Presented credentials, each once, in the order they are referenced by
    /// the descriptor map.
    pub fn credentials(&self) -> &[&'a C] {
        &self.credentials
    }

    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    /// The credential selected for an input descriptor.
    pub fn credential_for(&self, descriptor_id: &str) -> Option<&'a C> {
        let entry = self
            .submission
            .descriptor_map()
            .iter()
            .find(|entry| entry.id == descriptor_id)?;

        // Resolve the descriptor map path against the credential positions.
        let positions = serde_json::json!({
            "verifiableCredential": (0..self.credentials.len()).collect::<Vec<_>>()
        });

        let index = entry.path.query(&positions).exactly_one().ok()?.as_u64()?;
        self.credentials.get(usize::try_from(index).ok()?).copied()
    }

    /// The unsigned W3C verifiable presentation.
    ///
    /// Credentials are embedded as disclosed: selectively disclosed claims are
    /// part of the embedded credential subject.
    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        let mut presentation = Map::new();

        presentation.insert(
            "@context".into(),
            Json::Array(vec![Json::String(CREDENTIALS_V1_CONTEXT.into())]),
        );
        presentation.insert(
            "type".into(),
            Json::Array(vec![Json::String(VERIFIABLE_PRESENTATION_TYPE.into())]),
        );

        if let Some(holder) = &self.holder {
            presentation.insert("holder".into(), Json::String(holder.clone()));
        }

        presentation.insert(
            "verifiableCredential".into(),
            Json::Array(
                self.credentials
                    .iter()
                    .map(|credential| effective_claims(*credential).into_owned())
                    .collect(),
            ),
        );
        presentation.insert(
            "presentation_submission".into(),
            serde_json::to_value(&self.submission)?,
        );

        Ok(Json::Object(presentation))
    }
}

/// A satisfied requirement tree could not be turned into a presentation.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// An input descriptor required by an `all` rule has no matching credential.
    #[error("no credential to present for input descriptor `{0}`")]
    MissingCredential(String),

    /// An `all` requirement reported as satisfied has an unsatisfied child.
    #[error("nested requirement `{0}` is not satisfied")]
    UnsatisfiedRequirement(String),

    #[error("invalid descriptor map path: {0}")]
    Path(#[from] serde_json_path::ParseError),

    #[error("presentation is not serializable: {0}")]
    Serialization(#[from] serde_json::Error),
}
