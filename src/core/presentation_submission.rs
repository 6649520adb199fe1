use super::{
    credential_format::*, input_descriptor::InputDescriptor,
    presentation_definition::PresentationDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions are objects embedded within target
/// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) negotiation
/// formats that express how the inputs presented as proofs to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements specified in a [PresentationDefinition].
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    /// The presentation submission MUST contain an id property. The value of this property MUST be a unique identifier, i.e. a UUID.
    ///
    /// The presentation submission object MUST contain a `definition_id` property.
    /// The value of this property MUST be the id value of a valid [PresentationDefinition::id()].
    pub fn new(id: uuid::Uuid, definition_id: String, descriptor_map: Vec<DescriptorMap>) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Return the id of the presentation submission.
    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    /// Return the definition id of the presentation submission.
    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }

    /// Resolve every descriptor map entry against the `presentation` the
    /// submission is embedded in.
    ///
    /// Returns, in descriptor map order, the input descriptor of each entry
    /// along with the submitted claim its path points to.
    pub fn inputs<'d, 'v>(
        &self,
        definition: &'d PresentationDefinition,
        presentation: &'v Json,
    ) -> Result<Vec<(&'d InputDescriptor, &'v Json)>, SubmissionError> {
        if self.definition_id != *definition.id() {
            return Err(SubmissionError::DefinitionMismatch(
                self.definition_id.clone(),
            ));
        }

        let input_descriptors = definition.input_descriptors_map();

        self.descriptor_map
            .iter()
            .map(|entry| {
                let descriptor = input_descriptors
                    .get(entry.id.as_str())
                    .ok_or_else(|| SubmissionError::UndefinedInputDescriptor(entry.id.clone()))?;

                let input = entry
                    .path
                    .query(presentation)
                    .exactly_one()
                    .map_err(|_| SubmissionError::MissingInput(entry.id.clone()))?;

                Ok((*descriptor, input))
            })
            .collect()
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = anyhow::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(raw).map_err(Into::into)
    }
}

/// Descriptor Maps are objects used to describe the information a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) provides to a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
}

impl DescriptorMap {
    /// The descriptor map MUST include an `id` property. The value of this property MUST be a string that matches the `id` property of the [InputDescriptor::id()] in the [PresentationDefinition] that this [PresentationSubmission] is related to.
    ///
    /// The path property indicates the [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) submitted in relation to the identified [InputDescriptor], when executed against the top-level of the object the [PresentationSubmission] is embedded within.
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        path: JsonPath,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path,
        }
    }

    /// Descriptor map entry for the `index`th credential of a verifiable
    /// presentation.
    pub fn verifiable_credential(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        index: usize,
    ) -> Result<Self, serde_json_path::ParseError> {
        let path = JsonPath::parse(&format!("$.verifiableCredential[{index}]"))?;
        Ok(Self::new(id, format, path))
    }
}

/// Presentation submission error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The submission answers another presentation definition.
    #[error("submission answers another presentation definition: `{0}`")]
    DefinitionMismatch(String),

    /// Submission contains inputs that are not defined in the presentation
    /// definition.
    #[error("undefined input descriptor: {0}")]
    UndefinedInputDescriptor(String),

    /// The descriptor map path does not select exactly one input.
    #[error("no input found for descriptor `{0}`")]
    MissingInput(String),
}
