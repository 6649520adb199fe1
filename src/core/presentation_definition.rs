use super::credential_format::*;
use super::input_descriptor::*;

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};

/// JSON Schema of a presentation definition, as accepted by this crate.
const PRESENTATION_DEFINITION_SCHEMA: &str = include_str!("schemas/presentation_definition.json");

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// Presentation Definitions are composed of inputs, which describe the forms and details of the
/// proofs they require, and optional sets of selection rules, to allow [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)s flexibility
/// in cases where different types of proofs may satisfy an input requirement.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<SubmissionRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property. The value of this property MUST be a string.
    /// The string SHOULD provide a unique ID for the desired context.
    ///
    /// The Presentation Definition MUST contain an input_descriptors property. Its value MUST be an array of Input Descriptor Objects,
    /// the composition of which are found [InputDescriptor] type.
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Parse a presentation definition from its serialized JSON form.
    ///
    /// This only checks the JSON is well formed and has the expected shape;
    /// call [PresentationDefinition::validate_schema] before matching, or use
    /// [crate::presentation_exchange::parse_and_validate] which also checks
    /// the document as received.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::from_json(&Self::parse_json(bytes)?)
    }

    /// Read the raw JSON document of a presentation definition.
    pub fn parse_json(bytes: &[u8]) -> Result<serde_json::Value, ParseError> {
        let jd = &mut serde_json::Deserializer::from_slice(bytes);
        Ok(serde_path_to_error::deserialize(jd)?)
    }

    /// Deserialize a presentation definition from its raw JSON document.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ParseError> {
        Ok(serde_path_to_error::deserialize(value)?)
    }

    /// Validate a raw presentation definition document against the
    /// presentation definition JSON schema.
    ///
    /// Unlike [PresentationDefinition::validate_schema], this sees properties
    /// the data model does not keep, such as unknown properties or a
    /// submission requirement declaring both `from` and `from_nested`.
    pub fn validate_json(value: &serde_json::Value) -> Result<(), ValidationError> {
        let violations = schema_violations(value);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    /// Validate the presentation definition against the presentation
    /// definition JSON schema, and check the cross references it contains.
    ///
    /// Every violation found is reported, not only the first one.
    pub fn validate_schema(&self) -> Result<(), ValidationError> {
        let mut violations = match serde_json::to_value(self) {
            Ok(instance) => schema_violations(&instance),
            Err(e) => vec![format!("presentation definition is not serializable: {e}")],
        };

        let mut ids = HashSet::new();
        let mut groups = HashSet::new();
        for descriptor in &self.input_descriptors {
            if !ids.insert(descriptor.id()) {
                violations.push(format!("duplicate input descriptor id `{}`", descriptor.id()));
            }
            groups.extend(descriptor.groups().iter().map(String::as_str));
            validate_input_descriptor(descriptor, &mut violations);
        }

        for requirement in self.submission_requirements.iter().flatten() {
            requirement.validate(&groups, &mut violations);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    /// Return the input descriptors keyed by id.
    pub fn input_descriptors_map(&self) -> HashMap<&str, &InputDescriptor> {
        self.input_descriptors
            .iter()
            .map(|descriptor| (descriptor.id(), descriptor))
            .collect()
    }

    /// Return the input descriptors belonging to `group`, in definition order.
    pub fn input_descriptors_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a InputDescriptor> + 'a {
        self.input_descriptors
            .iter()
            .filter(move |descriptor| descriptor.is_in_group(group))
    }

    /// Set the submission requirements of the presentation definition.
    ///
    /// Without submission requirements, every input descriptor must be satisfied.
    pub fn set_submission_requirements(mut self, requirements: Vec<SubmissionRequirement>) -> Self {
        self.submission_requirements = Some(requirements);
        self
    }

    pub fn add_submission_requirement(mut self, requirement: SubmissionRequirement) -> Self {
        self.submission_requirements
            .get_or_insert_with(Vec::new)
            .push(requirement);
        self
    }

    pub fn submission_requirements(&self) -> Option<&Vec<SubmissionRequirement>> {
        self.submission_requirements.as_ref()
    }

    /// Set the name of the presentation definition.
    ///
    /// The [PresentationDefinition] MAY contain a name property. If present, its value SHOULD be a
    /// human-friendly string intended to constitute a distinctive designation of the Presentation Definition.
    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Return the name of the presentation definition.
    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose of the presentation definition.
    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    /// Return the purpose of the presentation definition.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Attach a format to the presentation definition.
    ///
    /// The properties inform the [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)
    /// of the claim formats the [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier)
    /// can process. Input descriptors declaring their own format override it.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = Some(format);
        self
    }

    /// Add a new format to the presentation definition.
    pub fn add_format(mut self, format: ClaimFormatDesignation, value: ClaimFormatPayload) -> Self {
        self.format
            .get_or_insert_with(HashMap::new)
            .insert(format, value);
        self
    }

    /// Return the format of the presentation definition.
    pub fn format(&self) -> Option<&ClaimFormatMap> {
        self.format.as_ref()
    }

    /// Return the claim names requested across all input descriptors.
    ///
    /// For example, `$.credentialSubject.givenName` yields `givenName`.
    pub fn requested_fields(&self) -> Vec<String> {
        self.input_descriptors
            .iter()
            .flat_map(InputDescriptor::requested_fields)
            .collect()
    }
}

/// The compiled presentation definition schema, shared by every validation.
fn definition_schema() -> Result<&'static JSONSchema, &'static str> {
    static SCHEMA: OnceLock<Result<JSONSchema, String>> = OnceLock::new();

    SCHEMA
        .get_or_init(compile_definition_schema)
        .as_ref()
        .map_err(String::as_str)
}

fn compile_definition_schema() -> Result<JSONSchema, String> {
    let schema: serde_json::Value = serde_json::from_str(PRESENTATION_DEFINITION_SCHEMA)
        .map_err(|e| format!("unreadable presentation definition schema: {e}"))?;

    let mut options = JSONSchema::options();
    options.with_draft(Draft::Draft7);
    let compiled = options
        .compile(&schema)
        .map_err(|e| format!("invalid presentation definition schema: {e}"))?;

    Ok(compiled)
}

fn schema_violations(instance: &serde_json::Value) -> Vec<String> {
    let schema = match definition_schema() {
        Ok(schema) => schema,
        Err(e) => return vec![e.to_owned()],
    };

    match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| format!("{}: {error}", error.instance_path))
            .collect(),
    }
}

fn validate_input_descriptor(descriptor: &InputDescriptor, violations: &mut Vec<String>) {
    for schema in descriptor.schemas() {
        if let Err(e) = url::Url::parse(schema.uri()) {
            violations.push(format!(
                "input descriptor `{}`: invalid schema uri `{}`: {e}",
                descriptor.id(),
                schema.uri()
            ));
        }
    }

    for field in descriptor.constraints().fields() {
        for path in field.path().iter() {
            if let Err(e) = serde_json_path::JsonPath::parse(path) {
                violations.push(format!(
                    "input descriptor `{}`: invalid JSONPath `{path}`: {e}",
                    descriptor.id()
                ));
            }
        }

        if let Some(Err(e)) = field.validator() {
            violations.push(format!(
                "input descriptor `{}`: invalid filter: {e}",
                descriptor.id()
            ));
        }
    }
}

/// The presentation definition bytes could not be deserialized.
#[derive(Debug, thiserror::Error)]
#[error("malformed presentation definition at `{path}`: {source}")]
pub struct ParseError {
    path: String,
    #[source]
    source: serde_json::Error,
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ParseError {
    fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Self {
            path: e.path().to_string(),
            source: e.into_inner(),
        }
    }
}

impl ParseError {
    /// Location of the error inside the document.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The presentation definition is well formed but not valid.
#[derive(Debug, thiserror::Error)]
#[error("invalid presentation definition: {}", .violations.join("; "))]
pub struct ValidationError {
    violations: Vec<String>,
}

impl ValidationError {
    /// Every violation found, in discovery order.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

/// Rule of a submission requirement.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Every member of the group or nested requirement must be satisfied.
    All,
    /// A number of members, bounded by `count` or `min`/`max`, must be satisfied.
    Pick,
}

/// What a submission requirement selects from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SubmissionRequirementSource {
    /// The input descriptors of a group.
    From { from: GroupId },
    /// Nested submission requirements.
    FromNested {
        from_nested: Vec<SubmissionRequirement>,
    },
}

/// Submission requirements combine input descriptors, or other submission
/// requirements, into groups that must be satisfied according to a rule.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements](https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubmissionRequirement {
    rule: Rule,
    #[serde(flatten)]
    source: SubmissionRequirementSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u64>,
}

impl SubmissionRequirement {
    pub fn new(rule: Rule, source: SubmissionRequirementSource) -> Self {
        Self {
            rule,
            source,
            name: None,
            purpose: None,
            count: None,
            min: None,
            max: None,
        }
    }

    /// An `all` requirement over the input descriptors of `group`.
    pub fn all_from(group: impl Into<GroupId>) -> Self {
        Self::new(
            Rule::All,
            SubmissionRequirementSource::From { from: group.into() },
        )
    }

    /// A `pick` requirement over the input descriptors of `group`.
    pub fn pick_from(group: impl Into<GroupId>) -> Self {
        Self::new(
            Rule::Pick,
            SubmissionRequirementSource::From { from: group.into() },
        )
    }

    /// A requirement over nested submission requirements.
    pub fn nested(rule: Rule, from_nested: Vec<SubmissionRequirement>) -> Self {
        Self::new(rule, SubmissionRequirementSource::FromNested { from_nested })
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn source(&self) -> &SubmissionRequirementSource {
        &self.source
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn set_min(mut self, min: u64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn min(&self) -> Option<u64> {
        self.min
    }

    pub fn set_max(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }

    fn validate(&self, groups: &HashSet<&str>, violations: &mut Vec<String>) {
        let label = self.name.as_deref().unwrap_or("unnamed");

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                violations.push(format!(
                    "submission requirement `{label}`: min ({min}) is greater than max ({max})"
                ));
            }
        }

        match &self.source {
            SubmissionRequirementSource::From { from } => {
                if !groups.contains(from.as_str()) {
                    violations.push(format!(
                        "submission requirement `{label}`: no input descriptor in group `{from}`"
                    ));
                }
            }
            SubmissionRequirementSource::FromNested { from_nested } => {
                for nested in from_nested {
                    nested.validate(groups, violations);
                }
            }
        }
    }
}
