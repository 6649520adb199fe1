use std::collections::HashSet;

use super::credential_format::*;
use crate::utils::{to_human_readable_string, NonEmptyVec};

use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};

/// A GroupId represents a unique identifier for a group of Input Descriptors.
///
/// Submission requirements select input descriptors through these groups.
pub type GroupId = String;

/// A JSONPath is a string that represents a path to a specific value within a JSON object.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type JsonPath = String;

/// Paths designating the credential type, in the plain and JWT-VC shapes.
const TYPE_PATHS: [&str; 2] = ["$.type", "$.vc.type"];

/// The predicate Feature lets a Verifier request that the Holder apply the filter and only
/// return the boolean result.
///
/// See: [https://identity.foundation/presentation-exchange/#predicate-feature](https://identity.foundation/presentation-exchange/#predicate-feature)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Required,
    Preferred,
}

/// A schema a credential must declare conformance to.
///
/// Schemas marked `required` must be confirmed for a credential to match the
/// input descriptor; the others are informational.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Schema {
    uri: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    required: bool,
}

impl Schema {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            required: false,
        }
    }

    /// Mark the schema as required.
    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// An input descriptor without any constraint field accepts every credential.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    group: Vec<GroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schema: Vec<Schema>,
}

impl InputDescriptor {
    /// Create a new instance of the input descriptor with the given id and constraints.
    ///
    /// The id MUST NOT conflict with the id of another Input Descriptor in the same
    /// Presentation Definition.
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    /// Return the id of the input descriptor.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Return the constraints of the input descriptor.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose for which the claim's data is being requested.
    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Restrict the claim formats accepted for this input descriptor.
    ///
    /// When set, it takes precedence over the format of the presentation definition.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    /// Return the format designations of the input descriptor as a hash set.
    pub fn format_designations(&self) -> HashSet<&ClaimFormatDesignation> {
        self.format.keys().collect()
    }

    pub fn set_group(mut self, group: Vec<GroupId>) -> Self {
        self.group = group;
        self
    }

    pub fn groups(&self) -> &Vec<GroupId> {
        self.group.as_ref()
    }

    pub fn add_to_group(mut self, member: GroupId) -> Self {
        self.group.push(member);
        self
    }

    /// Whether this input descriptor is a member of `group`.
    pub fn is_in_group(&self, group: &str) -> bool {
        self.group.iter().any(|g| g == group)
    }

    pub fn add_schema(mut self, schema: Schema) -> Self {
        self.schema.push(schema);
        self
    }

    /// Return every schema declared by the input descriptor.
    pub fn schemas(&self) -> &[Schema] {
        &self.schema
    }

    /// Return the schemas a matching credential must conform to.
    pub fn required_schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schema.iter().filter(|schema| schema.is_required())
    }

    /// Return the credential type this input descriptor is looking for, if it
    /// pins one down.
    ///
    /// This is the string `const` of the first constraint field (in list order)
    /// whose paths include `$.type` or `$.vc.type`. Fields whose `const` is not
    /// a string are skipped.
    pub fn type_constraint(&self) -> Option<CredentialType> {
        self.constraints.fields().iter().find_map(|field| {
            if !field
                .path()
                .iter()
                .any(|path| TYPE_PATHS.contains(&path.as_str()))
            {
                return None;
            }

            field
                .filter()?
                .get("const")?
                .as_str()
                .map(CredentialType::from)
        })
    }

    /// Return the claim names requested by the input descriptor.
    pub fn requested_fields(&self) -> Vec<String> {
        self.constraints()
            .fields()
            .iter()
            .flat_map(|field| field.requested_fields())
            .collect()
    }
}

/// Constraints are objects used to describe the constraints that a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) must satisfy to fulfill an Input Descriptor.
///
/// A constraint object MAY be empty, or it may include a `fields` and/or `limit_disclosure` property.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    /// Returns an empty Constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new field constraint to the constraints list.
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    /// Set the limit disclosure value.
    ///
    /// With `required`, only credentials able to limit the submitted data to
    /// the requested fields may be presented.
    ///
    /// See [https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions](https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions)
    pub fn set_limit_disclosure(mut self, limit_disclosure: ConstraintsLimitDisclosure) -> Self {
        self.limit_disclosure = Some(limit_disclosure);
        self
    }

    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }

    /// Whether limited disclosure is required by the verifier.
    pub fn requires_limited_disclosure(&self) -> bool {
        matches!(
            self.limit_disclosure,
            Some(ConstraintsLimitDisclosure::Required)
        )
    }

    /// Returns if the constraints fields contain non-optional
    /// fields that must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.limit_disclosure.is_none()
    }
}

/// A single field constraint: a list of candidate JSONPaths and an optional
/// JSON Schema filter the selected value must satisfy.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicate: Option<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    intent_to_retain: bool,
}

impl From<NonEmptyVec<JsonPath>> for ConstraintsField {
    fn from(path: NonEmptyVec<JsonPath>) -> Self {
        Self {
            path,
            id: None,
            purpose: None,
            name: None,
            predicate: None,
            filter: None,
            optional: None,
            intent_to_retain: false,
        }
    }
}

impl ConstraintsField {
    /// Create a new constraints field with a single path.
    pub fn new(path: JsonPath) -> ConstraintsField {
        NonEmptyVec::new(path).into()
    }

    /// Add an alternative path. Paths are tried in order.
    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    pub fn set_id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the JSON Schema the values selected by the paths are filtered against.
    pub fn set_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Return the raw filter of the constraints field.
    pub fn filter(&self) -> Option<&serde_json::Value> {
        self.filter.as_ref()
    }

    /// If the predicate property is present, the filter property **MUST** also be present.
    pub fn set_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Return a JSON schema validator using the internal filter.
    ///
    /// If no filter is provided on the constraint field, this
    /// will return None.
    ///
    /// # Errors
    ///
    /// If the filter is invalid, this will return an error.
    pub fn validator(&self) -> Option<Result<JSONSchema, ValidationError>> {
        self.filter.as_ref().map(JSONSchema::compile)
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    /// Optional fields do not have to be present for a credential to match.
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    pub fn set_retained(mut self, intent_to_retain: bool) -> Self {
        self.intent_to_retain = intent_to_retain;
        self
    }

    pub fn intent_to_retain(&self) -> bool {
        self.intent_to_retain
    }

    /// Return the claim name each path points at, i.e. its last segment.
    ///
    /// e.g., `$.credentialSubject.dateOfBirth` and `$['credentialSubject']['dateOfBirth']`
    /// both yield `dateOfBirth`.
    pub fn requested_fields(&self) -> Vec<String> {
        self.path()
            .iter()
            .filter_map(|path| {
                path.split(&['.', '[', ']', '\'', '"'][..])
                    .filter(|segment| !segment.is_empty() && *segment != "$" && *segment != "*")
                    .last()
            })
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Same as [ConstraintsField::requested_fields], formatted for display.
    ///
    /// e.g., `$.credentialSubject.dateOfBirth` yields `Date Of Birth`.
    pub fn requested_fields_human_readable(&self) -> Vec<String> {
        self.requested_fields()
            .into_iter()
            .map(to_human_readable_string)
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn descriptor(fields: serde_json::Value) -> InputDescriptor {
        serde_json::from_value(json!({
            "id": "degree",
            "constraints": { "fields": fields }
        }))
        .unwrap()
    }

    #[test]
    fn type_constraint_from_const() {
        let descriptor = descriptor(json!([
            { "path": ["$.credentialSubject.degree.type"], "filter": { "const": "BachelorDegree" } },
            { "path": ["$.issuer", "$.vc.type"], "filter": { "type": "string", "const": "UniversityDegreeCredential" } }
        ]));

        assert_eq!(
            descriptor.type_constraint().as_deref(),
            Some("UniversityDegreeCredential")
        );
        // Idempotent.
        assert_eq!(descriptor.type_constraint(), descriptor.type_constraint());
    }

    #[test]
    fn type_constraint_skips_non_string_const() {
        let descriptor = descriptor(json!([
            { "path": ["$.type"], "filter": { "const": 42 } },
            { "path": ["$.type"], "filter": { "type": "string", "pattern": "Degree" } }
        ]));

        assert_eq!(descriptor.type_constraint(), None);
        assert_eq!(InputDescriptor::default().type_constraint(), None);
    }

    #[test]
    fn schema_defaults_to_optional() {
        let descriptor: InputDescriptor = serde_json::from_value(json!({
            "id": "degree",
            "schema": [
                { "uri": "https://example.org/degree.json" },
                { "uri": "https://example.org/transcript.json", "required": true }
            ]
        }))
        .unwrap();

        assert_eq!(descriptor.schemas().len(), 2);
        let required: Vec<_> = descriptor.required_schemas().map(Schema::uri).collect();
        assert_eq!(required, vec!["https://example.org/transcript.json"]);
        assert!(descriptor.constraints().is_empty());
    }

    #[test]
    fn requested_fields_use_last_segment() {
        let field = ConstraintsField::new("$.credentialSubject.dateOfBirth".into())
            .add_path("$['vc']['credentialSubject']['family_name']".into());

        assert_eq!(field.requested_fields(), vec!["dateOfBirth", "family_name"]);
        assert_eq!(
            field.requested_fields_human_readable(),
            vec!["Date Of Birth", "Family Name"]
        );
    }

    #[test]
    fn limit_disclosure_and_optional_fields() {
        let constraints: Constraints = serde_json::from_value(json!({
            "limit_disclosure": "required",
            "fields": [{ "path": ["$.credentialSubject.email"], "optional": true }]
        }))
        .unwrap();

        assert!(constraints.requires_limited_disclosure());
        assert!(!constraints.is_required());
        assert!(!constraints.is_empty());
    }

    #[test]
    fn constraints_field_requires_a_path() {
        assert!(serde_json::from_value::<ConstraintsField>(json!({ "path": [] })).is_err());
        assert!(serde_json::from_value::<ConstraintsField>(json!({ "optional": true })).is_err());

        let field = ConstraintsField::new("$.type".into());
        assert_eq!(field.path().first(), "$.type");
        assert!(!field.is_optional());
        assert!(!field.intent_to_retain());
    }
}
