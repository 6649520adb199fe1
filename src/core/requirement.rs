use std::collections::{HashMap, HashSet};

use super::{
    credential::Credential,
    input_descriptor::{Constraints, InputDescriptor, Schema},
    matcher::{resolve_candidates, DescriptorMatcher, SchemaConformance},
    presentation_definition::{
        PresentationDefinition, Rule, SubmissionRequirement, SubmissionRequirementSource,
    },
};

use tracing::debug;

/// The result of evaluating a presentation definition against a set of
/// candidate credentials.
///
/// The tree borrows the definition and the candidates it was built from. It is
/// built once, bottom-up, and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequirementTree<'a, C> {
    definition_id: &'a str,
    requirements: Vec<SubmissionRequirementNode<'a, C>>,
    descriptors: Vec<InputDescriptorResult<'a, C>>,
}

impl<'a, C: Credential> RequirementTree<'a, C> {
    /// Evaluate the submission requirements of `definition` against `candidates`.
    ///
    /// The definition is expected to be valid, see
    /// [PresentationDefinition::validate_schema]. A definition without
    /// submission requirements is evaluated as a single `all` requirement over
    /// every input descriptor.
    pub fn build<O>(definition: &'a PresentationDefinition, candidates: &'a [C], oracle: &O) -> Self
    where
        O: SchemaConformance + ?Sized,
    {
        let matcher = DescriptorMatcher::new(oracle).with_definition_format(definition.format());
        let claims = resolve_candidates(candidates);

        // Each input descriptor is matched once, however many requirements
        // reference it.
        let descriptors: Vec<InputDescriptorResult<'a, C>> = definition
            .input_descriptors()
            .iter()
            .map(|descriptor| {
                let matched_credentials = candidates
                    .iter()
                    .zip(&claims)
                    .filter(|(candidate, claims)| matcher.matches_claims(descriptor, *candidate, claims))
                    .map(|(candidate, _)| candidate)
                    .collect();

                InputDescriptorResult {
                    descriptor,
                    matched_credentials,
                }
            })
            .collect();

        let by_id: HashMap<&str, &InputDescriptorResult<'a, C>> = descriptors
            .iter()
            .map(|result| (result.id(), result))
            .collect();

        let requirements = match definition.submission_requirements() {
            Some(requirements) => requirements
                .iter()
                .map(|requirement| SubmissionRequirementNode::build(requirement, definition, &by_id))
                .collect(),
            None => vec![SubmissionRequirementNode::leaf(
                None,
                Rule::All,
                PickBounds::default(),
                descriptors.clone(),
            )],
        };

        let tree = Self {
            definition_id: definition.id(),
            requirements,
            descriptors,
        };

        debug!(
            definition = tree.definition_id,
            candidates = candidates.len(),
            satisfied = tree.is_satisfied(),
            "requirement tree built"
        );

        tree
    }
}

impl<'a, C> RequirementTree<'a, C> {
    pub fn definition_id(&self) -> &'a str {
        self.definition_id
    }

    /// Top-level requirement nodes, in definition order.
    pub fn requirements(&self) -> &[SubmissionRequirementNode<'a, C>] {
        &self.requirements
    }

    /// Match results of every input descriptor of the definition, in
    /// definition order.
    pub fn descriptor_results(&self) -> &[InputDescriptorResult<'a, C>] {
        &self.descriptors
    }

    /// Whether every top-level requirement is satisfied.
    pub fn is_satisfied(&self) -> bool {
        self.requirements.iter().all(SubmissionRequirementNode::is_satisfied)
    }

    /// Ids of the input descriptors no candidate matched, under the
    /// requirements left unsatisfied.
    ///
    /// Descriptors of a satisfied requirement are never reported, even when
    /// a `pick` rule left some of them unmatched.
    pub fn unmatched_descriptors(&self) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        let mut unmatched = Vec::new();

        for node in &self.requirements {
            node.visit_unsatisfied_leaves(&mut |result| {
                if !result.is_satisfied() && seen.insert(result.id()) {
                    unmatched.push(result.id());
                }
            });
        }

        unmatched
    }

    /// Fail with [UnsatisfiedError] unless the tree is satisfied.
    pub fn ensure_satisfied(&self) -> Result<(), UnsatisfiedError> {
        if self.is_satisfied() {
            return Ok(());
        }

        Err(UnsatisfiedError {
            unmatched: self
                .unmatched_descriptors()
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        })
    }
}

#[cfg(test)]
impl<'a, C> RequirementTree<'a, C> {
    /// Mark every top-level requirement satisfied, whatever its children.
    pub(crate) fn with_satisfied_roots(mut self) -> Self {
        for node in &mut self.requirements {
            node.satisfied = true;
        }
        self
    }
}

/// Cardinality bounds of a `pick` rule.
///
/// Zero values are treated as unset. A non-zero `count` takes precedence
/// over `min` and `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickBounds {
    count: Option<u64>,
    min: Option<u64>,
    max: Option<u64>,
}

impl PickBounds {
    pub fn new(count: Option<u64>, min: Option<u64>, max: Option<u64>) -> Self {
        let set = |bound: Option<u64>| bound.filter(|bound| *bound > 0);

        Self {
            count: set(count),
            min: set(min),
            max: set(max),
        }
    }

    fn of(requirement: &SubmissionRequirement) -> Self {
        Self::new(requirement.count(), requirement.min(), requirement.max())
    }

    /// Whether `satisfied` children are enough for the `pick` rule.
    pub fn accepts(&self, satisfied: usize) -> bool {
        let satisfied = satisfied as u64;

        if let Some(count) = self.count {
            return satisfied == count;
        }

        match (self.min, self.max) {
            (None, None) => satisfied >= 1,
            (min, max) => {
                min.map_or(true, |min| satisfied >= min) && max.map_or(true, |max| satisfied <= max)
            }
        }
    }
}

/// Children of a requirement node: either input descriptors (`from`) or
/// nested requirements (`from_nested`), never both.
#[derive(Debug, Clone)]
pub enum RequirementChildren<'a, C> {
    Descriptors(Vec<InputDescriptorResult<'a, C>>),
    Nested(Vec<SubmissionRequirementNode<'a, C>>),
}

/// An evaluated submission requirement.
#[derive(Debug, Clone)]
pub struct SubmissionRequirementNode<'a, C> {
    requirement: Option<&'a SubmissionRequirement>,
    rule: Rule,
    bounds: PickBounds,
    children: RequirementChildren<'a, C>,
    satisfied: bool,
}

impl<'a, C> SubmissionRequirementNode<'a, C> {
    fn build(
        requirement: &'a SubmissionRequirement,
        definition: &'a PresentationDefinition,
        descriptors: &HashMap<&str, &InputDescriptorResult<'a, C>>,
    ) -> Self {
        let rule = requirement.rule();
        let bounds = PickBounds::of(requirement);

        match requirement.source() {
            SubmissionRequirementSource::From { from } => {
                let results = definition
                    .input_descriptors_in_group(from)
                    .filter_map(|descriptor| descriptors.get(descriptor.id()))
                    .map(|result| (*result).clone())
                    .collect();

                Self::leaf(Some(requirement), rule, bounds, results)
            }
            SubmissionRequirementSource::FromNested { from_nested } => {
                let nested: Vec<_> = from_nested
                    .iter()
                    .map(|nested| Self::build(nested, definition, descriptors))
                    .collect();

                let satisfied = Self::evaluate(
                    rule,
                    bounds,
                    nested.iter().filter(|node| node.satisfied).count(),
                    nested.len(),
                );

                Self {
                    requirement: Some(requirement),
                    rule,
                    bounds,
                    children: RequirementChildren::Nested(nested),
                    satisfied,
                }
            }
        }
    }

    fn leaf(
        requirement: Option<&'a SubmissionRequirement>,
        rule: Rule,
        bounds: PickBounds,
        results: Vec<InputDescriptorResult<'a, C>>,
    ) -> Self {
        let satisfied = Self::evaluate(
            rule,
            bounds,
            results.iter().filter(|result| result.is_satisfied()).count(),
            results.len(),
        );

        Self {
            requirement,
            rule,
            bounds,
            children: RequirementChildren::Descriptors(results),
            satisfied,
        }
    }

    fn evaluate(rule: Rule, bounds: PickBounds, satisfied: usize, total: usize) -> bool {
        match rule {
            Rule::All => satisfied == total,
            Rule::Pick => bounds.accepts(satisfied),
        }
    }

    fn visit_unsatisfied_leaves(&self, visit: &mut impl FnMut(&InputDescriptorResult<'a, C>)) {
        if self.satisfied {
            return;
        }

        match &self.children {
            RequirementChildren::Descriptors(results) => results.iter().for_each(&mut *visit),
            RequirementChildren::Nested(nodes) => {
                for node in nodes {
                    node.visit_unsatisfied_leaves(visit);
                }
            }
        }
    }

    pub fn name(&self) -> Option<&'a String> {
        self.requirement.and_then(SubmissionRequirement::name)
    }

    pub fn purpose(&self) -> Option<&'a String> {
        self.requirement.and_then(SubmissionRequirement::purpose)
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    /// The `count` declared by the submission requirement.
    pub fn count(&self) -> Option<u64> {
        self.requirement.and_then(SubmissionRequirement::count)
    }

    pub fn min(&self) -> Option<u64> {
        self.requirement.and_then(SubmissionRequirement::min)
    }

    pub fn max(&self) -> Option<u64> {
        self.requirement.and_then(SubmissionRequirement::max)
    }

    /// The effective cardinality bounds used to evaluate a `pick` rule.
    pub fn bounds(&self) -> PickBounds {
        self.bounds
    }

    pub fn children(&self) -> &RequirementChildren<'a, C> {
        &self.children
    }

    /// Input descriptor results of a `from` node, empty for nested nodes.
    pub fn descriptors(&self) -> &[InputDescriptorResult<'a, C>] {
        match &self.children {
            RequirementChildren::Descriptors(results) => results,
            RequirementChildren::Nested(_) => &[],
        }
    }

    /// Nested nodes of a `from_nested` node, empty for descriptor nodes.
    pub fn nested(&self) -> &[SubmissionRequirementNode<'a, C>] {
        match &self.children {
            RequirementChildren::Descriptors(_) => &[],
            RequirementChildren::Nested(nodes) => nodes,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }
}

/// The credentials matching one input descriptor.
#[derive(Debug)]
pub struct InputDescriptorResult<'a, C> {
    descriptor: &'a InputDescriptor,
    matched_credentials: Vec<&'a C>,
}

impl<C> Clone for InputDescriptorResult<'_, C> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor,
            matched_credentials: self.matched_credentials.clone(),
        }
    }
}

impl<'a, C> InputDescriptorResult<'a, C> {
    pub fn id(&self) -> &'a str {
        self.descriptor.id()
    }

    pub fn name(&self) -> Option<&'a String> {
        self.descriptor.name()
    }

    pub fn purpose(&self) -> Option<&'a String> {
        self.descriptor.purpose()
    }

    pub fn constraints(&self) -> &'a Constraints {
        self.descriptor.constraints()
    }

    pub fn schemas(&self) -> &'a [Schema] {
        self.descriptor.schemas()
    }

    pub fn descriptor(&self) -> &'a InputDescriptor {
        self.descriptor
    }

    /// Matching candidates, in candidate order.
    pub fn matched_credentials(&self) -> &[&'a C] {
        &self.matched_credentials
    }

    /// Claim names requested by the input descriptor.
    pub fn requested_fields(&self) -> Vec<String> {
        self.descriptor.requested_fields()
    }

    pub fn is_satisfied(&self) -> bool {
        !self.matched_credentials.is_empty()
    }
}

/// The candidate credentials do not satisfy the presentation definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credentials do not satisfy requirements{}", unmatched_suffix(.unmatched))]
pub struct UnsatisfiedError {
    unmatched: Vec<String>,
}

impl UnsatisfiedError {
    /// Ids of the input descriptors no candidate matched.
    pub fn unmatched(&self) -> &[String] {
        &self.unmatched
    }
}

fn unmatched_suffix(unmatched: &[String]) -> String {
    if unmatched.is_empty() {
        return String::new();
    }

    format!(" (no credential matches {})", unmatched.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{credential::JsonCredential, matcher::DeclaredSchemas};
    use serde_json::{json, Value as Json};

    fn credential(t: &str) -> JsonCredential {
        JsonCredential::new(json!({
            "id": format!("urn:{t}"),
            "type": ["VerifiableCredential", t]
        }))
    }

    fn typed(id: &str, t: &str, group: &str) -> Json {
        json!({
            "id": id,
            "group": [group],
            "constraints": { "fields": [{
                "path": ["$.type"],
                "filter": { "type": "string", "const": t }
            }]}
        })
    }

    fn definition(value: Json) -> PresentationDefinition {
        let definition: PresentationDefinition = serde_json::from_value(value).unwrap();
        definition.validate_schema().unwrap();
        definition
    }

    fn pick_one_of_three() -> PresentationDefinition {
        definition(json!({
            "id": "pick",
            "submission_requirements": [{ "rule": "pick", "count": 1, "from": "A" }],
            "input_descriptors": [
                typed("a", "TypeA", "A"),
                typed("b", "TypeB", "A"),
                typed("c", "TypeC", "A")
            ]
        }))
    }

    #[test]
    fn pick_count() {
        let definition = pick_one_of_three();

        let none = vec![credential("TypeD")];
        let one = vec![credential("TypeD"), credential("TypeB")];
        let two = vec![credential("TypeA"), credential("TypeB")];

        assert!(!RequirementTree::build(&definition, &none, &DeclaredSchemas).is_satisfied());
        assert!(RequirementTree::build(&definition, &one, &DeclaredSchemas).is_satisfied());
        assert!(!RequirementTree::build(&definition, &two, &DeclaredSchemas).is_satisfied());
    }

    #[test]
    fn pick_bounds() {
        assert!(PickBounds::new(None, None, None).accepts(1));
        assert!(!PickBounds::new(None, None, None).accepts(0));
        assert!(!PickBounds::new(Some(0), Some(0), Some(0)).accepts(0));

        let min_max = PickBounds::new(None, Some(2), Some(3));
        assert!(!min_max.accepts(1));
        assert!(min_max.accepts(2));
        assert!(min_max.accepts(3));
        assert!(!min_max.accepts(4));

        assert!(PickBounds::new(None, None, Some(2)).accepts(0));
        assert!(PickBounds::new(None, Some(1), None).accepts(5));

        // count wins over min/max
        let both = PickBounds::new(Some(2), Some(1), Some(1));
        assert!(both.accepts(2));
        assert!(!both.accepts(1));
    }

    #[test]
    fn all_requires_every_descriptor() {
        let definition = definition(json!({
            "id": "all",
            "submission_requirements": [{ "rule": "all", "from": "A" }],
            "input_descriptors": [typed("a", "TypeA", "A"), typed("b", "TypeB", "A")]
        }));
        let candidates = vec![credential("TypeA")];

        let tree = RequirementTree::build(&definition, &candidates, &DeclaredSchemas);

        assert!(!tree.is_satisfied());
        assert_eq!(tree.unmatched_descriptors(), vec!["b"]);
        let descriptors = tree.requirements()[0].descriptors();
        assert_eq!(descriptors[0].matched_credentials().len(), 1);
        assert!(descriptors[1].matched_credentials().is_empty());

        let error = tree.ensure_satisfied().unwrap_err();
        assert_eq!(error.unmatched(), ["b".to_string()]);
        assert!(error.to_string().contains("credentials do not satisfy requirements"));
    }

    #[test]
    fn implicit_all_without_submission_requirements() {
        let definition = definition(json!({
            "id": "implicit",
            "input_descriptors": [
                { "id": "any" },
                typed("a", "TypeA", "A")
            ]
        }));
        let candidates = vec![credential("TypeA"), credential("TypeB")];

        let tree = RequirementTree::build(&definition, &candidates, &DeclaredSchemas);

        assert!(tree.is_satisfied());
        let node = &tree.requirements()[0];
        assert_eq!(node.rule(), Rule::All);
        assert!(node.name().is_none());
        assert_eq!(node.descriptors()[0].matched_credentials().len(), 2);
        assert_eq!(node.descriptors()[1].matched_credentials().len(), 1);
    }

    #[test]
    fn nested_all_over_picks() {
        let definition = definition(json!({
            "id": "nested",
            "submission_requirements": [{
                "name": "Identity and education",
                "rule": "all",
                "from_nested": [
                    { "rule": "pick", "count": 1, "from": "A" },
                    { "rule": "pick", "min": 1, "max": 2, "from": "B" }
                ]
            }],
            "input_descriptors": [
                typed("degree", "UniversityDegreeCredential", "A"),
                typed("diploma", "DiplomaCredential", "A"),
                typed("passport", "PassportCredential", "B"),
                typed("license", "DriversLicenseCredential", "B")
            ]
        }));
        let candidates = vec![
            credential("UniversityDegreeCredential"),
            credential("PassportCredential"),
            credential("DriversLicenseCredential"),
            credential("MembershipCredential"),
        ];

        let tree = RequirementTree::build(&definition, &candidates, &DeclaredSchemas);
        assert!(tree.is_satisfied());

        let root = &tree.requirements()[0];
        assert!(root.is_satisfied());
        assert_eq!(root.name().map(String::as_str), Some("Identity and education"));
        assert!(root.descriptors().is_empty());
        assert_eq!(root.nested().len(), 2);

        let education = &root.nested()[0];
        assert_eq!(education.count(), Some(1));
        assert_eq!(education.descriptors().len(), 2);
        assert!(education.is_satisfied());

        let identity = &root.nested()[1];
        assert_eq!((identity.min(), identity.max()), (Some(1), Some(2)));
        assert_eq!(identity.descriptors().len(), 2);
        assert!(identity.is_satisfied());

        // Losing the passport leaves the license, still within bounds.
        let fewer = vec![candidates[0].clone(), candidates[2].clone()];
        assert!(RequirementTree::build(&definition, &fewer, &DeclaredSchemas).is_satisfied());

        // Without any identity document the root fails.
        let missing = vec![candidates[0].clone()];
        let tree = RequirementTree::build(&definition, &missing, &DeclaredSchemas);
        assert!(!tree.is_satisfied());
        assert!(tree.requirements()[0].nested()[0].is_satisfied());
        // The education pick is met, so its unmatched diploma is not a cause.
        assert_eq!(tree.unmatched_descriptors(), vec!["passport", "license"]);
        let error = tree.ensure_satisfied().unwrap_err();
        assert!(!error.to_string().contains("diploma"));
    }

    #[test]
    fn pick_over_nested_requirements() {
        let definition = definition(json!({
            "id": "pick-nested",
            "submission_requirements": [{
                "rule": "pick",
                "count": 1,
                "from_nested": [
                    { "name": "first", "rule": "all", "from": "A" },
                    { "name": "second", "rule": "all", "from": "B" }
                ]
            }],
            "input_descriptors": [
                typed("a", "TypeA", "A"),
                typed("b1", "TypeB", "B"),
                typed("b2", "TypeC", "B")
            ]
        }));

        let candidates = vec![credential("TypeA"), credential("TypeB")];
        let tree = RequirementTree::build(&definition, &candidates, &DeclaredSchemas);
        assert!(tree.is_satisfied());

        let root = &tree.requirements()[0];
        assert_eq!(root.rule(), Rule::Pick);
        let groups: Vec<_> = root
            .nested()
            .iter()
            .map(|node| (node.name().map(String::as_str), node.is_satisfied()))
            .collect();
        assert_eq!(groups, vec![(Some("first"), true), (Some("second"), false)]);
        assert!(tree.unmatched_descriptors().is_empty());

        // Both groups satisfied is one more than the count.
        let every = vec![credential("TypeA"), credential("TypeB"), credential("TypeC")];
        assert!(!RequirementTree::build(&definition, &every, &DeclaredSchemas).is_satisfied());

        let neither = vec![credential("TypeB")];
        let tree = RequirementTree::build(&definition, &neither, &DeclaredSchemas);
        assert!(!tree.is_satisfied());
        assert_eq!(tree.unmatched_descriptors(), vec!["a", "b2"]);
    }

    #[test]
    fn descriptor_projection() {
        let definition = definition(json!({
            "id": "projection",
            "input_descriptors": [{
                "id": "degree",
                "name": "University degree",
                "purpose": "Prove your education",
                "schema": [{ "uri": "https://example.org/vocab#UniversityDegreeCredential" }],
                "constraints": { "fields": [
                    { "path": ["$.credentialSubject.degree.type"] }
                ]}
            }]
        }));
        let candidates: Vec<JsonCredential> = Vec::new();

        let tree = RequirementTree::build(&definition, &candidates, &DeclaredSchemas);
        let result = &tree.descriptor_results()[0];

        assert_eq!(tree.definition_id(), "projection");
        assert_eq!(result.name().map(String::as_str), Some("University degree"));
        assert_eq!(result.purpose().map(String::as_str), Some("Prove your education"));
        assert_eq!(result.schemas().len(), 1);
        assert_eq!(result.constraints().fields().len(), 1);
        assert_eq!(result.requested_fields(), vec!["type".to_string()]);
        assert!(!result.is_satisfied());
    }
}
