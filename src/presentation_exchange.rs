//! Entry points answering a presentation definition with the holder's
//! credentials.
//!
//! [inspect] reports every match, for wallets letting the user choose among
//! alternatives. [submit] directly selects one credential per input
//! descriptor and returns the resulting presentation.

use crate::{
    core::{
        credential::Credential,
        matcher::SchemaConformance,
        presentation_definition::{ParseError, PresentationDefinition, ValidationError},
        requirement::{RequirementTree, UnsatisfiedError},
    },
    holder::assembler::{AssemblyError, Presentation, PresentationAssembler},
};

/// Errors returned when answering a presentation definition.
#[derive(Debug, thiserror::Error)]
pub enum PresentationExchangeError {
    /// The presentation definition is not well formed JSON of the expected shape.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The presentation definition violates the presentation definition schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The presentation definition is valid, but the credentials do not satisfy it.
    #[error(transparent)]
    Unsatisfied(#[from] UnsatisfiedError),

    /// The requirements are satisfied but no presentation could be assembled.
    #[error("presentation assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    /// The credential store failed.
    #[error("credential store error: {0:#}")]
    Store(anyhow::Error),
}

/// Parse a presentation definition and check it is valid.
///
/// The document is checked against the presentation definition schema as
/// received, before deserialization, so that a well formed document breaking
/// the schema is reported as [PresentationExchangeError::Validation].
pub fn parse_and_validate(bytes: &[u8]) -> Result<PresentationDefinition, PresentationExchangeError> {
    let document = PresentationDefinition::parse_json(bytes)?;
    PresentationDefinition::validate_json(&document)?;

    let definition = PresentationDefinition::from_json(&document)?;
    definition.validate_schema()?;
    Ok(definition)
}

/// Evaluate `definition` against `candidates`, reporting every match.
///
/// Fails if the definition is invalid. An unsatisfied definition is not an
/// error: the tree reports which requirements are unmet.
pub fn inspect<'a, C, O>(
    definition: &'a PresentationDefinition,
    candidates: &'a [C],
    oracle: &O,
) -> Result<RequirementTree<'a, C>, PresentationExchangeError>
where
    C: Credential,
    O: SchemaConformance + ?Sized,
{
    definition.validate_schema()?;
    Ok(RequirementTree::build(definition, candidates, oracle))
}

/// Answer `definition` with a single presentation built from `candidates`.
pub fn submit<'a, C, O>(
    definition: &'a PresentationDefinition,
    candidates: &'a [C],
    oracle: &O,
    assembler: &PresentationAssembler,
) -> Result<Presentation<'a, C>, PresentationExchangeError>
where
    C: Credential,
    O: SchemaConformance + ?Sized,
{
    let tree = inspect(definition, candidates, oracle)?;
    assembler.assemble(&tree)
}
