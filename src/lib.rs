//! This library implements the holder side of [DIF Presentation Exchange]:
//! finding which of a holder's verifiable credentials satisfy a presentation
//! definition, and assembling a presentation from them.
//!
//! [DIF Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Usage
//!
//! ```ignore
//! use credential_matcher::core::credential::JsonCredential;
//! use credential_matcher::core::matcher::DeclaredSchemas;
//! use credential_matcher::holder::assembler::PresentationAssembler;
//! use credential_matcher::presentation_exchange::{inspect, parse_and_validate, submit};
//!
//! // Parse and validate the verifier's presentation definition.
//! let definition = parse_and_validate(request_bytes)?;
//!
//! // Credentials whose proofs were already checked by the wallet.
//! let candidates: Vec<JsonCredential> = wallet_credentials();
//!
//! // Inspect every match, e.g. to let the user choose.
//! let tree = inspect(&definition, &candidates, &DeclaredSchemas)?;
//! for result in tree.descriptor_results() {
//!     println!("{}: {} match(es)", result.id(), result.matched_credentials().len());
//! }
//!
//! // Or directly build the presentation.
//! let presentation = submit(
//!     &definition,
//!     &candidates,
//!     &DeclaredSchemas,
//!     &PresentationAssembler::default().with_holder("did:example:holder"),
//! )?;
//! let unsigned_vp = presentation.to_json()?;
//! ```
//!
//! # Overview
//!
//! 1. *Claim resolution*: the claims of a credential as seen by the verifier,
//!    selectively disclosed claims taking precedence over embedded ones. See
//!    [`core::credential`].
//! 2. *Descriptor matching*: the candidates satisfying each input descriptor.
//!    See [`core::matcher`].
//! 3. *Requirement evaluation*: submission requirements evaluated into a
//!    tree. See [`core::requirement`].
//! 4. *Assembly*: one credential per satisfied input descriptor, packaged with
//!    its presentation submission. See [`holder::assembler`].
//!
//! Signing the presentation, checking credential proofs and fetching remote
//! documents are left to the caller. Schemas that need to be fetched are
//! resolved ahead of matching through [`core::schema_resolution`].

pub mod config;
pub mod core;
pub mod holder;
pub mod presentation_exchange;
pub mod utils;
pub use serde_json_path::JsonPath;
