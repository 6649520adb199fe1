use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

const FORMAT_JWT: &str = "jwt";
const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_LDP: &str = "ldp";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";
const FORMAT_DC_SD_JWT: &str = "dc+sd-jwt";
const FORMAT_MSO_MDOC: &str = "mso_mdoc";

/// A JSON object of claim formats, keyed by designation.
///
/// Appears both on the presentation definition and on each input descriptor,
/// restricting the credential formats a verifier accepts.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// The credential type that may be requested by an input descriptor.
pub type CredentialType = String;

/// Algorithms or proof types a verifier accepts for one claim format.
///
/// The payload is informational for the holder: the matcher only looks at the
/// designation keys of a [ClaimFormatMap], proof checking is external.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Claim format designation of a credential, as registered in the
/// [claim format registry](https://identity.foundation/claim-format-registry/#registry).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    /// A plain JSON Web Token.
    Jwt,

    /// A W3C Verifiable Credential secured as a JWT.
    JwtVc,

    /// Name used by OID4VP for [ClaimFormatDesignation::JwtVc].
    JwtVcJson,

    /// A Linked-Data Proof secured object.
    Ldp,

    /// A W3C Verifiable Credential secured with a Linked-Data Proof.
    LdpVc,

    /// An SD-JWT VC, using the legacy `vc+sd-jwt` media type.
    VcSdJwt,

    /// An SD-JWT VC.
    DcSdJwt,

    /// An ISO/IEC 18013-5 mobile document.
    MsoMDoc,

    /// Any designation not covered above.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT => Self::Jwt,
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_LDP => Self::Ldp,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_VC_SD_JWT => Self::VcSdJwt,
            FORMAT_DC_SD_JWT => Self::DcSdJwt,
            FORMAT_MSO_MDOC => Self::MsoMDoc,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Jwt => FORMAT_JWT,
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::Ldp => FORMAT_LDP,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::VcSdJwt => FORMAT_VC_SD_JWT,
            Self::DcSdJwt => FORMAT_DC_SD_JWT,
            Self::MsoMDoc => FORMAT_MSO_MDOC,
            Self::Other(other) => other,
        }
    }

    /// Whether credentials of this format can reveal claims independently of
    /// each other.
    pub fn is_selectively_disclosable(&self) -> bool {
        matches!(self, Self::VcSdJwt | Self::DcSdJwt | Self::MsoMDoc)
    }

    /// Whether a verifier accepting `accepted` would accept a credential in this format.
    ///
    /// `jwt_vc` and `jwt_vc_json` name the same credential format, as do
    /// `vc+sd-jwt` and `dc+sd-jwt`.
    pub fn is_accepted_as(&self, accepted: &ClaimFormatDesignation) -> bool {
        use ClaimFormatDesignation::*;

        match (self, accepted) {
            (JwtVc | JwtVcJson, JwtVc | JwtVcJson) => true,
            (VcSdJwt | DcSdJwt, VcSdJwt | DcSdJwt) => true,
            (a, b) => a == b,
        }
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(format: ClaimFormatDesignation) -> Self {
        format.name().to_owned()
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn claim_format_map_parsing() {
        let value = json!({
            "jwt_vc": { "alg": ["ES256", "EdDSA"] },
            "ldp_vc": { "proof_type": ["Ed25519Signature2018"] },
            "dc+sd-jwt": { "sd-jwt_alg_values": ["ES256"], "kb-jwt_alg_values": ["ES256"] },
            "com.example.custom_vc": { "version": "1.0" }
        });

        let map: ClaimFormatMap = serde_json::from_value(value).unwrap();

        assert_eq!(
            map.get(&ClaimFormatDesignation::JwtVc),
            Some(&ClaimFormatPayload::Alg(vec!["ES256".into(), "EdDSA".into()]))
        );
        assert!(map.contains_key(&ClaimFormatDesignation::LdpVc));
        assert!(matches!(
            map.get(&ClaimFormatDesignation::DcSdJwt),
            Some(ClaimFormatPayload::Other(_))
        ));
        assert!(map.contains_key(&ClaimFormatDesignation::Other(
            "com.example.custom_vc".into()
        )));
    }

    #[test]
    fn equivalent_designations() {
        assert!(ClaimFormatDesignation::JwtVcJson.is_accepted_as(&ClaimFormatDesignation::JwtVc));
        assert!(ClaimFormatDesignation::VcSdJwt.is_accepted_as(&ClaimFormatDesignation::DcSdJwt));
        assert!(!ClaimFormatDesignation::LdpVc.is_accepted_as(&ClaimFormatDesignation::JwtVc));
        assert_eq!(
            ClaimFormatDesignation::from("dc+sd-jwt").to_string(),
            "dc+sd-jwt".to_string()
        );
    }
}
