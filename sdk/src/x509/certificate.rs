// Copyright 2024 The docsig contributors. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use std::fmt;

use asn1_rs::{oid, Oid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::{pem::Pem, prelude::*};

use crate::x509::{datetime_from_unix, trim_serial, ParseError};

/// Key-usage bits a validation policy can require on a certificate.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyUsageFlag {
    /// `digitalSignature` (bit 0).
    DigitalSignature,

    /// `nonRepudiation` / `contentCommitment` (bit 1).
    NonRepudiation,

    /// `keyCertSign` (bit 5).
    KeyCertSign,

    /// `cRLSign` (bit 6).
    CrlSign,
}

impl fmt::Display for KeyUsageFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DigitalSignature => "digitalSignature",
            Self::NonRepudiation => "nonRepudiation",
            Self::KeyCertSign => "keyCertSign",
            Self::CrlSign => "cRLSign",
        };

        f.write_str(name)
    }
}

/// Extended-key-usage purposes that participate in trust decisions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtendedKeyPurpose {
    /// `id-kp-OCSPSigning`.
    OcspSigning,

    /// `id-kp-timeStamping`.
    TimeStamping,
}

impl fmt::Display for ExtendedKeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OcspSigning => "OCSPSigning",
            Self::TimeStamping => "timeStamping",
        };

        f.write_str(name)
    }
}

/// A certificate extension a validation policy requires to be present.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredExtension {
    /// A bit that must be set in the key-usage extension.
    KeyUsage(KeyUsageFlag),

    /// A purpose that must appear in the extended-key-usage extension.
    ExtendedKeyUsage(ExtendedKeyPurpose),
}

impl RequiredExtension {
    /// Report message for a certificate that lacks this extension.
    pub(crate) fn missing_message(&self) -> String {
        format!("required extension {self} is missing.")
    }
}

impl fmt::Display for RequiredExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyUsage(flag) => write!(f, "key usage {flag}"),
            Self::ExtendedKeyUsage(purpose) => write!(f, "extended key usage {purpose}"),
        }
    }
}

/// Reason a certificate failed its validity-period check.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ValidityError {
    /// The certificate only becomes valid after the queried date.
    #[error("certificate is not valid before {not_before}, queried at {date}")]
    NotYetValid {
        /// Start of the certificate's validity period.
        not_before: DateTime<Utc>,

        /// Date the check ran against.
        date: DateTime<Utc>,
    },

    /// The certificate expired before the queried date.
    #[error("certificate expired at {not_after}, queried at {date}")]
    Expired {
        /// End of the certificate's validity period.
        not_after: DateTime<Utc>,

        /// Date the check ran against.
        date: DateTime<Utc>,
    },
}

/// An owned, parsed view of one X.509 certificate.
///
/// The validators consume tokens, never raw DER; [`CertificateToken::from_der`]
/// and [`CertificateToken::from_pem_multi`] adapt wire data at the boundary,
/// and tests build tokens directly via struct-update syntax over
/// [`Default::default`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateToken {
    /// Rendered subject distinguished name.
    pub subject: String,

    /// Rendered issuer distinguished name.
    pub issuer: String,

    /// Raw DER of the subject name, when the token came from wire data.
    pub subject_der: Option<Vec<u8>>,

    /// Raw DER of the issuer name, when the token came from wire data.
    pub issuer_der: Option<Vec<u8>>,

    /// Serial number, big-endian with no leading zero octets.
    pub serial: Vec<u8>,

    /// Start of the validity period.
    pub not_before: DateTime<Utc>,

    /// End of the validity period.
    pub not_after: DateTime<Utc>,

    /// DER of the full `SubjectPublicKeyInfo` structure.
    pub spki_der: Vec<u8>,

    /// Contents of the subject-public-key bit string.
    pub public_key_bits: Vec<u8>,

    /// Subject key identifier, when the extension is present.
    pub subject_key_identifier: Option<Vec<u8>>,

    /// Authority key identifier, when the extension is present.
    pub authority_key_identifier: Option<Vec<u8>>,

    /// Basic-constraints CA flag.
    pub is_ca: bool,

    /// Asserted key-usage bits, restricted to the flags trust decisions
    /// care about.
    pub key_usage: Vec<KeyUsageFlag>,

    /// Asserted extended-key-usage purposes, restricted likewise.
    pub extended_key_usage: Vec<ExtendedKeyPurpose>,

    /// The `id-pkix-ocsp-nocheck` extension is present.
    pub ocsp_no_check: bool,

    /// OCSP responder URLs from the authority-info-access extension.
    pub ocsp_urls: Vec<String>,

    /// CRL URLs from the CRL-distribution-points extension.
    pub crl_urls: Vec<String>,

    /// Dotted OID of the signature algorithm.
    pub signature_algorithm: Option<String>,

    /// DER of the to-be-signed portion, kept for signature verification.
    pub tbs_der: Option<Vec<u8>>,

    /// Signature bits over [`Self::tbs_der`].
    pub signature_value: Option<Vec<u8>>,

    /// Full DER of the certificate, when the token came from wire data.
    pub der: Option<Vec<u8>>,
}

impl Default for CertificateToken {
    fn default() -> Self {
        Self {
            subject: String::new(),
            issuer: String::new(),
            subject_der: None,
            issuer_der: None,
            serial: Vec::new(),
            not_before: DateTime::UNIX_EPOCH,
            not_after: DateTime::UNIX_EPOCH,
            spki_der: Vec::new(),
            public_key_bits: Vec::new(),
            subject_key_identifier: None,
            authority_key_identifier: None,
            is_ca: false,
            key_usage: Vec::new(),
            extended_key_usage: Vec::new(),
            ocsp_no_check: false,
            ocsp_urls: Vec::new(),
            crl_urls: Vec::new(),
            signature_algorithm: None,
            tbs_der: None,
            signature_value: None,
            der: None,
        }
    }
}

impl CertificateToken {
    /// Decode one DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, ParseError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ParseError::Certificate(e.to_string()))?;

        let mut token = Self::from_parsed(&cert)?;
        token.der = Some(der.to_vec());

        Ok(token)
    }

    /// Decode every `CERTIFICATE` block in a PEM buffer.
    ///
    /// Blocks with other labels are skipped. An empty buffer yields an
    /// empty list, not an error.
    pub fn from_pem_multi(pem: &[u8]) -> Result<Vec<Self>, ParseError> {
        let mut tokens = Vec::new();

        for block in Pem::iter_from_buffer(pem) {
            let block = block.map_err(|e| ParseError::Pem(e.to_string()))?;
            if block.label == "CERTIFICATE" {
                tokens.push(Self::from_der(&block.contents)?);
            }
        }

        Ok(tokens)
    }

    fn from_parsed(cert: &X509Certificate<'_>) -> Result<Self, ParseError> {
        let validity = cert.validity();
        let public_key = cert.public_key();

        let mut token = CertificateToken {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_der: Some(cert.subject().as_raw().to_vec()),
            issuer_der: Some(cert.issuer().as_raw().to_vec()),
            serial: trim_serial(cert.raw_serial()),
            not_before: datetime_from_unix(validity.not_before.timestamp(), "notBefore")?,
            not_after: datetime_from_unix(validity.not_after.timestamp(), "notAfter")?,
            spki_der: public_key.raw.to_vec(),
            public_key_bits: public_key.subject_public_key.data.to_vec(),
            is_ca: cert.tbs_certificate.is_ca(),
            signature_algorithm: Some(cert.signature_algorithm.algorithm.to_id_string()),
            tbs_der: Some(cert.tbs_certificate.as_ref().to_vec()),
            signature_value: Some(cert.signature_value.data.to_vec()),
            ..Default::default()
        };

        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::KeyUsage(ku) => {
                    if ku.digital_signature() {
                        token.key_usage.push(KeyUsageFlag::DigitalSignature);
                    }
                    if ku.non_repudiation() {
                        token.key_usage.push(KeyUsageFlag::NonRepudiation);
                    }
                    if ku.key_cert_sign() {
                        token.key_usage.push(KeyUsageFlag::KeyCertSign);
                    }
                    if ku.crl_sign() {
                        token.key_usage.push(KeyUsageFlag::CrlSign);
                    }
                }

                ParsedExtension::ExtendedKeyUsage(eku) => {
                    if eku.ocsp_signing {
                        token.extended_key_usage.push(ExtendedKeyPurpose::OcspSigning);
                    }
                    if eku.time_stamping {
                        token.extended_key_usage.push(ExtendedKeyPurpose::TimeStamping);
                    }
                }

                ParsedExtension::SubjectKeyIdentifier(ski) => {
                    token.subject_key_identifier = Some(ski.0.to_vec());
                }

                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    token.authority_key_identifier =
                        aki.key_identifier.as_ref().map(|ki| ki.0.to_vec());
                }

                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for ad in &aia.accessdescs {
                        if let GeneralName::URI(uri) = ad.access_location {
                            if ad.access_method == AD_OCSP_OID {
                                token.ocsp_urls.push(uri.to_string());
                            }
                        }
                    }
                }

                ParsedExtension::CRLDistributionPoints(points) => {
                    for point in &points.points {
                        if let Some(DistributionPointName::FullName(names)) =
                            &point.distribution_point
                        {
                            for name in names {
                                if let GeneralName::URI(uri) = name {
                                    token.crl_urls.push((*uri).to_string());
                                }
                            }
                        }
                    }
                }

                _ => {
                    if ext.oid == OCSP_NO_CHECK_OID {
                        token.ocsp_no_check = true;
                    }
                }
            }
        }

        Ok(token)
    }

    /// Check the validity period against `date`.
    pub fn check_validity_at(&self, date: DateTime<Utc>) -> Result<(), ValidityError> {
        if date < self.not_before {
            return Err(ValidityError::NotYetValid {
                not_before: self.not_before,
                date,
            });
        }

        if date > self.not_after {
            return Err(ValidityError::Expired {
                not_after: self.not_after,
                date,
            });
        }

        Ok(())
    }

    /// True if `date` falls inside the validity period.
    pub fn is_valid_at(&self, date: DateTime<Utc>) -> bool {
        self.check_validity_at(date).is_ok()
    }

    /// True if the token asserts the given key-usage bit.
    pub fn has_key_usage(&self, flag: KeyUsageFlag) -> bool {
        self.key_usage.contains(&flag)
    }

    /// True if the token asserts the given extended-key-usage purpose.
    pub fn has_extended_key_usage(&self, purpose: ExtendedKeyPurpose) -> bool {
        self.extended_key_usage.contains(&purpose)
    }

    /// True if the token carries the given required extension.
    pub fn satisfies(&self, required: &RequiredExtension) -> bool {
        match required {
            RequiredExtension::KeyUsage(flag) => self.has_key_usage(*flag),
            RequiredExtension::ExtendedKeyUsage(purpose) => {
                self.has_extended_key_usage(*purpose)
            }
        }
    }

    /// True if subject and issuer name are the same.
    pub fn is_self_signed(&self) -> bool {
        match (&self.subject_der, &self.issuer_der) {
            (Some(subject), Some(issuer)) => subject == issuer,
            _ => self.subject == self.issuer,
        }
    }

    /// Stable identity of this token, independent of how it was built.
    ///
    /// SHA-256 over the subject name, serial number, and public-key info.
    pub fn fingerprint(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.subject.as_bytes());
        hasher.update(&self.serial);
        hasher.update(&self.spki_der);
        hasher.finalize().to_vec()
    }

    /// Serial number as lowercase hex, for report messages.
    pub fn serial_hex(&self) -> String {
        const_hex::encode(&self.serial)
    }
}

const AD_OCSP_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .48 .1);
const OCSP_NO_CHECK_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .48 .1 .5);
