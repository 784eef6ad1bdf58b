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

use asn1_rs::{oid, Oid};
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use crate::x509::{datetime_from_unix, trim_serial, ParseError};

/// Revocation reason codes from RFC 5280, section 5.3.1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevocationReason {
    /// `unspecified` (0). Also used for codes this crate does not model.
    Unspecified,

    /// `keyCompromise` (1).
    KeyCompromise,

    /// `cACompromise` (2).
    CaCompromise,

    /// `affiliationChanged` (3).
    AffiliationChanged,

    /// `superseded` (4).
    Superseded,

    /// `cessationOfOperation` (5).
    CessationOfOperation,

    /// `certificateHold` (6).
    CertificateHold,

    /// `removeFromCRL` (8). An entry with this code revokes a prior hold,
    /// so the certificate counts as not revoked.
    RemoveFromCrl,

    /// `privilegeWithdrawn` (9).
    PrivilegeWithdrawn,

    /// `aACompromise` (10).
    AaCompromise,
}

impl RevocationReason {
    /// Map a raw reason code onto the modeled set. Unknown codes collapse
    /// to [`RevocationReason::Unspecified`].
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => Self::Unspecified,
        }
    }
}

/// One revoked-certificate entry from a CRL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrlEntry {
    /// Serial number of the revoked certificate, big-endian with no
    /// leading zero octets.
    pub serial: Vec<u8>,

    /// When the revocation took effect.
    pub revocation_date: DateTime<Utc>,

    /// Reason code, when the entry carries one.
    pub reason: Option<RevocationReason>,
}

/// Coverage a CRL asserts through its issuing-distribution-point
/// extension.
///
/// A CRL without the extension covers every certificate kind and every
/// revocation reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CrlScope {
    /// The CRL only covers end-entity certificates.
    pub only_user_certs: bool,

    /// The CRL only covers CA certificates.
    pub only_ca_certs: bool,

    /// The CRL only covers attribute certificates.
    pub only_attribute_certs: bool,

    /// Covered revocation reasons as a bit mask; bit `i` set means reason
    /// `i` is covered. [`CrlScope::ALL_REASONS`] when the CRL carries no
    /// `onlySomeReasons` restriction.
    pub reasons: u32,
}

impl CrlScope {
    /// Mask value meaning every revocation reason is covered.
    pub const ALL_REASONS: u32 = u32::MAX;

    /// True if the CRL asserts no reason restriction.
    pub fn covers_all_reasons(&self) -> bool {
        self.reasons == Self::ALL_REASONS
    }
}

impl Default for CrlScope {
    fn default() -> Self {
        Self {
            only_user_certs: false,
            only_ca_certs: false,
            only_attribute_certs: false,
            reasons: Self::ALL_REASONS,
        }
    }
}

/// An owned, parsed view of one certificate revocation list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrlToken {
    /// Rendered issuer distinguished name.
    pub issuer: String,

    /// Raw DER of the issuer name, when the token came from wire data.
    pub issuer_der: Option<Vec<u8>>,

    /// `thisUpdate` field.
    pub this_update: DateTime<Utc>,

    /// `nextUpdate` field, when present.
    pub next_update: Option<DateTime<Utc>>,

    /// Revoked-certificate entries, in list order.
    pub entries: Vec<CrlEntry>,

    /// Coverage asserted by the issuing-distribution-point extension.
    pub scope: CrlScope,

    /// Reference date of the `expiredCertsOnCRL` extension, when present:
    /// certificates that expired before it are still covered by this CRL.
    pub expired_certs_on_crl: Option<DateTime<Utc>>,

    /// DER of the to-be-signed portion, kept for signature verification.
    pub tbs_der: Option<Vec<u8>>,

    /// Signature bits over [`Self::tbs_der`].
    pub signature_value: Option<Vec<u8>>,

    /// Dotted OID of the signature algorithm.
    pub signature_algorithm: Option<String>,
}

impl Default for CrlToken {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            issuer_der: None,
            this_update: DateTime::UNIX_EPOCH,
            next_update: None,
            entries: Vec::new(),
            scope: CrlScope::default(),
            expired_certs_on_crl: None,
            tbs_der: None,
            signature_value: None,
            signature_algorithm: None,
        }
    }
}

impl CrlToken {
    /// Decode one DER-encoded CRL.
    pub fn from_der(der: &[u8]) -> Result<Self, ParseError> {
        let (_, crl) =
            CertificateRevocationList::from_der(der).map_err(|e| ParseError::Crl(e.to_string()))?;

        let next_update = match crl.next_update() {
            Some(time) => Some(datetime_from_unix(time.timestamp(), "nextUpdate")?),
            None => None,
        };

        let mut entries = Vec::new();
        for revoked in crl.iter_revoked_certificates() {
            let reason = revoked
                .reason_code()
                .map(|(_, code)| RevocationReason::from_code(code.0));

            entries.push(CrlEntry {
                serial: trim_serial(revoked.raw_serial()),
                revocation_date: datetime_from_unix(
                    revoked.revocation_date.timestamp(),
                    "revocationDate",
                )?,
                reason,
            });
        }

        let mut scope = CrlScope::default();
        let mut expired_certs_on_crl = None;

        for ext in crl.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::IssuingDistributionPoint(idp) => {
                    scope.only_user_certs = idp.only_contains_user_certs;
                    scope.only_ca_certs = idp.only_contains_ca_certs;
                    scope.only_attribute_certs = idp.only_contains_attribute_certs;
                    if let Some(flags) = &idp.only_some_reasons {
                        scope.reasons = u32::from(flags.flags);
                    }
                }

                _ => {
                    if ext.oid == EXPIRED_CERTS_ON_CRL_OID {
                        expired_certs_on_crl = parse_generalized_time(ext.value);
                    }
                }
            }
        }

        Ok(CrlToken {
            issuer: crl.issuer().to_string(),
            issuer_der: Some(crl.issuer().as_raw().to_vec()),
            this_update: datetime_from_unix(crl.last_update().timestamp(), "thisUpdate")?,
            next_update,
            entries,
            scope,
            expired_certs_on_crl,
            tbs_der: Some(crl.tbs_cert_list.as_ref().to_vec()),
            signature_value: Some(crl.signature_value.data.to_vec()),
            signature_algorithm: Some(crl.signature_algorithm.algorithm.to_id_string()),
        })
    }

    /// Look up the entry for a serial number, if the CRL lists it.
    pub fn find_entry(&self, serial: &[u8]) -> Option<&CrlEntry> {
        let serial = trim_serial(serial);
        self.entries.iter().find(|entry| entry.serial == serial)
    }
}

// The `expiredCertsOnCRL` value is a bare GeneralizedTime.
fn parse_generalized_time(value: &[u8]) -> Option<DateTime<Utc>> {
    let (_, time) = ASN1Time::from_der(value).ok()?;
    DateTime::from_timestamp(time.timestamp(), 0)
}

const EXPIRED_CERTS_ON_CRL_OID: Oid<'static> = oid!(2.5.29 .60);
