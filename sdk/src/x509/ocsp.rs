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

use chrono::{DateTime, Utc};
use rasn_ocsp::{BasicOcspResponse, OcspResponse, OcspResponseStatus};

use crate::x509::{trim_serial, CertificateToken, ParseError, RevocationReason};

/// Identity a responder asserted in an OCSP response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResponderId {
    /// DER-encoded responder distinguished name.
    ByName(Vec<u8>),

    /// SHA-1 hash over the responder's subject-public-key bits.
    ByKey(Vec<u8>),
}

/// Status an OCSP response asserts for one certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertStatus {
    /// The certificate is not revoked.
    Good,

    /// The certificate is revoked.
    Revoked {
        /// When the revocation took effect.
        revocation_time: DateTime<Utc>,

        /// Reason code, when the responder supplied one.
        reason: Option<RevocationReason>,
    },

    /// The responder does not know the certificate.
    Unknown,
}

/// One single-response entry from a basic OCSP response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingleResponseToken {
    /// Serial number of the certificate the entry concerns, big-endian
    /// with no leading zero octets.
    pub serial: Vec<u8>,

    /// Asserted status.
    pub status: CertStatus,

    /// `thisUpdate` field.
    pub this_update: DateTime<Utc>,

    /// `nextUpdate` field, when present.
    pub next_update: Option<DateTime<Utc>>,
}

/// An owned, parsed view of one basic OCSP response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OcspResponseToken {
    /// Who signed the response.
    pub responder: ResponderId,

    /// When the responder produced the response.
    pub produced_at: DateTime<Utc>,

    /// Per-certificate entries, in response order.
    pub responses: Vec<SingleResponseToken>,

    /// Certificates the responder embedded to prove its authority.
    pub certificates: Vec<CertificateToken>,

    /// DER of the to-be-signed response data, kept for signature
    /// verification.
    pub tbs_der: Option<Vec<u8>>,

    /// Signature bits over [`Self::tbs_der`].
    pub signature_value: Option<Vec<u8>>,

    /// Dotted OID of the signature algorithm.
    pub signature_algorithm: Option<String>,
}

impl Default for SingleResponseToken {
    fn default() -> Self {
        Self {
            serial: Vec::new(),
            status: CertStatus::Good,
            this_update: DateTime::UNIX_EPOCH,
            next_update: None,
        }
    }
}

impl Default for OcspResponseToken {
    fn default() -> Self {
        Self {
            responder: ResponderId::ByName(Vec::new()),
            produced_at: DateTime::UNIX_EPOCH,
            responses: Vec::new(),
            certificates: Vec::new(),
            tbs_der: None,
            signature_value: None,
            signature_algorithm: None,
        }
    }
}

impl OcspResponseToken {
    /// Decode one DER-encoded `OCSPResponse`.
    ///
    /// The outer response must carry a successful status and embed a
    /// `BasicOCSPResponse`. Malformed certificates embedded alongside the
    /// response data are skipped, not fatal.
    pub fn from_der(der: &[u8]) -> Result<Self, ParseError> {
        let ocsp_response: OcspResponse =
            rasn::der::decode(der).map_err(|e| ParseError::OcspResponse(e.to_string()))?;

        if ocsp_response.status != OcspResponseStatus::Successful {
            return Err(ParseError::OcspNotSuccessful);
        }

        let response_bytes = ocsp_response
            .bytes
            .ok_or_else(|| ParseError::OcspResponse("no response data".to_string()))?;

        let basic_response: BasicOcspResponse = rasn::der::decode(&response_bytes.response)
            .map_err(|e| ParseError::OcspResponse(e.to_string()))?;

        let response_data = &basic_response.tbs_response_data;

        let responder = match &response_data.responder_id {
            rasn_ocsp::ResponderId::ByName(name) => {
                let name_der = rasn::der::encode(name)
                    .map_err(|e| ParseError::OcspResponse(e.to_string()))?;
                ResponderId::ByName(name_der)
            }
            rasn_ocsp::ResponderId::ByKey(key_hash) => ResponderId::ByKey(key_hash.to_vec()),
        };

        let mut responses = Vec::new();
        for single in &response_data.responses {
            let status = match &single.cert_status {
                rasn_ocsp::CertStatus::Good => CertStatus::Good,
                rasn_ocsp::CertStatus::Revoked(info) => CertStatus::Revoked {
                    revocation_time: info.revocation_time.with_timezone(&Utc),
                    reason: info
                        .revocation_reason
                        .as_ref()
                        .map(|reason| RevocationReason::from_code(*reason as u8)),
                },
                rasn_ocsp::CertStatus::Unknown(_) => CertStatus::Unknown,
            };

            responses.push(SingleResponseToken {
                serial: integer_bytes(&single.cert_id.serial_number)?,
                status,
                this_update: single.this_update.with_timezone(&Utc),
                next_update: single.next_update.as_ref().map(|t| t.with_timezone(&Utc)),
            });
        }

        let mut certificates = Vec::new();
        if let Some(certs) = &basic_response.certs {
            for cert in certs {
                let cert_der =
                    rasn::der::encode(cert).map_err(|e| ParseError::OcspResponse(e.to_string()))?;

                match CertificateToken::from_der(&cert_der) {
                    Ok(token) => certificates.push(token),
                    Err(err) => {
                        log::debug!("skipping malformed certificate in OCSP response: {err}");
                    }
                }
            }
        }

        Ok(OcspResponseToken {
            responder,
            produced_at: response_data.produced_at.with_timezone(&Utc),
            responses,
            certificates,
            tbs_der: rasn::der::encode(response_data).ok(),
            signature_value: Some(basic_response.signature.as_raw_slice().to_vec()),
            signature_algorithm: Some(basic_response.signature_algorithm.algorithm.to_string()),
        })
    }

    /// Look up the entry for a serial number, if the response carries one.
    pub fn response_for(&self, serial: &[u8]) -> Option<&SingleResponseToken> {
        let serial = trim_serial(serial);
        self.responses.iter().find(|single| single.serial == serial)
    }
}

// Serial numbers cross the rasn/x509-parser boundary as raw big-endian
// bytes so values from either decoder compare directly. Round-tripping
// through DER sidesteps the big-integer representation entirely.
fn integer_bytes(value: &rasn::types::Integer) -> Result<Vec<u8>, ParseError> {
    let der = rasn::der::encode(value).map_err(|e| ParseError::OcspResponse(e.to_string()))?;

    der_integer_contents(&der)
        .map(trim_serial)
        .ok_or(ParseError::Field("serialNumber"))
}

fn der_integer_contents(der: &[u8]) -> Option<&[u8]> {
    if *der.first()? != 0x02 {
        return None;
    }

    let mut idx = 1;
    let first = *der.get(idx)?;
    idx += 1;

    let len = if first & 0x80 == 0 {
        usize::from(first)
    } else {
        let count = usize::from(first & 0x7f);
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(*der.get(idx)?);
            idx += 1;
        }
        len
    };

    der.get(idx..idx + len)
}
