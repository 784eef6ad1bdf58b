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

//! Revocation evidence providers.
//!
//! A provider hands the revocation validator whatever CRLs and OCSP
//! responses it can supply for a certificate. [`StoredEvidence`] serves
//! evidence captured earlier (a document's DSS store, test fixtures);
//! [`AiaOcspFetcher`] queries the OCSP responders named in the
//! certificate's authority information access extension.

use std::io::Read;

use rasn::types::{Any, OctetString};
use rasn_pkix::Certificate;
use thiserror::Error;

use crate::{
    hash::sha1,
    revocation::RevocationEvidence,
    x509::{CertificateToken, CrlToken, OcspResponseToken, ParseError},
};

const MAX_RESPONSE_BYTES: u64 = 1_000_000;

/// Error from a revocation evidence provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvidenceError {
    /// The provider could not reach its source.
    #[error("unable to fetch revocation evidence: {0}")]
    Transport(String),

    /// Fetched bytes could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Supplies revocation evidence for a certificate.
///
/// Several providers can be registered side by side; the validator pools
/// what they return. Having nothing to offer is an empty `Ok`, not an
/// error. `issuer` is passed when the trust store resolves one, since OCSP
/// requests are keyed by issuer name and key hashes.
pub trait RevocationEvidenceProvider: Send + Sync {
    /// Returns the evidence this provider holds for `certificate`.
    fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: Option<&CertificateToken>,
    ) -> Result<Vec<RevocationEvidence>, EvidenceError>;
}

/// Provider serving a fixed set of evidence regardless of the certificate.
#[derive(Clone, Debug, Default)]
pub struct StoredEvidence {
    evidence: Vec<RevocationEvidence>,
}

impl StoredEvidence {
    /// Creates a provider serving `evidence`.
    pub fn new(evidence: Vec<RevocationEvidence>) -> Self {
        Self { evidence }
    }

    /// Creates a provider from separate CRL and OCSP token lists.
    pub fn from_tokens(crls: Vec<CrlToken>, ocsp_responses: Vec<OcspResponseToken>) -> Self {
        let mut evidence: Vec<RevocationEvidence> =
            crls.into_iter().map(RevocationEvidence::Crl).collect();
        evidence.extend(ocsp_responses.into_iter().map(RevocationEvidence::Ocsp));
        Self { evidence }
    }
}

impl RevocationEvidenceProvider for StoredEvidence {
    fn fetch(
        &self,
        _certificate: &CertificateToken,
        _issuer: Option<&CertificateToken>,
    ) -> Result<Vec<RevocationEvidence>, EvidenceError> {
        Ok(self.evidence.clone())
    }
}

/// Online provider querying the OCSP responders listed in the certificate's
/// authority information access extension.
///
/// A certificate without responder URLs, or without the DER material needed
/// to build a request, yields an empty pool rather than an error. When every
/// listed responder fails, the last failure is returned so the validator can
/// record it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AiaOcspFetcher;

impl RevocationEvidenceProvider for AiaOcspFetcher {
    fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: Option<&CertificateToken>,
    ) -> Result<Vec<RevocationEvidence>, EvidenceError> {
        if certificate.ocsp_urls.is_empty() {
            return Ok(Vec::new());
        }

        let Some(request_der) = build_request(certificate, issuer) else {
            log::debug!(
                "skipping OCSP fetch for {}: full DER for the certificate or its issuer is not available",
                certificate.subject
            );
            return Ok(Vec::new());
        };

        let mut evidence = Vec::new();
        let mut last_error = None;

        for responder_url in &certificate.ocsp_urls {
            match fetch_one(responder_url, &request_der) {
                Ok(response) => evidence.push(RevocationEvidence::Ocsp(response)),
                Err(err) => {
                    log::debug!("OCSP responder {responder_url} failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        match (evidence.is_empty(), last_error) {
            (true, Some(err)) => Err(err),
            _ => Ok(evidence),
        }
    }
}

fn fetch_one(responder_url: &str, request_der: &[u8]) -> Result<OcspResponseToken, EvidenceError> {
    let url =
        url::Url::parse(responder_url).map_err(|e| EvidenceError::Transport(e.to_string()))?;

    let request = ureq::post(url.as_str()).set("Content-Type", "application/ocsp-request");

    let request = match url.host() {
        Some(host) => request.set("Host", &host.to_string()), // for responders that don't support http 1.0
        None => request,
    };

    let response = request
        .send_bytes(request_der)
        .map_err(|e| EvidenceError::Transport(e.to_string()))?;

    if response.status() != 200 {
        return Err(EvidenceError::Transport(format!(
            "OCSP responder {responder_url} returned status {}",
            response.status()
        )));
    }

    let len: usize = response
        .header("Content-Length")
        .and_then(|s| s.parse().ok())
        .unwrap_or(10000);

    let mut body: Vec<u8> = Vec::with_capacity(len);
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|e| EvidenceError::Transport(e.to_string()))?;

    Ok(OcspResponseToken::from_der(&body)?)
}

// Builds the DER OCSP request for the certificate, keyed by SHA-1 hashes of
// the issuer name and key. Returns None when either token lacks its full
// DER, which happens for hand-built tokens.
fn build_request(
    certificate: &CertificateToken,
    issuer: Option<&CertificateToken>,
) -> Option<Vec<u8>> {
    let subject_der = certificate.der.as_deref()?;
    let issuer_der = issuer?.der.as_deref()?;

    let subject: Certificate = rasn::der::decode(subject_der).ok()?;
    let issuer: Certificate = rasn::der::decode(issuer_der).ok()?;

    let sha1_alg = rasn_pkix::AlgorithmIdentifier {
        algorithm: rasn::types::ObjectIdentifier::from(rasn::types::Oid::new(&[
            1, 3, 14, 3, 2, 26,
        ])?),
        // Many OCSP responders expect this to be NULL not None.
        parameters: Some(Any::new(rasn::der::encode(&()).ok()?)),
    };

    let issuer_name_raw = rasn::der::encode(&issuer.tbs_certificate.subject).ok()?;
    let issuer_key_raw = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_raw_slice();

    let req_cert = rasn_ocsp::CertId {
        hash_algorithm: sha1_alg,
        issuer_name_hash: OctetString::from(sha1(&issuer_name_raw)),
        issuer_key_hash: OctetString::from(sha1(issuer_key_raw)),
        serial_number: subject.tbs_certificate.serial_number,
    };

    let request = rasn_ocsp::Request {
        req_cert,
        single_request_extensions: None,
    };

    let tbs_request = rasn_ocsp::TbsRequest {
        version: rasn_ocsp::Version::from(0u8),
        requestor_name: None,
        request_list: vec![request],
        request_extensions: None,
    };

    let ocsp_request = rasn_ocsp::OcspRequest {
        tbs_request,
        optional_signature: None,
    };

    rasn::der::encode(&ocsp_request).ok()
}
