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

//! OCSP evidence validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docsig_report::{report_item, ValidationReport};

use crate::{
    context::{CertificateSource, ValidationContext, ValidatorRole},
    hash::sha1,
    properties::SignatureValidationProperties,
    revocation::{revoked_after_date_message, revoked_message},
    trust_store::{TrustCapability, TrustStore},
    verifier::{verify_token_signature, SignatureVerifier},
    x509::{
        CertStatus, CertificateToken, ExtendedKeyPurpose, OcspResponseToken, RequiredExtension,
        ResponderId, SingleResponseToken,
    },
};

/// Check name for all items produced by the OCSP validator.
pub const OCSP_CHECK: &str = "OCSP check";

const SERIAL_MISMATCH: &str = "serial numbers do not match";
const COULD_NOT_VERIFY: &str =
    "OCSP could not be verified: no certificate matches the responder identity.";
const INVALID_OCSP: &str =
    "invalid OCSP: the response signature does not verify against the responder key.";
const STATUS_UNKNOWN: &str = "certificate status unknown to the responder.";

/// Evaluates one OCSP single response against one certificate.
pub trait OcspValidation: Send + Sync {
    /// Appends the outcome of checking `certificate` against
    /// `single_response` (carried by `basic_response`) at `date` to `report`.
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        single_response: &SingleResponseToken,
        basic_response: &OcspResponseToken,
        date: DateTime<Utc>,
    );
}

/// Default OCSP evidence validator.
pub struct OcspValidator {
    properties: Arc<SignatureValidationProperties>,
    trust_store: Arc<TrustStore>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl OcspValidator {
    /// Creates a validator resolving issuers and trust through `trust_store`
    /// and checking response signatures through `verifier`.
    pub fn new(
        properties: Arc<SignatureValidationProperties>,
        trust_store: Arc<TrustStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            properties,
            trust_store,
            verifier,
        }
    }
}

impl OcspValidation for OcspValidator {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        single_response: &SingleResponseToken,
        basic_response: &OcspResponseToken,
        date: DateTime<Utc>,
    ) {
        let context = context.with_role(ValidatorRole::Ocsp);

        if single_response.serial != certificate.serial {
            report_item!(OCSP_CHECK, SERIAL_MISMATCH, "OcspValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }

        // The responder is either the certificate's own issuer or a
        // delegated signer: embedded in the response, matched by identity,
        // and either issued by the same authority or directly trusted.
        let issuer = self.trust_store.retrieve_issuer(certificate, &[]);
        let mut responder = None;
        if let Some(candidate) = &issuer {
            if matches_responder(candidate, &basic_response.responder) {
                responder = Some(candidate.clone());
            }
        }
        if responder.is_none() {
            responder = basic_response
                .certificates
                .iter()
                .find(|candidate| {
                    matches_responder(candidate, &basic_response.responder)
                        && (issued_by_same_authority(candidate, certificate)
                            || self
                                .trust_store
                                .is_trusted_for(candidate, TrustCapability::OcspResponseSigning))
                })
                .cloned();
        }
        let Some(responder) = responder else {
            report_item!(OCSP_CHECK, COULD_NOT_VERIFY, "OcspValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        };

        if let Err(err) = verify_token_signature(
            self.verifier.as_ref(),
            basic_response.tbs_der.as_deref(),
            basic_response.signature_value.as_deref(),
            &responder.spki_der,
            basic_response.signature_algorithm.as_deref(),
        ) {
            report_item!(OCSP_CHECK, INVALID_OCSP, "OcspValidator::validate")
                .with_cause(err)
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .invalid(report);
            return;
        }

        // Delegated responders must assert the OCSPSigning purpose; the
        // issuer itself and directly trusted responders are exempt.
        let responder_is_issuer = issuer
            .as_ref()
            .is_some_and(|candidate| candidate.fingerprint() == responder.fingerprint());
        let trusted_responder = self
            .trust_store
            .is_trusted_for(&responder, TrustCapability::OcspResponseSigning);
        if !responder_is_issuer && !trusted_responder {
            let required = RequiredExtension::ExtendedKeyUsage(ExtendedKeyPurpose::OcspSigning);
            if !responder.satisfies(&required) {
                report_item!(
                    OCSP_CHECK,
                    required.missing_message(),
                    "OcspValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
                return;
            }
        }

        let tolerance = self.properties.freshness(&context);
        let age = date.signed_duration_since(single_response.this_update);
        if age > tolerance {
            let window = single_response
                .this_update
                .checked_add_signed(tolerance)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            report_item!(
                OCSP_CHECK,
                format!(
                    "freshness check failed: the validation date {date} is after the acceptable window ending {window}."
                ),
                "OcspValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .indeterminate(report);
            return;
        }
        if let Some(next_update) = single_response.next_update {
            if date > next_update {
                report_item!(
                    OCSP_CHECK,
                    format!(
                        "OCSP response is no longer valid: nextUpdate {next_update} is before the validation date {date}."
                    ),
                    "OcspValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
                return;
            }
        }

        match &single_response.status {
            CertStatus::Good => {}
            CertStatus::Unknown => {
                report_item!(OCSP_CHECK, STATUS_UNKNOWN, "OcspValidator::validate")
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .indeterminate(report);
            }
            CertStatus::Revoked {
                revocation_time, ..
            } => {
                if *revocation_time > date {
                    report_item!(
                        OCSP_CHECK,
                        revoked_after_date_message(*revocation_time),
                        "OcspValidator::validate"
                    )
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .info(report);
                } else if context.source() == CertificateSource::OcspIssuer {
                    // A revoked responder makes its own evidence unusable
                    // rather than proving the signer bad.
                    report_item!(
                        OCSP_CHECK,
                        revoked_message(*revocation_time),
                        "OcspValidator::validate"
                    )
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .indeterminate(report);
                } else {
                    report_item!(
                        OCSP_CHECK,
                        revoked_message(*revocation_time),
                        "OcspValidator::validate"
                    )
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .invalid(report);
                }
            }
        }
    }
}

fn matches_responder(candidate: &CertificateToken, responder: &ResponderId) -> bool {
    match responder {
        ResponderId::ByName(name) => candidate
            .subject_der
            .as_deref()
            .is_some_and(|der| der == name.as_slice()),
        ResponderId::ByKey(key_hash) => sha1(&candidate.public_key_bits) == *key_hash,
    }
}

fn issued_by_same_authority(candidate: &CertificateToken, certificate: &CertificateToken) -> bool {
    match (&candidate.issuer_der, &certificate.issuer_der) {
        (Some(a), Some(b)) => a == b,
        _ => candidate.issuer == certificate.issuer,
    }
}
