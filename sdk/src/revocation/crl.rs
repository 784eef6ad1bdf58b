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

//! CRL evidence validation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use docsig_report::{report_item, ValidationReport};

use crate::{
    context::{ValidationContext, ValidatorRole},
    revocation::{revoked_after_date_message, revoked_message},
    trust_store::TrustStore,
    verifier::{verify_token_signature, SignatureVerifier},
    x509::{CertificateToken, CrlScope, CrlToken, RevocationReason},
};

/// Check name for all items produced by the CRL validator.
pub const CRL_CHECK: &str = "CRL check";

const ISSUER_NOT_FOUND: &str = "CRL issuer not found among the known certificates.";
const NO_COMMON_ROOT: &str = "CRL issuer and certificate share no common root of trust.";
const CRL_INVALID: &str = "CRL is invalid: the signature does not verify against the issuer key.";
const ONLY_CA_CERTS: &str = "certificate is not in CRL scope: the CRL covers CA certificates only.";
const ONLY_USER_CERTS: &str =
    "certificate is not in CRL scope: the CRL covers user certificates only.";
const ONLY_ATTRIBUTE_CERTS: &str =
    "CRL asserts attribute certs only and cannot vouch for the certificate.";
const ONLY_SOME_REASONS: &str =
    "only some reasons checked: the CRL covers a subset of revocation reasons.";
const SAME_REASONS: &str =
    "same reasons check: earlier CRLs already covered the complementary revocation reasons.";
const CERTIFICATE_UNREVOKED: &str =
    "certificate unrevoked: the CRL entry carries the removeFromCRL reason.";

/// Evaluates one CRL against one certificate.
pub trait CrlValidation: Send + Sync {
    /// Appends the outcome of checking `certificate` against `crl` at `date`
    /// to `report`.
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        crl: &CrlToken,
        date: DateTime<Utc>,
    );
}

/// Default CRL evidence validator.
///
/// Carries per-certificate state: the reason masks of every partial-scope
/// CRL seen for a certificate are unioned across calls, so a set of CRLs
/// that together cover all revocation reasons is accepted even though each
/// one alone covers only a subset.
pub struct CrlValidator {
    trust_store: Arc<TrustStore>,
    verifier: Arc<dyn SignatureVerifier>,
    checked_reasons: Mutex<HashMap<Vec<u8>, u32>>,
}

impl CrlValidator {
    /// Creates a validator resolving issuers and trust through `trust_store`
    /// and checking CRL signatures through `verifier`.
    pub fn new(trust_store: Arc<TrustStore>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            trust_store,
            verifier,
            checked_reasons: Mutex::new(HashMap::new()),
        }
    }

    // Folds `reasons` into the running union for the certificate and
    // returns the union after the fold.
    fn record_reasons(&self, certificate: &CertificateToken, reasons: u32) -> u32 {
        let mut checked = match self.checked_reasons.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let union = checked.entry(certificate.fingerprint()).or_insert(0);
        *union |= reasons;
        *union
    }
}

impl CrlValidation for CrlValidator {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        crl: &CrlToken,
        date: DateTime<Utc>,
    ) {
        let context = context.with_role(ValidatorRole::Crl);

        let candidates = self
            .trust_store
            .certificates_by_subject(&crl.issuer, crl.issuer_der.as_deref());
        if candidates.is_empty() {
            report_item!(CRL_CHECK, ISSUER_NOT_FOUND, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }

        let mut last_err = None;
        let issuer = candidates.iter().find(|candidate| {
            match verify_token_signature(
                self.verifier.as_ref(),
                crl.tbs_der.as_deref(),
                crl.signature_value.as_deref(),
                &candidate.spki_der,
                crl.signature_algorithm.as_deref(),
            ) {
                Ok(()) => true,
                Err(err) => {
                    last_err = Some(err);
                    false
                }
            }
        });
        let Some(issuer) = issuer else {
            let item = report_item!(CRL_CHECK, CRL_INVALID, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context);
            let item = match last_err {
                Some(err) => item.with_cause(err),
                None => item,
            };
            item.indeterminate(report);
            return;
        };

        if !self.trust_store.share_trust_root(certificate, issuer) {
            report_item!(CRL_CHECK, NO_COMMON_ROOT, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }

        if let Some(next_update) = crl.next_update {
            if next_update < date {
                report_item!(
                    CRL_CHECK,
                    format!("CRL nextUpdate {next_update} is before the check date {date}."),
                    "CrlValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
                return;
            }
        }

        if crl.scope.only_attribute_certs {
            report_item!(CRL_CHECK, ONLY_ATTRIBUTE_CERTS, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }
        if crl.scope.only_ca_certs && !certificate.is_ca {
            report_item!(CRL_CHECK, ONLY_CA_CERTS, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }
        if crl.scope.only_user_certs && certificate.is_ca {
            report_item!(CRL_CHECK, ONLY_USER_CERTS, "CrlValidator::validate")
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
            return;
        }

        if !crl.scope.covers_all_reasons() {
            // Record before judging: a later CRL covering the complement
            // completes the union even though this one is rejected.
            let union = self.record_reasons(certificate, crl.scope.reasons);
            if union == CrlScope::ALL_REASONS {
                report_item!(CRL_CHECK, SAME_REASONS, "CrlValidator::validate")
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .info(report);
            } else {
                report_item!(CRL_CHECK, ONLY_SOME_REASONS, "CrlValidator::validate")
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .indeterminate(report);
                return;
            }
        }

        if date > certificate.not_after {
            let covered = crl
                .expired_certs_on_crl
                .is_some_and(|reference| certificate.not_after >= reference);
            if !covered {
                report_item!(
                    CRL_CHECK,
                    format!(
                        "certificate is expired on {} and cannot be checked against the CRL.",
                        certificate.not_after
                    ),
                    "CrlValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
                return;
            }
        }

        match crl.find_entry(&certificate.serial) {
            None => {}
            Some(entry) if entry.reason == Some(RevocationReason::RemoveFromCrl) => {
                report_item!(CRL_CHECK, CERTIFICATE_UNREVOKED, "CrlValidator::validate")
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .info(report);
            }
            Some(entry) if entry.revocation_date > date => {
                report_item!(
                    CRL_CHECK,
                    revoked_after_date_message(entry.revocation_date),
                    "CrlValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .info(report);
            }
            Some(entry) => {
                report_item!(
                    CRL_CHECK,
                    revoked_message(entry.revocation_date),
                    "CrlValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .invalid(report);
            }
        }
    }
}
