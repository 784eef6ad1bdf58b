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

//! Certificate chain validation.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use docsig_report::{report_item, ValidationReport, ValidationResult};

use crate::{
    context::{CertificateSource, ValidationContext, ValidatorRole},
    properties::SignatureValidationProperties,
    revocation::{RevocationChecking, RevocationDataValidator},
    trust_store::TrustStore,
    verifier::{verify_token_signature, SignatureVerifier, VerificationError},
    x509::CertificateToken,
};

/// Check name for trust and issuer items.
pub const CERTIFICATE_CHECK: &str = "certificate check";

/// Check name for validity-period items.
pub const VALIDITY_CHECK: &str = "validity check";

/// Check name for required-extension items.
pub const EXTENSIONS_CHECK: &str = "required extensions check";

const ISSUER_MISSING: &str = "certificate issuer is missing.";
const ISSUER_NOT_VERIFIED: &str =
    "issuer cannot be verified: the certificate signature does not verify against the issuer key.";

/// Walks a certificate chain up to a trust anchor.
pub trait ChainValidation: Send + Sync {
    /// Appends the outcome of walking from `certificate` towards a trusted
    /// anchor at `date` to `report`.
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        date: DateTime<Utc>,
    );
}

/// Default chain validator.
///
/// Each certificate on the walk is checked for trust, validity, and the
/// extensions its source requires, then handed to the revocation delegate;
/// the walk then re-enters one level up under the `CertIssuer` source. The
/// source the walk was entered with keeps counting for capability matching,
/// so a root trusted for, say, timestamping anchors a chain examined under
/// the `Timestamp` source even though the walk reaches it as an issuer.
pub struct CertificateChainValidator {
    properties: Arc<SignatureValidationProperties>,
    trust_store: Arc<TrustStore>,
    verifier: Arc<dyn SignatureVerifier>,
    revocation: Box<dyn RevocationChecking>,
}

impl CertificateChainValidator {
    /// Creates a validator delegating revocation to a
    /// [`RevocationDataValidator`] with no registered evidence providers.
    pub fn new(
        properties: Arc<SignatureValidationProperties>,
        trust_store: Arc<TrustStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            revocation: Box::new(RevocationDataValidator::new(
                properties.clone(),
                trust_store.clone(),
                verifier.clone(),
            )),
            properties,
            trust_store,
            verifier,
        }
    }

    /// Replaces the revocation delegate.
    pub fn set_revocation_checking(&mut self, revocation: Box<dyn RevocationChecking>) {
        self.revocation = revocation;
    }

    fn should_stop(&self, report: &ValidationReport, context: &ValidationContext) -> bool {
        report.result() != ValidationResult::Valid
            && !self.properties.continue_after_failure(context)
    }

    fn validate_link(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        entry_source: CertificateSource,
        certificate: &CertificateToken,
        date: DateTime<Utc>,
        visited: &mut HashSet<Vec<u8>>,
    ) {
        // Revisiting a certificate means the issuer links loop back on
        // themselves; the walk ends as if the issuer were absent.
        if !visited.insert(certificate.fingerprint()) {
            report_item!(
                CERTIFICATE_CHECK,
                ISSUER_MISSING,
                "CertificateChainValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .indeterminate(report);
            return;
        }

        if self
            .trust_store
            .is_trusted_for_source(certificate, context.source())
            || self
                .trust_store
                .is_trusted_for_source(certificate, entry_source)
        {
            report_item!(
                CERTIFICATE_CHECK,
                format!("certificate {} is trusted.", certificate.subject),
                "CertificateChainValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .info(report);
            return;
        }

        if self.trust_store.is_trusted(certificate) {
            report_item!(
                CERTIFICATE_CHECK,
                format!(
                    "certificate {} is trusted for a different context.",
                    certificate.subject
                ),
                "CertificateChainValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .indeterminate(report);
            if self.should_stop(report, &context) {
                return;
            }
        }

        if let Err(err) = certificate.check_validity_at(date) {
            report_item!(
                VALIDITY_CHECK,
                format!(
                    "certificate {} is outside its validity period.",
                    certificate.subject
                ),
                "CertificateChainValidator::validate"
            )
            .with_cause(err)
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .invalid(report);
            if self.should_stop(report, &context) {
                return;
            }
        }

        for required in self.properties.required_extensions(&context) {
            if !certificate.satisfies(&required) {
                report_item!(
                    EXTENSIONS_CHECK,
                    required.missing_message(),
                    "CertificateChainValidator::validate"
                )
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .invalid(report);
            }
        }
        if self.should_stop(report, &context) {
            return;
        }

        self.revocation.validate(report, context, certificate, date);
        if self.should_stop(report, &context) {
            return;
        }

        let Some(issuer) = self.trust_store.retrieve_issuer(certificate, &[]) else {
            report_item!(
                CERTIFICATE_CHECK,
                ISSUER_MISSING,
                "CertificateChainValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .indeterminate(report);
            return;
        };

        match verify_token_signature(
            self.verifier.as_ref(),
            certificate.tbs_der.as_deref(),
            certificate.signature_value.as_deref(),
            &issuer.spki_der,
            certificate.signature_algorithm.as_deref(),
        ) {
            Ok(()) => {}
            Err(err @ VerificationError::SignatureMismatch) => {
                report_item!(
                    CERTIFICATE_CHECK,
                    ISSUER_NOT_VERIFIED,
                    "CertificateChainValidator::validate"
                )
                .with_cause(err)
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .invalid(report);
                if self.should_stop(report, &context) {
                    return;
                }
            }
            Err(err) => {
                report_item!(
                    CERTIFICATE_CHECK,
                    ISSUER_NOT_VERIFIED,
                    "CertificateChainValidator::validate"
                )
                .with_cause(err)
                .for_certificate(certificate.subject.clone())
                .with_context(context)
                .indeterminate(report);
                if self.should_stop(report, &context) {
                    return;
                }
            }
        }

        let context = context.with_source(CertificateSource::CertIssuer);
        self.validate_link(report, context, entry_source, &issuer, date, visited);
    }
}

impl ChainValidation for CertificateChainValidator {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        date: DateTime<Utc>,
    ) {
        let context = context.with_role(ValidatorRole::CertificateChain);

        log::debug!(
            "validating certificate chain for {} at {date}",
            certificate.subject
        );

        let mut visited = HashSet::new();
        self.validate_link(
            report,
            context,
            context.source(),
            certificate,
            date,
            &mut visited,
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use chrono::TimeZone;
    use docsig_report::ReportItemStatus;

    use super::*;
    use crate::{
        context::{CertificateSources, Moment, Moments, ValidatorRoles},
        trust_store::TrustCapability,
        verifier::NoVerification,
        x509::KeyUsageFlag,
    };

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn base_context() -> ValidationContext {
        ValidationContext::new(
            ValidatorRole::Signature,
            CertificateSource::SignerCert,
            Moment::Present,
        )
    }

    fn root() -> CertificateToken {
        CertificateToken {
            subject: "CN=Root".to_string(),
            issuer: "CN=Root".to_string(),
            serial: vec![0x01],
            is_ca: true,
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        }
    }

    fn intermediate() -> CertificateToken {
        CertificateToken {
            subject: "CN=Intermediate".to_string(),
            issuer: "CN=Root".to_string(),
            serial: vec![0x02],
            is_ca: true,
            key_usage: vec![KeyUsageFlag::KeyCertSign],
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        }
    }

    fn signer() -> CertificateToken {
        CertificateToken {
            subject: "CN=Signer".to_string(),
            issuer: "CN=Intermediate".to_string(),
            serial: vec![0x03],
            key_usage: vec![KeyUsageFlag::NonRepudiation],
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        }
    }

    fn full_store() -> TrustStore {
        let store = TrustStore::new();
        store.add_trusted(vec![root()], TrustCapability::General);
        store.add_known(vec![intermediate()]);
        store
    }

    fn validator(store: TrustStore) -> CertificateChainValidator {
        validator_with(SignatureValidationProperties::new(), store)
    }

    fn validator_with(
        properties: SignatureValidationProperties,
        store: TrustStore,
    ) -> CertificateChainValidator {
        let mut validator = CertificateChainValidator::new(
            Arc::new(properties),
            Arc::new(store),
            Arc::new(NoVerification),
        );
        validator.set_revocation_checking(Box::new(NoopRevocation));
        validator
    }

    struct NoopRevocation;

    impl RevocationChecking for NoopRevocation {
        fn validate(
            &self,
            _report: &mut ValidationReport,
            _context: ValidationContext,
            _certificate: &CertificateToken,
            _date: DateTime<Utc>,
        ) {
        }
    }

    #[derive(Default)]
    struct RecordingRevocation {
        calls: Mutex<Vec<(String, CertificateSource)>>,
    }

    impl RevocationChecking for RecordingRevocation {
        fn validate(
            &self,
            _report: &mut ValidationReport,
            context: ValidationContext,
            certificate: &CertificateToken,
            _date: DateTime<Utc>,
        ) {
            self.calls
                .lock()
                .unwrap()
                .push((certificate.subject.clone(), context.source()));
        }
    }

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(
            &self,
            _signature: &[u8],
            _data: &[u8],
            _public_key_der: &[u8],
            _algorithm: Option<&str>,
        ) -> Result<(), VerificationError> {
            Err(VerificationError::SignatureMismatch)
        }
    }

    struct FaultingVerifier;

    impl SignatureVerifier for FaultingVerifier {
        fn verify(
            &self,
            _signature: &[u8],
            _data: &[u8],
            _public_key_der: &[u8],
            _algorithm: Option<&str>,
        ) -> Result<(), VerificationError> {
            Err(VerificationError::UnsupportedAlgorithm(
                "1.2.3.4".to_string(),
            ))
        }
    }

    #[test]
    fn directly_trusted_leaf_yields_a_single_info_item() {
        let store = TrustStore::new();
        store.add_trusted(vec![signer()], TrustCapability::General);

        let mut report = ValidationReport::new();
        validator(store).validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items().len(), 1);
        assert_eq!(report.items()[0].status, ReportItemStatus::Info);
        assert_eq!(report.items()[0].message, "certificate CN=Signer is trusted.");
    }

    #[test]
    fn walk_reaches_the_trusted_root() {
        let mut report = ValidationReport::new();
        validator(full_store()).validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items().len(), 1);
        assert_eq!(report.items()[0].message, "certificate CN=Root is trusted.");
    }

    #[test]
    fn entry_source_still_counts_at_the_anchor() {
        let store = TrustStore::new();
        store.add_trusted(vec![root()], TrustCapability::Timestamping);
        store.add_known(vec![intermediate()]);

        let context = base_context().with_source(CertificateSource::Timestamp);
        let mut report = ValidationReport::new();
        validator(store).validate(&mut report, context, &signer(), day(10));

        // The walk reaches the root under CertIssuer, yet the anchoring
        // capability is matched against the timestamp entry source.
        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items()[0].message, "certificate CN=Root is trusted.");
    }

    #[test]
    fn trust_for_a_different_capability_keeps_the_walk_going() {
        let store = full_store();
        store.add_trusted(vec![intermediate()], TrustCapability::Timestamping);

        let mut report = ValidationReport::new();
        validator(store).validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert_eq!(report.items().len(), 2);
        assert!(report.has_message("certificate CN=Intermediate is trusted for a different context"));
        assert_eq!(report.items()[1].message, "certificate CN=Root is trusted.");
    }

    #[test]
    fn expired_certificate_is_invalid_with_the_validity_error_as_cause() {
        let expired = CertificateToken {
            not_after: day(5),
            ..signer()
        };

        let mut report = ValidationReport::new();
        validator(full_store()).validate(&mut report, base_context(), &expired, day(10));

        assert_eq!(report.result(), ValidationResult::Invalid);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.check_name, VALIDITY_CHECK);
        assert!(failure.message.contains("outside its validity period"));
        assert!(failure.cause.is_some());
        // The walk still completed up to the trusted root.
        assert!(report.has_message("certificate CN=Root is trusted"));
    }

    #[test]
    fn missing_required_extension_is_invalid_per_extension() {
        let plain = CertificateToken {
            key_usage: Vec::new(),
            ..signer()
        };

        let mut report = ValidationReport::new();
        validator(full_store()).validate(&mut report, base_context(), &plain, day(10));

        assert_eq!(report.result(), ValidationResult::Invalid);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.check_name, EXTENSIONS_CHECK);
        assert_eq!(
            failure.message,
            "required extension key usage nonRepudiation is missing."
        );
    }

    #[test]
    fn unresolvable_issuer_is_indeterminate() {
        let mut report = ValidationReport::new();
        validator(TrustStore::new()).validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert_eq!(report.items()[0].message, ISSUER_MISSING);
    }

    #[test]
    fn signature_mismatch_against_the_issuer_is_invalid() {
        let signed = CertificateToken {
            tbs_der: Some(vec![0x30, 0x00]),
            signature_value: Some(vec![0xAA]),
            ..signer()
        };

        let mut validator = CertificateChainValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            Arc::new(full_store()),
            Arc::new(RejectAll),
        );
        validator.set_revocation_checking(Box::new(NoopRevocation));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signed, day(10));

        assert_eq!(report.result(), ValidationResult::Invalid);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.message, ISSUER_NOT_VERIFIED);
        assert!(failure.cause.is_some());
        assert!(report.has_message("certificate CN=Root is trusted"));
    }

    #[test]
    fn verifier_fault_is_indeterminate_not_invalid() {
        let signed = CertificateToken {
            tbs_der: Some(vec![0x30, 0x00]),
            signature_value: Some(vec![0xAA]),
            ..signer()
        };

        let mut validator = CertificateChainValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            Arc::new(full_store()),
            Arc::new(FaultingVerifier),
        );
        validator.set_revocation_checking(Box::new(NoopRevocation));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signed, day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.message, ISSUER_NOT_VERIFIED);
        assert_eq!(failure.status, ReportItemStatus::Indeterminate);
    }

    #[test]
    fn stop_on_first_failure_halts_the_walk() {
        let mut properties = SignatureValidationProperties::new();
        properties.set_continue_after_failure(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            false,
        );

        let recorder = Arc::new(RecordingRevocation::default());
        let mut validator = CertificateChainValidator::new(
            Arc::new(properties),
            Arc::new(full_store()),
            Arc::new(NoVerification),
        );
        validator.set_revocation_checking(Box::new(SharedRevocation(recorder.clone())));

        let expired = CertificateToken {
            not_after: day(5),
            ..signer()
        };

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &expired, day(10));

        // The validity failure ends the walk before revocation or issuer
        // resolution run.
        assert_eq!(report.items().len(), 1);
        assert!(recorder.calls.lock().unwrap().is_empty());
        assert!(!report.has_message("certificate CN=Root is trusted"));
    }

    struct SharedRevocation(Arc<RecordingRevocation>);

    impl RevocationChecking for SharedRevocation {
        fn validate(
            &self,
            report: &mut ValidationReport,
            context: ValidationContext,
            certificate: &CertificateToken,
            date: DateTime<Utc>,
        ) {
            self.0.validate(report, context, certificate, date);
        }
    }

    #[test]
    fn every_untrusted_link_gets_a_revocation_check() {
        let recorder = Arc::new(RecordingRevocation::default());
        let mut validator = CertificateChainValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            Arc::new(full_store()),
            Arc::new(NoVerification),
        );
        validator.set_revocation_checking(Box::new(SharedRevocation(recorder.clone())));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(10));

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("CN=Signer".to_string(), CertificateSource::SignerCert),
                ("CN=Intermediate".to_string(), CertificateSource::CertIssuer),
            ]
        );
    }

    #[test]
    fn issuer_loop_terminates_the_walk() {
        let a = CertificateToken {
            subject: "CN=A".to_string(),
            issuer: "CN=B".to_string(),
            serial: vec![0x0A],
            key_usage: vec![KeyUsageFlag::NonRepudiation, KeyUsageFlag::KeyCertSign],
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        };
        let b = CertificateToken {
            subject: "CN=B".to_string(),
            issuer: "CN=A".to_string(),
            serial: vec![0x0B],
            key_usage: vec![KeyUsageFlag::KeyCertSign],
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        };

        let store = TrustStore::new();
        store.add_known(vec![a.clone(), b]);

        let mut report = ValidationReport::new();
        validator(store).validate(&mut report, base_context(), &a, day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert!(report.has_message("certificate issuer is missing"));
    }

    #[test]
    fn default_revocation_delegate_reports_missing_evidence() {
        let validator = CertificateChainValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            Arc::new(full_store()),
            Arc::new(NoVerification),
        );

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert!(report.has_message("no revocation data"));
    }
}
