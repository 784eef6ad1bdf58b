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

//! Signature orchestration over a signed document.

use std::sync::Arc;

use chrono::Utc;
use docsig_report::{report_item, ValidationReport, ValidationResult};

use crate::{
    chain::{CertificateChainValidator, ChainValidation},
    context::{CertificateSource, Moment, ValidationContext, ValidatorRole},
    document::{AccessPermissions, DocumentSignature, SignedDocument},
    properties::SignatureValidationProperties,
    revisions::DocumentRevisionsValidator,
    trust_store::TrustStore,
    verifier::SignatureVerifier,
    x509::CertificateToken,
};

/// Check name for signature-level items.
pub const SIGNATURE_CHECK: &str = "signature check";

const NO_SIGNATURES: &str = "no signatures to validate: the document carries none.";
const NO_SIGNER_CERTIFICATE: &str = "cannot verify signature: the signer certificate is missing.";
const CANNOT_VERIFY: &str = "cannot verify signature.";

/// Validates the signatures of a [`SignedDocument`].
///
/// Every embedded certificate, and every well-formed certificate from the
/// document security store, is registered with the shared trust store before
/// validation so issuer resolution can see them. The chain delegate then walks
/// each signer under [`CertificateSource::SignerCert`] at the signature's
/// date, and each embedded timestamp signer under
/// [`CertificateSource::Timestamp`] at the timestamp's production date.
pub struct SignatureValidator {
    properties: Arc<SignatureValidationProperties>,
    trust_store: Arc<TrustStore>,
    verifier: Arc<dyn SignatureVerifier>,
    chain: Box<dyn ChainValidation>,
    revisions: DocumentRevisionsValidator,
}

impl SignatureValidator {
    /// Creates a validator delegating to a [`CertificateChainValidator`] and
    /// a [`DocumentRevisionsValidator`] in their default configuration.
    pub fn new(
        properties: Arc<SignatureValidationProperties>,
        trust_store: Arc<TrustStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            chain: Box::new(CertificateChainValidator::new(
                properties.clone(),
                trust_store.clone(),
                verifier.clone(),
            )),
            revisions: DocumentRevisionsValidator::new(properties.clone()),
            properties,
            trust_store,
            verifier,
        }
    }

    /// Replaces the chain delegate.
    pub fn set_chain_validation(&mut self, chain: Box<dyn ChainValidation>) {
        self.chain = chain;
    }

    /// Replaces the document revisions validator.
    pub fn set_document_revisions_validator(&mut self, revisions: DocumentRevisionsValidator) {
        self.revisions = revisions;
    }

    /// The permission level derived by the last revision walk.
    pub fn access_permissions(&self) -> AccessPermissions {
        self.revisions.access_permissions()
    }

    /// Validates the most recent signature: the one covering the most bytes.
    ///
    /// The latest signature must cover the whole document; anything appended
    /// after it is unvouched-for and reports as not covered.
    pub fn validate_latest_signature(&self, document: &SignedDocument) -> ValidationReport {
        let mut report = ValidationReport::new();
        let context = ValidationContext::new(
            ValidatorRole::Signature,
            CertificateSource::SignerCert,
            Moment::Present,
        );

        self.ingest_document_certificates(document);

        let Some(latest) = document.latest_signature() else {
            report_item!(
                SIGNATURE_CHECK,
                NO_SIGNATURES,
                "SignatureValidator::validate_latest_signature"
            )
            .with_context(context)
            .indeterminate(&mut report);

            return report;
        };

        self.check_coverage(&mut report, context, latest, document);

        if self.should_stop(&report, &context) {
            return report;
        }

        self.validate_signature(&mut report, latest, Moment::Present);
        report
    }

    /// Validates the document revisions, then every signature and document
    /// timestamp in date order.
    ///
    /// Earlier signatures validate under [`Moment::Historical`], the latest
    /// under [`Moment::Present`]. When the continue-after-failure policy is
    /// off, the first failure ends the run.
    pub fn validate_signatures(&self, document: &SignedDocument) -> ValidationReport {
        let mut report = ValidationReport::new();
        let context = ValidationContext::new(
            ValidatorRole::Signature,
            CertificateSource::SignerCert,
            Moment::Present,
        );

        self.ingest_document_certificates(document);

        self.revisions
            .validate_all_document_revisions(&mut report, document);

        if self.should_stop(&report, &context) {
            log::debug!("stopping after the document revision checks");
            return report;
        }

        if document.signatures.is_empty() {
            report_item!(
                SIGNATURE_CHECK,
                NO_SIGNATURES,
                "SignatureValidator::validate_signatures"
            )
            .with_context(context)
            .indeterminate(&mut report);

            return report;
        }

        // Coverage order is date order for an incrementally updated
        // document: each later signature covers every earlier one.
        let ordered = document.ordered_signatures();
        let last = ordered.len() - 1;

        for (position, signature) in ordered.into_iter().enumerate() {
            let moment = if position == last {
                Moment::Present
            } else {
                Moment::Historical
            };
            let sub_context = ValidationContext::new(
                ValidatorRole::Signature,
                CertificateSource::SignerCert,
                moment,
            );
            let mut sub = ValidationReport::new();

            if position == last {
                self.check_coverage(&mut sub, sub_context, signature, document);
            }

            if !self.should_stop(&sub, &sub_context) {
                self.validate_signature(&mut sub, signature, moment);
            }

            report.merge(&sub);

            if self.should_stop(&report, &sub_context) {
                log::debug!("stopping after signature {}", signature.field_name);
                break;
            }
        }

        report
    }

    fn should_stop(&self, report: &ValidationReport, context: &ValidationContext) -> bool {
        report.result() != ValidationResult::Valid
            && !self.properties.continue_after_failure(context)
    }

    /// Registers every well-formed certificate from the document security
    /// store with the trust store. Malformed entries degrade only themselves.
    fn ingest_document_certificates(&self, document: &SignedDocument) {
        for der in &document.dss.certificates {
            match CertificateToken::from_der(der) {
                Ok(token) => self.trust_store.add_known([token]),
                Err(err) => {
                    log::warn!("skipping a malformed document-store certificate: {err}");
                }
            }
        }
    }

    fn check_coverage(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        signature: &DocumentSignature,
        document: &SignedDocument,
    ) {
        if signature.coverage_end != document.total_length {
            report_item!(
                SIGNATURE_CHECK,
                format!(
                    "document is not covered: the signature covers {} of {} bytes.",
                    signature.coverage_end, document.total_length
                ),
                "SignatureValidator::check_coverage"
            )
            .with_context(context)
            .invalid(report);
        }
    }

    fn validate_signature(
        &self,
        report: &mut ValidationReport,
        signature: &DocumentSignature,
        moment: Moment,
    ) {
        let context = ValidationContext::new(
            ValidatorRole::Signature,
            CertificateSource::SignerCert,
            moment,
        );

        log::debug!("validating signature {}", signature.field_name);

        self.trust_store
            .add_known(signature.certificates.iter().cloned());
        self.trust_store
            .add_known(signature.timestamp_certificates.iter().cloned());

        let date = signature
            .timestamp_time
            .or(signature.claimed_signing_time)
            .unwrap_or_else(Utc::now);

        let Some(signer) = signature.signing_certificate() else {
            report_item!(
                SIGNATURE_CHECK,
                NO_SIGNER_CERTIFICATE,
                "SignatureValidator::validate_signature"
            )
            .with_context(context)
            .indeterminate(report);

            return;
        };

        if let (Some(payload), Some(value)) =
            (&signature.signed_payload, &signature.signature_value)
        {
            if let Err(err) = self.verifier.verify(value, payload, &signer.spki_der, None) {
                report_item!(
                    SIGNATURE_CHECK,
                    CANNOT_VERIFY,
                    "SignatureValidator::validate_signature"
                )
                .with_cause(err)
                .for_certificate(signer.subject.clone())
                .with_context(context)
                .invalid(report);

                if self.should_stop(report, &context) {
                    return;
                }
            }
        }

        self.chain.validate(report, context, signer, date);

        if self.should_stop(report, &context) {
            return;
        }

        if let Some(timestamp_signer) = signature.timestamp_certificates.first() {
            let timestamp_context = context.with_source(CertificateSource::Timestamp);
            let timestamp_date = signature.timestamp_time.unwrap_or(date);

            self.chain
                .validate(report, timestamp_context, timestamp_signer, timestamp_date);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use chrono::{DateTime, TimeZone};

    use super::*;
    use crate::{
        context::{CertificateSources, Moments, ValidatorRoles},
        document::{EntryValue, RevisionSnapshot, SignatureKind},
        verifier::{NoVerification, VerificationError},
    };

    fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn cert(subject: &str) -> CertificateToken {
        CertificateToken {
            subject: subject.to_owned(),
            issuer: "CN=Issuer".to_owned(),
            serial: subject.as_bytes().to_vec(),
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        }
    }

    fn signature(field_name: &str, coverage_end: u64, signer: &str) -> DocumentSignature {
        DocumentSignature {
            field_name: field_name.to_owned(),
            coverage_end,
            claimed_signing_time: Some(day(5)),
            certificates: vec![cert(signer)],
            ..Default::default()
        }
    }

    fn document(signatures: Vec<DocumentSignature>) -> SignedDocument {
        let revision_count = signatures
            .iter()
            .map(|signature| signature.signed_revision + 1)
            .max()
            .unwrap_or(1);

        SignedDocument {
            revisions: (0..revision_count)
                .map(|revision_index| RevisionSnapshot {
                    revision_index,
                    ..Default::default()
                })
                .collect(),
            signatures,
            total_length: 200,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct RecordingChain {
        calls: Mutex<Vec<(String, CertificateSource, Moment, DateTime<Utc>)>>,
    }

    impl RecordingChain {
        fn calls(&self) -> Vec<(String, CertificateSource, Moment, DateTime<Utc>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ChainValidation for RecordingChain {
        fn validate(
            &self,
            _report: &mut ValidationReport,
            context: ValidationContext,
            certificate: &CertificateToken,
            date: DateTime<Utc>,
        ) {
            self.calls.lock().unwrap().push((
                certificate.subject.clone(),
                context.source(),
                context.moment(),
                date,
            ));
        }
    }

    struct SharedChain(Arc<RecordingChain>);

    impl ChainValidation for SharedChain {
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

    struct RejectingVerifier;

    impl SignatureVerifier for RejectingVerifier {
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

    fn recording_validator(
        verifier: Arc<dyn SignatureVerifier>,
    ) -> (SignatureValidator, Arc<RecordingChain>) {
        let chain = Arc::new(RecordingChain::default());
        let mut validator = SignatureValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            Arc::new(TrustStore::new()),
            verifier,
        );
        validator.set_chain_validation(Box::new(SharedChain(chain.clone())));
        (validator, chain)
    }

    #[test]
    fn the_most_covering_signature_is_the_latest() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let doc = document(vec![
            signature("Sig1", 100, "CN=Early"),
            signature("Sig2", 200, "CN=Late"),
        ]);

        let report = validator.validate_latest_signature(&doc);

        assert_eq!(report.result(), ValidationResult::Valid);
        let calls = chain.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "CN=Late");
        assert_eq!(calls[0].1, CertificateSource::SignerCert);
        assert_eq!(calls[0].2, Moment::Present);
        assert_eq!(calls[0].3, day(5));
    }

    #[test]
    fn partial_coverage_is_invalid() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let doc = document(vec![signature("Sig1", 150, "CN=Signer")]);

        let report = validator.validate_latest_signature(&doc);

        assert_eq!(report.result(), ValidationResult::Invalid);
        assert_eq!(report.failure_count(), 1);
        assert!(
            report.has_message("document is not covered: the signature covers 150 of 200 bytes.")
        );

        // The default policy keeps validating after the failure.
        assert_eq!(chain.calls().len(), 1);
    }

    #[test]
    fn no_signatures_is_indeterminate() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let doc = document(Vec::new());

        let report = validator.validate_latest_signature(&doc);

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert!(report.has_message("no signatures to validate"));
        assert!(chain.calls().is_empty());
    }

    #[test]
    fn signature_bytes_that_do_not_verify_are_invalid() {
        let (validator, _) = recording_validator(Arc::new(RejectingVerifier));
        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.signed_payload = Some(b"payload".to_vec());
        signed.signature_value = Some(b"sig".to_vec());
        let doc = document(vec![signed]);

        let report = validator.validate_latest_signature(&doc);

        assert_eq!(report.result(), ValidationResult::Invalid);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.message, "cannot verify signature.");
        assert!(failure.cause.is_some());
        assert_eq!(failure.certificate.as_deref(), Some("CN=Signer"));
    }

    #[test]
    fn a_missing_signer_certificate_is_indeterminate() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.certificates.clear();
        let doc = document(vec![signed]);

        let report = validator.validate_latest_signature(&doc);

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert!(report.has_message("cannot verify signature: the signer certificate is missing."));
        assert!(chain.calls().is_empty());
    }

    #[test]
    fn timestamp_chains_validate_under_the_timestamp_source() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.timestamp_time = Some(day(6));
        signed.timestamp_certificates = vec![cert("CN=TSA")];
        let doc = document(vec![signed]);

        validator.validate_latest_signature(&doc);

        let calls = chain.calls();
        assert_eq!(calls.len(), 2);

        // The timestamp fixes the signer's validation date too.
        assert_eq!(
            calls[0],
            (
                "CN=Signer".to_owned(),
                CertificateSource::SignerCert,
                Moment::Present,
                day(6)
            )
        );
        assert_eq!(
            calls[1],
            (
                "CN=TSA".to_owned(),
                CertificateSource::Timestamp,
                Moment::Present,
                day(6)
            )
        );
    }

    #[test]
    fn earlier_signatures_validate_historically() {
        let (validator, chain) = recording_validator(Arc::new(NoVerification));
        let mut early = signature("Sig1", 100, "CN=Early");
        early.signed_revision = 0;
        let mut late = signature("Sig2", 200, "CN=Late");
        late.signed_revision = 1;
        let doc = document(vec![late, early]);

        let report = validator.validate_signatures(&doc);

        assert_eq!(report.result(), ValidationResult::Valid);
        let calls = chain.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "CN=Early");
        assert_eq!(calls[0].2, Moment::Historical);
        assert_eq!(calls[1].0, "CN=Late");
        assert_eq!(calls[1].2, Moment::Present);
    }

    #[test]
    fn revision_failures_stop_the_run_when_asked_to() {
        let mut properties = SignatureValidationProperties::new();
        properties.set_continue_after_failure(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            false,
        );

        let chain = Arc::new(RecordingChain::default());
        let mut validator = SignatureValidator::new(
            Arc::new(properties),
            Arc::new(TrustStore::new()),
            Arc::new(NoVerification),
        );
        validator.set_chain_validation(Box::new(SharedChain(chain.clone())));

        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.kind = SignatureKind::Certification(AccessPermissions::NoChangesPermitted);
        let mut doc = document(vec![signed]);
        doc.revisions.push(RevisionSnapshot {
            revision_index: 1,
            catalog: [("Names".to_owned(), EntryValue::Digest(1))].into(),
            ..Default::default()
        });

        let report = validator.validate_signatures(&doc);

        assert_eq!(report.result(), ValidationResult::Invalid);
        assert!(report.has_message("not allowed catalog changes"));

        // No signature was processed after the revision failure.
        assert!(chain.calls().is_empty());
    }

    #[test]
    fn the_revision_walk_feeds_the_permission_getter() {
        let (validator, _) = recording_validator(Arc::new(NoVerification));
        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.kind = SignatureKind::Certification(AccessPermissions::NoChangesPermitted);
        let doc = document(vec![signed]);

        validator.validate_signatures(&doc);

        assert_eq!(
            validator.access_permissions(),
            AccessPermissions::NoChangesPermitted
        );
    }

    #[test]
    fn embedded_chains_are_registered_with_the_store() {
        let store = Arc::new(TrustStore::new());
        let mut validator = SignatureValidator::new(
            Arc::new(SignatureValidationProperties::new()),
            store.clone(),
            Arc::new(NoVerification),
        );
        let chain = Arc::new(RecordingChain::default());
        validator.set_chain_validation(Box::new(SharedChain(chain.clone())));

        let mut signed = signature("Sig1", 200, "CN=Signer");
        signed.certificates.push(cert("CN=Intermediate"));
        let doc = document(vec![signed]);

        validator.validate_latest_signature(&doc);

        assert_eq!(store.certificates_by_subject("CN=Intermediate", None).len(), 1);
    }

    #[test]
    fn malformed_store_certificates_are_skipped() {
        let (validator, _) = recording_validator(Arc::new(NoVerification));
        let mut doc = document(vec![signature("Sig1", 200, "CN=Signer")]);
        doc.dss.certificates.push(vec![0x01, 0x02, 0x03]);

        let report = validator.validate_latest_signature(&doc);

        // Ingestion failure is logged, not reported.
        assert_eq!(report.result(), ValidationResult::Valid);
    }
}
