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

//! Revocation checking: evidence gathering, ranking, and delegation.
//!
//! [`RevocationDataValidator`] collects CRL and OCSP evidence for one
//! certificate from the registered providers, ranks it by recency, and tries
//! one piece at a time against the matching evidence validator until one
//! yields a conclusive, fresh outcome. Evidence that is tried and rejected
//! leaves no trace in the caller's report; its items stay in a discarded
//! child report.

use std::{cmp::Reverse, sync::Arc};

use chrono::{DateTime, Utc};
use docsig_report::{report_item, ValidationReport, ValidationResult};

use crate::{
    context::{CertificateSource, ValidationContext, ValidatorRole},
    properties::{OnlineFetching, SignatureValidationProperties},
    trust_store::{TrustCapability, TrustStore},
    verifier::SignatureVerifier,
    x509::{CertificateToken, CrlToken, OcspResponseToken},
};

pub mod crl;
pub mod fetch;
pub mod ocsp;

use crl::{CrlValidation, CrlValidator};
use fetch::RevocationEvidenceProvider;
use ocsp::{OcspValidation, OcspValidator};

/// Check name for items produced while gathering and selecting evidence.
pub const REVOCATION_DATA_CHECK: &str = "revocation data check";

const SELF_SIGNED: &str = "self-signed certificate is not checked for revocation.";
const VALIDITY_ASSURED: &str =
    "certificate validity is assured by the id-pkix-ocsp-nocheck extension.";
const TRUSTED_RESPONDER: &str =
    "trusted OCSP responder certificates are not checked for revocation.";
const NO_REVOCATION_DATA: &str = "no revocation data available for the certificate.";
const NO_CONCLUSIVE_DATA: &str = "no revocation data was conclusive for the certificate.";
const PROVIDER_FAILED: &str = "revocation evidence provider failed.";

/// One piece of revocation evidence as supplied by a provider.
#[derive(Clone, Debug)]
pub enum RevocationEvidence {
    /// A certificate revocation list.
    Crl(CrlToken),

    /// A full OCSP response, possibly covering several certificates.
    Ocsp(OcspResponseToken),
}

/// Evaluates the revocation status of one certificate.
///
/// Implemented by [`RevocationDataValidator`]; tests substitute recording or
/// no-op mocks through the builder.
pub trait RevocationChecking: Send + Sync {
    /// Appends the revocation outcome for `certificate` at `date` to
    /// `report`.
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        date: DateTime<Utc>,
    );
}

/// Gathers, ranks, and evaluates revocation evidence for one certificate.
///
/// Evidence comes from the registered offline providers first; the online
/// fetchers join according to the [`OnlineFetching`] policy resolved for the
/// context, at most one online round per certificate per run. Candidates are
/// then tried most-recent-first, OCSP ahead of CRLs of equal date, each
/// against a fresh child report. The first conclusive outcome that is also
/// fresh enough for the resolved tolerance is merged into the caller's
/// report and ends the search.
pub struct RevocationDataValidator {
    properties: Arc<SignatureValidationProperties>,
    trust_store: Arc<TrustStore>,
    crl_validator: Box<dyn CrlValidation>,
    ocsp_validator: Box<dyn OcspValidation>,
    providers: Vec<Box<dyn RevocationEvidenceProvider>>,
    online_fetchers: Vec<Box<dyn RevocationEvidenceProvider>>,
}

impl RevocationDataValidator {
    /// Creates a validator with the default CRL and OCSP evidence validators
    /// and no registered providers.
    pub fn new(
        properties: Arc<SignatureValidationProperties>,
        trust_store: Arc<TrustStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            crl_validator: Box::new(CrlValidator::new(trust_store.clone(), verifier.clone())),
            ocsp_validator: Box::new(OcspValidator::new(
                properties.clone(),
                trust_store.clone(),
                verifier,
            )),
            properties,
            trust_store,
            providers: Vec::new(),
            online_fetchers: Vec::new(),
        }
    }

    /// Replaces the CRL evidence validator.
    pub fn set_crl_validation(&mut self, validator: Box<dyn CrlValidation>) {
        self.crl_validator = validator;
    }

    /// Replaces the OCSP evidence validator.
    pub fn set_ocsp_validation(&mut self, validator: Box<dyn OcspValidation>) {
        self.ocsp_validator = validator;
    }

    /// Registers a provider consulted in the offline collection round.
    pub fn add_evidence_provider(&mut self, provider: Box<dyn RevocationEvidenceProvider>) {
        self.providers.push(provider);
    }

    /// Registers a fetcher consulted according to the online-fetch policy.
    pub fn add_online_fetcher(&mut self, fetcher: Box<dyn RevocationEvidenceProvider>) {
        self.online_fetchers.push(fetcher);
    }

    fn collect(
        &self,
        providers: &[Box<dyn RevocationEvidenceProvider>],
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        issuer: Option<&CertificateToken>,
    ) -> Vec<RevocationEvidence> {
        let mut pool = Vec::new();

        for provider in providers {
            match provider.fetch(certificate, issuer) {
                Ok(evidence) => pool.extend(evidence),
                Err(err) => {
                    log::warn!(
                        "revocation evidence provider failed for {}: {err}",
                        certificate.subject
                    );
                    report_item!(
                        REVOCATION_DATA_CHECK,
                        PROVIDER_FAILED,
                        "RevocationDataValidator::collect"
                    )
                    .with_cause(err)
                    .for_certificate(certificate.subject.clone())
                    .with_context(context)
                    .indeterminate(report);
                }
            }
        }

        pool
    }
}

impl RevocationChecking for RevocationDataValidator {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        date: DateTime<Utc>,
    ) {
        let context = context.with_role(ValidatorRole::RevocationData);

        if certificate.is_self_signed() {
            report_item!(
                REVOCATION_DATA_CHECK,
                SELF_SIGNED,
                "RevocationDataValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .info(report);
            return;
        }

        if certificate.ocsp_no_check {
            report_item!(
                REVOCATION_DATA_CHECK,
                VALIDITY_ASSURED,
                "RevocationDataValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .info(report);
            return;
        }

        // A trusted responder's own status is never checked; asking the
        // responder about itself would recurse without end.
        if context.source() == CertificateSource::OcspIssuer
            && self
                .trust_store
                .is_trusted_for(certificate, TrustCapability::OcspResponseSigning)
        {
            report_item!(
                REVOCATION_DATA_CHECK,
                TRUSTED_RESPONDER,
                "RevocationDataValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .info(report);
            return;
        }

        let issuer = self.trust_store.retrieve_issuer(certificate, &[]);
        let fetch_policy = self.properties.online_fetching(&context);

        let mut pool = self.collect(&self.providers, report, context, certificate, issuer.as_ref());
        if fetch_policy == OnlineFetching::AlwaysFetch {
            pool.extend(self.collect(
                &self.online_fetchers,
                report,
                context,
                certificate,
                issuer.as_ref(),
            ));
        } else if pool.is_empty() && fetch_policy == OnlineFetching::FetchIfNoOtherDataAvailable {
            pool = self.collect(
                &self.online_fetchers,
                report,
                context,
                certificate,
                issuer.as_ref(),
            );
        }

        if pool.is_empty() {
            report_item!(
                REVOCATION_DATA_CHECK,
                NO_REVOCATION_DATA,
                "RevocationDataValidator::validate"
            )
            .for_certificate(certificate.subject.clone())
            .with_context(context)
            .indeterminate(report);
            return;
        }

        let mut candidates = expand(pool);
        candidates.sort_by_key(|candidate| (Reverse(candidate.date()), candidate.kind_rank()));

        log::debug!(
            "trying {} piece(s) of revocation evidence for {}",
            candidates.len(),
            certificate.subject
        );

        let freshness = self.properties.freshness(&context);
        let mut last_child: Option<ValidationReport> = None;

        for candidate in &candidates {
            let mut child = ValidationReport::new();

            match candidate {
                Candidate::Crl(crl) => {
                    self.crl_validator
                        .validate(&mut child, context, certificate, crl, date)
                }
                Candidate::Ocsp(response, single) => self.ocsp_validator.validate(
                    &mut child,
                    context,
                    certificate,
                    single,
                    response,
                    date,
                ),
            }

            let conclusive = child.result() != ValidationResult::Indeterminate;
            let fresh = date.signed_duration_since(candidate.date()) <= freshness;

            if conclusive && fresh {
                report.merge(&child);
                return;
            }

            last_child = Some(child);
        }

        if let Some(child) = last_child {
            report.merge(&child);
        }

        report_item!(
            REVOCATION_DATA_CHECK,
            NO_CONCLUSIVE_DATA,
            "RevocationDataValidator::validate"
        )
        .for_certificate(certificate.subject.clone())
        .with_context(context)
        .indeterminate(report);
    }
}

/// Shared audit message for a revocation whose date lies after the
/// validation date. The CRL and OCSP validators use the identical wording.
pub(crate) fn revoked_after_date_message(revocation_date: DateTime<Utc>) -> String {
    format!(
        "valid certificate is revoked: the revocation date {revocation_date} is after the validation date."
    )
}

/// Shared failure message for a certificate revoked at or before the
/// validation date.
pub(crate) fn revoked_message(revocation_date: DateTime<Utc>) -> String {
    format!("certificate is revoked since {revocation_date}.")
}

// One rankable unit of evidence. A CRL ranks as a whole; an OCSP response
// contributes one candidate per single-response entry it carries.
enum Candidate {
    Crl(CrlToken),
    Ocsp(OcspResponseToken, crate::x509::SingleResponseToken),
}

impl Candidate {
    fn date(&self) -> DateTime<Utc> {
        match self {
            Candidate::Crl(crl) => crl.this_update,
            Candidate::Ocsp(response, _) => response.produced_at,
        }
    }

    // OCSP before CRL on the same recency tier.
    fn kind_rank(&self) -> u8 {
        match self {
            Candidate::Ocsp(..) => 0,
            Candidate::Crl(_) => 1,
        }
    }
}

fn expand(pool: Vec<RevocationEvidence>) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for evidence in pool {
        match evidence {
            RevocationEvidence::Crl(crl) => candidates.push(Candidate::Crl(crl)),
            RevocationEvidence::Ocsp(response) => {
                for single in &response.responses {
                    candidates.push(Candidate::Ocsp(response.clone(), single.clone()));
                }
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use chrono::{Duration, TimeZone};
    use docsig_report::ReportItemStatus;

    use super::{
        fetch::{EvidenceError, StoredEvidence},
        *,
    };
    use crate::{
        context::{CertificateSources, Moment, Moments, ValidatorRoles},
        verifier::NoVerification,
        x509::SingleResponseToken,
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

    fn signer() -> CertificateToken {
        CertificateToken {
            subject: "CN=Mock Signer".to_string(),
            issuer: "CN=Mock Issuer".to_string(),
            serial: vec![0x11],
            not_before: day(1),
            not_after: day(28),
            ..Default::default()
        }
    }

    fn ocsp_at(produced: DateTime<Utc>) -> RevocationEvidence {
        RevocationEvidence::Ocsp(OcspResponseToken {
            produced_at: produced,
            responses: vec![SingleResponseToken {
                serial: vec![0x11],
                this_update: produced,
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn crl_at(this_update: DateTime<Utc>) -> RevocationEvidence {
        RevocationEvidence::Crl(CrlToken {
            issuer: "CN=Mock Issuer".to_string(),
            this_update,
            ..Default::default()
        })
    }

    fn validator() -> RevocationDataValidator {
        validator_with(SignatureValidationProperties::new(), TrustStore::new())
    }

    fn validator_with(
        properties: SignatureValidationProperties,
        store: TrustStore,
    ) -> RevocationDataValidator {
        RevocationDataValidator::new(
            Arc::new(properties),
            Arc::new(store),
            Arc::new(NoVerification),
        )
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(&'static str, DateTime<Utc>)>>>);

    impl Recorder {
        fn entries(&self) -> Vec<(&'static str, DateTime<Utc>)> {
            self.0.lock().unwrap().clone()
        }

        fn dates(&self) -> Vec<DateTime<Utc>> {
            self.entries().into_iter().map(|(_, date)| date).collect()
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.entries().into_iter().map(|(kind, _)| kind).collect()
        }
    }

    // Records each invocation; reports Indeterminate for the listed dates
    // and stays silent (conclusive) otherwise.
    struct RecordingOcsp {
        recorder: Recorder,
        indeterminate_for: Vec<DateTime<Utc>>,
    }

    impl OcspValidation for RecordingOcsp {
        fn validate(
            &self,
            report: &mut ValidationReport,
            _context: ValidationContext,
            _certificate: &CertificateToken,
            _single_response: &SingleResponseToken,
            basic_response: &OcspResponseToken,
            _date: DateTime<Utc>,
        ) {
            self.recorder
                .0
                .lock()
                .unwrap()
                .push(("ocsp", basic_response.produced_at));
            if self.indeterminate_for.contains(&basic_response.produced_at) {
                report_item!("mock OCSP", "mock inconclusive outcome", "RecordingOcsp")
                    .indeterminate(report);
            }
        }
    }

    struct RecordingCrl {
        recorder: Recorder,
        indeterminate_for: Vec<DateTime<Utc>>,
    }

    impl CrlValidation for RecordingCrl {
        fn validate(
            &self,
            report: &mut ValidationReport,
            _context: ValidationContext,
            _certificate: &CertificateToken,
            crl: &CrlToken,
            _date: DateTime<Utc>,
        ) {
            self.recorder.0.lock().unwrap().push(("crl", crl.this_update));
            if self.indeterminate_for.contains(&crl.this_update) {
                report_item!("mock CRL", "mock inconclusive outcome", "RecordingCrl")
                    .indeterminate(report);
            }
        }
    }

    struct CountingProvider {
        calls: Arc<Mutex<usize>>,
        evidence: Vec<RevocationEvidence>,
    }

    impl RevocationEvidenceProvider for CountingProvider {
        fn fetch(
            &self,
            _certificate: &CertificateToken,
            _issuer: Option<&CertificateToken>,
        ) -> Result<Vec<RevocationEvidence>, EvidenceError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.evidence.clone())
        }
    }

    struct FailingProvider;

    impl RevocationEvidenceProvider for FailingProvider {
        fn fetch(
            &self,
            _certificate: &CertificateToken,
            _issuer: Option<&CertificateToken>,
        ) -> Result<Vec<RevocationEvidence>, EvidenceError> {
            Err(EvidenceError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn self_signed_certificate_is_skipped() {
        let calls = Arc::new(Mutex::new(0));
        let mut validator = validator();
        validator.add_evidence_provider(Box::new(CountingProvider {
            calls: calls.clone(),
            evidence: vec![ocsp_at(day(5))],
        }));

        let cert = CertificateToken {
            issuer: "CN=Mock Signer".to_string(),
            ..signer()
        };

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &cert, day(10));

        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items().len(), 1);
        assert_eq!(report.items()[0].message, SELF_SIGNED);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn no_check_extension_is_skipped() {
        let cert = CertificateToken {
            ocsp_no_check: true,
            ..signer()
        };

        let mut report = ValidationReport::new();
        validator().validate(&mut report, base_context(), &cert, day(10));

        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items()[0].message, VALIDITY_ASSURED);
    }

    #[test]
    fn trusted_responder_is_skipped_under_ocsp_issuer_source() {
        let store = TrustStore::new();
        store.add_trusted(vec![signer()], TrustCapability::OcspResponseSigning);
        let validator = validator_with(SignatureValidationProperties::new(), store);

        let context = base_context().with_source(CertificateSource::OcspIssuer);
        let mut report = ValidationReport::new();
        validator.validate(&mut report, context, &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Valid);
        assert_eq!(report.items()[0].message, TRUSTED_RESPONDER);

        // The same certificate examined as a signer is not exempt.
        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(10));
        assert_eq!(report.result(), ValidationResult::Indeterminate);
    }

    #[test]
    fn empty_pool_is_indeterminate() {
        let mut report = ValidationReport::new();
        validator().validate(&mut report, base_context(), &signer(), day(10));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert_eq!(report.items().len(), 1);
        assert_eq!(report.items()[0].check_name, REVOCATION_DATA_CHECK);
        assert!(report.has_message("no revocation data"));
    }

    #[test]
    fn ocsp_evidence_is_tried_most_recent_first() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(1), day(4), day(6)],
        }));
        // Registration order deliberately scrambled.
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            ocsp_at(day(4)),
            ocsp_at(day(1)),
            ocsp_at(day(6)),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(recorder.dates(), vec![day(6), day(4), day(1)]);
        assert_eq!(report.result(), ValidationResult::Indeterminate);
    }

    #[test]
    fn ocsp_outranks_crl_of_equal_date() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(5)],
        }));
        validator.set_crl_validation(Box::new(RecordingCrl {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(5)],
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            crl_at(day(5)),
            ocsp_at(day(5)),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(recorder.kinds(), vec!["ocsp", "crl"]);
    }

    #[test]
    fn first_conclusive_fresh_candidate_ends_the_search() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            ocsp_at(day(6)),
            ocsp_at(day(5)),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(recorder.dates(), vec![day(6)]);
        assert_eq!(report.result(), ValidationResult::Valid);
        assert!(report.items().is_empty());
    }

    #[test]
    fn rejected_evidence_items_stay_out_of_the_callers_report() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(6)],
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            ocsp_at(day(6)),
            ocsp_at(day(5)),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        // The day-6 candidate failed and was discarded along with its items;
        // the day-5 candidate passed silently.
        assert_eq!(recorder.dates(), vec![day(6), day(5)]);
        assert!(report.items().is_empty());
        assert_eq!(report.result(), ValidationResult::Valid);
    }

    #[test]
    fn exhausted_evidence_merges_last_child_and_reports_no_data() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(6), day(5)],
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            ocsp_at(day(6)),
            ocsp_at(day(5)),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert_eq!(report.items().len(), 2);
        assert_eq!(report.items()[0].message, "mock inconclusive outcome");
        assert_eq!(report.items()[1].message, NO_CONCLUSIVE_DATA);
    }

    #[test]
    fn conclusive_but_stale_evidence_is_not_accepted() {
        let mut properties = SignatureValidationProperties::new();
        properties.set_freshness(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            Duration::days(1),
        );

        let recorder = Recorder::default();
        let mut validator = validator_with(properties, TrustStore::new());
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![ocsp_at(day(1))])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(recorder.dates(), vec![day(1)]);
        assert_eq!(report.result(), ValidationResult::Indeterminate);
        assert!(report.has_message("no revocation data"));
    }

    #[test]
    fn online_round_runs_only_when_offline_pool_is_empty() {
        let offline_evidence = vec![ocsp_at(day(6))];
        let online_calls = Arc::new(Mutex::new(0));

        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: Recorder::default(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(offline_evidence)));
        validator.add_online_fetcher(Box::new(CountingProvider {
            calls: online_calls.clone(),
            evidence: vec![ocsp_at(day(5))],
        }));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));
        assert_eq!(*online_calls.lock().unwrap(), 0);

        // Without offline evidence the single online round supplies the pool.
        let online_calls = Arc::new(Mutex::new(0));
        let mut validator = self::validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: Recorder::default(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_online_fetcher(Box::new(CountingProvider {
            calls: online_calls.clone(),
            evidence: vec![ocsp_at(day(5))],
        }));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));
        assert_eq!(*online_calls.lock().unwrap(), 1);
        assert_eq!(report.result(), ValidationResult::Valid);
    }

    #[test]
    fn never_fetch_skips_online_fetchers() {
        let mut properties = SignatureValidationProperties::new();
        properties.set_online_fetching(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            OnlineFetching::NeverFetch,
        );

        let online_calls = Arc::new(Mutex::new(0));
        let mut validator = validator_with(properties, TrustStore::new());
        validator.add_online_fetcher(Box::new(CountingProvider {
            calls: online_calls.clone(),
            evidence: vec![ocsp_at(day(5))],
        }));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(*online_calls.lock().unwrap(), 0);
        assert!(report.has_message("no revocation data"));
    }

    #[test]
    fn always_fetch_joins_the_initial_round() {
        let mut properties = SignatureValidationProperties::new();
        properties.set_online_fetching(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            OnlineFetching::AlwaysFetch,
        );

        let online_calls = Arc::new(Mutex::new(0));
        let mut validator = validator_with(properties, TrustStore::new());
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: Recorder::default(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![ocsp_at(day(6))])));
        validator.add_online_fetcher(Box::new(CountingProvider {
            calls: online_calls.clone(),
            evidence: vec![ocsp_at(day(5))],
        }));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(*online_calls.lock().unwrap(), 1);
    }

    #[test]
    fn provider_failure_is_logged_with_cause_and_the_round_continues() {
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: Recorder::default(),
            indeterminate_for: Vec::new(),
        }));
        validator.add_evidence_provider(Box::new(FailingProvider));
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![ocsp_at(day(6))])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(report.items().len(), 1);
        assert_eq!(report.items()[0].message, PROVIDER_FAILED);
        assert_eq!(report.items()[0].status, ReportItemStatus::Indeterminate);
        assert!(report.items()[0].cause.is_some());
        assert_eq!(report.result(), ValidationResult::Indeterminate);
    }

    #[test]
    fn response_with_several_entries_expands_per_entry() {
        let recorder = Recorder::default();
        let mut validator = validator();
        validator.set_ocsp_validation(Box::new(RecordingOcsp {
            recorder: recorder.clone(),
            indeterminate_for: vec![day(5)],
        }));

        let response = OcspResponseToken {
            produced_at: day(5),
            responses: vec![
                SingleResponseToken {
                    serial: vec![0x11],
                    this_update: day(5),
                    ..Default::default()
                },
                SingleResponseToken {
                    serial: vec![0x99],
                    this_update: day(5),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        validator.add_evidence_provider(Box::new(StoredEvidence::new(vec![
            RevocationEvidence::Ocsp(response),
        ])));

        let mut report = ValidationReport::new();
        validator.validate(&mut report, base_context(), &signer(), day(7));

        assert_eq!(recorder.dates().len(), 2);
    }
}
