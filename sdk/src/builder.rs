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

//! Assembly of validators and their collaborators.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docsig_report::ValidationReport;

use crate::{
    chain::{CertificateChainValidator, ChainValidation},
    context::ValidationContext,
    error::Result,
    properties::SignatureValidationProperties,
    revisions::DocumentRevisionsValidator,
    revocation::{
        crl::{CrlValidation, CrlValidator},
        fetch::{EvidenceError, RevocationEvidenceProvider},
        ocsp::{OcspValidation, OcspValidator},
        RevocationChecking, RevocationDataValidator, RevocationEvidence,
    },
    signature::SignatureValidator,
    trust_store::{TrustCapability, TrustStore},
    verifier::{NoVerification, SignatureVerifier},
    x509::{CertificateToken, CrlToken, OcspResponseToken, SingleResponseToken},
};

/// Wires trust material, policy, and delegates into ready-to-run validators.
///
/// The builder holds a template [`TrustStore`]; every `build_*` call clones
/// it, so certificates one run registers (from a document store, say) never
/// leak into the next. Delegate slots left empty fall back to the default
/// validator for that concern; a substituted delegate is shared by every
/// subsequent build.
///
/// ## Example
///
/// ```
/// use docsig::builder::ValidatorChainBuilder;
/// use docsig::TrustCapability;
///
/// # fn main() -> docsig::Result<()> {
/// let mut builder = ValidatorChainBuilder::new();
/// builder.with_trusted_pem(b"", TrustCapability::General)?;
/// let validator = builder.build_signature_validator();
/// # Ok(())
/// # }
/// ```
pub struct ValidatorChainBuilder {
    properties: Arc<SignatureValidationProperties>,
    trust_store: TrustStore,
    verifier: Arc<dyn SignatureVerifier>,
    chain: Option<Arc<dyn ChainValidation>>,
    revocation: Option<Arc<dyn RevocationChecking>>,
    crl: Option<Arc<dyn CrlValidation>>,
    ocsp: Option<Arc<dyn OcspValidation>>,
    providers: Vec<Arc<dyn RevocationEvidenceProvider>>,
    online_fetchers: Vec<Arc<dyn RevocationEvidenceProvider>>,
}

impl Default for ValidatorChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorChainBuilder {
    /// Creates a builder with default policy, an empty trust store, and the
    /// accept-all [`NoVerification`] verifier.
    pub fn new() -> Self {
        Self {
            properties: Arc::new(SignatureValidationProperties::new()),
            trust_store: TrustStore::new(),
            verifier: Arc::new(NoVerification),
            chain: None,
            revocation: None,
            crl: None,
            ocsp: None,
            providers: Vec::new(),
            online_fetchers: Vec::new(),
        }
    }

    /// The template trust store. Registrations here feed every later build.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    /// Replaces the template trust store.
    pub fn with_trust_store(&mut self, trust_store: TrustStore) -> &mut Self {
        self.trust_store = trust_store;
        self
    }

    /// Registers PEM-encoded trust anchors on the template store.
    pub fn with_trusted_pem(
        &mut self,
        pem: &[u8],
        capability: TrustCapability,
    ) -> Result<&mut Self> {
        self.trust_store.add_trusted_pem(pem, capability)?;
        Ok(self)
    }

    /// Registers PEM-encoded untrusted issuer material on the template store.
    pub fn with_known_pem(&mut self, pem: &[u8]) -> Result<&mut Self> {
        self.trust_store.add_known_pem(pem)?;
        Ok(self)
    }

    /// Replaces the validation policy.
    pub fn with_properties(&mut self, properties: SignatureValidationProperties) -> &mut Self {
        self.properties = Arc::new(properties);
        self
    }

    /// Replaces the cryptographic verifier.
    pub fn with_signature_verifier(
        &mut self,
        verifier: impl SignatureVerifier + 'static,
    ) -> &mut Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Substitutes the chain delegate used by built signature validators.
    pub fn with_chain_validation(&mut self, chain: impl ChainValidation + 'static) -> &mut Self {
        self.chain = Some(Arc::new(chain));
        self
    }

    /// Substitutes the revocation delegate used by built chain validators.
    pub fn with_revocation_checking(
        &mut self,
        revocation: impl RevocationChecking + 'static,
    ) -> &mut Self {
        self.revocation = Some(Arc::new(revocation));
        self
    }

    /// Substitutes the CRL evidence validator.
    pub fn with_crl_validation(&mut self, crl: impl CrlValidation + 'static) -> &mut Self {
        self.crl = Some(Arc::new(crl));
        self
    }

    /// Substitutes the OCSP evidence validator.
    pub fn with_ocsp_validation(&mut self, ocsp: impl OcspValidation + 'static) -> &mut Self {
        self.ocsp = Some(Arc::new(ocsp));
        self
    }

    /// Registers an offline evidence provider for built revocation
    /// validators.
    pub fn add_evidence_provider(
        &mut self,
        provider: impl RevocationEvidenceProvider + 'static,
    ) -> &mut Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Registers an online fetcher, consulted according to the online-fetch
    /// policy.
    pub fn add_online_fetcher(
        &mut self,
        fetcher: impl RevocationEvidenceProvider + 'static,
    ) -> &mut Self {
        self.online_fetchers.push(Arc::new(fetcher));
        self
    }

    /// Builds a CRL validator over a fresh clone of the trust store.
    pub fn build_crl_validator(&self) -> CrlValidator {
        CrlValidator::new(self.run_store(), self.verifier.clone())
    }

    /// Builds an OCSP validator over a fresh clone of the trust store.
    pub fn build_ocsp_validator(&self) -> OcspValidator {
        OcspValidator::new(self.properties.clone(), self.run_store(), self.verifier.clone())
    }

    /// Builds a revocation-data validator over a fresh clone of the trust
    /// store, wiring the configured evidence validators and providers.
    pub fn build_revocation_data_validator(&self) -> RevocationDataValidator {
        self.assemble_revocation(self.run_store())
    }

    /// Builds a chain validator over a fresh clone of the trust store.
    pub fn build_certificate_chain_validator(&self) -> CertificateChainValidator {
        self.assemble_chain(self.run_store())
    }

    /// Builds a document revisions validator.
    pub fn build_document_revisions_validator(&self) -> DocumentRevisionsValidator {
        DocumentRevisionsValidator::new(self.properties.clone())
    }

    /// Builds a signature validator whose whole delegate stack shares one
    /// fresh clone of the trust store.
    pub fn build_signature_validator(&self) -> SignatureValidator {
        let store = self.run_store();
        let mut validator = SignatureValidator::new(
            self.properties.clone(),
            store.clone(),
            self.verifier.clone(),
        );

        let chain: Box<dyn ChainValidation> = match &self.chain {
            Some(substituted) => Box::new(SharedChain(substituted.clone())),
            None => Box::new(self.assemble_chain(store)),
        };
        validator.set_chain_validation(chain);
        validator.set_document_revisions_validator(self.build_document_revisions_validator());

        validator
    }

    fn run_store(&self) -> Arc<TrustStore> {
        Arc::new(self.trust_store.clone())
    }

    fn assemble_revocation(&self, store: Arc<TrustStore>) -> RevocationDataValidator {
        let mut revocation =
            RevocationDataValidator::new(self.properties.clone(), store, self.verifier.clone());

        if let Some(crl) = &self.crl {
            revocation.set_crl_validation(Box::new(SharedCrl(crl.clone())));
        }

        if let Some(ocsp) = &self.ocsp {
            revocation.set_ocsp_validation(Box::new(SharedOcsp(ocsp.clone())));
        }

        for provider in &self.providers {
            revocation.add_evidence_provider(Box::new(SharedProvider(provider.clone())));
        }

        for fetcher in &self.online_fetchers {
            revocation.add_online_fetcher(Box::new(SharedProvider(fetcher.clone())));
        }

        revocation
    }

    fn assemble_chain(&self, store: Arc<TrustStore>) -> CertificateChainValidator {
        let mut chain = CertificateChainValidator::new(
            self.properties.clone(),
            store.clone(),
            self.verifier.clone(),
        );

        let revocation: Box<dyn RevocationChecking> = match &self.revocation {
            Some(substituted) => Box::new(SharedRevocation(substituted.clone())),
            None => Box::new(self.assemble_revocation(store)),
        };
        chain.set_revocation_checking(revocation);

        chain
    }
}

// Delegate adapters: the builder shares its substituted delegates across
// builds through `Arc`, while the validators own plain boxes.

struct SharedChain(Arc<dyn ChainValidation>);

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

struct SharedRevocation(Arc<dyn RevocationChecking>);

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

struct SharedCrl(Arc<dyn CrlValidation>);

impl CrlValidation for SharedCrl {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        crl: &CrlToken,
        date: DateTime<Utc>,
    ) {
        self.0.validate(report, context, certificate, crl, date);
    }
}

struct SharedOcsp(Arc<dyn OcspValidation>);

impl OcspValidation for SharedOcsp {
    fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &CertificateToken,
        single_response: &SingleResponseToken,
        basic_response: &OcspResponseToken,
        date: DateTime<Utc>,
    ) {
        self.0
            .validate(report, context, certificate, single_response, basic_response, date);
    }
}

struct SharedProvider(Arc<dyn RevocationEvidenceProvider>);

impl RevocationEvidenceProvider for SharedProvider {
    fn fetch(
        &self,
        certificate: &CertificateToken,
        issuer: Option<&CertificateToken>,
    ) -> std::result::Result<Vec<RevocationEvidence>, EvidenceError> {
        self.0.fetch(certificate, issuer)
    }
}
