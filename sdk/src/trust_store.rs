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

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    x509::{CertificateToken, ParseError},
    CertificateSource,
};

/// Purpose a certificate is trusted for.
///
/// A certificate trusted only for one capability must not anchor a chain
/// examined under a [`CertificateSource`] that maps to a different
/// capability; [`TrustCapability::General`] anchors everything.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustCapability {
    /// Trusted for any purpose.
    General,

    /// Trusted to issue certificates.
    Ca,

    /// Trusted to sign OCSP responses.
    OcspResponseSigning,

    /// Trusted to sign CRLs.
    CrlSigning,

    /// Trusted to sign timestamps.
    Timestamping,
}

impl TrustCapability {
    /// The capability an anchor must hold for a certificate examined under
    /// the given source.
    pub fn for_source(source: CertificateSource) -> Self {
        match source {
            CertificateSource::SignerCert => Self::General,
            CertificateSource::CertIssuer => Self::Ca,
            CertificateSource::OcspIssuer => Self::OcspResponseSigning,
            CertificateSource::CrlIssuer => Self::CrlSigning,
            CertificateSource::Timestamp => Self::Timestamping,
        }
    }
}

impl fmt::Display for TrustCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Ca => "ca",
            Self::OcspResponseSigning => "ocsp-response-signing",
            Self::CrlSigning => "crl-signing",
            Self::Timestamping => "timestamping",
        };

        f.write_str(name)
    }
}

/// Holds known and trusted certificates and resolves issuers for chain
/// walking.
///
/// Known certificates are usable for chain completion but never anchor a
/// chain; trusted certificates additionally carry one or more
/// [`TrustCapability`] values. The pool sits behind a lock so one store can
/// be shared across validators: the orchestrator registers a document's
/// embedded certificates through the same handle the chain walk reads from.
/// Cloning produces an independent copy of the pool.
#[derive(Debug, Default)]
pub struct TrustStore {
    inner: RwLock<Pool>,
}

#[derive(Clone, Debug, Default)]
struct Pool {
    /// Every certificate the store knows, in registration order. Issuer
    /// lookups scan in this order, which keeps tie-breaking deterministic.
    certificates: Vec<CertificateToken>,

    /// Fingerprints of `certificates`, for dedup on insert.
    fingerprints: HashSet<Vec<u8>>,

    /// Capabilities per trusted certificate, keyed by fingerprint.
    capabilities: HashMap<Vec<u8>, Vec<TrustCapability>>,
}

impl Clone for TrustStore {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.pool().clone()),
        }
    }
}

impl TrustStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> RwLockReadGuard<'_, Pool> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pool_mut(&self) -> RwLockWriteGuard<'_, Pool> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add certificates usable for chain completion but not as anchors.
    pub fn add_known(&self, certificates: impl IntoIterator<Item = CertificateToken>) {
        let mut pool = self.pool_mut();
        for cert in certificates {
            pool.insert(cert);
        }
    }

    /// Add certificates trusted for the given capability.
    ///
    /// Calling again with another capability extends the set for a
    /// certificate already present.
    pub fn add_trusted(
        &self,
        certificates: impl IntoIterator<Item = CertificateToken>,
        capability: TrustCapability,
    ) {
        let mut pool = self.pool_mut();
        for cert in certificates {
            let fingerprint = pool.insert(cert);
            let capabilities = pool.capabilities.entry(fingerprint).or_default();
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
    }

    /// Read every `CERTIFICATE` block from a PEM buffer into the known
    /// pool.
    pub fn add_known_pem(&self, pem: &[u8]) -> Result<(), ParseError> {
        self.add_known(CertificateToken::from_pem_multi(pem)?);
        Ok(())
    }

    /// Read every `CERTIFICATE` block from a PEM buffer as trusted for the
    /// given capability.
    pub fn add_trusted_pem(
        &self,
        pem: &[u8],
        capability: TrustCapability,
    ) -> Result<(), ParseError> {
        self.add_trusted(CertificateToken::from_pem_multi(pem)?, capability);
        Ok(())
    }

    /// True if the certificate is trusted for the given capability.
    pub fn is_trusted_for(&self, cert: &CertificateToken, capability: TrustCapability) -> bool {
        self.pool().is_trusted_for(cert, capability)
    }

    /// True if the certificate is trusted for any capability at all.
    pub fn is_trusted(&self, cert: &CertificateToken) -> bool {
        self.pool().is_trusted(cert)
    }

    /// True if the certificate may anchor a chain examined under `source`:
    /// trusted either generally or for the capability `source` maps to.
    pub fn is_trusted_for_source(
        &self,
        cert: &CertificateToken,
        source: CertificateSource,
    ) -> bool {
        let pool = self.pool();
        pool.is_trusted_for(cert, TrustCapability::General)
            || pool.is_trusted_for(cert, TrustCapability::for_source(source))
    }

    /// Resolve the issuer of `cert`.
    ///
    /// Matches on the issuer name, refined by authority/subject key
    /// identifiers when both sides carry them. A candidate already present
    /// in `chain` wins over one found only in the store.
    pub fn retrieve_issuer(
        &self,
        cert: &CertificateToken,
        chain: &[CertificateToken],
    ) -> Option<CertificateToken> {
        self.pool().retrieve_issuer(cert, chain)
    }

    /// Certificates whose subject matches the given name.
    pub fn certificates_by_subject(
        &self,
        subject: &str,
        subject_der: Option<&[u8]>,
    ) -> Vec<CertificateToken> {
        self.pool()
            .certificates
            .iter()
            .filter(|candidate| names_match(candidate, subject, subject_der))
            .cloned()
            .collect()
    }

    /// Extend a partial chain towards its root, best effort.
    ///
    /// Stops at a self-signed certificate, at the first unresolvable
    /// issuer, or when the walk would revisit a certificate.
    pub fn complete_chain(&self, chain: &[CertificateToken]) -> Vec<CertificateToken> {
        let pool = self.pool();
        let mut full: Vec<CertificateToken> = chain.to_vec();
        let mut seen: HashSet<Vec<u8>> = full.iter().map(CertificateToken::fingerprint).collect();

        while let Some(last) = full.last() {
            if last.is_self_signed() {
                break;
            }

            let Some(issuer) = pool.retrieve_issuer(last, chain) else {
                break;
            };

            if !seen.insert(issuer.fingerprint()) {
                break;
            }

            full.push(issuer);
        }

        full
    }

    /// Walk issuers upward until a trusted certificate is found.
    pub fn trusted_root(&self, cert: &CertificateToken) -> Option<CertificateToken> {
        self.pool().trusted_root(cert)
    }

    /// True if both certificates resolve to the same trusted root.
    pub fn share_trust_root(&self, a: &CertificateToken, b: &CertificateToken) -> bool {
        let pool = self.pool();
        match (pool.trusted_root(a), pool.trusted_root(b)) {
            (Some(root_a), Some(root_b)) => root_a.fingerprint() == root_b.fingerprint(),
            _ => false,
        }
    }
}

impl Pool {
    fn insert(&mut self, cert: CertificateToken) -> Vec<u8> {
        let fingerprint = cert.fingerprint();
        if self.fingerprints.insert(fingerprint.clone()) {
            self.certificates.push(cert);
        }

        fingerprint
    }

    fn is_trusted_for(&self, cert: &CertificateToken, capability: TrustCapability) -> bool {
        self.capabilities
            .get(&cert.fingerprint())
            .is_some_and(|capabilities| capabilities.contains(&capability))
    }

    fn is_trusted(&self, cert: &CertificateToken) -> bool {
        self.capabilities
            .get(&cert.fingerprint())
            .is_some_and(|capabilities| !capabilities.is_empty())
    }

    fn retrieve_issuer(
        &self,
        cert: &CertificateToken,
        chain: &[CertificateToken],
    ) -> Option<CertificateToken> {
        let fingerprint = cert.fingerprint();

        chain
            .iter()
            .chain(self.certificates.iter())
            .find(|candidate| {
                candidate.fingerprint() != fingerprint
                    && names_match(candidate, &cert.issuer, cert.issuer_der.as_deref())
                    && key_identifiers_match(cert, candidate)
            })
            .cloned()
    }

    fn trusted_root(&self, cert: &CertificateToken) -> Option<CertificateToken> {
        let mut current = cert.clone();
        let mut seen = HashSet::new();

        loop {
            if self.is_trusted(&current) {
                return Some(current);
            }

            if !seen.insert(current.fingerprint()) {
                return None;
            }

            current = self.retrieve_issuer(&current, &[])?;
        }
    }
}

fn names_match(candidate: &CertificateToken, subject: &str, subject_der: Option<&[u8]>) -> bool {
    match (subject_der, &candidate.subject_der) {
        (Some(wanted), Some(have)) => wanted == have.as_slice(),
        _ => candidate.subject == subject,
    }
}

// Authority/subject key identifiers refine the name match when both sides
// carry them; absence on either side leaves the name match in charge.
fn key_identifiers_match(cert: &CertificateToken, candidate: &CertificateToken) -> bool {
    match (
        &cert.authority_key_identifier,
        &candidate.subject_key_identifier,
    ) {
        (Some(aki), Some(ski)) => aki == ski,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn cert(subject: &str, issuer: &str, serial: u8) -> CertificateToken {
        CertificateToken {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            serial: vec![serial],
            ..Default::default()
        }
    }

    #[test]
    fn capability_scoping() {
        let responder = cert("CN=Responder", "CN=Root", 1);

        let store = TrustStore::new();
        store.add_trusted(vec![responder.clone()], TrustCapability::OcspResponseSigning);

        assert!(store.is_trusted(&responder));
        assert!(store.is_trusted_for(&responder, TrustCapability::OcspResponseSigning));
        assert!(!store.is_trusted_for(&responder, TrustCapability::General));

        assert!(store.is_trusted_for_source(&responder, CertificateSource::OcspIssuer));
        assert!(!store.is_trusted_for_source(&responder, CertificateSource::SignerCert));
        assert!(!store.is_trusted_for_source(&responder, CertificateSource::CrlIssuer));
    }

    #[test]
    fn general_trust_covers_every_source() {
        let root = cert("CN=Root", "CN=Root", 1);

        let store = TrustStore::new();
        store.add_trusted(vec![root.clone()], TrustCapability::General);

        for source in CertificateSource::ALL {
            assert!(store.is_trusted_for_source(&root, source), "{source}");
        }
    }

    #[test]
    fn capabilities_accumulate() {
        let anchor = cert("CN=Anchor", "CN=Anchor", 1);

        let store = TrustStore::new();
        store.add_trusted(vec![anchor.clone()], TrustCapability::CrlSigning);
        store.add_trusted(vec![anchor.clone()], TrustCapability::Timestamping);

        assert!(store.is_trusted_for(&anchor, TrustCapability::CrlSigning));
        assert!(store.is_trusted_for(&anchor, TrustCapability::Timestamping));
        assert!(!store.is_trusted_for(&anchor, TrustCapability::General));
    }

    #[test]
    fn known_certificates_are_not_trusted() {
        let inter = cert("CN=Inter", "CN=Root", 1);

        let store = TrustStore::new();
        store.add_known(vec![inter.clone()]);

        assert!(!store.is_trusted(&inter));
        assert!(store
            .retrieve_issuer(&cert("CN=Leaf", "CN=Inter", 2), &[])
            .is_some());
    }

    #[test]
    fn issuer_resolution_prefers_supplied_chain() {
        let leaf = cert("CN=Leaf", "CN=Inter", 1);
        let chain_inter = cert("CN=Inter", "CN=Root", 2);
        let store_inter = cert("CN=Inter", "CN=Root", 3);

        let store = TrustStore::new();
        store.add_known(vec![store_inter]);

        let chain = vec![leaf.clone(), chain_inter.clone()];
        let issuer = store.retrieve_issuer(&leaf, &chain).unwrap();
        assert_eq!(issuer.serial, chain_inter.serial);
    }

    #[test]
    fn issuer_resolution_honors_key_identifiers() {
        let mut leaf = cert("CN=Leaf", "CN=Inter", 1);
        leaf.authority_key_identifier = Some(vec![0xbb]);

        let mut wrong = cert("CN=Inter", "CN=Root", 2);
        wrong.subject_key_identifier = Some(vec![0xaa]);
        let mut right = cert("CN=Inter", "CN=Root", 3);
        right.subject_key_identifier = Some(vec![0xbb]);

        let store = TrustStore::new();
        store.add_known(vec![wrong, right.clone()]);

        let issuer = store.retrieve_issuer(&leaf, &[]).unwrap();
        assert_eq!(issuer.serial, right.serial);
    }

    #[test]
    fn issuer_resolution_never_returns_the_queried_cert() {
        let root = cert("CN=Root", "CN=Root", 1);

        let store = TrustStore::new();
        store.add_known(vec![root.clone()]);

        assert!(store.retrieve_issuer(&root, &[]).is_none());
    }

    #[test]
    fn chain_completion_walks_to_the_root() {
        let leaf = cert("CN=Leaf", "CN=Inter", 1);
        let inter = cert("CN=Inter", "CN=Root", 2);
        let root = cert("CN=Root", "CN=Root", 3);

        let store = TrustStore::new();
        store.add_known(vec![inter.clone(), root.clone()]);

        let full = store.complete_chain(&[leaf.clone()]);
        assert_eq!(full.len(), 3);
        assert_eq!(full[0].subject, "CN=Leaf");
        assert_eq!(full[1].subject, "CN=Inter");
        assert_eq!(full[2].subject, "CN=Root");
    }

    #[test]
    fn chain_completion_survives_issuer_cycles() {
        let a = cert("CN=A", "CN=B", 1);
        let b = cert("CN=B", "CN=A", 2);

        let store = TrustStore::new();
        store.add_known(vec![a.clone(), b]);

        let full = store.complete_chain(&[a]);
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn shared_trust_root_is_detected() {
        let signer = cert("CN=Signer", "CN=Root", 1);
        let crl_signer = cert("CN=CRL Signer", "CN=Root", 2);
        let stranger = cert("CN=Stranger", "CN=Other Root", 3);
        let root = cert("CN=Root", "CN=Root", 4);

        let store = TrustStore::new();
        store.add_trusted(vec![root], TrustCapability::General);
        store.add_known(vec![signer.clone(), crl_signer.clone(), stranger.clone()]);

        assert!(store.share_trust_root(&signer, &crl_signer));
        assert!(!store.share_trust_root(&signer, &stranger));
    }

    #[test]
    fn registration_through_a_shared_handle_is_visible() {
        let store = std::sync::Arc::new(TrustStore::new());
        let reader = store.clone();

        store.add_known(vec![cert("CN=Inter", "CN=Root", 1)]);

        assert!(reader
            .retrieve_issuer(&cert("CN=Leaf", "CN=Inter", 2), &[])
            .is_some());
    }

    #[test]
    fn cloning_detaches_the_pool() {
        let store = TrustStore::new();
        let copy = store.clone();

        let root = cert("CN=Root", "CN=Root", 1);
        store.add_trusted(vec![root.clone()], TrustCapability::General);

        assert!(store.is_trusted(&root));
        assert!(!copy.is_trusted(&root));
    }

    #[test]
    fn capability_source_mapping() {
        assert_eq!(
            TrustCapability::for_source(CertificateSource::SignerCert),
            TrustCapability::General
        );
        assert_eq!(
            TrustCapability::for_source(CertificateSource::CertIssuer),
            TrustCapability::Ca
        );
        assert_eq!(
            TrustCapability::for_source(CertificateSource::OcspIssuer),
            TrustCapability::OcspResponseSigning
        );
        assert_eq!(
            TrustCapability::for_source(CertificateSource::CrlIssuer),
            TrustCapability::CrlSigning
        );
        assert_eq!(
            TrustCapability::for_source(CertificateSource::Timestamp),
            TrustCapability::Timestamping
        );
    }
}
