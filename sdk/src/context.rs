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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which validator is performing the current check.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidatorRole {
    /// Certificate chain walking.
    CertificateChain,

    /// Revocation evidence gathering and selection.
    RevocationData,

    /// CRL evaluation.
    Crl,

    /// OCSP evaluation.
    Ocsp,

    /// Top-level signature orchestration.
    Signature,

    /// Incremental document revision checking.
    DocumentRevisions,
}

impl ValidatorRole {
    pub(crate) const ALL: [ValidatorRole; 6] = [
        ValidatorRole::CertificateChain,
        ValidatorRole::RevocationData,
        ValidatorRole::Crl,
        ValidatorRole::Ocsp,
        ValidatorRole::Signature,
        ValidatorRole::DocumentRevisions,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ValidatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorRole::CertificateChain => "certificate-chain",
            ValidatorRole::RevocationData => "revocation-data",
            ValidatorRole::Crl => "crl",
            ValidatorRole::Ocsp => "ocsp",
            ValidatorRole::Signature => "signature",
            ValidatorRole::DocumentRevisions => "document-revisions",
        };
        f.write_str(name)
    }
}

/// Why a certificate is being examined.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateSource {
    /// The certificate signed the document itself.
    SignerCert,

    /// The certificate issued another certificate in the chain.
    CertIssuer,

    /// The certificate signed an OCSP response.
    OcspIssuer,

    /// The certificate signed a CRL.
    CrlIssuer,

    /// The certificate signed a timestamp token.
    Timestamp,
}

impl CertificateSource {
    pub(crate) const ALL: [CertificateSource; 5] = [
        CertificateSource::SignerCert,
        CertificateSource::CertIssuer,
        CertificateSource::OcspIssuer,
        CertificateSource::CrlIssuer,
        CertificateSource::Timestamp,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertificateSource::SignerCert => "signer-cert",
            CertificateSource::CertIssuer => "cert-issuer",
            CertificateSource::OcspIssuer => "ocsp-issuer",
            CertificateSource::CrlIssuer => "crl-issuer",
            CertificateSource::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Whether "now" or "at signing time" semantics apply to freshness checks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Moment {
    /// The validation date is the current time.
    Present,

    /// The validation date lies in the past (an earlier signature).
    Historical,
}

impl Moment {
    pub(crate) const ALL: [Moment; 2] = [Moment::Present, Moment::Historical];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Moment::Present => "present",
            Moment::Historical => "historical",
        };
        f.write_str(name)
    }
}

/// Immutable lookup key for policy resolution and report annotation.
///
/// A context never changes in place; sub-checks that switch one axis (for
/// example, moving to `CertificateSource::CertIssuer` while recursing up a
/// chain) derive a new context via [`with_role`](Self::with_role),
/// [`with_source`](Self::with_source), or [`with_moment`](Self::with_moment).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ValidationContext {
    role: ValidatorRole,
    source: CertificateSource,
    moment: Moment,
}

impl ValidationContext {
    /// Creates a context from its three axes.
    pub fn new(role: ValidatorRole, source: CertificateSource, moment: Moment) -> Self {
        Self {
            role,
            source,
            moment,
        }
    }

    /// The validator performing the current check.
    pub fn role(&self) -> ValidatorRole {
        self.role
    }

    /// Why the current certificate is being examined.
    pub fn source(&self) -> CertificateSource {
        self.source
    }

    /// Time semantics of the current check.
    pub fn moment(&self) -> Moment {
        self.moment
    }

    /// Returns a copy of this context with a different validator role.
    pub fn with_role(&self, role: ValidatorRole) -> Self {
        Self { role, ..*self }
    }

    /// Returns a copy of this context with a different certificate source.
    pub fn with_source(&self, source: CertificateSource) -> Self {
        Self { source, ..*self }
    }

    /// Returns a copy of this context with different time semantics.
    pub fn with_moment(&self, moment: Moment) -> Self {
        Self { moment, ..*self }
    }
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.role, self.source, self.moment)
    }
}

/// A set of [`ValidatorRole`]s, used when registering policy overrides.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidatorRoles(u8);

impl ValidatorRoles {
    /// The set containing every role.
    pub fn all() -> Self {
        Self::only(&ValidatorRole::ALL)
    }

    /// The set containing exactly the given roles.
    pub fn only(roles: &[ValidatorRole]) -> Self {
        Self(roles.iter().fold(0, |acc, role| acc | role.bit()))
    }

    /// Returns `true` if `role` is a member of this set.
    pub fn contains(&self, role: ValidatorRole) -> bool {
        self.0 & role.bit() != 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = ValidatorRole> + '_ {
        ValidatorRole::ALL
            .iter()
            .copied()
            .filter(|role| self.contains(*role))
    }
}

/// A set of [`CertificateSource`]s, used when registering policy overrides.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CertificateSources(u8);

impl CertificateSources {
    /// The set containing every source.
    pub fn all() -> Self {
        Self::only(&CertificateSource::ALL)
    }

    /// The set containing exactly the given sources.
    pub fn only(sources: &[CertificateSource]) -> Self {
        Self(sources.iter().fold(0, |acc, source| acc | source.bit()))
    }

    /// Returns `true` if `source` is a member of this set.
    pub fn contains(&self, source: CertificateSource) -> bool {
        self.0 & source.bit() != 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = CertificateSource> + '_ {
        CertificateSource::ALL
            .iter()
            .copied()
            .filter(|source| self.contains(*source))
    }
}

/// A set of [`Moment`]s, used when registering policy overrides.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Moments(u8);

impl Moments {
    /// The set containing both moments.
    pub fn all() -> Self {
        Self::only(&Moment::ALL)
    }

    /// The set containing exactly the given moments.
    pub fn only(moments: &[Moment]) -> Self {
        Self(moments.iter().fold(0, |acc, moment| acc | moment.bit()))
    }

    /// Returns `true` if `moment` is a member of this set.
    pub fn contains(&self, moment: Moment) -> bool {
        self.0 & moment.bit() != 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Moment> + '_ {
        Moment::ALL
            .iter()
            .copied()
            .filter(|moment| self.contains(*moment))
    }
}
