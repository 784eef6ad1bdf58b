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

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    context::{CertificateSources, Moment, Moments, ValidationContext, ValidatorRoles},
    x509::{ExtendedKeyPurpose, KeyUsageFlag, RequiredExtension},
    CertificateSource,
};

/// Policy for fetching revocation evidence over the network.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnlineFetching {
    /// Never consult online fetchers.
    NeverFetch,

    /// Online fetchers participate in every evidence collection round.
    AlwaysFetch,

    /// Consult online fetchers only when no embedded evidence is available.
    FetchIfNoOtherDataAvailable,
}

#[derive(Clone, Debug, Default)]
struct ContextProperties {
    freshness: Option<Duration>,
    continue_after_failure: Option<bool>,
    online_fetching: Option<OnlineFetching>,
    required_extensions: Option<Vec<RequiredExtension>>,
}

/// Context-aware validation policy.
///
/// Each parameter is resolved for a full `(role, source, moment)` triple.
/// Setters register an override for the Cartesian product of the given axis
/// sets; getters return the value most recently registered for the queried
/// context.
///
/// Resolution is strictly **last-write-wins**, not most-specific-wins: an
/// override registered for all contexts *after* a narrower one silently
/// replaces the narrow value for every context it covers. Register broad
/// defaults first and narrow overrides last. [`Default`] follows that rule,
/// registering the built-in defaults through the same setters so caller
/// overrides layer on top predictably.
#[derive(Clone, Debug)]
pub struct SignatureValidationProperties {
    by_context: HashMap<ValidationContext, ContextProperties>,
}

impl SignatureValidationProperties {
    /// Returns the built-in policy: 30-day freshness for present-time
    /// contexts and 365 days for historical ones, continue-after-failure
    /// enabled, online fetch only when no other data is available, and the
    /// conventional key-usage/EKU requirement per certificate source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshness tolerance for every context in the product of
    /// the given sets.
    ///
    /// A negative tolerance requires revocation evidence strictly newer than
    /// the validation date.
    pub fn set_freshness(
        &mut self,
        roles: ValidatorRoles,
        sources: CertificateSources,
        moments: Moments,
        value: Duration,
    ) -> &mut Self {
        self.update(roles, sources, moments, |props| {
            props.freshness = Some(value);
        })
    }

    /// Registers the continue-after-failure flag for every context in the
    /// product of the given sets.
    ///
    /// When `false`, a validator stops at the first failure it appends; when
    /// `true`, it keeps going and accumulates a complete audit report.
    pub fn set_continue_after_failure(
        &mut self,
        roles: ValidatorRoles,
        sources: CertificateSources,
        moments: Moments,
        value: bool,
    ) -> &mut Self {
        self.update(roles, sources, moments, |props| {
            props.continue_after_failure = Some(value);
        })
    }

    /// Registers the online-fetch policy for every context in the product of
    /// the given sets.
    pub fn set_online_fetching(
        &mut self,
        roles: ValidatorRoles,
        sources: CertificateSources,
        moments: Moments,
        value: OnlineFetching,
    ) -> &mut Self {
        self.update(roles, sources, moments, |props| {
            props.online_fetching = Some(value);
        })
    }

    /// Registers the required certificate extensions for every context in the
    /// product of the given sets.
    pub fn set_required_extensions(
        &mut self,
        roles: ValidatorRoles,
        sources: CertificateSources,
        moments: Moments,
        value: Vec<RequiredExtension>,
    ) -> &mut Self {
        self.update(roles, sources, moments, |props| {
            props.required_extensions = Some(value.clone());
        })
    }

    fn update(
        &mut self,
        roles: ValidatorRoles,
        sources: CertificateSources,
        moments: Moments,
        mutation: impl Fn(&mut ContextProperties),
    ) -> &mut Self {
        for role in roles.iter() {
            for source in sources.iter() {
                for moment in moments.iter() {
                    let context = ValidationContext::new(role, source, moment);
                    mutation(self.by_context.entry(context).or_default());
                }
            }
        }
        self
    }

    /// Resolves the freshness tolerance for `context`.
    pub fn freshness(&self, context: &ValidationContext) -> Duration {
        self.by_context
            .get(context)
            .and_then(|props| props.freshness)
            .unwrap_or_else(|| default_freshness(context.moment()))
    }

    /// Resolves the continue-after-failure flag for `context`.
    pub fn continue_after_failure(&self, context: &ValidationContext) -> bool {
        self.by_context
            .get(context)
            .and_then(|props| props.continue_after_failure)
            .unwrap_or(true)
    }

    /// Resolves the online-fetch policy for `context`.
    pub fn online_fetching(&self, context: &ValidationContext) -> OnlineFetching {
        self.by_context
            .get(context)
            .and_then(|props| props.online_fetching)
            .unwrap_or(OnlineFetching::FetchIfNoOtherDataAvailable)
    }

    /// Resolves the required certificate extensions for `context`.
    pub fn required_extensions(&self, context: &ValidationContext) -> Vec<RequiredExtension> {
        self.by_context
            .get(context)
            .and_then(|props| props.required_extensions.clone())
            .unwrap_or_default()
    }
}

impl Default for SignatureValidationProperties {
    fn default() -> Self {
        let mut this = Self {
            by_context: HashMap::new(),
        };

        this.set_freshness(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::only(&[Moment::Present]),
            Duration::days(30),
        )
        .set_freshness(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::only(&[Moment::Historical]),
            Duration::days(365),
        )
        .set_continue_after_failure(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            true,
        )
        .set_online_fetching(
            ValidatorRoles::all(),
            CertificateSources::all(),
            Moments::all(),
            OnlineFetching::FetchIfNoOtherDataAvailable,
        )
        .set_required_extensions(
            ValidatorRoles::all(),
            CertificateSources::only(&[CertificateSource::SignerCert]),
            Moments::all(),
            vec![RequiredExtension::KeyUsage(KeyUsageFlag::NonRepudiation)],
        )
        .set_required_extensions(
            ValidatorRoles::all(),
            CertificateSources::only(&[CertificateSource::CertIssuer]),
            Moments::all(),
            vec![RequiredExtension::KeyUsage(KeyUsageFlag::KeyCertSign)],
        )
        .set_required_extensions(
            ValidatorRoles::all(),
            CertificateSources::only(&[CertificateSource::CrlIssuer]),
            Moments::all(),
            vec![RequiredExtension::KeyUsage(KeyUsageFlag::CrlSign)],
        )
        .set_required_extensions(
            ValidatorRoles::all(),
            CertificateSources::only(&[CertificateSource::OcspIssuer]),
            Moments::all(),
            vec![RequiredExtension::ExtendedKeyUsage(
                ExtendedKeyPurpose::OcspSigning,
            )],
        )
        .set_required_extensions(
            ValidatorRoles::all(),
            CertificateSources::only(&[CertificateSource::Timestamp]),
            Moments::all(),
            vec![RequiredExtension::ExtendedKeyUsage(
                ExtendedKeyPurpose::TimeStamping,
            )],
        );

        this
    }
}

fn default_freshness(moment: Moment) -> Duration {
    match moment {
        Moment::Present => Duration::days(30),
        Moment::Historical => Duration::days(365),
    }
}
