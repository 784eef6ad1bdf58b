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

//! Owned value objects for certificates, CRLs, and OCSP responses.
//!
//! The validators in this crate never touch wire formats directly. The
//! adapters here decode DER (via [`x509-parser`] for certificates and CRLs,
//! [`rasn`] for OCSP) into plain owned tokens that can also be constructed
//! by hand, which is how the test suites build their fixtures.
//!
//! A decode failure is an ordinary [`ParseError`]; the validators catch it
//! at the point of use and degrade the verdict for that piece of evidence
//! instead of aborting the run.
//!
//! [`x509-parser`]: https://crates.io/crates/x509-parser
//! [`rasn`]: https://crates.io/crates/rasn

use chrono::{DateTime, Utc};
use thiserror::Error;

mod certificate;
pub use certificate::{
    CertificateToken, ExtendedKeyPurpose, KeyUsageFlag, RequiredExtension, ValidityError,
};

mod crl;
pub use crl::{CrlEntry, CrlScope, CrlToken, RevocationReason};

mod ocsp;
pub use ocsp::{CertStatus, OcspResponseToken, ResponderId, SingleResponseToken};

/// Describes errors that can occur when decoding certificates, CRLs, or
/// OCSP responses from their wire formats.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Certificate bytes could not be decoded.
    #[error("unable to parse certificate: {0}")]
    Certificate(String),

    /// CRL bytes could not be decoded.
    #[error("unable to parse CRL: {0}")]
    Crl(String),

    /// OCSP response bytes could not be decoded.
    #[error("unable to parse OCSP response: {0}")]
    OcspResponse(String),

    /// The outer OCSP response did not carry a successful status.
    #[error("OCSP response status was not successful")]
    OcspNotSuccessful,

    /// A PEM wrapper could not be decoded.
    #[error("unable to parse PEM block: {0}")]
    Pem(String),

    /// A date field was outside the representable range.
    #[error("invalid {0} date")]
    Time(&'static str),

    /// A field held a value the adapters cannot interpret.
    #[error("unexpected value in {0}")]
    Field(&'static str),
}

/// Converts a Unix timestamp coming out of a decoder into a UTC date,
/// naming the offending field on failure.
pub(crate) fn datetime_from_unix(
    secs: i64,
    field: &'static str,
) -> Result<DateTime<Utc>, ParseError> {
    DateTime::from_timestamp(secs, 0).ok_or(ParseError::Time(field))
}

/// Strips leading zero octets from a serial number so serials coming from
/// different decoders compare equal.
pub(crate) fn trim_serial(serial: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < serial.len() && serial[start] == 0 {
        start += 1;
    }
    serial[start..].to_vec()
}
