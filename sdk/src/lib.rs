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

#![deny(warnings)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]

//! This library evaluates the trustworthiness of digital signatures
//! embedded in incrementally updated documents: cryptographic
//! verification, certificate chain walking against a trust store, CRL
//! and OCSP revocation checking, and a revision-by-revision difference
//! walk that polices what each update was allowed to change.
//!
//! Validation never throws: every check contributes items to a
//! [`ValidationReport`], and the report's [`result`](ValidationReport::result)
//! is the worst status any item carries.
//!
//! # Example: validating a document
//!
//! ```
//! use docsig::{builder::ValidatorChainBuilder, SignedDocument, ValidationResult};
//!
//! let validator = ValidatorChainBuilder::new().build_signature_validator();
//! let report = validator.validate_signatures(&SignedDocument::default());
//!
//! // An empty document carries nothing to validate.
//! assert_eq!(report.result(), ValidationResult::Indeterminate);
//! for item in report.items() {
//!     println!("{}: {}", item.check_name, item.message);
//! }
//! ```
//!
//! # Example: configuring trust and policy
//!
//! ```
//! # use docsig::Result;
//! use docsig::{
//!     builder::ValidatorChainBuilder, CertificateSources, Moments,
//!     SignatureValidationProperties, TrustCapability, ValidatorRoles,
//! };
//!
//! # fn main() -> Result<()> {
//! # let anchors_pem: &[u8] = b"";
//! let mut properties = SignatureValidationProperties::new();
//! properties.set_continue_after_failure(
//!     ValidatorRoles::all(),
//!     CertificateSources::all(),
//!     Moments::all(),
//!     false,
//! );
//!
//! let mut builder = ValidatorChainBuilder::new();
//! builder
//!     .with_properties(properties)
//!     .with_trusted_pem(anchors_pem, TrustCapability::General)?;
//! let validator = builder.build_certificate_chain_validator();
//! # Ok(())
//! # }
//! ```

pub mod builder;

mod chain;
pub use chain::{
    CertificateChainValidator, ChainValidation, CERTIFICATE_CHECK, EXTENSIONS_CHECK,
    VALIDITY_CHECK,
};

mod context;
pub use context::{
    CertificateSource, CertificateSources, Moment, Moments, ValidationContext, ValidatorRole,
    ValidatorRoles,
};

pub mod document;
pub use document::{AccessPermissions, DocumentSignature, SignedDocument};

mod error;
pub use error::{Error, Result};

pub(crate) mod hash;

mod properties;
pub use properties::{OnlineFetching, SignatureValidationProperties};

mod revisions;
pub use revisions::{DocumentRevisionsValidator, DOCUMENT_REVISIONS_CHECK};

pub mod revocation;
pub use revocation::{RevocationChecking, RevocationDataValidator};

mod signature;
pub use signature::{SignatureValidator, SIGNATURE_CHECK};

mod trust_store;
pub use trust_store::{TrustCapability, TrustStore};

mod verifier;
pub use verifier::{NoVerification, SignatureVerifier, VerificationError};

pub mod x509;
pub use x509::{CertificateToken, RequiredExtension};

pub use docsig_report::{
    report_item, ReportItem, ReportItemStatus, ValidationReport, ValidationResult,
};

#[cfg(test)]
pub(crate) mod tests;

/// The internal name of the docsig toolkit
pub const NAME: &str = "docsig";
/// The version of this docsig toolkit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
