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

use thiserror::Error;

/// `Error` enumerates faults returned by docsig operations that fail
/// outright, such as loading trust material or fetching revocation evidence.
///
/// Validation findings are never surfaced this way: validators collect
/// report items and always hand back a complete
/// [`ValidationReport`](docsig_report::ValidationReport).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] crate::x509::ParseError),

    #[error(transparent)]
    Verification(#[from] crate::verifier::VerificationError),

    #[error(transparent)]
    Evidence(#[from] crate::revocation::fetch::EvidenceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// A specialized `Result` type for docsig operations.
pub type Result<T> = std::result::Result<T, Error>;
