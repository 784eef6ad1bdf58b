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

/// Describes errors that can occur when verifying a raw signature.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The signature does not match the signed bytes.
    #[error("signature does not match the signed data")]
    SignatureMismatch,

    /// The signature algorithm is not supported by this verifier.
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// The public key could not be interpreted.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature payload could not be interpreted.
    #[error("invalid signature payload")]
    InvalidSignature,

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Verifies a raw signature over a byte range against a public key.
///
/// This crate evaluates trust, not cryptography: implementations plug in
/// the actual primitive. The trust conclusions drawn from a successful
/// verification are only as good as the verifier supplied.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `data` against a DER-encoded
    /// `SubjectPublicKeyInfo`.
    ///
    /// `algorithm` is the dotted signature-algorithm OID when the caller
    /// knows it.
    fn verify(
        &self,
        signature: &[u8],
        data: &[u8],
        public_key_der: &[u8],
        algorithm: Option<&str>,
    ) -> Result<(), VerificationError>;
}

/// A verifier that accepts every signature.
///
/// Default for validator builds that only evaluate trust relationships,
/// and for tests that construct tokens without signing material.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoVerification;

impl SignatureVerifier for NoVerification {
    fn verify(
        &self,
        _signature: &[u8],
        _data: &[u8],
        _public_key_der: &[u8],
        _algorithm: Option<&str>,
    ) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// Verify a token's signature when it carries signing material.
///
/// Tokens constructed by hand have no to-be-signed bytes; there is nothing
/// to verify for them, so they pass. Tokens decoded from wire data always
/// carry both fields.
pub(crate) fn verify_token_signature(
    verifier: &dyn SignatureVerifier,
    tbs: Option<&[u8]>,
    signature: Option<&[u8]>,
    issuer_spki_der: &[u8],
    algorithm: Option<&str>,
) -> Result<(), VerificationError> {
    match (tbs, signature) {
        (Some(tbs), Some(signature)) => {
            verifier.verify(signature, tbs, issuer_spki_der, algorithm)
        }
        _ => Ok(()),
    }
}
