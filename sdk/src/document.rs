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

//! Snapshot model of a signed document and its incremental revisions.
//!
//! Parsing a document's binary structure is outside this crate. An
//! external revision reader walks the file once and produces the owned
//! snapshots defined here: one [`RevisionSnapshot`] per incremental
//! revision plus one [`DocumentSignature`] per signature or timestamp
//! field. The validators only diff and classify; they never see the wire
//! format.
//!
//! Direct values are summarized as digests so two snapshots can be
//! compared for "changed or not" without keeping the object graph alive.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};

use crate::x509::{CertificateToken, CrlToken, OcspResponseToken};

/// DocMDP-style permission level, least to most permissive.
///
/// [`AccessPermissions::Unrestricted`] is the implicit state of a document
/// no certification signature constrains.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum AccessPermissions {
    /// No changes are permitted after the certifying signature.
    NoChangesPermitted,

    /// Form fill-in and signing are permitted.
    FormFieldsModification,

    /// Form fill-in, signing, and annotation changes are permitted.
    AnnotationModification,

    /// No certification signature constrains the document.
    Unrestricted,
}

impl AccessPermissions {
    /// Map a DocMDP transform `P` value onto a permission level.
    ///
    /// `P` defaults to 2 (form-fields modification) when absent, and
    /// out-of-range values fall back to that default as well.
    pub fn from_docmdp_p(p: Option<i32>) -> Self {
        match p {
            Some(1) => Self::NoChangesPermitted,
            Some(3) => Self::AnnotationModification,
            _ => Self::FormFieldsModification,
        }
    }
}

impl fmt::Display for AccessPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoChangesPermitted => "no changes permitted",
            Self::FormFieldsModification => "form-fields modification",
            Self::AnnotationModification => "annotation modification",
            Self::Unrestricted => "unrestricted",
        };

        f.write_str(name)
    }
}

/// Identity of one object in the document's cross-reference table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId {
    /// Object number.
    pub number: u32,

    /// Generation number.
    pub generation: u16,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Snapshot of one dictionary entry's value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryValue {
    /// The entry points at an indirect object.
    Reference(ObjectId),

    /// The entry holds a direct value, summarized as a digest.
    Digest(u64),
}

/// Snapshot of one page annotation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnotationSnapshot {
    /// Identity of the annotation object.
    pub id: ObjectId,

    /// Annotation subtype name, e.g. `Widget`.
    pub subtype: String,

    /// The annotation is the widget of a signature form field. Those stay
    /// permitted once the certification level allows form filling, since
    /// signing itself adds them.
    pub is_signature_widget: bool,

    /// The annotation is the widget of a document-timestamp field. Those are
    /// always permitted: timestamping appends without changing content.
    pub is_timestamp_widget: bool,

    /// Digest over the annotation's remaining content.
    pub digest: u64,
}

/// Snapshot of one page.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageSnapshot {
    /// Identity of the page object.
    pub id: ObjectId,

    /// Digest over the page's content streams.
    pub content_digest: u64,

    /// Digest over the page's resource dictionary.
    pub resources_digest: u64,

    /// Annotations on the page, in array order.
    pub annotations: Vec<AnnotationSnapshot>,
}

/// Kind of an AcroForm field, from its `FT` name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// `Tx`.
    Text,

    /// `Btn`.
    Button,

    /// `Ch`.
    Choice,

    /// `Sig`.
    Signature,

    /// Anything else, including fields without their own `FT`.
    Other,
}

/// Snapshot of one AcroForm field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormFieldSnapshot {
    /// Fully qualified field name.
    pub name: String,

    /// Field kind.
    pub kind: FieldKind,

    /// Digest over the field's value.
    pub value_digest: u64,

    /// Digest over the field's structure apart from its value: flags,
    /// kids, widget placement.
    pub structure_digest: u64,

    /// Permission level asserted by a field lock attached to this field,
    /// for signature fields that carry one.
    pub lock: Option<AccessPermissions>,
}

impl Default for FormFieldSnapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: FieldKind::Other,
            value_digest: 0,
            structure_digest: 0,
            lock: None,
        }
    }
}

/// One entry of the catalog's `/Extensions` dictionary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeveloperExtension {
    /// `BaseVersion` name, e.g. `1.7`.
    pub base_version: String,

    /// `ExtensionLevel` number.
    pub extension_level: i32,
}

/// Snapshot of one incremental revision of the document.
///
/// The catalog map holds every catalog entry *except* the ones modeled by
/// dedicated fields (`/AcroForm`, `/DSS`, `/Perms`, `/Extensions`, and the
/// page tree); a change to any remaining entry is a catalog-level change.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RevisionSnapshot {
    /// Position of this revision in the document, starting at zero.
    pub revision_index: usize,

    /// Catalog entries not modeled elsewhere.
    pub catalog: BTreeMap<String, EntryValue>,

    /// Pages, in page-tree order.
    pub pages: Vec<PageSnapshot>,

    /// AcroForm fields, in field order.
    pub form_fields: Vec<FormFieldSnapshot>,

    /// Developer extensions by prefix name.
    pub extensions: BTreeMap<String, DeveloperExtension>,

    /// The catalog carries an `/AcroForm` entry.
    pub has_acroform: bool,

    /// The catalog carries a `/DSS` entry.
    pub has_dss: bool,

    /// The catalog's `/Perms` entries, when the catalog carries that
    /// dictionary at all.
    pub perms: Option<BTreeMap<String, EntryValue>>,

    /// Objects that appeared in this revision's cross-reference section
    /// without being referenced from its object graph.
    pub unreferenced_objects: Vec<ObjectId>,
}

/// What a signature claims to be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureKind {
    /// An ordinary approval signature.
    Approval,

    /// A certifying (DocMDP) signature limiting later changes.
    Certification(AccessPermissions),

    /// A document-level timestamp.
    DocumentTimestamp,
}

/// One signature or timestamp field, as produced by the revision reader.
#[derive(Clone, Debug)]
pub struct DocumentSignature {
    /// Name of the form field holding the signature.
    pub field_name: String,

    /// Kind of signature.
    pub kind: SignatureKind,

    /// Index of the revision this signature covers.
    pub signed_revision: usize,

    /// End offset of the signed byte range. Orders signatures and decides
    /// whether the whole document is covered.
    pub coverage_end: u64,

    /// Signing time claimed inside the signature dictionary.
    pub claimed_signing_time: Option<DateTime<Utc>>,

    /// Time asserted by an embedded timestamp token, when present.
    pub timestamp_time: Option<DateTime<Utc>>,

    /// Certificate chain embedded in the signature, leaf first.
    pub certificates: Vec<CertificateToken>,

    /// Certificate chain of the embedded timestamp token, leaf first.
    pub timestamp_certificates: Vec<CertificateToken>,

    /// Bytes the signature covers, when the reader kept them.
    pub signed_payload: Option<Vec<u8>>,

    /// Raw signature value.
    pub signature_value: Option<Vec<u8>>,
}

impl Default for DocumentSignature {
    fn default() -> Self {
        Self {
            field_name: String::new(),
            kind: SignatureKind::Approval,
            signed_revision: 0,
            coverage_end: 0,
            claimed_signing_time: None,
            timestamp_time: None,
            certificates: Vec::new(),
            timestamp_certificates: Vec::new(),
            signed_payload: None,
            signature_value: None,
        }
    }
}

impl DocumentSignature {
    /// The signing certificate: first in the embedded chain.
    pub fn signing_certificate(&self) -> Option<&CertificateToken> {
        self.certificates.first()
    }

    /// True for certification (DocMDP) signatures.
    pub fn is_certification(&self) -> bool {
        matches!(self.kind, SignatureKind::Certification(_))
    }

    /// True for document-level timestamps.
    pub fn is_timestamp(&self) -> bool {
        matches!(self.kind, SignatureKind::DocumentTimestamp)
    }
}

/// Document security store: revocation evidence and certificates embedded
/// in the document for later (long-term) validation.
///
/// Certificates stay raw here; ingestion parses them one by one so a
/// single malformed entry degrades only itself.
#[derive(Clone, Debug, Default)]
pub struct DocumentSecurityStore {
    /// DER-encoded certificates.
    pub certificates: Vec<Vec<u8>>,

    /// Embedded CRLs.
    pub crls: Vec<CrlToken>,

    /// Embedded OCSP responses.
    pub ocsp_responses: Vec<OcspResponseToken>,
}

impl DocumentSecurityStore {
    /// True if the store carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsp_responses.is_empty()
    }
}

/// A signed document, reduced to what trust evaluation needs.
#[derive(Clone, Debug, Default)]
pub struct SignedDocument {
    /// Incremental revisions, oldest first.
    pub revisions: Vec<RevisionSnapshot>,

    /// Signature and timestamp fields, in discovery order.
    pub signatures: Vec<DocumentSignature>,

    /// Document security store contents.
    pub dss: DocumentSecurityStore,

    /// Total length of the document in bytes.
    pub total_length: u64,
}

impl SignedDocument {
    /// Signatures ordered by how much of the document they cover,
    /// least-covering first. Ties keep discovery order.
    pub fn ordered_signatures(&self) -> Vec<&DocumentSignature> {
        let mut ordered: Vec<&DocumentSignature> = self.signatures.iter().collect();
        ordered.sort_by_key(|signature| signature.coverage_end);
        ordered
    }

    /// The most recent signature: the one covering the most bytes.
    pub fn latest_signature(&self) -> Option<&DocumentSignature> {
        self.ordered_signatures().pop()
    }

    /// Certification signatures, in discovery order.
    pub fn certification_signatures(&self) -> impl Iterator<Item = &DocumentSignature> {
        self.signatures
            .iter()
            .filter(|signature| signature.is_certification())
    }
}
