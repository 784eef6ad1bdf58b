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

//! Validation of incremental document revisions against certification
//! constraints.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

use docsig_report::{report_item, ReportItemStatus, ValidationReport, ValidationResult};

use crate::{
    context::{CertificateSource, Moment, ValidationContext, ValidatorRole},
    document::{
        AccessPermissions, AnnotationSnapshot, FieldKind, FormFieldSnapshot, ObjectId,
        PageSnapshot, RevisionSnapshot, SignatureKind, SignedDocument,
    },
    properties::SignatureValidationProperties,
};

/// Check name for all revision items.
pub const DOCUMENT_REVISIONS_CHECK: &str = "document revisions check";

const TOO_MANY_CERTIFICATIONS: &str =
    "too many certification signatures: the document carries more than one.";
const SIGNATURE_REVISION_NOT_FOUND: &str = "signature revision not found.";
const PAGES_RESTRUCTURED: &str = "page modified: pages were added, removed, or reordered.";
const ACROFORM_CHANGES: &str =
    "not allowed acroform changes: the form was modified beyond the permitted level.";
const DSS_REMOVED: &str = "DSS was removed from the catalog.";
const PERMS_REMOVED: &str = "Perms dictionary was removed from the catalog.";
const ACROFORM_REMOVED: &str = "AcroForm was removed from the catalog.";

/// Walks the incremental revisions of a signed document and checks every
/// transition against the permission level consumed so far.
///
/// The level starts at the most permissive certification signature the
/// document carries ([`AccessPermissions::Unrestricted`] without one) and only
/// ever tightens: a field lock consumed along the way lowers it for the
/// transitions that follow. The derived level stays queryable through
/// [`access_permissions`](Self::access_permissions) after a run.
///
/// Revisions before the first signed one are unconstrained; the walk starts
/// at the earliest revision any signature covers.
pub struct DocumentRevisionsValidator {
    properties: Arc<SignatureValidationProperties>,
    unreferenced_entry_status: ReportItemStatus,
    access_permissions: Mutex<AccessPermissions>,
}

impl DocumentRevisionsValidator {
    /// Creates a validator with the default reporting configuration.
    pub fn new(properties: Arc<SignatureValidationProperties>) -> Self {
        Self {
            properties,
            unreferenced_entry_status: ReportItemStatus::Info,
            access_permissions: Mutex::new(AccessPermissions::Unrestricted),
        }
    }

    /// Sets the status reported for cross-reference entries that appear in a
    /// revision without being referenced from its object graph.
    ///
    /// Such entries are harmless dead weight and report as
    /// [`ReportItemStatus::Info`] by default; strict deployments can escalate
    /// them.
    pub fn set_unreferenced_entry_status(&mut self, status: ReportItemStatus) {
        self.unreferenced_entry_status = status;
    }

    /// The permission level the last run derived.
    pub fn access_permissions(&self) -> AccessPermissions {
        *self.permissions_guard()
    }

    /// Validates every revision transition of `document` from the first
    /// signed revision onwards and derives the document's current permission
    /// level.
    pub fn validate_all_document_revisions(
        &self,
        report: &mut ValidationReport,
        document: &SignedDocument,
    ) {
        let context = ValidationContext::new(
            ValidatorRole::DocumentRevisions,
            CertificateSource::SignerCert,
            Moment::Present,
        );

        let certification_levels: Vec<AccessPermissions> = document
            .certification_signatures()
            .filter_map(|signature| match signature.kind {
                SignatureKind::Certification(level) => Some(level),
                _ => None,
            })
            .collect();

        if certification_levels.len() > 1 {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                TOO_MANY_CERTIFICATIONS,
                "DocumentRevisionsValidator::validate_all_document_revisions"
            )
            .with_context(context)
            .indeterminate(report);
        }

        *self.permissions_guard() = certification_levels
            .into_iter()
            .max()
            .unwrap_or(AccessPermissions::Unrestricted);

        let Some(first_signed) = document
            .signatures
            .iter()
            .map(|signature| signature.signed_revision)
            .min()
        else {
            log::debug!("document carries no signatures; revisions are unconstrained");
            return;
        };

        if document
            .signatures
            .iter()
            .any(|signature| signature.signed_revision >= document.revisions.len())
        {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                SIGNATURE_REVISION_NOT_FOUND,
                "DocumentRevisionsValidator::validate_all_document_revisions"
            )
            .with_context(context)
            .invalid(report);

            return;
        }

        log::debug!(
            "validating revision transitions from revision {first_signed} of {}",
            document.revisions.len()
        );

        for window in document.revisions[first_signed..].windows(2) {
            self.validate_revision(report, context, document, &window[0], &window[1]);

            if self.should_stop(report, &context) {
                log::debug!("stopping the revision walk after a failure");
                return;
            }
        }
    }

    /// Classifies the changes between two consecutive revisions against the
    /// current permission level.
    pub fn validate_revision(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        document: &SignedDocument,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        let permissions = self.access_permissions();

        self.check_catalog(report, context, prev, next);
        self.check_pages(report, context, permissions, prev, next);
        self.check_acroform(report, context, permissions, document, prev, next);
        self.check_extensions(report, context, prev, next);
        self.check_perms(report, context, prev, next);
        self.check_unreferenced(report, context, next);
    }

    fn permissions_guard(&self) -> MutexGuard<'_, AccessPermissions> {
        match self.access_permissions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn should_stop(&self, report: &ValidationReport, context: &ValidationContext) -> bool {
        report.result() != ValidationResult::Valid
            && !self.properties.continue_after_failure(context)
    }

    fn check_catalog(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        let keys: BTreeSet<&String> = prev.catalog.keys().chain(next.catalog.keys()).collect();
        let changed: Vec<&str> = keys
            .into_iter()
            .filter(|key| prev.catalog.get(*key) != next.catalog.get(*key))
            .map(|key| key.as_str())
            .collect();

        if !changed.is_empty() {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                format!("not allowed catalog changes: {}.", changed.join(", ")),
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);
        }

        if prev.has_dss && !next.has_dss {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                DSS_REMOVED,
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);
        }

        if prev.perms.is_some() && next.perms.is_none() {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                PERMS_REMOVED,
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);
        }

        if prev.has_acroform && !next.has_acroform {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                ACROFORM_REMOVED,
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);
        }
    }

    fn check_pages(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        permissions: AccessPermissions,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        let same_tree = prev.pages.len() == next.pages.len()
            && prev
                .pages
                .iter()
                .zip(&next.pages)
                .all(|(previous_page, page)| previous_page.id == page.id);

        if !same_tree {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                PAGES_RESTRUCTURED,
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);

            return;
        }

        for (previous_page, page) in prev.pages.iter().zip(&next.pages) {
            if permissions == AccessPermissions::NoChangesPermitted
                && (previous_page.content_digest != page.content_digest
                    || previous_page.resources_digest != page.resources_digest)
            {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!(
                        "page modified: content of page {} changed under a no-changes certification.",
                        page.id
                    ),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }

            self.check_annotations(report, context, permissions, previous_page, page);
        }
    }

    fn check_annotations(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        permissions: AccessPermissions,
        prev: &PageSnapshot,
        next: &PageSnapshot,
    ) {
        let previous: BTreeMap<ObjectId, &AnnotationSnapshot> = prev
            .annotations
            .iter()
            .map(|annotation| (annotation.id, annotation))
            .collect();
        let current: BTreeMap<ObjectId, &AnnotationSnapshot> = next
            .annotations
            .iter()
            .map(|annotation| (annotation.id, annotation))
            .collect();

        for (id, annotation) in &current {
            match previous.get(id) {
                None => {
                    if !annotation_addition_allowed(annotation, permissions) {
                        report_item!(
                            DOCUMENT_REVISIONS_CHECK,
                            format!(
                                "page annotations modified: annotation {id} was added beyond the {permissions} level."
                            ),
                            "DocumentRevisionsValidator::validate_revision"
                        )
                        .with_context(context)
                        .invalid(report);
                    }
                }
                Some(before)
                    if before.digest != annotation.digest
                        || before.subtype != annotation.subtype =>
                {
                    if !annotation_change_allowed(annotation, permissions) {
                        report_item!(
                            DOCUMENT_REVISIONS_CHECK,
                            format!(
                                "page annotations modified: annotation {id} was changed beyond the {permissions} level."
                            ),
                            "DocumentRevisionsValidator::validate_revision"
                        )
                        .with_context(context)
                        .invalid(report);
                    }
                }
                Some(_) => {}
            }
        }

        for id in previous.keys() {
            if !current.contains_key(id) && !annotation_removal_allowed(permissions) {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!(
                        "page annotations modified: annotation {id} was removed beyond the {permissions} level."
                    ),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }
        }
    }

    fn check_acroform(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        permissions: AccessPermissions,
        document: &SignedDocument,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        // Wholesale removal was already reported as a single catalog item;
        // diffing the now-empty field list would only repeat it per field.
        if prev.has_acroform && !next.has_acroform {
            return;
        }

        let previous: BTreeMap<&str, &FormFieldSnapshot> = prev
            .form_fields
            .iter()
            .map(|field| (field.name.as_str(), field))
            .collect();
        let current: BTreeMap<&str, &FormFieldSnapshot> = next
            .form_fields
            .iter()
            .map(|field| (field.name.as_str(), field))
            .collect();

        for name in previous.keys() {
            if !current.contains_key(*name) {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!("field removed: {name}."),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }
        }

        let mut blanket = false;

        for (name, field) in &current {
            match previous.get(name) {
                None => {
                    self.check_added_field(
                        report,
                        context,
                        permissions,
                        document,
                        field,
                        &mut blanket,
                    );
                }
                Some(before) => {
                    if !is_timestamp_field(document, name) {
                        if before.value_digest != field.value_digest
                            && permissions == AccessPermissions::NoChangesPermitted
                        {
                            blanket = true;
                        }

                        if before.structure_digest != field.structure_digest
                            && permissions != AccessPermissions::Unrestricted
                        {
                            blanket = true;
                        }
                    }

                    self.check_lock_transition(report, context, name, before.lock, field.lock);
                }
            }
        }

        if blanket {
            report_item!(
                DOCUMENT_REVISIONS_CHECK,
                ACROFORM_CHANGES,
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context)
            .invalid(report);
        }
    }

    fn check_added_field(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        permissions: AccessPermissions,
        document: &SignedDocument,
        field: &FormFieldSnapshot,
        blanket: &mut bool,
    ) {
        if let Some(level) = field.lock {
            self.consume_lock(report, context, &field.name, level);
        }

        // Document-timestamp fields append without changing content and pass
        // at every level.
        if is_timestamp_field(document, &field.name) {
            return;
        }

        match permissions {
            AccessPermissions::NoChangesPermitted => *blanket = true,
            AccessPermissions::FormFieldsModification
            | AccessPermissions::AnnotationModification => {
                if field.kind != FieldKind::Signature {
                    report_item!(
                        DOCUMENT_REVISIONS_CHECK,
                        format!("unexpected form field {}.", field.name),
                        "DocumentRevisionsValidator::validate_revision"
                    )
                    .with_context(context)
                    .invalid(report);
                }
            }
            AccessPermissions::Unrestricted => {}
        }
    }

    fn check_lock_transition(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        name: &str,
        before: Option<AccessPermissions>,
        after: Option<AccessPermissions>,
    ) {
        match (before, after) {
            (None, Some(level)) => self.consume_lock(report, context, name, level),
            (Some(old), Some(new)) if new < old => self.consume_lock(report, context, name, new),
            (Some(old), Some(new)) if new > old => self.lock_loosened(report, context, name),
            (Some(_), None) => self.lock_loosened(report, context, name),
            _ => {}
        }
    }

    /// A newly requested field lock counts from the next transition on.
    fn consume_lock(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        name: &str,
        level: AccessPermissions,
    ) {
        report_item!(
            DOCUMENT_REVISIONS_CHECK,
            format!("access permissions added: field {name} asks for the {level} level."),
            "DocumentRevisionsValidator::validate_revision"
        )
        .with_context(context)
        .indeterminate(report);

        let mut guard = self.permissions_guard();
        *guard = (*guard).min(level);
    }

    fn lock_loosened(&self, report: &mut ValidationReport, context: ValidationContext, name: &str) {
        report_item!(
            DOCUMENT_REVISIONS_CHECK,
            format!("access permissions removed: the lock on field {name} was loosened."),
            "DocumentRevisionsValidator::validate_revision"
        )
        .with_context(context)
        .invalid(report);
    }

    fn check_extensions(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        for (prefix, extension) in &prev.extensions {
            let Some(current) = next.extensions.get(prefix) else {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!("developer extension {prefix} was removed."),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);

                continue;
            };

            // Version names compare lexically, which holds for the
            // major.minor names in use.
            if current.base_version.as_str() < extension.base_version.as_str() {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!("developer extension {prefix} base version decreased."),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }

            if current.extension_level < extension.extension_level {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!("developer extension {prefix} extension level decreased."),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }
        }
    }

    fn check_perms(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        prev: &RevisionSnapshot,
        next: &RevisionSnapshot,
    ) {
        // Wholesale removal is reported with the catalog checks; additions
        // are requests for new scopes and pass here.
        let (Some(previous), Some(current)) = (&prev.perms, &next.perms) else {
            return;
        };

        for (name, value) in previous {
            if current.get(name) != Some(value) {
                report_item!(
                    DOCUMENT_REVISIONS_CHECK,
                    format!("Perms entry {name} was removed or modified."),
                    "DocumentRevisionsValidator::validate_revision"
                )
                .with_context(context)
                .invalid(report);
            }
        }
    }

    fn check_unreferenced(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        next: &RevisionSnapshot,
    ) {
        for id in &next.unreferenced_objects {
            let item = report_item!(
                DOCUMENT_REVISIONS_CHECK,
                format!("unreferenced object {id} appeared in the cross-reference table."),
                "DocumentRevisionsValidator::validate_revision"
            )
            .with_context(context);

            match self.unreferenced_entry_status {
                ReportItemStatus::Info => item.info(report),
                ReportItemStatus::Indeterminate => item.indeterminate(report),
                ReportItemStatus::Invalid => item.invalid(report),
            }
        }
    }
}

fn is_timestamp_field(document: &SignedDocument, name: &str) -> bool {
    document
        .signatures
        .iter()
        .any(|signature| signature.is_timestamp() && signature.field_name == name)
}

fn annotation_addition_allowed(
    annotation: &AnnotationSnapshot,
    permissions: AccessPermissions,
) -> bool {
    if annotation.is_timestamp_widget {
        return true;
    }

    match permissions {
        AccessPermissions::NoChangesPermitted => false,
        AccessPermissions::FormFieldsModification => annotation.is_signature_widget,
        AccessPermissions::AnnotationModification | AccessPermissions::Unrestricted => true,
    }
}

fn annotation_change_allowed(
    annotation: &AnnotationSnapshot,
    permissions: AccessPermissions,
) -> bool {
    match permissions {
        AccessPermissions::NoChangesPermitted => annotation.is_timestamp_widget,
        AccessPermissions::FormFieldsModification => {
            annotation.is_signature_widget || annotation.is_timestamp_widget
        }
        AccessPermissions::AnnotationModification | AccessPermissions::Unrestricted => true,
    }
}

fn annotation_removal_allowed(permissions: AccessPermissions) -> bool {
    matches!(
        permissions,
        AccessPermissions::AnnotationModification | AccessPermissions::Unrestricted
    )
}
