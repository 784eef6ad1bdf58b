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

use std::{borrow::Cow, fmt::Debug};

use serde::{Deserialize, Serialize};

use crate::report::ValidationReport;

/// Severity of a [`ReportItem`].
///
/// Statuses are ordered from least to most severe; the overall
/// [`ValidationResult`](crate::ValidationResult) of a report is derived from
/// the most severe status present.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ReportItemStatus {
    /// Audit-trail note. Does not affect the overall verdict.
    Info,

    /// Inconclusive outcome: missing data, ambiguous trust, or unverifiable
    /// evidence.
    Indeterminate,

    /// Definite failure: expired, revoked, or tampered.
    Invalid,
}

/// One entry in a [`ValidationReport`].
///
/// Use the [`report_item`](crate::report_item) macro to create a `ReportItem`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReportItem {
    /// Severity of this item.
    pub status: ReportItemStatus,

    /// Name of the check that produced this item.
    pub check_name: Cow<'static, str>,

    /// Human-readable outcome of the check.
    pub message: Cow<'static, str>,

    /// Source file where the condition was detected.
    pub file: Cow<'static, str>,

    /// Function where the condition was detected.
    pub function: Cow<'static, str>,

    /// Source line number where the condition was detected.
    pub line: u32,

    /// Underlying error, formatted, if the condition was caused by one.
    pub cause: Option<Cow<'static, str>>,

    /// Subject of the certificate this item concerns, if any.
    pub certificate: Option<Cow<'static, str>>,

    /// Validation context active when this item was produced, formatted.
    pub context: Option<Cow<'static, str>>,
}

impl ReportItem {
    /// Captures the underlying error (typically an `Error` enum) as the cause
    /// of this item.
    ///
    /// IMPORTANT: This is implemented using the [`Debug`](std::fmt::Debug)
    /// trait, which the `Error` enum from any crate is likely to fulfill.
    ///
    /// ## Example
    ///
    /// ```
    /// # use docsig_report::report_item;
    /// let item = report_item!("sample check", "sample message", "test func")
    ///     .with_cause("sample error");
    ///
    /// assert_eq!(item.cause.as_deref(), Some("\"sample error\""));
    /// ```
    pub fn with_cause<E: Debug>(self, err: E) -> Self {
        ReportItem {
            cause: Some(format!("{err:?}").into()),
            ..self
        }
    }

    /// Tags this item with the subject of the certificate it concerns.
    ///
    /// ## Example
    ///
    /// ```
    /// # use docsig_report::report_item;
    /// let item = report_item!("sample check", "sample message", "test func")
    ///     .for_certificate("CN=Example Root");
    ///
    /// assert_eq!(item.certificate.as_deref(), Some("CN=Example Root"));
    /// ```
    pub fn for_certificate(self, subject: impl Into<Cow<'static, str>>) -> Self {
        ReportItem {
            certificate: Some(subject.into()),
            ..self
        }
    }

    /// Annotates this item with the validation context it was produced under.
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        ReportItem {
            context: Some(context.to_string().into()),
            ..self
        }
    }

    /// Appends this item to `report` with status [`ReportItemStatus::Info`].
    pub fn info(self, report: &mut ValidationReport) {
        report.add_item(ReportItem {
            status: ReportItemStatus::Info,
            ..self
        });
    }

    /// Appends this item to `report` with status
    /// [`ReportItemStatus::Indeterminate`].
    pub fn indeterminate(self, report: &mut ValidationReport) {
        report.add_item(ReportItem {
            status: ReportItemStatus::Indeterminate,
            ..self
        });
    }

    /// Appends this item to `report` with status
    /// [`ReportItemStatus::Invalid`].
    pub fn invalid(self, report: &mut ValidationReport) {
        report.add_item(ReportItem {
            status: ReportItemStatus::Invalid,
            ..self
        });
    }
}

/// Creates a [`ReportItem`] struct that is annotated with the source file and
/// line number where the reported condition was discovered.
///
/// Takes three parameters, each of which may be a `'static str` or `String`:
///
/// * `check_name`: name of the check that produced this item
/// * `message`: human-readable outcome of the check
/// * `function`: name of the function generating this item
///
/// The item is created with status [`ReportItemStatus::Info`]; appending it to
/// a report through [`ReportItem::info`], [`ReportItem::indeterminate`], or
/// [`ReportItem::invalid`] assigns the final status.
///
/// ## Example
///
/// ```
/// # use std::borrow::Cow;
/// # use docsig_report::{report_item, ReportItem, ReportItemStatus};
/// let item = report_item!("sample check", "sample message", "test func");
///
/// assert_eq!(
///     item,
///     ReportItem {
///         status: ReportItemStatus::Info,
///         check_name: Cow::Borrowed("sample check"),
///         message: Cow::Borrowed("sample message"),
///         file: Cow::Borrowed(file!()),
///         function: Cow::Borrowed("test func"),
///         line: item.line,
///         cause: None,
///         certificate: None,
///         context: None,
///     }
/// );
/// ```
#[macro_export]
macro_rules! report_item {
    ($check_name:expr, $message:expr, $function:expr) => {{
        $crate::ReportItem {
            status: $crate::ReportItemStatus::Info,
            check_name: $check_name.into(),
            message: $message.into(),
            file: file!().into(),
            function: $function.into(),
            line: line!(),
            cause: None,
            certificate: None,
            context: None,
        }
    }};
}
