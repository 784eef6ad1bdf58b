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

use std::iter::Iterator;

use serde::{Deserialize, Serialize};

use crate::item::{ReportItem, ReportItemStatus};

/// Overall verdict derived from a [`ValidationReport`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ValidationResult {
    /// No item in the report is worse than `Info`.
    Valid,

    /// At least one item is `Indeterminate` and none is `Invalid`.
    Indeterminate,

    /// At least one item is `Invalid`.
    Invalid,
}

/// An ordered, append-only collection of [`ReportItem`]s produced by a
/// validation run.
///
/// Sub-validators run against a fresh child report; the caller merges the
/// child's items into its own report only when the sub-outcome is accepted.
/// This keeps exploratory failures of rejected evidence out of the final
/// audit trail. Merging never reorders items already appended to the parent.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationReport {
    items: Vec<ReportItem>,
}

impl ValidationReport {
    /// Returns an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the items logged so far, in insertion order.
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// Appends one item to this report.
    ///
    /// Primarily intended for use by [`ReportItem::info`],
    /// [`ReportItem::indeterminate`], and [`ReportItem::invalid`].
    pub fn add_item(&mut self, item: ReportItem) {
        log::trace!(
            "[{}] {}: {}",
            item.function,
            item.check_name,
            item.message
        );
        self.items.push(item);
    }

    /// Appends the contents of another report to this one, preserving the
    /// order of both.
    pub fn merge(&mut self, other: &ValidationReport) {
        for item in other.items() {
            self.items.push(item.clone());
        }
    }

    /// Derives the overall verdict from the items logged so far.
    ///
    /// An empty report is [`ValidationResult::Valid`].
    pub fn result(&self) -> ValidationResult {
        self.items
            .iter()
            .map(|item| match item.status {
                ReportItemStatus::Info => ValidationResult::Valid,
                ReportItemStatus::Indeterminate => ValidationResult::Indeterminate,
                ReportItemStatus::Invalid => ValidationResult::Invalid,
            })
            .max()
            .unwrap_or(ValidationResult::Valid)
    }

    /// Returns the items with status `Indeterminate` or `Invalid`, in
    /// insertion order.
    pub fn failures(&self) -> impl Iterator<Item = &ReportItem> {
        self.items
            .iter()
            .filter(|item| item.status != ReportItemStatus::Info)
    }

    /// Returns the number of failure items logged so far.
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Returns `true` if any item has status `Indeterminate` or `Invalid`.
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Returns `true` if the report contains an item with the given message.
    ///
    /// Parameterized messages match on their static prefix.
    pub fn has_message(&self, message: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.message.starts_with(message))
    }
}
