//! Long-format expansion of a nested array: one row per element, each row
//! carrying the flattened fields of the document that owns the array.

use std::iter::Enumerate;
use std::slice::Iter;

use crate::flatten::{FlattenOptions, VALUE_KEY, flatten};
use crate::model::{CellValue, Datum, FlatRecord, unused_key};

/// Column holding the 1-based position of the element inside its array.
pub const ITEM_NUMBER_COLUMN: &str = "item_number";

/// What a dotted path resolves to inside a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemsAt<'a> {
    /// Nothing stored at the path (or an explicit null).
    Missing,
    /// A value that is not an array.
    NotArray(&'a Datum),
    /// The array to expand.
    Array(&'a [Datum]),
}

/// Looks up the array stored at `path`.
pub fn resolve_items<'a>(document: &'a Datum, path: &str) -> ItemsAt<'a> {
    match document.get_path(path) {
        None | Some(Datum::Null) => ItemsAt::Missing,
        Some(Datum::Array(items)) => ItemsAt::Array(items),
        Some(other) => ItemsAt::NotArray(other),
    }
}

/// Expands the array at `path` into one flat row per element, in array order.
///
/// Documents without an array at `path` yield no rows; their fields still
/// reach the main and normalized sheets. Non-object elements are flattened as
/// `{"value": element}`. On key collisions the parent's value is kept. The
/// element number goes under [`ITEM_NUMBER_COLUMN`], or under that name with
/// leading underscores when the row already has such a field.
pub fn expand<'a>(document: &'a Datum, path: &str, options: &'a FlattenOptions) -> Expansion<'a> {
    let items: &'a [Datum] = match resolve_items(document, path) {
        ItemsAt::Array(items) => items,
        ItemsAt::Missing | ItemsAt::NotArray(_) => &[],
    };

    let parent = if items.is_empty() {
        FlatRecord::new()
    } else {
        let mut parent = document.clone();
        parent.remove_path(path);
        flatten(&parent, "", options)
    };

    Expansion {
        parent,
        items: items.iter().enumerate(),
        options,
    }
}

/// Lazy, single-pass iterator returned by [`expand`].
#[derive(Debug)]
pub struct Expansion<'a> {
    parent: FlatRecord,
    items: Enumerate<Iter<'a, Datum>>,
    options: &'a FlattenOptions,
}

impl Iterator for Expansion<'_> {
    type Item = FlatRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, item) = self.items.next()?;

        let mut row = match item {
            Datum::Object(_) => flatten(item, "", self.options),
            other => flatten(other, VALUE_KEY, self.options),
        };
        row.extend(
            self.parent
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        let column = unused_key(&row, ITEM_NUMBER_COLUMN);
        row.insert(column, CellValue::from(index + 1));
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for Expansion<'_> {}
