use serde::Serialize;

use crate::error::ModelError;

/// A visible table row and the entry it shows.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RowBinding {
    pub row: usize,
    /// Index into the full entry list, stable for the page lifetime.
    pub index: usize,
    pub id: u64,
}

/// Fixed-size window over the filtered list.
///
/// Rows past the end of the list are bound to nothing (hidden), never removed.
#[derive(Debug, Clone)]
pub struct Pager {
    rows: usize,
    page: usize,
    bindings: Vec<Option<usize>>,
}

impl Pager {
    pub fn new(rows: usize) -> Self {
        let rows = rows.max(1);
        Self {
            rows,
            page: 0,
            bindings: vec![None; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn offset(&self) -> usize {
        self.page * self.rows
    }

    pub fn page_count(&self, filtered_len: usize) -> usize {
        filtered_len.div_ceil(self.rows)
    }

    /// Back to the first page.
    pub fn reset(&mut self, filtered: &[usize]) {
        self.page = 0;
        self.rebind(filtered);
    }

    pub fn set_page(&mut self, page: usize, filtered: &[usize]) -> Result<(), ModelError> {
        let pages = self.page_count(filtered.len());
        if page >= pages.max(1) {
            return Err(ModelError::PageOutOfRange { page, pages });
        }
        self.page = page;
        self.rebind(filtered);
        Ok(())
    }

    pub fn rebind(&mut self, filtered: &[usize]) {
        let offset = self.offset();
        for (row, slot) in self.bindings.iter_mut().enumerate() {
            *slot = filtered.get(offset + row).copied();
        }
    }

    /// Entry index shown in `row`, if the row is visible.
    pub fn bound(&self, row: usize) -> Option<usize> {
        self.bindings.get(row).copied().flatten()
    }

    pub fn bindings(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(row, b)| b.map(|index| (row, index)))
    }
}
