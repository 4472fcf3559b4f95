/// A row of a [`Table`](super::Table). A simple index into the table's entity and column vecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRow(u32);

impl TableRow {
    /// The row of an entity that has no table storage yet.
    pub const INVALID: TableRow = TableRow(u32::MAX);

    /// Construct a table row from an index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index used in the storage vecs.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for TableRow {
    #[inline]
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}
