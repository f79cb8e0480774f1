//! Pending write batch and its read overlay.

/// A single recorded mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// What a pending batch says about one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlay<'a> {
    /// The batch never touched the key; consult the durable store.
    Untouched,
    /// The last operation on the key was a delete.
    Deleted,
    /// The last operation on the key was a put of this value.
    Value(&'a [u8]),
}

/// Ordered log of puts and deletes, applied atomically on commit.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }

    /// Resolve `key` against the recorded operations.
    ///
    /// The newest operation on the key wins. This is a linear scan over the
    /// log; batches cover one logical unit of work and stay small.
    pub fn lookup(&self, key: &[u8]) -> Overlay<'_> {
        match self.ops.iter().rev().find(|op| op.key() == key) {
            Some(BatchOp::Put { value, .. }) => Overlay::Value(value),
            Some(BatchOp::Delete { .. }) => Overlay::Deleted,
            None => Overlay::Untouched,
        }
    }
}
