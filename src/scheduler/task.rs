use crate::util::ObjectReference;

/// A range of elements `from..to` of a reference array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArrayChunk {
    pub from: usize,
    pub to: usize,
}

impl ArrayChunk {
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }
}

/// A unit of marking work: an object whose fields have not been scanned yet, or a chunk of a
/// large reference array whose elements have not been scanned yet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkTask {
    object: ObjectReference,
    chunk: Option<ArrayChunk>,
}

impl MarkTask {
    pub fn new(object: ObjectReference) -> Self {
        MarkTask {
            object,
            chunk: None,
        }
    }

    pub fn array_chunk(object: ObjectReference, from: usize, to: usize) -> Self {
        debug_assert!(from < to, "empty array chunk {}..{}", from, to);
        MarkTask {
            object,
            chunk: Some(ArrayChunk { from, to }),
        }
    }

    pub fn object(&self) -> ObjectReference {
        self.object
    }

    pub fn chunk(&self) -> Option<ArrayChunk> {
        self.chunk
    }
}
