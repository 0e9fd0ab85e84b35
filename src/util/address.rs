use std::fmt;
use std::num::NonZeroUsize;

/// The word size in bytes.
pub const BYTES_IN_WORD: usize = std::mem::size_of::<usize>();

/// `ObjectReference` is an opaque reference to a heap object.
///
/// The marking engine never looks inside an object. It only hands references to the binding
/// (to scan fields, to find the containing region, to query and set mark bits) and stores them
/// in task queues and SATB buffers. No address arithmetic is allowed on it.
///
/// An `ObjectReference` is never null. A nullable reference is `Option<ObjectReference>`, which
/// has the same size as a word thanks to the `NonZeroUsize` niche.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct ObjectReference(NonZeroUsize);

impl ObjectReference {
    /// The required minimal alignment for object reference.
    pub const ALIGNMENT: usize = BYTES_IN_WORD;

    /// Create an `ObjectReference` from its raw word. Return `None` if `raw` is zero.
    ///
    /// This is how a binding creates `ObjectReference` instances.
    pub fn from_raw(raw: usize) -> Option<ObjectReference> {
        debug_assert!(
            raw % Self::ALIGNMENT == 0,
            "ObjectReference is required to be word aligned.  raw: {:#x}",
            raw
        );
        NonZeroUsize::new(raw).map(ObjectReference)
    }

    /// Create an `ObjectReference` from a raw word that is known to be non-zero.
    ///
    /// # Safety
    /// `raw` must not be zero.
    pub const unsafe fn from_raw_unchecked(raw: usize) -> ObjectReference {
        ObjectReference(NonZeroUsize::new_unchecked(raw))
    }

    /// Get the raw word of this reference.
    pub const fn to_raw(self) -> usize {
        self.0.get()
    }
}

static_assertions::assert_eq_size!(Option<ObjectReference>, usize);

/// allows print ObjectReference as upper-case hex value
impl fmt::UpperHex for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:X}", self.0.get())
    }
}

/// allows print ObjectReference as lower-case hex value
impl fmt::LowerHex for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0.get())
    }
}

/// allows Display format the ObjectReference (as hex value with 0x prefix)
impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// allows Debug format the ObjectReference (as hex value with 0x prefix)
impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_an_object() {
        assert!(ObjectReference::from_raw(0).is_none());
    }

    #[test]
    fn raw_word_is_preserved() {
        let o = ObjectReference::from_raw(0x1000).unwrap();
        assert_eq!(o.to_raw(), 0x1000);
        assert_eq!(format!("{}", o), "0x1000");
        assert_eq!(format!("{:?}", o), "0x1000");
    }
}
