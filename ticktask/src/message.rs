//! Fixed-capacity byte messages passed through queues by value.

use heapless::Vec;

use crate::Error;

/// Default payload capacity of a [`Message`] in bytes.
pub const MESSAGE_CAPACITY: usize = 25;

/// A bounded byte payload. Construction fails instead of truncating.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message<const N: usize = MESSAGE_CAPACITY> {
    payload: Vec<u8, N>,
}

impl<const N: usize> Message<N> {
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        let payload = Vec::from_slice(bytes).or(Err(Error::MessageTooLong))?;
        Ok(Self { payload })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> TryFrom<&[u8]> for Message<N> {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Error> {
        Self::new(bytes)
    }
}

impl<const N: usize> TryFrom<&str> for Message<N> {
    type Error = Error;

    fn try_from(text: &str) -> Result<Self, Error> {
        Self::new(text.as_bytes())
    }
}

impl<const N: usize> AsRef<[u8]> for Message<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
