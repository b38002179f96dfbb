//! File names

use core::{convert::TryFrom, fmt, str};

use crate::{consts::NAME_MAX, io::Error};

/// A file name
///
/// Names are non-empty ASCII strings with at most [`Name::MAX_SIZE`][] bytes and no nul byte.
/// There are no directories, so `/` is an ordinary character.
// Invariants:
// 1. buf[..len].is_ascii() and contains no 0
// 2. 0 < len <= NAME_MAX
// 3. buf[len..] is zeroed
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name {
    buf: [u8; NAME_MAX],
    len: u8,
}

impl Name {
    pub const MAX_SIZE: usize = NAME_MAX;

    /// Creates a name from a string.
    ///
    /// ```
    /// # use pagefs_core::{Name, NameError};
    /// assert!(Name::from_str("a.bin").is_ok());
    /// assert_eq!(Name::from_str(""), Err(NameError::Empty));
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub const fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }

    pub const fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(NameError::Empty);
        }
        if bytes.len() > NAME_MAX {
            return Err(NameError::TooLarge);
        }
        let mut buf = [0; NAME_MAX];
        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            if byte == 0 {
                return Err(NameError::NotCStr);
            }
            if !byte.is_ascii() {
                return Err(NameError::NotAscii);
            }
            buf[i] = byte;
            i += 1;
        }
        Ok(Self {
            buf,
            len: bytes.len() as u8,
        })
    }

    /// Parses a nul-padded field as stored on flash.
    pub fn from_nul_padded(field: &[u8]) -> Result<Self> {
        let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
        Self::from_bytes(&field[..len])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        // ASCII by construction
        str::from_utf8(self.as_bytes()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl TryFrom<&[u8]> for Name {
    type Error = NameError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl TryFrom<&str> for Name {
    type Error = NameError;

    fn try_from(s: &str) -> Result<Self> {
        Self::from_str(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.as_bytes())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValueVisitor;

        impl serde::de::Visitor<'_> for ValueVisitor {
            type Value = Name;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a file name")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> core::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.len() > Name::MAX_SIZE {
                    return Err(E::invalid_length(v.len(), &self));
                }
                Name::from_bytes(v).map_err(|_| E::custom("invalid file name"))
            }
        }

        deserializer.deserialize_bytes(ValueVisitor)
    }
}

/// Errors that arise from converting byte buffers into names
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// Names cannot be empty
    Empty,
    /// Byte buffer contains non-ASCII characters
    NotAscii,
    /// Byte buffer contains a nul byte
    NotCStr,
    /// Byte buffer is longer than [`Name::MAX_SIZE`][]
    TooLarge,
}

impl From<NameError> for Error {
    fn from(error: NameError) -> Self {
        match error {
            NameError::TooLarge => Error::FILENAME_TOO_LONG,
            NameError::Empty | NameError::NotAscii | NameError::NotCStr => Error::INVALID,
        }
    }
}

type Result<T> = core::result::Result<T, NameError>;
