// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for sketch operations

use std::fmt;

/// ErrorKind is all kinds of Error of this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A parameter passed to a sketch operation is invalid.
    InvalidArgument,
    /// A serialized sketch image is malformed or unsupported.
    InvalidData,
    /// A direct sketch's backing region is too small for the operation.
    CapacityExceeded,
    /// The operation is not valid in the sketch's current state.
    IllegalState,
}

impl ErrorKind {
    /// Convert this error kind instance into static str.
    pub const fn into_static(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidData => "InvalidData",
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::IllegalState => "IllegalState",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error is the error struct returned by all fallible sketch functions.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::default(),
            source: None,
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Panics
    ///
    /// Panics if the source has been set.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(src.into());
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// An invalid call parameter (k out of range, bad quantile fraction, ...).
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// A serialized image ended before the named field.
    pub fn insufficient_data(field: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, "image truncated")
            .with_context("field", field.into())
    }

    /// A serialized image declared the wrong family id.
    pub fn invalid_family(expected: u8, actual: u8, name: &'static str) -> Self {
        Self::new(ErrorKind::InvalidData, "family id mismatch")
            .with_context("family", name)
            .with_context("expected", expected)
            .with_context("actual", actual)
    }

    /// A serialized image declared an unsupported serial version.
    pub fn unsupported_serial_version(expected: u8, actual: u8) -> Self {
        Self::new(ErrorKind::InvalidData, "unsupported serial version")
            .with_context("expected", expected)
            .with_context("actual", actual)
    }

    /// A serialized image is internally inconsistent.
    pub fn deserial(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, message)
    }

    /// The backing region cannot hold the requested state.
    pub fn capacity(required: usize, actual: usize) -> Self {
        Self::new(ErrorKind::CapacityExceeded, "region too small")
            .with_context("required_bytes", required)
            .with_context("actual_bytes", actual)
    }

    /// The operation is not permitted in the current state.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState, message)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_preserved() {
        let err = Error::capacity(128, 64);
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

        let err = Error::invalid_argument("k must be a power of two");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), "k must be a power of two");
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::invalid_family(8, 3, "Quantiles");
        let rendered = format!("{err}");
        assert!(rendered.contains("InvalidData"));
        assert!(rendered.contains("Quantiles"));
    }

    #[test]
    fn test_source_round_trip() {
        use std::error::Error as _;

        let err = Error::deserial("failed to parse image")
            .set_source(std::io::Error::new(std::io::ErrorKind::Other, "IO error"));
        assert!(err.source().is_some());
    }
}
