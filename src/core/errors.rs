//! Error types for the DWARF decoding core

use crate::core::constants::DwForm;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum DwarfError {
    /// The byte stream violates the DWARF standard or a constraint the
    /// decoder needs to make progress (bad version, bounds overrun,
    /// unknown opcode, inconsistent header field).
    #[error("malformed DWARF data: {0}")]
    Format(String),

    /// A typed projection was requested for a form that does not encode it,
    /// e.g. `as_address` on `DW_FORM_data4`.
    #[error("cannot read {form} as {expected}")]
    ValueTypeMismatch {
        /// The form actually stored in the value.
        form: DwForm,
        /// The projection the caller asked for.
        expected: &'static str,
    },

    /// Vendor-reserved opcodes the decoder knows how to recognize but not
    /// execute. Distinct from `Format` so callers may tolerate them.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl DwarfError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DwarfError::Format(msg.into())
    }

    pub(crate) fn mismatch(form: DwForm, expected: &'static str) -> Self {
        DwarfError::ValueTypeMismatch { form, expected }
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, DwarfError>;
